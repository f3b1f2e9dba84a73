//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Rollcall using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Rollcall - SIS attendance sync engine
#[derive(Parser, Debug)]
#[command(name = "rollcall")]
#[command(version, about, long_about = None)]
#[command(author = "Rollcall Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "rollcall.toml", env = "ROLLCALL_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "ROLLCALL_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync attendance from the SIS into the local store
    Sync(commands::sync::SyncArgs),

    /// Resume a checkpointed sync operation
    Resume(commands::resume::ResumeArgs),

    /// Show recorded sync operations and their progress
    Status(commands::status::StatusArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}
