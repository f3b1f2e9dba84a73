// Rollcall - SIS attendance sync engine
// Copyright (c) 2025 Rollcall Contributors
// Licensed under the MIT License

use clap::Parser;
use rollcall::cli::{Cli, Commands};
use rollcall::config::LoggingConfig;
use rollcall::logging::init_logging;
use std::process;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Console-only logging for the CLI; file logging is driven by the
    // config file once a command loads it.
    let log_level = cli.log_level.as_deref().unwrap_or("info");
    let logging_config = LoggingConfig::default();
    let _guard = match init_logging(log_level, &logging_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(5);
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Rollcall - SIS attendance sync engine"
    );

    // Cancellation token wired to SIGINT/SIGTERM; the orchestrator polls it
    // between batches, so the current batch always completes.
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    return;
                }
            };

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT, finishing current batch before stopping");
                    println!("\nShutdown signal received, completing current batch...");
                    signal_token.cancel();
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, finishing current batch before stopping");
                    println!("\nShutdown signal received, completing current batch...");
                    signal_token.cancel();
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            } else {
                tracing::info!("Received Ctrl+C, finishing current batch before stopping");
                println!("\nShutdown signal received, completing current batch...");
                signal_token.cancel();
            }
        }
    });

    let exit_code = match execute_command(&cli, cancel).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command execution failed");
            eprintln!("Error: {e}");
            5
        }
    };

    process::exit(exit_code);
}

/// Execute the CLI command
async fn execute_command(cli: &Cli, cancel: CancellationToken) -> anyhow::Result<i32> {
    match &cli.command {
        Commands::Sync(args) => args.execute(&cli.config, cancel).await,
        Commands::Resume(args) => args.execute(&cli.config, cancel).await,
        Commands::Status(args) => args.execute(&cli.config).await,
        Commands::ValidateConfig(args) => args.execute(&cli.config).await,
        Commands::Init(args) => args.execute().await,
    }
}
