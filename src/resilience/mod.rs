//! Fault-tolerance primitives
//!
//! This module provides the retry policy and circuit breaker the sync engine
//! wraps around every SIS request. The composition is always
//! `breaker.call(retry.execute(raw_request))`: the breaker sees one
//! failure per exhausted retry sequence, and a scope whose breaker is open
//! is skipped without burning retry budget.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{BreakerConfig, BreakerRegistry, BreakerState, CircuitBreaker, CircuitError};
pub use retry::{RetryConfig, RetryError, RetryPolicy, Retryable};
