//! Circuit breaker for failing SIS endpoints
//!
//! Tracks consecutive failures per logical scope (one breaker per school
//! code) and stops calling a scope that keeps failing until a reset timeout
//! has elapsed, so one sick school cannot consume the whole operation's time
//! budget or hammer a struggling server.
//!
//! States:
//! - Closed: normal operation, calls pass through
//! - Open: scope unhealthy, calls are rejected without invoking the operation
//! - HalfOpen: reset timeout elapsed, a bounded number of probes is allowed
//!
//! State is mutated only through [`CircuitBreaker::try_acquire`],
//! [`CircuitBreaker::record_success`] and [`CircuitBreaker::record_failure`],
//! all guarded by one mutex, so concurrent school loops sharing a client
//! cannot race the counters.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for a circuit breaker
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing probes
    pub reset_timeout: Duration,
    /// Number of probe calls permitted while half-open
    pub half_open_requests: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            half_open_requests: 1,
        }
    }
}

impl BreakerConfig {
    /// Fast-recovery config for tests
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_millis(50),
            half_open_requests: 1,
        }
    }
}

/// Error for circuit-protected operations
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// The breaker rejected the call; the operation was never invoked
    #[error("circuit open for scope '{scope}'")]
    Rejected { scope: String },

    /// The operation ran and failed
    #[error("operation failed: {0}")]
    Inner(#[source] E),
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
}

/// Per-scope circuit breaker
///
/// # Example
///
/// ```
/// use rollcall::resilience::circuit_breaker::{BreakerConfig, BreakerState, CircuitBreaker};
///
/// let breaker = CircuitBreaker::new("SCH-01", BreakerConfig::default());
/// assert_eq!(breaker.state(), BreakerState::Closed);
///
/// breaker.record_failure();
/// breaker.record_success();
/// assert_eq!(breaker.consecutive_failures(), 0);
/// ```
pub struct CircuitBreaker {
    scope: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new breaker for the given scope
    pub fn new(scope: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            scope: scope.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_in_flight: 0,
            }),
        }
    }

    /// The scope this breaker isolates
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Current state snapshot
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Current consecutive-failure count
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Ask permission to make a call.
    ///
    /// Returns `Err` when the breaker is open and the reset timeout has not
    /// elapsed, or when the half-open probe budget is spent. On the first
    /// acquire after the timeout the breaker transitions to half-open and
    /// admits up to `half_open_requests` probes.
    pub fn try_acquire(&self) -> Result<(), crate::domain::RollcallError> {
        let mut inner = self.lock();

        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed < self.config.reset_timeout {
                    Err(crate::domain::RollcallError::CircuitOpen {
                        scope: self.scope.clone(),
                    })
                } else {
                    tracing::info!(
                        scope = %self.scope,
                        "Circuit breaker reset timeout elapsed, transitioning to half-open"
                    );
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_in_flight = 1;
                    Ok(())
                }
            }
            BreakerState::HalfOpen => {
                if inner.half_open_in_flight < self.config.half_open_requests {
                    inner.half_open_in_flight += 1;
                    Ok(())
                } else {
                    Err(crate::domain::RollcallError::CircuitOpen {
                        scope: self.scope.clone(),
                    })
                }
            }
        }
    }

    /// Record a successful call.
    ///
    /// Resets the failure counter; a half-open probe success closes the
    /// breaker.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        if inner.state == BreakerState::HalfOpen {
            tracing::info!(scope = %self.scope, "Circuit breaker closing after successful probe");
            inner.state = BreakerState::Closed;
            inner.opened_at = None;
            inner.half_open_in_flight = 0;
        }
    }

    /// Record a failed call.
    ///
    /// In closed state, opens the breaker once the threshold is crossed.
    /// A half-open probe failure reopens immediately and restarts the
    /// timeout.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        match inner.state {
            BreakerState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    tracing::warn!(
                        scope = %self.scope,
                        failures = inner.consecutive_failures,
                        "Circuit breaker opening"
                    );
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            BreakerState::HalfOpen => {
                tracing::warn!(scope = %self.scope, "Probe failed, circuit breaker reopening");
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.half_open_in_flight = 0;
            }
            BreakerState::Open => {
                // Late failure from a call admitted before the open; the
                // timeout keeps its original start.
            }
        }
    }

    /// Execute an operation through the breaker.
    ///
    /// Pairs [`try_acquire`](Self::try_acquire) with
    /// [`record_success`](Self::record_success) /
    /// [`record_failure`](Self::record_failure).
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.try_acquire().is_err() {
            return Err(CircuitError::Rejected {
                scope: self.scope.clone(),
            });
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(CircuitError::Inner(err))
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        // A poisoned lock means a panic while holding it; the state is a
        // plain struct, safe to keep using.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Registry handing out one breaker per scope
///
/// School loops running in parallel share the registry; each school gets its
/// own breaker so one failing school does not block the others.
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: Mutex<HashMap<String, std::sync::Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Create a registry; every breaker it creates shares `config`
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the breaker for a scope
    pub fn breaker_for(&self, scope: &str) -> std::sync::Arc<CircuitBreaker> {
        let mut breakers = self
            .breakers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        breakers
            .entry(scope.to_string())
            .or_insert_with(|| {
                std::sync::Arc::new(CircuitBreaker::new(scope, self.config.clone()))
            })
            .clone()
    }

    /// Snapshot of every breaker's state, for the final report
    pub fn states(&self) -> BTreeMap<String, BreakerState> {
        let breakers = self
            .breakers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        breakers
            .iter()
            .map(|(scope, breaker)| (scope.clone(), breaker.state()))
            .collect()
    }
}
