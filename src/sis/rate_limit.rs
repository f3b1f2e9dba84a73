//! Sliding-window rate limiter
//!
//! Caps outbound SIS requests at a configured requests-per-minute ceiling.
//! Callers acquire a slot before every request; acquisition waits until the
//! oldest timestamp ages out of the window. The timestamp window is the only
//! shared mutable state and is updated under one async mutex, so parallel
//! school loops sharing a client cannot over-admit.

use crate::domain::SisError;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Configuration for the request rate limiter
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub max_requests: u32,
    /// Window width; one minute for a requests-per-minute ceiling
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window: Duration::from_secs(60),
        }
    }
}

/// Sliding-window rate limiter over request timestamps
pub struct RateLimiter {
    config: RateLimitConfig,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Waiting more rounds than this means the window never drained; that is
    /// a logic fault, not load, and is surfaced instead of looping forever.
    const MAX_WAIT_ROUNDS: u32 = 16;

    /// Create a limiter for the given ceiling
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Acquire a slot for one request, waiting if the window is full.
    ///
    /// # Errors
    ///
    /// Returns [`SisError::RateLimited`] if a slot still cannot be acquired
    /// after repeatedly waiting out the window.
    pub async fn acquire(&self) -> Result<(), SisError> {
        for _ in 0..Self::MAX_WAIT_ROUNDS {
            let wait = {
                let mut window = self.timestamps.lock().await;
                let now = Instant::now();

                while let Some(front) = window.front() {
                    if now.duration_since(*front) >= self.config.window {
                        window.pop_front();
                    } else {
                        break;
                    }
                }

                if (window.len() as u32) < self.config.max_requests {
                    window.push_back(now);
                    return Ok(());
                }

                // Oldest in-window request decides how long until a slot opens
                let oldest = *window
                    .front()
                    .unwrap_or(&now);
                self.config
                    .window
                    .saturating_sub(now.duration_since(oldest))
            };

            tracing::debug!(
                wait_ms = wait.as_millis() as u64,
                "Rate limit window full, waiting for a slot"
            );
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }

        Err(SisError::RateLimited {
            endpoint: "rate-limiter".to_string(),
            retry_after: Some(self.config.window),
        })
    }

    /// Requests currently inside the window (for diagnostics)
    pub async fn in_flight_window(&self) -> usize {
        let mut window = self.timestamps.lock().await;
        let now = Instant::now();
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= self.config.window {
                window.pop_front();
            } else {
                break;
            }
        }
        window.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, window_ms: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests: max,
            window: Duration::from_millis(window_ms),
        })
    }

    #[tokio::test]
    async fn test_acquire_under_ceiling_is_immediate() {
        let limiter = limiter(3, 60_000);
        for _ in 0..3 {
            limiter.acquire().await.unwrap();
        }
        assert_eq!(limiter.in_flight_window().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_window_to_slide() {
        let limiter = limiter(2, 1_000);
        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();

        // Third acquire must wait ~1s for the first timestamp to age out.
        // With the paused clock, sleep() auto-advances, so this completes
        // immediately in test time while still exercising the wait path.
        let start = Instant::now();
        limiter.acquire().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_timestamps_age_out() {
        let limiter = limiter(2, 1_000);
        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();

        tokio::time::advance(Duration::from_millis(1_100)).await;
        assert_eq!(limiter.in_flight_window().await, 0);

        limiter.acquire().await.unwrap();
        assert_eq!(limiter.in_flight_window().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_acquires_never_over_admit() {
        use std::sync::Arc;

        let limiter = Arc::new(limiter(5, 60_000));
        let mut handles = Vec::new();
        for _ in 0..5 {
            let l = limiter.clone();
            handles.push(tokio::spawn(async move { l.acquire().await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(limiter.in_flight_window().await, 5);
    }
}
