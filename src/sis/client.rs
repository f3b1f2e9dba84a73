//! SIS API client
//!
//! Authenticated HTTP access to the district's Student Information System.
//! The client enforces a requests-per-minute ceiling through a sliding-window
//! rate limiter, exposes a single-page fetch used by probes and tests, and a
//! higher-level [`SisClient::fetch_attendance_batches`] that pages through a
//! date range, materializes numbered batches and hands each one to an async
//! callback. A callback failure is captured as a per-batch error and never
//! aborts the remaining batches.

use crate::config::SisConfig;
use crate::domain::ids::SchoolCode;
use crate::domain::{Result, RollcallError, SisError};
use crate::resilience::{CircuitBreaker, CircuitError, RetryPolicy};
use crate::sis::models::AttendancePage;
use crate::sis::rate_limit::RateLimiter;
use crate::sync::batch::Batch;
use base64::{engine::general_purpose, Engine as _};
use chrono::NaiveDate;
use reqwest::{Client, ClientBuilder, StatusCode};
use secrecy::ExposeSecret;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const ATTENDANCE_PATH: &str = "/api/v1/attendance";
const PING_PATH: &str = "/api/v1/ping";

/// Options for one batch-fetch invocation
pub struct FetchOptions {
    /// School to fetch attendance for
    pub school_code: SchoolCode,
    /// Records per batch (and requested page size)
    pub batch_size: usize,
    /// Operation-global batch number allocator; numbers are assigned before
    /// dispatch and are strictly increasing and gap-free
    pub batch_counter: Arc<AtomicU64>,
    /// Batches numbered below this are materialized and numbered but not
    /// delivered to the callback; zero disables skipping. Used by resume.
    pub skip_before_batch: u64,
    /// Cooperative cancellation, polled between pages and between batches;
    /// in-flight requests and callbacks run to completion
    pub cancel: CancellationToken,
}

/// Per-batch callback failure captured by the fetch loop
#[derive(Debug, Clone)]
pub struct BatchError {
    /// Sequence number of the failed batch
    pub batch_number: u64,
    /// What the callback reported
    pub message: String,
}

/// Result of one batch-fetch invocation
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Records delivered to the callback
    pub total_processed: u64,
    /// Batches materialized (delivered or skipped)
    pub total_batches: u64,
    /// Batches skipped by `skip_before_batch`
    pub skipped_batches: u64,
    /// Total matching records as reported by the SIS, when available
    pub total_records_reported: Option<u64>,
    /// Callback failures, one entry per failed batch
    pub errors: Vec<BatchError>,
    /// True when the fetch stopped early at a cancellation poll point
    pub cancelled: bool,
}

/// Rate-limited SIS API client
///
/// Cheap to share behind an `Arc`; the rate limiter window is the only
/// internal state and is safe under concurrent school loops.
pub struct SisClient {
    base_url: String,
    client: Client,
    config: SisConfig,
    rate_limiter: RateLimiter,
}

impl SisClient {
    /// Create a new client from configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the underlying HTTP client cannot
    /// be constructed.
    pub fn new(config: SisConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();

        let mut builder = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(30));

        if !config.tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(|e| {
            RollcallError::Configuration(format!("Failed to build HTTP client: {e}"))
        })?;

        let rate_limiter = RateLimiter::new(config.rate_limit_config());

        Ok(Self {
            base_url,
            client,
            config,
            rate_limiter,
        })
    }

    /// Base URL of the SIS server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build authorization header value
    fn auth_header_value(&self) -> Option<String> {
        match self.config.auth_type.as_str() {
            "bearer" => self
                .config
                .api_token
                .as_ref()
                .map(|token| format!("Bearer {}", token.expose_secret())),
            "basic" => {
                if let (Some(ref username), Some(ref password)) =
                    (&self.config.username, &self.config.password)
                {
                    let credentials = format!("{username}:{}", password.expose_secret());
                    let encoded = general_purpose::STANDARD.encode(credentials.as_bytes());
                    Some(format!("Basic {encoded}"))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Verify the SIS is reachable and accepts our credentials
    ///
    /// # Errors
    ///
    /// Returns an error if the server is not reachable or rejects the
    /// request.
    pub async fn health_check(&self) -> Result<()> {
        self.rate_limiter.acquire().await?;

        let url = format!("{}{PING_PATH}", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(auth) = self.auth_header_value() {
            request = request.header("Authorization", auth);
        }

        let response = request.send().await.map_err(|e| {
            SisError::Connection {
                endpoint: PING_PATH.to_string(),
                message: e.to_string(),
            }
        })?;

        if response.status().is_success() {
            tracing::info!(base_url = %self.base_url, "SIS health check passed");
            Ok(())
        } else {
            let status = response.status().as_u16();
            tracing::error!(base_url = %self.base_url, status, "SIS health check failed");
            Err(Self::status_error(PING_PATH, response).await.into())
        }
    }

    /// Fetch one page of attendance for a school and date range.
    ///
    /// Waits for a rate-limit slot before issuing the request. This is a
    /// single attempt; retry and breaker wrapping happen in
    /// [`fetch_attendance_batches`](Self::fetch_attendance_batches).
    pub async fn fetch_page(
        &self,
        school: &SchoolCode,
        start: NaiveDate,
        end: NaiveDate,
        page: u32,
        page_size: usize,
    ) -> std::result::Result<AttendancePage, SisError> {
        self.rate_limiter.acquire().await?;

        let url = format!("{}{ATTENDANCE_PATH}", self.base_url);
        let mut request = self.client.get(&url).query(&[
            ("school_code", school.as_str().to_string()),
            ("start_date", start.format("%Y-%m-%d").to_string()),
            ("end_date", end.format("%Y-%m-%d").to_string()),
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
        ]);

        if let Some(auth) = self.auth_header_value() {
            request = request.header("Authorization", auth);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SisError::Timeout {
                    endpoint: ATTENDANCE_PATH.to_string(),
                    message: e.to_string(),
                }
            } else {
                SisError::Connection {
                    endpoint: ATTENDANCE_PATH.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            return Err(Self::status_error(ATTENDANCE_PATH, response).await);
        }

        response
            .json::<AttendancePage>()
            .await
            .map_err(|e| SisError::MalformedPayload {
                endpoint: ATTENDANCE_PATH.to_string(),
                message: e.to_string(),
            })
    }

    /// Map a non-2xx response into the error taxonomy
    async fn status_error(endpoint: &str, response: reqwest::Response) -> SisError {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return SisError::RateLimited {
                endpoint: endpoint.to_string(),
                retry_after,
            };
        }

        let code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            SisError::Server {
                endpoint: endpoint.to_string(),
                status: code,
                message: body,
            }
        } else {
            SisError::Client {
                endpoint: endpoint.to_string(),
                status: code,
                message: body,
            }
        }
    }

    /// Page through `[start, end]` for one school, delivering numbered
    /// batches to `per_batch`.
    ///
    /// Every page request is routed `breaker.call(retry.execute(...))`, so a
    /// scope whose breaker is open fast-rejects without burning retry budget.
    /// Rows failing validation are quarantined onto the batch they would
    /// have joined. A callback error is recorded in the outcome and the loop
    /// continues with the next batch.
    ///
    /// # Errors
    ///
    /// Returns an error only when a page fetch itself fails terminally
    /// (retries exhausted or circuit open); batches already delivered stay
    /// delivered.
    pub async fn fetch_attendance_batches<F, Fut>(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        options: &FetchOptions,
        retry: &RetryPolicy,
        breaker: &CircuitBreaker,
        mut per_batch: F,
    ) -> Result<FetchOutcome>
    where
        F: FnMut(Batch) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut outcome = FetchOutcome::default();
        let mut buffer: Vec<crate::domain::AttendanceRecord> = Vec::new();
        let mut pending_rejects: Vec<String> = Vec::new();
        let mut page_number = 1u32;

        loop {
            if options.cancel.is_cancelled() {
                outcome.cancelled = true;
                return Ok(outcome);
            }

            let school = options.school_code.clone();
            let page = breaker
                .call(|| {
                    retry.execute("fetch_attendance_page", || {
                        self.fetch_page(&school, start, end, page_number, options.batch_size)
                    })
                })
                .await
                .map_err(|e| match e {
                    CircuitError::Rejected { scope } => RollcallError::CircuitOpen { scope },
                    CircuitError::Inner(retry_err) => RollcallError::RetriesExhausted {
                        attempts: retry_err.attempts,
                        last_error: retry_err.source.to_string(),
                    },
                })?;

            if page_number == 1 {
                outcome.total_records_reported = page.total_records;
            }

            let has_next = page.has_next();
            for row in page.records {
                match row.into_record(&options.school_code) {
                    Ok(record) => buffer.push(record),
                    Err(reason) => {
                        tracing::warn!(
                            school = %options.school_code,
                            reason = %reason,
                            "Quarantined malformed attendance row"
                        );
                        pending_rejects.push(reason);
                    }
                }
            }

            while buffer.len() >= options.batch_size {
                if options.cancel.is_cancelled() {
                    outcome.cancelled = true;
                    return Ok(outcome);
                }
                let records: Vec<_> = buffer.drain(..options.batch_size).collect();
                let rejected = std::mem::take(&mut pending_rejects);
                self.dispatch_batch(records, rejected, options, &mut outcome, &mut per_batch)
                    .await;
            }

            if !has_next {
                break;
            }
            page_number += 1;
        }

        // Flush the remainder, including any trailing quarantined rows
        if !buffer.is_empty() || !pending_rejects.is_empty() {
            if options.cancel.is_cancelled() {
                outcome.cancelled = true;
                return Ok(outcome);
            }
            let records = std::mem::take(&mut buffer);
            let rejected = std::mem::take(&mut pending_rejects);
            self.dispatch_batch(records, rejected, options, &mut outcome, &mut per_batch)
                .await;
        }

        Ok(outcome)
    }

    async fn dispatch_batch<F, Fut>(
        &self,
        records: Vec<crate::domain::AttendanceRecord>,
        rejected: Vec<String>,
        options: &FetchOptions,
        outcome: &mut FetchOutcome,
        per_batch: &mut F,
    ) where
        F: FnMut(Batch) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let number = options.batch_counter.fetch_add(1, Ordering::SeqCst) + 1;
        outcome.total_batches += 1;

        if number < options.skip_before_batch {
            tracing::debug!(
                batch = number,
                resume_from = options.skip_before_batch,
                "Skipping batch below resume point"
            );
            outcome.skipped_batches += 1;
            return;
        }

        let record_count = records.len() as u64;
        let batch = Batch {
            number,
            school_code: options.school_code.clone(),
            records,
            rejected,
        };

        match per_batch(batch).await {
            Ok(()) => {
                outcome.total_processed += record_count;
            }
            Err(e) => {
                tracing::warn!(batch = number, error = %e, "Batch callback failed");
                outcome.total_processed += record_count;
                outcome.errors.push(BatchError {
                    batch_number: number,
                    message: e.to_string(),
                });
            }
        }
    }
}
