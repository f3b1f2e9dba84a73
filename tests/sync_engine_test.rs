//! Integration tests for the sync orchestrator
//!
//! These tests drive the full engine - planner, rate-limited client, retry
//! policy, circuit breakers, batch persistence, progress and checkpointing -
//! against a mock SIS server and the in-memory gateway.

use fake::faker::lorem::en::Word;
use fake::Fake;
use rollcall::audit::RecordingAuditSink;
use rollcall::config::SisConfig;
use rollcall::domain::SchoolCode;
use rollcall::persistence::MemoryGateway;
use rollcall::resilience::{BreakerConfig, BreakerState, RetryConfig};
use rollcall::sis::SisClient;
use rollcall::sync::operation::{DateRange, SyncKind, SyncStatus};
use rollcall::sync::orchestrator::{OrchestratorConfig, SyncOrchestrator};
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn date(d: u32) -> chrono::NaiveDate {
    chrono::NaiveDate::from_ymd_opt(2024, 8, d).unwrap()
}

fn day_rows(day: u32, count: usize) -> Vec<serde_json::Value> {
    (0..count)
        .map(|i| {
            let comment: Option<String> = if i % 7 == 0 {
                Some(Word().fake())
            } else {
                None
            };
            json!({
                "student_id": format!("S{i:04}"),
                "school_code": "SCH-01",
                "date": format!("2024-08-{day:02}"),
                "status": if i % 5 == 0 { "A" } else { "P" },
                "comment": comment
            })
        })
        .collect()
}

/// Mount mocks serving `records_per_day` rows for each day in 15..=17,
/// paged by `page_size`.
async fn mount_three_days(
    server: &mut mockito::ServerGuard,
    records_per_day: usize,
    page_size: usize,
) {
    let total_pages = records_per_day.div_ceil(page_size).max(1) as u32;
    for day in 15..=17u32 {
        let rows = day_rows(day, records_per_day);
        for page in 1..=total_pages {
            let lo = (page as usize - 1) * page_size;
            let hi = (lo + page_size).min(rows.len());
            server
                .mock("GET", "/api/v1/attendance")
                .match_query(mockito::Matcher::AllOf(vec![
                    mockito::Matcher::UrlEncoded(
                        "start_date".into(),
                        format!("2024-08-{day:02}"),
                    ),
                    mockito::Matcher::UrlEncoded("page".into(), page.to_string()),
                ]))
                .with_status(200)
                .with_body(
                    json!({
                        "records": rows[lo..hi].to_vec(),
                        "page": page,
                        "total_pages": total_pages,
                        "total_records": records_per_day as u64
                    })
                    .to_string(),
                )
                .create_async()
                .await;
        }
    }
}

fn test_retry_config() -> RetryConfig {
    RetryConfig {
        max_retries: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
        backoff_multiplier: 2.0,
    }
}

struct Harness {
    orchestrator: SyncOrchestrator,
    gateway: Arc<MemoryGateway>,
    audit: Arc<RecordingAuditSink>,
}

fn harness(server_url: String, breaker: BreakerConfig, cancel: CancellationToken) -> Harness {
    let sis_config = SisConfig {
        base_url: server_url,
        requests_per_minute: 100_000,
        ..SisConfig::default()
    };
    let client = Arc::new(SisClient::new(sis_config).unwrap());
    let gateway = Arc::new(MemoryGateway::new());
    let audit = Arc::new(RecordingAuditSink::new());

    let config = OrchestratorConfig {
        kind: SyncKind::Full,
        range: DateRange {
            start: date(15),
            end: date(17),
        },
        schools: vec![SchoolCode::from_str("SCH-01").unwrap()],
        chunk_days: 1,
        batch_size: 25,
        parallel_schools: 1,
        progress_update_interval: Duration::ZERO,
        checkpoint_every_batches: 2,
        operation_timeout: None,
        metadata: BTreeMap::new(),
    };

    let orchestrator = SyncOrchestrator::new(
        config,
        client,
        gateway.clone(),
        audit.clone(),
        test_retry_config(),
        breaker,
        cancel,
    );

    Harness {
        orchestrator,
        gateway,
        audit,
    }
}

#[tokio::test]
async fn three_day_sync_produces_three_chunks_and_six_batches() {
    let mut server = mockito::Server::new_async().await;
    mount_three_days(&mut server, 50, 25).await;

    let h = harness(server.url(), BreakerConfig::default(), CancellationToken::new());
    let report = h.orchestrator.execute_sync().await.unwrap();

    assert!(report.success);
    assert_eq!(report.status, SyncStatus::Completed);
    // 3 chunks of one day, 50 records/day in batches of 25
    assert_eq!(report.batches_attempted, 6);
    assert_eq!(report.batches_failed, 0);
    assert_eq!(report.records_processed, 150);
    assert_eq!(report.records_successful, 150);
    assert_eq!(report.records_failed, 0);
    // 50 students x 3 days upserted on (student, date)
    assert_eq!(h.gateway.record_count(), 150);
    assert_eq!(report.breaker_states["SCH-01"], BreakerState::Closed);

    // Audit saw both lifecycle events
    let actions = h.audit.actions();
    assert!(actions.contains(&"sync.started".to_string()));
    assert!(actions.contains(&"sync.finished".to_string()));
}

#[tokio::test]
async fn failed_batch_does_not_abort_remaining_batches() {
    let mut server = mockito::Server::new_async().await;
    mount_three_days(&mut server, 50, 25).await;

    let h = harness(server.url(), BreakerConfig::default(), CancellationToken::new());
    h.gateway.fail_on_upsert_calls(&[2]);

    let report = h.orchestrator.execute_sync().await.unwrap();

    // All six batches were still attempted
    assert_eq!(report.batches_attempted, 6);
    assert_eq!(report.batches_failed, 1);
    assert_eq!(report.records_processed, 150);
    assert_eq!(report.records_successful, 125);
    assert_eq!(report.records_failed, 25);
    // The operation ran to completion but cannot claim success
    assert_eq!(report.status, SyncStatus::Completed);
    assert!(!report.success);
    assert!(report
        .errors
        .iter()
        .any(|e| e.message.contains("persistence failed")));
}

#[tokio::test]
async fn permanently_failing_sis_makes_exactly_three_attempts_per_chunk() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v1/attendance")
        .match_query(mockito::Matcher::Any)
        .with_status(500)
        // 3 chunks x (1 initial + 2 retries)
        .expect(9)
        .create_async()
        .await;

    let h = harness(server.url(), BreakerConfig::default(), CancellationToken::new());
    let report = h.orchestrator.execute_sync().await.unwrap();

    mock.assert_async().await;
    assert_eq!(report.status, SyncStatus::Failed);
    assert!(!report.success);
    assert_eq!(report.records_processed, 0);
    assert_eq!(report.failed_schools, vec!["SCH-01".to_string()]);
    // 2 retries per chunk, 3 chunks
    assert_eq!(report.retry_attempts, 6);
    assert!(report.errors.iter().any(|e| e.message.contains("failed")));
}

#[tokio::test]
async fn open_breaker_fast_rejects_remaining_chunks() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v1/attendance")
        .match_query(mockito::Matcher::Any)
        .with_status(500)
        // Only the first chunk's 3 attempts reach the wire; the breaker
        // opens on the exhausted sequence and the school is abandoned.
        .expect(3)
        .create_async()
        .await;

    let breaker = BreakerConfig {
        failure_threshold: 1,
        reset_timeout: Duration::from_secs(300),
        half_open_requests: 1,
    };
    let h = harness(server.url(), breaker, CancellationToken::new());
    let report = h.orchestrator.execute_sync().await.unwrap();

    mock.assert_async().await;
    assert_eq!(report.status, SyncStatus::Failed);
    assert_eq!(report.breaker_states["SCH-01"], BreakerState::Open);
    assert!(report
        .errors
        .iter()
        .any(|e| e.message.contains("Circuit open")));
}

#[tokio::test]
async fn malformed_rows_are_quarantined_not_zero_filled() {
    let mut server = mockito::Server::new_async().await;
    let mut rows = day_rows(15, 3);
    rows.push(json!({"student_id": "S9999", "date": "2024-08-15", "status": "Q"}));
    for day in 15..=17u32 {
        let body = if day == 15 {
            json!({"records": rows, "page": 1, "total_pages": 1, "total_records": 4})
        } else {
            json!({"records": [], "page": 1, "total_pages": 1, "total_records": 0})
        };
        server
            .mock("GET", "/api/v1/attendance")
            .match_query(mockito::Matcher::AllOf(vec![mockito::Matcher::UrlEncoded(
                "start_date".into(),
                format!("2024-08-{day:02}"),
            )]))
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;
    }

    let h = harness(server.url(), BreakerConfig::default(), CancellationToken::new());
    let report = h.orchestrator.execute_sync().await.unwrap();

    assert_eq!(report.records_successful, 3);
    assert_eq!(report.records_failed, 1);
    assert_eq!(
        report.records_processed,
        report.records_successful + report.records_failed
    );
    assert!(report
        .errors
        .iter()
        .any(|e| e.message.contains("Rejected row")));
    assert_eq!(h.gateway.record_count(), 3);
}

#[tokio::test]
async fn pre_cancelled_token_finalizes_as_cancelled() {
    let server = mockito::Server::new_async().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let h = harness(server.url(), BreakerConfig::default(), cancel);
    let report = h.orchestrator.execute_sync().await.unwrap();

    assert_eq!(report.status, SyncStatus::Cancelled);
    assert!(!report.success);
    assert_eq!(report.records_processed, 0);
}

#[tokio::test]
async fn operation_timeout_cancels_like_cancellation() {
    let mut server = mockito::Server::new_async().await;
    mount_three_days(&mut server, 50, 25).await;

    let sis_config = SisConfig {
        base_url: server.url(),
        requests_per_minute: 100_000,
        ..SisConfig::default()
    };
    let client = Arc::new(SisClient::new(sis_config).unwrap());
    let gateway = Arc::new(MemoryGateway::new());

    let config = OrchestratorConfig {
        kind: SyncKind::Full,
        range: DateRange {
            start: date(15),
            end: date(17),
        },
        schools: vec![SchoolCode::from_str("SCH-01").unwrap()],
        chunk_days: 1,
        batch_size: 25,
        parallel_schools: 1,
        progress_update_interval: Duration::ZERO,
        checkpoint_every_batches: 10,
        operation_timeout: Some(Duration::ZERO),
        metadata: BTreeMap::new(),
    };
    let orchestrator = SyncOrchestrator::new(
        config,
        client,
        gateway,
        Arc::new(RecordingAuditSink::new()),
        test_retry_config(),
        BreakerConfig::default(),
        CancellationToken::new(),
    );

    let report = orchestrator.execute_sync().await.unwrap();
    assert_eq!(report.status, SyncStatus::Cancelled);
    assert!(!report.success);
}

#[tokio::test]
async fn invalid_range_is_a_synchronous_configuration_error() {
    let server = mockito::Server::new_async().await;
    let sis_config = SisConfig {
        base_url: server.url(),
        ..SisConfig::default()
    };
    let client = Arc::new(SisClient::new(sis_config).unwrap());

    let config = OrchestratorConfig {
        kind: SyncKind::Manual,
        range: DateRange {
            start: date(17),
            end: date(15),
        },
        schools: vec![SchoolCode::from_str("SCH-01").unwrap()],
        chunk_days: 1,
        batch_size: 25,
        parallel_schools: 1,
        progress_update_interval: Duration::ZERO,
        checkpoint_every_batches: 10,
        operation_timeout: None,
        metadata: BTreeMap::new(),
    };
    let orchestrator = SyncOrchestrator::new(
        config,
        client,
        Arc::new(MemoryGateway::new()),
        Arc::new(RecordingAuditSink::new()),
        test_retry_config(),
        BreakerConfig::default(),
        CancellationToken::new(),
    );

    let err = orchestrator.execute_sync().await.unwrap_err();
    assert!(matches!(
        err,
        rollcall::domain::RollcallError::Configuration(_)
    ));
}

#[tokio::test]
async fn progress_events_are_non_decreasing() {
    let mut server = mockito::Server::new_async().await;
    mount_three_days(&mut server, 50, 25).await;

    let h = harness(server.url(), BreakerConfig::default(), CancellationToken::new());
    let mut rx = h.orchestrator.subscribe_progress();

    let report = h.orchestrator.execute_sync().await.unwrap();
    assert!(report.success);

    let mut last = 0u64;
    let mut events = 0;
    while let Ok(event) = rx.try_recv() {
        assert!(event.records_processed >= last);
        last = event.records_processed;
        events += 1;
    }
    assert!(events > 0);
    // The final snapshot reflects the full run
    assert_eq!(last, 150);
}

#[tokio::test]
async fn two_schools_fail_independently() {
    let mut server = mockito::Server::new_async().await;

    // SCH-01 responds normally, SCH-02 is permanently down
    server
        .mock("GET", "/api/v1/attendance")
        .match_query(mockito::Matcher::AllOf(vec![mockito::Matcher::UrlEncoded(
            "school_code".into(),
            "SCH-01".into(),
        )]))
        .with_status(200)
        .with_body(
            json!({
                "records": day_rows(15, 10),
                "page": 1,
                "total_pages": 1,
                "total_records": 10
            })
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", "/api/v1/attendance")
        .match_query(mockito::Matcher::AllOf(vec![mockito::Matcher::UrlEncoded(
            "school_code".into(),
            "SCH-02".into(),
        )]))
        .with_status(503)
        .create_async()
        .await;

    let sis_config = SisConfig {
        base_url: server.url(),
        requests_per_minute: 100_000,
        ..SisConfig::default()
    };
    let client = Arc::new(SisClient::new(sis_config).unwrap());
    let gateway = Arc::new(MemoryGateway::new());

    let config = OrchestratorConfig {
        kind: SyncKind::Full,
        range: DateRange {
            start: date(15),
            end: date(15),
        },
        schools: vec![
            SchoolCode::from_str("SCH-01").unwrap(),
            SchoolCode::from_str("SCH-02").unwrap(),
        ],
        chunk_days: 1,
        batch_size: 25,
        parallel_schools: 2,
        progress_update_interval: Duration::ZERO,
        checkpoint_every_batches: 10,
        operation_timeout: None,
        metadata: BTreeMap::new(),
    };
    let orchestrator = SyncOrchestrator::new(
        config,
        client,
        gateway.clone(),
        Arc::new(RecordingAuditSink::new()),
        test_retry_config(),
        BreakerConfig::default(),
        CancellationToken::new(),
    );

    let report = orchestrator.execute_sync().await.unwrap();

    // The healthy school's records landed despite the sibling failing
    assert_eq!(gateway.record_count(), 10);
    assert_eq!(report.failed_schools, vec!["SCH-02".to_string()]);
    assert!(!report.success);
    assert_eq!(report.records_successful, 10);
}
