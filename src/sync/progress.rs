//! Progress event emission
//!
//! The orchestrator publishes coalesced progress events over a bounded
//! broadcast channel. A slow subscriber lags and misses events; it can never
//! stall the sync loop. Events are ephemeral - nothing is replayed to late
//! subscribers.

use crate::domain::ids::OperationId;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Snapshot emitted after a batch completes
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Operation the event belongs to
    pub operation_id: OperationId,
    /// Records handled so far
    pub records_processed: u64,
    /// Total records, when the remote reports it
    pub total_records: Option<u64>,
    /// Completion percentage, when the total is known
    pub percentage: Option<f64>,
    /// What the engine is currently doing, for display
    pub current_operation: String,
}

/// Coalescing broadcaster for progress events
///
/// Emits at most one event per `min_interval`; intermediate snapshots are
/// dropped. [`ProgressBroadcaster::emit_final`] bypasses the interval so the
/// terminal snapshot is always delivered.
pub struct ProgressBroadcaster {
    sender: broadcast::Sender<ProgressEvent>,
    min_interval: Duration,
    last_emit: Mutex<Option<Instant>>,
}

impl ProgressBroadcaster {
    /// Channel capacity for pending events per subscriber
    const CAPACITY: usize = 64;

    /// Create a broadcaster emitting at most one event per `min_interval`
    pub fn new(min_interval: Duration) -> Self {
        let (sender, _) = broadcast::channel(Self::CAPACITY);
        Self {
            sender,
            min_interval,
            last_emit: Mutex::new(None),
        }
    }

    /// Subscribe to progress events
    ///
    /// Subscribers that fall more than the channel capacity behind skip
    /// ahead, losing the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Emit an event unless one was emitted within the interval.
    ///
    /// Returns whether the event was actually published.
    pub fn emit(&self, event: ProgressEvent) -> bool {
        let mut last = self.last_emit.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        if let Some(prev) = *last {
            if now.duration_since(prev) < self.min_interval {
                return false;
            }
        }

        *last = Some(now);
        // Send errors just mean nobody is listening
        let _ = self.sender.send(event);
        true
    }

    /// Emit unconditionally; used for the final snapshot of an operation
    pub fn emit_final(&self, event: ProgressEvent) {
        let mut last = self.last_emit.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(Instant::now());
        let _ = self.sender.send(event);
    }
}
