//! Bounded hand-off of change records to the downstream consumer.
//!
//! The control loop must never be stalled indefinitely by a slow consumer
//! without that being an explicit choice, so the sink is a bounded queue
//! with a declared overflow policy.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::record::ChangeRecord;

/// What to do when the downstream queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for capacity. The control loop stalls until the consumer
    /// catches up; no record is lost.
    #[default]
    Block,

    /// Drop the newest record with a warning and keep the loop moving.
    RejectNewest,
}

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverOutcome {
    /// The record was queued.
    Delivered,

    /// The queue was full and the record was discarded (RejectNewest only).
    Dropped,

    /// The consumer is gone; the loop should stop.
    Closed,
}

/// Sending half of the bounded record queue.
pub struct RecordSink {
    tx: mpsc::Sender<ChangeRecord>,
    policy: OverflowPolicy,
    dropped: u64,
}

impl RecordSink {
    /// Create a sink and its consumer receiver with the given queue depth.
    /// A zero depth is treated as one: the queue is always usable.
    pub fn bounded(depth: usize, policy: OverflowPolicy) -> (Self, mpsc::Receiver<ChangeRecord>) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (
            Self {
                tx,
                policy,
                dropped: 0,
            },
            rx,
        )
    }

    /// Hand one record to the consumer per the overflow policy.
    pub async fn deliver(&mut self, record: ChangeRecord) -> DeliverOutcome {
        match self.policy {
            OverflowPolicy::Block => match self.tx.send(record).await {
                Ok(()) => DeliverOutcome::Delivered,
                Err(_) => DeliverOutcome::Closed,
            },
            OverflowPolicy::RejectNewest => match self.tx.try_send(record) {
                Ok(()) => DeliverOutcome::Delivered,
                Err(mpsc::error::TrySendError::Full(record)) => {
                    self.dropped += 1;
                    warn!(
                        "record queue full, dropping {} (total dropped: {})",
                        record.path.display(),
                        self.dropped
                    );
                    DeliverOutcome::Dropped
                }
                Err(mpsc::error::TrySendError::Closed(_)) => DeliverOutcome::Closed,
            },
        }
    }

    /// How many records the RejectNewest policy has discarded so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
