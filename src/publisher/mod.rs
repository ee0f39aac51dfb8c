// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Common publisher contract and the three sink implementations. Every
//! sink is internally concurrency-safe and shared across every
//! [`crate::worker::CameraWorker`] as an `Arc<dyn Publisher>`.

pub mod record;
pub mod snapshot;
pub mod stream;

use std::time::Duration;

use async_trait::async_trait;

use crate::event::EventEnvelope;

pub use record::RecordPublisher;
pub use snapshot::SnapshotPublisher;
pub use stream::StreamPublisher;

/// Outcome of one `flush()` call: cumulative totals for this sink, read at
/// the moment the forced flush completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    pub published: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Cumulative counters a sink exposes through `/metrics` via the `metrics`
/// crate's registry; this snapshot is for direct inspection in tests and
/// the shutdown summary log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherMetrics {
    pub published: u64,
    pub failed: u64,
    pub dropped: u64,
    pub retried: u64,
    pub batches_sent: u64,
}

/// `publish` never returns `Result` — every failure is caught, logged, and
/// counted internally so a flaky sink never propagates back to a
/// [`crate::worker::CameraWorker`].
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, envelope: EventEnvelope);
    async fn flush(&self, deadline: Duration) -> FlushOutcome;
    fn metrics(&self) -> PublisherMetrics;
    fn sink_name(&self) -> &'static str;
}
