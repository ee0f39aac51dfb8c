// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Kinesis-backed event stream sink. An internal single-consumer flusher
//! task is fed by every Worker's `publish()` call over a bounded channel —
//! the design favors this over a mutex-guarded buffer because it scales
//! better under many concurrently-publishing cameras.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_kinesis::primitives::Blob;
use aws_sdk_kinesis::types::PutRecordsRequestEntry;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use super::{FlushOutcome, Publisher, PublisherMetrics};
use crate::config::StreamPublisherConfig;
use crate::event::EventEnvelope;
use crate::frame_source::backoff;

enum Command {
    Publish(EventEnvelope),
    Flush(oneshot::Sender<FlushOutcome>),
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    retried: AtomicU64,
    batches_sent: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PublisherMetrics {
        PublisherMetrics {
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
        }
    }

    fn flush_outcome(&self) -> FlushOutcome {
        FlushOutcome {
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

pub struct StreamPublisher {
    tx: mpsc::Sender<Command>,
    counters: Arc<Counters>,
}

impl StreamPublisher {
    pub fn new(config: StreamPublisherConfig, aws_config: &aws_config::SdkConfig) -> Self {
        let client = aws_sdk_kinesis::Client::new(aws_config);
        let counters = Arc::new(Counters::default());
        let (tx, rx) = mpsc::channel(config.batch_size.max(1) * 4);

        tokio::spawn(run(rx, client, config, counters.clone()));

        Self { tx, counters }
    }
}

#[async_trait]
impl Publisher for StreamPublisher {
    async fn publish(&self, envelope: EventEnvelope) {
        if self.tx.try_send(Command::Publish(envelope)).is_err() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_publisher_dropped("stream", 1);
        }
    }

    async fn flush(&self, deadline: Duration) -> FlushOutcome {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(reply_tx)).await.is_err() {
            return self.counters.flush_outcome();
        }
        match tokio::time::timeout(deadline, reply_rx).await {
            Ok(Ok(outcome)) => outcome,
            _ => self.counters.flush_outcome(),
        }
    }

    fn metrics(&self) -> PublisherMetrics {
        self.counters.snapshot()
    }

    fn sink_name(&self) -> &'static str {
        "stream"
    }
}

async fn run(
    mut rx: mpsc::Receiver<Command>,
    client: aws_sdk_kinesis::Client,
    config: StreamPublisherConfig,
    counters: Arc<Counters>,
) {
    let mut buffer: Vec<EventEnvelope> = Vec::with_capacity(config.batch_size);
    let mut tick = tokio::time::interval(Duration::from_millis(config.flush_interval_ms.max(1)));

    loop {
        tokio::select! {
            cmd = rx.recv() => {
                match cmd {
                    Some(Command::Publish(envelope)) => {
                        buffer.push(envelope);
                        if buffer.len() >= config.batch_size {
                            let batch = std::mem::take(&mut buffer);
                            send_batch(&client, &config, batch, &counters).await;
                        }
                    }
                    Some(Command::Flush(reply)) => {
                        if !buffer.is_empty() {
                            let batch = std::mem::take(&mut buffer);
                            send_batch(&client, &config, batch, &counters).await;
                        }
                        let _ = reply.send(counters.flush_outcome());
                    }
                    None => return,
                }
            }
            _ = tick.tick() => {
                if !buffer.is_empty() {
                    let batch = std::mem::take(&mut buffer);
                    send_batch(&client, &config, batch, &counters).await;
                }
            }
        }
    }
}

async fn send_batch(
    client: &aws_sdk_kinesis::Client,
    config: &StreamPublisherConfig,
    mut batch: Vec<EventEnvelope>,
    counters: &Counters,
) {
    let base_backoff = Duration::from_millis(config.base_backoff_ms);
    let max_backoff = Duration::from_millis(config.max_backoff_ms);
    let mut attempt = 0u32;

    while !batch.is_empty() {
        let entries: Vec<PutRecordsRequestEntry> = batch
            .iter()
            .filter_map(|envelope| {
                let payload = serde_json::to_vec(envelope).ok()?;
                PutRecordsRequestEntry::builder()
                    .data(Blob::new(payload))
                    .partition_key(envelope.camera_id.clone())
                    .build()
                    .ok()
            })
            .collect();

        let result = client
            .put_records()
            .stream_name(&config.stream_name)
            .set_records(Some(entries))
            .send()
            .await;

        match result {
            Ok(output) => {
                counters.batches_sent.fetch_add(1, Ordering::Relaxed);
                let records = output.records();
                let mut retry_batch = Vec::new();
                for (idx, record) in records.iter().enumerate() {
                    if record.error_code().is_some() {
                        if let Some(envelope) = batch.get(idx) {
                            retry_batch.push(envelope.clone());
                        }
                    } else {
                        counters.published.fetch_add(1, Ordering::Relaxed);
                    }
                }
                if retry_batch.is_empty() {
                    return;
                }
                counters.retried.fetch_add(retry_batch.len() as u64, Ordering::Relaxed);
                batch = retry_batch;
            }
            Err(e) => {
                warn!(error = %e, stream = %config.stream_name, "kinesis PutRecords call failed");
            }
        }

        attempt += 1;
        if attempt > config.max_retries {
            counters.failed.fetch_add(batch.len() as u64, Ordering::Relaxed);
            counters.dropped.fetch_add(batch.len() as u64, Ordering::Relaxed);
            crate::metrics::record_publisher_failure("stream");
            crate::metrics::record_publisher_dropped("stream", batch.len() as u64);
            return;
        }
        tokio::time::sleep(backoff::next_delay(base_backoff, attempt - 1, max_backoff)).await;
    }
}
