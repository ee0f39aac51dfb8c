// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! DynamoDB-backed record sink. Idempotent on `event_id` — `BatchWriteItem`
//! `PutRequest`s overwrite, so at-least-once delivery collapses to
//! exactly-once at rest.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, PutRequest, WriteRequest};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use super::{FlushOutcome, Publisher, PublisherMetrics};
use crate::config::RecordPublisherConfig;
use crate::event::EventEnvelope;
use crate::frame_source::backoff;

const BATCH_LIMIT: usize = 25;

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

pub struct RecordPublisher {
    tx: mpsc::Sender<Command>,
    counters: Arc<Counters>,
}

impl RecordPublisher {
    pub fn new(config: RecordPublisherConfig, aws_config: &aws_config::SdkConfig) -> Self {
        let client = aws_sdk_dynamodb::Client::new(aws_config);
        let counters = Arc::new(Counters::default());
        let (tx, rx) = mpsc::channel(BATCH_LIMIT * 4);
        tokio::spawn(run(rx, client, config, counters.clone()));
        Self { tx, counters }
    }
}

#[async_trait]
impl Publisher for RecordPublisher {
    async fn publish(&self, envelope: EventEnvelope) {
        if self.tx.try_send(Command::Publish(envelope)).is_err() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_publisher_dropped("record", 1);
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
        "record"
    }
}

async fn run(mut rx: mpsc::Receiver<Command>, client: aws_sdk_dynamodb::Client, config: RecordPublisherConfig, counters: Arc<Counters>) {
    let mut buffer: Vec<EventEnvelope> = Vec::with_capacity(BATCH_LIMIT);
    loop {
        match rx.recv().await {
            Some(Command::Publish(envelope)) => {
                buffer.push(envelope);
                if buffer.len() >= BATCH_LIMIT {
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
}

async fn send_batch(client: &aws_sdk_dynamodb::Client, config: &RecordPublisherConfig, mut batch: Vec<EventEnvelope>, counters: &Counters) {
    let base_backoff = Duration::from_millis(200);
    let max_backoff = Duration::from_secs(10);
    let mut attempt = 0u32;
    const MAX_RETRIES: u32 = 5;

    while !batch.is_empty() {
        let round_size = batch.len();
        let by_event_id: HashMap<String, EventEnvelope> =
            batch.iter().map(|e| (e.event_id.clone(), e.clone())).collect();
        let requests: Vec<WriteRequest> =
            batch.iter().map(|envelope| envelope_to_write_request(envelope, config.ttl_days)).collect();

        let mut items: HashMap<String, Vec<WriteRequest>> = HashMap::new();
        items.insert(config.table_name.clone(), requests);

        let result = client.batch_write_item().set_request_items(Some(items)).send().await;
        match result {
            Ok(output) => {
                counters.batches_sent.fetch_add(1, Ordering::Relaxed);
                let unprocessed = output
                    .unprocessed_items
                    .and_then(|mut m| m.remove(&config.table_name))
                    .unwrap_or_default();
                let processed = round_size - unprocessed.len();
                counters.published.fetch_add(processed as u64, Ordering::Relaxed);
                if unprocessed.is_empty() {
                    return;
                }
                counters.retried.fetch_add(unprocessed.len() as u64, Ordering::Relaxed);
                batch = unprocessed
                    .iter()
                    .filter_map(|req| event_id_of(req).and_then(|id| by_event_id.get(&id).cloned()))
                    .collect();
            }
            Err(e) => {
                warn!(error = %e, table = %config.table_name, "dynamodb BatchWriteItem call failed");
            }
        }

        attempt += 1;
        if attempt > MAX_RETRIES {
            counters.failed.fetch_add(batch.len() as u64, Ordering::Relaxed);
            counters.dropped.fetch_add(batch.len() as u64, Ordering::Relaxed);
            crate::metrics::record_publisher_failure("record");
            crate::metrics::record_publisher_dropped("record", batch.len() as u64);
            return;
        }
        tokio::time::sleep(backoff::next_delay(base_backoff, attempt - 1, max_backoff)).await;
    }
}

/// Recovers the `event_id` key from an unprocessed `WriteRequest` so its
/// envelope can be looked up for retry — `BatchWriteItem`'s unprocessed list
/// returns full items, not positions, unlike Kinesis's per-index results.
fn event_id_of(request: &WriteRequest) -> Option<String> {
    let item = request.put_request()?.item();
    match item.get("event_id")? {
        AttributeValue::S(s) => Some(s.clone()),
        _ => None,
    }
}

fn envelope_to_write_request(envelope: &EventEnvelope, ttl_days: Option<u64>) -> WriteRequest {
    let event = &envelope.payload;
    let mut item = HashMap::new();
    item.insert("event_id".to_string(), AttributeValue::S(envelope.event_id.clone()));
    item.insert("ts_ms".to_string(), AttributeValue::N(event.ts_ms.to_string()));
    item.insert("camera_id".to_string(), AttributeValue::S(envelope.camera_id.clone()));
    item.insert("producer".to_string(), AttributeValue::S(envelope.producer.clone()));
    item.insert("type".to_string(), AttributeValue::S(event.event_type.clone()));
    item.insert("label".to_string(), AttributeValue::S(event.label.clone()));
    item.insert("conf".to_string(), AttributeValue::N(format!("{:.6}", event.conf)));
    item.insert(
        "bbox".to_string(),
        AttributeValue::L(event.bbox.iter().map(|v| AttributeValue::N(format!("{v:.3}"))).collect()),
    );
    if !event.extras.is_empty() {
        item.insert("extras".to_string(), AttributeValue::S(event.extras.to_string()));
    }
    if let Some(days) = ttl_days {
        let expires_at = Utc::now().timestamp() + (days as i64) * 86_400;
        item.insert("expires_at".to_string(), AttributeValue::N(expires_at.to_string()));
    }
    WriteRequest::builder().put_request(PutRequest::builder().set_item(Some(item)).build().expect("item is always set")).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::geometry::BBox;

    #[test]
    fn write_request_carries_primary_key_fields() {
        let event = Event::new("cam-A", "weapon", "knife", 0.9, BBox::new(0.0, 0.0, 10.0, 10.0), 1_000, serde_json::Map::new());
        let envelope = EventEnvelope::wrap(event);
        let request = envelope_to_write_request(&envelope, Some(30));
        let item = request.put_request().unwrap().item();
        assert_eq!(item.get("event_id"), Some(&AttributeValue::S(envelope.event_id.clone())));
        assert!(item.contains_key("expires_at"));
    }
}
