// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Thin wrappers around the `metrics` crate's global recorder, one function
//! per metric named in the Observability section. Keeping the metric name
//! and label set in one place avoids typos scattered across call sites.

use crate::frame_source::ConnectionState;

pub const LATENCY_BUCKETS: &[f64] = &[10.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 2000.0, 5000.0];

pub fn record_frame_processed(camera_id: &str) {
    metrics::counter!("infer_frames_total", "camera_id" => camera_id.to_string()).increment(1);
}

pub fn record_event(camera_id: &str, event_type: &str) {
    metrics::counter!(
        "infer_events_total",
        "camera_id" => camera_id.to_string(),
        "type" => event_type.to_string()
    )
    .increment(1);
}

pub fn record_latency_ms(camera_id: &str, latency_ms: f64) {
    metrics::histogram!("infer_latency_ms", "camera_id" => camera_id.to_string()).record(latency_ms);
}

pub fn set_worker_alive(camera_id: &str, alive: bool) {
    metrics::gauge!("worker_alive", "camera_id" => camera_id.to_string()).set(if alive { 1.0 } else { 0.0 });
}

pub fn record_detector_failure(camera_id: &str, detector_type: &str) {
    metrics::counter!(
        "detector_failures_total",
        "camera_id" => camera_id.to_string(),
        "detector" => detector_type.to_string()
    )
    .increment(1);
}

pub fn record_publisher_failure(sink: &str) {
    metrics::counter!("publisher_failures_total", "sink" => sink.to_string()).increment(1);
}

pub fn record_publisher_dropped(sink: &str, count: u64) {
    metrics::counter!("publisher_dropped_total", "sink" => sink.to_string()).increment(count);
}

pub fn record_frame_source_frame(camera_id: &str) {
    metrics::counter!("frames_total", "camera_id" => camera_id.to_string()).increment(1);
}

pub fn record_reconnect(camera_id: &str) {
    metrics::counter!("reconnects_total", "camera_id" => camera_id.to_string()).increment(1);
}

pub fn record_url_refresh(camera_id: &str) {
    metrics::counter!("url_refreshes_total", "camera_id" => camera_id.to_string()).increment(1);
}

pub fn record_read_error(camera_id: &str) {
    metrics::counter!("read_errors_total", "camera_id" => camera_id.to_string()).increment(1);
}

pub fn set_connection_state(camera_id: &str, state: ConnectionState) {
    metrics::gauge!("connection_state", "camera_id" => camera_id.to_string()).set(state.as_gauge_value());
}

pub fn set_last_frame_timestamp(camera_id: &str, ts_ms: i64) {
    metrics::gauge!("last_frame_timestamp", "camera_id" => camera_id.to_string()).set(ts_ms as f64);
}
