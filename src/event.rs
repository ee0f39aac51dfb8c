//! Detections, confirmed events, and the wire envelope sent to every sink.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::geometry::BBox;

/// Raw detector output. Ephemeral — lives only within one frame's processing.
#[derive(Debug, Clone)]
pub struct Detection {
    pub label: String,
    pub confidence: f64,
    pub bbox: BBox,
    pub extras: serde_json::Map<String, serde_json::Value>,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f64, bbox: BBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
            extras: serde_json::Map::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }
}

/// A confirmed detection, ready for publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub camera_id: String,
    /// e.g. "weapon", "fire", "smoke", "alpr" — open, not a closed enum, so
    /// a recompiled detector can introduce a new type.
    #[serde(rename = "type")]
    pub event_type: String,
    pub label: String,
    pub conf: f64,
    pub bbox: [f64; 4],
    pub ts_ms: i64,
    pub extras: serde_json::Map<String, serde_json::Value>,
    pub event_id: String,
}

impl Event {
    pub fn new(
        camera_id: impl Into<String>,
        event_type: impl Into<String>,
        label: impl Into<String>,
        conf: f64,
        bbox: BBox,
        ts_ms: i64,
        extras: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let camera_id = camera_id.into();
        let event_type = event_type.into();
        let label = label.into();
        let event_id = compute_event_id(&camera_id, &event_type, &label, ts_ms);
        Self {
            camera_id,
            event_type,
            label,
            conf,
            bbox: [bbox.x1, bbox.y1, bbox.x2, bbox.y2],
            ts_ms,
            extras,
            event_id,
        }
    }
}

/// Collapses a timestamp to its 1-second bucket representative (ms).
pub fn bucket_ms(ts_ms: i64) -> i64 {
    (ts_ms.div_euclid(1000)) * 1000
}

/// `SHA1(camera_id ":" type ":" label ":" bucket(ts_ms, 1s))`, hex-encoded.
/// Bucketing collapses bursts of near-simultaneous duplicates into one id.
pub fn compute_event_id(camera_id: &str, event_type: &str, label: &str, ts_ms: i64) -> String {
    let bucket = bucket_ms(ts_ms);
    let input = format!("{camera_id}:{event_type}:{label}:{bucket}");
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

pub const PRODUCER: &str = concat!("multicam-infer/", env!("CARGO_PKG_VERSION"));

/// Wire form sent to every sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: String,
    pub camera_id: String,
    pub producer: String,
    pub payload: Event,
}

impl EventEnvelope {
    pub fn wrap(event: Event) -> Self {
        Self {
            event_id: event.event_id.clone(),
            camera_id: event.camera_id.clone(),
            producer: PRODUCER.to_string(),
            payload: event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_deterministic_within_same_second() {
        let id1 = compute_event_id("cam-A", "weapon", "knife", 1_000_123);
        let id2 = compute_event_id("cam-A", "weapon", "knife", 1_000_900);
        assert_eq!(id1, id2);
    }

    #[test]
    fn event_id_differs_across_seconds() {
        let id1 = compute_event_id("cam-A", "weapon", "knife", 1_000_000);
        let id2 = compute_event_id("cam-A", "weapon", "knife", 2_000_000);
        assert_ne!(id1, id2);
    }

    #[test]
    fn event_id_differs_by_camera_type_or_label() {
        let base = compute_event_id("cam-A", "weapon", "knife", 1_000_000);
        assert_ne!(base, compute_event_id("cam-B", "weapon", "knife", 1_000_000));
        assert_ne!(base, compute_event_id("cam-A", "fire", "knife", 1_000_000));
        assert_ne!(base, compute_event_id("cam-A", "weapon", "gun", 1_000_000));
    }

    #[test]
    fn bucket_rounds_down_to_the_second() {
        assert_eq!(bucket_ms(1_999), 1_000);
        assert_eq!(bucket_ms(2_000), 2_000);
        assert_eq!(bucket_ms(0), 0);
    }
}
