// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Frame acquisition: the connection state machine, playback URL lifecycle,
//! and the production GStreamer-backed implementation.

pub mod backoff;
pub mod gst_source;
pub mod video_service_http;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::frame::Frame;

pub use gst_source::GstFrameSource;
pub use video_service_http::HttpVideoService;

/// Mirrors the state machine: `DISCONNECTED -> CONNECTING -> STREAMING`,
/// with `STREAMING <-> RECONNECTING` on transient failure or URL expiry,
/// and `RECONNECTING -> FAILED` once retries are exhausted. Numeric values
/// back the `connection_state` gauge (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Streaming = 2,
    Reconnecting = 3,
    Failed = 4,
}

impl ConnectionState {
    pub fn as_gauge_value(self) -> f64 {
        self as i32 as f64
    }
}

/// A time-limited playback URL issued by the upstream video service.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub url: String,
    pub fetched_at: DateTime<Utc>,
    pub lifetime: Duration,
}

impl PlaybackSession {
    /// True once `now + margin >= fetched_at + lifetime`.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::zero());
        let lifetime = chrono::Duration::from_std(self.lifetime).unwrap_or(chrono::Duration::zero());
        now + margin >= self.fetched_at + lifetime
    }
}

/// Two-step upstream call: resolve a stream name to a data endpoint, then
/// exchange that endpoint for a session URL. Expressed as a trait so the
/// concrete HTTP client is swappable/mockable; the production
/// implementation ([`HttpVideoService`]) is the only place in this module
/// that imports an HTTP client.
#[async_trait]
pub trait VideoService: Send + Sync {
    async fn resolve_data_endpoint(&self, stream_name: &str) -> Result<String>;
    async fn fetch_session(&self, data_endpoint: &str, requested_lifetime: Duration) -> Result<PlaybackSession>;
}

/// Contract a [`crate::worker::CameraWorker`] drives. Single-consumer: the
/// owning Worker never calls `next_frame` concurrently with itself.
#[async_trait]
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<()>;
    async fn next_frame(&mut self) -> Result<Frame>;
    fn close(&mut self);
    fn state(&self) -> ConnectionState;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_triggers_within_margin_of_expiry() {
        let fetched_at = Utc::now() - chrono::Duration::seconds(270);
        let session = PlaybackSession { url: "u".to_string(), fetched_at, lifetime: Duration::from_secs(300) };
        assert!(session.needs_refresh(Utc::now(), Duration::from_secs(30)));
    }

    #[test]
    fn no_refresh_well_before_expiry() {
        let fetched_at = Utc::now();
        let session = PlaybackSession { url: "u".to_string(), fetched_at, lifetime: Duration::from_secs(300) };
        assert!(!session.needs_refresh(Utc::now(), Duration::from_secs(30)));
    }
}
