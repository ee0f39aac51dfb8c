// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Production [`super::VideoService`] backed by the upstream video
//! service's HTTP API. The only file in this module that imports an HTTP
//! client — `frame_source::mod` and `GstFrameSource` depend only on the
//! trait.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use super::{PlaybackSession, VideoService};
use crate::error::Error;

pub struct HttpVideoService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVideoService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[derive(Deserialize)]
struct ResolveResponse {
    data_endpoint: String,
}

#[derive(Deserialize)]
struct SessionResponse {
    url: String,
    lifetime_seconds: u64,
}

#[async_trait]
impl VideoService for HttpVideoService {
    async fn resolve_data_endpoint(&self, stream_name: &str) -> crate::error::Result<String> {
        let url = format!("{}/streams/{}/resolve", self.base_url, stream_name);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable {
                camera_id: stream_name.to_string(),
                reason: format!("resolve request failed: {e}"),
            })?
            .error_for_status()
            .map_err(|e| Error::UpstreamUnavailable {
                camera_id: stream_name.to_string(),
                reason: format!("resolve returned an error status: {e}"),
            })?
            .json::<ResolveResponse>()
            .await
            .map_err(|e| Error::UpstreamUnavailable {
                camera_id: stream_name.to_string(),
                reason: format!("resolve response was not valid JSON: {e}"),
            })?;
        Ok(resp.data_endpoint)
    }

    async fn fetch_session(&self, data_endpoint: &str, requested_lifetime: Duration) -> crate::error::Result<PlaybackSession> {
        let resp = self
            .client
            .post(data_endpoint)
            .json(&serde_json::json!({ "lifetime_seconds": requested_lifetime.as_secs() }))
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable {
                camera_id: data_endpoint.to_string(),
                reason: format!("session request failed: {e}"),
            })?
            .error_for_status()
            .map_err(|e| Error::UpstreamUnavailable {
                camera_id: data_endpoint.to_string(),
                reason: format!("session returned an error status: {e}"),
            })?
            .json::<SessionResponse>()
            .await
            .map_err(|e| Error::UpstreamUnavailable {
                camera_id: data_endpoint.to_string(),
                reason: format!("session response was not valid JSON: {e}"),
            })?;
        Ok(PlaybackSession {
            url: resp.url,
            fetched_at: Utc::now(),
            lifetime: Duration::from_secs(resp.lifetime_seconds),
        })
    }
}
