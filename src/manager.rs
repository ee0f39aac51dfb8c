// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Process manager: builds the shared publishers, spawns one
//! [`crate::worker::CameraWorker`] per enabled camera, and coordinates
//! graceful shutdown.
//!
//! Supports dynamic camera add/remove at runtime via `add_camera()` and
//! `remove_camera()`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{CameraConfig, Config};
use crate::detector::ModelRegistry;
use crate::error::{Error, Result};
use crate::filter::TemporalRoiFilter;
use crate::frame_source::{GstFrameSource, HttpVideoService};
use crate::publisher::{Publisher, RecordPublisher, SnapshotPublisher, StreamPublisher};
use crate::worker::{CameraWorker, Publishers};

struct WorkerEntry {
    config: CameraConfig,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Top-level orchestrator. One per process.
pub struct ProcessManager {
    workers: HashMap<String, WorkerEntry>,
    publishers: Arc<Publishers>,
    registry: ModelRegistry,
    video_base_url: String,
    root_cancel: CancellationToken,
}

impl ProcessManager {
    /// Builds shared publishers and spawns a worker for every enabled camera.
    /// `registry` must already carry every `model_ref`/`ocr_engine` named by
    /// `config`'s detectors — constructing concrete model/OCR backends is
    /// outside this crate's scope, so the caller registers them ahead of time.
    pub fn new(config: Config, registry: ModelRegistry, video_base_url: impl Into<String>, aws_config: &aws_config::SdkConfig) -> Result<Self> {
        let publishers = Arc::new(build_publishers(&config, aws_config));
        let video_base_url = video_base_url.into();
        let root_cancel = CancellationToken::new();

        let mut workers = HashMap::new();
        for (camera_id, camera_config) in &config.cameras {
            if !camera_config.enabled {
                continue;
            }
            let entry = spawn_worker(camera_id, camera_config, &registry, &publishers, &video_base_url, &root_cancel)?;
            info!(camera_id, "camera registered");
            workers.insert(camera_id.clone(), entry);
        }

        Ok(Self { workers, publishers, registry, video_base_url, root_cancel })
    }

    /// Add a new camera at runtime. Returns an error if the ID already exists.
    pub fn add_camera(&mut self, camera_id: impl Into<String>, camera_config: CameraConfig) -> Result<()> {
        let camera_id = camera_id.into();
        if self.workers.contains_key(&camera_id) {
            return Err(Error::Config(format!("camera '{camera_id}' already exists")));
        }
        let entry = spawn_worker(&camera_id, &camera_config, &self.registry, &self.publishers, &self.video_base_url, &self.root_cancel)?;
        info!(camera_id = %camera_id, "camera added (hot)");
        self.workers.insert(camera_id, entry);
        Ok(())
    }

    /// Remove a camera at runtime. Cancels its worker's token; the worker
    /// exits on its own at the top of its next loop iteration.
    pub fn remove_camera(&mut self, camera_id: &str) -> bool {
        if let Some(entry) = self.workers.remove(camera_id) {
            entry.cancel.cancel();
            info!(camera_id, "camera removed (hot)");
            true
        } else {
            warn!(camera_id, "camera not found for removal");
            false
        }
    }

    pub fn list_cameras(&self) -> Vec<&CameraConfig> {
        self.workers.values().map(|e| &e.config).collect()
    }

    /// Cancels every worker, waits (bounded) for them to exit, flushes every
    /// publisher (bounded), and logs a final summary. Never returns an error
    /// — shutdown always completes, possibly with dropped/failed counts.
    pub async fn shutdown(self, worker_join_timeout: Duration, flush_deadline: Duration) {
        info!("multicam-infer shutting down");
        self.root_cancel.cancel();

        let joins = self.workers.into_values().map(|entry| async move {
            let camera_id = entry.config.stream_name.clone();
            match tokio::time::timeout(worker_join_timeout, entry.handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(%camera_id, error = %e, "worker task panicked"),
                Err(_) => warn!(%camera_id, "worker did not exit within shutdown timeout"),
            }
        });
        futures::future::join_all(joins).await;

        if let Some(stream) = &self.publishers.stream {
            let outcome = stream.flush(flush_deadline).await;
            info!(sink = "stream", published = outcome.published, failed = outcome.failed, dropped = outcome.dropped, "sink flushed");
        }
        if let Some(record) = &self.publishers.record {
            let outcome = record.flush(flush_deadline).await;
            info!(sink = "record", published = outcome.published, failed = outcome.failed, dropped = outcome.dropped, "sink flushed");
        }
        if let Some(snapshot) = &self.publishers.snapshot {
            let outcome = snapshot.flush(flush_deadline).await;
            info!(sink = "snapshot", published = outcome.published, failed = outcome.failed, dropped = outcome.dropped, "sink flushed");
        }

        info!("multicam-infer shutdown complete");
    }
}

fn build_publishers(config: &Config, aws_config: &aws_config::SdkConfig) -> Publishers {
    let stream = config
        .publishers
        .stream
        .enabled
        .then(|| Arc::new(StreamPublisher::new(config.publishers.stream.clone(), aws_config)));
    let record = config
        .publishers
        .record
        .enabled
        .then(|| Arc::new(RecordPublisher::new(config.publishers.record.clone(), aws_config)));
    let snapshot = config
        .publishers
        .snapshot
        .enabled
        .then(|| Arc::new(SnapshotPublisher::new(config.publishers.snapshot.clone(), aws_config, None)));
    Publishers { stream, record, snapshot }
}

fn spawn_worker(
    camera_id: &str,
    camera_config: &CameraConfig,
    registry: &ModelRegistry,
    publishers: &Arc<Publishers>,
    video_base_url: &str,
    root_cancel: &CancellationToken,
) -> Result<WorkerEntry> {
    let detectors = camera_config
        .detectors
        .iter()
        .map(|detector_config| {
            let detector = crate::detector::build_detector(detector_config, registry)?;
            let filter = TemporalRoiFilter::new(
                &camera_config.roi,
                detector_config.temporal(),
                detector_config.dedup(),
                detector_config.min_bbox_area(),
            );
            Ok((detector, filter))
        })
        .collect::<Result<Vec<_>>>()?;

    let stream_name = crate::config::expand_placeholders(&camera_config.stream_name, camera_id);
    let video_service = Arc::new(HttpVideoService::new(video_base_url.to_string()));
    let frame_source = Box::new(GstFrameSource::new(
        camera_id.to_string(),
        stream_name,
        video_service,
        Duration::from_secs(camera_config.playback.session_seconds),
        Duration::from_secs(camera_config.playback.url_refresh_margin_seconds),
    ));

    let cancel = root_cancel.child_token();
    let worker = CameraWorker::new(camera_id.to_string(), camera_config, frame_source, detectors, publishers.clone(), cancel.clone());
    let handle = tokio::spawn(worker.run());

    Ok(WorkerEntry { config: camera_config.clone(), cancel, handle })
}
