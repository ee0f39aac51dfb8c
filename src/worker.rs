// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Per-camera worker task: pulls frames, runs the configured detector
//! pipeline, and fans confirmed events out to the enabled sinks.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::CameraConfig;
use crate::detector::{DetectionContext, Detector};
use crate::error::Error;
use crate::event::{Event, EventEnvelope};
use crate::filter::{FilterOutcome, TemporalRoiFilter};
use crate::frame_source::FrameSource;
use crate::geometry::Polygon;
use crate::publisher::{Publisher, RecordPublisher, SnapshotPublisher, StreamPublisher};

/// Shared sink handles. `stream`/`record` are `None` when their sink is
/// disabled in configuration; `snapshot` likewise.
pub struct Publishers {
    pub stream: Option<Arc<StreamPublisher>>,
    pub record: Option<Arc<RecordPublisher>>,
    pub snapshot: Option<Arc<SnapshotPublisher>>,
}

struct ConfiguredDetector {
    detector: Box<dyn Detector>,
    filter: TemporalRoiFilter,
}

/// One camera's inference loop. Owns its [`FrameSource`] exclusively; never
/// shares it with another task.
pub struct CameraWorker {
    camera_id: String,
    frame_source: Box<dyn FrameSource>,
    detectors: Vec<ConfiguredDetector>,
    publishers: Arc<Publishers>,
    fps_target: u32,
    roi_polygons: Vec<Polygon>,
    roi_mode: crate::geometry::FilterMode,
    roi_min_overlap: f64,
    cancel: CancellationToken,
}

impl CameraWorker {
    pub fn new(
        camera_id: impl Into<String>,
        config: &CameraConfig,
        frame_source: Box<dyn FrameSource>,
        detectors: Vec<(Box<dyn Detector>, TemporalRoiFilter)>,
        publishers: Arc<Publishers>,
        cancel: CancellationToken,
    ) -> Self {
        let roi_polygons = if config.roi.enabled {
            config
                .roi
                .polygons
                .iter()
                .cloned()
                .map(Polygon::new)
                .filter(Polygon::is_valid)
                .collect()
        } else {
            Vec::new()
        };
        Self {
            camera_id: camera_id.into(),
            frame_source,
            detectors: detectors
                .into_iter()
                .map(|(detector, filter)| ConfiguredDetector { detector, filter })
                .collect(),
            publishers,
            fps_target: config.fps_target.max(1),
            roi_polygons,
            roi_mode: config.roi.filter_mode.into(),
            roi_min_overlap: config.roi.min_overlap,
            cancel,
        }
    }

    /// Runs until the frame source fails terminally or `cancel` fires.
    pub async fn run(mut self) {
        if let Err(e) = self.frame_source.open() {
            error!(camera_id = %self.camera_id, error = %e, "failed to open frame source, worker exiting");
            crate::metrics::set_worker_alive(&self.camera_id, false);
            return;
        }
        crate::metrics::set_worker_alive(&self.camera_id, true);
        info!(camera_id = %self.camera_id, "worker started");

        let period = Duration::from_secs_f64(1.0 / self.fps_target as f64);
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(camera_id = %self.camera_id, "worker cancelled");
                    break;
                }
                _ = tick.tick() => {
                    match self.frame_source.next_frame().await {
                        Ok(frame) => self.process_frame(&frame).await,
                        Err(Error::FrameSourceTerminal { reason, .. }) => {
                            error!(camera_id = %self.camera_id, %reason, "frame source failed terminally, worker exiting");
                            break;
                        }
                        Err(e) => {
                            warn!(camera_id = %self.camera_id, error = %e, "frame source returned a non-terminal error");
                        }
                    }
                }
            }
        }

        self.frame_source.close();
        crate::metrics::set_worker_alive(&self.camera_id, false);
    }

    async fn process_frame(&mut self, frame: &crate::frame::Frame) {
        let start = std::time::Instant::now();
        let ctx = DetectionContext {
            camera_id: &self.camera_id,
            frame_width: frame.width(),
            frame_height: frame.height(),
            roi_polygons: &self.roi_polygons,
            roi_mode: self.roi_mode,
            roi_min_overlap: self.roi_min_overlap,
            min_bbox_area: 0.0,
        };

        let mut confirmed = Vec::new();
        for configured in &mut self.detectors {
            configured.filter.advance_frame();
            let detections = configured.detector.process(frame, frame.ts_ms, &ctx);
            for detection in detections {
                match configured.filter.evaluate(&detection, frame.ts_ms) {
                    FilterOutcome::Confirmed => {
                        let event_type = configured.detector.event_type(&detection).to_string();
                        confirmed.push((event_type, detection));
                    }
                    FilterOutcome::OutsideRoi
                    | FilterOutcome::TooSmall
                    | FilterOutcome::NotYetConfirmed
                    | FilterOutcome::Deduplicated => {}
                }
            }
        }

        crate::metrics::record_frame_processed(&self.camera_id);
        crate::metrics::record_latency_ms(&self.camera_id, start.elapsed().as_secs_f64() * 1000.0);

        if confirmed.is_empty() {
            return;
        }

        for (event_type, detection) in &confirmed {
            crate::metrics::record_event(&self.camera_id, event_type);
        }

        let detections_only: Vec<_> = confirmed.iter().map(|(_, d)| d.clone()).collect();
        if let Some(snapshot) = &self.publishers.snapshot {
            snapshot.save(frame, &self.camera_id, frame.ts_ms, &detections_only).await;
        }

        for (event_type, detection) in confirmed {
            let event = Event::new(
                self.camera_id.clone(),
                event_type,
                detection.label,
                detection.confidence,
                detection.bbox,
                frame.ts_ms,
                detection.extras,
            );
            let envelope = EventEnvelope::wrap(event);
            if let Some(stream) = &self.publishers.stream {
                stream.publish(envelope.clone()).await;
            }
            if let Some(record) = &self.publishers.record {
                record.publish(envelope).await;
            }
        }
    }
}
