// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use super::{DetectionContext, Detector, ObjectDetectorModel};
use crate::config::FireSmokeDetectorConfig;
use crate::event::Detection;
use crate::frame::Frame;

/// Two-label object detector: fire and smoke each carry their own threshold
/// and map to a distinct event `type`.
pub struct FireSmokeDetector {
    fire_labels: HashSet<String>,
    smoke_labels: HashSet<String>,
    fire_threshold: f64,
    smoke_threshold: f64,
    model: Arc<dyn ObjectDetectorModel>,
}

impl FireSmokeDetector {
    pub fn new(config: FireSmokeDetectorConfig, model: Arc<dyn ObjectDetectorModel>) -> Self {
        Self {
            fire_labels: config.fire_labels.into_iter().collect(),
            smoke_labels: config.smoke_labels.into_iter().collect(),
            fire_threshold: config.fire_threshold,
            smoke_threshold: config.smoke_threshold,
            model,
        }
    }
}

impl Detector for FireSmokeDetector {
    fn detector_type(&self) -> &'static str {
        "fire_smoke"
    }

    fn process(&mut self, frame: &Frame, _ts_ms: i64, ctx: &DetectionContext) -> Vec<Detection> {
        let raw = match self.model.infer(frame) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(camera_id = ctx.camera_id, error = %e, "fire/smoke model inference failed");
                crate::metrics::record_detector_failure(ctx.camera_id, self.detector_type());
                return Vec::new();
            }
        };
        raw.into_iter()
            .filter(|d| {
                if self.fire_labels.contains(&d.label) {
                    d.confidence >= self.fire_threshold
                } else if self.smoke_labels.contains(&d.label) {
                    d.confidence >= self.smoke_threshold
                } else {
                    false
                }
            })
            .map(|d| Detection::new(d.label, d.confidence, d.bbox))
            .collect()
    }

    fn event_type(&self, detection: &Detection) -> &str {
        if self.fire_labels.contains(&detection.label) {
            "fire"
        } else if self.smoke_labels.contains(&detection.label) {
            "smoke"
        } else {
            self.detector_type()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::RawDetection;
    use crate::geometry::BBox;
    use image::RgbImage;

    struct StubModel(Vec<RawDetection>);

    impl ObjectDetectorModel for StubModel {
        fn infer(&self, _frame: &Frame) -> anyhow::Result<Vec<RawDetection>> {
            Ok(self.0.clone())
        }
    }

    fn ctx<'a>() -> DetectionContext<'a> {
        DetectionContext {
            camera_id: "cam-A",
            frame_width: 640,
            frame_height: 480,
            roi_polygons: &[],
            roi_mode: crate::geometry::FilterMode::Center,
            roi_min_overlap: 0.0,
            min_bbox_area: 0.0,
        }
    }

    fn frame() -> Frame {
        Frame::new(RgbImage::new(640, 480), 0)
    }

    /// Scenario B: fire fails its threshold, smoke passes and is tagged `smoke`.
    #[test]
    fn split_thresholds_reject_fire_accept_smoke() {
        let model = Arc::new(StubModel(vec![
            RawDetection { label: "fire".to_string(), confidence: 0.58, bbox: BBox::new(0.0, 0.0, 10.0, 10.0) },
            RawDetection { label: "smoke".to_string(), confidence: 0.56, bbox: BBox::new(0.0, 0.0, 10.0, 10.0) },
        ]));
        let config = FireSmokeDetectorConfig {
            model_ref: "m".to_string(),
            fire_labels: vec!["fire".to_string()],
            smoke_labels: vec!["smoke".to_string()],
            fire_threshold: 0.6,
            smoke_threshold: 0.55,
            min_bbox_area: 0.0,
            temporal: Default::default(),
            dedup: Default::default(),
        };
        let mut detector = FireSmokeDetector::new(config, model);
        let out = detector.process(&frame(), 0, &ctx());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "smoke");
        assert_eq!(detector.event_type(&out[0]), "smoke");
    }
}
