// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use super::{DetectionContext, Detector, ObjectDetectorModel};
use crate::config::WeaponDetectorConfig;
use crate::event::Detection;
use crate::frame::Frame;

/// Single-label-subset object detector: runs the shared model, keeps only
/// the configured labels above a single confidence threshold.
pub struct WeaponDetector {
    labels: HashSet<String>,
    confidence_threshold: f64,
    model: Arc<dyn ObjectDetectorModel>,
}

impl WeaponDetector {
    pub fn new(config: WeaponDetectorConfig, model: Arc<dyn ObjectDetectorModel>) -> Self {
        Self {
            labels: config.labels.into_iter().collect(),
            confidence_threshold: config.confidence_threshold,
            model,
        }
    }
}

impl Detector for WeaponDetector {
    fn detector_type(&self) -> &'static str {
        "weapon"
    }

    fn process(&mut self, frame: &Frame, _ts_ms: i64, ctx: &DetectionContext) -> Vec<Detection> {
        let raw = match self.model.infer(frame) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(camera_id = ctx.camera_id, error = %e, "weapon model inference failed");
                crate::metrics::record_detector_failure(ctx.camera_id, self.detector_type());
                return Vec::new();
            }
        };
        raw.into_iter()
            .filter(|d| self.labels.contains(&d.label) && d.confidence >= self.confidence_threshold)
            .map(|d| Detection::new(d.label, d.confidence, d.bbox))
            .collect()
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

    #[test]
    fn filters_by_label_and_threshold() {
        let model = Arc::new(StubModel(vec![
            RawDetection { label: "knife".to_string(), confidence: 0.8, bbox: BBox::new(0.0, 0.0, 10.0, 10.0) },
            RawDetection { label: "knife".to_string(), confidence: 0.2, bbox: BBox::new(0.0, 0.0, 10.0, 10.0) },
            RawDetection { label: "person".to_string(), confidence: 0.9, bbox: BBox::new(0.0, 0.0, 10.0, 10.0) },
        ]));
        let config = WeaponDetectorConfig {
            model_ref: "m".to_string(),
            labels: vec!["knife".to_string()],
            confidence_threshold: 0.5,
            min_bbox_area: 0.0,
            temporal: Default::default(),
            dedup: Default::default(),
        };
        let mut detector = WeaponDetector::new(config, model);
        let out = detector.process(&frame(), 0, &ctx());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "knife");
    }

    #[test]
    fn inference_error_yields_zero_detections() {
        struct FailingModel;
        impl ObjectDetectorModel for FailingModel {
            fn infer(&self, _frame: &Frame) -> anyhow::Result<Vec<RawDetection>> {
                anyhow::bail!("model unavailable")
            }
        }
        let config = WeaponDetectorConfig {
            model_ref: "m".to_string(),
            labels: vec!["knife".to_string()],
            confidence_threshold: 0.5,
            min_bbox_area: 0.0,
            temporal: Default::default(),
            dedup: Default::default(),
        };
        let mut detector = WeaponDetector::new(config, Arc::new(FailingModel));
        assert!(detector.process(&frame(), 0, &ctx()).is_empty());
    }
}
