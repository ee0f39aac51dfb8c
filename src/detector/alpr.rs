// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use super::{DetectionContext, Detector, ObjectDetectorModel, OcrEngine};
use crate::config::AlprDetectorConfig;
use crate::event::Detection;
use crate::frame::Frame;
use crate::geometry::BBox;

/// Plate detector + OCR pipeline. Skips the OCR call entirely for plate
/// boxes the ROI mask would reject anyway — the Filter re-checks ROI on
/// every detector's output, but OCR is the expensive step this detector
/// controls, so the pre-check here is what makes "OCR never invoked" for
/// an out-of-mask box actually true rather than just a downstream no-op.
pub struct AlprDetector {
    confidence_threshold: f64,
    crop_expand: f64,
    ocr_conf_threshold: f64,
    model: Arc<dyn ObjectDetectorModel>,
    ocr: Arc<dyn OcrEngine>,
}

impl AlprDetector {
    pub fn new(config: AlprDetectorConfig, model: Arc<dyn ObjectDetectorModel>, ocr: Arc<dyn OcrEngine>) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            crop_expand: config.crop_expand,
            ocr_conf_threshold: config.ocr_conf_threshold,
            model,
            ocr,
        }
    }

    fn expand(&self, bbox: BBox, frame_width: u32, frame_height: u32) -> BBox {
        let w = bbox.x2 - bbox.x1;
        let h = bbox.y2 - bbox.y1;
        let dx = w * self.crop_expand;
        let dy = h * self.crop_expand;
        BBox::new(
            (bbox.x1 - dx).max(0.0),
            (bbox.y1 - dy).max(0.0),
            (bbox.x2 + dx).min(frame_width as f64),
            (bbox.y2 + dy).min(frame_height as f64),
        )
    }
}

impl Detector for AlprDetector {
    fn detector_type(&self) -> &'static str {
        "alpr"
    }

    fn process(&mut self, frame: &Frame, _ts_ms: i64, ctx: &DetectionContext) -> Vec<Detection> {
        let raw = match self.model.infer(frame) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(camera_id = ctx.camera_id, error = %e, "ALPR plate model inference failed");
                crate::metrics::record_detector_failure(ctx.camera_id, self.detector_type());
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        for plate in raw.into_iter().filter(|d| d.confidence >= self.confidence_threshold) {
            if !ctx.roi_admits(&plate.bbox) {
                continue;
            }
            let crop_box = self.expand(plate.bbox, ctx.frame_width, ctx.frame_height);
            if crop_box.is_zero_area() {
                continue;
            }
            let crop = image::imageops::crop_imm(
                &frame.image,
                crop_box.x1 as u32,
                crop_box.y1 as u32,
                (crop_box.x2 - crop_box.x1) as u32,
                (crop_box.y2 - crop_box.y1) as u32,
            )
            .to_image();

            let ocr_result = match self.ocr.read_text(&crop) {
                Ok(r) => r,
                Err(e) => {
                    warn!(camera_id = ctx.camera_id, error = %e, "OCR engine failed on plate crop");
                    continue;
                }
            };
            if ocr_result.confidence < self.ocr_conf_threshold {
                continue;
            }
            let detection = Detection::new(ocr_result.text.clone(), plate.confidence, plate.bbox)
                .with_extra("plate_text", json!(ocr_result.text))
                .with_extra("ocr_confidence", json!(ocr_result.confidence));
            out.push(detection);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::RawDetection;
    use crate::geometry::{FilterMode, Polygon};
    use image::RgbImage;

    struct StubModel(Vec<RawDetection>);
    impl ObjectDetectorModel for StubModel {
        fn infer(&self, _frame: &Frame) -> anyhow::Result<Vec<RawDetection>> {
            Ok(self.0.clone())
        }
    }

    struct CountingOcr {
        calls: std::sync::atomic::AtomicUsize,
    }
    impl OcrEngine for CountingOcr {
        fn read_text(&self, _crop: &RgbImage) -> anyhow::Result<crate::detector::OcrResult> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(crate::detector::OcrResult { text: "ABC123".to_string(), confidence: 0.9 })
        }
    }

    fn frame() -> Frame {
        Frame::new(RgbImage::new(640, 480), 0)
    }

    fn config() -> AlprDetectorConfig {
        AlprDetectorConfig {
            model_ref: "m".to_string(),
            confidence_threshold: 0.5,
            crop_expand: 0.1,
            ocr_engine: "o".to_string(),
            ocr_lang: "en".to_string(),
            ocr_conf_threshold: 0.6,
            min_bbox_area: 0.0,
            temporal: Default::default(),
            dedup: Default::default(),
        }
    }

    /// Scenario C: a plate outside the ROI mask never reaches OCR.
    #[test]
    fn roi_rejection_skips_ocr_entirely() {
        let model = Arc::new(StubModel(vec![RawDetection {
            label: "plate".to_string(),
            confidence: 0.9,
            bbox: BBox::new(150.0, 150.0, 200.0, 200.0),
        }]));
        let ocr = Arc::new(CountingOcr { calls: std::sync::atomic::AtomicUsize::new(0) });
        let mut detector = AlprDetector::new(config(), model, ocr.clone());

        let polygon = Polygon::new(vec![(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)]);
        let polygons = [polygon];
        let ctx = DetectionContext {
            camera_id: "cam-A",
            frame_width: 640,
            frame_height: 480,
            roi_polygons: &polygons,
            roi_mode: FilterMode::Center,
            roi_min_overlap: 0.0,
            min_bbox_area: 0.0,
        };

        let out = detector.process(&frame(), 0, &ctx);
        assert!(out.is_empty());
        assert_eq!(ocr.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn ocr_below_threshold_is_discarded() {
        struct LowConfOcr;
        impl OcrEngine for LowConfOcr {
            fn read_text(&self, _crop: &RgbImage) -> anyhow::Result<crate::detector::OcrResult> {
                Ok(crate::detector::OcrResult { text: "XYZ".to_string(), confidence: 0.1 })
            }
        }
        let model = Arc::new(StubModel(vec![RawDetection {
            label: "plate".to_string(),
            confidence: 0.9,
            bbox: BBox::new(10.0, 10.0, 50.0, 50.0),
        }]));
        let mut detector = AlprDetector::new(config(), model, Arc::new(LowConfOcr));
        let ctx = DetectionContext {
            camera_id: "cam-A",
            frame_width: 640,
            frame_height: 480,
            roi_polygons: &[],
            roi_mode: FilterMode::Center,
            roi_min_overlap: 0.0,
            min_bbox_area: 0.0,
        };
        assert!(detector.process(&frame(), 0, &ctx).is_empty());
    }

    /// The dedup key downstream is `detection.label` — it must be the
    /// recognised plate text, not a constant, or distinct plates in the same
    /// grid cell would suppress each other.
    #[test]
    fn label_is_the_recognised_plate_text() {
        let model = Arc::new(StubModel(vec![RawDetection {
            label: "plate".to_string(),
            confidence: 0.9,
            bbox: BBox::new(10.0, 10.0, 50.0, 50.0),
        }]));
        let ocr = Arc::new(CountingOcr { calls: std::sync::atomic::AtomicUsize::new(0) });
        let mut detector = AlprDetector::new(config(), model, ocr);
        let ctx = DetectionContext {
            camera_id: "cam-A",
            frame_width: 640,
            frame_height: 480,
            roi_polygons: &[],
            roi_mode: FilterMode::Center,
            roi_min_overlap: 0.0,
            min_bbox_area: 0.0,
        };
        let out = detector.process(&frame(), 0, &ctx);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "ABC123");
    }
}
