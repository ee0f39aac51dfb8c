// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Detector contract and the three configured variants.
//!
//! A [`Detector`] never crashes a [`crate::worker::CameraWorker`]: inference
//! errors are caught at the call site, counted, and treated as zero
//! detections. The external model is injected as a shared `Arc<dyn
//! ObjectDetectorModel>` / `Arc<dyn OcrEngine>` so it may be reused across
//! Workers; the `Detector` wrapper itself holds only config and is
//! Worker-local.

mod alpr;
mod fire_smoke;
mod weapon;

use std::collections::HashMap;
use std::sync::Arc;

use image::RgbImage;

use crate::config::DetectorConfig;
use crate::error::{Error, Result};
use crate::event::Detection;
use crate::frame::Frame;
use crate::geometry::{BBox, FilterMode, Polygon};

pub use alpr::AlprDetector;
pub use fire_smoke::FireSmokeDetector;
pub use weapon::WeaponDetector;

/// Per-call context a [`crate::worker::CameraWorker`] hands to every
/// [`Detector::process`] call: camera identity, frame geometry, and the
/// ROI mask needed by detectors that can skip expensive secondary work
/// (ALPR's OCR pass) for boxes that the Filter would reject anyway.
pub struct DetectionContext<'a> {
    pub camera_id: &'a str,
    pub frame_width: u32,
    pub frame_height: u32,
    pub roi_polygons: &'a [Polygon],
    pub roi_mode: FilterMode,
    pub roi_min_overlap: f64,
    pub min_bbox_area: f64,
}

impl<'a> DetectionContext<'a> {
    /// True if `bbox` would be admitted by the ROI mask under this context's
    /// mode. An empty polygon list always admits.
    pub fn roi_admits(&self, bbox: &BBox) -> bool {
        crate::geometry::roi_admits(self.roi_polygons, bbox, self.roi_mode, self.roi_min_overlap)
    }
}

/// One raw output of an [`ObjectDetectorModel`] inference call.
#[derive(Debug, Clone)]
pub struct RawDetection {
    pub label: String,
    pub confidence: f64,
    pub bbox: BBox,
}

/// The external object-detection model. The core never reasons about
/// weights or GPU allocation; it only calls `infer` and reads back labelled
/// boxes. Implementations must be safe to share across Workers
/// (`Send + Sync`) if the concrete model runtime supports concurrent use.
pub trait ObjectDetectorModel: Send + Sync {
    fn infer(&self, frame: &Frame) -> anyhow::Result<Vec<RawDetection>>;
}

/// Result of an OCR pass over a cropped plate region.
#[derive(Debug, Clone)]
pub struct OcrResult {
    pub text: String,
    pub confidence: f64,
}

/// The external OCR engine used by [`AlprDetector`].
pub trait OcrEngine: Send + Sync {
    fn read_text(&self, crop: &RgbImage) -> anyhow::Result<OcrResult>;
}

/// Contract every detector variant implements. `process` is synchronous —
/// the model call itself may block or be offloaded by its own
/// implementation, but the trait makes no async promise, matching "the
/// detector is stateless w.r.t. video content" from its design.
pub trait Detector: Send {
    fn detector_type(&self) -> &'static str;

    fn process(&mut self, frame: &Frame, ts_ms: i64, ctx: &DetectionContext) -> Vec<Detection>;

    /// Event `type` string to record for one of this detector's detections.
    /// Most detectors emit a single type (`detector_type()`); `FireSmoke`
    /// overrides this to split into `fire` / `smoke` per detection.
    fn event_type(&self, _detection: &Detection) -> &str {
        self.detector_type()
    }
}

/// Shared handles to external model implementations, keyed by the
/// `model_ref` / `ocr_engine` strings named in configuration. Constructed
/// once by the [`crate::manager::ProcessManager`] and passed to every
/// [`build_detector`] call so the same model instance can back every
/// Worker that references it.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    object_models: HashMap<String, Arc<dyn ObjectDetectorModel>>,
    ocr_engines: HashMap<String, Arc<dyn OcrEngine>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_object_model(&mut self, name: impl Into<String>, model: Arc<dyn ObjectDetectorModel>) {
        self.object_models.insert(name.into(), model);
    }

    pub fn register_ocr_engine(&mut self, name: impl Into<String>, engine: Arc<dyn OcrEngine>) {
        self.ocr_engines.insert(name.into(), engine);
    }

    fn object_model(&self, name: &str) -> Result<Arc<dyn ObjectDetectorModel>> {
        self.object_models
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Config(format!("no object detector model registered as '{name}'")))
    }

    fn ocr_engine(&self, name: &str) -> Result<Arc<dyn OcrEngine>> {
        self.ocr_engines
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Config(format!("no OCR engine registered as '{name}'")))
    }
}

/// Builds the configured detector variant, resolving its model reference(s)
/// against `registry`. The `type` tag on [`DetectorConfig`] plays the role
/// of the closed tagged-variant factory the design favors over a runtime
/// registry of plugin constructors.
pub fn build_detector(config: &DetectorConfig, registry: &ModelRegistry) -> Result<Box<dyn Detector>> {
    match config {
        DetectorConfig::Weapon(c) => {
            let model = registry.object_model(&c.model_ref)?;
            Ok(Box::new(WeaponDetector::new(c.clone(), model)))
        }
        DetectorConfig::FireSmoke(c) => {
            let model = registry.object_model(&c.model_ref)?;
            Ok(Box::new(FireSmokeDetector::new(c.clone(), model)))
        }
        DetectorConfig::Alpr(c) => {
            let model = registry.object_model(&c.model_ref)?;
            let ocr = registry.ocr_engine(&c.ocr_engine)?;
            Ok(Box::new(AlprDetector::new(c.clone(), model, ocr)))
        }
    }
}
