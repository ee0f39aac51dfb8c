// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! TOML configuration: publishers, per-camera ROI/detector settings, and the
//! observability HTTP surface.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::FilterMode;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub publishers: PublishersConfig,
    /// Keyed by camera_id — the map key *is* the identifier, so duplicates
    /// are rejected by the TOML parser itself rather than at validation time.
    pub cameras: HashMap<String, CameraConfig>,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { enabled: default_true(), port: default_api_port() }
    }
}

fn default_true() -> bool { true }
fn default_api_port() -> u16 { 8080 }

#[derive(Debug, Deserialize, Clone)]
pub struct PublishersConfig {
    pub stream: StreamPublisherConfig,
    pub snapshot: SnapshotPublisherConfig,
    pub record: RecordPublisherConfig,
}

/// Kinesis-backed event stream sink.
#[derive(Debug, Deserialize, Clone)]
pub struct StreamPublisherConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub stream_name: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    pub region: Option<String>,
}

/// S3-backed snapshot (annotated JPEG) sink.
#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotPublisherConfig {
    #[serde(default)]
    pub enabled: bool,
    pub bucket: String,
    #[serde(default = "default_snapshot_prefix")]
    pub prefix: String,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    pub region: Option<String>,
}

/// DynamoDB-backed record store sink.
#[derive(Debug, Deserialize, Clone)]
pub struct RecordPublisherConfig {
    #[serde(default)]
    pub enabled: bool,
    pub table_name: String,
    pub ttl_days: Option<u64>,
    pub region: Option<String>,
}

fn default_batch_size() -> usize { 500 }
fn default_flush_interval_ms() -> u64 { 1_000 }
fn default_max_retries() -> u32 { 5 }
fn default_base_backoff_ms() -> u64 { 200 }
fn default_max_backoff_ms() -> u64 { 10_000 }
fn default_snapshot_prefix() -> String { "snapshots/".to_string() }
fn default_jpeg_quality() -> u8 { 85 }

/// Per-camera configuration. The map key in [`Config::cameras`] is the
/// camera_id; this struct holds everything else.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Upstream stream identifier passed to the video service for URL
    /// resolution. May contain `${camera_id}`.
    pub stream_name: String,
    #[serde(default = "default_fps_target")]
    pub fps_target: u32,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub roi: RoiConfig,
    #[serde(default)]
    pub detectors: Vec<DetectorConfig>,
}

fn default_fps_target() -> u32 { 5 }

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlaybackConfig {
    #[serde(default = "default_session_seconds")]
    pub session_seconds: u64,
    #[serde(default = "default_url_refresh_margin")]
    pub url_refresh_margin_seconds: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            session_seconds: default_session_seconds(),
            url_refresh_margin_seconds: default_url_refresh_margin(),
        }
    }
}

fn default_session_seconds() -> u64 { 300 }
fn default_url_refresh_margin() -> u64 { 30 }

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RoiConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Each inner vec is one polygon, as (x, y) pairs in frame pixel space.
    #[serde(default)]
    pub polygons: Vec<Vec<(f64, f64)>>,
    #[serde(default)]
    pub filter_mode: FilterModeConfig,
    #[serde(default = "default_min_overlap")]
    pub min_overlap: f64,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            polygons: Vec::new(),
            filter_mode: FilterModeConfig::default(),
            min_overlap: default_min_overlap(),
        }
    }
}

fn default_min_overlap() -> f64 { 0.5 }

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterModeConfig {
    #[default]
    Center,
    Any,
    All,
    Overlap,
}

impl From<FilterModeConfig> for FilterMode {
    fn from(value: FilterModeConfig) -> Self {
        match value {
            FilterModeConfig::Center => FilterMode::Center,
            FilterModeConfig::Any => FilterMode::Any,
            FilterModeConfig::All => FilterMode::All,
            FilterModeConfig::Overlap => FilterMode::Overlap,
        }
    }
}

/// Confirmation and deduplication windows shared by every detector kind.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TemporalConfig {
    /// K: number of recent frames considered.
    #[serde(default = "default_temporal_window")]
    pub window: usize,
    /// M: minimum matches within the window required to confirm (M <= K).
    #[serde(default = "default_min_confirmations")]
    pub min_confirmations: usize,
    /// IoU threshold above which two boxes are considered the same track.
    #[serde(default = "default_temporal_iou")]
    pub iou: f64,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            window: default_temporal_window(),
            min_confirmations: default_min_confirmations(),
            iou: default_temporal_iou(),
        }
    }
}

fn default_temporal_window() -> usize { 5 }
fn default_min_confirmations() -> usize { 3 }
fn default_temporal_iou() -> f64 { 0.3 }

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DedupConfig {
    /// W: suppression window, in frames.
    #[serde(default = "default_dedup_window")]
    pub window: usize,
    /// G: grid cell size (pixels) used to bucket box centers.
    #[serde(default = "default_grid_size")]
    pub grid_size: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { window: default_dedup_window(), grid_size: default_grid_size() }
    }
}

fn default_dedup_window() -> usize { 30 }
fn default_grid_size() -> f64 { 32.0 }

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectorConfig {
    Weapon(WeaponDetectorConfig),
    FireSmoke(FireSmokeDetectorConfig),
    Alpr(AlprDetectorConfig),
}

impl DetectorConfig {
    pub fn temporal(&self) -> &TemporalConfig {
        match self {
            DetectorConfig::Weapon(c) => &c.temporal,
            DetectorConfig::FireSmoke(c) => &c.temporal,
            DetectorConfig::Alpr(c) => &c.temporal,
        }
    }

    pub fn dedup(&self) -> &DedupConfig {
        match self {
            DetectorConfig::Weapon(c) => &c.dedup,
            DetectorConfig::FireSmoke(c) => &c.dedup,
            DetectorConfig::Alpr(c) => &c.dedup,
        }
    }

    pub fn min_bbox_area(&self) -> f64 {
        match self {
            DetectorConfig::Weapon(c) => c.min_bbox_area,
            DetectorConfig::FireSmoke(c) => c.min_bbox_area,
            DetectorConfig::Alpr(c) => c.min_bbox_area,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WeaponDetectorConfig {
    pub model_ref: String,
    pub labels: Vec<String>,
    pub confidence_threshold: f64,
    #[serde(default = "default_min_bbox_area")]
    pub min_bbox_area: f64,
    #[serde(default)]
    pub temporal: TemporalConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FireSmokeDetectorConfig {
    pub model_ref: String,
    #[serde(default)]
    pub fire_labels: Vec<String>,
    #[serde(default)]
    pub smoke_labels: Vec<String>,
    pub fire_threshold: f64,
    pub smoke_threshold: f64,
    #[serde(default = "default_min_bbox_area")]
    pub min_bbox_area: f64,
    #[serde(default)]
    pub temporal: TemporalConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
}

fn default_min_bbox_area() -> f64 { 0.0 }

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AlprDetectorConfig {
    pub model_ref: String,
    pub confidence_threshold: f64,
    #[serde(default = "default_crop_expand")]
    pub crop_expand: f64,
    pub ocr_engine: String,
    #[serde(default = "default_ocr_lang")]
    pub ocr_lang: String,
    #[serde(default = "default_ocr_conf_threshold")]
    pub ocr_conf_threshold: f64,
    #[serde(default = "default_min_bbox_area")]
    pub min_bbox_area: f64,
    #[serde(default)]
    pub temporal: TemporalConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
}

fn default_crop_expand() -> f64 { 0.15 }
fn default_ocr_lang() -> String { "en".to_string() }
fn default_ocr_conf_threshold() -> f64 { 0.6 }

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read config file: {e}")))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.cameras.is_empty() {
            return Err(Error::Config("no cameras defined".into()));
        }
        for (camera_id, camera) in &self.cameras {
            camera.validate(camera_id)?;
        }
        if self.publishers.stream.batch_size == 0 || self.publishers.stream.batch_size > 500 {
            return Err(Error::Config(
                "publishers.stream.batch_size must be in 1..=500".into(),
            ));
        }
        Ok(())
    }
}

impl CameraConfig {
    fn validate(&self, camera_id: &str) -> Result<()> {
        if self.fps_target == 0 {
            return Err(Error::Config(format!(
                "camera '{camera_id}': fps_target must be > 0"
            )));
        }
        if self.roi.enabled {
            if self.roi.polygons.is_empty() {
                return Err(Error::Config(format!(
                    "camera '{camera_id}': roi.enabled is true but no polygons are defined"
                )));
            }
            for polygon in &self.roi.polygons {
                if polygon.len() < 3 {
                    return Err(Error::Config(format!(
                        "camera '{camera_id}': roi polygon must have at least 3 points"
                    )));
                }
            }
            if !(0.0..=1.0).contains(&self.roi.min_overlap) {
                return Err(Error::Config(format!(
                    "camera '{camera_id}': roi.min_overlap must be in [0, 1]"
                )));
            }
        }
        for detector in &self.detectors {
            detector.validate(camera_id)?;
        }
        Ok(())
    }
}

fn validate_unit_threshold(camera_id: &str, field: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::Config(format!(
            "camera '{camera_id}': {field} must be in [0, 1], got {value}"
        )));
    }
    Ok(())
}

impl DetectorConfig {
    fn validate(&self, camera_id: &str) -> Result<()> {
        let temporal = self.temporal();
        if temporal.min_confirmations == 0 || temporal.min_confirmations > temporal.window {
            return Err(Error::Config(format!(
                "camera '{camera_id}': temporal.min_confirmations must be in 1..=window"
            )));
        }
        validate_unit_threshold(camera_id, "temporal.iou", temporal.iou)?;
        match self {
            DetectorConfig::Weapon(c) => {
                validate_unit_threshold(camera_id, "weapon.confidence_threshold", c.confidence_threshold)?;
                if c.labels.is_empty() {
                    return Err(Error::Config(format!(
                        "camera '{camera_id}': weapon detector needs at least one label"
                    )));
                }
            }
            DetectorConfig::FireSmoke(c) => {
                validate_unit_threshold(camera_id, "fire_smoke.fire_threshold", c.fire_threshold)?;
                validate_unit_threshold(camera_id, "fire_smoke.smoke_threshold", c.smoke_threshold)?;
                if c.fire_labels.is_empty() && c.smoke_labels.is_empty() {
                    return Err(Error::Config(format!(
                        "camera '{camera_id}': fire_smoke detector needs fire_labels or smoke_labels"
                    )));
                }
            }
            DetectorConfig::Alpr(c) => {
                validate_unit_threshold(camera_id, "alpr.confidence_threshold", c.confidence_threshold)?;
                validate_unit_threshold(camera_id, "alpr.ocr_conf_threshold", c.ocr_conf_threshold)?;
                if c.crop_expand < 0.0 {
                    return Err(Error::Config(format!(
                        "camera '{camera_id}': alpr.crop_expand must be >= 0"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Expands `${camera_id}` and `${VAR}` (read from the process environment)
/// placeholders in configuration strings such as `stream_name` or `model_ref`.
/// Unknown `${VAR}` references are left untouched rather than erroring, since
/// a missing optional override should not crash startup.
pub fn expand_placeholders(input: &str, camera_id: &str) -> String {
    let with_camera = input.replace("${camera_id}", camera_id);
    expand_env_vars(&with_camera)
}

fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            out.push_str(rest);
            return out;
        };
        let end = start + end;
        out.push_str(&rest[..start]);
        let var_name = &rest[start + 2..end];
        match std::env::var(var_name) {
            Ok(value) => out.push_str(&value),
            Err(_) => {
                out.push_str("${");
                out.push_str(var_name);
                out.push('}');
            }
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_camera_id_placeholder() {
        assert_eq!(
            expand_placeholders("rtsp://cams/${camera_id}/live", "lobby-1"),
            "rtsp://cams/lobby-1/live"
        );
    }

    #[test]
    fn expands_known_env_var() {
        std::env::set_var("MULTICAM_INFER_TEST_VAR", "secret-value");
        assert_eq!(
            expand_placeholders("token=${MULTICAM_INFER_TEST_VAR}", "cam"),
            "token=secret-value"
        );
        std::env::remove_var("MULTICAM_INFER_TEST_VAR");
    }

    #[test]
    fn leaves_unknown_env_var_untouched() {
        assert_eq!(
            expand_placeholders("x=${MULTICAM_INFER_DOES_NOT_EXIST}", "cam"),
            "x=${MULTICAM_INFER_DOES_NOT_EXIST}"
        );
    }

    fn base_camera() -> CameraConfig {
        CameraConfig {
            enabled: true,
            stream_name: "cam-1".to_string(),
            fps_target: 5,
            playback: PlaybackConfig::default(),
            roi: RoiConfig::default(),
            detectors: Vec::new(),
        }
    }

    #[test]
    fn rejects_roi_polygon_with_fewer_than_three_points() {
        let mut cam = base_camera();
        cam.roi.enabled = true;
        cam.roi.polygons = vec![vec![(0.0, 0.0), (1.0, 1.0)]];
        assert!(cam.validate("cam-1").is_err());
    }

    #[test]
    fn rejects_threshold_outside_unit_range() {
        let mut cam = base_camera();
        cam.detectors.push(DetectorConfig::Weapon(WeaponDetectorConfig {
            model_ref: "m".to_string(),
            labels: vec!["knife".to_string()],
            confidence_threshold: 1.5,
            min_bbox_area: 0.0,
            temporal: TemporalConfig::default(),
            dedup: DedupConfig::default(),
        }));
        assert!(cam.validate("cam-1").is_err());
    }

    #[test]
    fn accepts_well_formed_camera() {
        let mut cam = base_camera();
        cam.roi.enabled = true;
        cam.roi.polygons = vec![vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]];
        cam.detectors.push(DetectorConfig::Weapon(WeaponDetectorConfig {
            model_ref: "m".to_string(),
            labels: vec!["knife".to_string()],
            confidence_threshold: 0.5,
            min_bbox_area: 0.0,
            temporal: TemporalConfig::default(),
            dedup: DedupConfig::default(),
        }));
        assert!(cam.validate("cam-1").is_ok());
    }
}
