// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Per-detector-instance pipeline: ROI mask, minimum size, temporal
//! confirmation, then burst dedup. Each [`crate::worker::CameraWorker`] owns
//! one [`TemporalRoiFilter`] per configured detector.

use std::collections::VecDeque;

use crate::config::{DedupConfig, RoiConfig, TemporalConfig};
use crate::event::Detection;
use crate::geometry::{self, BBox, FilterMode, Polygon};

/// Bounded FIFO, oldest entry dropped once `capacity` is reached. Backs both
/// the temporal confirmation window and the dedup history.
#[derive(Debug, Clone)]
struct RingBuffer<T> {
    capacity: usize,
    entries: VecDeque<T>,
}

impl<T> RingBuffer<T> {
    fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: VecDeque::with_capacity(capacity.max(1)) }
    }

    fn push(&mut self, item: T) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(item);
    }

    fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        self.entries.retain(|e| keep(e));
    }
}

#[derive(Debug, Clone)]
struct TemporalEntry {
    bbox: BBox,
    label: String,
    frame_seq: u64,
}

#[derive(Debug, Clone)]
struct DedupEntry {
    label: String,
    cell: (i64, i64),
    frame_seq: u64,
}

/// Outcome of running one raw [`Detection`] through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Passed every stage; emit an event.
    Confirmed,
    /// Rejected by the ROI mask.
    OutsideRoi,
    /// Rejected by the minimum bbox area.
    TooSmall,
    /// Has not yet accumulated `min_confirmations` matches in the window.
    NotYetConfirmed,
    /// Confirmed, but suppressed — an equivalent event fired within the
    /// dedup window for the same label/grid cell.
    Deduplicated,
}

/// Runs the ROI -> min-size -> temporal-confirmation -> dedup pipeline for
/// one detector instance on one camera. Not `Send`-shared: each
/// [`crate::worker::CameraWorker`] owns its filters exclusively.
pub struct TemporalRoiFilter {
    roi_polygons: Vec<Polygon>,
    roi_mode: FilterMode,
    roi_min_overlap: f64,
    min_bbox_area: f64,
    temporal_iou: f64,
    min_confirmations: usize,
    temporal: RingBuffer<TemporalEntry>,
    dedup_window: u64,
    grid_size: f64,
    dedup: RingBuffer<DedupEntry>,
    frame_seq: u64,
}

impl TemporalRoiFilter {
    pub fn new(roi: &RoiConfig, temporal: &TemporalConfig, dedup: &DedupConfig, min_bbox_area: f64) -> Self {
        let roi_polygons = if roi.enabled {
            roi.polygons
                .iter()
                .cloned()
                .map(Polygon::new)
                .filter(Polygon::is_valid)
                .collect()
        } else {
            Vec::new()
        };
        Self {
            roi_polygons,
            roi_mode: roi.filter_mode.into(),
            roi_min_overlap: roi.min_overlap,
            min_bbox_area,
            temporal_iou: temporal.iou,
            min_confirmations: temporal.min_confirmations,
            temporal: RingBuffer::new(temporal.window),
            dedup_window: dedup.window as u64,
            grid_size: dedup.grid_size,
            dedup: RingBuffer::new(dedup.window),
            frame_seq: 0,
        }
    }

    /// Must be called once per processed frame, before any `evaluate` calls
    /// for that frame, so the temporal window's recency is frame-accurate
    /// even across frames with zero detections.
    pub fn advance_frame(&mut self) {
        self.frame_seq += 1;
    }

    /// Runs one raw detection through the pipeline for the current frame.
    /// `_ts_ms` mirrors spec's `filter.apply(raw, ts_ms)` signature; dedup and
    /// temporal confirmation are both keyed on frame sequence, not wall clock.
    pub fn evaluate(&mut self, detection: &Detection, _ts_ms: i64) -> FilterOutcome {
        if !geometry::roi_admits(
            &self.roi_polygons,
            &detection.bbox,
            self.roi_mode,
            self.roi_min_overlap,
        ) {
            return FilterOutcome::OutsideRoi;
        }
        if detection.bbox.area() < self.min_bbox_area {
            return FilterOutcome::TooSmall;
        }

        self.temporal.push(TemporalEntry {
            bbox: detection.bbox,
            label: detection.label.clone(),
            frame_seq: self.frame_seq,
        });
        let matches = self
            .temporal
            .iter()
            .filter(|e| e.label == detection.label && e.bbox.iou(&detection.bbox) >= self.temporal_iou)
            .count();
        if matches < self.min_confirmations {
            return FilterOutcome::NotYetConfirmed;
        }

        let cell = geometry::grid_cell(detection.bbox.center(), self.grid_size);
        let frame_seq = self.frame_seq;
        let window = self.dedup_window;
        self.dedup.retain(|e| frame_seq.saturating_sub(e.frame_seq) <= window);
        let suppressed = self
            .dedup
            .iter()
            .any(|e| e.label == detection.label && e.cell == cell && frame_seq.saturating_sub(e.frame_seq) <= window);
        if suppressed {
            return FilterOutcome::Deduplicated;
        }
        self.dedup.push(DedupEntry { label: detection.label.clone(), cell, frame_seq });
        FilterOutcome::Confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterModeConfig;

    fn no_roi() -> RoiConfig {
        RoiConfig { enabled: false, polygons: vec![], filter_mode: FilterModeConfig::Center, min_overlap: 0.0 }
    }

    fn temporal(window: usize, min_confirmations: usize) -> TemporalConfig {
        TemporalConfig { window, min_confirmations, iou: 0.3 }
    }

    fn dedup(window: usize, grid_size: f64) -> DedupConfig {
        DedupConfig { window, grid_size }
    }

    fn det(label: &str, bbox: BBox) -> Detection {
        Detection::new(label, 0.9, bbox)
    }

    #[test]
    fn rejects_outside_roi() {
        let roi = RoiConfig {
            enabled: true,
            polygons: vec![vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]],
            filter_mode: FilterModeConfig::Center,
            min_overlap: 0.0,
        };
        let mut f = TemporalRoiFilter::new(&roi, &temporal(3, 1), &dedup(1000, 16.0), 0.0);
        f.advance_frame();
        let outcome = f.evaluate(&det("gun", BBox::new(100.0, 100.0, 110.0, 110.0)), 0);
        assert_eq!(outcome, FilterOutcome::OutsideRoi);
    }

    #[test]
    fn rejects_below_min_size() {
        let mut f = TemporalRoiFilter::new(&no_roi(), &temporal(3, 1), &dedup(1000, 16.0), 1000.0);
        f.advance_frame();
        let outcome = f.evaluate(&det("gun", BBox::new(0.0, 0.0, 5.0, 5.0)), 0);
        assert_eq!(outcome, FilterOutcome::TooSmall);
    }

    /// Property: confirmation requires >=M matches within the K-frame window,
    /// and is monotonic — fewer than M matching frames never confirms.
    #[test]
    fn requires_min_confirmations_before_confirming() {
        let mut f = TemporalRoiFilter::new(&no_roi(), &temporal(5, 3), &dedup(1000, 16.0), 0.0);
        let bbox = BBox::new(10.0, 10.0, 50.0, 50.0);
        for i in 0..2 {
            f.advance_frame();
            let outcome = f.evaluate(&det("gun", bbox), i * 100);
            assert_eq!(outcome, FilterOutcome::NotYetConfirmed);
        }
        f.advance_frame();
        let outcome = f.evaluate(&det("gun", bbox), 200);
        assert_eq!(outcome, FilterOutcome::Confirmed);
    }

    /// Property: once confirmed, an equivalent detection within the dedup
    /// window (frames) and same grid cell is suppressed exactly once —
    /// idempotent, not re-triggered every frame.
    #[test]
    fn dedup_suppresses_repeat_within_window() {
        let mut f = TemporalRoiFilter::new(&no_roi(), &temporal(3, 1), &dedup(5, 16.0), 0.0);
        let bbox = BBox::new(10.0, 10.0, 50.0, 50.0);
        f.advance_frame();
        assert_eq!(f.evaluate(&det("gun", bbox), 0), FilterOutcome::Confirmed);
        f.advance_frame();
        assert_eq!(f.evaluate(&det("gun", bbox), 0), FilterOutcome::Deduplicated);
        f.advance_frame();
        assert_eq!(f.evaluate(&det("gun", bbox), 0), FilterOutcome::Deduplicated);
    }

    #[test]
    fn dedup_window_expiry_allows_retrigger() {
        let mut f = TemporalRoiFilter::new(&no_roi(), &temporal(3, 1), &dedup(1, 16.0), 0.0);
        let bbox = BBox::new(10.0, 10.0, 50.0, 50.0);
        f.advance_frame();
        assert_eq!(f.evaluate(&det("gun", bbox), 0), FilterOutcome::Confirmed);
        f.advance_frame();
        assert_eq!(f.evaluate(&det("gun", bbox), 0), FilterOutcome::Deduplicated);
        f.advance_frame();
        f.advance_frame();
        assert_eq!(f.evaluate(&det("gun", bbox), 0), FilterOutcome::Confirmed);
    }

    #[test]
    fn different_labels_do_not_share_temporal_history() {
        let mut f = TemporalRoiFilter::new(&no_roi(), &temporal(3, 2), &dedup(1000, 16.0), 0.0);
        let bbox = BBox::new(10.0, 10.0, 50.0, 50.0);
        f.advance_frame();
        assert_eq!(f.evaluate(&det("gun", bbox), 0), FilterOutcome::NotYetConfirmed);
        f.advance_frame();
        assert_eq!(f.evaluate(&det("knife", bbox), 100), FilterOutcome::NotYetConfirmed);
    }
}
