//! Bounding boxes, IoU, and ROI polygon membership.
//!
//! No external geometry crate: ray-casting and the `overlap` clip are both
//! small enough to hand-roll, and the spec calls this out explicitly.

/// Axis-aligned bounding box in absolute frame coordinates, `x1<x2, y1<y2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn area(&self) -> f64 {
        let w = (self.x2 - self.x1).max(0.0);
        let h = (self.y2 - self.y1).max(0.0);
        w * h
    }

    pub fn is_zero_area(&self) -> bool {
        self.area() <= 0.0
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.x1, self.y1),
            (self.x2, self.y1),
            (self.x2, self.y2),
            (self.x1, self.y2),
        ]
    }

    fn intersection(&self, other: &BBox) -> f64 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let w = (ix2 - ix1).max(0.0);
        let h = (iy2 - iy1).max(0.0);
        w * h
    }

    /// Intersection-over-Union. `IoU(A,A) == 1` for a non-empty box,
    /// `IoU` of disjoint boxes is `0`, always symmetric.
    pub fn iou(&self, other: &BBox) -> f64 {
        let inter = self.intersection(other);
        if inter <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        (inter / union).clamp(0.0, 1.0)
    }
}

/// Ordered sequence of >=3 points in frame coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon(pub Vec<(f64, f64)>);

impl Polygon {
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self(points)
    }

    pub fn is_valid(&self) -> bool {
        self.0.len() >= 3
    }

    /// Standard even-odd ray-casting test, cast along +x.
    /// A point exactly on an edge is treated as inside.
    pub fn contains(&self, point: (f64, f64)) -> bool {
        let (px, py) = point;
        let n = self.0.len();
        if n < 3 {
            return false;
        }

        if self.point_on_boundary(point) {
            return true;
        }

        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.0[i];
            let (xj, yj) = self.0[j];

            if (yi > py) != (yj > py) {
                let x_cross = xj + (py - yj) / (yi - yj) * (xi - xj);
                if px < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    fn point_on_boundary(&self, point: (f64, f64)) -> bool {
        let (px, py) = point;
        let n = self.0.len();
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.0[i];
            let (xj, yj) = self.0[j];
            if point_on_segment((xj, yj), (xi, yi), (px, py)) {
                return true;
            }
            j = i;
        }
        false
    }

    /// Area of the polygon (shoelace formula, unsigned).
    fn area(&self) -> f64 {
        let n = self.0.len();
        if n < 3 {
            return 0.0;
        }
        let mut sum = 0.0;
        for i in 0..n {
            let (x1, y1) = self.0[i];
            let (x2, y2) = self.0[(i + 1) % n];
            sum += x1 * y2 - x2 * y1;
        }
        (sum / 2.0).abs()
    }

    /// Sutherland-Hodgman clip of `subject` against this (assumed convex)
    /// polygon, used by the `overlap` ROI filter mode to compute the exact
    /// fraction of a bbox's area that falls inside the ROI.
    fn clip(&self, subject: &[(f64, f64)]) -> Vec<(f64, f64)> {
        let mut output = subject.to_vec();
        let n = self.0.len();
        for i in 0..n {
            if output.is_empty() {
                break;
            }
            let edge_a = self.0[i];
            let edge_b = self.0[(i + 1) % n];
            let input = output;
            output = Vec::with_capacity(input.len());
            for k in 0..input.len() {
                let curr = input[k];
                let prev = input[(k + input.len() - 1) % input.len()];
                let curr_in = is_left_of(edge_a, edge_b, curr) >= 0.0;
                let prev_in = is_left_of(edge_a, edge_b, prev) >= 0.0;
                if curr_in {
                    if !prev_in {
                        if let Some(p) = segment_intersection(prev, curr, edge_a, edge_b) {
                            output.push(p);
                        }
                    }
                    output.push(curr);
                } else if prev_in {
                    if let Some(p) = segment_intersection(prev, curr, edge_a, edge_b) {
                        output.push(p);
                    }
                }
            }
        }
        output
    }

    /// Fraction of `bbox`'s area that lies inside this polygon, in `[0,1]`.
    pub fn overlap_ratio(&self, bbox: &BBox) -> f64 {
        if bbox.is_zero_area() {
            return 0.0;
        }
        let rect = vec![
            (bbox.x1, bbox.y1),
            (bbox.x2, bbox.y1),
            (bbox.x2, bbox.y2),
            (bbox.x1, bbox.y2),
        ];
        let clipped = Polygon::new(self.clockwise_winding()).clip(&rect);
        if clipped.len() < 3 {
            return 0.0;
        }
        let clipped_area = Polygon::new(clipped).area();
        (clipped_area / bbox.area()).clamp(0.0, 1.0)
    }

    /// Returns points ordered counter-clockwise (the orientation the
    /// Sutherland-Hodgman clip above assumes for `is_left_of`).
    fn clockwise_winding(&self) -> Vec<(f64, f64)> {
        let signed_area: f64 = {
            let n = self.0.len();
            let mut sum = 0.0;
            for i in 0..n {
                let (x1, y1) = self.0[i];
                let (x2, y2) = self.0[(i + 1) % n];
                sum += x1 * y2 - x2 * y1;
            }
            sum
        };
        if signed_area < 0.0 {
            let mut pts = self.0.clone();
            pts.reverse();
            pts
        } else {
            self.0.clone()
        }
    }
}

fn is_left_of(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> f64 {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
}

fn segment_intersection(
    p1: (f64, f64),
    p2: (f64, f64),
    p3: (f64, f64),
    p4: (f64, f64),
) -> Option<(f64, f64)> {
    let (x1, y1) = p1;
    let (x2, y2) = p2;
    let (x3, y3) = p3;
    let (x4, y4) = p4;
    let denom = (x1 - x2) * (y3 - y4) - (y1 - y2) * (x3 - x4);
    if denom.abs() < 1e-12 {
        return None;
    }
    let t = ((x1 - x3) * (y3 - y4) - (y1 - y3) * (x3 - x4)) / denom;
    Some((x1 + t * (x2 - x1), y1 + t * (y2 - y1)))
}

fn point_on_segment(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> bool {
    let cross = (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0);
    if cross.abs() > 1e-9 {
        return false;
    }
    let dot = (p.0 - a.0) * (b.0 - a.0) + (p.1 - a.1) * (b.1 - a.1);
    if dot < 0.0 {
        return false;
    }
    dot <= (b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)
}

/// ROI acceptance rule applied to a bbox against a set of polygons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Center,
    Any,
    All,
    Overlap,
}

/// Returns true if `bbox` is admitted by at least one polygon under `mode`.
/// An empty polygon list means "no mask" — always admitted.
pub fn roi_admits(polygons: &[Polygon], bbox: &BBox, mode: FilterMode, min_overlap: f64) -> bool {
    if polygons.is_empty() {
        return true;
    }
    polygons.iter().any(|p| match mode {
        FilterMode::Center => p.contains(bbox.center()),
        FilterMode::Any => bbox.corners().iter().any(|&c| p.contains(c)),
        FilterMode::All => bbox.corners().iter().all(|&c| p.contains(c)),
        FilterMode::Overlap => p.overlap_ratio(bbox) >= min_overlap,
    })
}

/// Grid cell coordinate of a point under cell size `g`, used by the dedup key.
pub fn grid_cell(point: (f64, f64), g: f64) -> (i64, i64) {
    let g = g.max(1.0);
    ((point.0 / g).floor() as i64, (point.1 / g).floor() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_self_is_one() {
        let b = BBox::new(10.0, 10.0, 50.0, 50.0);
        assert_eq!(b.iou(&b), 1.0);
    }

    #[test]
    fn iou_disjoint_is_zero() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(100.0, 100.0, 110.0, 110.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_is_symmetric_and_bounded() {
        let a = BBox::new(0.0, 0.0, 20.0, 20.0);
        let b = BBox::new(10.0, 10.0, 30.0, 30.0);
        let ab = a.iou(&b);
        let ba = b.iou(&a);
        assert!((ab - ba).abs() < 1e-12);
        assert!((0.0..=1.0).contains(&ab));
        assert!(ab > 0.0);
    }

    #[test]
    fn ray_cast_square_basic() {
        let square = Polygon::new(vec![(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)]);
        assert!(square.contains((50.0, 50.0)));
        assert!(!square.contains((150.0, 50.0)));
    }

    #[test]
    fn ray_cast_point_on_edge_is_inside() {
        let square = Polygon::new(vec![(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)]);
        assert!(square.contains((50.0, 0.0)));
        assert!(square.contains((100.0, 50.0)));
        assert!(square.contains((0.0, 0.0)));
    }

    #[test]
    fn zero_area_bbox() {
        let b = BBox::new(10.0, 10.0, 10.0, 20.0);
        assert!(b.is_zero_area());
    }

    #[test]
    fn roi_admits_modes() {
        let square = Polygon::new(vec![(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)]);
        let inside = BBox::new(10.0, 10.0, 20.0, 20.0);
        let straddling = BBox::new(90.0, 90.0, 150.0, 150.0);
        let outside = BBox::new(150.0, 150.0, 200.0, 200.0);

        assert!(roi_admits(&[square.clone()], &inside, FilterMode::Center, 0.0));
        assert!(roi_admits(&[square.clone()], &straddling, FilterMode::Any, 0.0));
        assert!(!roi_admits(&[square.clone()], &straddling, FilterMode::All, 0.0));
        assert!(!roi_admits(&[square.clone()], &outside, FilterMode::Any, 0.0));
    }

    #[test]
    fn overlap_ratio_full_containment_is_one() {
        let square = Polygon::new(vec![(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)]);
        let inner = BBox::new(10.0, 10.0, 20.0, 20.0);
        assert!((square.overlap_ratio(&inner) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn overlap_ratio_half_straddling() {
        let square = Polygon::new(vec![(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)]);
        // bbox half inside, half outside along x
        let straddle = BBox::new(50.0, 0.0, 150.0, 100.0);
        let ratio = square.overlap_ratio(&straddle);
        assert!((ratio - 0.5).abs() < 1e-6);
    }

    #[test]
    fn no_polygons_means_no_mask() {
        let b = BBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(roi_admits(&[], &b, FilterMode::Center, 0.0));
    }

    #[test]
    fn grid_cell_buckets_nearby_points_together() {
        assert_eq!(grid_cell((12.0, 18.0), 20.0), grid_cell((5.0, 1.0), 20.0));
        assert_ne!(grid_cell((12.0, 18.0), 20.0), grid_cell((25.0, 18.0), 20.0));
    }
}
