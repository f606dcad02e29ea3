use serde::{Deserialize, Serialize};

/// Slack applied when snapping fractional geometry to whole pixels, so that
/// float noise like `95.000000001` does not grow a region by a full pixel.
const SNAP_EPSILON: f64 = 1e-6;

/// Axis-aligned box in image pixel coordinates, top-left origin.
///
/// Uses `f64` because detector output and policy expansions are fractional;
/// it is snapped to whole pixels only when it becomes a [`RedactionRegion`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a box from corner coordinates, tolerating swapped corners.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x: x1.min(x2),
            y: y1.min(y2),
            width: (x2 - x1).abs(),
            height: (y2 - y1).abs(),
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height <= 0.0 {
            return 0.0;
        }
        self.width / self.height
    }

    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Scales the box around its center.
    pub fn scaled(&self, factor: f64) -> Self {
        let (cx, cy) = self.center();
        let w = self.width * factor;
        let h = self.height * factor;
        Self::new(cx - w / 2.0, cy - h / 2.0, w, h)
    }

    /// Grows the box by `margin` pixels on every side.
    pub fn padded(&self, margin: f64) -> Self {
        Self::new(
            self.x - margin,
            self.y - margin,
            self.width + 2.0 * margin,
            self.height + 2.0 * margin,
        )
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> f64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = self.right().min(other.right());
        let iy2 = self.bottom().min(other.bottom());
        (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0)
    }

    /// Fraction of this box's own area covered by `other` (intersection-over-area).
    pub fn overlap_ratio(&self, other: &BoundingBox) -> f64 {
        let area = self.area();
        if area == 0.0 {
            return 0.0;
        }
        self.intersection_area(other) / area
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let inter = self.intersection_area(other);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }
}

/// What a region hides. Ordering is the blur processing order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RegionPriority {
    Face,
    Head,
    Plate,
}

/// The final clamped rectangle the blur stage obscures.
///
/// Only constructible through [`RedactionRegion::clamped`], which guarantees
/// `x + width <= frame_w`, `y + height <= frame_h` and non-zero size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RedactionRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub blur_radius: u32,
    pub priority: RegionPriority,
}

impl RedactionRegion {
    /// Snaps `bbox` outward to whole pixels and clips it to the frame.
    ///
    /// Returns `None` when nothing of the box lies inside the frame.
    pub fn clamped(
        bbox: &BoundingBox,
        frame_w: u32,
        frame_h: u32,
        blur_radius: u32,
        priority: RegionPriority,
    ) -> Option<Self> {
        if !(bbox.x.is_finite() && bbox.y.is_finite() && bbox.width > 0.0 && bbox.height > 0.0) {
            return None;
        }
        let x0 = (bbox.x + SNAP_EPSILON).floor().clamp(0.0, frame_w as f64);
        let y0 = (bbox.y + SNAP_EPSILON).floor().clamp(0.0, frame_h as f64);
        let x1 = (bbox.right() - SNAP_EPSILON).ceil().clamp(0.0, frame_w as f64);
        let y1 = (bbox.bottom() - SNAP_EPSILON).ceil().clamp(0.0, frame_h as f64);

        let width = (x1 - x0) as u32;
        let height = (y1 - y0) as u32;
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self {
            x: x0 as u32,
            y: y0 as u32,
            width,
            height,
            blur_radius,
            priority,
        })
    }

    pub fn as_box(&self) -> BoundingBox {
        BoundingBox::new(
            self.x as f64,
            self.y as f64,
            self.width as f64,
            self.height as f64,
        )
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn is_within(&self, frame_w: u32, frame_h: u32) -> bool {
        self.width > 0 && self.height > 0 && self.right() <= frame_w && self.bottom() <= frame_h
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn bbox(x: f64, y: f64, w: f64, h: f64) -> BoundingBox {
        BoundingBox::new(x, y, w, h)
    }

    // ── IoU / overlap ────────────────────────────────────────────────

    #[test]
    fn test_iou_identical_boxes() {
        let a = bbox(10.0, 10.0, 100.0, 100.0);
        assert_relative_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        // intersection 50*100 = 5000, union 15000
        let a = bbox(0.0, 0.0, 100.0, 100.0);
        let b = bbox(50.0, 0.0, 100.0, 100.0);
        assert_relative_eq!(a.iou(&b), 5000.0 / 15000.0);
    }

    #[test]
    fn test_iou_touching_edges() {
        let a = bbox(0.0, 0.0, 50.0, 50.0);
        let b = bbox(50.0, 0.0, 50.0, 50.0);
        assert_relative_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_overlap_ratio_is_relative_to_own_area() {
        let small = bbox(25.0, 25.0, 50.0, 50.0);
        let big = bbox(0.0, 0.0, 100.0, 100.0);
        assert_relative_eq!(small.overlap_ratio(&big), 1.0);
        assert_relative_eq!(big.overlap_ratio(&small), 0.25);
    }

    #[rstest]
    #[case::zero_width(bbox(0.0, 0.0, 0.0, 100.0), bbox(0.0, 0.0, 50.0, 50.0))]
    #[case::zero_height(bbox(0.0, 0.0, 100.0, 0.0), bbox(0.0, 0.0, 50.0, 50.0))]
    fn test_overlap_degenerate(#[case] a: BoundingBox, #[case] b: BoundingBox) {
        assert_relative_eq!(a.iou(&b), 0.0);
        assert_relative_eq!(a.overlap_ratio(&b), 0.0);
    }

    // ── Geometry helpers ─────────────────────────────────────────────

    #[test]
    fn test_from_corners_normalizes_order() {
        let b = BoundingBox::from_corners(30.0, 40.0, 10.0, 20.0);
        assert_eq!(b, bbox(10.0, 20.0, 20.0, 20.0));
    }

    #[test]
    fn test_scaled_keeps_center() {
        let b = bbox(100.0, 100.0, 100.0, 50.0).scaled(1.1);
        let (cx, cy) = b.center();
        assert_relative_eq!(cx, 150.0);
        assert_relative_eq!(cy, 125.0);
        assert_relative_eq!(b.width, 110.0, epsilon = 1e-9);
        assert_relative_eq!(b.height, 55.0, epsilon = 1e-9);
    }

    #[test]
    fn test_padded_grows_every_side() {
        let b = bbox(10.0, 10.0, 20.0, 20.0).padded(5.0);
        assert_eq!(b, bbox(5.0, 5.0, 30.0, 30.0));
    }

    // ── Clamping ─────────────────────────────────────────────────────

    #[test]
    fn test_clamped_inside_frame_is_exact() {
        let r = RedactionRegion::clamped(
            &bbox(80.0, 87.0, 40.0, 8.0),
            200,
            100,
            5,
            RegionPriority::Plate,
        )
        .unwrap();
        assert_eq!((r.x, r.y, r.width, r.height), (80, 87, 40, 8));
    }

    #[test]
    fn test_clamped_clips_negative_origin() {
        let r = RedactionRegion::clamped(
            &bbox(-20.0, -10.0, 50.0, 40.0),
            100,
            100,
            5,
            RegionPriority::Face,
        )
        .unwrap();
        assert_eq!((r.x, r.y, r.width, r.height), (0, 0, 30, 30));
    }

    #[test]
    fn test_clamped_clips_far_edge() {
        let r = RedactionRegion::clamped(
            &bbox(90.0, 90.0, 50.0, 50.0),
            100,
            100,
            5,
            RegionPriority::Face,
        )
        .unwrap();
        assert!(r.is_within(100, 100));
        assert_eq!((r.width, r.height), (10, 10));
    }

    #[test]
    fn test_clamped_snaps_outward() {
        let r = RedactionRegion::clamped(
            &bbox(10.4, 10.6, 5.2, 5.2),
            100,
            100,
            5,
            RegionPriority::Head,
        )
        .unwrap();
        assert_eq!((r.x, r.y, r.right(), r.bottom()), (10, 10, 16, 16));
    }

    #[rstest]
    #[case::fully_outside(bbox(200.0, 200.0, 10.0, 10.0))]
    #[case::negative_side(bbox(-50.0, -50.0, 20.0, 20.0))]
    #[case::zero_size(bbox(10.0, 10.0, 0.0, 10.0))]
    #[case::nan_origin(bbox(f64::NAN, 10.0, 10.0, 10.0))]
    fn test_clamped_rejects_empty(#[case] b: BoundingBox) {
        assert!(RedactionRegion::clamped(&b, 100, 100, 5, RegionPriority::Face).is_none());
    }

    #[test]
    fn test_priority_orders_faces_heads_plates() {
        let mut order = vec![
            RegionPriority::Plate,
            RegionPriority::Face,
            RegionPriority::Head,
        ];
        order.sort();
        assert_eq!(
            order,
            vec![
                RegionPriority::Face,
                RegionPriority::Head,
                RegionPriority::Plate
            ]
        );
    }
}
