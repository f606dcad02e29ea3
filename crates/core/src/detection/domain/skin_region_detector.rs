use serde::{Deserialize, Serialize};

use crate::shared::pixel_buffer::PixelBuffer;
use crate::shared::region::BoundingBox;

use super::detection::{BoxGeometry, Detection, DetectionKind, DetectionSource};
use super::detection_error::DetectionError;
use super::face_detector::FaceDetector;

/// Grid spacing, in pixels, for both the seed scan and flood-fill neighbours.
pub const DEFAULT_STRIDE: u32 = 10;

/// Maximum samples folded into one region before growth stops.
pub const DEFAULT_MAX_VISITED: usize = 500;

/// A region must have strictly more samples than this to be reported.
pub const DEFAULT_MIN_PIXELS: usize = 20;

/// Margin added around an accepted region's bounding box.
pub const DEFAULT_MARGIN: f64 = 10.0;

/// Classical regions carry no calibrated score.
const FALLBACK_CONFIDENCE: f64 = 0.5;

/// RGB bounds for the skin-colour test.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkinThresholds {
    pub min_red: u8,
    pub min_green: u8,
    pub min_blue: u8,
    /// Minimum `max(r,g,b) - min(r,g,b)`.
    pub min_spread: u8,
    /// Minimum `|r - g|`.
    pub min_red_green_gap: u8,
}

impl Default for SkinThresholds {
    fn default() -> Self {
        Self {
            min_red: 95,
            min_green: 40,
            min_blue: 20,
            min_spread: 15,
            min_red_green_gap: 15,
        }
    }
}

impl SkinThresholds {
    pub fn is_skin(&self, r: u8, g: u8, b: u8) -> bool {
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        r > self.min_red
            && g > self.min_green
            && b > self.min_blue
            && max - min > self.min_spread
            && r.abs_diff(g) > self.min_red_green_gap
            && r > g
            && r > b
    }
}

/// Tunables for [`SkinRegionDetector`]. Values are empirical and uncalibrated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkinDetectorConfig {
    pub stride: u32,
    pub max_visited: usize,
    pub min_pixels: usize,
    pub margin: f64,
    pub min_aspect: f64,
    pub max_aspect: f64,
    pub min_width: f64,
    pub max_width: f64,
    pub min_height: f64,
    pub max_height: f64,
    pub thresholds: SkinThresholds,
}

impl Default for SkinDetectorConfig {
    fn default() -> Self {
        Self {
            stride: DEFAULT_STRIDE,
            max_visited: DEFAULT_MAX_VISITED,
            min_pixels: DEFAULT_MIN_PIXELS,
            margin: DEFAULT_MARGIN,
            min_aspect: 0.5,
            max_aspect: 1.5,
            min_width: 30.0,
            max_width: 200.0,
            min_height: 30.0,
            max_height: 250.0,
            thresholds: SkinThresholds::default(),
        }
    }
}

/// A connected patch of skin-coloured grid samples.
#[derive(Clone, Debug, PartialEq)]
pub struct SkinRegion {
    /// Bounds of the sampled pixels, extended by one stride on the far side.
    pub bbox: BoundingBox,
    /// Number of grid samples folded into the region; never exceeds the cap.
    pub sampled: usize,
}

/// Classical face locator: skin-colour seeds grown by a capped flood fill
/// over a coarse grid, kept when the result is face-shaped.
pub struct SkinRegionDetector {
    config: SkinDetectorConfig,
}

impl SkinRegionDetector {
    pub fn new(config: SkinDetectorConfig) -> Self {
        Self { config }
    }

    pub fn detect(&self, buffer: &PixelBuffer) -> Vec<Detection> {
        self.grow_regions(buffer)
            .into_iter()
            .filter(|region| {
                region.sampled > self.config.min_pixels && self.is_like_face_region(&region.bbox)
            })
            .map(|region| {
                let padded = region.bbox.padded(self.config.margin);
                Detection::new(
                    DetectionKind::Face,
                    BoxGeometry::TopLeftSize {
                        x: padded.x,
                        y: padded.y,
                        width: padded.width,
                        height: padded.height,
                    },
                    FALLBACK_CONFIDENCE,
                    DetectionSource::ClassicalFallback,
                )
            })
            .collect()
    }

    /// Every region grown from an unvisited skin seed, before shape filtering.
    pub fn grow_regions(&self, buffer: &PixelBuffer) -> Vec<SkinRegion> {
        let grid = SampleGrid::new(buffer, self.config.stride);
        let mut visited = vec![false; grid.cols * grid.rows];
        let mut regions = Vec::new();

        for gy in 0..grid.rows {
            for gx in 0..grid.cols {
                if visited[grid.index(gx, gy)] || !self.is_skin_at(buffer, &grid, gx, gy) {
                    continue;
                }
                regions.push(self.grow(buffer, &grid, &mut visited, gx, gy));
            }
        }
        regions
    }

    pub fn is_like_face_region(&self, bbox: &BoundingBox) -> bool {
        let c = &self.config;
        let aspect = bbox.aspect_ratio();
        (c.min_aspect..=c.max_aspect).contains(&aspect)
            && (c.min_width..=c.max_width).contains(&bbox.width)
            && (c.min_height..=c.max_height).contains(&bbox.height)
    }

    fn grow(
        &self,
        buffer: &PixelBuffer,
        grid: &SampleGrid,
        visited: &mut [bool],
        seed_x: usize,
        seed_y: usize,
    ) -> SkinRegion {
        let cap = self.config.max_visited.max(1);
        let mut bounds = GridBounds::at(seed_x, seed_y);
        let mut sampled = 0usize;
        let mut stack = vec![(seed_x, seed_y)];
        visited[grid.index(seed_x, seed_y)] = true;

        while let Some((gx, gy)) = stack.pop() {
            sampled += 1;
            bounds.include(gx, gy);
            if sampled >= cap {
                // Pending samples were never folded in; free them to seed later regions.
                for (px, py) in stack.drain(..) {
                    visited[grid.index(px, py)] = false;
                }
                break;
            }
            for (nx, ny) in grid.neighbours(gx, gy) {
                let idx = grid.index(nx, ny);
                if !visited[idx] && self.is_skin_at(buffer, grid, nx, ny) {
                    visited[idx] = true;
                    stack.push((nx, ny));
                }
            }
        }

        SkinRegion {
            bbox: bounds.to_pixels(grid),
            sampled,
        }
    }

    fn is_skin_at(&self, buffer: &PixelBuffer, grid: &SampleGrid, gx: usize, gy: usize) -> bool {
        let (r, g, b) = buffer.rgb(gx * grid.stride, gy * grid.stride);
        self.config.thresholds.is_skin(r, g, b)
    }
}

impl Default for SkinRegionDetector {
    fn default() -> Self {
        Self::new(SkinDetectorConfig::default())
    }
}

impl FaceDetector for SkinRegionDetector {
    fn detect_faces(&self, buffer: &PixelBuffer) -> Result<Vec<Detection>, DetectionError> {
        Ok(self.detect(buffer))
    }
}

/// The coarse sampling lattice laid over the buffer.
struct SampleGrid {
    stride: usize,
    cols: usize,
    rows: usize,
    width: usize,
    height: usize,
}

impl SampleGrid {
    fn new(buffer: &PixelBuffer, stride: u32) -> Self {
        let stride = stride.max(1) as usize;
        let width = buffer.width() as usize;
        let height = buffer.height() as usize;
        Self {
            stride,
            cols: width.div_ceil(stride),
            rows: height.div_ceil(stride),
            width,
            height,
        }
    }

    fn index(&self, gx: usize, gy: usize) -> usize {
        gy * self.cols + gx
    }

    fn neighbours(&self, gx: usize, gy: usize) -> impl Iterator<Item = (usize, usize)> {
        let (cols, rows) = (self.cols, self.rows);
        [
            (gx.checked_sub(1), Some(gy)),
            (Some(gx + 1).filter(|&x| x < cols), Some(gy)),
            (Some(gx), gy.checked_sub(1)),
            (Some(gx), Some(gy + 1).filter(|&y| y < rows)),
        ]
        .into_iter()
        .filter_map(|(x, y)| Some((x?, y?)))
    }
}

struct GridBounds {
    min_x: usize,
    max_x: usize,
    min_y: usize,
    max_y: usize,
}

impl GridBounds {
    fn at(gx: usize, gy: usize) -> Self {
        Self {
            min_x: gx,
            max_x: gx,
            min_y: gy,
            max_y: gy,
        }
    }

    fn include(&mut self, gx: usize, gy: usize) {
        self.min_x = self.min_x.min(gx);
        self.max_x = self.max_x.max(gx);
        self.min_y = self.min_y.min(gy);
        self.max_y = self.max_y.max(gy);
    }

    fn to_pixels(&self, grid: &SampleGrid) -> BoundingBox {
        let x = self.min_x * grid.stride;
        let y = self.min_y * grid.stride;
        let right = ((self.max_x + 1) * grid.stride).min(grid.width);
        let bottom = ((self.max_y + 1) * grid.stride).min(grid.height);
        BoundingBox::new(
            x as f64,
            y as f64,
            (right - x) as f64,
            (bottom - y) as f64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SKIN: [u8; 4] = [200, 140, 110, 255];
    const BACKGROUND: [u8; 4] = [30, 60, 120, 255];

    fn scene(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::filled(width, height, BACKGROUND)
    }

    #[rstest]
    #[case::typical_skin(200, 140, 110, true)]
    #[case::too_dark_red(90, 50, 30, false)]
    #[case::greyish(150, 145, 140, false)]
    #[case::blue_dominant(120, 60, 200, false)]
    #[case::green_dominant(100, 180, 60, false)]
    #[case::low_blue(200, 140, 15, false)]
    fn test_skin_heuristic(#[case] r: u8, #[case] g: u8, #[case] b: u8, #[case] expected: bool) {
        assert_eq!(SkinThresholds::default().is_skin(r, g, b), expected);
    }

    #[rstest]
    #[case::square(BoundingBox::new(0.0, 0.0, 60.0, 60.0), true)]
    #[case::portrait(BoundingBox::new(0.0, 0.0, 60.0, 80.0), true)]
    #[case::too_wide(BoundingBox::new(0.0, 0.0, 120.0, 40.0), false)]
    #[case::too_tall(BoundingBox::new(0.0, 0.0, 40.0, 100.0), false)]
    #[case::too_small(BoundingBox::new(0.0, 0.0, 20.0, 20.0), false)]
    #[case::too_large(BoundingBox::new(0.0, 0.0, 240.0, 240.0), false)]
    fn test_is_like_face_region(#[case] bbox: BoundingBox, #[case] expected: bool) {
        assert_eq!(SkinRegionDetector::default().is_like_face_region(&bbox), expected);
    }

    #[test]
    fn test_single_skin_block_yields_one_covering_face() {
        let mut buffer = scene(640, 480);
        buffer.fill_rect(100, 100, 60, 80, SKIN);

        let faces = SkinRegionDetector::default().detect(&buffer);

        assert_eq!(faces.len(), 1);
        let face = faces[0];
        assert_eq!(face.kind, DetectionKind::Face);
        assert_eq!(face.source, DetectionSource::ClassicalFallback);
        assert!(face
            .bbox
            .contains(&BoundingBox::new(100.0, 100.0, 60.0, 80.0)));
    }

    #[test]
    fn test_margin_is_added_around_region() {
        let mut buffer = scene(640, 480);
        buffer.fill_rect(100, 100, 60, 80, SKIN);

        let faces = SkinRegionDetector::default().detect(&buffer);

        assert_eq!(faces[0].bbox, BoundingBox::new(90.0, 90.0, 80.0, 100.0));
    }

    #[test]
    fn test_no_skin_yields_nothing() {
        let buffer = PixelBuffer::filled(320, 240, [0, 0, 0, 255]);
        assert!(SkinRegionDetector::default().detect(&buffer).is_empty());
    }

    #[test]
    fn test_small_patch_is_below_sample_minimum() {
        let mut buffer = scene(640, 480);
        buffer.fill_rect(200, 200, 30, 30, SKIN);

        let detector = SkinRegionDetector::default();
        let regions = detector.grow_regions(&buffer);

        assert_eq!(regions.len(), 1);
        assert!(regions[0].sampled <= DEFAULT_MIN_PIXELS);
        assert!(detector.detect(&buffer).is_empty());
    }

    #[test]
    fn test_elongated_strip_is_not_face_like() {
        let mut buffer = scene(640, 480);
        buffer.fill_rect(100, 300, 190, 40, SKIN);
        assert!(SkinRegionDetector::default().detect(&buffer).is_empty());
    }

    #[test]
    fn test_two_separate_blocks_yield_two_faces() {
        let mut buffer = scene(640, 480);
        buffer.fill_rect(50, 50, 60, 70, SKIN);
        buffer.fill_rect(400, 200, 70, 80, SKIN);
        assert_eq!(SkinRegionDetector::default().detect(&buffer).len(), 2);
    }

    #[test]
    fn test_growth_never_exceeds_visit_cap() {
        let buffer = PixelBuffer::filled(640, 480, SKIN);
        let detector = SkinRegionDetector::default();

        let regions = detector.grow_regions(&buffer);

        assert!(!regions.is_empty());
        assert!(regions.iter().all(|r| r.sampled <= DEFAULT_MAX_VISITED));
        assert!(regions.iter().any(|r| r.sampled == DEFAULT_MAX_VISITED));
    }

    #[test]
    fn test_capped_growth_leaves_remaining_skin_for_later_regions() {
        let buffer = PixelBuffer::filled(640, 480, SKIN);
        let detector = SkinRegionDetector::default();

        let regions = detector.grow_regions(&buffer);

        let total: usize = regions.iter().map(|r| r.sampled).sum();
        assert_eq!(total, 64 * 48);
        assert!(regions.len() > 1);
    }

    #[test]
    fn test_custom_cap_is_honoured() {
        let buffer = PixelBuffer::filled(200, 200, SKIN);
        let detector = SkinRegionDetector::new(SkinDetectorConfig {
            max_visited: 7,
            ..SkinDetectorConfig::default()
        });

        let regions = detector.grow_regions(&buffer);

        assert!(regions.iter().all(|r| r.sampled <= 7));
    }

    #[test]
    fn test_region_at_image_edge_is_clipped_to_buffer() {
        let mut buffer = scene(105, 105);
        buffer.fill_rect(45, 45, 60, 60, SKIN);

        let regions = SkinRegionDetector::default().grow_regions(&buffer);

        assert_eq!(regions.len(), 1);
        assert!(regions[0].bbox.right() <= 105.0);
        assert!(regions[0].bbox.bottom() <= 105.0);
    }

    #[test]
    fn test_face_detector_trait_never_errors() {
        let buffer = scene(64, 64);
        let detector = SkinRegionDetector::default();
        assert!(detector.detect_faces(&buffer).unwrap().is_empty());
    }
}
