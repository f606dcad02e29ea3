use serde::{Deserialize, Serialize};

use crate::redaction::domain::overlap_resolver::OverlapResolver;
use crate::shared::pixel_buffer::PixelBuffer;
use crate::shared::region::BoundingBox;

use super::edge_map::{EdgeMap, SearchArea};

/// A rectangle whose edge statistics look like a license plate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlateCandidate {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// `edge_density * horizontal_density`.
    pub confidence: f64,
    pub aspect_ratio: f64,
}

impl PlateCandidate {
    pub fn new(x: u32, y: u32, width: u32, height: u32, confidence: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence,
            aspect_ratio: width as f64 / height.max(1) as f64,
        }
    }

    pub fn as_box(&self) -> BoundingBox {
        BoundingBox::new(
            self.x as f64,
            self.y as f64,
            self.width as f64,
            self.height as f64,
        )
    }
}

/// Tunables for [`EdgeBasedPlateDetector`]. Values are empirical and uncalibrated.
///
/// Size fractions are relative to the image; absolute plate bounds live in
/// the overlap resolver's configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateDetectorConfig {
    pub edge_threshold: f32,
    /// Density lookups count every `sample_step`-th pixel in each axis.
    pub sample_step: usize,
    pub min_width_fraction: f64,
    pub max_width_fraction: f64,
    pub min_height_fraction: f64,
    pub max_height_fraction: f64,
    pub min_aspect: f64,
    pub max_aspect: f64,
    pub max_window_area_fraction: f64,
    pub min_edge_density: f64,
    pub max_edge_density: f64,
    pub min_horizontal_density: f64,
    /// Share of each vehicle box, measured from its bottom, that is searched.
    pub vehicle_search_fraction: f64,
    /// Top of the searched band when no vehicles are known, as a fraction of height.
    pub image_band_start: f64,
    /// Window position step in pixels.
    pub scan_step: usize,
    /// Number of window widths (and heights) tried between the size bounds.
    pub size_steps: usize,
}

impl Default for PlateDetectorConfig {
    fn default() -> Self {
        Self {
            edge_threshold: 30.0,
            sample_step: 2,
            min_width_fraction: 0.05,
            max_width_fraction: 0.25,
            min_height_fraction: 0.015,
            max_height_fraction: 0.08,
            min_aspect: 1.5,
            max_aspect: 6.0,
            max_window_area_fraction: 0.02,
            min_edge_density: 0.15,
            max_edge_density: 0.6,
            min_horizontal_density: 0.2,
            vehicle_search_fraction: 0.6,
            image_band_start: 0.4,
            scan_step: 4,
            size_steps: 8,
        }
    }
}

/// Classical plate locator: slides windows over the lower part of the image
/// (or of each vehicle) and keeps those with plate-like edge statistics.
pub struct EdgeBasedPlateDetector {
    config: PlateDetectorConfig,
    resolver: OverlapResolver,
}

impl EdgeBasedPlateDetector {
    pub fn new(config: PlateDetectorConfig, resolver: OverlapResolver) -> Self {
        Self { config, resolver }
    }

    /// Finds up to `max_plate_candidates` plates, best first.
    ///
    /// With `vehicles` non-empty only the lower part of each vehicle box is
    /// searched; otherwise the lower band of the whole image.
    pub fn detect(&self, buffer: &PixelBuffer, vehicles: &[BoundingBox]) -> Vec<PlateCandidate> {
        let (fw, fh) = (buffer.width(), buffer.height());
        let areas = self.search_areas(fw, fh, vehicles);
        let Some(covering) = SearchArea::covering(&areas) else {
            return Vec::new();
        };

        let edges = EdgeMap::compute(
            buffer,
            &covering,
            self.config.edge_threshold,
            self.config.sample_step,
        );
        let mut raw = Vec::new();
        for area in &areas {
            self.scan_area(&edges, area, fw, fh, &mut raw);
        }
        let mapped = edges.area();
        log::debug!(
            "Plate search: {} raw windows over {} area(s) in a {}x{} edge map",
            raw.len(),
            areas.len(),
            mapped.width(),
            mapped.height()
        );

        let deduped = self.resolver.dedupe_plate_candidates(raw);
        self.resolver.filter_plate_candidates(deduped, fw, fh)
    }

    pub fn search_areas(&self, fw: u32, fh: u32, vehicles: &[BoundingBox]) -> Vec<SearchArea> {
        let (w, h) = (fw as f64, fh as f64);
        let to_area = |x0: f64, y0: f64, x1: f64, y1: f64| {
            let area = SearchArea {
                x0: x0.clamp(0.0, w).floor() as usize,
                y0: y0.clamp(0.0, h).floor() as usize,
                x1: x1.clamp(0.0, w).ceil() as usize,
                y1: y1.clamp(0.0, h).ceil() as usize,
            };
            (area.x1 > area.x0 && area.y1 > area.y0).then_some(area)
        };

        if vehicles.is_empty() {
            return to_area(0.0, h * self.config.image_band_start, w, h)
                .into_iter()
                .collect();
        }
        let lower = self.config.vehicle_search_fraction.clamp(0.0, 1.0);
        vehicles
            .iter()
            .filter_map(|v| to_area(v.x, v.bottom() - v.height * lower, v.right(), v.bottom()))
            .collect()
    }

    fn scan_area(
        &self,
        edges: &EdgeMap,
        area: &SearchArea,
        fw: u32,
        fh: u32,
        out: &mut Vec<PlateCandidate>,
    ) {
        let c = &self.config;
        let bounds = &self.resolver.config().plate_bounds;
        let frame_area = fw as f64 * fh as f64;

        let min_w = ((fw as f64 * c.min_width_fraction).ceil() as usize).max(bounds.min_width as usize);
        let max_w = ((fw as f64 * c.max_width_fraction).floor() as usize).min(bounds.max_width as usize);
        let min_h = ((fh as f64 * c.min_height_fraction).ceil() as usize).max(bounds.min_height as usize);
        let max_h = ((fh as f64 * c.max_height_fraction).floor() as usize).min(bounds.max_height as usize);
        let step = c.scan_step.max(1);

        for wh in size_range(min_h, max_h, c.size_steps) {
            for ww in size_range(min_w, max_w, c.size_steps) {
                if ww > area.x1 - area.x0 || wh > area.y1 - area.y0 {
                    continue;
                }
                let aspect = ww as f64 / wh as f64;
                let window_area = (ww * wh) as f64;
                if aspect < c.min_aspect
                    || aspect > c.max_aspect
                    || window_area > frame_area * c.max_window_area_fraction
                    || !bounds.accepts(ww as u32, wh as u32, fw, fh)
                {
                    continue;
                }

                for y in (area.y0..=area.y1 - wh).step_by(step) {
                    for x in (area.x0..=area.x1 - ww).step_by(step) {
                        let edge_density = edges.edge_density(x, y, ww, wh);
                        if edge_density < c.min_edge_density || edge_density > c.max_edge_density {
                            continue;
                        }
                        let horizontal_density = edges.stroke_density(y + wh / 2, x, ww);
                        if horizontal_density <= c.min_horizontal_density {
                            continue;
                        }
                        out.push(PlateCandidate::new(
                            x as u32,
                            y as u32,
                            ww as u32,
                            wh as u32,
                            edge_density * horizontal_density,
                        ));
                    }
                }
            }
        }
    }
}

/// `steps` sizes spread evenly over `[min, max]`, deduplicated.
fn size_range(min: usize, max: usize, steps: usize) -> Vec<usize> {
    if min > max || min == 0 {
        return Vec::new();
    }
    if steps <= 1 || min == max {
        return vec![min];
    }
    let span = (max - min) as f64;
    let mut sizes: Vec<usize> = (0..steps)
        .map(|i| min + (span * i as f64 / (steps - 1) as f64).round() as usize)
        .collect();
    sizes.dedup();
    sizes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redaction::domain::overlap_resolver::OverlapConfig;

    const BACKGROUND: [u8; 4] = [100, 100, 100, 255];

    fn detector() -> EdgeBasedPlateDetector {
        EdgeBasedPlateDetector::new(
            PlateDetectorConfig::default(),
            OverlapResolver::new(OverlapConfig::default()),
        )
    }

    /// Low-contrast scene with a striped 150x40 "plate" at (300, 350).
    fn scene_with_plate() -> PixelBuffer {
        let mut buffer = PixelBuffer::filled(800, 600, BACKGROUND);
        for x in 300..450u32 {
            let shade = if ((x - 300) / 4) % 2 == 0 { 230 } else { 30 };
            buffer.fill_rect(x, 350, 1, 40, [shade, shade, shade, 255]);
        }
        buffer
    }

    fn plate_box() -> BoundingBox {
        BoundingBox::new(300.0, 350.0, 150.0, 40.0)
    }

    #[test]
    fn test_striped_plate_is_found() {
        let candidates = detector().detect(&scene_with_plate(), &[]);

        assert!(!candidates.is_empty());
        let best = candidates[0].as_box();
        assert!(best.overlap_ratio(&plate_box()) > 0.5);
        assert!((1.5..=6.0).contains(&candidates[0].aspect_ratio));
    }

    #[test]
    fn test_candidates_are_sorted_and_capped() {
        let candidates = detector().detect(&scene_with_plate(), &[]);

        assert!(candidates.len() <= 5);
        for pair in candidates.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
    }

    #[test]
    fn test_candidates_pass_absolute_bounds() {
        for c in detector().detect(&scene_with_plate(), &[]) {
            assert!((60..=300).contains(&c.width));
            assert!((15..=100).contains(&c.height));
            let area_fraction = (c.width * c.height) as f64 / (800.0 * 600.0);
            assert!((0.002..=0.025).contains(&area_fraction));
        }
    }

    #[test]
    fn test_accepted_candidates_do_not_overlap_heavily() {
        let candidates = detector().detect(&scene_with_plate(), &[]);
        for (i, a) in candidates.iter().enumerate() {
            for b in &candidates[..i] {
                assert!(a.as_box().overlap_ratio(&b.as_box()) <= 0.5);
            }
        }
    }

    #[test]
    fn test_flat_image_has_no_candidates() {
        let buffer = PixelBuffer::filled(800, 600, BACKGROUND);
        assert!(detector().detect(&buffer, &[]).is_empty());
    }

    #[test]
    fn test_plate_above_search_band_is_ignored() {
        let mut buffer = PixelBuffer::filled(800, 600, BACKGROUND);
        for x in 300..450u32 {
            let shade = if ((x - 300) / 4) % 2 == 0 { 230 } else { 30 };
            buffer.fill_rect(x, 60, 1, 40, [shade, shade, shade, 255]);
        }
        assert!(detector().detect(&buffer, &[]).is_empty());
    }

    #[test]
    fn test_vehicle_constrains_search() {
        let buffer = scene_with_plate();
        let elsewhere = BoundingBox::new(0.0, 0.0, 200.0, 200.0);
        let around_plate = BoundingBox::new(250.0, 250.0, 250.0, 160.0);

        assert!(detector().detect(&buffer, &[elsewhere]).is_empty());
        assert!(!detector().detect(&buffer, &[around_plate]).is_empty());
    }

    #[test]
    fn test_search_area_without_vehicles_is_lower_band() {
        let areas = detector().search_areas(800, 600, &[]);
        assert_eq!(
            areas,
            vec![SearchArea {
                x0: 0,
                y0: 240,
                x1: 800,
                y1: 600
            }]
        );
    }

    #[test]
    fn test_search_area_for_vehicle_is_lower_sixty_percent() {
        let vehicle = BoundingBox::new(100.0, 100.0, 200.0, 100.0);
        let areas = detector().search_areas(800, 600, &[vehicle]);
        assert_eq!(
            areas,
            vec![SearchArea {
                x0: 100,
                y0: 140,
                x1: 300,
                y1: 200
            }]
        );
    }

    #[test]
    fn test_search_area_outside_frame_is_dropped() {
        let vehicle = BoundingBox::new(900.0, 700.0, 100.0, 100.0);
        assert!(detector().search_areas(800, 600, &[vehicle]).is_empty());
    }

    #[test]
    fn test_size_range() {
        assert_eq!(size_range(60, 200, 8), vec![60, 80, 100, 120, 140, 160, 180, 200]);
        assert_eq!(size_range(10, 12, 8), vec![10, 11, 12]);
        assert_eq!(size_range(5, 5, 8), vec![5]);
        assert!(size_range(10, 5, 8).is_empty());
    }
}
