use serde::{Deserialize, Serialize};

use crate::detection::domain::plate_detector::PlateCandidate;
use crate::shared::region::RedactionRegion;

/// Absolute and image-relative size limits for a plausible plate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateSizeBounds {
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub min_area_fraction: f64,
    pub max_area_fraction: f64,
}

impl Default for PlateSizeBounds {
    fn default() -> Self {
        Self {
            min_width: 60,
            max_width: 300,
            min_height: 15,
            max_height: 100,
            min_area_fraction: 0.002,
            max_area_fraction: 0.025,
        }
    }
}

impl PlateSizeBounds {
    pub fn accepts(&self, width: u32, height: u32, frame_w: u32, frame_h: u32) -> bool {
        let frame_area = frame_w as f64 * frame_h as f64;
        if frame_area == 0.0 {
            return false;
        }
        let fraction = (width as f64 * height as f64) / frame_area;
        (self.min_width..=self.max_width).contains(&width)
            && (self.min_height..=self.max_height).contains(&height)
            && (self.min_area_fraction..=self.max_area_fraction).contains(&fraction)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlapConfig {
    /// A plate candidate covered by a better one beyond this share of its own area is dropped.
    pub plate_overlap_threshold: f64,
    /// A redaction region covered by an earlier one beyond this share of its own area is dropped.
    pub region_overlap_threshold: f64,
    pub max_plate_candidates: usize,
    pub plate_bounds: PlateSizeBounds,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            plate_overlap_threshold: 0.5,
            region_overlap_threshold: 0.9,
            max_plate_candidates: 5,
            plate_bounds: PlateSizeBounds::default(),
        }
    }
}

/// Deduplicates plate candidates and redaction regions by intersection-over-area.
#[derive(Clone, Debug, Default)]
pub struct OverlapResolver {
    config: OverlapConfig,
}

impl OverlapResolver {
    pub fn new(config: OverlapConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OverlapConfig {
        &self.config
    }

    /// Greedy suppression, best confidence first: a candidate is dropped when
    /// more than the threshold of its own area lies inside a kept one.
    pub fn dedupe_plate_candidates(&self, mut candidates: Vec<PlateCandidate>) -> Vec<PlateCandidate> {
        sort_by_confidence(&mut candidates);
        let threshold = self.config.plate_overlap_threshold;
        let mut kept: Vec<PlateCandidate> = Vec::new();
        for candidate in candidates {
            let b = candidate.as_box();
            if kept.iter().all(|k| b.overlap_ratio(&k.as_box()) <= threshold) {
                kept.push(candidate);
            }
        }
        kept
    }

    /// Applies the plate size bounds, sorts best first and keeps the top few.
    pub fn filter_plate_candidates(
        &self,
        mut candidates: Vec<PlateCandidate>,
        frame_w: u32,
        frame_h: u32,
    ) -> Vec<PlateCandidate> {
        let bounds = &self.config.plate_bounds;
        candidates.retain(|c| bounds.accepts(c.width, c.height, frame_w, frame_h));
        sort_by_confidence(&mut candidates);
        candidates.truncate(self.config.max_plate_candidates);
        candidates
    }

    /// Orders regions by priority (faces, heads, plates) and drops those
    /// already covered by an earlier region.
    pub fn dedupe_regions(&self, mut regions: Vec<RedactionRegion>) -> Vec<RedactionRegion> {
        regions.sort_by_key(|r| r.priority);
        let threshold = self.config.region_overlap_threshold;
        let mut kept: Vec<RedactionRegion> = Vec::with_capacity(regions.len());
        for region in regions {
            let b = region.as_box();
            if kept.iter().all(|k| b.overlap_ratio(&k.as_box()) <= threshold) {
                kept.push(region);
            }
        }
        kept
    }
}

fn sort_by_confidence(candidates: &mut [PlateCandidate]) {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
