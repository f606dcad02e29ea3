use serde::{Deserialize, Serialize};

use crate::detection::domain::detection::{Detection, DetectionKind};
use crate::detection::domain::plate_detector::PlateCandidate;
use crate::shared::region::{BoundingBox, RedactionRegion, RegionPriority};

/// Placement rules for turning detections into redaction regions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionPolicyConfig {
    /// Symmetric scale applied to face boxes.
    pub face_expansion: f64,
    /// Head height as a share of the person box height.
    pub head_height_ratio: f64,
    /// Upper bound of head width as a share of the person box width.
    pub head_width_ratio: f64,
    /// Upper bound of head width as a share of head height.
    pub head_aspect: f64,
    pub plate_width_ratio: f64,
    pub plate_height_ratio: f64,
    /// Gap between the rear plate and the vehicle box bottom, as a share of box height.
    pub rear_plate_bottom_margin: f64,
    /// Top of the front plate, as a share of vehicle box height.
    pub front_plate_offset: f64,
    pub face_blur_radius: u32,
    pub head_blur_radius: u32,
    pub plate_blur_radius: u32,
}

impl Default for RegionPolicyConfig {
    fn default() -> Self {
        Self {
            face_expansion: 1.1,
            head_height_ratio: 0.18,
            head_width_ratio: 0.5,
            head_aspect: 0.9,
            plate_width_ratio: 0.2,
            plate_height_ratio: 0.08,
            rear_plate_bottom_margin: 0.05,
            front_plate_offset: 0.75,
            face_blur_radius: 20,
            head_blur_radius: 20,
            plate_blur_radius: 12,
        }
    }
}

/// Maps detections to clamped [`RedactionRegion`]s.
///
/// Person detections only produce a head region when the image has no face
/// detections at all, so a face is never blurred twice.
#[derive(Clone, Debug, Default)]
pub struct RegionPolicyEngine {
    config: RegionPolicyConfig,
}

impl RegionPolicyEngine {
    pub fn new(config: RegionPolicyConfig) -> Self {
        Self { config }
    }

    /// Regions for all detections of one image, faces first, then heads, then plates.
    pub fn regions_for(
        &self,
        detections: &[Detection],
        frame_w: u32,
        frame_h: u32,
    ) -> Vec<RedactionRegion> {
        let of_kind = |kind: DetectionKind| detections.iter().filter(move |d| d.kind == kind);
        let has_faces = of_kind(DetectionKind::Face).next().is_some();
        let c = &self.config;

        let faces = of_kind(DetectionKind::Face)
            .map(|d| (self.face_box(&d.bbox), c.face_blur_radius, RegionPriority::Face));
        let heads = of_kind(DetectionKind::Person)
            .filter(|_| !has_faces)
            .map(|d| (self.head_box(&d.bbox), c.head_blur_radius, RegionPriority::Head));
        let plates = of_kind(DetectionKind::Vehicle)
            .flat_map(|d| self.plate_boxes(&d.bbox))
            .map(|b| (b, c.plate_blur_radius, RegionPriority::Plate));

        faces
            .chain(heads)
            .chain(plates)
            .filter_map(|(bbox, radius, priority)| {
                RedactionRegion::clamped(&bbox, frame_w, frame_h, radius, priority)
            })
            .collect()
    }

    /// Region for a plate found by the classical edge search.
    pub fn region_for_plate(
        &self,
        candidate: &PlateCandidate,
        frame_w: u32,
        frame_h: u32,
    ) -> Option<RedactionRegion> {
        RedactionRegion::clamped(
            &candidate.as_box(),
            frame_w,
            frame_h,
            self.config.plate_blur_radius,
            RegionPriority::Plate,
        )
    }

    pub fn face_box(&self, face: &BoundingBox) -> BoundingBox {
        face.scaled(self.config.face_expansion)
    }

    /// Top-anchored, horizontally centred head estimate inside a person box.
    pub fn head_box(&self, person: &BoundingBox) -> BoundingBox {
        let c = &self.config;
        let height = person.height * c.head_height_ratio;
        let width = (person.width * c.head_width_ratio).min(height * c.head_aspect);
        BoundingBox::new(
            person.x + (person.width - width) / 2.0,
            person.y,
            width,
            height,
        )
    }

    /// Fixed-geometry `[rear, front]` plate guesses inside a vehicle box.
    pub fn plate_boxes(&self, vehicle: &BoundingBox) -> [BoundingBox; 2] {
        let c = &self.config;
        let width = vehicle.width * c.plate_width_ratio;
        let height = vehicle.height * c.plate_height_ratio;
        let x = vehicle.x + (vehicle.width - width) / 2.0;
        let rear_y = vehicle.bottom() - height - vehicle.height * c.rear_plate_bottom_margin;
        let front_y = vehicle.y + vehicle.height * c.front_plate_offset;
        [
            BoundingBox::new(x, rear_y, width, height),
            BoundingBox::new(x, front_y, width, height),
        ]
    }
}
