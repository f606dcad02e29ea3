use serde::{Deserialize, Serialize};

use crate::shared::pixel_buffer::PixelBuffer;

use super::detection::{Detection, DetectionKind};
use super::detection_error::DetectionError;

/// Object classes the redaction pipeline asks a general detector for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectClass {
    Person,
    Car,
    Truck,
    Bus,
    Motorcycle,
}

impl ObjectClass {
    /// Every class the pipeline redacts, requested in a single detector call.
    pub const ALL: [ObjectClass; 5] = [
        ObjectClass::Person,
        ObjectClass::Car,
        ObjectClass::Truck,
        ObjectClass::Bus,
        ObjectClass::Motorcycle,
    ];

    /// How the pipeline treats a hit of this class.
    pub fn kind(self) -> DetectionKind {
        match self {
            ObjectClass::Person => DetectionKind::Person,
            _ => DetectionKind::Vehicle,
        }
    }

    /// Class index in the 80-class COCO label set.
    pub fn coco_id(self) -> usize {
        match self {
            ObjectClass::Person => 0,
            ObjectClass::Car => 2,
            ObjectClass::Motorcycle => 3,
            ObjectClass::Bus => 5,
            ObjectClass::Truck => 7,
        }
    }
}

/// Domain interface for a multi-class object detector.
///
/// Only detections whose class is in `classes` are returned; the kind of each
/// is [`ObjectClass::kind`].
pub trait ObjectDetector: Send + Sync {
    fn detect_objects(
        &self,
        buffer: &PixelBuffer,
        classes: &[ObjectClass],
    ) -> Result<Vec<Detection>, DetectionError>;
}
