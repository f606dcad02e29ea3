use serde::{Deserialize, Serialize};

use crate::shared::region::BoundingBox;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionKind {
    Face,
    Person,
    Vehicle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionSource {
    MlAdapter,
    ClassicalFallback,
}

/// Box conventions emitted by detector backends.
///
/// Adapters translate whatever their model produces into one of these and
/// call [`BoxGeometry::normalize`]; everything downstream only sees
/// [`BoundingBox`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoxGeometry {
    Corners { x1: f64, y1: f64, x2: f64, y2: f64 },
    TopLeftSize { x: f64, y: f64, width: f64, height: f64 },
    CenterSize { cx: f64, cy: f64, width: f64, height: f64 },
}

impl BoxGeometry {
    pub fn normalize(self) -> BoundingBox {
        match self {
            BoxGeometry::Corners { x1, y1, x2, y2 } => BoundingBox::from_corners(x1, y1, x2, y2),
            BoxGeometry::TopLeftSize {
                x,
                y,
                width,
                height,
            } => BoundingBox::new(x, y, width.abs(), height.abs()),
            BoxGeometry::CenterSize {
                cx,
                cy,
                width,
                height,
            } => {
                let (w, h) = (width.abs(), height.abs());
                BoundingBox::new(cx - w / 2.0, cy - h / 2.0, w, h)
            }
        }
    }
}

/// A candidate box with a class label, from an ML adapter or a classical fallback.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub kind: DetectionKind,
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub source: DetectionSource,
}

impl Detection {
    pub fn new(
        kind: DetectionKind,
        geometry: BoxGeometry,
        confidence: f64,
        source: DetectionSource,
    ) -> Self {
        Self {
            kind,
            bbox: geometry.normalize(),
            confidence: confidence.clamp(0.0, 1.0),
            source,
        }
    }
}
