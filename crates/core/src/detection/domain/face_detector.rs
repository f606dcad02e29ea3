use crate::shared::pixel_buffer::PixelBuffer;

use super::detection::Detection;
use super::detection_error::DetectionError;

/// Domain interface for face detection.
///
/// Implementations are shared read-only across concurrent images, hence
/// `&self` and `Sync`. Every returned detection has kind `Face`.
pub trait FaceDetector: Send + Sync {
    fn detect_faces(&self, buffer: &PixelBuffer) -> Result<Vec<Detection>, DetectionError>;
}
