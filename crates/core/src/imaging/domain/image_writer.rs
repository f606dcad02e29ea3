use std::path::Path;

use crate::shared::pixel_buffer::PixelBuffer;

use super::image_io_error::ImageIoError;

/// Writes a buffer to an image file; the format follows the extension.
pub trait ImageWriter: Send {
    fn write(&self, path: &Path, buffer: &PixelBuffer) -> Result<(), ImageIoError>;
}
