use std::path::Path;

use crate::shared::pixel_buffer::PixelBuffer;

use super::image_io_error::ImageIoError;

/// Decodes an image file into an RGBA buffer.
pub trait ImageReader: Send {
    fn read(&self, path: &Path) -> Result<PixelBuffer, ImageIoError>;
}
