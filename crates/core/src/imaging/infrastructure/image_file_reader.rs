use std::path::Path;

use crate::imaging::domain::image_io_error::ImageIoError;
use crate::imaging::domain::image_reader::ImageReader;
use crate::shared::pixel_buffer::PixelBuffer;

/// Decodes any format the `image` crate supports into an RGBA buffer.
///
/// Sources without alpha come back fully opaque.
pub struct ImageFileReader;

impl ImageFileReader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFileReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageReader for ImageFileReader {
    fn read(&self, path: &Path) -> Result<PixelBuffer, ImageIoError> {
        let img = image::open(path)
            .map_err(|e| ImageIoError::Decode {
                path: path.to_path_buf(),
                source: e,
            })?
            .to_rgba8();
        let (width, height) = img.dimensions();
        Ok(PixelBuffer::new(img.into_raw(), width, height)?)
    }
}
