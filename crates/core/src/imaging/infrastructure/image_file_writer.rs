use std::path::Path;

use crate::imaging::domain::image_io_error::ImageIoError;
use crate::imaging::domain::image_writer::ImageWriter;
use crate::shared::pixel_buffer::PixelBuffer;

/// Encodes a buffer with the `image` crate, picking the format from the
/// file extension. Alpha is dropped for formats that cannot store it.
pub struct ImageFileWriter;

impl ImageFileWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageWriter for ImageFileWriter {
    fn write(&self, path: &Path, buffer: &PixelBuffer) -> Result<(), ImageIoError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ImageIoError::CreateDir {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let encode_err = |e: image::ImageError| ImageIoError::Encode {
            path: path.to_path_buf(),
            source: e,
        };
        // Length is guaranteed by the PixelBuffer invariant.
        let img = image::RgbaImage::from_raw(buffer.width(), buffer.height(), buffer.data().to_vec())
            .ok_or_else(|| {
                encode_err(image::ImageError::Parameter(
                    image::error::ParameterError::from_kind(
                        image::error::ParameterErrorKind::DimensionMismatch,
                    ),
                ))
            })?;

        let format = image::ImageFormat::from_path(path).map_err(encode_err)?;
        if format == image::ImageFormat::Jpeg {
            image::DynamicImage::ImageRgba8(img)
                .to_rgb8()
                .save_with_format(path, format)
                .map_err(encode_err)
        } else {
            img.save_with_format(path, format).map_err(encode_err)
        }
    }
}
