use ndarray::ArrayView3;
use thiserror::Error;

/// Bytes per pixel: R, G, B, A.
pub const CHANNELS: usize = 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BufferError {
    #[error("pixel data has {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    LengthMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// An RGBA raster in row-major order.
///
/// The length invariant is checked once at construction; the buffer is never
/// resized afterwards. Detectors only ever see `&PixelBuffer`, and the blur
/// stage is the single holder of `&mut PixelBuffer`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl PixelBuffer {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, BufferError> {
        let expected = (width as usize) * (height as usize) * CHANNELS;
        if data.len() != expected {
            return Err(BufferError::LengthMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// A buffer where every pixel has the given RGBA value.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((width as usize) * (height as usize) * CHANNELS);
        for _ in 0..(width as usize) * (height as usize) {
            data.extend_from_slice(&rgba);
        }
        Self {
            data,
            width,
            height,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// RGB of the pixel at (x, y). Caller guarantees the coordinate is in bounds.
    #[inline]
    pub fn rgb(&self, x: usize, y: usize) -> (u8, u8, u8) {
        let idx = (y * self.width as usize + x) * CHANNELS;
        (self.data[idx], self.data[idx + 1], self.data[idx + 2])
    }

    pub fn set_rgba(&mut self, x: usize, y: usize, rgba: [u8; 4]) {
        let idx = (y * self.width as usize + x) * CHANNELS;
        self.data[idx..idx + CHANNELS].copy_from_slice(&rgba);
    }

    /// Paints a solid rectangle, clipped to the buffer.
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, rgba: [u8; 4]) {
        let x_end = (x + w).min(self.width) as usize;
        let y_end = (y + h).min(self.height) as usize;
        for py in y as usize..y_end {
            for px in x as usize..x_end {
                self.set_rgba(px, py, rgba);
            }
        }
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("PixelBuffer data length is checked at construction")
    }

    fn shape(&self) -> (usize, usize, usize) {
        (self.height as usize, self.width as usize, CHANNELS)
    }
}
