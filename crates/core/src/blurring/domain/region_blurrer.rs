use crate::shared::pixel_buffer::PixelBuffer;
use crate::shared::region::RedactionRegion;

/// Domain interface for obscuring one region of a buffer.
///
/// Implementations modify the buffer in place and clamp the region to the
/// buffer themselves. The exclusive borrow serializes blur calls on a buffer.
pub trait RegionBlurrer: Send {
    fn blur(
        &self,
        buffer: &mut PixelBuffer,
        region: &RedactionRegion,
    ) -> Result<(), Box<dyn std::error::Error>>;
}
