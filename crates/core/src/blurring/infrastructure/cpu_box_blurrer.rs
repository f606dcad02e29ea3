use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use crate::blurring::domain::region_blurrer::RegionBlurrer;
use crate::shared::pixel_buffer::{PixelBuffer, CHANNELS};
use crate::shared::region::{RedactionRegion, RegionPriority};

use super::box_filter::{self, RoiRect};

/// Box-filter repetitions per region kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurConfig {
    pub face_passes: usize,
    pub head_passes: usize,
    /// Plates get more passes: small, high-contrast text survives light blurs.
    pub plate_passes: usize,
    /// Cap on the kernel radius as a share of the region's shorter side.
    pub max_radius_fraction: f64,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            face_passes: 3,
            head_passes: 3,
            plate_passes: 5,
            max_radius_fraction: 0.25,
        }
    }
}

impl BlurConfig {
    pub fn passes_for(&self, priority: RegionPriority) -> usize {
        match priority {
            RegionPriority::Face => self.face_passes,
            RegionPriority::Head => self.head_passes,
            RegionPriority::Plate => self.plate_passes,
        }
    }
}

/// CPU blurrer using repeated separable box filtering.
///
/// Scratch buffers are reused across regions, so one instance belongs to
/// one worker.
pub struct CpuBoxBlurrer {
    config: BlurConfig,
    roi_buf: RefCell<Vec<f32>>,
    blur_temp: RefCell<Vec<f32>>,
    prefix: RefCell<Vec<f64>>,
}

impl CpuBoxBlurrer {
    pub fn new(config: BlurConfig) -> Self {
        Self {
            config,
            roi_buf: RefCell::new(Vec::new()),
            blur_temp: RefCell::new(Vec::new()),
            prefix: RefCell::new(Vec::new()),
        }
    }
}

impl Default for CpuBoxBlurrer {
    fn default() -> Self {
        Self::new(BlurConfig::default())
    }
}

impl RegionBlurrer for CpuBoxBlurrer {
    fn blur(
        &self,
        buffer: &mut PixelBuffer,
        region: &RedactionRegion,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let fw = buffer.width() as usize;
        let fh = buffer.height() as usize;

        // Clamp region to buffer bounds
        let rx = (region.x as usize).min(fw);
        let ry = (region.y as usize).min(fh);
        let rw = (region.width as usize).min(fw - rx);
        let rh = (region.height as usize).min(fh - ry);
        if rw == 0 || rh == 0 {
            return Ok(());
        }

        let radius = box_filter::effective_radius(
            region.blur_radius,
            rw,
            rh,
            self.config.max_radius_fraction,
        );
        let passes = self.config.passes_for(region.priority);
        if radius == 0 || passes == 0 {
            return Ok(());
        }

        let rect = RoiRect {
            x: rx,
            y: ry,
            w: rw,
            h: rh,
        };
        let mut roi = self.roi_buf.borrow_mut();
        let mut temp = self.blur_temp.borrow_mut();
        let mut prefix = self.prefix.borrow_mut();

        let data = buffer.data_mut();
        box_filter::extract_roi(data, fw, CHANNELS, rect, &mut roi);
        box_filter::box_blur(&mut roi, rw, rh, CHANNELS, radius, passes, &mut temp, &mut prefix);
        box_filter::write_roi_back(data, &roi, fw, CHANNELS, rect);

        Ok(())
    }
}
