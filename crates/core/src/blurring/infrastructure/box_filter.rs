/// ROI rectangle within a buffer, used to pass region coordinates without many arguments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoiRect {
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
}

/// Kernel radius actually used for a region: the requested radius, capped
/// so the kernel never spans more than `max_fraction` of the region's
/// shorter side.
pub fn effective_radius(blur_radius: u32, w: usize, h: usize, max_fraction: f64) -> usize {
    let cap = (w.min(h) as f64 * max_fraction).floor() as usize;
    (blur_radius as usize).min(cap)
}

/// Copy a rectangular ROI out of buffer data as floats, reusing `roi`.
pub fn extract_roi(data: &[u8], frame_width: usize, channels: usize, rect: RoiRect, roi: &mut Vec<f32>) {
    roi.clear();
    roi.reserve(rect.w * rect.h * channels);
    for row in 0..rect.h {
        let src_offset = ((rect.y + row) * frame_width + rect.x) * channels;
        roi.extend(
            data[src_offset..src_offset + rect.w * channels]
                .iter()
                .map(|&v| v as f32),
        );
    }
}

/// Round a float ROI back into buffer data.
pub fn write_roi_back(data: &mut [u8], roi: &[f32], frame_width: usize, channels: usize, rect: RoiRect) {
    for row in 0..rect.h {
        let dst_offset = ((rect.y + row) * frame_width + rect.x) * channels;
        let src_offset = row * rect.w * channels;
        for (dst, &src) in data[dst_offset..dst_offset + rect.w * channels]
            .iter_mut()
            .zip(&roi[src_offset..src_offset + rect.w * channels])
        {
            *dst = src.round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Repeated separable box filter over an interleaved float image.
///
/// Each pass is a horizontal mean followed by a vertical mean over
/// `±radius` samples, with the window clipped at the ROI border. Three or
/// more passes approximate a Gaussian. `temp` and `prefix` are scratch.
#[allow(clippy::too_many_arguments)]
pub fn box_blur(
    data: &mut [f32],
    width: usize,
    height: usize,
    channels: usize,
    radius: usize,
    passes: usize,
    temp: &mut Vec<f32>,
    prefix: &mut Vec<f64>,
) {
    if radius == 0 || passes == 0 || width == 0 || height == 0 {
        return;
    }
    temp.resize(width * height * channels, 0.0);
    prefix.resize(width.max(height) + 1, 0.0);

    for _ in 0..passes {
        // Horizontal pass: data → temp
        for y in 0..height {
            for c in 0..channels {
                let at = |x: usize| (y * width + x) * channels + c;
                mean_filter_line(width, radius, prefix, |x| data[at(x)], |x, v| temp[at(x)] = v);
            }
        }
        // Vertical pass: temp → data
        for x in 0..width {
            for c in 0..channels {
                let at = |y: usize| (y * width + x) * channels + c;
                mean_filter_line(height, radius, prefix, |y| temp[at(y)], |y, v| data[at(y)] = v);
            }
        }
    }
}

/// Sliding mean over one line via prefix sums; window clipped to `[0, len)`.
fn mean_filter_line(
    len: usize,
    radius: usize,
    prefix: &mut [f64],
    read: impl Fn(usize) -> f32,
    mut write: impl FnMut(usize, f32),
) {
    prefix[0] = 0.0;
    for i in 0..len {
        prefix[i + 1] = prefix[i] + read(i) as f64;
    }
    for i in 0..len {
        let lo = i.saturating_sub(radius);
        let hi = (i + radius).min(len - 1);
        let mean = (prefix[hi + 1] - prefix[lo]) / (hi - lo + 1) as f64;
        write(i, mean as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn blur(data: &mut [f32], w: usize, h: usize, channels: usize, radius: usize, passes: usize) {
        let mut temp = Vec::new();
        let mut prefix = Vec::new();
        box_blur(data, w, h, channels, radius, passes, &mut temp, &mut prefix);
    }

    fn variance(values: &[f32]) -> f64 {
        let n = values.len() as f64;
        let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
        values.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n
    }

    #[test]
    fn test_uniform_image_unchanged() {
        let mut data = vec![128.0f32; 10 * 10 * 4];
        blur(&mut data, 10, 10, 4, 3, 3);
        assert!(data.iter().all(|&v| (v - 128.0).abs() < 1e-3));
    }

    #[test]
    fn test_zero_radius_is_identity() {
        let mut data: Vec<f32> = (0..5 * 5).map(|i| i as f32).collect();
        let original = data.clone();
        blur(&mut data, 5, 5, 1, 0, 3);
        assert_eq!(data, original);
    }

    #[test]
    fn test_impulse_spreads_to_neighbours() {
        let mut data = vec![0.0f32; 9 * 9];
        data[4 * 9 + 4] = 255.0;
        blur(&mut data, 9, 9, 1, 1, 1);
        assert!(data[4 * 9 + 4] < 255.0);
        assert!(data[3 * 9 + 4] > 0.0);
        assert!(data[4 * 9 + 5] > 0.0);
        assert_relative_eq!(data[4 * 9 + 4], 255.0 / 9.0, epsilon = 1e-3);
    }

    #[test]
    fn test_single_pass_row_means() {
        // 1-pixel-high image: vertical pass is a no-op, horizontal pass is a clipped mean.
        let mut data = vec![0.0f32, 30.0, 60.0];
        blur(&mut data, 3, 1, 1, 1, 1);
        assert_relative_eq!(data[0], 15.0);
        assert_relative_eq!(data[1], 30.0);
        assert_relative_eq!(data[2], 45.0);
    }

    #[test]
    fn test_more_passes_smooth_more() {
        let pattern: Vec<f32> = (0..32 * 32)
            .map(|i| if (i / 32 + i % 32) % 2 == 0 { 255.0 } else { 0.0 })
            .collect();
        let mut one = pattern.clone();
        let mut five = pattern.clone();
        blur(&mut one, 32, 32, 1, 2, 1);
        blur(&mut five, 32, 32, 1, 2, 5);
        assert!(variance(&five) <= variance(&one));
        assert!(variance(&one) < variance(&pattern));
    }

    #[test]
    fn test_channels_do_not_mix() {
        let mut data = Vec::new();
        for _ in 0..16 {
            data.extend_from_slice(&[200.0f32, 0.0, 50.0, 255.0]);
        }
        blur(&mut data, 4, 4, 4, 1, 3);
        for px in data.chunks(4) {
            assert_relative_eq!(px[0], 200.0, epsilon = 1e-3);
            assert_relative_eq!(px[1], 0.0, epsilon = 1e-3);
            assert_relative_eq!(px[2], 50.0, epsilon = 1e-3);
            assert_relative_eq!(px[3], 255.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_effective_radius_is_capped_by_region() {
        assert_eq!(effective_radius(20, 100, 100, 0.25), 20);
        assert_eq!(effective_radius(20, 40, 8, 0.25), 2);
        assert_eq!(effective_radius(20, 3, 3, 0.25), 0);
    }

    #[test]
    fn test_extract_and_write_back_roundtrip() {
        // 3x2 frame, 1 channel; ROI is the right 2x2 block.
        let mut frame = vec![1u8, 2, 3, 4, 5, 6];
        let rect = RoiRect { x: 1, y: 0, w: 2, h: 2 };
        let mut roi = Vec::new();
        extract_roi(&frame, 3, 1, rect, &mut roi);
        assert_eq!(roi, vec![2.0, 3.0, 5.0, 6.0]);

        let blurred = vec![9.4f32, 9.6, 300.0, -4.0];
        write_roi_back(&mut frame, &blurred, 3, 1, rect);
        assert_eq!(frame, vec![1, 9, 10, 4, 255, 0]);
    }
}
