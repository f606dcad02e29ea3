//! Gradient analysis for the plate search.
//!
//! Converts the buffer to luma, runs a 3x3 Sobel operator and stores two
//! summed-area tables so any window's edge density is an O(1) lookup:
//! one over edge pixels on the sampling lattice, one per row over pixels
//! with a strong horizontal gradient (the vertical strokes of characters).

use ndarray::Array2;

use crate::shared::pixel_buffer::PixelBuffer;

/// Pixel rectangle `[x0, x1) x [y0, y1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchArea {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl SearchArea {
    pub fn full(width: usize, height: usize) -> Self {
        Self {
            x0: 0,
            y0: 0,
            x1: width,
            y1: height,
        }
    }

    /// Smallest area covering all of `areas`; `None` when there are none.
    pub fn covering(areas: &[SearchArea]) -> Option<Self> {
        areas.iter().copied().reduce(|a, b| Self {
            x0: a.x0.min(b.x0),
            y0: a.y0.min(b.y0),
            x1: a.x1.max(b.x1),
            y1: a.y1.max(b.y1),
        })
    }

    pub fn width(&self) -> usize {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> usize {
        self.y1.saturating_sub(self.y0)
    }

    fn clipped(&self, width: usize, height: usize) -> Self {
        let x1 = self.x1.min(width);
        let y1 = self.y1.min(height);
        Self {
            x0: self.x0.min(x1),
            y0: self.y0.min(y1),
            x1,
            y1,
        }
    }

    fn grown(&self, by: usize, width: usize, height: usize) -> Self {
        Self {
            x0: self.x0.saturating_sub(by),
            y0: self.y0.saturating_sub(by),
            x1: (self.x1 + by).min(width),
            y1: (self.y1 + by).min(height),
        }
    }
}

/// Rec. 601 luma of the pixels inside `area`.
pub fn luma(buffer: &PixelBuffer, area: &SearchArea) -> Array2<f32> {
    let src = buffer.as_ndarray();
    let (x0, y0) = (area.x0, area.y0);
    Array2::from_shape_fn((area.height(), area.width()), |(y, x)| {
        let (y, x) = (y0 + y, x0 + x);
        0.299 * src[[y, x, 0]] as f32 + 0.587 * src[[y, x, 1]] as f32 + 0.114 * src[[y, x, 2]] as f32
    })
}

/// Sobel gradients `(gx, gy)`. Border pixels have zero gradient.
pub fn sobel(gray: &Array2<f32>) -> (Array2<f32>, Array2<f32>) {
    let (h, w) = gray.dim();
    let mut gx = Array2::<f32>::zeros((h, w));
    let mut gy = Array2::<f32>::zeros((h, w));
    if h < 3 || w < 3 {
        return (gx, gy);
    }
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let p = |dy: usize, dx: usize| gray[[y + dy - 1, x + dx - 1]];
            gx[[y, x]] = -p(0, 0) + p(0, 2) - 2.0 * p(1, 0) + 2.0 * p(1, 2) - p(2, 0) + p(2, 2);
            gy[[y, x]] = -p(0, 0) - 2.0 * p(0, 1) - p(0, 2) + p(2, 0) + 2.0 * p(2, 1) + p(2, 2);
        }
    }
    (gx, gy)
}

/// Edge statistics over one area of a buffer. Lookups take buffer
/// coordinates and are clipped to the area.
pub struct EdgeMap {
    area: SearchArea,
    sample_step: usize,
    /// `(height + 1) x (width + 1)` summed-area table of sampled edge pixels.
    edge_sat: Array2<u32>,
    /// `height x (width + 1)` per-row prefix sums of stroke pixels.
    stroke_rows: Array2<u32>,
}

impl EdgeMap {
    /// A pixel is an edge when its gradient magnitude exceeds `threshold`;
    /// it is a stroke when `|gx|` alone does. Density lookups only count
    /// pixels whose buffer coordinates are multiples of `sample_step`.
    pub fn compute(
        buffer: &PixelBuffer,
        area: &SearchArea,
        threshold: f32,
        sample_step: usize,
    ) -> Self {
        let sample_step = sample_step.max(1);
        let (fw, fh) = (buffer.width() as usize, buffer.height() as usize);
        let area = area.clipped(fw, fh);
        // One pixel of context so gradients on the area's border match the whole frame.
        let context = area.grown(1, fw, fh);
        let gray = luma(buffer, &context);
        let (gx, gy) = sobel(&gray);
        let (ox, oy) = (area.x0 - context.x0, area.y0 - context.y0);
        let (w, h) = (area.width(), area.height());

        let mut edge_sat = Array2::<u32>::zeros((h + 1, w + 1));
        let mut stroke_rows = Array2::<u32>::zeros((h, w + 1));
        for y in 0..h {
            let sampled_row = (area.y0 + y) % sample_step == 0;
            let mut row_edges = 0u32;
            for x in 0..w {
                let (dx, dy) = (gx[[y + oy, x + ox]], gy[[y + oy, x + ox]]);
                let is_edge = (dx * dx + dy * dy).sqrt() > threshold;
                if is_edge && sampled_row && (area.x0 + x) % sample_step == 0 {
                    row_edges += 1;
                }
                edge_sat[[y + 1, x + 1]] = edge_sat[[y, x + 1]] + row_edges;
                stroke_rows[[y, x + 1]] = stroke_rows[[y, x]] + u32::from(dx.abs() > threshold);
            }
        }

        Self {
            area,
            sample_step,
            edge_sat,
            stroke_rows,
        }
    }

    pub fn area(&self) -> SearchArea {
        self.area
    }

    /// Fraction of sampled pixels in the window that are edges.
    pub fn edge_density(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        let a = &self.area;
        let (x0, y0) = (x.max(a.x0), y.max(a.y0));
        let (x1, y1) = ((x + w).min(a.x1), (y + h).min(a.y1));
        if x0 >= x1 || y0 >= y1 {
            return 0.0;
        }
        let samples =
            lattice_count(x0, x1, self.sample_step) * lattice_count(y0, y1, self.sample_step);
        if samples == 0 {
            return 0.0;
        }
        let (lx0, ly0, lx1, ly1) = (x0 - a.x0, y0 - a.y0, x1 - a.x0, y1 - a.y0);
        let sat = &self.edge_sat;
        let edges =
            (sat[[ly1, lx1]] + sat[[ly0, lx0]]) as i64 - (sat[[ly0, lx1]] + sat[[ly1, lx0]]) as i64;
        edges as f64 / samples as f64
    }

    /// Fraction of pixels on row `y` within `[x, x + w)` with a strong horizontal gradient.
    pub fn stroke_density(&self, y: usize, x: usize, w: usize) -> f64 {
        let a = &self.area;
        let (x0, x1) = (x.max(a.x0), (x + w).min(a.x1));
        if y < a.y0 || y >= a.y1 || x0 >= x1 {
            return 0.0;
        }
        let row = y - a.y0;
        let strokes = self.stroke_rows[[row, x1 - a.x0]] - self.stroke_rows[[row, x0 - a.x0]];
        strokes as f64 / (x1 - x0) as f64
    }
}

/// Number of multiples of `step` in `[start, end)`.
fn lattice_count(start: usize, end: usize, step: usize) -> usize {
    end.div_ceil(step) - start.div_ceil(step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn vertical_stripes(width: u32, height: u32, stripe: u32) -> PixelBuffer {
        let mut buffer = PixelBuffer::filled(width, height, [0, 0, 0, 255]);
        for x in 0..width {
            if (x / stripe) % 2 == 0 {
                buffer.fill_rect(x, 0, 1, height, [255, 255, 255, 255]);
            }
        }
        buffer
    }

    #[test]
    fn test_luma_weights() {
        let buffer = PixelBuffer::filled(1, 1, [100, 200, 50, 255]);
        let gray = luma(&buffer, &SearchArea::full(1, 1));
        assert_relative_eq!(gray[[0, 0]], 0.299 * 100.0 + 0.587 * 200.0 + 0.114 * 50.0, epsilon = 1e-3);
    }

    #[test]
    fn test_sobel_uniform_is_zero() {
        let gray = Array2::<f32>::from_elem((5, 5), 80.0);
        let (gx, gy) = sobel(&gray);
        assert!(gx.iter().chain(gy.iter()).all(|&v| v == 0.0));
    }

    #[test]
    fn test_sobel_vertical_step_has_horizontal_gradient() {
        let gray = Array2::from_shape_fn((5, 6), |(_, x)| if x < 3 { 0.0 } else { 100.0 });
        let (gx, gy) = sobel(&gray);
        assert_relative_eq!(gx[[2, 2]], 400.0);
        assert_relative_eq!(gx[[2, 3]], 400.0);
        assert_relative_eq!(gy[[2, 2]], 0.0);
    }

    #[test]
    fn test_uniform_image_has_no_edges() {
        let buffer = PixelBuffer::filled(64, 64, [120, 120, 120, 255]);
        let map = EdgeMap::compute(&buffer, &SearchArea::full(64, 64), 30.0, 2);
        assert_relative_eq!(map.edge_density(0, 0, 64, 64), 0.0);
        assert_relative_eq!(map.stroke_density(32, 0, 64), 0.0);
    }

    #[test]
    fn test_stripes_give_half_density() {
        // 4px stripes: the two columns either side of every transition are edges.
        let buffer = vertical_stripes(64, 32, 4);
        let map = EdgeMap::compute(&buffer, &SearchArea::full(64, 32), 30.0, 2);
        assert_relative_eq!(map.edge_density(8, 8, 32, 16), 0.5);
        assert_relative_eq!(map.stroke_density(16, 8, 32), 0.5);
    }

    #[test]
    fn test_window_is_clipped_to_map() {
        let buffer = vertical_stripes(16, 16, 4);
        let map = EdgeMap::compute(&buffer, &SearchArea::full(16, 16), 30.0, 1);
        assert!(map.edge_density(12, 12, 100, 100) <= 1.0);
        assert_relative_eq!(map.edge_density(20, 20, 4, 4), 0.0);
    }

    fn checkerboard(width: u32, height: u32, cell: u32) -> PixelBuffer {
        let mut buffer = PixelBuffer::filled(width, height, [20, 20, 20, 255]);
        for y in 0..height {
            for x in 0..width {
                if ((x / cell) + (y / cell)) % 2 == 0 {
                    buffer.set_rgba(x as usize, y as usize, [220, 220, 220, 255]);
                }
            }
        }
        buffer
    }

    #[test]
    fn test_area_map_matches_full_frame_inside_area() {
        let buffer = checkerboard(80, 60, 3);
        let full = EdgeMap::compute(&buffer, &SearchArea::full(80, 60), 30.0, 2);
        let area = SearchArea {
            x0: 11,
            y0: 23,
            x1: 70,
            y1: 60,
        };
        let part = EdgeMap::compute(&buffer, &area, 30.0, 2);

        for (x, y, w, h) in [(11, 23, 20, 10), (12, 30, 33, 7), (40, 50, 30, 10), (11, 23, 59, 37)] {
            assert_relative_eq!(part.edge_density(x, y, w, h), full.edge_density(x, y, w, h));
        }
        for (y, x, w) in [(23, 11, 40), (45, 13, 50), (59, 20, 50)] {
            assert_relative_eq!(part.stroke_density(y, x, w), full.stroke_density(y, x, w));
        }
    }

    #[test]
    fn test_area_map_ignores_windows_outside_area() {
        let buffer = checkerboard(80, 60, 3);
        let area = SearchArea {
            x0: 40,
            y0: 30,
            x1: 80,
            y1: 60,
        };
        let part = EdgeMap::compute(&buffer, &area, 30.0, 2);

        assert_relative_eq!(part.edge_density(0, 0, 30, 20), 0.0);
        assert_relative_eq!(part.stroke_density(10, 40, 20), 0.0);
        assert!(part.edge_density(40, 30, 20, 20) > 0.0);
    }

    #[test]
    fn test_area_is_clipped_to_buffer() {
        let buffer = checkerboard(32, 32, 4);
        let area = SearchArea {
            x0: 16,
            y0: 16,
            x1: 100,
            y1: 100,
        };
        let map = EdgeMap::compute(&buffer, &area, 30.0, 1);
        assert_eq!(
            map.area(),
            SearchArea {
                x0: 16,
                y0: 16,
                x1: 32,
                y1: 32
            }
        );
    }

    #[test]
    fn test_covering_area() {
        let a = SearchArea {
            x0: 10,
            y0: 40,
            x1: 50,
            y1: 60,
        };
        let b = SearchArea {
            x0: 30,
            y0: 20,
            x1: 90,
            y1: 55,
        };
        assert_eq!(
            SearchArea::covering(&[a, b]),
            Some(SearchArea {
                x0: 10,
                y0: 20,
                x1: 90,
                y1: 60
            })
        );
        assert_eq!(SearchArea::covering(&[]), None);
    }

    #[test]
    fn test_lattice_count() {
        assert_eq!(lattice_count(0, 10, 2), 5);
        assert_eq!(lattice_count(1, 10, 2), 4);
        assert_eq!(lattice_count(3, 4, 2), 0);
        assert_eq!(lattice_count(5, 9, 1), 4);
    }
}
