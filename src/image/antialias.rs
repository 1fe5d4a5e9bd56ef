//! Anti-aliasing weight matrix.
//!
//! `AaMatrix::calc` blurs a 0/255 raster with a fixed 5×5 neighbor-weighting
//! kernel. Each output value is the weighted mean of the in-bounds neighbors,
//! so it measures local foreground density in `[0, 255]`. For an
//! anti-aliasing level `N`, sub-layer `k` (1-indexed) keeps the pixels whose
//! density reaches [`threshold`]`(N, k)`.
//!
//! ```text
//! default kernel (zero outside the 3×3 core)
//!     1   2   1
//!     2   4   2
//!     1   2   1
//! ```

use crate::codec::Row;
use crate::image::image_formats::{GrayPixel, GrayRaster};
use crate::utils::error::{LayerError, Result};
use bitvec::prelude::*;

/// Side length of the kernel.
pub const AA_MATRIX_SIZE: usize = 5;

const CENTER: i64 = (AA_MATRIX_SIZE / 2) as i64;

/// A stateless neighbor-weighting kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AaMatrix {
    weights: [[u32; AA_MATRIX_SIZE]; AA_MATRIX_SIZE],
}

impl Default for AaMatrix {
    fn default() -> Self {
        let mut weights = [[0u32; AA_MATRIX_SIZE]; AA_MATRIX_SIZE];
        let core = [[1, 2, 1], [2, 4, 2], [1, 2, 1]];
        for (dy, row) in core.iter().enumerate() {
            for (dx, &w) in row.iter().enumerate() {
                weights[dy + 1][dx + 1] = w;
            }
        }
        AaMatrix { weights }
    }
}

impl AaMatrix {
    /// Creates a matrix from explicit weights, indexed `[dy][dx]` with the
    /// center at `[2][2]`. At least one weight must be non-zero.
    pub fn new(weights: [[u32; AA_MATRIX_SIZE]; AA_MATRIX_SIZE]) -> Result<Self> {
        if weights.iter().flatten().all(|&w| w == 0) {
            return Err(LayerError::InvalidArg(
                "Anti-aliasing matrix needs at least one non-zero weight".to_string(),
            ));
        }
        Ok(AaMatrix { weights })
    }

    /// The identity kernel: `calc` returns its input unchanged.
    pub fn identity() -> Self {
        let mut weights = [[0u32; AA_MATRIX_SIZE]; AA_MATRIX_SIZE];
        weights[CENTER as usize][CENTER as usize] = 1;
        AaMatrix { weights }
    }

    /// Produces the graylevel density raster for `source`.
    pub fn calc(&self, source: &GrayRaster) -> GrayRaster {
        let (width, height) = source.dimensions();
        let mut target = GrayRaster::new(width, height);
        let src = source.as_raw();
        let w = width as i64;
        let h = height as i64;

        for y in 0..h {
            for x in 0..w {
                let mut sum = 0u64;
                let mut total = 0u64;
                for (dy, row) in self.weights.iter().enumerate() {
                    let sy = y + dy as i64 - CENTER;
                    if sy < 0 || sy >= h {
                        continue;
                    }
                    for (dx, &weight) in row.iter().enumerate() {
                        let sx = x + dx as i64 - CENTER;
                        if weight == 0 || sx < 0 || sx >= w {
                            continue;
                        }
                        sum += weight as u64 * src[(sy * w + sx) as usize] as u64;
                        total += weight as u64;
                    }
                }
                let value = if total == 0 {
                    src[(y * w + x) as usize] as u64
                } else {
                    (sum + total / 2) / total
                };
                target.put_pixel(x as u32, y as u32, GrayPixel::new(value.min(255) as u8));
            }
        }
        target
    }
}

/// Density threshold for sub-layer `sub_layer` (1-indexed) at anti-aliasing `level`.
pub fn threshold(level: u32, sub_layer: u32) -> u8 {
    if level == 0 {
        return 255;
    }
    (sub_layer as u64 * 255 / level as u64).min(255) as u8
}

/// Binary rows of the pixels whose density is at least `threshold`.
pub fn threshold_rows(raster: &GrayRaster, threshold: u8) -> Vec<Row> {
    let (width, height) = raster.dimensions();
    let raw = raster.as_raw();
    (0..height as usize)
        .map(|y| {
            let line = &raw[y * width as usize..(y + 1) * width as usize];
            line.iter().map(|&v| v >= threshold).collect::<BitVec<u32, Lsb0>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(width: u32, height: u32, x1: u32, y1: u32, x2: u32, y2: u32) -> GrayRaster {
        let mut raster = GrayRaster::new(width, height);
        for y in y1..=y2 {
            for x in x1..=x2 {
                raster.put_pixel(x, y, GrayPixel::white());
            }
        }
        raster
    }

    #[test]
    fn level_four_thresholds() {
        assert_eq!(threshold(4, 1), 63);
        assert_eq!(threshold(4, 2), 127);
        assert_eq!(threshold(4, 3), 191);
        assert_eq!(threshold(2, 1), 127);
    }

    #[test]
    fn threshold_splits_at_boundary() {
        let mut raster = GrayRaster::new(3, 1);
        raster.put_pixel(0, 0, GrayPixel::new(126));
        raster.put_pixel(1, 0, GrayPixel::new(127));
        raster.put_pixel(2, 0, GrayPixel::new(200));
        let rows = threshold_rows(&raster, threshold(4, 2));
        assert_eq!(rows.len(), 1);
        assert!(!rows[0][0]);
        assert!(rows[0][1]);
        assert!(rows[0][2]);
    }

    #[test]
    fn identity_keeps_input() {
        let source = square(6, 6, 1, 1, 3, 4);
        assert_eq!(AaMatrix::identity().calc(&source), source);
    }

    #[test]
    fn default_kernel_softens_edges() {
        let source = square(9, 9, 2, 2, 6, 6);
        let target = AaMatrix::default().calc(&source);
        // Interior stays solid, edges fade, far background stays empty.
        assert_eq!(target.get_pixel(4, 4).y, 255);
        let edge = target.get_pixel(2, 4).y;
        assert!(edge > 0 && edge < 255, "edge = {}", edge);
        let outside = target.get_pixel(1, 4).y;
        assert!(outside > 0 && outside < edge);
        assert_eq!(target.get_pixel(0, 0).y, 0);
    }

    #[test]
    fn solid_image_stays_solid_at_borders() {
        let source = square(4, 4, 0, 0, 3, 3);
        let target = AaMatrix::default().calc(&source);
        assert!(target.as_raw().iter().all(|&v| v == 255));
    }

    #[test]
    fn all_zero_matrix_is_rejected() {
        assert!(AaMatrix::new([[0; AA_MATRIX_SIZE]; AA_MATRIX_SIZE]).is_err());
    }
}
