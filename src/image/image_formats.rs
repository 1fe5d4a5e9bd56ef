// src/image/image_formats.rs

//! Graylevel raster used by the anti-aliasing pass.
//!
//! A `GrayRaster` holds one 8-bit value per pixel in row-major order. The
//! anti-aliasing matrix reads a 0/255 raster rendered from a layer's mask and
//! writes a blurred raster whose values are thresholded into sub-layers.

use crate::codec::Row;
use bytemuck::{Pod, Zeroable};

/// A single grayscale pixel with an 8-bit intensity value.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GrayPixel {
    pub y: u8,
}

unsafe impl Pod for GrayPixel {}
unsafe impl Zeroable for GrayPixel {}

impl GrayPixel {
    pub fn new(y: u8) -> Self {
        GrayPixel { y }
    }

    pub fn black() -> Self {
        GrayPixel { y: 0 }
    }

    pub fn white() -> Self {
        GrayPixel { y: 255 }
    }
}

/// A 2D buffer of grayscale pixels stored in row-major order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayRaster {
    width: u32,
    height: u32,
    data: Vec<GrayPixel>,
}

impl GrayRaster {
    /// Creates a new raster with the given dimensions, initialized to 0.
    pub fn new(width: u32, height: u32) -> Self {
        GrayRaster {
            width,
            height,
            data: vec![GrayPixel::black(); width as usize * height as usize],
        }
    }

    /// Renders unpacked mask rows as a 0/255 raster. Missing rows stay 0.
    pub fn from_rows(width: u32, height: u32, rows: &[Row]) -> Self {
        let mut raster = Self::new(width, height);
        for (y, row) in rows.iter().enumerate().take(height as usize) {
            for x in row.iter_ones().take_while(|&x| x < width as usize) {
                raster.data[y * width as usize + x] = GrayPixel::white();
            }
        }
        raster
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> GrayPixel {
        assert!(x < self.width && y < self.height);
        self.data[(y as usize) * self.width as usize + x as usize]
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, pixel: GrayPixel) {
        assert!(x < self.width && y < self.height);
        self.data[(y as usize) * self.width as usize + x as usize] = pixel;
    }

    /// Returns the dimensions as a tuple (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns raw pixel data as a byte slice.
    pub fn as_raw(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Returns mutable raw pixel data as a byte slice.
    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.data)
    }
}
