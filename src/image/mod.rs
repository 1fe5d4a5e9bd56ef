//! Geometry, graylevel rasters, and the anti-aliasing matrix.

pub mod antialias;
pub mod geom;
pub mod image_formats;

pub use antialias::AaMatrix;
pub use geom::{IslandRect, MultiLayerIsland, Resolution};
pub use image_formats::{GrayPixel, GrayRaster};
