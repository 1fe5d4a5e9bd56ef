//! Pixel classification grid and island row runs.

pub mod grid;
pub mod runs;

pub use grid::{LayerGrid, PixelState};
pub use runs::{find_spans, IslandKind, IslandRun};
