pub mod analyzer;
pub mod islands;

pub use analyzer::{Iterations, LayerAnalyzer, RepairOutcome};
pub use islands::{extract_rects, track_layers, IslandPolicy, IslandTracker};
