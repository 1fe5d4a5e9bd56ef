//! Support analysis and repair for resin printer layer files.
//!
//! Every layer of a print file is a run-length encoded exposure mask. This
//! crate decides, pixel by pixel, whether cured resin rests on material in the
//! layer below, tracks unsupported islands across layers, regenerates
//! anti-aliasing sub-layers, and repairs layers by removing islands and
//! re-classifying the layers above until nothing changes.
//!
//! # Quick Start
//!
//! ```ignore
//! use photon_layers::{AnalysisParams, FixWorker, LayerFile, LayerTable, NullProgress, Resolution};
//!
//! let bytes = std::fs::read("model.photon")?;
//! let table = LayerTable { offset: header.layers_offset, layer_count: header.layer_count };
//! let params = AnalysisParams::new().with_margin(8).with_aa_level(header.aa_level);
//! let mut file = LayerFile::read_layers(&bytes, Resolution::new(1440, 2560), table, params, &NullProgress)?;
//!
//! file.calculate(&NullProgress, None)?;
//! println!("{} islands", file.islands().len());
//!
//! // Repair on a worker thread, streaming progress.
//! let worker = FixWorker::fix(file)?;
//! for batch in worker.messages() {
//!     println!("{batch}");
//! }
//! let (file, report) = worker.join()?;
//! ```
//!
//! # Features
//!
//! - **Continuous RLE codec**: runs may wrap across rows
//! - **Support classification**: five pixel states, propagated layer by layer
//! - **Bounded repair**: re-classification stops at the first unchanged layer
//! - **Optional parallelism**: Enable `rayon` feature for parallel anti-aliasing

// Core modules
pub mod analyze;
pub mod codec;
pub mod file;
pub mod grid;
pub mod image;
pub mod layer;
pub mod utils;

// Public API
pub use analyze::{IslandPolicy, Iterations, LayerAnalyzer, RepairOutcome};
pub use file::{AnalysisParams, FixReport, FixWorker, LayerFile, LayerSummary, LayerTable, LayerWorker};
pub use grid::{LayerGrid, PixelState};
pub use layer::{Layer, LayerDefinition};

// Image and geometry types
pub use image::{AaMatrix, GrayRaster, IslandRect, MultiLayerIsland, Resolution};

// Error and progress types
pub use utils::error::{LayerError, Result};
pub use utils::progress::{BatchedProgress, CancelToken, NullProgress, ProgressSink};

// Constants
pub const PHOTON_LAYERS_VERSION: &str = "0.1.0";
