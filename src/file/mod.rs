pub mod layer_file;
pub mod params;
pub mod worker;

pub use layer_file::{FixReport, LayerFile, LayerSummary, LayerTable};
pub use params::AnalysisParams;
pub use worker::{FixWorker, LayerWorker};
