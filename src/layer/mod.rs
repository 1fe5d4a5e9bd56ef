pub mod definition;
pub mod layer;

pub use definition::{LayerDefinition, LAYER_DEFINITION_SIZE};
pub use layer::{check_margin, Layer};
