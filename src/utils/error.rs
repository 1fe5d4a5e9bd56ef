// src/utils/error.rs

use thiserror::Error;

/// The primary error type for all layer analysis and repair operations.
#[derive(Error, Debug)]
pub enum LayerError {
    /// An error surfaced unchanged from the byte source (file slicing, layer table reads).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Decoded run positions exceed the declared resolution.
    #[error("Malformed run-length data: {0}")]
    MalformedRunLengthData(String),

    /// Packed and raw buffers are out of sync where consistency is required.
    #[error("Inconsistent layer state: {0}")]
    InconsistentLayerState(String),

    /// An invalid argument was provided to a function.
    #[error("Invalid argument: {0}")]
    InvalidArg(String),

    /// Occurs when a grid or raster does not match the expected resolution.
    #[error("Dimension mismatch: expected ({}, {}), but got ({}, {})", .expected.0, .expected.1, .actual.0, .actual.1)]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// A pass was cancelled between layers.
    #[error("Cancelled before layer {layer}")]
    Cancelled { layer: usize },

    /// A layer-level failure with the offending layer index attached.
    #[error("Layer {index}: {source}")]
    AtLayer {
        index: usize,
        #[source]
        source: Box<LayerError>,
    },
}

impl LayerError {
    /// Attaches a layer index, leaving already-indexed and cancellation errors untouched.
    pub fn at_layer(self, index: usize) -> Self {
        match self {
            err @ (LayerError::AtLayer { .. } | LayerError::Cancelled { .. }) => err,
            err => LayerError::AtLayer {
                index,
                source: Box::new(err),
            },
        }
    }

    /// Index of the layer this error was attached to, if any.
    pub fn layer_index(&self) -> Option<usize> {
        match self {
            LayerError::AtLayer { index, .. } => Some(*index),
            LayerError::Cancelled { layer } => Some(*layer),
            _ => None,
        }
    }
}

/// A specialized `Result` type for layer operations.
pub type Result<T> = std::result::Result<T, LayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_layer_wraps_once() {
        let err = LayerError::MalformedRunLengthData("run past end".to_string())
            .at_layer(3)
            .at_layer(7);
        assert_eq!(err.layer_index(), Some(3));
        assert_eq!(
            err.to_string(),
            "Layer 3: Malformed run-length data: run past end"
        );
    }

    #[test]
    fn cancelled_is_not_wrapped() {
        let err = LayerError::Cancelled { layer: 2 }.at_layer(5);
        assert!(matches!(err, LayerError::Cancelled { layer: 2 }));
    }

    #[test]
    fn io_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short");
        let err: LayerError = io.into();
        assert!(err.to_string().starts_with("I/O error"));
    }
}
