// src/utils/log.rs

//! Logging setup for the layer analysis library.
//!
//! Library code logs through the `log` facade (`trace!`, `debug!`, `info!`,
//! `warn!`, `error!`). Applications that want to see those records can
//! install the `tracing-subscriber` formatter provided here, which also
//! captures `log` records.
//!
//! ```
//! photon_layers::utils::log::init_subscriber(photon_layers::utils::log::Level::DEBUG).ok();
//! ```

pub use log::{debug, error, info, trace, warn};
pub use tracing::Level;

use crate::utils::error::{LayerError, Result};
use tracing_subscriber::FmtSubscriber;

/// Initializes a global logging subscriber that writes to standard error.
///
/// Returns an error if a global subscriber or logger has already been set.
///
/// # Arguments
/// * `max_level` - The maximum level of messages to log (e.g., `Level::INFO`, `Level::DEBUG`).
pub fn init_subscriber(max_level: Level) -> Result<()> {
    FmtSubscriber::builder()
        .with_max_level(max_level)
        .with_thread_ids(true)
        .with_target(false)
        .try_init()
        .map_err(|e| LayerError::InvalidArg(format!("Logging already initialized: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_an_error() {
        // The first call may already have happened in another test.
        let _ = init_subscriber(Level::DEBUG);
        let err = init_subscriber(Level::INFO).unwrap_err();
        assert!(matches!(err, LayerError::InvalidArg(_)));
    }
}
