// src/file/params.rs

use crate::analyze::analyzer::Iterations;
use crate::analyze::islands::IslandPolicy;
use crate::image::antialias::AaMatrix;
use crate::utils::progress::DEFAULT_BATCH_SIZE;

/// Analysis and repair settings of a layer file.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisParams {
    /// Border width in pixels for the margin check (0 disables it)
    pub margin: u32,
    /// Anti-aliasing level; level `n` carries `n - 1` sub-layers per layer (1 = none)
    pub aa_level: u32,
    /// Kernel used to regenerate anti-alias sub-layers
    pub aa_matrix: AaMatrix,
    /// Which tracked islands are reported and removed
    pub island_policy: IslandPolicy,
    /// Iteration budget of each repair pass
    pub repair_iterations: Iterations,
    /// Upper bound on remove-and-repair rounds in a fix
    pub max_fix_rounds: usize,
    /// Progress messages per batch when running on a worker
    pub progress_batch_size: usize,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            margin: 0,
            aa_level: 1,
            aa_matrix: AaMatrix::default(),
            island_policy: IslandPolicy::default(),
            repair_iterations: Iterations::Unbounded,
            max_fix_rounds: 5,
            progress_batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl AnalysisParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the margin width in pixels
    pub fn with_margin(mut self, margin: u32) -> Self {
        self.margin = margin;
        self
    }

    /// Sets the anti-aliasing level (clamped to at least 1)
    pub fn with_aa_level(mut self, level: u32) -> Self {
        self.aa_level = level.max(1);
        self
    }

    pub fn with_aa_matrix(mut self, matrix: AaMatrix) -> Self {
        self.aa_matrix = matrix;
        self
    }

    pub fn with_island_policy(mut self, policy: IslandPolicy) -> Self {
        self.island_policy = policy;
        self
    }

    pub fn with_repair_iterations(mut self, iterations: Iterations) -> Self {
        self.repair_iterations = iterations;
        self
    }

    pub fn with_max_fix_rounds(mut self, rounds: usize) -> Self {
        self.max_fix_rounds = rounds;
        self
    }

    pub fn with_progress_batch_size(mut self, size: usize) -> Self {
        self.progress_batch_size = size.max(1);
        self
    }

    /// Number of anti-alias sub-layers per layer.
    pub fn aa_sub_layers(&self) -> usize {
        self.aa_level.saturating_sub(1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_clamps() {
        let params = AnalysisParams::new()
            .with_aa_level(0)
            .with_progress_batch_size(0)
            .with_margin(3);
        assert_eq!(params.aa_level, 1);
        assert_eq!(params.aa_sub_layers(), 0);
        assert_eq!(params.progress_batch_size, 1);
        assert_eq!(params.margin, 3);
        assert_eq!(AnalysisParams::new().with_aa_level(4).aa_sub_layers(), 3);
    }
}
