//! Classification passes over an ordered layer sequence.
//!
//! Layer `n` is classified against the finished grid of layer `n - 1`, so
//! both passes walk the layers strictly in order with two grids whose roles
//! are swapped after every layer. Cancellation is checked between layers;
//! a layer is either fully stored or untouched.

use std::collections::BTreeSet;
use std::fmt;
use std::mem;

use crate::analyze::islands::{IslandPolicy, IslandTracker};
use crate::codec::{self, Row};
use crate::grid::LayerGrid;
use crate::image::antialias::{threshold, threshold_rows, AaMatrix};
use crate::image::geom::{MultiLayerIsland, Resolution};
use crate::image::image_formats::GrayRaster;
use crate::layer::Layer;
use crate::utils::error::{LayerError, Result};
use crate::utils::progress::{CancelToken, NullProgress, ProgressSink};
use log::{debug, info, warn};

/// Iteration budget of a repair pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Iterations {
    /// At most `n` layers are recomputed.
    Limited(usize),
    /// Continue until a layer comes out unchanged or the last layer is reached.
    #[default]
    Unbounded,
}

impl Iterations {
    pub fn allows(&self, iteration: usize) -> bool {
        match self {
            Iterations::Limited(n) => iteration < *n,
            Iterations::Unbounded => true,
        }
    }
}

impl fmt::Display for Iterations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Iterations::Limited(n) => write!(f, "{}", n),
            Iterations::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Outcome of a repair pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairOutcome {
    /// First recomputed layer.
    pub start: usize,
    /// Number of layers recomputed.
    pub iterations: usize,
    /// Whether the last recomputed layer changed.
    pub last_changed: bool,
}

impl RepairOutcome {
    /// Index one past the last recomputed layer.
    pub fn end(&self) -> usize {
        self.start + self.iterations
    }
}

/// Runs the full and bounded classification passes.
pub struct LayerAnalyzer<'a> {
    resolution: Resolution,
    margin: u32,
    progress: &'a dyn ProgressSink,
    cancel: Option<&'a CancelToken>,
}

impl<'a> LayerAnalyzer<'a> {
    pub fn new(resolution: Resolution) -> Self {
        LayerAnalyzer {
            resolution,
            margin: 0,
            progress: &NullProgress,
            cancel: None,
        }
    }

    /// Border width for the margin check; 0 disables it.
    pub fn with_margin(mut self, margin: u32) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn check_cancel(&self, layer: usize) -> Result<()> {
        match self.cancel {
            Some(token) if token.is_cancelled() => {
                warn!("Pass cancelled before layer {}", layer);
                Err(LayerError::Cancelled { layer })
            }
            _ => Ok(()),
        }
    }

    /// Classifies every layer and returns the significant multi-layer islands.
    ///
    /// Anti-alias sub-layers are refreshed as raw views. The pass stops at the
    /// first failing layer; earlier layers keep their new classification.
    pub fn calculate(
        &self,
        layers: &mut [Layer],
        policy: &IslandPolicy,
    ) -> Result<BTreeSet<MultiLayerIsland>> {
        let count = layers.len();
        info!("Calculating {} layers", count);

        let mut tracker = IslandTracker::new();
        let mut current = LayerGrid::new(self.resolution);
        let mut previous = LayerGrid::new(self.resolution);
        let mut previous_rows: Option<Vec<Row>> = None;

        for (index, layer) in layers.iter_mut().enumerate() {
            self.check_cancel(index)?;
            self.progress
                .show_info(&format!("Calculating layer {}/{}", index + 1, count));

            let rows = self
                .classify_layer(layer, &mut current, previous_rows.as_deref(), &previous)
                .map_err(|e| e.at_layer(index))?;

            let sub_count = layer.anti_alias_layers().len();
            for (sub, aa) in layer.anti_alias_layers_mut().iter_mut().enumerate() {
                self.progress.show_info(&format!(
                    "Calculating layer {}/{} anti-alias {}/{}",
                    index + 1,
                    count,
                    sub + 1,
                    sub_count
                ));
                aa.refresh_raw_view(self.resolution)
                    .map_err(|e| e.at_layer(index))?;
            }

            tracker.add_layer(index, layer.island_rects());
            previous_rows = Some(rows);
            mem::swap(&mut current, &mut previous);
        }

        let islands = tracker.finish(policy);
        info!(
            "Calculated {} layers, {} with islands, {} multi-layer islands",
            count,
            layers.iter().filter(|l| l.has_islands()).count(),
            islands.len()
        );
        Ok(islands)
    }

    /// Re-classifies layers from `start` until a layer comes out unchanged.
    ///
    /// The layer below `start` seeds the previous state. At least two layers
    /// are recomputed (when they exist and the budget allows), since a change
    /// at `start` can alter the support of `start + 1`.
    pub fn recalculate_from(
        &self,
        layers: &mut [Layer],
        start: usize,
        iterations: Iterations,
    ) -> Result<RepairOutcome> {
        if start >= layers.len() {
            return Err(LayerError::InvalidArg(format!(
                "repair start {} is past the last of {} layers",
                start,
                layers.len()
            )));
        }

        let (mut previous_rows, mut previous) = if start > 0 {
            let below = &layers[start - 1];
            let rows = codec::unpack(below.image_data(), self.resolution)
                .map_err(|e| e.at_layer(start - 1))?
                .rows;
            let grid = below
                .grid(self.resolution)
                .map_err(|e| e.at_layer(start - 1))?;
            (Some(rows), grid)
        } else {
            (None, LayerGrid::new(self.resolution))
        };
        let mut current = LayerGrid::new(self.resolution);

        let mut changed = false;
        let mut i = 0usize;
        while iterations.allows(i) && (i < 2 || changed) && start + i < layers.len() {
            let index = start + i;
            self.check_cancel(index)?;
            self.progress.show_info(&format!(
                "Recalculating layer {} (iteration {}, budget {})",
                index + 1,
                i + 1,
                iterations
            ));

            let layer = &mut layers[index];
            let old = layer
                .classification(self.resolution)
                .map_err(|e| e.at_layer(index))?;
            let rows = self
                .classify_layer(layer, &mut current, previous_rows.as_deref(), &previous)
                .map_err(|e| e.at_layer(index))?;
            changed = old.as_ref() != Some(&current);
            debug!("Layer {} recalculated, changed: {}", index, changed);

            previous_rows = Some(rows);
            mem::swap(&mut current, &mut previous);
            i += 1;
        }

        Ok(RepairOutcome {
            start,
            iterations: i,
            last_changed: changed,
        })
    }

    /// Unpacks, margin-checks and classifies one layer into `current`, then
    /// stores the classification. Returns the unpacked rows for the next layer.
    fn classify_layer(
        &self,
        layer: &mut Layer,
        current: &mut LayerGrid,
        previous_rows: Option<&[Row]>,
        previous: &LayerGrid,
    ) -> Result<Vec<Row>> {
        let image = layer.unpack_image(self.resolution)?;
        if layer.update_margin(&image.rows, self.resolution, self.margin) {
            warn!("Layer extends into the {} pixel margin", self.margin);
        }
        current.classify(&image.rows, previous_rows.map(|rows| (rows, previous)))?;
        layer.store_classification(current);
        Ok(image.rows)
    }

    /// Rebuilds the `level - 1` anti-alias sub-layers of every layer.
    ///
    /// Each layer's image is rendered as a 0/255 raster, blurred by `matrix`
    /// and thresholded at `k × 255 / level` for sub-layer `k`.
    pub fn calculate_aa_layers(
        &self,
        layers: &mut [Layer],
        matrix: &AaMatrix,
        level: u32,
    ) -> Result<()> {
        if level == 0 {
            return Err(LayerError::InvalidArg(
                "anti-aliasing level must be at least 1".to_string(),
            ));
        }
        let count = layers.len();
        info!("Calculating anti-aliasing level {} for {} layers", level, count);

        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            let resolution = self.resolution;
            let cancel = self.cancel;
            self.progress
                .show_info(&format!("Calculating anti-aliasing for {} layers", count));
            layers
                .par_iter_mut()
                .enumerate()
                .map(|(index, layer)| {
                    if cancel.is_some_and(|token| token.is_cancelled()) {
                        return Err(LayerError::Cancelled { layer: index });
                    }
                    calculate_aa_layer(layer, resolution, matrix, level)
                        .map_err(|e| e.at_layer(index))
                })
                .collect::<Result<Vec<_>>>()?;
        }

        #[cfg(not(feature = "rayon"))]
        for (index, layer) in layers.iter_mut().enumerate() {
            self.check_cancel(index)?;
            self.progress.show_info(&format!(
                "Calculating anti-aliasing for layer {}/{}",
                index + 1,
                count
            ));
            calculate_aa_layer(layer, self.resolution, matrix, level)
                .map_err(|e| e.at_layer(index))?;
        }

        Ok(())
    }
}

fn calculate_aa_layer(
    layer: &mut Layer,
    resolution: Resolution,
    matrix: &AaMatrix,
    level: u32,
) -> Result<()> {
    let image = codec::unpack(layer.image_data(), resolution)?;
    let source = GrayRaster::from_rows(resolution.width, resolution.height, &image.rows);
    let target = matrix.calc(&source);

    let subs: Vec<LayerGrid> = (1..level)
        .map(|k| LayerGrid::from_rows(&threshold_rows(&target, threshold(level, k)), resolution))
        .collect();
    layer.ensure_anti_alias_layers(subs.len());
    for (aa, grid) in layer.anti_alias_layers_mut().iter_mut().zip(&subs) {
        aa.save_classification(grid);
    }
    Ok(())
}
