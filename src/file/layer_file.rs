//! The ordered layer set of one print file and the operations that mutate it.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Write};

use crate::analyze::analyzer::{LayerAnalyzer, RepairOutcome};
use crate::analyze::islands::track_layers;
use crate::file::params::AnalysisParams;
use crate::image::geom::{IslandRect, MultiLayerIsland, Resolution};
use crate::layer::{Layer, LayerDefinition, LAYER_DEFINITION_SIZE};
use crate::utils::error::{LayerError, Result};
use crate::utils::progress::{CancelToken, ProgressSink};
use log::{debug, info, warn};

/// Location of the layer definition table inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerTable {
    /// Byte offset of the first record.
    pub offset: usize,
    /// Number of print layers (anti-alias records not included).
    pub layer_count: usize,
}

/// Outcome of [`LayerFile::fix_layers`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FixReport {
    /// Remove-and-repair rounds run.
    pub rounds: usize,
    /// Island pixels turned off over all rounds.
    pub pixels_removed: u64,
    /// Significant islands left after the last round.
    pub remaining_islands: usize,
}

/// Totals over all layers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LayerSummary {
    pub layers: usize,
    pub pixels: u64,
    pub island_pixels: u64,
    pub island_supported_pixels: u64,
    pub layers_with_islands: usize,
    pub margin_layers: usize,
}

/// Layers, resolution and analysis state of one print file.
///
/// Everything that changes a layer's image or classification goes through
/// this type, which keeps the multi-layer island set in step with the layers.
#[derive(Debug, Clone)]
pub struct LayerFile {
    resolution: Resolution,
    params: AnalysisParams,
    layers: Vec<Layer>,
    islands: BTreeSet<MultiLayerIsland>,
}

impl LayerFile {
    pub fn new(resolution: Resolution, layers: Vec<Layer>, params: AnalysisParams) -> Result<Self> {
        let max_subs = params.aa_sub_layers();
        if let Some(index) = layers
            .iter()
            .position(|l| l.anti_alias_layers().len() > max_subs)
        {
            return Err(LayerError::InvalidArg(format!(
                "layer {} has {} anti-alias layers, level {} allows {}",
                index,
                layers[index].anti_alias_layers().len(),
                params.aa_level,
                max_subs
            )));
        }
        Ok(LayerFile {
            resolution,
            params,
            layers,
            islands: BTreeSet::new(),
        })
    }

    /// Reads the layer table at `table.offset` of the whole-file buffer.
    ///
    /// The table holds `layer_count` records for the print layers followed by
    /// `aa_level - 1` groups of `layer_count` anti-alias records; record `i` of
    /// every group belongs to print layer `i`.
    pub fn read_layers(
        file: &[u8],
        resolution: Resolution,
        table: LayerTable,
        params: AnalysisParams,
        progress: &dyn ProgressSink,
    ) -> Result<Self> {
        let count = table.layer_count;
        let mut cursor = Cursor::new(file);
        cursor.set_position(table.offset as u64);

        let mut layers = Vec::with_capacity(count);
        for index in 0..count {
            progress.show_info(&format!("Reading layer {}/{}", index + 1, count));
            let definition = LayerDefinition::read_from(&mut cursor).map_err(|e| e.at_layer(index))?;
            layers.push(Layer::from_file_bytes(definition, file).map_err(|e| e.at_layer(index))?);
        }

        let subs = params.aa_sub_layers();
        for sub in 0..subs {
            for (index, layer) in layers.iter_mut().enumerate() {
                progress.show_info(&format!(
                    "Reading anti-alias {}/{} layer {}/{}",
                    sub + 2,
                    params.aa_level,
                    index + 1,
                    count
                ));
                let definition =
                    LayerDefinition::read_from(&mut cursor).map_err(|e| e.at_layer(index))?;
                let aa = Layer::from_file_bytes(definition, file).map_err(|e| e.at_layer(index))?;
                layer.add_anti_alias_layer(aa);
            }
        }
        info!(
            "Read {} layers with {} anti-alias layers each",
            count, subs
        );
        Self::new(resolution, layers, params)
    }

    /// Assigns data addresses and writes the layer table followed by the
    /// image data, the way [`LayerFile::read_layers`] expects them.
    ///
    /// `writer` must be positioned at `table_offset`. Returns the offset just
    /// past the last data byte.
    pub fn write_layers<W: Write>(&mut self, writer: &mut W, table_offset: usize) -> Result<usize> {
        let subs = self.params.aa_sub_layers();
        if let Some(index) = self
            .layers
            .iter()
            .position(|l| l.anti_alias_layers().len() != subs)
        {
            return Err(LayerError::InconsistentLayerState(format!(
                "layer {} has {} anti-alias layers, expected {}",
                index,
                self.layers[index].anti_alias_layers().len(),
                subs
            )));
        }

        let records = self.layers.len() * (1 + subs);
        let mut position = table_offset + records * LAYER_DEFINITION_SIZE;
        for layer in &mut self.layers {
            position = layer.assign_data_address(position)?;
        }
        for sub in 0..subs {
            for layer in &mut self.layers {
                position = layer.anti_alias_layers_mut()[sub].assign_data_address(position)?;
            }
        }

        for layer in self.records() {
            layer.definition().write_to(writer)?;
        }
        for layer in self.records() {
            writer.write_all(layer.image_data())?;
        }
        debug!("Wrote {} layer records, data ends at {}", records, position);
        Ok(position)
    }

    /// Layers in table order: print layers, then each anti-alias group.
    fn records(&self) -> impl Iterator<Item = &Layer> {
        let subs = self.params.aa_sub_layers();
        self.layers.iter().chain(
            (0..subs).flat_map(move |sub| self.layers.iter().map(move |l| &l.anti_alias_layers()[sub])),
        )
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn params(&self) -> &AnalysisParams {
        &self.params
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Significant multi-layer islands from the last pass.
    pub fn islands(&self) -> &BTreeSet<MultiLayerIsland> {
        &self.islands
    }

    /// True when every layer holds an authoritative classification.
    pub fn is_calculated(&self) -> bool {
        self.layers.iter().all(Layer::is_calculated)
    }

    fn analyzer<'a>(
        &self,
        progress: &'a dyn ProgressSink,
        cancel: Option<&'a CancelToken>,
    ) -> LayerAnalyzer<'a> {
        let analyzer = LayerAnalyzer::new(self.resolution)
            .with_margin(self.params.margin)
            .with_progress(progress);
        match cancel {
            Some(token) => analyzer.with_cancel(token),
            None => analyzer,
        }
    }

    /// Runs the full classification pass and replaces the island set.
    pub fn calculate(
        &mut self,
        progress: &dyn ProgressSink,
        cancel: Option<&CancelToken>,
    ) -> Result<()> {
        let analyzer = self.analyzer(progress, cancel);
        match analyzer.calculate(&mut self.layers, &self.params.island_policy) {
            Ok(islands) => {
                self.islands = islands;
                Ok(())
            }
            Err(e) => {
                self.settle_after_error(&e, 0);
                Err(e)
            }
        }
    }

    /// Runs the bounded repair pass from `start` and rebuilds the island set.
    pub fn recalculate_from(
        &mut self,
        start: usize,
        progress: &dyn ProgressSink,
        cancel: Option<&CancelToken>,
    ) -> Result<RepairOutcome> {
        let analyzer = self.analyzer(progress, cancel);
        match analyzer.recalculate_from(&mut self.layers, start, self.params.repair_iterations) {
            Ok(outcome) => {
                self.rebuild_islands();
                Ok(outcome)
            }
            Err(e) => {
                self.settle_after_error(&e, start);
                Err(e)
            }
        }
    }

    /// Regenerates every layer's anti-alias sub-layers from its image.
    pub fn calculate_aa_layers(
        &mut self,
        progress: &dyn ProgressSink,
        cancel: Option<&CancelToken>,
    ) -> Result<()> {
        let analyzer = self.analyzer(progress, cancel);
        analyzer.calculate_aa_layers(&mut self.layers, &self.params.aa_matrix, self.params.aa_level)
    }

    /// Removes `islands` from every layer in their ranges, repairs the layers
    /// above each change and rebuilds the island set.
    ///
    /// Cancellation is only honored before the first layer is touched. Once
    /// removal starts, every edited layer is repaired even if a later layer
    /// fails. Returns the number of pixels removed.
    pub fn remove_islands(
        &mut self,
        islands: &BTreeSet<MultiLayerIsland>,
        progress: &dyn ProgressSink,
        cancel: Option<&CancelToken>,
    ) -> Result<u64> {
        let mut per_layer: BTreeMap<usize, Vec<IslandRect>> = BTreeMap::new();
        for island in islands {
            for index in island.first_layer..=island.last_layer {
                per_layer.entry(index).or_default().push(island.rect);
            }
        }
        if let Some((&last, _)) = per_layer.last_key_value() {
            if last >= self.layers.len() {
                return Err(LayerError::InvalidArg(format!(
                    "island reaches layer {} of {}",
                    last,
                    self.layers.len()
                )));
            }
        }

        if let Some(&first) = per_layer.keys().next() {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(LayerError::Cancelled { layer: first });
            }
        }

        let mut removed = 0u64;
        let mut edited = Vec::with_capacity(per_layer.len());
        let mut failure = None;
        for (&index, rects) in &per_layer {
            progress.show_info(&format!(
                "Removing {} islands from layer {}",
                rects.len(),
                index + 1
            ));
            match self.layers[index].remove_islands(rects, self.resolution) {
                Ok(count) => {
                    removed += count;
                    edited.push(index);
                }
                Err(e) => {
                    failure = Some(e.at_layer(index));
                    break;
                }
            }
        }

        // The repair is not cancellable: an edited layer must not be left
        // under a stale classification.
        let analyzer = self.analyzer(progress, None);
        let mut repaired_until = 0usize;
        for index in edited {
            if index < repaired_until {
                continue;
            }
            match analyzer.recalculate_from(&mut self.layers, index, self.params.repair_iterations) {
                Ok(outcome) => repaired_until = outcome.end(),
                Err(e) => {
                    self.settle_after_error(&e, index);
                    return Err(failure.unwrap_or(e));
                }
            }
        }

        self.rebuild_islands();
        if let Some(e) = failure {
            return Err(e);
        }
        info!(
            "Removed {} island pixels from {} layers, {} islands left",
            removed,
            per_layer.len(),
            self.islands.len()
        );
        Ok(removed)
    }

    /// Removes every significant island and repairs, round after round,
    /// until none remain or `max_fix_rounds` is reached.
    ///
    /// Runs the full pass first if any layer is unclassified and regenerates
    /// the anti-alias sub-layers at the end.
    pub fn fix_layers(
        &mut self,
        progress: &dyn ProgressSink,
        cancel: Option<&CancelToken>,
    ) -> Result<FixReport> {
        if !self.is_calculated() {
            self.calculate(progress, cancel)?;
        }

        let mut report = FixReport::default();
        while report.rounds < self.params.max_fix_rounds && !self.islands.is_empty() {
            progress.show_info(&format!(
                "Fix round {}: {} islands",
                report.rounds + 1,
                self.islands.len()
            ));
            let targets = self.islands.clone();
            report.pixels_removed += self.remove_islands(&targets, progress, cancel)?;
            report.rounds += 1;
        }

        if self.params.aa_level > 1 {
            self.calculate_aa_layers(progress, cancel)?;
        }
        report.remaining_islands = self.islands.len();
        progress.show_info(&format!(
            "Fixed in {} rounds, {} pixels removed, {} islands left",
            report.rounds, report.pixels_removed, report.remaining_islands
        ));
        Ok(report)
    }

    /// Drops the classification of every layer from the one that failed
    /// (but not below `from`) and rebuilds the island set from what is left.
    fn settle_after_error(&mut self, err: &LayerError, from: usize) {
        if let Some(index) = err.layer_index() {
            let start = index.max(from).min(self.layers.len());
            for layer in &mut self.layers[start..] {
                layer.clear_classification();
            }
            warn!(
                "Classification dropped for layers {}..{} after: {}",
                start,
                self.layers.len(),
                err
            );
        }
        self.rebuild_islands();
    }

    fn rebuild_islands(&mut self) {
        self.islands = track_layers(
            self.layers.iter().map(Layer::island_rects),
            &self.params.island_policy,
        );
    }

    /// Islands whose layer range covers `layer`.
    pub fn islands_in_layer(&self, layer: usize) -> impl Iterator<Item = &MultiLayerIsland> {
        self.islands
            .iter()
            .filter(move |island| island.covers_layer(layer))
    }

    /// Indices of the layers holding island cells.
    pub fn layers_with_islands(&self) -> Vec<usize> {
        self.layers
            .iter()
            .enumerate()
            .filter(|(_, l)| l.has_islands())
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices of the layers that reach into the margin.
    pub fn margin_layers(&self) -> Vec<usize> {
        self.layers
            .iter()
            .enumerate()
            .filter(|(_, l)| l.extends_margin())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn summary(&self) -> LayerSummary {
        self.layers.iter().fold(
            LayerSummary {
                layers: self.layers.len(),
                ..Default::default()
            },
            |mut s, l| {
                s.pixels += l.pixels();
                s.island_pixels += l.island_count();
                s.island_supported_pixels += l.island_supported_count();
                s.layers_with_islands += l.has_islands() as usize;
                s.margin_layers += l.extends_margin() as usize;
                s
            },
        )
    }

    /// Hands the layers back to the container.
    pub fn into_layers(self) -> Vec<Layer> {
        self.layers
    }
}
