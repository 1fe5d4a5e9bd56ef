//! A single exposure layer and its derived classification state.

use std::collections::{BTreeMap, BTreeSet};

use crate::analyze::islands::extract_rects;
use crate::codec::{self, Row, UnpackedImage};
use crate::grid::{IslandKind, LayerGrid};
use crate::image::geom::{IslandRect, Resolution};
use crate::layer::definition::LayerDefinition;
use crate::utils::error::{LayerError, Result};
use log::{debug, trace};

/// One exposure mask.
///
/// The raw run-length buffer is the authoritative image. The packed
/// classification is derived from it and is either an authoritative support
/// classification (`calculated`) or a raw view where every foreground pixel is
/// `Unknown`. Resolution is owned by the file and passed into every operation
/// that needs it.
#[derive(Debug, Clone, Default)]
pub struct Layer {
    definition: LayerDefinition,
    image_data: Vec<u8>,
    packed: Option<Vec<u8>>,
    calculated: bool,
    pixels: u64,
    extends_margin: bool,
    island_rows: BTreeMap<u32, Row>,
    island_supported_rows: BTreeMap<u32, Row>,
    island_count: u64,
    island_supported_count: u64,
    island_rects: BTreeSet<IslandRect>,
    anti_alias: Vec<Layer>,
}

impl Layer {
    /// Creates a layer from its definition record and run-length data.
    ///
    /// The record's data size is replaced by `image_data.len()`.
    pub fn new(mut definition: LayerDefinition, image_data: Vec<u8>) -> Self {
        definition.data_size = image_data.len() as u32;
        Layer {
            definition,
            image_data,
            ..Default::default()
        }
    }

    /// Slices the layer's data range out of the whole-file buffer.
    pub fn from_file_bytes(definition: LayerDefinition, file: &[u8]) -> Result<Self> {
        let range = definition.data_range();
        let data = file.get(range.clone()).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "layer data {}..{} lies outside the {} byte file",
                    range.start,
                    range.end,
                    file.len()
                ),
            )
        })?;
        Ok(Self::new(definition, data.to_vec()))
    }

    /// An empty anti-alias sub-layer sharing the parent's timing.
    pub fn anti_alias_of(parent: &Layer) -> Self {
        Layer::new(
            LayerDefinition {
                position_z: parent.definition.position_z,
                exposure: parent.definition.exposure,
                off_time: parent.definition.off_time,
                ..Default::default()
            },
            Vec::new(),
        )
    }

    pub fn definition(&self) -> &LayerDefinition {
        &self.definition
    }

    pub fn position_z(&self) -> f32 {
        self.definition.position_z
    }

    pub fn set_position_z(&mut self, position_z: f32) {
        self.definition.position_z = position_z;
    }

    pub fn exposure(&self) -> f32 {
        self.definition.exposure
    }

    pub fn set_exposure(&mut self, exposure: f32) {
        self.definition.exposure = exposure;
    }

    pub fn off_time(&self) -> f32 {
        self.definition.off_time
    }

    pub fn set_off_time(&mut self, off_time: f32) {
        self.definition.off_time = off_time;
    }

    /// Raw run-length image data.
    pub fn image_data(&self) -> &[u8] {
        &self.image_data
    }

    pub fn data_size(&self) -> usize {
        self.image_data.len()
    }

    /// Packed classification, `None` until the layer has been analyzed.
    pub fn packed_classification(&self) -> Option<&[u8]> {
        self.packed.as_deref()
    }

    /// True when the packed classification is an authoritative support
    /// classification rather than a raw view.
    pub fn is_calculated(&self) -> bool {
        self.calculated
    }

    /// Foreground pixel count from the last unpack.
    pub fn pixels(&self) -> u64 {
        self.pixels
    }

    pub fn extends_margin(&self) -> bool {
        self.extends_margin
    }

    pub fn island_count(&self) -> u64 {
        self.island_count
    }

    pub fn island_supported_count(&self) -> u64 {
        self.island_supported_count
    }

    /// True when the layer has any `Island` or `IslandSupported` cell.
    pub fn has_islands(&self) -> bool {
        self.island_count + self.island_supported_count > 0
    }

    /// Per-row masks of the layer's island cells.
    pub fn island_rows(&self, kind: IslandKind) -> &BTreeMap<u32, Row> {
        match kind {
            IslandKind::Island => &self.island_rows,
            IslandKind::IslandSupported => &self.island_supported_rows,
        }
    }

    /// Footprint rectangles of the layer's island cells.
    pub fn island_rects(&self) -> &BTreeSet<IslandRect> {
        &self.island_rects
    }

    pub fn anti_alias_layers(&self) -> &[Layer] {
        &self.anti_alias
    }

    pub fn anti_alias_layers_mut(&mut self) -> &mut [Layer] {
        &mut self.anti_alias
    }

    pub fn add_anti_alias_layer(&mut self, layer: Layer) {
        self.anti_alias.push(layer);
    }

    /// Grows the sub-layer list to `count`, creating missing entries from
    /// this layer's timing. Extra sub-layers are dropped.
    pub fn ensure_anti_alias_layers(&mut self, count: usize) {
        while self.anti_alias.len() < count {
            let sub = Layer::anti_alias_of(self);
            self.anti_alias.push(sub);
        }
        self.anti_alias.truncate(count);
    }

    /// Decodes the raw buffer and records its pixel count.
    pub fn unpack_image(&mut self, resolution: Resolution) -> Result<UnpackedImage> {
        let image = codec::unpack(&self.image_data, resolution)?;
        self.pixels = image.pixels;
        Ok(image)
    }

    /// Runs [`check_margin`] on `rows` and stores the result.
    pub fn update_margin(&mut self, rows: &[Row], resolution: Resolution, margin: u32) -> bool {
        self.extends_margin = check_margin(rows, resolution, margin);
        self.extends_margin
    }

    /// The layer's grid: the stored classification if present, otherwise a
    /// raw view of the image data.
    pub fn grid(&self, resolution: Resolution) -> Result<LayerGrid> {
        match &self.packed {
            Some(packed) => LayerGrid::from_packed(packed, resolution),
            None => {
                let image = codec::unpack(&self.image_data, resolution)?;
                Ok(LayerGrid::from_rows(&image.rows, resolution))
            }
        }
    }

    /// The stored authoritative classification, if there is one.
    pub fn classification(&self, resolution: Resolution) -> Result<Option<LayerGrid>> {
        match (&self.packed, self.calculated) {
            (Some(packed), true) => LayerGrid::from_packed(packed, resolution).map(Some),
            _ => Ok(None),
        }
    }

    /// Stores a freshly classified grid of the current image data.
    ///
    /// The raw buffer is left as is; `grid` must have been classified from it.
    pub fn store_classification(&mut self, grid: &LayerGrid) {
        self.packed = Some(grid.pack_classification());
        self.calculated = true;
        self.update_islands(grid);
    }

    /// Rebuilds the packed classification as a raw view of the image data.
    pub fn refresh_raw_view(&mut self, resolution: Resolution) -> Result<()> {
        let image = self.unpack_image(resolution)?;
        let grid = LayerGrid::from_rows(&image.rows, resolution);
        self.packed = Some(grid.pack_classification());
        self.calculated = false;
        self.update_islands(&grid);
        Ok(())
    }

    /// Drops the classification and its island metadata, leaving the image.
    ///
    /// Used when the layers below changed but this one could not be
    /// reclassified; the next full pass rebuilds it.
    pub fn clear_classification(&mut self) {
        self.packed = None;
        self.calculated = false;
        self.island_rows.clear();
        self.island_supported_rows.clear();
        self.island_count = 0;
        self.island_supported_count = 0;
        self.island_rects.clear();
    }

    /// Replaces the raw buffer and the packed classification with `grid` and
    /// recomputes the island metadata.
    ///
    /// Both buffers are encoded before either is replaced, so the layer never
    /// holds a raw buffer and a classification of different images.
    pub fn save_classification(&mut self, grid: &LayerGrid) {
        let image_data = grid.pack_image_data();
        let packed = grid.pack_classification();
        trace!(
            "Saving classification: {} -> {} data bytes",
            self.image_data.len(),
            image_data.len()
        );
        self.image_data = image_data;
        self.definition.data_size = self.image_data.len() as u32;
        self.packed = Some(packed);
        self.pixels = grid.foreground_count();
        self.update_islands(grid);
    }

    /// Turns every island cell inside `rects` off and saves the result.
    ///
    /// Cells outside the rectangles are never touched. Returns the number of
    /// cells removed.
    pub fn remove_islands<'a, I>(&mut self, rects: I, resolution: Resolution) -> Result<u64>
    where
        I: IntoIterator<Item = &'a IslandRect>,
    {
        if !self.calculated {
            return Err(LayerError::InconsistentLayerState(
                "islands can only be removed from a classified layer".to_string(),
            ));
        }
        let mut grid = self.grid(resolution)?;
        let removed: u64 = rects
            .into_iter()
            .map(|rect| grid.clear_islands_in(rect))
            .sum();
        grid.reduce();
        self.save_classification(&grid);
        debug!("Removed {} island pixels", removed);
        Ok(removed)
    }

    /// Records where the layer's data goes in the output file and returns
    /// the next free offset.
    pub fn assign_data_address(&mut self, position: usize) -> Result<usize> {
        self.definition.data_address = u32::try_from(position).map_err(|_| {
            LayerError::InvalidArg(format!("data address {} does not fit in 32 bits", position))
        })?;
        self.definition.data_size = self.image_data.len() as u32;
        Ok(position + self.image_data.len())
    }

    fn update_islands(&mut self, grid: &LayerGrid) {
        self.island_rows = grid.extract_island_runs(IslandKind::Island);
        self.island_supported_rows = grid.extract_island_runs(IslandKind::IslandSupported);
        self.island_count = grid.island_count();
        self.island_supported_count = grid.island_supported_count();
        self.island_rects = extract_rects(
            self.island_rows
                .iter()
                .chain(self.island_supported_rows.iter())
                .map(|(&y, row)| (y, row)),
        );
    }
}

/// Returns `true` if any foreground pixel lies within `margin` of the border.
///
/// The first and last `margin` rows are scanned in full; interior rows only in
/// their first and last `margin` columns. If the image is no taller than
/// `2 × margin` every row is a margin row. A margin of 0 never triggers.
pub fn check_margin(rows: &[Row], resolution: Resolution, margin: u32) -> bool {
    if margin == 0 {
        return false;
    }
    let m = margin as usize;
    let height = rows.len();
    if height <= 2 * m {
        return rows.iter().any(|row| row.any());
    }
    if rows[..m].iter().any(|row| row.any()) || rows[height - m..].iter().any(|row| row.any()) {
        return true;
    }

    let width = resolution.width as usize;
    rows[m..height - m].iter().any(|row| {
        let left = m.min(row.len());
        let right = width.saturating_sub(m).min(row.len());
        row[..left].any() || row[right..].any()
    })
}
