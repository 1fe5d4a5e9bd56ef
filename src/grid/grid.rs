//! Per-layer pixel classification grid.
//!
//! A `LayerGrid` holds one [`PixelState`] per pixel. Layers are unpacked into
//! a grid, classified against the grid of the layer below, and packed back;
//! the grid itself is never stored outside a layer's packed buffer.
//!
//! ## Classification
//!
//! For a foreground pixel at `(x, y)`:
//!
//! - no layer below, or the pixel below is foreground:
//!   - the pixel below was `Island` or `IslandSupported` → `IslandSupported`
//!   - otherwise → `Supported`
//! - the pixel below is background → `Island`
//!
//! Background pixels stay `Off`.
//!
//! ## Packed classification
//!
//! Raster-order runs, one byte per run: `state << 5 | (len - 1)` with
//! `len` in `1..=32`.

use std::collections::BTreeMap;

use crate::codec::{pack_bits, Row};
use crate::grid::runs::{IslandKind, IslandRun};
use crate::image::geom::{IslandRect, Resolution};
use crate::utils::error::{LayerError, Result};
use bitvec::prelude::*;
use bytemuck::NoUninit;

const STATE_SHIFT: u8 = 5;
const MAX_PACKED_RUN: usize = 1 << STATE_SHIFT;

/// Classification of a single pixel.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, NoUninit)]
pub enum PixelState {
    #[default]
    Off = 0,
    /// Resting on solid material in the layer below.
    Supported = 1,
    /// Nothing below: floating resin.
    Island = 2,
    /// Resting only on an island in the layer below.
    IslandSupported = 3,
    /// Foreground of a raw, unclassified view.
    Unknown = 4,
}

impl PixelState {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PixelState::Off),
            1 => Some(PixelState::Supported),
            2 => Some(PixelState::Island),
            3 => Some(PixelState::IslandSupported),
            4 => Some(PixelState::Unknown),
            _ => None,
        }
    }

    /// Any state other than `Off` renders as a cured pixel.
    pub fn is_foreground(self) -> bool {
        self != PixelState::Off
    }

    /// `Island` or `IslandSupported`.
    pub fn is_island(self) -> bool {
        matches!(self, PixelState::Island | PixelState::IslandSupported)
    }

    fn island_kind(self) -> Option<IslandKind> {
        match self {
            PixelState::Island => Some(IslandKind::Island),
            PixelState::IslandSupported => Some(IslandKind::IslandSupported),
            _ => None,
        }
    }
}

impl From<IslandKind> for PixelState {
    fn from(kind: IslandKind) -> Self {
        match kind {
            IslandKind::Island => PixelState::Island,
            IslandKind::IslandSupported => PixelState::IslandSupported,
        }
    }
}

/// A `width × height` array of pixel states plus the island runs found by
/// the last [`LayerGrid::reduce`].
#[derive(Debug, Clone)]
pub struct LayerGrid {
    width: u32,
    height: u32,
    cells: Vec<PixelState>,
    island_runs: Vec<IslandRun>,
    row_islands: Vec<u32>,
    row_island_supported: Vec<u32>,
    island_count: u64,
    island_supported_count: u64,
}

impl PartialEq for LayerGrid {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.cells == other.cells
    }
}

impl Eq for LayerGrid {}

impl LayerGrid {
    /// Creates an all-`Off` grid.
    pub fn new(resolution: Resolution) -> Self {
        let Resolution { width, height } = resolution;
        LayerGrid {
            width,
            height,
            cells: vec![PixelState::Off; resolution.pixel_count()],
            island_runs: Vec::new(),
            row_islands: vec![0; height as usize],
            row_island_supported: vec![0; height as usize],
            island_count: 0,
            island_supported_count: 0,
        }
    }

    /// A raw view: every foreground pixel of `rows` marked `Unknown`.
    pub fn from_rows(rows: &[Row], resolution: Resolution) -> Self {
        let mut grid = Self::new(resolution);
        grid.mark_rows(rows);
        grid
    }

    /// Decodes a packed classification buffer.
    pub fn from_packed(packed: &[u8], resolution: Resolution) -> Result<Self> {
        let mut grid = Self::new(resolution);
        grid.unpack_classification(packed)?;
        Ok(grid)
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Sets every cell to `Off` and forgets the island runs.
    pub fn clear(&mut self) {
        self.cells.fill(PixelState::Off);
        self.island_runs.clear();
        self.row_islands.fill(0);
        self.row_island_supported.fill(0);
        self.island_count = 0;
        self.island_supported_count = 0;
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        if x < self.width && y < self.height {
            Some(y as usize * self.width as usize + x as usize)
        } else {
            None
        }
    }

    /// State at `(x, y)`; `Off` outside the grid.
    pub fn get(&self, x: u32, y: u32) -> PixelState {
        self.index(x, y)
            .map_or(PixelState::Off, |idx| self.cells[idx])
    }

    fn set(&mut self, x: u32, y: u32, state: PixelState) {
        if let Some(idx) = self.index(x, y) {
            self.cells[idx] = state;
        }
    }

    /// Marks a raw foreground pixel.
    pub fn mark_foreground(&mut self, x: u32, y: u32) {
        self.set(x, y, PixelState::Unknown);
    }

    pub fn supported(&mut self, x: u32, y: u32) {
        self.set(x, y, PixelState::Supported);
    }

    pub fn island(&mut self, x: u32, y: u32) {
        self.set(x, y, PixelState::Island);
    }

    pub fn supported_by_island(&mut self, x: u32, y: u32) {
        self.set(x, y, PixelState::IslandSupported);
    }

    /// Rewrites a single cell. Returns `true` if the cell changed.
    ///
    /// Island runs and counts are stale until the next [`LayerGrid::reduce`].
    pub fn transform_cell(&mut self, x: u32, y: u32, state: PixelState) -> bool {
        match self.index(x, y) {
            Some(idx) if self.cells[idx] != state => {
                self.cells[idx] = state;
                true
            }
            _ => false,
        }
    }

    /// Clears the grid and marks every foreground pixel of `rows` as `Unknown`.
    pub fn mark_rows(&mut self, rows: &[Row]) {
        self.clear();
        let width = self.width as usize;
        for (y, row) in rows.iter().enumerate().take(self.height as usize) {
            for x in row.iter_ones().take_while(|&x| x < width) {
                self.mark_foreground(x as u32, y as u32);
            }
        }
    }

    /// Classifies the foreground of `current` against the layer below.
    ///
    /// `previous` holds the rows and grid of the layer below, or `None` for
    /// the first layer. Ends with [`LayerGrid::reduce`].
    pub fn classify(
        &mut self,
        current: &[Row],
        previous: Option<(&[Row], &LayerGrid)>,
    ) -> Result<()> {
        if current.len() != self.height as usize {
            return Err(LayerError::DimensionMismatch {
                expected: (self.width, self.height),
                actual: (self.width, current.len() as u32),
            });
        }
        if let Some((_, below)) = previous {
            if below.resolution() != self.resolution() {
                return Err(LayerError::DimensionMismatch {
                    expected: (self.width, self.height),
                    actual: (below.width, below.height),
                });
            }
        }

        self.clear();
        let width = self.width as usize;
        for (y, row) in current.iter().enumerate() {
            let below_row = previous.map(|(rows, _)| rows.get(y));
            for x in row.iter_ones().take_while(|&x| x < width) {
                let solid_below = match below_row {
                    None => true,
                    Some(r) => r.and_then(|r| r.get(x).map(|b| *b)).unwrap_or(false),
                };
                let (x, y) = (x as u32, y as u32);
                if !solid_below {
                    self.island(x, y);
                } else if previous.is_some_and(|(_, below)| below.get(x, y).is_island()) {
                    self.supported_by_island(x, y);
                } else {
                    self.supported(x, y);
                }
            }
        }
        self.reduce();
        Ok(())
    }

    /// Rebuilds the island row runs and counts from the cells.
    ///
    /// Returns `(island cells, island-supported cells)`.
    pub fn reduce(&mut self) -> (u64, u64) {
        self.island_runs.clear();
        self.row_islands.fill(0);
        self.row_island_supported.fill(0);
        self.island_count = 0;
        self.island_supported_count = 0;

        let width = self.width as usize;
        for y in 0..self.height as usize {
            let line = &self.cells[y * width..(y + 1) * width];
            let mut x = 0usize;
            while x < width {
                let Some(kind) = line[x].island_kind() else {
                    x += 1;
                    continue;
                };
                let start = x;
                while x < width && line[x] == line[start] {
                    x += 1;
                }
                let len = (x - start) as u32;
                match kind {
                    IslandKind::Island => {
                        self.row_islands[y] += len;
                        self.island_count += len as u64;
                    }
                    IslandKind::IslandSupported => {
                        self.row_island_supported[y] += len;
                        self.island_supported_count += len as u64;
                    }
                }
                self.island_runs.push(IslandRun {
                    y: y as u32,
                    x1: start as u32,
                    x2: (x - 1) as u32,
                    kind,
                });
            }
        }
        (self.island_count, self.island_supported_count)
    }

    /// Island runs from the last [`LayerGrid::reduce`], sorted by `(y, x1)`.
    pub fn island_runs(&self) -> &[IslandRun] {
        &self.island_runs
    }

    pub fn island_count(&self) -> u64 {
        self.island_count
    }

    pub fn island_supported_count(&self) -> u64 {
        self.island_supported_count
    }

    /// Island cells per row.
    pub fn row_islands(&self) -> &[u32] {
        &self.row_islands
    }

    /// Island-supported cells per row.
    pub fn row_island_supported(&self) -> &[u32] {
        &self.row_island_supported
    }

    /// Per-row masks of the cells in state `kind`, only for rows that have any.
    pub fn extract_island_runs(&self, kind: IslandKind) -> BTreeMap<u32, Row> {
        let mut rows = BTreeMap::new();
        for run in self.island_runs.iter().filter(|run| run.kind == kind) {
            let row = rows
                .entry(run.y)
                .or_insert_with(|| bitvec![u32, Lsb0; 0; self.width as usize]);
            row[run.x1 as usize..=run.x2 as usize].fill(true);
        }
        rows
    }

    /// Sets every `Island`/`IslandSupported` cell inside `rect` to `Off`.
    ///
    /// Rows without island cells are skipped. Cells outside `rect` are never
    /// touched. Returns the number of cells cleared; runs are stale until the
    /// next [`LayerGrid::reduce`].
    pub fn clear_islands_in(&mut self, rect: &IslandRect) -> u64 {
        let Some(rect) = rect.clip(self.resolution()) else {
            return 0;
        };
        let mut cleared = 0;
        for y in rect.y1..=rect.y2 {
            let row = y as usize;
            if self.row_islands[row] == 0 && self.row_island_supported[row] == 0 {
                continue;
            }
            for x in rect.x1..=rect.x2 {
                if self.get(x, y).is_island() && self.transform_cell(x, y, PixelState::Off) {
                    cleared += 1;
                }
            }
        }
        cleared
    }

    /// Foreground rows, one bit per pixel.
    pub fn to_rows(&self) -> Vec<Row> {
        self.cells
            .chunks(self.width.max(1) as usize)
            .take(self.height as usize)
            .map(|line| line.iter().map(|s| s.is_foreground()).collect())
            .collect()
    }

    /// Number of foreground cells.
    pub fn foreground_count(&self) -> u64 {
        self.cells.iter().filter(|s| s.is_foreground()).count() as u64
    }

    /// Encodes the foreground as mask run-length data.
    pub fn pack_image_data(&self) -> Vec<u8> {
        pack_bits(self.cells.iter().map(|s| s.is_foreground()))
    }

    /// Encodes the full classification.
    pub fn pack_classification(&self) -> Vec<u8> {
        let codes: &[u8] = bytemuck::cast_slice(&self.cells);
        let mut out = Vec::new();
        let mut i = 0usize;
        while i < codes.len() {
            let code = codes[i];
            let mut len = 1usize;
            while i + len < codes.len() && codes[i + len] == code && len < MAX_PACKED_RUN {
                len += 1;
            }
            out.push(code << STATE_SHIFT | (len - 1) as u8);
            i += len;
        }
        out
    }

    /// Replaces the cells with a packed classification and reduces.
    ///
    /// The buffer must describe exactly `width × height` cells.
    pub fn unpack_classification(&mut self, packed: &[u8]) -> Result<()> {
        let total = self.cells.len();
        let mut pos = 0usize;
        for (index, &byte) in packed.iter().enumerate() {
            let state = PixelState::from_code(byte >> STATE_SHIFT).ok_or_else(|| {
                LayerError::InconsistentLayerState(format!(
                    "unknown pixel state {} at packed byte {}",
                    byte >> STATE_SHIFT,
                    index
                ))
            })?;
            let len = (byte as usize & (MAX_PACKED_RUN - 1)) + 1;
            if pos + len > total {
                return Err(LayerError::InconsistentLayerState(format!(
                    "packed classification covers more than {} cells",
                    total
                )));
            }
            self.cells[pos..pos + len].fill(state);
            pos += len;
        }
        if pos != total {
            return Err(LayerError::InconsistentLayerState(format!(
                "packed classification covers {} of {} cells",
                pos, total
            )));
        }
        self.reduce();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::unpack;

    fn res(width: u32, height: u32) -> Resolution {
        Resolution::new(width, height)
    }

    fn rows_with(resolution: Resolution, pixels: &[(u32, u32)]) -> Vec<Row> {
        let mut rows: Vec<Row> = (0..resolution.height)
            .map(|_| bitvec![u32, Lsb0; 0; resolution.width as usize])
            .collect();
        for &(x, y) in pixels {
            rows[y as usize].set(x as usize, true);
        }
        rows
    }

    #[test]
    fn floating_pixel_is_island() -> Result<()> {
        let r = res(3, 2);
        let below_rows = rows_with(r, &[]);
        let mut below = LayerGrid::new(r);
        below.classify(&below_rows, None)?;

        let current = rows_with(r, &[(1, 0)]);
        let mut grid = LayerGrid::new(r);
        grid.classify(&current, Some((&below_rows, &below)))?;
        assert_eq!(grid.get(1, 0), PixelState::Island);
        assert_eq!(grid.island_count(), 1);
        Ok(())
    }

    #[test]
    fn pixel_on_material_is_supported() -> Result<()> {
        let r = res(3, 2);
        let below_rows = rows_with(r, &[(1, 0)]);
        let mut below = LayerGrid::new(r);
        below.classify(&below_rows, None)?;

        let current = rows_with(r, &[(1, 0)]);
        let mut grid = LayerGrid::new(r);
        grid.classify(&current, Some((&below_rows, &below)))?;
        assert_eq!(grid.get(1, 0), PixelState::Supported);
        assert_eq!(grid.island_count(), 0);
        Ok(())
    }

    #[test]
    fn first_layer_is_fully_supported() -> Result<()> {
        let r = res(4, 4);
        let rows = rows_with(r, &[(0, 0), (3, 3), (2, 1)]);
        let mut grid = LayerGrid::new(r);
        grid.classify(&rows, None)?;
        assert_eq!(grid.get(3, 3), PixelState::Supported);
        assert_eq!(grid.get(1, 1), PixelState::Off);
        assert_eq!(grid.foreground_count(), 3);
        Ok(())
    }

    #[test]
    fn resting_on_island_is_island_supported() -> Result<()> {
        let r = res(3, 1);
        let empty = rows_with(r, &[]);
        let mut base = LayerGrid::new(r);
        base.classify(&empty, None)?;

        let floating = rows_with(r, &[(0, 0), (1, 0)]);
        let mut island = LayerGrid::new(r);
        island.classify(&floating, Some((&empty, &base)))?;

        let on_top = rows_with(r, &[(1, 0), (2, 0)]);
        let mut grid = LayerGrid::new(r);
        grid.classify(&on_top, Some((&floating, &island)))?;
        assert_eq!(grid.get(1, 0), PixelState::IslandSupported);
        assert_eq!(grid.get(2, 0), PixelState::Island);
        assert_eq!(grid.reduce(), (1, 1));
        Ok(())
    }

    #[test]
    fn wrong_row_count_is_rejected() {
        let mut grid = LayerGrid::new(res(3, 3));
        let rows = rows_with(res(3, 2), &[]);
        assert!(matches!(
            grid.classify(&rows, None),
            Err(LayerError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn reduce_builds_row_runs() {
        let mut grid = LayerGrid::new(res(6, 2));
        grid.island(0, 0);
        grid.island(1, 0);
        grid.supported_by_island(2, 0);
        grid.supported(3, 0);
        grid.island(5, 1);
        assert_eq!(grid.reduce(), (3, 1));
        let runs = grid.island_runs();
        assert_eq!(runs.len(), 3);
        assert_eq!((runs[0].x1, runs[0].x2, runs[0].kind), (0, 1, IslandKind::Island));
        assert_eq!(runs[1].kind, IslandKind::IslandSupported);
        assert_eq!((runs[2].y, runs[2].x1), (1, 5));
        assert_eq!(grid.row_islands(), &[2, 1]);
        assert_eq!(grid.row_island_supported(), &[1, 0]);
    }

    #[test]
    fn extract_runs_by_kind() {
        let mut grid = LayerGrid::new(res(5, 3));
        grid.island(1, 0);
        grid.island(2, 0);
        grid.supported_by_island(4, 2);
        grid.reduce();
        let islands = grid.extract_island_runs(IslandKind::Island);
        assert_eq!(islands.len(), 1);
        assert_eq!(islands[&0], bitvec![u32, Lsb0; 0, 1, 1, 0, 0]);
        let supported = grid.extract_island_runs(IslandKind::IslandSupported);
        assert_eq!(supported.keys().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn clearing_stays_inside_rect() {
        let r = res(6, 6);
        let mut grid = LayerGrid::new(r);
        for y in 0..6 {
            for x in 0..6 {
                grid.supported(x, y);
            }
        }
        for y in 2..=3 {
            for x in 2..=3 {
                grid.island(x, y);
            }
        }
        grid.island(5, 5);
        grid.reduce();

        let cleared = grid.clear_islands_in(&IslandRect::new(2, 2, 3, 3));
        assert_eq!(cleared, 4);
        assert_eq!(grid.get(2, 2), PixelState::Off);
        assert_eq!(grid.get(1, 2), PixelState::Supported);
        assert_eq!(grid.get(5, 5), PixelState::Island);
    }

    #[test]
    fn transform_reports_change() {
        let mut grid = LayerGrid::new(res(2, 2));
        assert!(grid.transform_cell(1, 1, PixelState::Island));
        assert!(!grid.transform_cell(1, 1, PixelState::Island));
        assert!(!grid.transform_cell(5, 5, PixelState::Island));
    }

    #[test]
    fn equality_ignores_stale_runs() {
        let mut a = LayerGrid::new(res(3, 3));
        let mut b = LayerGrid::new(res(3, 3));
        a.island(1, 1);
        b.island(1, 1);
        a.reduce();
        assert_eq!(a, b);
        b.supported(0, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn classification_survives_packing() -> Result<()> {
        let r = res(40, 3);
        let mut grid = LayerGrid::new(r);
        for x in 0..40 {
            grid.supported(x, 0);
        }
        grid.island(7, 1);
        grid.supported_by_island(8, 1);
        grid.mark_foreground(39, 2);
        grid.reduce();

        let packed = grid.pack_classification();
        let restored = LayerGrid::from_packed(&packed, r)?;
        assert_eq!(restored, grid);
        assert_eq!(restored.island_count(), 1);
        assert_eq!(restored.island_supported_count(), 1);
        Ok(())
    }

    #[test]
    fn bad_packed_state_is_inconsistent() {
        let r = res(2, 1);
        assert!(matches!(
            LayerGrid::from_packed(&[7 << STATE_SHIFT | 1], r),
            Err(LayerError::InconsistentLayerState(_))
        ));
        assert!(matches!(
            LayerGrid::from_packed(&[0], r),
            Err(LayerError::InconsistentLayerState(_))
        ));
    }

    #[test]
    fn image_data_keeps_foreground() -> Result<()> {
        let r = res(5, 4);
        let mut grid = LayerGrid::new(r);
        grid.supported(0, 0);
        grid.island(4, 0);
        grid.supported_by_island(0, 1);
        grid.mark_foreground(2, 3);
        let image = unpack(&grid.pack_image_data(), r)?;
        assert_eq!(image.rows, grid.to_rows());
        assert_eq!(image.pixels, 4);
        Ok(())
    }
}
