//! Horizontal runs of island cells.
//!
//! A run is a maximal span of cells on one row that share the same island
//! state, stored as inclusive `(y, x1, x2)` triples. Runs are sorted by
//! `(y, x1)`.

use crate::codec::Row;

/// Which of the two unreliable states a run or row mask refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IslandKind {
    /// Floating resin with nothing underneath.
    Island,
    /// Resin resting only on an earlier island.
    IslandSupported,
}

/// A horizontal run of island cells on a single row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IslandRun {
    /// Row, 0 at the top of the image.
    pub y: u32,
    /// First (leftmost) column of the run, inclusive.
    pub x1: u32,
    /// Last (rightmost) column of the run, inclusive.
    pub x2: u32,
    pub kind: IslandKind,
}

/// Maximal spans of set bits in `row`, as inclusive `(x1, x2)` pairs.
pub fn find_spans(row: &Row) -> Vec<(u32, u32)> {
    let mut spans = Vec::new();
    let mut x = 0usize;
    while x < row.len() {
        let Some(offset) = row[x..].first_one() else {
            break;
        };
        let start = x + offset;
        let end = row[start..]
            .first_zero()
            .map_or(row.len(), |len| start + len);
        spans.push((start as u32, (end - 1) as u32));
        x = end;
    }
    spans
}
