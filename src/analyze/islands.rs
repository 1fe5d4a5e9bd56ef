//! Island rectangles within a layer and their tracking across layers.
//!
//! Within a layer, every horizontal span of island cells becomes a rectangle
//! and rectangles in contact (overlapping, sharing an edge or a corner) are
//! merged until no two remain in contact.
//!
//! Across layers, a rectangle that overlaps the footprint an island had in
//! the previous layer continues that island; anything else starts a new one.
//! Several rectangles and islands connected by overlaps collapse into a
//! single island.

use std::collections::BTreeSet;

use crate::codec::Row;
use crate::grid::find_spans;
use crate::image::geom::{IslandRect, MultiLayerIsland};
use log::debug;

/// Significance threshold for reported islands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IslandPolicy {
    /// Minimum number of consecutive layers.
    pub min_layers: usize,
    /// Minimum footprint area in pixels.
    pub min_area: u64,
}

impl Default for IslandPolicy {
    fn default() -> Self {
        IslandPolicy {
            min_layers: 1,
            min_area: 1,
        }
    }
}

impl IslandPolicy {
    pub fn new(min_layers: usize, min_area: u64) -> Self {
        IslandPolicy {
            min_layers,
            min_area,
        }
    }

    pub fn is_significant(&self, island: &MultiLayerIsland) -> bool {
        island.layer_count() >= self.min_layers && island.rect.area() >= self.min_area
    }
}

/// Footprint rectangles of a set of island rows.
///
/// Rows may be given in any order and may repeat a `y`.
pub fn extract_rects<'a, I>(rows: I) -> BTreeSet<IslandRect>
where
    I: IntoIterator<Item = (u32, &'a Row)>,
{
    let mut rects = BTreeSet::new();
    for (y, row) in rows {
        for (x1, x2) in find_spans(row) {
            insert_merged(&mut rects, IslandRect::span(y, x1, x2));
        }
    }
    coalesce(&mut rects);
    rects
}

/// Inserts `rect`, absorbing every rectangle it touches.
fn insert_merged(rects: &mut BTreeSet<IslandRect>, rect: IslandRect) {
    let touching: Vec<IslandRect> = rects
        .iter()
        .filter(|r| r.in_contact_with(&rect))
        .copied()
        .collect();
    let mut merged = rect;
    for r in touching {
        rects.remove(&r);
        merged = merged.union(&r);
    }
    rects.insert(merged);
}

/// Merges rectangles until none are in contact.
///
/// A union can grow into a rectangle that none of its parts touched.
fn coalesce(rects: &mut BTreeSet<IslandRect>) {
    loop {
        let pair = rects.iter().enumerate().find_map(|(i, a)| {
            rects
                .iter()
                .skip(i + 1)
                .find(|b| a.in_contact_with(b))
                .map(|b| (*a, *b))
        });
        let Some((a, b)) = pair else {
            break;
        };
        rects.remove(&a);
        rects.remove(&b);
        insert_merged(rects, a.union(&b));
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenIsland {
    island: MultiLayerIsland,
    footprint: IslandRect,
}

/// Accumulates per-layer rectangles into multi-layer islands.
///
/// Layers must be added in increasing index order.
#[derive(Debug, Default, Clone)]
pub struct IslandTracker {
    open: Vec<OpenIsland>,
    closed: Vec<MultiLayerIsland>,
}

impl IslandTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the island rectangles of `layer`.
    pub fn add_layer(&mut self, layer: usize, rects: &BTreeSet<IslandRect>) {
        let (candidates, stale): (Vec<OpenIsland>, Vec<OpenIsland>) = self
            .open
            .drain(..)
            .partition(|open| open.island.last_layer + 1 == layer);
        self.closed.extend(stale.into_iter().map(|open| open.island));

        // Nodes 0..candidates.len() are open islands, the rest this layer's rects.
        let rects: Vec<IslandRect> = rects.iter().copied().collect();
        let n = candidates.len();
        let mut parent: Vec<usize> = (0..n + rects.len()).collect();
        for (ci, candidate) in candidates.iter().enumerate() {
            for (ri, rect) in rects.iter().enumerate() {
                if candidate.footprint.overlaps(rect) {
                    union(&mut parent, ci, n + ri);
                }
            }
        }

        let mut groups: Vec<(usize, Option<MultiLayerIsland>, Option<IslandRect>)> = Vec::new();
        let mut slot = |parent: &mut Vec<usize>, node: usize| {
            let root = find(parent, node);
            match groups.iter().position(|(r, _, _)| *r == root) {
                Some(pos) => pos,
                None => {
                    groups.push((root, None, None));
                    groups.len() - 1
                }
            }
        };

        let mut placed = Vec::with_capacity(parent.len());
        for node in 0..parent.len() {
            placed.push(slot(&mut parent, node));
        }
        for (ci, candidate) in candidates.iter().enumerate() {
            let group = &mut groups[placed[ci]];
            match &mut group.1 {
                Some(island) => island.merge(&candidate.island),
                None => group.1 = Some(candidate.island),
            }
        }
        for (ri, rect) in rects.iter().enumerate() {
            let group = &mut groups[placed[n + ri]];
            group.2 = Some(group.2.map_or(*rect, |f| f.union(rect)));
        }

        for (_, island, footprint) in groups {
            match (island, footprint) {
                (Some(mut island), Some(footprint)) => {
                    island.extend(&footprint, layer);
                    self.open.push(OpenIsland { island, footprint });
                }
                (None, Some(footprint)) => self.open.push(OpenIsland {
                    island: MultiLayerIsland::new(footprint, layer),
                    footprint,
                }),
                (Some(island), None) => self.closed.push(island),
                (None, None) => {}
            }
        }
    }

    /// Closes every island and keeps the significant ones.
    pub fn finish(mut self, policy: &IslandPolicy) -> BTreeSet<MultiLayerIsland> {
        self.closed.extend(self.open.drain(..).map(|open| open.island));
        let total = self.closed.len();
        let islands = reduce(self.closed, policy);
        debug!(
            "Tracked {} multi-layer islands, {} significant",
            total,
            islands.len()
        );
        islands
    }
}

/// Drops islands below the significance threshold.
pub fn reduce<I>(islands: I, policy: &IslandPolicy) -> BTreeSet<MultiLayerIsland>
where
    I: IntoIterator<Item = MultiLayerIsland>,
{
    islands
        .into_iter()
        .filter(|island| policy.is_significant(island))
        .collect()
}

/// Tracks the rectangles of consecutive layers, starting at layer 0.
pub fn track_layers<'a, I>(per_layer: I, policy: &IslandPolicy) -> BTreeSet<MultiLayerIsland>
where
    I: IntoIterator<Item = &'a BTreeSet<IslandRect>>,
{
    let mut tracker = IslandTracker::new();
    for (layer, rects) in per_layer.into_iter().enumerate() {
        tracker.add_layer(layer, rects);
    }
    tracker.finish(policy)
}

fn find(parent: &mut [usize], mut node: usize) -> usize {
    let mut root = node;
    while parent[root] != root {
        root = parent[root];
    }
    while parent[node] != root {
        let next = parent[node];
        parent[node] = root;
        node = next;
    }
    root
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        parent[rb.max(ra)] = ra.min(rb);
    }
}
