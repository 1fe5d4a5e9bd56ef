// src/image/geom.rs

//! Island rectangles and multi-layer islands.
//!
//! Rectangles use inclusive pixel coordinates (`x1..=x2`, `y1..=y2`), which is
//! what the row-run extraction produces directly. The derived ordering (by
//! `x1`, then `y1`, then the far corner) gives sorted sets a deterministic
//! iteration order for merge comparisons.

/// Image resolution shared by every layer of a file.
///
/// Owned by the file container and passed by value into each operation
/// that needs it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Resolution { width, height }
    }

    /// Total number of pixels in one layer.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// The whole image as a rectangle, or `None` for an empty resolution.
    pub fn bounds(&self) -> Option<IslandRect> {
        if self.width == 0 || self.height == 0 {
            None
        } else {
            Some(IslandRect::new(0, 0, self.width - 1, self.height - 1))
        }
    }
}

/// An axis-aligned rectangle with inclusive corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IslandRect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl IslandRect {
    /// Creates a rectangle, normalizing the corners so `x1 <= x2` and `y1 <= y2`.
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        IslandRect {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// A single-row span `x1..=x2` on row `y`.
    pub fn span(y: u32, x1: u32, x2: u32) -> Self {
        Self::new(x1, y, x2, y)
    }

    /// Columns covered; 0 for a hand-built rectangle with `x1 > x2`.
    pub fn width(&self) -> u32 {
        self.x2.checked_sub(self.x1).map_or(0, |d| d.saturating_add(1))
    }

    pub fn height(&self) -> u32 {
        self.y2.checked_sub(self.y1).map_or(0, |d| d.saturating_add(1))
    }

    /// Number of pixels covered.
    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }

    /// True when the rectangles overlap or share an edge or corner.
    pub fn in_contact_with(&self, other: &IslandRect) -> bool {
        self.x1 <= other.x2.saturating_add(1)
            && other.x1 <= self.x2.saturating_add(1)
            && self.y1 <= other.y2.saturating_add(1)
            && other.y1 <= self.y2.saturating_add(1)
    }

    /// True when at least one pixel is covered by both rectangles.
    pub fn overlaps(&self, other: &IslandRect) -> bool {
        self.x1 <= other.x2 && other.x1 <= self.x2 && self.y1 <= other.y2 && other.y1 <= self.y2
    }

    /// Returns the smallest rectangle containing both `self` and `other`.
    pub fn union(&self, other: &IslandRect) -> IslandRect {
        IslandRect {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// Returns the common part of both rectangles, if any.
    pub fn intersection(&self, other: &IslandRect) -> Option<IslandRect> {
        if !self.overlaps(other) {
            return None;
        }
        Some(IslandRect {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
        })
    }

    /// Clips the rectangle to the image area.
    pub fn clip(&self, resolution: Resolution) -> Option<IslandRect> {
        resolution
            .bounds()
            .and_then(|bounds| self.intersection(&bounds))
    }
}

/// An island footprint that persists over the inclusive layer range
/// `first_layer..=last_layer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MultiLayerIsland {
    pub rect: IslandRect,
    pub first_layer: usize,
    pub last_layer: usize,
}

impl MultiLayerIsland {
    pub fn new(rect: IslandRect, layer: usize) -> Self {
        Self {
            rect,
            first_layer: layer,
            last_layer: layer,
        }
    }

    /// Number of layers the island spans.
    pub fn layer_count(&self) -> usize {
        self.last_layer
            .checked_sub(self.first_layer)
            .map_or(0, |d| d.saturating_add(1))
    }

    pub fn covers_layer(&self, layer: usize) -> bool {
        layer >= self.first_layer && layer <= self.last_layer
    }

    /// Grows the island into `layer` with the footprint `rect`.
    pub fn extend(&mut self, rect: &IslandRect, layer: usize) {
        self.rect = self.rect.union(rect);
        self.first_layer = self.first_layer.min(layer);
        self.last_layer = self.last_layer.max(layer);
    }

    /// Absorbs another island that continues into the same layer.
    pub fn merge(&mut self, other: &MultiLayerIsland) {
        self.rect = self.rect.union(&other.rect);
        self.first_layer = self.first_layer.min(other.first_layer);
        self.last_layer = self.last_layer.max(other.last_layer);
    }
}
