// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sizing of the downsample atlas.

use crate::{AtlasIndex, Error, Result};

/// Dimensions of the atlas, in cells. One cell holds the color of one region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AtlasSize {
    pub width: u32,
    pub height: u32,
}

/// The default bound on the atlas.
pub const MAX_ATLAS_SIZE: AtlasSize = AtlasSize::new(4096, 4096);

impl AtlasSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of cells.
    pub const fn cell_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for AtlasSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The part of the atlas written by a pass, in cells.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AtlasRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl AtlasRect {
    /// The smallest rectangle covering the first `count` cells of an atlas of `size`.
    pub fn covering(size: AtlasSize, count: u32) -> Self {
        if count == 0 || size.is_empty() {
            return Self::default();
        }
        Self {
            x: 0,
            y: 0,
            width: count.min(size.width),
            height: count.div_ceil(size.width),
        }
    }
}

/// Computes the atlas dimensions for `pixel_count` regions.
///
/// Regions fill whole rows of `max.width` cells before a new row is started, so the result
/// is `(pixel_count, 1)` until the first row is full.
pub fn compute_dimensions(pixel_count: u32, max: AtlasSize) -> Result<AtlasSize> {
    if max.is_empty() {
        return Err(Error::InvalidAtlasSize(max));
    }
    if pixel_count <= max.width {
        return Ok(AtlasSize::new(pixel_count, 1));
    }
    let height = pixel_count.div_ceil(max.width);
    if height > max.height {
        return Err(Error::CapacityExceeded {
            pixel_count,
            capacity: max.cell_count(),
        });
    }
    Ok(AtlasSize::new(max.width, height))
}

/// Result of [`AtlasPacker::update`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AtlasUpdate {
    pub size: AtlasSize,
    /// Whether the atlas storage must be reallocated.
    pub resized: bool,
}

/// Tracks the atlas dimensions across frames.
#[derive(Debug)]
pub struct AtlasPacker {
    max: AtlasSize,
    /// Most regions a frame may register. At most `max.cell_count()`.
    capacity: u64,
    size: AtlasSize,
    sized_for: Option<u32>,
}

impl AtlasPacker {
    pub fn new(max: AtlasSize) -> Result<Self> {
        if max.is_empty() {
            return Err(Error::InvalidAtlasSize(max));
        }
        Ok(Self {
            max,
            capacity: max.cell_count(),
            size: AtlasSize::default(),
            sized_for: None,
        })
    }

    /// Lowers the region capacity below the cell count of the bound, for engines that
    /// cannot fill the whole atlas in one pass.
    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity.min(self.max.cell_count());
        self
    }

    /// Sizes the atlas for `pixel_count` regions.
    ///
    /// Only a change in `pixel_count` recomputes the dimensions. On failure the previous
    /// dimensions are kept, and the next call retries.
    pub fn update(&mut self, pixel_count: u32) -> Result<AtlasUpdate> {
        if self.sized_for == Some(pixel_count) {
            return Ok(AtlasUpdate {
                size: self.size,
                resized: false,
            });
        }
        if u64::from(pixel_count) > self.capacity {
            return Err(Error::CapacityExceeded {
                pixel_count,
                capacity: self.capacity,
            });
        }
        let size = compute_dimensions(pixel_count, self.max)?;
        let resized = size != self.size;
        if resized {
            log::debug!(
                "resizing atlas for {pixel_count} pixels: {} -> {size}",
                self.size
            );
        }
        self.size = size;
        self.sized_for = Some(pixel_count);
        Ok(AtlasUpdate { size, resized })
    }

    pub fn size(&self) -> AtlasSize {
        self.size
    }

    pub fn max_size(&self) -> AtlasSize {
        self.max
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// The cell holding `index`, or `None` if it lies outside the current atlas.
    pub fn cell_of(&self, index: AtlasIndex) -> Option<(u32, u32)> {
        cell_of(self.size, index)
    }

    pub fn index_of(&self, x: u32, y: u32) -> Option<AtlasIndex> {
        index_of(self.size, x, y)
    }
}

pub fn cell_of(size: AtlasSize, index: AtlasIndex) -> Option<(u32, u32)> {
    if size.width == 0 {
        return None;
    }
    let (x, y) = (index.0 % size.width, index.0 / size.width);
    (y < size.height).then_some((x, y))
}

pub fn index_of(size: AtlasSize, x: u32, y: u32) -> Option<AtlasIndex> {
    if x >= size.width || y >= size.height {
        return None;
    }
    y.checked_mul(size.width)
        .and_then(|row| row.checked_add(x))
        .map(AtlasIndex)
}
