// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::{AtlasIndex, PixelRegion};

/// The regions requested for the current frame, in registration order.
///
/// Only the thread driving the frame touches the registry. Components read their colors
/// back with the index they were given here, so the walk that registers and the walk that
/// distributes must visit components in the same order.
#[derive(Debug, Default)]
pub struct PixelRegistry {
    regions: Vec<PixelRegion>,
}

impl PixelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every region. Called at the start of each frame's registration pass.
    pub fn reset(&mut self) {
        self.regions.clear();
    }

    /// Appends `region` and returns the next sequential index.
    pub fn register(&mut self, region: PixelRegion) -> AtlasIndex {
        let index = AtlasIndex(self.count());
        self.regions.push(region);
        index
    }

    pub fn count(&self) -> u32 {
        // The atlas can never address more than `u32::MAX` cells anyway.
        self.regions.len().try_into().unwrap_or(u32::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, index: AtlasIndex) -> Option<&PixelRegion> {
        self.regions.get(index.as_usize())
    }

    /// All regions, indexed by [`AtlasIndex`].
    pub fn regions(&self) -> &[PixelRegion] {
        &self.regions
    }
}
