// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fixture components that can be placed in a [`FixtureRenderTree`](crate::FixtureRenderTree).

use kurbo::{Point, Size};

use crate::{
    BlendingQuality, ColorMode, DmxOutput, FixturePatch, LinearColor, NoDataPolicy,
    PixelRegion, Result, Sampleable,
};

fn apply_policy(
    slot: &mut Option<LinearColor>,
    color: Option<LinearColor>,
    policy: NoDataPolicy,
) {
    match (color, policy) {
        (Some(color), _) => *slot = Some(color),
        (None, NoDataPolicy::Hold) => {}
        (None, NoDataPolicy::Blackout) => *slot = None,
    }
}

fn write_patch(
    patch: &FixturePatch,
    color: Option<LinearColor>,
    output: &mut DmxOutput,
) -> Result<()> {
    match color {
        Some(color) => patch.write(color, output),
        None => patch.write_zeros(output),
    }
}

/// A fixture with a single pixel, sampled from a rectangle at its node's position.
#[derive(Clone, Debug)]
pub struct FixtureGroupItem {
    pub size: Size,
    pub color_mode: ColorMode,
    pub quality: BlendingQuality,
    pub patch: FixturePatch,
    pub no_data: NoDataPolicy,
    color: Option<LinearColor>,
}

impl FixtureGroupItem {
    pub fn new(size: Size, patch: FixturePatch) -> Self {
        Self {
            size,
            color_mode: ColorMode::RGB,
            quality: BlendingQuality::default(),
            patch,
            no_data: NoDataPolicy::default(),
            color: None,
        }
    }

    #[must_use]
    pub fn with_color_mode(mut self, color_mode: ColorMode) -> Self {
        self.color_mode = color_mode;
        self
    }

    #[must_use]
    pub fn with_quality(mut self, quality: BlendingQuality) -> Self {
        self.quality = quality;
        self
    }

    #[must_use]
    pub fn with_no_data_policy(mut self, no_data: NoDataPolicy) -> Self {
        self.no_data = no_data;
        self
    }

    /// The color that will be written, `None` until the first color arrives or after a
    /// blackout.
    pub fn color(&self) -> Option<LinearColor> {
        self.color
    }
}

impl Sampleable for FixtureGroupItem {
    fn regions(&self, out: &mut Vec<PixelRegion>) {
        out.push(
            PixelRegion::new(Point::ZERO, self.size)
                .with_color_mode(self.color_mode)
                .with_quality(self.quality),
        );
    }

    fn receive_color(&mut self, _ordinal: usize, color: Option<LinearColor>) {
        apply_policy(&mut self.color, color, self.no_data);
    }

    fn write_dmx(&self, output: &mut DmxOutput) -> Result<()> {
        write_patch(&self.patch, self.color, output)
    }
}

/// The order in which matrix cells are sampled and patched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CellDistribution {
    /// Left to right, then top to bottom.
    #[default]
    RowMajor,
    /// Top to bottom, then left to right.
    ColumnMajor,
    /// Rows alternate direction, starting left to right.
    SnakeRows,
    /// Columns alternate direction, starting top to bottom.
    SnakeColumns,
}

impl CellDistribution {
    /// Column and row of the `ordinal`th cell of a `columns` by `rows` grid.
    pub fn cell(self, ordinal: u32, columns: u32, rows: u32) -> (u32, u32) {
        match self {
            Self::RowMajor => (ordinal % columns, ordinal / columns),
            Self::ColumnMajor => (ordinal / rows, ordinal % rows),
            Self::SnakeRows => {
                let (column, row) = (ordinal % columns, ordinal / columns);
                if row % 2 == 1 {
                    (columns - 1 - column, row)
                } else {
                    (column, row)
                }
            }
            Self::SnakeColumns => {
                let (column, row) = (ordinal / rows, ordinal % rows);
                if column % 2 == 1 {
                    (column, rows - 1 - row)
                } else {
                    (column, row)
                }
            }
        }
    }
}

/// A grid of identical cells, such as an LED panel.
///
/// Cell `k` in [`CellDistribution`] order is patched at
/// `patch.address + k * patch.footprint()`.
#[derive(Clone, Debug)]
pub struct FixtureMatrix {
    pub columns: u32,
    pub rows: u32,
    pub cell_size: Size,
    pub distribution: CellDistribution,
    pub color_mode: ColorMode,
    pub quality: BlendingQuality,
    /// The patch of the first cell.
    pub patch: FixturePatch,
    pub no_data: NoDataPolicy,
    colors: Vec<Option<LinearColor>>,
}

impl FixtureMatrix {
    pub fn new(columns: u32, rows: u32, cell_size: Size, patch: FixturePatch) -> Self {
        Self {
            columns,
            rows,
            cell_size,
            distribution: CellDistribution::default(),
            color_mode: ColorMode::RGB,
            quality: BlendingQuality::default(),
            patch,
            no_data: NoDataPolicy::default(),
            colors: vec![None; columns.saturating_mul(rows) as usize],
        }
    }

    #[must_use]
    pub fn with_distribution(mut self, distribution: CellDistribution) -> Self {
        self.distribution = distribution;
        self
    }

    #[must_use]
    pub fn with_color_mode(mut self, color_mode: ColorMode) -> Self {
        self.color_mode = color_mode;
        self
    }

    #[must_use]
    pub fn with_quality(mut self, quality: BlendingQuality) -> Self {
        self.quality = quality;
        self
    }

    #[must_use]
    pub fn with_no_data_policy(mut self, no_data: NoDataPolicy) -> Self {
        self.no_data = no_data;
        self
    }

    /// Number of cells, saturating at `u32::MAX`.
    pub fn cell_count(&self) -> u32 {
        self.columns.saturating_mul(self.rows)
    }

    /// Colors of the cells in distribution order.
    pub fn colors(&self) -> &[Option<LinearColor>] {
        &self.colors
    }

    /// The patch of the `ordinal`th cell.
    pub fn cell_patch(&self, ordinal: u32) -> FixturePatch {
        let offset = u32::from(self.patch.footprint()).saturating_mul(ordinal);
        let address = u32::from(self.patch.address).saturating_add(offset);
        self.patch.at_address(u16::try_from(address).unwrap_or(u16::MAX))
    }
}

impl Sampleable for FixtureMatrix {
    fn regions(&self, out: &mut Vec<PixelRegion>) {
        for ordinal in 0..self.cell_count() {
            let (column, row) = self.distribution.cell(ordinal, self.columns, self.rows);
            let origin = Point::new(
                f64::from(column) * self.cell_size.width,
                f64::from(row) * self.cell_size.height,
            );
            out.push(
                PixelRegion::new(origin, self.cell_size)
                    .with_color_mode(self.color_mode)
                    .with_quality(self.quality),
            );
        }
    }

    fn receive_color(&mut self, ordinal: usize, color: Option<LinearColor>) {
        if let Some(slot) = self.colors.get_mut(ordinal) {
            apply_policy(slot, color, self.no_data);
        }
    }

    fn write_dmx(&self, output: &mut DmxOutput) -> Result<()> {
        let mut result = Ok(());
        for (ordinal, color) in (0..).zip(&self.colors) {
            let written = write_patch(&self.cell_patch(ordinal), *color, output);
            if result.is_ok() {
                result = written;
            }
        }
        result
    }
}
