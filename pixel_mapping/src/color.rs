// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Colors as they flow through the pipeline.

use peniko::color::{AlphaColor, LinearSrgb, Srgb};

/// A color with linear sRGB components, nominally in `[0, 1]`.
///
/// This is the format the downsample pass writes to the atlas, and the format in which
/// components receive their sampled color.
pub type LinearColor = AlphaColor<LinearSrgb>;

// Primaries have the same components in sRGB and linear sRGB.
pub const RED: LinearColor = LinearColor::new([1.0, 0.0, 0.0, 1.0]);
pub const GREEN: LinearColor = LinearColor::new([0.0, 1.0, 0.0, 1.0]);
pub const BLUE: LinearColor = LinearColor::new([0.0, 0.0, 1.0, 1.0]);

/// Decodes 8-bit sRGB-encoded components.
pub fn from_srgb8(r: u8, g: u8, b: u8, a: u8) -> LinearColor {
    AlphaColor::<Srgb>::from_rgba8(r, g, b, a).convert()
}

/// Relative luminance with Rec. 709 weights. Alpha is ignored.
pub fn luminance(color: LinearColor) -> f32 {
    let [r, g, b, _] = color.components;
    0.2126 * r + 0.7152 * g + 0.0722 * b
}
