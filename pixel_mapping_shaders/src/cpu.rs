// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Support for CPU implementations of compute shaders.
//!
//! These follow the WGSL sources line for line, so that results can be compared
//! against the GPU, and so that hosts without a suitable adapter can still run the
//! pipeline.

// Allow un-idiomatic Rust to more closely match shaders
#![allow(
    clippy::needless_range_loop,
    reason = "Keeps code easily comparable to GPU shaders"
)]

mod downsample;

pub use downsample::downsample;

/// Structure used for binding textures to CPU shaders.
#[derive(Clone, Debug, PartialEq)]
pub struct CpuTexture {
    pub width: usize,
    pub height: usize,
    /// Linear RGBA texels, row major.
    pub pixels: Vec<[f32; 4]>,
}

impl CpuTexture {
    /// A texture filled with transparent black.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0.0; 4]; width * height],
        }
    }

    /// Equivalent of WGSL `textureLoad` with coordinates already clamped.
    fn load(&self, x: i32, y: i32) -> [f32; 4] {
        self.pixels[y as usize * self.width + x as usize]
    }
}
