// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytemuck::{Pod, Zeroable};

/// Number of regions handled by one workgroup of the downsample shader.
pub const DOWNSAMPLE_WG: u32 = 64;

/// One centre sample.
pub const BLEND_QUALITY_LOW: u32 = 0;
/// Centre plus the four quarter points.
pub const BLEND_QUALITY_MEDIUM: u32 = 1;
/// A 3x3 grid.
pub const BLEND_QUALITY_HIGH: u32 = 2;

/// Uniform configuration of a downsample dispatch.
///
/// This data structure must be kept in sync with the definition in
/// `shader/downsample.wgsl`.
#[derive(Clone, Copy, Debug, Default, Zeroable, Pod)]
#[repr(C)]
pub struct DownsampleConfig {
    /// Width of the atlas in cells.
    pub atlas_width: u32,
    /// Height of the atlas in cells.
    pub atlas_height: u32,
    /// Number of regions to downsample. Region `i` is written to cell
    /// `(i % atlas_width, i / atlas_width)`.
    pub n_regions: u32,
    /// Width of the source texture in texels.
    pub source_width: u32,
    /// Height of the source texture in texels.
    pub source_height: u32,
    pub _padding: [u32; 3],
}

impl DownsampleConfig {
    /// Number of workgroups needed to cover every region.
    pub fn workgroup_count(&self) -> u32 {
        self.n_regions.div_ceil(DOWNSAMPLE_WG)
    }
}

/// A pixel region as laid out in the region storage buffer.
///
/// This data structure must be kept in sync with the definition in
/// `shader/downsample.wgsl`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Zeroable, Pod)]
#[repr(C)]
pub struct GpuPixelRegion {
    /// Top-left corner in source texels.
    pub position: [f32; 2],
    pub size: [f32; 2],
    /// Per channel factor applied after inversion.
    pub expose: [f32; 4],
    /// Per channel invert flag, `0.0` or `1.0`.
    pub invert: [f32; 4],
    /// One of the `BLEND_QUALITY_*` constants.
    pub quality: u32,
    pub _padding: [u32; 3],
}

const _: () = assert!(size_of::<GpuPixelRegion>() == 64);
const _: () = assert!(size_of::<DownsampleConfig>() == 32);
