// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The downsample shader of the pixel mapping pipeline, with the metadata needed to build
//! its compute pipeline on any GPU API.
//!
//! The shader reduces every registered pixel region of a source texture to a single color
//! and writes it to one cell of an atlas texture. Region `i` lands in cell
//! `(i % atlas_width, i / atlas_width)`, which is the layout the atlas packer produces.
//!
//! With the `cpu` feature, [`cpu::downsample`] runs the same computation on the CPU.

// LINEBENDER LINT SET - lib.rs - v2
// See https://linebender.org/wiki/canonical-lints/
// These lints aren't included in Cargo.toml because they
// shouldn't apply to examples and tests
#![warn(unused_crate_dependencies)]
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs, reason = "We have many as-yet undocumented items.")]
#![allow(
    clippy::cast_possible_truncation,
    clippy::missing_assert_message,
    reason = "Deferred, only apply in some feature sets so not expect"
)]

mod config;
mod types;

#[cfg(feature = "cpu")]
pub mod cpu;

pub use config::{
    DownsampleConfig, GpuPixelRegion, BLEND_QUALITY_HIGH, BLEND_QUALITY_LOW,
    BLEND_QUALITY_MEDIUM, DOWNSAMPLE_WG,
};
pub use types::BindType;

use std::borrow::Cow;

#[derive(Clone, Debug)]
pub struct ComputeShader<'a> {
    pub name: Cow<'a, str>,
    pub workgroup_size: [u32; 3],
    /// Resources in binding order, all in bind group 0.
    pub bindings: Cow<'a, [BindType]>,

    #[cfg(feature = "wgsl")]
    pub wgsl: Cow<'a, str>,
}

/// The downsample shader.
///
/// Bindings: the [`DownsampleConfig`] uniform, the [`GpuPixelRegion`] array,
/// the source texture and the `rgba32float` atlas.
pub const DOWNSAMPLE: ComputeShader<'static> = ComputeShader {
    name: Cow::Borrowed("downsample"),
    workgroup_size: [DOWNSAMPLE_WG, 1, 1],
    bindings: Cow::Borrowed(&[
        BindType::Uniform,
        BindType::BufReadOnly,
        BindType::ImageRead,
        BindType::Image,
    ]),
    #[cfg(feature = "wgsl")]
    wgsl: Cow::Borrowed(include_str!("../shader/downsample.wgsl")),
};
