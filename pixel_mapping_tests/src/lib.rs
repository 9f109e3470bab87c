// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pixel mapping tests.

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
// The following lints are part of the Linebender standard set,
// but resolving them has been deferred for now.
// Feel free to send a PR that solves one or more of these.
#![allow(
    missing_debug_implementations,
    unreachable_pub,
    missing_docs,
    clippy::missing_assert_message,
    clippy::print_stderr,
    clippy::print_stdout,
    clippy::allow_attributes_without_reason
)]

use anyhow::{bail, Result};
use rand::Rng;
use pixel_mapping::kurbo::{Point, Size};
use pixel_mapping::util::RenderContext;
use pixel_mapping::{
    AtlasIndex, BlendingQuality, Error, LinearColor, PixelRegion, Renderer, RendererOptions,
    SourceTexture,
};

pub struct TestParams {
    pub name: String,
    pub use_cpu: bool,
    pub options: RendererOptions,
}

impl TestParams {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            use_cpu: false,
            options: RendererOptions::default(),
        }
    }

    pub fn cpu(name: impl Into<String>) -> Self {
        Self {
            use_cpu: true,
            ..Self::new(name)
        }
    }
}

/// Creates a renderer on the first available device, or on the CPU.
pub async fn create_renderer(params: &TestParams) -> Result<Renderer> {
    if params.use_cpu {
        return Ok(Renderer::new_cpu(params.options)?);
    }
    let mut context = RenderContext::new();
    let device_id = context.device().await.ok_or(Error::NoCompatibleDevice)?;
    let device_handle = &context.devices[device_id];
    Ok(Renderer::new(
        &device_handle.device,
        &device_handle.queue,
        params.options,
    )?)
}

pub fn create_renderer_sync(params: &TestParams) -> Result<Renderer> {
    pollster::block_on(create_renderer(params))
}

/// Registers `regions`, runs one frame and waits for its readback.
pub fn downsample(
    renderer: &mut Renderer,
    source: &SourceTexture,
    regions: &[PixelRegion],
) -> Result<Vec<LinearColor>> {
    renderer.begin_frame();
    for region in regions {
        renderer.queue_downsample(*region);
    }
    renderer.run_frame(Some(source))?;
    renderer.wait_idle()?;
    if regions.is_empty() {
        return Ok(Vec::new());
    }
    let last = AtlasIndex(regions.len() as u32 - 1);
    Ok(renderer.try_get_colors(AtlasIndex(0), last)?)
}

/// A source whose red channel ramps along x and green channel along y.
pub fn gradient_source(width: u32, height: u32) -> SourceTexture {
    let pixels: Vec<_> = (0..height)
        .flat_map(|y| {
            (0..width).map(move |x| {
                LinearColor::new([
                    x as f32 / (width.max(2) - 1) as f32,
                    y as f32 / (height.max(2) - 1) as f32,
                    ((x + y) % 7) as f32 / 6.0,
                    1.0,
                ])
            })
        })
        .collect();
    match SourceTexture::from_pixels(width, height, &pixels) {
        Some(source) => source,
        None => unreachable!("pixel count matches dimensions"),
    }
}

/// Whether every component of `a` is within `tolerance` of `b`.
pub fn approx_eq(a: LinearColor, b: LinearColor, tolerance: f32) -> bool {
    a.components
        .iter()
        .zip(b.components)
        .all(|(x, y)| (x - y).abs() <= tolerance)
}

/// `count` regions of every quality scattered over a `width` by `height` source.
pub fn random_regions(
    rng: &mut impl Rng,
    count: usize,
    width: u32,
    height: u32,
) -> Vec<PixelRegion> {
    let qualities = [
        BlendingQuality::Low,
        BlendingQuality::Medium,
        BlendingQuality::High,
    ];
    (0..count)
        .map(|i| {
            let size = Size::new(
                1.0 + rng.random::<f64>() * 8.0,
                1.0 + rng.random::<f64>() * 8.0,
            );
            // Some regions hang over the edges, to exercise clamping.
            let position = Point::new(
                rng.random::<f64>() * f64::from(width) - 2.0,
                rng.random::<f64>() * f64::from(height) - 2.0,
            );
            PixelRegion::new(position, size)
                .with_quality(qualities[i % qualities.len()])
                .with_invert([rng.random_bool(0.25), false, rng.random_bool(1.0 / 3.0), false])
                .with_expose([1.0, rng.random::<f32>(), 1.0, 1.0])
        })
        .collect()
}

/// The same regions downsampled by the wgpu engine and by the CPU engine.
#[must_use]
pub struct GpuCpuComparison {
    pub name: String,
    pub gpu: Vec<LinearColor>,
    pub cpu: Vec<LinearColor>,
}

impl GpuCpuComparison {
    pub fn assert_max_difference_less_than(&self, tolerance: f32) -> Result<()> {
        if self.gpu.len() != self.cpu.len() {
            bail!(
                "{}: GPU returned {} colors, CPU returned {}",
                self.name,
                self.gpu.len(),
                self.cpu.len()
            );
        }
        for (i, (gpu, cpu)) in self.gpu.iter().zip(&self.cpu).enumerate() {
            if !approx_eq(*gpu, *cpu, tolerance) {
                bail!("{}: region {i} differs, GPU {gpu:?}, CPU {cpu:?}", self.name);
            }
        }
        Ok(())
    }
}

pub fn compare_gpu_cpu_sync(
    name: &str,
    source: &SourceTexture,
    regions: &[PixelRegion],
) -> Result<GpuCpuComparison> {
    let mut gpu = create_renderer_sync(&TestParams::new(name))?;
    let mut cpu = create_renderer_sync(&TestParams::cpu(name))?;
    Ok(GpuCpuComparison {
        name: name.into(),
        gpu: downsample(&mut gpu, source, regions)?,
        cpu: downsample(&mut cpu, source, regions)?,
    })
}
