// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pixel mapping turns a rendered image into DMX lighting values.
//!
//! Every frame, a tree of fixture components registers one rectangular [`PixelRegion`] per
//! fixture pixel. A single downsample pass, run with [`wgpu`] or on the CPU, reduces each
//! region of the source texture to one color and writes it to a compact atlas. The atlas is
//! read back to a shared [`ReadbackBuffer`], and each component turns its colors into DMX
//! channel values.
//!
//! ## Getting started
//!
//! ```ignore
//! let mut renderer = pixel_mapping::Renderer::new(&device, &queue, RendererOptions::default())?;
//! let mut tree = FixtureRenderTree::new().with_root(
//!     RenderNode::fixture(
//!         "wash",
//!         FixtureGroupItem::new(Size::new(16.0, 16.0), FixturePatch::rgb(0, 1)),
//!     )
//!     .with_position((32.0, 8.0)),
//! );
//!
//! // Once per frame:
//! let report = tree.run_frame(&mut renderer, Some(&source), ReadbackSync::Deferred);
//! tree.write_dmx(&mut output)?;
//! ```
//!
//! Passes run on a dedicated render thread, so [`FixtureRenderTree::run_frame`] usually
//! distributes the previous frame's colors. Pass [`ReadbackSync::Wait`] to wait for the
//! current frame instead.

// LINEBENDER LINT SET - lib.rs - v2
// See https://linebender.org/wiki/canonical-lints/
// These lints aren't included in Cargo.toml because they
// shouldn't apply to examples and tests
#![warn(unused_crate_dependencies)]
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
// The following lints are part of the Linebender standard set,
// but resolving them has been deferred for now.
// Feel free to send a PR that solves one or more of these.
#![allow(missing_docs, reason = "We have many as-yet undocumented items.")]
#![allow(
    clippy::cast_possible_truncation,
    clippy::missing_assert_message,
    reason = "Deferred, only apply in some feature sets so not expect"
)]

mod atlas;
pub mod color;
mod components;
mod cpu;
mod dmx;
mod readback;
mod region;
mod registry;
mod render;
mod source;
mod tree;

#[cfg(feature = "wgpu")]
pub mod util;
#[cfg(feature = "wgpu")]
mod wgpu_engine;

use std::sync::Arc;

pub use atlas::{
    cell_of, compute_dimensions, index_of, AtlasPacker, AtlasRect, AtlasSize, AtlasUpdate,
    MAX_ATLAS_SIZE,
};
pub use color::LinearColor;
pub use components::{CellDistribution, FixtureGroupItem, FixtureMatrix};
pub use dmx::{
    AttributeMapping, ColorChannel, DmxOutput, DmxSignalFormat, DmxUniverse, FixturePatch,
    NoDataPolicy, UNIVERSE_SIZE,
};
pub use readback::ReadbackBuffer;
pub use region::{AtlasIndex, BlendingQuality, ColorMode, PixelRegion};
pub use registry::PixelRegistry;
pub use render::{CompletionCallback, DownsampleJob, DownsampleOutput, DownsampleRenderer};
pub use source::SourceTexture;
pub use tree::{
    FixtureRenderTree, FramePhase, FrameReport, ReadbackSync, RenderNode, Sampleable,
};

pub use kurbo;
pub use peniko;
pub use pixel_mapping_shaders::cpu::CpuTexture;
#[cfg(feature = "wgpu")]
pub use wgpu;

#[cfg(feature = "wgpu")]
use wgpu::{Device, Queue};

use cpu::CpuEngine;
use render::Engine;
#[cfg(feature = "wgpu")]
use wgpu_engine::{device_capacity, WgpuEngine};

/// Errors that can occur in the pixel mapping pipeline.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// More regions were registered than the atlas can hold.
    #[error("{pixel_count} pixels do not fit in an atlas of {capacity} cells")]
    CapacityExceeded { pixel_count: u32, capacity: u64 },
    /// There is no source texture, or the engine cannot read it.
    #[error("the source texture is unavailable")]
    SourceUnavailable,
    /// A readback query for an index the last readback does not hold.
    #[error("atlas index {index} is out of range for a readback of {len} colors")]
    IndexOutOfRange { index: u32, len: usize },
    /// A readback query for a range the last readback does not fully hold.
    #[error("atlas range {first}..={last} is out of bounds for a readback of {len} colors")]
    RangeOutOfBounds { first: u32, last: u32, len: usize },
    /// The maximum atlas size has a zero dimension.
    #[error("invalid maximum atlas size {0}")]
    InvalidAtlasSize(AtlasSize),
    /// The maximum atlas size is larger than the device supports.
    #[error("a {requested} atlas exceeds the device texture limit of {limit}")]
    AtlasExceedsDeviceLimit { requested: AtlasSize, limit: u32 },
    /// A patch does not fit in its universe.
    #[error("{footprint} channels at address {address} do not fit in universe {universe}")]
    DmxAddressOutOfRange {
        universe: u32,
        address: u32,
        footprint: u16,
    },
    /// The render thread could not be started.
    #[error("couldn't spawn the render thread")]
    RenderThreadSpawn(#[source] std::io::Error),
    /// The render thread is gone, most likely because a completion callback panicked.
    #[error("the render thread has stopped")]
    RenderThreadStopped,

    /// There is no available device with the features required by the downsample pass.
    #[cfg(feature = "wgpu")]
    #[error("Couldn't find suitable device")]
    NoCompatibleDevice,
    /// Failed to async map a buffer.
    /// See [`wgpu::BufferAsyncError`] for more information.
    #[cfg(feature = "wgpu")]
    #[error("Failed to async map a buffer")]
    BufferAsyncError(#[from] wgpu::BufferAsyncError),
    /// Polling the device failed.
    #[cfg(feature = "wgpu")]
    #[error("Failed to poll the device")]
    DevicePoll(#[from] wgpu::PollError),
    #[cfg(feature = "wgpu")]
    #[error("wgpu Error from scope")]
    WgpuErrorFromScope(#[from] wgpu::Error),
    /// The buffer mapping callback was dropped without reporting a result.
    #[cfg(feature = "wgpu")]
    #[error("readback channel was closed")]
    ReadbackChannelClosed,
}

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

/// Options which are set at renderer creation time.
#[derive(Clone, Copy, Debug)]
pub struct RendererOptions {
    /// The largest atlas the renderer may allocate, in cells.
    pub max_atlas_size: AtlasSize,

    /// If true, run the downsample pass on the CPU even when a device is given.
    pub use_cpu: bool,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            max_atlas_size: MAX_ATLAS_SIZE,
            use_cpu: false,
        }
    }
}

/// What [`Renderer::run_frame`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// No regions were registered.
    Empty,
    /// There was no source texture. The previous readback is kept.
    NoSource,
    /// A pass was queued. Its colors reach the readback buffer once it completes.
    Rendered {
        frame: u64,
        pixel_count: u32,
        atlas: AtlasSize,
        /// Whether the atlas was reallocated for this frame.
        resized: bool,
    },
}

/// Drives the downsample pipeline from the frame thread.
///
/// Owns the registry, the atlas packer and the render thread, and shares the readback
/// buffer with it.
pub struct Renderer {
    options: RendererOptions,
    registry: PixelRegistry,
    packer: AtlasPacker,
    downsampler: DownsampleRenderer,
    readback: Arc<ReadbackBuffer>,
    frame: u64,
    /// Pixel count of the last capacity warning, so each overflow is logged once.
    warned_overflow: Option<u32>,
}

#[cfg(not(target_arch = "wasm32"))]
static_assertions::assert_impl_all!(Renderer: Send);
static_assertions::assert_impl_all!(ReadbackBuffer: Send, Sync);

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("options", &self.options)
            .field("pixel_count", &self.registry.count())
            .field("atlas", &self.packer.size())
            .field("engine", &self.downsampler.engine())
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

impl Renderer {
    /// Creates a renderer that runs the downsample pass on the CPU.
    pub fn new_cpu(options: RendererOptions) -> Result<Self> {
        let capacity = options.max_atlas_size.cell_count();
        Self::with_engine(options, Engine::Cpu(CpuEngine::new()), capacity)
    }

    /// Creates a new renderer for the specified device.
    ///
    /// With [`RendererOptions::use_cpu`] set, the device is not used.
    ///
    /// The device limits may allow fewer regions per frame than the atlas has cells, see
    /// [`Self::capacity`].
    #[cfg(feature = "wgpu")]
    pub fn new(device: &Device, queue: &Queue, options: RendererOptions) -> Result<Self> {
        if options.use_cpu {
            return Self::new_cpu(options);
        }
        let limits = device.limits();
        let limit = limits.max_texture_dimension_2d;
        let requested = options.max_atlas_size;
        if requested.width > limit || requested.height > limit {
            return Err(Error::AtlasExceedsDeviceLimit { requested, limit });
        }
        let capacity = device_capacity(&limits, requested);
        if capacity < requested.cell_count() {
            log::info!(
                "device limits allow {capacity} regions per frame, fewer than the {requested} atlas holds"
            );
        }
        let engine = WgpuEngine::new(device, queue, capacity)?;
        Self::with_engine(options, Engine::Wgpu(Box::new(engine)), capacity)
    }

    fn with_engine(options: RendererOptions, engine: Engine, capacity: u64) -> Result<Self> {
        let packer = AtlasPacker::new(options.max_atlas_size)?.with_capacity(capacity);
        Ok(Self {
            options,
            registry: PixelRegistry::new(),
            packer,
            downsampler: DownsampleRenderer::spawn(engine)?,
            readback: Arc::new(ReadbackBuffer::new()),
            frame: 0,
            warned_overflow: None,
        })
    }

    pub fn options(&self) -> &RendererOptions {
        &self.options
    }

    /// Forgets the regions of the previous frame.
    pub fn begin_frame(&mut self) {
        self.registry.reset();
    }

    /// Registers a region for this frame, in source texture coordinates.
    pub fn queue_downsample(&mut self, region: PixelRegion) -> AtlasIndex {
        self.registry.register(region)
    }

    /// Number of regions registered this frame.
    pub fn pixel_count(&self) -> u32 {
        self.registry.count()
    }

    /// The regions registered this frame, indexed by [`AtlasIndex`].
    pub fn regions(&self) -> &[PixelRegion] {
        self.registry.regions()
    }

    /// Most regions a frame may register before [`Self::run_frame`] fails with
    /// [`Error::CapacityExceeded`].
    pub fn capacity(&self) -> u64 {
        self.packer.capacity()
    }

    /// Dimensions of the atlas used by the last sized frame.
    pub fn atlas_size(&self) -> AtlasSize {
        self.packer.size()
    }

    /// Sizes the atlas for the regions registered this frame.
    pub fn size_atlas(&mut self) -> Result<AtlasUpdate> {
        let pixel_count = self.registry.count();
        match self.packer.update(pixel_count) {
            Ok(update) => {
                self.warned_overflow = None;
                Ok(update)
            }
            Err(err) => {
                if self.warned_overflow != Some(pixel_count) {
                    log::warn!("{err}, skipping downsample");
                    self.warned_overflow = Some(pixel_count);
                }
                Err(err)
            }
        }
    }

    /// Queues the downsample pass for the regions registered this frame, into an atlas
    /// sized by [`Self::size_atlas`].
    pub fn dispatch(
        &mut self,
        source: Option<&SourceTexture>,
        update: AtlasUpdate,
    ) -> Result<FrameOutcome> {
        let pixel_count = self.registry.count();
        if pixel_count == 0 {
            return Ok(FrameOutcome::Empty);
        }
        let Some(source) = source else {
            log::debug!("no source texture, keeping the previous readback");
            return Ok(FrameOutcome::NoSource);
        };
        if source.is_empty() || !self.downsampler.accepts(source) {
            log::warn!(
                "{} engine cannot read the source texture, skipping downsample",
                self.downsampler.engine()
            );
            return Err(Error::SourceUnavailable);
        }
        let capacity = update.size.cell_count().min(self.packer.capacity());
        if u64::from(pixel_count) > capacity {
            return Err(Error::CapacityExceeded {
                pixel_count,
                capacity,
            });
        }

        self.frame += 1;
        let frame = self.frame;
        let readback = Arc::clone(&self.readback);
        self.downsampler.render(DownsampleJob {
            frame,
            source: source.clone(),
            regions: self.registry.regions().iter().map(PixelRegion::encode).collect(),
            atlas: update.size,
            on_complete: Box::new(move |result| match result {
                Ok(output) => readback.set_all(output.frame, output.colors),
                Err(err) => log::warn!("downsample of frame {frame} failed: {err}"),
            }),
        })?;
        Ok(FrameOutcome::Rendered {
            frame,
            pixel_count,
            atlas: update.size,
            resized: update.resized,
        })
    }

    /// Sizes the atlas and queues the downsample pass for the regions registered this
    /// frame. Does not wait for the pass.
    ///
    /// On error nothing is queued and the readback buffer keeps its contents.
    pub fn run_frame(&mut self, source: Option<&SourceTexture>) -> Result<FrameOutcome> {
        if self.registry.is_empty() {
            return Ok(FrameOutcome::Empty);
        }
        let update = self.size_atlas()?;
        self.dispatch(source, update)
    }

    /// Blocks until every queued pass has completed.
    pub fn wait_idle(&self) -> Result<()> {
        self.downsampler.flush()
    }

    /// The color of `index` in the most recent readback.
    pub fn try_get_color(&self, index: AtlasIndex) -> Result<LinearColor> {
        self.readback
            .get(index.as_usize())
            .ok_or_else(|| Error::IndexOutOfRange {
                index: index.get(),
                len: self.readback.len(),
            })
    }

    /// The colors of `first..=last` in the most recent readback, all from the same pass.
    pub fn try_get_colors(&self, first: AtlasIndex, last: AtlasIndex) -> Result<Vec<LinearColor>> {
        self.readback
            .get_range(first.as_usize(), last.as_usize())
            .ok_or_else(|| Error::RangeOutOfBounds {
                first: first.get(),
                last: last.get(),
                len: self.readback.len(),
            })
    }

    /// Zeroes the readback buffer.
    pub fn reset_colors(&self) {
        self.readback.reset_all();
    }

    /// The buffer that completed passes write to.
    pub fn readback(&self) -> Arc<ReadbackBuffer> {
        Arc::clone(&self.readback)
    }
}

#[cfg(test)]
mod tests {
    use kurbo::{Point, Size};

    use super::*;

    fn region(x: f64) -> PixelRegion {
        PixelRegion::new(Point::new(x, 0.0), Size::new(1.0, 1.0))
    }

    #[test]
    fn empty_frame_queues_nothing() {
        let mut renderer = Renderer::new_cpu(RendererOptions::default()).unwrap();
        renderer.begin_frame();
        let source = SourceTexture::solid(2, 2, color::RED);
        assert_eq!(renderer.run_frame(Some(&source)).unwrap(), FrameOutcome::Empty);
        renderer.wait_idle().unwrap();
        assert!(renderer.readback().is_empty());
    }

    #[test]
    fn missing_source_keeps_previous_readback() {
        let mut renderer = Renderer::new_cpu(RendererOptions::default()).unwrap();
        let source = SourceTexture::solid(2, 2, color::BLUE);
        renderer.begin_frame();
        renderer.queue_downsample(region(0.0));
        renderer.run_frame(Some(&source)).unwrap();
        renderer.wait_idle().unwrap();

        renderer.begin_frame();
        renderer.queue_downsample(region(0.0));
        assert_eq!(renderer.run_frame(None).unwrap(), FrameOutcome::NoSource);
        renderer.wait_idle().unwrap();
        assert_eq!(renderer.try_get_color(AtlasIndex(0)).unwrap(), color::BLUE);
        assert_eq!(renderer.readback().frame(), Some(1));
    }

    #[test]
    fn resize_is_reported_only_when_dimensions_change() {
        let mut renderer = Renderer::new_cpu(RendererOptions::default()).unwrap();
        let source = SourceTexture::solid(1, 1, LinearColor::WHITE);
        let mut resized = Vec::new();
        for count in [3, 3, 4] {
            renderer.begin_frame();
            for i in 0..count {
                renderer.queue_downsample(region(f64::from(i)));
            }
            match renderer.run_frame(Some(&source)).unwrap() {
                FrameOutcome::Rendered { resized: r, .. } => resized.push(r),
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(resized, vec![true, false, true]);
        assert_eq!(renderer.atlas_size(), AtlasSize::new(4, 1));
    }

    #[test]
    fn out_of_range_reads_fail() {
        let renderer = Renderer::new_cpu(RendererOptions::default()).unwrap();
        assert!(matches!(
            renderer.try_get_color(AtlasIndex(0)),
            Err(Error::IndexOutOfRange { index: 0, len: 0 })
        ));
        assert!(matches!(
            renderer.try_get_colors(AtlasIndex(0), AtlasIndex(2)),
            Err(Error::RangeOutOfBounds { .. })
        ));
    }

    #[test]
    fn cpu_capacity_is_the_atlas_bound() {
        let options = RendererOptions {
            max_atlas_size: AtlasSize::new(3, 2),
            ..RendererOptions::default()
        };
        let mut renderer = Renderer::new_cpu(options).unwrap();
        assert_eq!(renderer.capacity(), 6);
        renderer.begin_frame();
        for i in 0..7 {
            renderer.queue_downsample(region(f64::from(i)));
        }
        let source = SourceTexture::solid(8, 1, LinearColor::WHITE);
        assert!(matches!(
            renderer.run_frame(Some(&source)),
            Err(Error::CapacityExceeded {
                pixel_count: 7,
                capacity: 6
            })
        ));
    }

    #[test]
    fn zero_atlas_bound_is_rejected() {
        let options = RendererOptions {
            max_atlas_size: AtlasSize::new(0, 0),
            ..RendererOptions::default()
        };
        assert!(matches!(
            Renderer::new_cpu(options),
            Err(Error::InvalidAtlasSize(_))
        ));
    }
}
