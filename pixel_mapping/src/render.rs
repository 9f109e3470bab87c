// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The render thread that runs downsample passes.

use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use pixel_mapping_shaders::GpuPixelRegion;

use crate::cpu::CpuEngine;
#[cfg(feature = "wgpu")]
use crate::wgpu_engine::WgpuEngine;
use crate::{AtlasRect, AtlasSize, Error, LinearColor, Result, SourceTexture};

/// The result of one completed pass.
#[derive(Clone, Debug)]
pub struct DownsampleOutput {
    pub frame: u64,
    /// The atlas cells written by the pass.
    pub rect: AtlasRect,
    /// One color per region, in region order.
    pub colors: Vec<LinearColor>,
}

pub type CompletionCallback = Box<dyn FnOnce(Result<DownsampleOutput>) + Send>;

/// Everything a pass needs, moved to the render thread.
pub struct DownsampleJob {
    pub frame: u64,
    pub source: SourceTexture,
    pub regions: Vec<GpuPixelRegion>,
    /// Dimensions of the atlas. Must hold at least `regions.len()` cells.
    pub atlas: AtlasSize,
    /// Called on the render thread once the colors are available, or the pass failed.
    pub on_complete: CompletionCallback,
}

impl std::fmt::Debug for DownsampleJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownsampleJob")
            .field("frame", &self.frame)
            .field("regions", &self.regions.len())
            .field("atlas", &self.atlas)
            .finish_non_exhaustive()
    }
}

pub(crate) enum Engine {
    Cpu(CpuEngine),
    #[cfg(feature = "wgpu")]
    Wgpu(Box<WgpuEngine>),
}

impl Engine {
    fn accepts(&self, source: &SourceTexture) -> bool {
        match self {
            Self::Cpu(_) => CpuEngine::accepts(source),
            #[cfg(feature = "wgpu")]
            Self::Wgpu(_) => WgpuEngine::accepts(source),
        }
    }

    fn run(&mut self, job: &DownsampleJob) -> Result<Vec<LinearColor>> {
        match self {
            Self::Cpu(engine) => engine.run(&job.source, &job.regions, job.atlas),
            #[cfg(feature = "wgpu")]
            Self::Wgpu(engine) => engine.run(&job.source, &job.regions, job.atlas),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Cpu(_) => "cpu",
            #[cfg(feature = "wgpu")]
            Self::Wgpu(_) => "wgpu",
        }
    }
}

enum RenderMessage {
    Downsample(DownsampleJob),
    Flush(Sender<()>),
}

/// Issues downsample passes without blocking the caller.
///
/// Jobs run in submission order on a dedicated thread, which also runs their completion
/// callbacks. Dropping the renderer finishes every queued job before joining the thread.
#[derive(Debug)]
pub struct DownsampleRenderer {
    sender: Option<Sender<RenderMessage>>,
    thread: Option<JoinHandle<()>>,
    engine: &'static str,
    #[cfg(feature = "wgpu")]
    accepts_gpu_sources: bool,
}

impl DownsampleRenderer {
    pub(crate) fn spawn(engine: Engine) -> Result<Self> {
        let name = engine.name();
        #[cfg(feature = "wgpu")]
        let accepts_gpu_sources = matches!(engine, Engine::Wgpu(_));
        let (sender, receiver) = crossbeam_channel::unbounded();
        let thread = std::thread::Builder::new()
            .name("pixel-mapping-render".into())
            .spawn(move || render_loop(engine, receiver))
            .map_err(Error::RenderThreadSpawn)?;
        log::info!("started {name} downsample renderer");
        Ok(Self {
            sender: Some(sender),
            thread: Some(thread),
            engine: name,
            #[cfg(feature = "wgpu")]
            accepts_gpu_sources,
        })
    }

    /// Name of the engine running the passes.
    pub fn engine(&self) -> &'static str {
        self.engine
    }

    /// Whether the engine can read `source` at all.
    pub fn accepts(&self, source: &SourceTexture) -> bool {
        match source {
            SourceTexture::Cpu(_) => true,
            #[cfg(feature = "wgpu")]
            SourceTexture::Gpu(_) => self.accepts_gpu_sources && WgpuEngine::accepts(source),
        }
    }

    /// Queues a pass.
    pub fn render(&self, job: DownsampleJob) -> Result<()> {
        self.send(RenderMessage::Downsample(job))
    }

    /// Blocks until every pass queued so far has completed.
    pub fn flush(&self) -> Result<()> {
        let (done, wait) = crossbeam_channel::bounded(1);
        self.send(RenderMessage::Flush(done))?;
        wait.recv().map_err(|_| Error::RenderThreadStopped)
    }

    fn send(&self, message: RenderMessage) -> Result<()> {
        self.sender
            .as_ref()
            .ok_or(Error::RenderThreadStopped)?
            .send(message)
            .map_err(|_| Error::RenderThreadStopped)
    }
}

impl Drop for DownsampleRenderer {
    fn drop(&mut self) {
        // Closing the channel ends the loop once the queue is drained.
        drop(self.sender.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("downsample render thread panicked");
            }
        }
    }
}

fn render_loop(mut engine: Engine, receiver: Receiver<RenderMessage>) {
    for message in receiver {
        match message {
            RenderMessage::Downsample(job) => {
                let result = if engine.accepts(&job.source) {
                    engine.run(&job).map(|colors| DownsampleOutput {
                        frame: job.frame,
                        rect: AtlasRect::covering(job.atlas, colors.len() as u32),
                        colors,
                    })
                } else {
                    Err(Error::SourceUnavailable)
                };
                (job.on_complete)(result);
            }
            RenderMessage::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
