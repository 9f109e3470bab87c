// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The fixture tree and the per-frame protocol that drives it.
//!
//! A frame walks the tree twice. The first walk collects one [`PixelRegion`] per fixture
//! pixel and registers it with the [`Renderer`]. The second walk hands every fixture the
//! colors for the regions it registered. Both walks are depth-first and pre-order, and
//! skip hidden subtrees, so a fixture's regions are found at the same indices in both.

use kurbo::Vec2;

use crate::{
    DmxOutput, Error, FrameOutcome, LinearColor, PixelRegion, Renderer, Result, SourceTexture,
};

/// Content of a tree node that is sampled from the source texture.
pub trait Sampleable: Send {
    /// Appends the regions to sample this frame, relative to the node's position.
    fn regions(&self, out: &mut Vec<PixelRegion>);

    /// Receives the color of the `ordinal`th region appended by [`Self::regions`].
    ///
    /// `color` is `None` when no readback holds a color for the region.
    fn receive_color(&mut self, ordinal: usize, color: Option<LinearColor>);

    /// Writes the channel values derived from the last received colors.
    fn write_dmx(&self, output: &mut DmxOutput) -> Result<()> {
        let _ = output;
        Ok(())
    }
}

/// A node of the fixture tree: a group, a fixture, or both.
pub struct RenderNode {
    name: String,
    /// Offset from the parent node, in source texels.
    position: Vec2,
    visible: bool,
    content: Option<Box<dyn Sampleable>>,
    children: Vec<RenderNode>,
}

impl RenderNode {
    /// A node without content, used to position its children.
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: Vec2::ZERO,
            visible: true,
            content: None,
            children: Vec::new(),
        }
    }

    pub fn fixture(name: impl Into<String>, content: impl Sampleable + 'static) -> Self {
        Self {
            content: Some(Box::new(content)),
            ..Self::group(name)
        }
    }

    #[must_use]
    pub fn with_position(mut self, position: impl Into<Vec2>) -> Self {
        self.position = position.into();
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    pub fn push_child(&mut self, child: Self) {
        self.children.push(child);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn set_position(&mut self, position: impl Into<Vec2>) {
        self.position = position.into();
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Hidden nodes and their descendants are neither sampled nor written to DMX.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn content(&self) -> Option<&dyn Sampleable> {
        self.content.as_deref()
    }

    pub fn children(&self) -> &[Self] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<Self> {
        &mut self.children
    }

    /// The first node named `name` in this subtree, in pre-order.
    pub fn find_mut(&mut self, name: &str) -> Option<&mut Self> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| child.find_mut(name))
    }
}

impl std::fmt::Debug for RenderNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderNode")
            .field("name", &self.name)
            .field("position", &self.position)
            .field("visible", &self.visible)
            .field("sampleable", &self.content.is_some())
            .field("children", &self.children)
            .finish()
    }
}

/// Where the tree is in its frame protocol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FramePhase {
    #[default]
    Idle,
    Registering,
    Sizing,
    Rendering,
    Readback,
    Distributing,
}

/// Whether [`FixtureRenderTree::run_frame`] waits for the pass it issued.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReadbackSync {
    /// Distribute whatever readback is available, usually the previous frame's.
    #[default]
    Deferred,
    /// Wait for this frame's readback before distributing.
    Wait,
}

/// What happened during one [`FixtureRenderTree::run_frame`].
#[derive(Debug, Default)]
pub struct FrameReport {
    pub pixel_count: u32,
    /// `None` if the frame failed before a pass could be issued.
    pub outcome: Option<FrameOutcome>,
    /// The failure of sizing, rendering or waiting, if any.
    pub error: Option<Error>,
    /// The frame whose readback was distributed.
    pub readback_frame: Option<u64>,
}

#[derive(Clone, Copy, Debug)]
struct Assignment {
    first: u32,
    count: u32,
}

/// The roots of the fixture tree, and the state of the current frame.
#[derive(Debug, Default)]
pub struct FixtureRenderTree {
    roots: Vec<RenderNode>,
    phase: FramePhase,
    assignments: Vec<Assignment>,
}

impl FixtureRenderTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_root(&mut self, root: RenderNode) {
        self.roots.push(root);
    }

    #[must_use]
    pub fn with_root(mut self, root: RenderNode) -> Self {
        self.push_root(root);
        self
    }

    pub fn roots(&self) -> &[RenderNode] {
        &self.roots
    }

    pub fn roots_mut(&mut self) -> &mut Vec<RenderNode> {
        &mut self.roots
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut RenderNode> {
        self.roots.iter_mut().find_map(|root| root.find_mut(name))
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    fn enter(&mut self, phase: FramePhase) {
        log::trace!("{:?} -> {phase:?}", self.phase);
        self.phase = phase;
    }

    /// Registers the regions of every visible fixture with `renderer`, replacing those of
    /// the previous frame.
    pub fn register(&mut self, renderer: &mut Renderer) -> u32 {
        self.enter(FramePhase::Registering);
        renderer.begin_frame();
        self.assignments.clear();
        let mut scratch = Vec::new();
        for root in &self.roots {
            register_node(root, Vec2::ZERO, renderer, &mut scratch, &mut self.assignments);
        }
        renderer.pixel_count()
    }

    /// Hands every fixture registered by [`Self::register`] its colors from `colors`.
    ///
    /// Regions without a color in `colors` receive `None`.
    pub fn distribute(&mut self, colors: &[LinearColor]) {
        self.enter(FramePhase::Distributing);
        let mut assignments = self.assignments.iter();
        for root in &mut self.roots {
            distribute_node(root, colors, &mut assignments);
        }
    }

    /// Runs one frame: register, size, render, optionally wait, then distribute.
    ///
    /// Never fails. Errors are logged and recorded in the report, and the tree is
    /// [`FramePhase::Idle`] again on return.
    pub fn run_frame(
        &mut self,
        renderer: &mut Renderer,
        source: Option<&SourceTexture>,
        sync: ReadbackSync,
    ) -> FrameReport {
        let mut report = FrameReport {
            pixel_count: self.register(renderer),
            ..FrameReport::default()
        };

        if report.pixel_count == 0 {
            report.outcome = Some(FrameOutcome::Empty);
        } else {
            self.enter(FramePhase::Sizing);
            let result = renderer.size_atlas().and_then(|update| {
                self.enter(FramePhase::Rendering);
                renderer.dispatch(source, update)
            });
            match result {
                Ok(outcome) => report.outcome = Some(outcome),
                Err(err) => {
                    log::debug!("frame not rendered: {err}");
                    report.error = Some(err);
                }
            }
        }

        if sync == ReadbackSync::Wait
            && matches!(report.outcome, Some(FrameOutcome::Rendered { .. }))
        {
            self.enter(FramePhase::Readback);
            if let Err(err) = renderer.wait_idle() {
                log::warn!("waiting for readback failed: {err}");
                report.error = Some(err);
            }
        }

        let (readback_frame, colors) = renderer.readback().snapshot();
        report.readback_frame = readback_frame;
        self.distribute(&colors);
        self.enter(FramePhase::Idle);
        report
    }

    /// Writes the channel values of every visible fixture.
    ///
    /// Every fixture is written even if some fail. The first failure is returned.
    pub fn write_dmx(&self, output: &mut DmxOutput) -> Result<()> {
        let mut first_error = None;
        for root in &self.roots {
            write_node(root, output, &mut first_error);
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn register_node(
    node: &RenderNode,
    parent_origin: Vec2,
    renderer: &mut Renderer,
    scratch: &mut Vec<PixelRegion>,
    assignments: &mut Vec<Assignment>,
) {
    if !node.visible {
        return;
    }
    let origin = parent_origin + node.position;
    if let Some(content) = &node.content {
        scratch.clear();
        content.regions(scratch);
        let first = renderer.pixel_count();
        for region in scratch.drain(..) {
            renderer.queue_downsample(region.translated(origin));
        }
        assignments.push(Assignment {
            first,
            count: renderer.pixel_count() - first,
        });
    }
    for child in &node.children {
        register_node(child, origin, renderer, scratch, assignments);
    }
}

fn distribute_node(
    node: &mut RenderNode,
    colors: &[LinearColor],
    assignments: &mut std::slice::Iter<'_, Assignment>,
) {
    if !node.visible {
        return;
    }
    if let Some(content) = &mut node.content {
        if let Some(assignment) = assignments.next() {
            for ordinal in 0..assignment.count as usize {
                let color = colors.get(assignment.first as usize + ordinal).copied();
                content.receive_color(ordinal, color);
            }
        }
    }
    for child in &mut node.children {
        distribute_node(child, colors, assignments);
    }
}

fn write_node(node: &RenderNode, output: &mut DmxOutput, first_error: &mut Option<Error>) {
    if !node.visible {
        return;
    }
    if let Some(content) = &node.content {
        if let Err(err) = content.write_dmx(output) {
            log::warn!("fixture {:?} could not be written: {err}", node.name);
            first_error.get_or_insert(err);
        }
    }
    for child in &node.children {
        write_node(child, output, first_error);
    }
}
