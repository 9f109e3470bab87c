// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fixture trees driven frame by frame, down to the DMX channels they write.

use pixel_mapping::kurbo::Size;
use pixel_mapping::{
    color, CellDistribution, ColorMode, DmxOutput, FixtureGroupItem, FixtureMatrix, FixturePatch,
    FixtureRenderTree, FramePhase, FrameOutcome, LinearColor, NoDataPolicy, ReadbackSync,
    RenderNode, Renderer, SourceTexture,
};
use pixel_mapping_tests::{create_renderer_sync, TestParams};

fn renderer() -> Renderer {
    create_renderer_sync(&TestParams::cpu("frame protocol")).unwrap()
}

/// A 4x4 source split into red, green, blue and white quadrants.
fn quadrants() -> SourceTexture {
    let pixels: Vec<_> = (0..4)
        .flat_map(|y| {
            (0..4).map(move |x| match (x < 2, y < 2) {
                (true, true) => color::RED,
                (false, true) => color::GREEN,
                (true, false) => color::BLUE,
                (false, false) => LinearColor::WHITE,
            })
        })
        .collect();
    SourceTexture::from_pixels(4, 4, &pixels).unwrap()
}

fn rgb_item(address: u16) -> FixtureGroupItem {
    FixtureGroupItem::new(Size::new(1.0, 1.0), FixturePatch::rgb(0, address))
}

#[test]
fn snake_matrix_reaches_dmx() {
    let matrix = FixtureMatrix::new(2, 2, Size::new(2.0, 2.0), FixturePatch::rgb(1, 1))
        .with_distribution(CellDistribution::SnakeRows);
    let mut tree = FixtureRenderTree::new().with_root(RenderNode::fixture("panel", matrix));
    let mut renderer = renderer();
    let report = tree.run_frame(&mut renderer, Some(&quadrants()), ReadbackSync::Wait);
    assert!(report.error.is_none(), "{:?}", report.error);
    assert_eq!(report.pixel_count, 4);
    assert_eq!(report.readback_frame, Some(1));
    assert_eq!(tree.phase(), FramePhase::Idle);

    let mut output = DmxOutput::new();
    tree.write_dmx(&mut output).unwrap();
    let channels = &output.universe(1).unwrap().as_slice()[..12];
    #[rustfmt::skip]
    assert_eq!(channels, &[
        255, 0, 0,
        0, 255, 0,
        255, 255, 255,
        0, 0, 255,
    ]);
}

#[test]
fn nested_groups_offset_their_fixtures() {
    let mut tree = FixtureRenderTree::new().with_root(
        RenderNode::group("rig")
            .with_position((2.0, 0.0))
            .with_child(RenderNode::fixture("top", rgb_item(1)))
            .with_child(RenderNode::fixture("bottom", rgb_item(4)).with_position((0.0, 3.0))),
    );
    let mut renderer = renderer();
    tree.run_frame(&mut renderer, Some(&quadrants()), ReadbackSync::Wait);
    let mut output = DmxOutput::new();
    tree.write_dmx(&mut output).unwrap();
    assert_eq!(&output.universe(0).unwrap().as_slice()[..6], &[0, 255, 0, 255, 255, 255]);
}

#[test]
fn deferred_frames_catch_up() {
    let mut tree = FixtureRenderTree::new().with_root(RenderNode::fixture("a", rgb_item(1)));
    let mut renderer = renderer();
    let source = SourceTexture::solid(1, 1, color::BLUE);

    let first = tree.run_frame(&mut renderer, Some(&source), ReadbackSync::Deferred);
    assert!(matches!(first.outcome, Some(FrameOutcome::Rendered { frame: 1, .. })));
    // The pass may or may not have completed yet.
    assert!(matches!(first.readback_frame, None | Some(1)));

    renderer.wait_idle().unwrap();
    let second = tree.run_frame(&mut renderer, Some(&source), ReadbackSync::Deferred);
    assert!(matches!(second.readback_frame, Some(1 | 2)));
    let mut output = DmxOutput::new();
    tree.write_dmx(&mut output).unwrap();
    assert_eq!(output.channel(0, 3), Some(255));
}

#[test]
fn fixtures_without_data_hold_or_black_out() {
    let mut tree = FixtureRenderTree::new()
        .with_root(RenderNode::fixture("hold", rgb_item(1)))
        .with_root(RenderNode::fixture(
            "blackout",
            rgb_item(4).with_no_data_policy(NoDataPolicy::Blackout),
        ));
    let mut renderer = renderer();
    let red = SourceTexture::solid(2, 2, color::RED);
    tree.run_frame(&mut renderer, Some(&red), ReadbackSync::Wait);
    let mut output = DmxOutput::new();
    tree.write_dmx(&mut output).unwrap();
    assert_eq!(output.channel(0, 1), Some(255));
    assert_eq!(output.channel(0, 4), Some(255));

    // Two new regions in front push both fixtures past the end of the old readback.
    let panel = FixtureMatrix::new(2, 1, Size::new(1.0, 1.0), FixturePatch::rgb(2, 1));
    tree.roots_mut().insert(0, RenderNode::fixture("panel", panel));
    let report = tree.run_frame(&mut renderer, None, ReadbackSync::Wait);
    assert_eq!(report.outcome, Some(FrameOutcome::NoSource));
    assert_eq!(report.readback_frame, Some(1));

    tree.write_dmx(&mut output).unwrap();
    assert_eq!(output.channel(0, 1), Some(255), "hold keeps the last color");
    assert_eq!(output.channel(0, 4), Some(0), "blackout writes zeros");
    // The panel got the old colors of the first two regions.
    assert_eq!(&output.universe(2).unwrap().as_slice()[..6], &[255, 0, 0, 255, 0, 0]);
}

#[test]
fn hidden_fixtures_are_neither_sampled_nor_written() {
    let mut tree = FixtureRenderTree::new()
        .with_root(RenderNode::fixture("a", rgb_item(1)))
        .with_root(RenderNode::fixture("b", rgb_item(4)));
    tree.find_mut("a").unwrap().set_visible(false);
    let mut renderer = renderer();
    let report = tree.run_frame(
        &mut renderer,
        Some(&SourceTexture::solid(1, 1, color::GREEN)),
        ReadbackSync::Wait,
    );
    assert_eq!(report.pixel_count, 1);
    let mut output = DmxOutput::new();
    tree.write_dmx(&mut output).unwrap();
    assert_eq!(&output.universe(0).unwrap().as_slice()[..6], &[0, 0, 0, 0, 255, 0]);
}

#[test]
fn monochrome_dimmer_follows_luminance() {
    let item = FixtureGroupItem::new(Size::new(1.0, 1.0), FixturePatch::dimmer(0, 10))
        .with_color_mode(ColorMode::MONOCHROME);
    let mut tree = FixtureRenderTree::new().with_root(RenderNode::fixture("dimmer", item));
    let mut renderer = renderer();
    let gray = SourceTexture::solid(1, 1, LinearColor::new([0.4, 0.4, 0.4, 1.0]));
    tree.run_frame(&mut renderer, Some(&gray), ReadbackSync::Wait);
    let mut output = DmxOutput::new();
    tree.write_dmx(&mut output).unwrap();
    assert_eq!(output.channel(0, 10), Some(102));
}

#[test]
fn empty_tree_distributes_nothing() {
    let mut tree = FixtureRenderTree::new().with_root(RenderNode::group("empty"));
    let mut renderer = renderer();
    let report = tree.run_frame(&mut renderer, None, ReadbackSync::Wait);
    assert_eq!(report.outcome, Some(FrameOutcome::Empty));
    assert!(report.error.is_none());
    let mut output = DmxOutput::new();
    tree.write_dmx(&mut output).unwrap();
    assert_eq!(output.iter().count(), 0);
}
