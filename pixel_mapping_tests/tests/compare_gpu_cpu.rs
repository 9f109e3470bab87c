// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tests that the wgpu engine and the CPU engine agree on the colors they read back.
//!
//! These need a GPU adapter, and are ignored when `PIXEL_MAPPING_CI_GPU_SUPPORT=no`.

use pixel_mapping::kurbo::{Point, Size};
use pixel_mapping::{
    color, AtlasIndex, AtlasSize, BlendingQuality, Error, LinearColor, PixelRegion,
    RendererOptions, SourceTexture, MAX_ATLAS_SIZE,
};
use pixel_mapping_tests::{
    compare_gpu_cpu_sync, create_renderer_sync, downsample, gradient_source, random_regions,
    TestParams,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

// The atlas is Rgba32Float, so both engines should agree to float rounding.
const TOLERANCE: f32 = 1e-5;

#[test]
#[cfg_attr(skip_gpu_tests, ignore)]
fn solid_source_on_gpu() {
    let mut renderer = create_renderer_sync(&TestParams::new("solid_source_on_gpu")).unwrap();
    let source = SourceTexture::solid(2, 2, color::RED);
    let regions: Vec<_> = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]
        .into_iter()
        .map(|(x, y)| PixelRegion::new(Point::new(x, y), Size::new(1.0, 1.0)))
        .collect();
    let colors = downsample(&mut renderer, &source, &regions).unwrap();
    assert_eq!(colors, vec![color::RED; 3]);
}

#[test]
#[cfg_attr(skip_gpu_tests, ignore)]
fn invert_on_gpu() {
    let mut renderer = create_renderer_sync(&TestParams::new("invert_on_gpu")).unwrap();
    let source = SourceTexture::solid(2, 2, color::RED);
    let region = PixelRegion::new(Point::ZERO, Size::new(2.0, 2.0))
        .with_invert([true, false, false, false]);
    let colors = downsample(&mut renderer, &source, &[region]).unwrap();
    assert_eq!(colors, vec![LinearColor::BLACK]);
}

#[test]
#[cfg_attr(skip_gpu_tests, ignore)]
fn gradient_every_quality() {
    let source = gradient_source(64, 48);
    let regions: Vec<_> = [
        BlendingQuality::Low,
        BlendingQuality::Medium,
        BlendingQuality::High,
    ]
    .into_iter()
    .enumerate()
    .map(|(i, quality)| {
        PixelRegion::new(Point::new(i as f64 * 13.0, 7.0), Size::new(12.0, 9.0))
            .with_quality(quality)
    })
    .collect();
    compare_gpu_cpu_sync("gradient_every_quality", &source, &regions)
        .unwrap()
        .assert_max_difference_less_than(TOLERANCE)
        .unwrap();
}

#[test]
#[cfg_attr(skip_gpu_tests, ignore)]
fn random_regions_agree() {
    let mut rng = StdRng::seed_from_u64(0x5eed_cafe);
    let source = gradient_source(97, 61);
    // More regions than one workgroup, and more than one atlas row.
    let regions = random_regions(&mut rng, 700, 97, 61);
    compare_gpu_cpu_sync("random_regions_agree", &source, &regions)
        .unwrap()
        .assert_max_difference_less_than(TOLERANCE)
        .unwrap();
}

#[test]
#[cfg_attr(skip_gpu_tests, ignore)]
fn wrapped_atlas_reads_back_in_index_order() {
    let mut params = TestParams::new("wrapped_atlas_reads_back_in_index_order");
    params.options = RendererOptions {
        max_atlas_size: AtlasSize::new(5, 5),
        ..params.options
    };
    let mut renderer = create_renderer_sync(&params).unwrap();
    let source = gradient_source(23, 1);
    let regions: Vec<_> = (0..23)
        .map(|i| PixelRegion::new(Point::new(f64::from(i), 0.0), Size::new(1.0, 1.0)))
        .collect();
    downsample(&mut renderer, &source, &regions).unwrap();
    assert_eq!(renderer.atlas_size(), AtlasSize::new(5, 5));
    for i in 0..23 {
        let color = renderer.try_get_color(AtlasIndex(i)).unwrap();
        let red = color.components[0];
        assert!((red - i as f32 / 22.0).abs() < TOLERANCE, "region {i}: {color:?}");
    }
}

#[test]
#[cfg_attr(skip_gpu_tests, ignore)]
fn atlas_grows_between_frames() {
    let mut renderer = create_renderer_sync(&TestParams::new("atlas_grows_between_frames")).unwrap();
    let source = SourceTexture::solid(4, 4, color::GREEN);
    for count in [1, 3, 2, 9] {
        let regions: Vec<_> = (0..count)
            .map(|i| PixelRegion::new(Point::new(f64::from(i % 4), 0.0), Size::new(1.0, 1.0)))
            .collect();
        let colors = downsample(&mut renderer, &source, &regions).unwrap();
        assert_eq!(colors, vec![color::GREEN; count as usize]);
    }
}

#[test]
#[cfg_attr(skip_gpu_tests, ignore)]
fn frame_past_device_capacity_is_refused() {
    let mut renderer =
        create_renderer_sync(&TestParams::new("frame_past_device_capacity_is_refused")).unwrap();
    let capacity = renderer.capacity();
    assert!(capacity > 0 && capacity <= MAX_ATLAS_SIZE.cell_count());

    let source = SourceTexture::solid(4, 4, color::BLUE);
    let region = PixelRegion::new(Point::ZERO, Size::new(1.0, 1.0));
    renderer.begin_frame();
    for _ in 0..=capacity {
        renderer.queue_downsample(region);
    }
    match renderer.run_frame(Some(&source)) {
        Err(Error::CapacityExceeded {
            pixel_count,
            capacity: reported,
        }) => {
            assert_eq!(u64::from(pixel_count), capacity + 1);
            assert_eq!(reported, capacity);
        }
        other => panic!("expected capacity error, got {other:?}"),
    }

    // The render thread is still serving passes.
    let colors = downsample(&mut renderer, &source, &[region; 3]).unwrap();
    assert_eq!(colors, vec![color::BLUE; 3]);
}
