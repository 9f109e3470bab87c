// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::{
    DownsampleConfig, GpuPixelRegion, BLEND_QUALITY_HIGH, BLEND_QUALITY_MEDIUM, DOWNSAMPLE_WG,
};

use super::CpuTexture;

fn fetch(
    config: &DownsampleConfig,
    source: &CpuTexture,
    region: &GpuPixelRegion,
    offset: [f32; 2],
) -> [f32; 4] {
    let max_x = config.source_width as i32 - 1;
    let max_y = config.source_height as i32 - 1;
    let px = (region.position[0] + region.size[0] * offset[0]).floor();
    let py = (region.position[1] + region.size[1] * offset[1]).floor();
    let x = (px as i32).clamp(0, max_x);
    let y = (py as i32).clamp(0, max_y);
    source.load(x, y)
}

fn accumulate(sum: &mut [f32; 4], texel: [f32; 4]) {
    for c in 0..4 {
        sum[c] += texel[c];
    }
}

fn sample_region(
    config: &DownsampleConfig,
    source: &CpuTexture,
    region: &GpuPixelRegion,
) -> [f32; 4] {
    if region.quality == BLEND_QUALITY_HIGH {
        let mut sum = [0.0; 4];
        for y in 0..3 {
            for x in 0..3 {
                let offset = [
                    (x as f32 * 2.0 + 1.0) / 6.0,
                    (y as f32 * 2.0 + 1.0) / 6.0,
                ];
                accumulate(&mut sum, fetch(config, source, region, offset));
            }
        }
        return sum.map(|c| c / 9.0);
    } else if region.quality == BLEND_QUALITY_MEDIUM {
        let mut sum = fetch(config, source, region, [0.5, 0.5]);
        accumulate(&mut sum, fetch(config, source, region, [0.25, 0.25]));
        accumulate(&mut sum, fetch(config, source, region, [0.75, 0.25]));
        accumulate(&mut sum, fetch(config, source, region, [0.25, 0.75]));
        accumulate(&mut sum, fetch(config, source, region, [0.75, 0.75]));
        return sum.map(|c| c / 5.0);
    }
    fetch(config, source, region, [0.5, 0.5])
}

fn downsample_main(
    config: &DownsampleConfig,
    regions: &[GpuPixelRegion],
    source: &CpuTexture,
    atlas: &mut [[f32; 4]],
    global_id: u32,
) {
    let ix = global_id;
    if ix >= config.n_regions {
        return;
    }
    let region = &regions[ix as usize];
    let sampled = sample_region(config, source, region);
    let mut color = [0.0; 4];
    for c in 0..4 {
        let inverted = if region.invert[c] > 0.5 {
            1.0 - sampled[c]
        } else {
            sampled[c]
        };
        color[c] = inverted * region.expose[c];
    }
    let cell_x = ix % config.atlas_width;
    let cell_y = ix / config.atlas_width;
    atlas[(cell_y * config.atlas_width + cell_x) as usize] = color;
}

/// Runs the downsample shader over every region.
///
/// `atlas` holds `atlas_width * atlas_height` cells in row major order.
pub fn downsample(
    config: &DownsampleConfig,
    regions: &[GpuPixelRegion],
    source: &CpuTexture,
    atlas: &mut [[f32; 4]],
) {
    if source.width == 0 || source.height == 0 {
        return;
    }
    for wg in 0..config.workgroup_count() {
        for local_ix in 0..DOWNSAMPLE_WG {
            downsample_main(config, regions, source, atlas, wg * DOWNSAMPLE_WG + local_ix);
        }
    }
}
