// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The downsample pass on the CPU, used when no GPU is requested.

use pixel_mapping_shaders::{cpu, DownsampleConfig, GpuPixelRegion};

use crate::{AtlasSize, Error, LinearColor, Result, SourceTexture};

#[derive(Debug, Default)]
pub(crate) struct CpuEngine {
    size: AtlasSize,
    atlas: Vec<[f32; 4]>,
}

impl CpuEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn accepts(source: &SourceTexture) -> bool {
        matches!(source, SourceTexture::Cpu(_))
    }

    pub(crate) fn run(
        &mut self,
        source: &SourceTexture,
        regions: &[GpuPixelRegion],
        size: AtlasSize,
    ) -> Result<Vec<LinearColor>> {
        let texture = match source {
            SourceTexture::Cpu(texture) => texture,
            #[cfg(feature = "wgpu")]
            SourceTexture::Gpu(_) => return Err(Error::SourceUnavailable),
        };
        if texture.width == 0 || texture.height == 0 {
            return Err(Error::SourceUnavailable);
        }
        if regions.len() as u64 > size.cell_count() {
            return Err(Error::CapacityExceeded {
                pixel_count: regions.len() as u32,
                capacity: size.cell_count(),
            });
        }
        if self.size != size {
            self.atlas = vec![[0.0; 4]; size.cell_count() as usize];
            self.size = size;
        }
        let config = DownsampleConfig {
            atlas_width: size.width,
            atlas_height: size.height,
            n_regions: regions.len() as u32,
            source_width: texture.width as u32,
            source_height: texture.height as u32,
            _padding: [0; 3],
        };
        cpu::downsample(&config, regions, texture, &mut self.atlas);
        Ok(self.atlas[..regions.len()]
            .iter()
            .copied()
            .map(LinearColor::new)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use kurbo::{Point, Size};

    use super::*;
    use crate::{color, PixelRegion};

    #[test]
    fn reads_back_one_color_per_region() {
        let mut engine = CpuEngine::new();
        let source = SourceTexture::solid(2, 2, color::RED);
        let regions: Vec<_> = (0..3)
            .map(|i| {
                PixelRegion::new(Point::new(f64::from(i) * 0.5, 0.0), Size::new(1.0, 1.0)).encode()
            })
            .collect();
        let colors = engine.run(&source, &regions, AtlasSize::new(3, 1)).unwrap();
        assert_eq!(colors, vec![color::RED; 3]);
    }

    #[test]
    fn empty_source_is_unavailable() {
        let mut engine = CpuEngine::new();
        let source = SourceTexture::solid(0, 4, color::RED);
        let regions = [PixelRegion::new(Point::ZERO, Size::new(1.0, 1.0)).encode()];
        assert!(matches!(
            engine.run(&source, &regions, AtlasSize::new(1, 1)),
            Err(Error::SourceUnavailable)
        ));
    }
}
