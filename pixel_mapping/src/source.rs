// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::sync::Arc;

use pixel_mapping_shaders::cpu::CpuTexture;

use crate::{color, LinearColor};

/// The image that pixel regions are sampled from.
///
/// The pipeline treats it as opaque. Whatever produced it (a material, a widget, a video
/// frame) is the host's concern.
#[derive(Clone, Debug)]
pub enum SourceTexture {
    /// Linear RGBA texels in host memory. The wgpu engine uploads these, and re-uploads
    /// only when a different allocation is passed.
    Cpu(Arc<CpuTexture>),
    /// A texture already on the renderer's device. It must have
    /// [`wgpu::TextureUsages::TEXTURE_BINDING`] and a float sample type. Only the wgpu
    /// engine can read it.
    #[cfg(feature = "wgpu")]
    Gpu(wgpu::Texture),
}

impl SourceTexture {
    /// A host texture of a single color.
    pub fn solid(width: u32, height: u32, color: LinearColor) -> Self {
        let mut texture = CpuTexture::new(width as usize, height as usize);
        texture.pixels.fill(color.components);
        Self::Cpu(Arc::new(texture))
    }

    /// A host texture from linear colors in row major order.
    ///
    /// Returns `None` if `pixels` does not hold exactly `width * height` colors.
    pub fn from_pixels(width: u32, height: u32, pixels: &[LinearColor]) -> Option<Self> {
        if pixels.len() != width as usize * height as usize {
            return None;
        }
        Some(Self::Cpu(Arc::new(CpuTexture {
            width: width as usize,
            height: height as usize,
            pixels: pixels.iter().map(|c| c.components).collect(),
        })))
    }

    /// A host texture from tightly packed 8-bit sRGB-encoded RGBA.
    ///
    /// Color components are decoded to linear sRGB. Alpha is taken as is.
    pub fn from_rgba8(width: u32, height: u32, data: &[u8]) -> Option<Self> {
        if data.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self::Cpu(Arc::new(CpuTexture {
            width: width as usize,
            height: height as usize,
            pixels: data
                .chunks_exact(4)
                .map(|p| color::from_srgb8(p[0], p[1], p[2], p[3]).components)
                .collect(),
        })))
    }

    pub fn width(&self) -> u32 {
        match self {
            Self::Cpu(texture) => texture.width as u32,
            #[cfg(feature = "wgpu")]
            Self::Gpu(texture) => texture.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Self::Cpu(texture) => texture.height as u32,
            #[cfg(feature = "wgpu")]
            Self::Gpu(texture) => texture.height(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

impl From<CpuTexture> for SourceTexture {
    fn from(texture: CpuTexture) -> Self {
        Self::Cpu(Arc::new(texture))
    }
}

#[cfg(feature = "wgpu")]
impl From<wgpu::Texture> for SourceTexture {
    fn from(texture: wgpu::Texture) -> Self {
        Self::Gpu(texture)
    }
}
