// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use kurbo::{Point, Rect, Size, Vec2};
use pixel_mapping_shaders::{
    GpuPixelRegion, BLEND_QUALITY_HIGH, BLEND_QUALITY_LOW, BLEND_QUALITY_MEDIUM,
};

/// Position of a registered region in the downsample atlas.
///
/// Indices are dense and follow registration order. They are only meaningful for the
/// frame in which they were handed out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtlasIndex(pub u32);

impl AtlasIndex {
    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// How many texels are averaged to produce a region's color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendingQuality {
    /// The texel at the centre of the region.
    #[default]
    Low,
    /// The centre and the four quarter points.
    Medium,
    /// A 3x3 grid spread evenly over the region.
    High,
}

impl BlendingQuality {
    pub const fn samples(self) -> u32 {
        match self {
            Self::Low => 1,
            Self::Medium => 5,
            Self::High => 9,
        }
    }

    fn to_gpu(self) -> u32 {
        match self {
            Self::Low => BLEND_QUALITY_LOW,
            Self::Medium => BLEND_QUALITY_MEDIUM,
            Self::High => BLEND_QUALITY_HIGH,
        }
    }
}

/// Which color channels a fixture consumes, as seen by the downsample pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorMode {
    /// Independent red, green and blue channels.
    Rgb { expose: [bool; 3], invert: [bool; 3] },
    /// A single intensity channel, replicated across red, green and blue.
    Monochrome { expose: bool, invert: bool },
}

impl ColorMode {
    pub const RGB: Self = Self::Rgb {
        expose: [true; 3],
        invert: [false; 3],
    };

    pub const MONOCHROME: Self = Self::Monochrome {
        expose: true,
        invert: false,
    };

    /// Expose and invert factors for the RGBA channels. Alpha is always passed through.
    pub fn factors(self) -> ([f32; 4], [bool; 4]) {
        let (expose, invert) = match self {
            Self::Rgb { expose, invert } => (expose, invert),
            Self::Monochrome { expose, invert } => ([expose; 3], [invert; 3]),
        };
        let [er, eg, eb] = expose.map(|e| if e { 1.0 } else { 0.0 });
        let [ir, ig, ib] = invert;
        ([er, eg, eb, 1.0], [ir, ig, ib, false])
    }

    pub fn is_monochrome(self) -> bool {
        matches!(self, Self::Monochrome { .. })
    }
}

/// A rectangle of the source texture that is reduced to a single color.
///
/// Regions are rebuilt by their owners every frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelRegion {
    /// Top-left corner. Source texture texels once the tree walk has placed the region,
    /// local to the owning node before that.
    pub position: Point,
    pub size: Size,
    /// Per channel factor in `[0, 1]`, applied after inversion.
    pub expose: [f32; 4],
    pub invert: [bool; 4],
    pub quality: BlendingQuality,
}

impl PixelRegion {
    /// A region passing every channel through unchanged.
    pub fn new(position: Point, size: Size) -> Self {
        Self {
            position,
            size,
            expose: [1.0; 4],
            invert: [false; 4],
            quality: BlendingQuality::Low,
        }
    }

    pub fn from_rect(rect: Rect) -> Self {
        Self::new(rect.origin(), rect.size())
    }

    #[must_use]
    pub fn with_expose(mut self, expose: [f32; 4]) -> Self {
        self.expose = expose.map(|e| e.clamp(0.0, 1.0));
        self
    }

    #[must_use]
    pub fn with_invert(mut self, invert: [bool; 4]) -> Self {
        self.invert = invert;
        self
    }

    #[must_use]
    pub fn with_quality(mut self, quality: BlendingQuality) -> Self {
        self.quality = quality;
        self
    }

    #[must_use]
    pub fn with_color_mode(self, mode: ColorMode) -> Self {
        let (expose, invert) = mode.factors();
        self.with_expose(expose).with_invert(invert)
    }

    #[must_use]
    pub fn translated(mut self, offset: Vec2) -> Self {
        self.position += offset;
        self
    }

    pub fn rect(&self) -> Rect {
        Rect::from_origin_size(self.position, self.size)
    }

    pub(crate) fn encode(&self) -> GpuPixelRegion {
        GpuPixelRegion {
            position: [self.position.x as f32, self.position.y as f32],
            size: [self.size.width as f32, self.size.height as f32],
            expose: self.expose,
            invert: self.invert.map(|i| if i { 1.0 } else { 0.0 }),
            quality: self.quality.to_gpu(),
            _padding: [0; 3],
        }
    }
}
