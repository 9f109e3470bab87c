// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conversion of sampled colors into DMX channel values.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::{color, Error, LinearColor, Result};

/// Number of channels in one DMX universe.
pub const UNIVERSE_SIZE: usize = 512;

/// Width of one attribute's value on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DmxSignalFormat {
    #[default]
    Bit8,
    Bit16,
    Bit24,
    Bit32,
}

impl DmxSignalFormat {
    /// Number of channels the value occupies.
    pub const fn channels(self) -> usize {
        match self {
            Self::Bit8 => 1,
            Self::Bit16 => 2,
            Self::Bit24 => 3,
            Self::Bit32 => 4,
        }
    }

    pub const fn max_value(self) -> u32 {
        match self {
            Self::Bit8 => 0xff,
            Self::Bit16 => 0xffff,
            Self::Bit24 => 0xff_ffff,
            Self::Bit32 => u32::MAX,
        }
    }

    /// Scales `value` from `[0, 1]` to the full range of the format.
    pub fn quantize(self, value: f32) -> u32 {
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        (f64::from(value) * f64::from(self.max_value())).round() as u32
    }

    /// Channel bytes for `value`, most significant first unless `lsb_mode` is set.
    pub fn encode(self, value: f32, lsb_mode: bool) -> SmallVec<[u8; 4]> {
        let bytes = self.quantize(value).to_be_bytes();
        let mut out = SmallVec::from_slice(&bytes[4 - self.channels()..]);
        if lsb_mode {
            out.reverse();
        }
        out
    }
}

/// The quantity an attribute carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorChannel {
    Red,
    Green,
    Blue,
    Alpha,
    Cyan,
    Magenta,
    Yellow,
    /// Rec. 709 luminance of the red, green and blue components.
    Luminance,
}

impl ColorChannel {
    pub fn value(self, color: LinearColor) -> f32 {
        let [r, g, b, a] = color.components;
        match self {
            Self::Red => r,
            Self::Green => g,
            Self::Blue => b,
            Self::Alpha => a,
            Self::Cyan => 1.0 - r,
            Self::Magenta => 1.0 - g,
            Self::Yellow => 1.0 - b,
            Self::Luminance => color::luminance(color),
        }
    }
}

/// One attribute of a patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AttributeMapping {
    pub channel: ColorChannel,
    /// Zero based offset from the patch address.
    pub offset: u16,
    pub format: DmxSignalFormat,
    pub lsb_mode: bool,
}

impl AttributeMapping {
    pub fn new(channel: ColorChannel, offset: u16, format: DmxSignalFormat) -> Self {
        Self {
            channel,
            offset,
            format,
            lsb_mode: false,
        }
    }

    #[must_use]
    pub fn with_lsb_mode(mut self, lsb_mode: bool) -> Self {
        self.lsb_mode = lsb_mode;
        self
    }

    fn end(&self) -> u16 {
        self.offset.saturating_add(self.format.channels() as u16)
    }
}

/// Where a fixture lives in the DMX output, and how its color is laid out there.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixturePatch {
    pub universe: u32,
    /// First channel, in `1..=512`.
    pub address: u16,
    pub attributes: SmallVec<[AttributeMapping; 4]>,
}

impl FixturePatch {
    /// A patch without attributes.
    pub fn new(universe: u32, address: u16) -> Self {
        Self {
            universe,
            address,
            attributes: SmallVec::new(),
        }
    }

    /// Three consecutive 8-bit channels: red, green, blue.
    pub fn rgb(universe: u32, address: u16) -> Self {
        Self::new(universe, address)
            .with_attribute(AttributeMapping::new(ColorChannel::Red, 0, DmxSignalFormat::Bit8))
            .with_attribute(AttributeMapping::new(ColorChannel::Green, 1, DmxSignalFormat::Bit8))
            .with_attribute(AttributeMapping::new(ColorChannel::Blue, 2, DmxSignalFormat::Bit8))
    }

    /// A single 8-bit dimmer channel driven by luminance.
    pub fn dimmer(universe: u32, address: u16) -> Self {
        Self::new(universe, address).with_attribute(AttributeMapping::new(
            ColorChannel::Luminance,
            0,
            DmxSignalFormat::Bit8,
        ))
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: AttributeMapping) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Number of channels covered by the attributes.
    pub fn footprint(&self) -> u16 {
        self.attributes.iter().map(AttributeMapping::end).max().unwrap_or(0)
    }

    /// The same patch moved to `address`.
    #[must_use]
    pub fn at_address(&self, address: u16) -> Self {
        Self {
            address,
            ..self.clone()
        }
    }

    fn check_bounds(&self) -> Result<()> {
        let last = u32::from(self.address) + u32::from(self.footprint()).saturating_sub(1);
        if self.address == 0 || last > UNIVERSE_SIZE as u32 {
            return Err(Error::DmxAddressOutOfRange {
                universe: self.universe,
                address: u32::from(self.address),
                footprint: self.footprint(),
            });
        }
        Ok(())
    }

    /// Writes every attribute of `color`. Nothing is written if any attribute would
    /// fall outside the universe.
    pub fn write(&self, color: LinearColor, output: &mut DmxOutput) -> Result<()> {
        self.check_bounds()?;
        let universe = output.universe_mut(self.universe);
        for attribute in &self.attributes {
            let bytes = attribute
                .format
                .encode(attribute.channel.value(color), attribute.lsb_mode);
            universe.write(self.address + attribute.offset, &bytes)?;
        }
        Ok(())
    }

    /// Sets every channel of the patch to zero.
    pub fn write_zeros(&self, output: &mut DmxOutput) -> Result<()> {
        self.check_bounds()?;
        let universe = output.universe_mut(self.universe);
        for attribute in &self.attributes {
            let zeros = [0; 4];
            universe.write(
                self.address + attribute.offset,
                &zeros[..attribute.format.channels()],
            )?;
        }
        Ok(())
    }
}

/// What a fixture sends when a frame has no color for it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NoDataPolicy {
    /// Keep sending the last values.
    #[default]
    Hold,
    /// Send zeros.
    Blackout,
}

/// The 512 channels of one universe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DmxUniverse {
    id: u32,
    channels: [u8; UNIVERSE_SIZE],
}

impl DmxUniverse {
    /// A universe with every channel at zero.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            channels: [0; UNIVERSE_SIZE],
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Value of channel `address`, counted from 1.
    pub fn get(&self, address: u16) -> Option<u8> {
        let index = usize::from(address).checked_sub(1)?;
        self.channels.get(index).copied()
    }

    /// Writes `bytes` starting at channel `address`, counted from 1.
    pub fn write(&mut self, address: u16, bytes: &[u8]) -> Result<()> {
        let start = usize::from(address).wrapping_sub(1);
        let slot = self
            .channels
            .get_mut(start..start.saturating_add(bytes.len()))
            .ok_or(Error::DmxAddressOutOfRange {
                universe: self.id,
                address: u32::from(address),
                footprint: bytes.len() as u16,
            })?;
        slot.copy_from_slice(bytes);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.channels
    }

    pub fn clear(&mut self) {
        self.channels.fill(0);
    }
}

/// Channel values of every universe written to so far.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DmxOutput {
    universes: BTreeMap<u32, DmxUniverse>,
}

impl DmxOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn universe(&self, id: u32) -> Option<&DmxUniverse> {
        self.universes.get(&id)
    }

    /// The universe `id`, created zeroed if needed.
    pub fn universe_mut(&mut self, id: u32) -> &mut DmxUniverse {
        self.universes
            .entry(id)
            .or_insert_with(|| DmxUniverse::new(id))
    }

    /// Value of `address` in universe `id`, zero for universes never written.
    pub fn channel(&self, id: u32, address: u16) -> Option<u8> {
        match self.universe(id) {
            Some(universe) => universe.get(address),
            None => (1..=UNIVERSE_SIZE as u16).contains(&address).then_some(0),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &DmxUniverse)> {
        self.universes.iter().map(|(id, universe)| (*id, universe))
    }

    /// Zeroes every universe.
    pub fn clear(&mut self) {
        self.universes.values_mut().for_each(DmxUniverse::clear);
    }
}
