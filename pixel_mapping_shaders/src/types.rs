// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Types that are shared between the shader metadata and its users.

/// The type of resource that will be bound to a slot in a shader.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BindType {
    /// A uniform buffer.
    Uniform,
    /// A storage buffer with read only access.
    BufReadOnly,
    /// A sampled texture, read with texel fetches only.
    ImageRead,
    /// A write only `rgba32float` storage image.
    Image,
}
