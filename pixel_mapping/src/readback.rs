// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::sync::{Mutex, MutexGuard};

use crate::LinearColor;

#[derive(Debug, Default)]
struct ReadbackState {
    frame: Option<u64>,
    colors: Vec<LinearColor>,
}

/// CPU copy of the most recent atlas readback.
///
/// The render thread replaces the whole contents once per completed pass. Any thread may
/// read. Each call takes the lock once, so a reader never observes a partially written
/// readback.
#[derive(Debug, Default)]
pub struct ReadbackBuffer {
    state: Mutex<ReadbackState>,
}

impl ReadbackBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ReadbackState> {
        // Plain color data cannot be left in an inconsistent state by a panicking writer.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Replaces the contents with the readback of `frame`.
    pub fn set_all(&self, frame: u64, colors: Vec<LinearColor>) {
        let mut state = self.lock();
        state.frame = Some(frame);
        state.colors = colors;
    }

    pub fn get(&self, index: usize) -> Option<LinearColor> {
        self.lock().colors.get(index).copied()
    }

    /// Colors `first..=last`, or `None` unless every one of them is present.
    pub fn get_range(&self, first: usize, last: usize) -> Option<Vec<LinearColor>> {
        if first > last {
            return None;
        }
        self.lock().colors.get(first..=last).map(<[_]>::to_vec)
    }

    /// Zeroes `first..=last`, clipped to the stored colors.
    pub fn reset_range(&self, first: usize, last: usize) {
        let mut state = self.lock();
        let end = last.saturating_add(1).min(state.colors.len());
        if first < end {
            state.colors[first..end].fill(LinearColor::TRANSPARENT);
        }
    }

    /// Zeroes every stored color. The length is kept.
    pub fn reset_all(&self) {
        self.lock().colors.fill(LinearColor::TRANSPARENT);
    }

    pub fn len(&self) -> usize {
        self.lock().colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The frame whose readback is held, if any pass has completed.
    pub fn frame(&self) -> Option<u64> {
        self.lock().frame
    }

    /// A copy of every color together with the frame it belongs to.
    pub fn snapshot(&self) -> (Option<u64>, Vec<LinearColor>) {
        let state = self.lock();
        (state.frame, state.colors.clone())
    }
}
