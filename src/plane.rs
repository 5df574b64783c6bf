
use std::num::NonZeroUsize;

use crate::{
    pad::pad_plane,
    util::{Pixel, bitblt},
};

/// A single-component image surrounded by `pad` pixels of replicated border.
#[derive(Debug, Clone)]
pub struct Plane<T> {
    data: Vec<T>,
    pub width: NonZeroUsize,
    pub height: NonZeroUsize,
    pub pitch: NonZeroUsize,
    pub pad: usize,
}

impl<T: Pixel> Plane<T> {
    /// A zero-filled plane.
    #[must_use]
    pub fn new(width: NonZeroUsize, height: NonZeroUsize, pad: usize) -> Self {
        let pitch = width.saturating_add(2 * pad);
        let rows = height.get() + 2 * pad;
        Self {
            data: vec![T::zero(); pitch.get() * rows],
            width,
            height,
            pitch,
            pad,
        }
    }

    /// Copies `width` x `height` samples out of `src` and pads the result.
    #[must_use]
    pub fn from_slice(
        src: &[T],
        src_pitch: NonZeroUsize,
        width: NonZeroUsize,
        height: NonZeroUsize,
        pad: usize,
    ) -> Self {
        let mut plane = Self::new(width, height, pad);
        let origin = plane.origin();
        bitblt(
            &mut plane.data[origin..],
            plane.pitch,
            src,
            src_pitch,
            width,
            height,
        );
        plane.pad_edges();
        plane
    }

    /// Refreshes the border from the current edge samples.
    pub fn pad_edges(&mut self) {
        pad_plane(&mut self.data, self.pitch, self.pad, self.width, self.height);
    }

    #[must_use]
    pub fn padded_height(&self) -> usize {
        self.height.get() + 2 * self.pad
    }

    #[must_use]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[must_use]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Index of the top-left visible sample.
    #[must_use]
    pub const fn origin(&self) -> usize {
        self.pad * self.pitch.get() + self.pad
    }

    /// Index of sample (`x`, `y`), where negative coordinates address the border.
    #[must_use]
    pub fn offset(&self, x: isize, y: isize) -> usize {
        let pad = self.pad as isize;
        debug_assert!(x >= -pad && x < self.width.get() as isize + pad);
        debug_assert!(y >= -pad && y < self.height.get() as isize + pad);
        ((y + pad) as usize) * self.pitch.get() + (x + pad) as usize
    }

    /// Samples from (`x`, `y`) to the end of the plane, for use with `pitch`.
    #[must_use]
    pub fn slice_at(&self, x: isize, y: isize) -> &[T] {
        &self.data[self.offset(x, y)..]
    }

    #[must_use]
    pub fn pixel(&self, x: isize, y: isize) -> T {
        self.data[self.offset(x, y)]
    }
}
