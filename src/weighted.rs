
use std::num::NonZeroUsize;

use anyhow::{Result, bail};
use smallvec::SmallVec;

use crate::{
    plane::Plane,
    util::{Pixel, pixel_max},
};

/// Fixed-point precision of the inverse weight.
pub const WT_PRED_SHIFT: u32 = 15;

/// Explicit weighted-prediction parameters of one reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightParams {
    pub weight: i32,
    pub offset: i32,
    pub log2_denom: u8,
}

impl Default for WeightParams {
    fn default() -> Self {
        Self {
            weight: 1 << 6,
            offset: 0,
            log2_denom: 6,
        }
    }
}

impl WeightParams {
    pub fn validate(&self) -> Result<()> {
        if self.log2_denom > 7 {
            bail!(
                "WeightParams: log2_denom must be 0-7, got {}.",
                self.log2_denom
            );
        }
        if self.weight <= 0 || self.weight > 255 {
            bail!("WeightParams: weight must be 1-255, got {}.", self.weight);
        }
        Ok(())
    }

    /// Unit weight and no offset: the reference is used as is.
    #[must_use]
    pub const fn is_default(&self) -> bool {
        self.weight == 1 << self.log2_denom && self.offset == 0
    }

    #[must_use]
    pub const fn inv_weight(&self) -> i64 {
        ((1 << WT_PRED_SHIFT) + self.weight as i64 / 2) / self.weight as i64
    }

    /// Maps a source sample into the reference's weighted domain, so that
    /// comparing it with unweighted reference samples approximates comparing
    /// the source with the weighted prediction.
    #[must_use]
    pub const fn unweight(&self, sample: u32, max: u32) -> u32 {
        let shifted = (sample as i64 - self.offset as i64) << self.log2_denom;
        let v = (shifted * self.inv_weight() + (1 << (WT_PRED_SHIFT - 1))) >> WT_PRED_SHIFT;
        if v < 0 {
            0
        } else if v > max as i64 {
            max
        } else {
            v as u32
        }
    }
}

/// Source blocks as seen by every reference of a frame.
///
/// References with default weights share one view; every weighted reference
/// gets its own inverse-weighted copy.
#[derive(Debug, Clone)]
pub struct WeightedPredContext<T> {
    bit_depth: u8,
    size: usize,
    buffers: Vec<Vec<T>>,
    used: usize,
    views: SmallVec<[usize; 8]>,
}

impl<T: Pixel> WeightedPredContext<T> {
    #[must_use]
    pub fn new(bit_depth: u8) -> Self {
        Self {
            bit_depth,
            size: 0,
            buffers: Vec::new(),
            used: 0,
            views: SmallVec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.used = 0;
        self.size = 0;
        self.views.clear();
    }

    /// Extracts the `size` x `size` block at (`x`, `y`) of `input` and builds
    /// one view per entry of `weights`.
    ///
    /// Blocks crossing the right or bottom picture edge are copied at their
    /// actual extent and completed by replicating the last column and row.
    pub fn prepare(
        &mut self,
        input: &Plane<T>,
        x: usize,
        y: usize,
        size: NonZeroUsize,
        weights: &[WeightParams],
    ) {
        self.reset();
        self.size = size.get();
        let area = self.size * self.size;

        self.ensure_buffer(0, area);
        copy_replicated(&mut self.buffers[0], input, x, y, self.size);
        self.used = 1;

        let max = pixel_max(self.bit_depth);
        for w in weights {
            if w.is_default() {
                self.views.push(0);
                continue;
            }
            let idx = self.used;
            self.ensure_buffer(idx, area);
            let (head, tail) = self.buffers.split_at_mut(idx);
            for (d, &s) in tail[0][..area].iter_mut().zip(&head[0][..area]) {
                *d = T::from_u32_or_max_value(w.unweight(s.into(), max));
            }
            self.views.push(idx);
            self.used += 1;
        }
    }

    fn ensure_buffer(&mut self, idx: usize, area: usize) {
        if self.buffers.len() <= idx {
            self.buffers.resize_with(idx + 1, Vec::new);
        }
        let buf = &mut self.buffers[idx];
        if buf.len() < area {
            buf.resize(area, T::zero());
        }
    }

    /// Row stride of every view.
    #[must_use]
    pub fn pitch(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.size).unwrap_or(NonZeroUsize::MIN)
    }

    /// The unweighted source block.
    #[must_use]
    pub fn input(&self) -> &[T] {
        &self.buffers[0][..self.size * self.size]
    }

    /// The source block as seen by reference `ref_slot` of the last `prepare`.
    #[must_use]
    pub fn view(&self, ref_slot: usize) -> &[T] {
        let idx = self.views.get(ref_slot).copied().unwrap_or(0);
        &self.buffers[idx][..self.size * self.size]
    }
}

fn copy_replicated<T: Pixel>(dest: &mut [T], input: &Plane<T>, x: usize, y: usize, size: usize) {
    let cols = size.min(input.width.get().saturating_sub(x)).max(1);
    let rows = size.min(input.height.get().saturating_sub(y)).max(1);
    for row in 0..rows {
        let src = &input.slice_at(x as isize, (y + row) as isize)[..cols];
        let dest_row = &mut dest[row * size..][..size];
        dest_row[..cols].copy_from_slice(src);
        let last = dest_row[cols - 1];
        dest_row[cols..].fill(last);
    }
    let last_row = (rows - 1) * size;
    for row in rows..size {
        dest.copy_within(last_row..last_row + size, row * size);
    }
}
