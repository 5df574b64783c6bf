#[cfg(test)]
mod tests;

use std::{collections::HashMap, mem};

use log::debug;

use crate::{
    error::InvariantViolation,
    geometry::PartId,
    mv::{MotionVector, SearchNode},
    reference::RefList,
};

/// References a list may hold.
pub const MAX_REFS_PER_LIST: usize = 4;
/// Bank slots per block, one per (list, reference) pair.
pub const NUM_REF_SLOTS: usize = 2 * MAX_REFS_PER_LIST;

/// Bank slot of reference `ref_idx` of `list`.
pub const fn ref_slot(list: RefList, ref_idx: usize) -> Result<usize, InvariantViolation> {
    if ref_idx >= MAX_REFS_PER_LIST {
        return Err(InvariantViolation::ReferenceOutOfRange {
            ref_idx,
            max: MAX_REFS_PER_LIST,
        });
    }
    Ok(list.index() * MAX_REFS_PER_LIST + ref_idx)
}

/// What a layer remembers about one block and reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankEntry {
    /// The two best whole-block results
    pub best: [SearchNode; 2],
    /// Winners of the four quadrants, in raster order
    pub quads: [SearchNode; 4],
}

impl Default for BankEntry {
    fn default() -> Self {
        Self {
            best: [SearchNode::unavailable(-1, PartId::Part2Nx2N); 2],
            quads: PartId::QUADRANTS.map(|p| SearchNode::unavailable(-1, p)),
        }
    }
}

/// Per-block, per-reference results of one layer for one frame.
#[derive(Debug, Clone)]
pub struct MvBank {
    cols: usize,
    rows: usize,
    entries: Vec<BankEntry>,
    done: Vec<bool>,
}

impl MvBank {
    #[must_use]
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            entries: vec![BankEntry::default(); cols * rows * NUM_REF_SLOTS],
            done: vec![false; cols * rows],
        }
    }

    pub fn reset(&mut self) {
        self.entries.fill(BankEntry::default());
        self.done.fill(false);
    }

    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub const fn contains(&self, bx: isize, by: isize) -> bool {
        bx >= 0 && by >= 0 && (bx as usize) < self.cols && (by as usize) < self.rows
    }

    const fn index(&self, bx: usize, by: usize, slot: usize) -> usize {
        (by * self.cols + bx) * NUM_REF_SLOTS + slot
    }

    #[must_use]
    pub fn entry(&self, bx: usize, by: usize, slot: usize) -> &BankEntry {
        &self.entries[self.index(bx, by, slot)]
    }

    pub fn store(&mut self, bx: usize, by: usize, slot: usize, entry: BankEntry) {
        let idx = self.index(bx, by, slot);
        self.entries[idx] = entry;
    }

    /// Marks a block as searched, making it usable as a spatial neighbor.
    pub fn mark_done(&mut self, bx: usize, by: usize) {
        self.done[by * self.cols + bx] = true;
    }

    #[must_use]
    pub fn is_done(&self, bx: isize, by: isize) -> bool {
        self.contains(bx, by) && self.done[by as usize * self.cols + bx as usize]
    }

    /// The entry of a neighbor, if it is inside the grid and already searched.
    #[must_use]
    pub fn neighbor(&self, bx: isize, by: isize, slot: usize) -> Option<&BankEntry> {
        self.is_done(bx, by)
            .then(|| self.entry(bx as usize, by as usize, slot))
    }
}

/// A layer's bank as committed at the end of a frame.
#[derive(Debug, Clone)]
pub struct MvBankSnapshot {
    /// Picture the bank was produced for
    pub poc: i32,
    /// Picture each slot referenced, if any
    pub ref_pocs: [Option<i32>; NUM_REF_SLOTS],
    pub bank: MvBank,
}

/// Dominant motion of a layer towards one reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlobalMv {
    /// Most frequent winning vector
    pub thick: Option<MotionVector>,
    /// Second most frequent winning vector
    pub thin: Option<MotionVector>,
}

/// Persistent state of one pyramid level.
#[derive(Debug, Clone)]
pub struct LayerContext {
    pub level: usize,
    pub width: usize,
    pub height: usize,
    pub block_size: usize,
    current: MvBank,
    previous: Option<MvBankSnapshot>,
    global: [GlobalMv; NUM_REF_SLOTS],
}

impl LayerContext {
    #[must_use]
    pub fn new(level: usize, width: usize, height: usize, block_size: usize) -> Self {
        let cols = width.div_ceil(block_size);
        let rows = height.div_ceil(block_size);
        Self {
            level,
            width,
            height,
            block_size,
            current: MvBank::new(cols, rows),
            previous: None,
            global: [GlobalMv::default(); NUM_REF_SLOTS],
        }
    }

    #[must_use]
    pub const fn cols(&self) -> usize {
        self.current.cols
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        self.current.rows
    }

    #[must_use]
    pub const fn current(&self) -> &MvBank {
        &self.current
    }

    pub const fn current_mut(&mut self) -> &mut MvBank {
        &mut self.current
    }

    /// The bank committed by the previous frame.
    #[must_use]
    pub const fn previous(&self) -> Option<&MvBankSnapshot> {
        self.previous.as_ref()
    }

    /// Clears the current bank. Global vectors survive until the next
    /// derivation so the coarsest search can start from last frame's motion.
    pub fn begin_frame(&mut self) {
        self.current.reset();
    }

    #[must_use]
    pub const fn global_mv(&self, slot: usize) -> GlobalMv {
        self.global[slot]
    }

    /// Derives the global vectors of every slot from the winners in the
    /// current bank.
    pub fn derive_global_mvs(&mut self) {
        for slot in 0..NUM_REF_SLOTS {
            let mut histogram: HashMap<MotionVector, (u32, usize)> = HashMap::new();
            let blocks = self.current.cols * self.current.rows;
            for block in 0..blocks {
                let node = self.current.entries[block * NUM_REF_SLOTS + slot].best[0];
                if node.is_valid {
                    let next = histogram.len();
                    histogram.entry(node.mv).or_insert((0, next)).0 += 1;
                }
            }
            let mut ranked: Vec<_> = histogram.into_iter().collect();
            // most frequent first, earliest seen on ties
            ranked.sort_unstable_by_key(|&(_, (count, first))| (std::cmp::Reverse(count), first));
            self.global[slot] = GlobalMv {
                thick: ranked.first().map(|&(mv, _)| mv),
                thin: ranked.get(1).map(|&(mv, _)| mv),
            };
            if let Some(thick) = self.global[slot].thick {
                debug!(
                    "layer {} slot {}: global mv thick {:?} thin {:?}",
                    self.level, slot, thick, self.global[slot].thin
                );
            }
        }
    }

    /// Turns the current bank into the snapshot seen by the next frame.
    pub fn commit(&mut self, poc: i32, ref_pocs: [Option<i32>; NUM_REF_SLOTS]) {
        match &mut self.previous {
            Some(snapshot) => {
                mem::swap(&mut snapshot.bank, &mut self.current);
                snapshot.poc = poc;
                snapshot.ref_pocs = ref_pocs;
            }
            None => {
                let cols = self.current.cols;
                let rows = self.current.rows;
                self.previous = Some(MvBankSnapshot {
                    poc,
                    ref_pocs,
                    bank: mem::replace(&mut self.current, MvBank::new(cols, rows)),
                });
            }
        }
        self.current.reset();
    }
}
