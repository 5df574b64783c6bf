
use std::collections::HashSet;

use smallvec::SmallVec;

use crate::{
    geometry::{MvRange, PartId, mv_predictor, project_temporal_mv, project_to_level},
    layer::{LayerContext, MvBank, NUM_REF_SLOTS},
    mv::{MotionVector, SearchNode},
};

/// Half-width of the presence bitmap window, in the vector's own units.
pub const DEDUP_WINDOW: i32 = 16;
const DEDUP_SPAN: usize = 2 * DEDUP_WINDOW as usize + 1;
/// References tracked by the presence bitmap; others use the overflow set.
pub const DEDUP_BITMAP_REFS: usize = 4;
/// Capacity reserved inline for a candidate list.
pub const MAX_CANDIDATES: usize = 32;

pub type CandidateList = SmallVec<[SearchNode; MAX_CANDIDATES]>;

/// Remembers which `(vector, reference)` pairs were already seen.
///
/// Pairs close to the center are tracked in a bitmap, everything else in a
/// hash set, which exhaustive scans over a wide range fill quickly. Which path a pair takes only depends on the pair and the
/// center, so repeated inserts always hit the same storage.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    center: MotionVector,
    bitmap: [[u64; DEDUP_SPAN]; DEDUP_BITMAP_REFS],
    overflow: HashSet<(MotionVector, i8)>,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new()
    }
}

impl Deduplicator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            center: MotionVector::ZERO,
            bitmap: [[0; DEDUP_SPAN]; DEDUP_BITMAP_REFS],
            overflow: HashSet::new(),
        }
    }

    /// Forgets every pair and moves the bitmap window to `center`.
    pub fn reset(&mut self, center: MotionVector) {
        self.center = center;
        self.bitmap = [[0; DEDUP_SPAN]; DEDUP_BITMAP_REFS];
        self.overflow.clear();
    }

    fn bit(&self, mv: MotionVector, ref_idx: i8) -> Option<(usize, usize, u64)> {
        let r = usize::try_from(ref_idx).ok().filter(|&r| r < DEDUP_BITMAP_REFS)?;
        let dx = i32::from(mv.x) - i32::from(self.center.x);
        let dy = i32::from(mv.y) - i32::from(self.center.y);
        if dx.abs() > DEDUP_WINDOW || dy.abs() > DEDUP_WINDOW {
            return None;
        }
        let row = (dy + DEDUP_WINDOW) as usize;
        let col = (dx + DEDUP_WINDOW) as u32;
        Some((r, row, 1 << col))
    }

    #[must_use]
    pub fn contains(&self, mv: MotionVector, ref_idx: i8) -> bool {
        match self.bit(mv, ref_idx) {
            Some((r, row, mask)) => self.bitmap[r][row] & mask != 0,
            None => self.overflow.contains(&(mv, ref_idx)),
        }
    }

    /// Records a pair. Returns `false` if it had been seen before.
    pub fn insert(&mut self, mv: MotionVector, ref_idx: i8) -> bool {
        match self.bit(mv, ref_idx) {
            Some((r, row, mask)) => {
                let seen = self.bitmap[r][row] & mask != 0;
                self.bitmap[r][row] |= mask;
                !seen
            }
            None => self.overflow.insert((mv, ref_idx)),
        }
    }
}

/// A reference of the list candidates are generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListRef {
    /// Index inside the list
    pub ref_idx: i8,
    /// Bank slot of the reference
    pub slot: usize,
    pub poc: i32,
}

/// Everything the generator reads for one block and one reference list.
#[derive(Debug, Clone, Copy)]
pub struct CandidateContext<'a> {
    /// Layer being searched; spatial neighbors come from its current bank and
    /// colocated vectors from its previous snapshot
    pub layer: &'a LayerContext,
    /// The next coarser layer, already searched for this frame
    pub coarse: Option<&'a LayerContext>,
    /// Layer holding the global vectors
    pub global: Option<&'a LayerContext>,
    pub bx: usize,
    pub by: usize,
    pub refs: &'a [ListRef],
    pub cur_poc: i32,
    pub range: MvRange,
}

/// Left, top, top-right and top-left neighbors of a block towards `slot`.
///
/// Neighbors that are outside the grid or not searched yet are returned as
/// unavailable zero-vector nodes, keeping every position present.
#[must_use]
pub fn spatial_neighbors(bank: &MvBank, bx: usize, by: usize, slot: usize) -> [SearchNode; 4] {
    let (bx, by) = (bx as isize, by as isize);
    [(-1, 0), (0, -1), (1, -1), (-1, -1)].map(|(dx, dy)| {
        bank.neighbor(bx + dx, by + dy, slot)
            .map(|e| e.best[0])
            .filter(|n| n.is_valid)
            .unwrap_or_else(|| SearchNode::unavailable(-1, PartId::Part2Nx2N))
    })
}

/// Predictor used for the vector cost of a block towards `slot`.
#[must_use]
pub fn block_predictor(bank: &MvBank, bx: usize, by: usize, slot: usize) -> MotionVector {
    let [l, t, tr, tl] =
        spatial_neighbors(bank, bx, by, slot).map(|n| n.is_valid.then_some(n.mv));
    mv_predictor(l, t, tr, tl)
}

/// Produces the deduplicated starting points of a block search.
#[derive(Debug, Clone)]
pub struct CandidateGenerator {
    max_candts: usize,
    dedup: Deduplicator,
}

impl CandidateGenerator {
    #[must_use]
    pub fn new(max_candts: usize) -> Self {
        Self {
            max_candts,
            dedup: Deduplicator::new(),
        }
    }

    /// Fills `out` with at most `max_candts` full-pel candidates, in order:
    /// zero vectors, coarse-layer winners, spatial neighbors, colocated
    /// vectors of the previous frame, global vectors. Each source is visited
    /// for every reference before moving on to the next source.
    pub fn generate(&mut self, ctx: &CandidateContext<'_>, out: &mut CandidateList) {
        out.clear();
        let center = ctx.refs.first().map_or(MotionVector::ZERO, |r| {
            block_predictor(ctx.layer.current(), ctx.bx, ctx.by, r.slot).round_to_fullpel()
        });
        self.dedup.reset(center);

        for r in ctx.refs {
            self.push(ctx, out, r, MotionVector::ZERO);
        }

        if let Some(coarse) = ctx.coarse {
            for r in ctx.refs {
                for mv in coarse_seeds(coarse, ctx.layer, ctx.bx, ctx.by, r.slot) {
                    self.push(ctx, out, r, mv);
                }
            }
        }

        for r in ctx.refs {
            for n in spatial_neighbors(ctx.layer.current(), ctx.bx, ctx.by, r.slot) {
                if n.is_valid {
                    self.push(ctx, out, r, n.mv);
                }
            }
        }

        if let Some(snapshot) = ctx.layer.previous() {
            for r in ctx.refs {
                let td_dst = ctx.cur_poc - r.poc;
                let colocated = std::iter::once(r.slot)
                    .chain(0..NUM_REF_SLOTS)
                    .find_map(|slot| {
                        let node = snapshot.bank.entry(ctx.bx, ctx.by, slot).best[0];
                        let ref_poc = snapshot.ref_pocs[slot]?;
                        node.is_valid.then_some((node.mv, snapshot.poc - ref_poc))
                    });
                if let Some((mv, td_src)) = colocated {
                    self.push(ctx, out, r, project_temporal_mv(mv, td_src, td_dst));
                }
            }
        }

        if let Some(global) = ctx.global {
            for r in ctx.refs {
                let g = global.global_mv(r.slot);
                for mv in [g.thick, g.thin].into_iter().flatten() {
                    self.push(ctx, out, r, project_to_level(mv, global.level, ctx.layer.level));
                }
            }
        }
    }

    fn push(
        &mut self,
        ctx: &CandidateContext<'_>,
        out: &mut CandidateList,
        r: &ListRef,
        mv: MotionVector,
    ) {
        if out.len() >= self.max_candts {
            return;
        }
        let mv = ctx.range.clip_fullpel(mv.round_to_fullpel());
        if self.dedup.insert(mv, r.ref_idx) {
            out.push(SearchNode::new(mv, r.ref_idx, PartId::Part2Nx2N));
        }
    }
}

/// Winners of the coarser layer covering block (`bx`, `by`) of `fine`,
/// expressed in the units of `fine`.
///
/// When the fine block maps onto a whole coarse block all four quadrant
/// winners are used, otherwise only the quadrant it falls into. The right and
/// bottom coarse neighbors are included as well.
pub fn coarse_seeds(
    coarse: &LayerContext,
    fine: &LayerContext,
    bx: usize,
    by: usize,
    slot: usize,
) -> SmallVec<[MotionVector; 8]> {
    let mut seeds = SmallVec::new();
    let cbs = coarse.block_size;
    let (px, py) = (bx * fine.block_size / 2, by * fine.block_size / 2);
    let (cbx, cby) = (px / cbs, py / cbs);
    let bank = coarse.current();
    if !bank.contains(cbx as isize, cby as isize) {
        return seeds;
    }

    let entry = bank.entry(cbx, cby, slot);
    let span = fine.block_size / 2;
    seeds.extend(entry.best.iter().filter(|n| n.is_valid).map(|n| n.mv));
    if span >= cbs {
        seeds.extend(entry.quads.iter().filter(|n| n.is_valid).map(|n| n.mv));
    } else {
        let qx = (px % cbs) / (cbs / 2);
        let qy = (py % cbs) / (cbs / 2);
        let quad = entry.quads[qy * 2 + qx];
        if quad.is_valid {
            seeds.push(quad.mv);
        }
    }
    for (nx, ny) in [(cbx + 1, cby), (cbx, cby + 1)] {
        if bank.contains(nx as isize, ny as isize) {
            let n = bank.entry(nx, ny, slot).best[0];
            if n.is_valid {
                seeds.push(n.mv);
            }
        }
    }
    for mv in &mut seeds {
        *mv = mv.scale_to_finer();
    }
    seeds
}
