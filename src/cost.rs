#[cfg(test)]
mod tests;

use std::num::NonZeroUsize;

use smallvec::SmallVec;

use crate::{
    error::InvariantViolation,
    geometry::{MvRange, NUM_PART_IDS, PartId, PartSet, sub_block_index},
    kernels::CostKernels,
    mv::{MotionVector, SearchNode},
    params::CostMetric,
    plane::Plane,
    reference::RefList,
    result_bank::ResultBank,
    util::Pixel,
};

/// Distortions of the 4x4 arrangement of sub-blocks of a search block,
/// stored quadrant by quadrant (see [`sub_block_index`]).
pub type SubBlockGrid = [u32; 16];
/// One value per [`PartId`].
pub type PartCosts = [u32; NUM_PART_IDS];

fn saturate(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

/// Costs of all 17 partitions out of the sub-block distortions.
#[must_use]
pub fn combine(grid: &SubBlockGrid) -> PartCosts {
    let cell = |col: usize, row: usize| u64::from(grid[sub_block_index(col, row)]);
    let quad = |q: usize| grid[q * 4..q * 4 + 4].iter().map(|&d| u64::from(d)).sum::<u64>();
    let row = |r: usize| (0..4).map(|c| cell(c, r)).sum::<u64>();
    let col = |c: usize| (0..4).map(|r| cell(c, r)).sum::<u64>();

    let [tl, tr, bl, br] = [0, 1, 2, 3].map(quad);
    let total = tl + tr + bl + br;
    let (row0, row3, col0, col3) = (row(0), row(3), col(0), col(3));

    [
        total,
        tl + tr,
        bl + br,
        tl + bl,
        tr + br,
        row0,
        total - row0,
        total - row3,
        row3,
        col0,
        total - col0,
        total - col3,
        col3,
        tl,
        tr,
        bl,
        br,
    ]
    .map(saturate)
}

/// Checks `costs` against a direct summation of every partition's sub-blocks.
pub fn verify_partition_costs(
    grid: &SubBlockGrid,
    costs: &PartCosts,
) -> Result<(), InvariantViolation> {
    for part in PartId::ALL {
        let g = part.geometry();
        let mut expected = 0u64;
        for row in g.y..g.y + g.h {
            for col in g.x..g.x + g.w {
                expected += u64::from(grid[sub_block_index(col.into(), row.into())]);
            }
        }
        let expected = saturate(expected);
        let actual = costs[part.index()];
        if expected != actual {
            return Err(InvariantViolation::PartitionSum {
                part,
                expected,
                actual,
            });
        }
    }
    Ok(())
}

/// Length of the signed Exp-Golomb code of a vector component difference.
#[must_use]
pub const fn mv_component_bits(d: i32) -> u32 {
    let a = d.unsigned_abs() + 1;
    2 * (31 - a.leading_zeros()) + 1 + (d != 0) as u32
}

/// Truncated unary length of reference index `ref_idx` in a list of `num_refs`.
#[must_use]
pub const fn ref_idx_bits(ref_idx: usize, num_refs: usize) -> u32 {
    if num_refs <= 1 {
        return 0;
    }
    let bits = if ref_idx + 1 < num_refs - 1 {
        ref_idx + 1
    } else {
        num_refs - 1
    };
    bits as u32
}

/// Rate estimate of coding a motion vector, scaled by lambda.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MvCostModel {
    lambda: u32,
    q_shift: u8,
    num_refs: [usize; 2],
}

impl MvCostModel {
    #[must_use]
    pub const fn new(lambda: u32, q_shift: u8) -> Self {
        Self {
            lambda,
            q_shift,
            num_refs: [1, 1],
        }
    }

    pub const fn set_num_refs(&mut self, list: RefList, num_refs: usize) {
        self.num_refs[list.index()] = num_refs;
    }

    /// Cost of `mv` coded against `pred`, saturated to `i16::MAX`.
    #[must_use]
    pub fn cost(&self, mv: MotionVector, pred: MotionVector, list: RefList, ref_idx: i8) -> u32 {
        let dx = i32::from(mv.x) - i32::from(pred.x);
        let dy = i32::from(mv.y) - i32::from(pred.y);
        let ref_bits = ref_idx_bits(ref_idx.max(0) as usize, self.num_refs[list.index()]);
        let bits = mv_component_bits(dx) + mv_component_bits(dy) + ref_bits;
        let round = 1u64 << (self.q_shift - 1);
        let cost = (u64::from(bits) * u64::from(self.lambda) + round) >> self.q_shift;
        cost.min(i16::MAX as u64) as u32
    }
}

/// One vector of a batch, with the partitions it is evaluated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridPoint {
    pub mv: MotionVector,
    pub ref_idx: i8,
    pub parts: PartSet,
}

/// Up to nine vectors evaluated as one batch, usually a 3x3 neighborhood.
#[derive(Debug, Clone, Default)]
pub struct GridContext {
    points: SmallVec<[GridPoint; 9]>,
}

impl GridContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn push(&mut self, point: GridPoint) {
        debug_assert!(self.points.len() < 9);
        self.points.push(point);
    }

    /// Resets the batch to `center` and its eight neighbors `step` quarter
    /// pixels away, leaving out vectors outside `range`.
    pub fn fill_around(
        &mut self,
        center: MotionVector,
        ref_idx: i8,
        step: i16,
        parts: PartSet,
        range: &MvRange,
    ) {
        self.clear();
        for dy in [0, -1, 1] {
            for dx in [0, -1, 1] {
                let mv = center.offset(dx * step, dy * step);
                if range.contains(mv) {
                    self.push(GridPoint {
                        mv,
                        ref_idx,
                        parts,
                    });
                }
            }
        }
    }

    /// Drops points `keep` rejects.
    pub fn retain(&mut self, mut keep: impl FnMut(&GridPoint) -> bool) {
        self.points.retain(|p| keep(p));
    }

    #[must_use]
    pub fn points(&self) -> &[GridPoint] {
        &self.points
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Scores vectors of one search block towards one reference.
pub struct CostEvaluator<'a, T: Pixel> {
    pub kernels: &'a dyn CostKernels<T>,
    /// Source block as seen by the reference
    pub src: &'a [T],
    pub src_pitch: NonZeroUsize,
    /// Block position on the layer, in pixels
    pub block_x: isize,
    pub block_y: isize,
    pub block_size: usize,
    pub metric: CostMetric,
    pub mv_cost: &'a MvCostModel,
    pub predictor: MotionVector,
    pub list: RefList,
}

impl<T: Pixel> CostEvaluator<'_, T> {
    /// Distortion of every sub-block against a block of `ref_`.
    #[must_use]
    pub fn sub_block_grid(&self, ref_: &[T], ref_pitch: NonZeroUsize) -> SubBlockGrid {
        let sub = (self.block_size / 4).max(1);
        let side = NonZeroUsize::new(sub).unwrap_or(NonZeroUsize::MIN);
        let mut grid = [0; 16];
        for row in 0..4 {
            for col in 0..4 {
                let src = &self.src[row * sub * self.src_pitch.get() + col * sub..];
                let ref_ = &ref_[row * sub * ref_pitch.get() + col * sub..];
                grid[sub_block_index(col, row)] = self.kernels.distortion(
                    self.metric,
                    side,
                    side,
                    src,
                    self.src_pitch,
                    ref_,
                    ref_pitch,
                );
            }
        }
        grid
    }

    /// Sub-block distortions of the block displaced by the full-pel `mv`.
    #[must_use]
    pub fn fullpel_grid(&self, plane: &Plane<T>, mv: MotionVector) -> SubBlockGrid {
        debug_assert!(mv.is_fullpel());
        let (ix, iy) = mv.fullpel();
        let ref_ = plane.slice_at(self.block_x + ix, self.block_y + iy);
        self.sub_block_grid(ref_, plane.pitch)
    }

    /// A costed node for `part` at `mv`.
    #[must_use]
    pub fn node(&self, part: PartId, mv: MotionVector, ref_idx: i8, distortion: u32) -> SearchNode {
        let mv_cost = self.mv_cost.cost(mv, self.predictor, self.list, ref_idx);
        SearchNode::new(mv, ref_idx, part).with_cost(distortion, mv_cost)
    }

    /// Evaluates every point of `grid` once and offers each of its
    /// partitions to `bank`. Returns how many results were accepted.
    pub fn evaluate_grid(
        &self,
        grid: &GridContext,
        plane: &Plane<T>,
        bank: &mut ResultBank,
    ) -> Result<usize, InvariantViolation> {
        let mut accepted = 0;
        for point in grid.points() {
            let sub = self.fullpel_grid(plane, point.mv);
            let costs = combine(&sub);
            if cfg!(debug_assertions) {
                verify_partition_costs(&sub, &costs)?;
            }
            for part in point.parts.iter() {
                let node = self.node(part, point.mv, point.ref_idx, costs[part.index()]);
                if bank.update(self.list, part, node) {
                    accepted += 1;
                }
            }
        }
        Ok(accepted)
    }
}
