#[cfg(test)]
mod tests;

use std::num::NonZeroUsize;

use smallvec::SmallVec;

use crate::{
    cost::{CostEvaluator, PartCosts, combine},
    geometry::{MvRange, NUM_PART_IDS, PartId},
    mv::{MAX_COST, MotionVector, SearchNode},
    pyramid::SubpelPlanes,
    util::Pixel,
};

/// Neighbors visited around the current best vector, in units of the step.
const DIAMOND: [(i16, i16); 8] = [
    (0, -1),
    (-1, 0),
    (1, 0),
    (0, 1),
    (-1, -1),
    (1, -1),
    (-1, 1),
    (1, 1),
];

/// Progress of the refinement of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineState {
    FullpelDone,
    HalfpelRefine,
    QuarterpelRefine,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefineEntry {
    pub total_cost: u32,
    pub mv_cost: u32,
    pub mv: MotionVector,
    pub ref_idx: i8,
}

impl RefineEntry {
    pub const EMPTY: Self = Self {
        total_cost: MAX_COST,
        mv_cost: 0,
        mv: MotionVector::ZERO,
        ref_idx: -1,
    };
}

/// Best and second best refined vectors per partition for one direction.
#[derive(Debug, Clone)]
pub struct MvRefineContext {
    best: [RefineEntry; NUM_PART_IDS],
    second: [RefineEntry; NUM_PART_IDS],
    fullpel_distortion: [u32; NUM_PART_IDS],
}

impl Default for MvRefineContext {
    fn default() -> Self {
        Self::new()
    }
}

impl MvRefineContext {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            best: [RefineEntry::EMPTY; NUM_PART_IDS],
            second: [RefineEntry::EMPTY; NUM_PART_IDS],
            fullpel_distortion: [MAX_COST; NUM_PART_IDS],
        }
    }

    pub const fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn offer(&mut self, part: PartId, entry: RefineEntry) {
        let i = part.index();
        let same_as_best = entry.mv == self.best[i].mv && entry.ref_idx == self.best[i].ref_idx;
        if entry.total_cost < self.best[i].total_cost {
            if !same_as_best {
                self.second[i] = self.best[i];
            }
            self.best[i] = entry;
        } else if !same_as_best && entry.total_cost < self.second[i].total_cost {
            self.second[i] = entry;
        }
    }

    #[must_use]
    pub const fn best(&self, part: PartId) -> &RefineEntry {
        &self.best[part as usize]
    }

    #[must_use]
    pub const fn second(&self, part: PartId) -> &RefineEntry {
        &self.second[part as usize]
    }

    /// The second best refined vector of `part` as a result node, if any
    /// vector other than the best was evaluated.
    #[must_use]
    pub fn second_node(&self, part: PartId) -> Option<SearchNode> {
        let entry = &self.second[part.index()];
        if entry.ref_idx < 0 || entry.total_cost == MAX_COST {
            return None;
        }
        let distortion = entry.total_cost.saturating_sub(entry.mv_cost);
        let mut node =
            SearchNode::new(entry.mv, entry.ref_idx, part).with_cost(distortion, entry.mv_cost);
        node.is_subpel_done = true;
        node.sdi = self.fullpel_distortion(part).saturating_sub(distortion);
        Some(node)
    }

    /// Distortion of the full-pel start point under the sub-pel metric.
    #[must_use]
    pub const fn fullpel_distortion(&self, part: PartId) -> u32 {
        self.fullpel_distortion[part as usize]
    }
}

/// Predictions already scored for the current block and reference.
#[derive(Debug, Clone, Default)]
pub struct SubpelScratch<T> {
    pred: Vec<T>,
    cache: SmallVec<[(MotionVector, PartCosts); 32]>,
}

impl<T: Pixel> SubpelScratch<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pred: Vec::new(),
            cache: SmallVec::new(),
        }
    }

    /// Forgets cached scores; needed whenever block or reference change.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Distortion of every partition for the prediction at `mv`.
    pub fn distortions(
        &mut self,
        eval: &CostEvaluator<'_, T>,
        planes: &SubpelPlanes<'_, T>,
        mv: MotionVector,
    ) -> PartCosts {
        if let Some((_, costs)) = self.cache.iter().find(|(m, _)| *m == mv) {
            return *costs;
        }
        let size = eval.block_size;
        let side = NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN);
        if self.pred.len() < size * size {
            self.pred.resize(size * size, T::zero());
        }
        eval.kernels.interpolate_subpel(
            planes,
            eval.block_x,
            eval.block_y,
            mv,
            side,
            side,
            &mut self.pred,
            side,
        );
        let costs = combine(&eval.sub_block_grid(&self.pred, side));
        self.cache.push((mv, costs));
        costs
    }
}

/// Costs reached by each stage of one refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefineOutcome {
    pub node: SearchNode,
    pub fullpel_cost: u32,
    pub halfpel_cost: u32,
    pub quarterpel_cost: u32,
}

/// Half- then quarter-pel diamond search around full-pel winners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubpelRefiner {
    hpel_steps: u8,
    qpel_steps: u8,
}

struct Position {
    mv: MotionVector,
    distortion: u32,
    mv_cost: u32,
}

impl Position {
    const fn cost(&self) -> u32 {
        self.distortion.saturating_add(self.mv_cost)
    }
}

impl SubpelRefiner {
    #[must_use]
    pub const fn new(hpel_steps: u8, qpel_steps: u8) -> Self {
        Self {
            hpel_steps,
            qpel_steps,
        }
    }

    /// Refines the full-pel node `start` of `part`.
    ///
    /// Every evaluated vector is offered to `ctx`. The returned node carries
    /// the distortion removed relative to the full-pel start point.
    pub fn refine<T: Pixel>(
        &self,
        eval: &CostEvaluator<'_, T>,
        planes: &SubpelPlanes<'_, T>,
        range: &MvRange,
        part: PartId,
        start: &SearchNode,
        ctx: &mut MvRefineContext,
        scratch: &mut SubpelScratch<T>,
    ) -> RefineOutcome {
        let ref_idx = start.ref_idx;
        let mut evaluate = |mv: MotionVector, ctx: &mut MvRefineContext| {
            let distortion = scratch.distortions(eval, planes, mv)[part.index()];
            let mv_cost = eval.mv_cost.cost(mv, eval.predictor, eval.list, ref_idx);
            let pos = Position {
                mv,
                distortion,
                mv_cost,
            };
            ctx.offer(
                part,
                RefineEntry {
                    total_cost: pos.cost(),
                    mv_cost,
                    mv,
                    ref_idx,
                },
            );
            pos
        };

        let mut state = RefineState::FullpelDone;
        let mut best = evaluate(start.mv, ctx);
        ctx.fullpel_distortion[part.index()] = best.distortion;
        let fullpel_distortion = best.distortion;
        let fullpel_cost = best.cost();
        let mut halfpel_cost = fullpel_cost;

        loop {
            state = match state {
                RefineState::FullpelDone => RefineState::HalfpelRefine,
                RefineState::HalfpelRefine => {
                    diamond(&mut best, 2, self.hpel_steps, range, |mv| evaluate(mv, ctx));
                    halfpel_cost = best.cost();
                    RefineState::QuarterpelRefine
                }
                RefineState::QuarterpelRefine => {
                    diamond(&mut best, 1, self.qpel_steps, range, |mv| evaluate(mv, ctx));
                    RefineState::Done
                }
                RefineState::Done => break,
            };
        }

        let mut node = SearchNode::new(best.mv, ref_idx, part).with_cost(best.distortion, best.mv_cost);
        node.is_subpel_done = true;
        node.sdi = fullpel_distortion.saturating_sub(best.distortion);
        RefineOutcome {
            node,
            fullpel_cost,
            halfpel_cost,
            quarterpel_cost: best.cost(),
        }
    }
}

/// Moves `best` to the cheapest diamond neighbor `step` quarter pixels away
/// for up to `iterations` rounds, stopping as soon as no neighbor is strictly
/// cheaper.
fn diamond(
    best: &mut Position,
    step: i16,
    iterations: u8,
    range: &MvRange,
    mut evaluate: impl FnMut(MotionVector) -> Position,
) {
    for _ in 0..iterations {
        let mut winner: Option<Position> = None;
        for (dx, dy) in DIAMOND {
            let mv = best.mv.offset(dx * step, dy * step);
            if !range.contains(mv) {
                continue;
            }
            let pos = evaluate(mv);
            let to_beat = winner.as_ref().map_or(best.cost(), Position::cost);
            if pos.cost() < to_beat {
                winner = Some(pos);
            }
        }
        match winner {
            Some(pos) => *best = pos,
            None => break,
        }
    }
}
