
use std::num::NonZeroUsize;

use log::trace;
use smallvec::SmallVec;

use crate::{
    cluster::ClusterData,
    cost::MvCostModel,
    cu_tree::{CuArena, MergeState},
    geometry::{MvRange, PartId, PartType},
    kernels::CostKernels,
    mv::{MAX_COST, MotionVector, SearchNode},
    params::{CostMetric, PartitionMask},
    pyramid::SubpelPlanes,
    reference::RefList,
    result_bank::{BestOverall, ResultBank},
    util::Pixel,
};

/// One reference as the merge sees it.
#[derive(Debug, Clone, Copy)]
pub struct MergeRef<'a, T> {
    pub list: RefList,
    pub ref_idx: i8,
    pub planes: SubpelPlanes<'a, T>,
    /// The CTB as seen by this reference
    pub src: &'a [T],
    /// Predictor of the vector cost
    pub predictor: MotionVector,
}

/// Everything needed to cost a merged parent inside one CTB.
pub struct ParentEvaluator<'a, T: Pixel> {
    pub kernels: &'a dyn CostKernels<T>,
    pub metric: CostMetric,
    pub mv_cost: &'a MvCostModel,
    pub refs: &'a [MergeRef<'a, T>],
    pub src_pitch: NonZeroUsize,
    pub ctb_x: usize,
    pub ctb_y: usize,
    /// Displacements valid for the whole CTB
    pub range: MvRange,
}

/// A vector a merged parent is tried with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seed {
    pub list: RefList,
    pub ref_idx: i8,
    pub mv: MotionVector,
}

/// Bottom-up merge of the CUs of a CTB.
#[derive(Debug, Clone)]
pub struct PartitionMerger<T> {
    part_mask: PartitionMask,
    cluster_area: i16,
    max_clusters_per_ref: usize,
    clusters: ClusterData,
    seeds: SmallVec<[Seed; 16]>,
    pred: Vec<T>,
}

impl<T: Pixel> PartitionMerger<T> {
    #[must_use]
    pub fn new(part_mask: PartitionMask, cluster_area: i16, max_clusters_per_ref: usize) -> Self {
        Self {
            part_mask,
            cluster_area,
            max_clusters_per_ref,
            clusters: ClusterData::new(),
            seeds: SmallVec::new(),
            pred: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.clusters.reset();
        self.seeds.clear();
    }

    /// Settles the 16x16 node `index` out of the results of its search block.
    ///
    /// The 8x8 children take the NxN quadrant winners. The parent costs the
    /// cheapest enabled shape other than NxN and is merged when that does not
    /// exceed the four quadrants together.
    pub fn merge_search_block(&self, arena: &mut CuArena, index: usize, bank: &ResultBank) {
        let Some(children) = arena.node(index).children else {
            return;
        };
        let nxn = PartType::SizeNxN.is_enabled(self.part_mask);
        let mut children_sum = 0u32;
        for (quad, &child) in PartId::QUADRANTS.iter().zip(&children) {
            let winner = bank.best_overall(*quad).filter(|_| nxn).copied();
            let node = arena.node_mut(child);
            node.state = MergeState::LeafEvaluated;
            match winner {
                Some(w) if node.is_valid => {
                    node.finalize(PartType::Size2Nx2N, &[w], w.cost);
                    children_sum = children_sum.saturating_add(w.cost);
                }
                _ => children_sum = MAX_COST,
            }
        }

        let node = arena.node_mut(index);
        if !node.is_valid {
            node.is_split = true;
            node.best_cost = MAX_COST;
            node.state = MergeState::MergeRejected;
            return;
        }

        let mut parent: Option<(PartType, SmallVec<[BestOverall; 4]>, u32)> = None;
        for part_type in PartType::ALL {
            if part_type == PartType::SizeNxN || !part_type.is_enabled(self.part_mask) {
                continue;
            }
            let winners: Option<SmallVec<[BestOverall; 4]>> = part_type
                .parts()
                .iter()
                .map(|&p| bank.best_overall(p).copied())
                .collect();
            let Some(winners) = winners else {
                continue;
            };
            let cost = winners
                .iter()
                .fold(0u32, |acc, w| acc.saturating_add(w.cost));
            if parent.as_ref().is_none_or(|(_, _, best)| cost < *best) {
                parent = Some((part_type, winners, cost));
            }
        }
        node.state = MergeState::MergeCandidateBuilt;

        match parent {
            Some((part_type, winners, cost)) if cost < MAX_COST && cost <= children_sum => {
                node.finalize(part_type, &winners, cost);
                node.state = MergeState::MergeAccepted;
                trace!(
                    "cu {}x{} at ({}, {}): {:?} {} <= {}",
                    node.size, node.size, node.x, node.y, part_type, cost, children_sum
                );
            }
            _ => {
                node.is_split = true;
                node.best_cost = children_sum;
                node.state = MergeState::MergeRejected;
                trace!(
                    "cu {}x{} at ({}, {}): split {}",
                    node.size, node.size, node.x, node.y, children_sum
                );
            }
        }
    }

    /// Settles the 32x32 or 64x64 node `index` whose children are settled.
    ///
    /// The leaf vectors below the node are clustered; the parent is costed
    /// once per cluster centroid and per best child vector and merged when
    /// the cheapest of those does not exceed the children together.
    pub fn merge_parent(&mut self, arena: &mut CuArena, index: usize, eval: &ParentEvaluator<'_, T>) {
        let Some(children) = arena.node(index).children else {
            return;
        };
        let all_valid = arena.node(index).is_valid && children.iter().all(|&c| arena.node(c).is_valid);
        if !all_valid {
            let node = arena.node_mut(index);
            node.is_split = true;
            node.best_cost = MAX_COST;
            node.state = MergeState::MergeRejected;
            return;
        }

        let children_sum = children
            .iter()
            .fold(0u32, |acc, &c| acc.saturating_add(arena.node(c).best_cost));

        self.reset();
        for &child in &children {
            collect_leaf_vectors(arena, child, &mut self.clusters, self.cluster_area);
        }
        self.clusters.prune(self.max_clusters_per_ref);
        for cluster in self.clusters.clusters() {
            push_seed(&mut self.seeds, Seed {
                list: cluster.list,
                ref_idx: cluster.ref_idx,
                mv: cluster.centroid_mv(),
            });
        }
        for &child in &children {
            if let Some(best) = best_leaf_winner(arena, child) {
                for (list, node) in [(RefList::L0, best.l0), (RefList::L1, best.l1)] {
                    if node.is_valid {
                        push_seed(&mut self.seeds, Seed {
                            list,
                            ref_idx: node.ref_idx,
                            mv: node.mv,
                        });
                    }
                }
            }
        }

        let (x, y, size) = {
            let node = arena.node(index);
            (node.x, node.y, node.size)
        };
        let mut parent: Option<BestOverall> = None;
        for i in 0..self.seeds.len() {
            let seed = self.seeds[i];
            let Some(node) = eval.evaluate(seed, x, y, size, &mut self.pred) else {
                continue;
            };
            if parent.is_none_or(|p| node.total_cost < p.cost) {
                parent = Some(BestOverall::uni(seed.list, node));
            }
        }

        let node = arena.node_mut(index);
        node.state = MergeState::MergeCandidateBuilt;
        match parent {
            Some(winner) if winner.cost <= children_sum => {
                node.finalize(PartType::Size2Nx2N, &[winner], winner.cost);
                node.state = MergeState::MergeAccepted;
                trace!(
                    "cu {}x{} at ({}, {}): merged {} <= {} from {} seeds",
                    size,
                    size,
                    x,
                    y,
                    winner.cost,
                    children_sum,
                    self.seeds.len()
                );
            }
            _ => {
                node.is_split = true;
                node.best_cost = children_sum;
                node.state = MergeState::MergeRejected;
                trace!("cu {}x{} at ({}, {}): split {}", size, size, x, y, children_sum);
            }
        }
    }
}

fn push_seed(seeds: &mut SmallVec<[Seed; 16]>, seed: Seed) {
    if !seeds.contains(&seed) {
        seeds.push(seed);
    }
}

/// Feeds the vectors of every settled CU below `index` to `clusters`.
fn collect_leaf_vectors(arena: &CuArena, index: usize, clusters: &mut ClusterData, area: i16) {
    let node = arena.node(index);
    match node.children {
        Some(children) if node.is_split => {
            for c in children {
                collect_leaf_vectors(arena, c, clusters, area);
            }
        }
        _ => {
            for w in &node.winners {
                for (list, n) in [(RefList::L0, w.l0), (RefList::L1, w.l1)] {
                    if n.is_valid {
                        clusters.add(list, n.ref_idx, n.mv, n.sdi, area);
                    }
                }
            }
        }
    }
}

/// Cheapest winner of any settled CU below `index`.
fn best_leaf_winner(arena: &CuArena, index: usize) -> Option<BestOverall> {
    let node = arena.node(index);
    match node.children {
        Some(children) if node.is_split => children
            .into_iter()
            .filter_map(|c| best_leaf_winner(arena, c))
            .min_by_key(|w| w.cost),
        _ => node.winners.iter().copied().min_by_key(|w| w.cost),
    }
}

impl<T: Pixel> ParentEvaluator<'_, T> {
    /// Cost of the `size` block at (`x`, `y`) predicted from `seed` as a
    /// single quarter-pel 2Nx2N partition, or `None` when the seed's
    /// reference is not available.
    pub fn evaluate(
        &self,
        seed: Seed,
        x: usize,
        y: usize,
        size: usize,
        pred: &mut Vec<T>,
    ) -> Option<SearchNode> {
        let r = self
            .refs
            .iter()
            .find(|r| r.list == seed.list && r.ref_idx == seed.ref_idx)?;
        let side = NonZeroUsize::new(size)?;
        let mv = self.range.clip(seed.mv);
        if pred.len() < size * size {
            pred.resize(size * size, T::zero());
        }
        self.kernels.interpolate_subpel(
            &r.planes,
            x as isize,
            y as isize,
            mv,
            side,
            side,
            pred,
            side,
        );
        let src = &r.src[(y - self.ctb_y) * self.src_pitch.get() + (x - self.ctb_x)..];
        let distortion =
            self.kernels
                .distortion(self.metric, side, side, src, self.src_pitch, pred, side);
        let mv_cost = self.mv_cost.cost(mv, r.predictor, r.list, r.ref_idx);
        let mut node = SearchNode::new(mv, r.ref_idx, PartId::Part2Nx2N).with_cost(distortion, mv_cost);
        node.is_subpel_done = true;
        Some(node)
    }
}
