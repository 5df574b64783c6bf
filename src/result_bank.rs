
use smallvec::SmallVec;

use crate::{
    geometry::{NUM_PART_IDS, PartId},
    mv::{MAX_COST, SearchNode},
    params::MAX_RESULTS,
    reference::RefList,
};

/// Prediction direction chosen for a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredKind {
    L0,
    L1,
    Bi,
}

/// Winner of a partition across both lists and bi-prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BestOverall {
    pub kind: PredKind,
    pub cost: u32,
    /// List 0 vector, valid unless `kind` is `L1`
    pub l0: SearchNode,
    /// List 1 vector, valid unless `kind` is `L0`
    pub l1: SearchNode,
}

impl BestOverall {
    /// Winner made of a single uni-directional result.
    #[must_use]
    pub fn uni(list: RefList, node: SearchNode) -> Self {
        let none = SearchNode::unavailable(-1, node.part_id);
        match list {
            RefList::L0 => Self {
                kind: PredKind::L0,
                cost: node.total_cost,
                l0: node,
                l1: none,
            },
            RefList::L1 => Self {
                kind: PredKind::L1,
                cost: node.total_cost,
                l0: none,
                l1: node,
            },
        }
    }
}

type Results = SmallVec<[SearchNode; MAX_RESULTS]>;

/// Best results of one search block, per partition and direction.
#[derive(Debug, Clone)]
pub struct ResultBank {
    max_results: usize,
    lists: [[Results; NUM_PART_IDS]; 2],
    best_overall: [Option<BestOverall>; NUM_PART_IDS],
}

impl ResultBank {
    #[must_use]
    pub fn new(max_results: usize) -> Self {
        debug_assert!((1..=MAX_RESULTS).contains(&max_results));
        Self {
            max_results,
            lists: Default::default(),
            best_overall: [None; NUM_PART_IDS],
        }
    }

    pub fn reset(&mut self) {
        for list in &mut self.lists {
            for results in list.iter_mut() {
                results.clear();
            }
        }
        self.best_overall = [None; NUM_PART_IDS];
    }

    /// Offers a costed node. It is kept if the list has room or it is strictly
    /// cheaper than the current worst entry, which is then evicted.
    ///
    /// A list never holds the same vector and reference twice; an offer
    /// matching a kept entry only replaces it when strictly cheaper.
    pub fn update(&mut self, list: RefList, part: PartId, node: SearchNode) -> bool {
        let results = &mut self.lists[list.index()][part.index()];
        if let Some(i) = results.iter().position(|n| same_motion(n, &node)) {
            if node.total_cost >= results[i].total_cost {
                return false;
            }
            results.remove(i);
        }
        let full = self.lists[list.index()][part.index()].len() >= self.max_results;
        if full && node.total_cost >= self.worst_cost(list, part) {
            return false;
        }
        let results = &mut self.lists[list.index()][part.index()];
        if full {
            results.pop();
        }
        // after equal costs, so ties keep the earlier entry first
        let pos = results
            .iter()
            .position(|n| node.total_cost < n.total_cost)
            .unwrap_or(results.len());
        results.insert(pos, node);
        true
    }

    /// Replaces the results of a partition, e.g. after sub-pel refinement.
    /// Refinements converging on one vector keep only the cheapest.
    pub fn replace(&mut self, list: RefList, part: PartId, nodes: &[SearchNode]) {
        let results = &mut self.lists[list.index()][part.index()];
        results.clear();
        for &node in nodes {
            if let Some(i) = results.iter().position(|n| same_motion(n, &node)) {
                if node.total_cost >= results[i].total_cost {
                    continue;
                }
                results.remove(i);
            }
            let pos = results
                .iter()
                .position(|n| node.total_cost < n.total_cost)
                .unwrap_or(results.len());
            results.insert(pos, node);
        }
        results.truncate(self.max_results);
    }

    #[must_use]
    pub fn results(&self, list: RefList, part: PartId) -> &[SearchNode] {
        &self.lists[list.index()][part.index()]
    }

    #[must_use]
    pub fn best(&self, list: RefList, part: PartId) -> Option<&SearchNode> {
        self.lists[list.index()][part.index()].first()
    }

    /// Cost a new node has to beat to enter a full list.
    #[must_use]
    pub fn worst_cost(&self, list: RefList, part: PartId) -> u32 {
        let results = &self.lists[list.index()][part.index()];
        if results.len() < self.max_results {
            MAX_COST
        } else {
            results.last().map_or(MAX_COST, |n| n.total_cost)
        }
    }

    /// Gives every partition without results an unavailable placeholder at
    /// [`MAX_COST`] pointing at `fallback_ref`.
    pub fn finalize(&mut self, list: RefList, fallback_ref: i8) {
        for part in PartId::ALL {
            let results = &mut self.lists[list.index()][part.index()];
            if results.is_empty() {
                results.push(SearchNode::unavailable(fallback_ref, part));
            }
        }
    }

    pub fn set_best_overall(&mut self, part: PartId, winner: BestOverall) {
        self.best_overall[part.index()] = Some(winner);
    }

    #[must_use]
    pub fn best_overall(&self, part: PartId) -> Option<&BestOverall> {
        self.best_overall[part.index()].as_ref()
    }
}

fn same_motion(a: &SearchNode, b: &SearchNode) -> bool {
    a.mv == b.mv && a.ref_idx == b.ref_idx
}
