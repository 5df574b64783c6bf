
use smallvec::SmallVec;

use crate::{
    geometry::PartType,
    mv::MAX_COST,
    params::{COARSE_BLOCK_SIZE, CTB_SIZE},
    result_bank::BestOverall,
};

/// Where a CU stands in the bottom-up merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    LeafEvaluated,
    MergeCandidateBuilt,
    MergeAccepted,
    MergeRejected,
}

/// One square coding unit of a CTB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuNode {
    /// Position in the picture, in pixels
    pub x: usize,
    pub y: usize,
    pub size: usize,
    /// Lies entirely inside the picture
    pub is_valid: bool,
    pub best_cost: u32,
    pub state: MergeState,
    /// Chosen shape, set when the node is not split
    pub part_type: Option<PartType>,
    /// Winner of every part of `part_type`
    pub winners: SmallVec<[BestOverall; 4]>,
    pub parent: Option<usize>,
    pub children: Option<[usize; 4]>,
    pub is_split: bool,
}

impl CuNode {
    fn new(x: usize, y: usize, size: usize, is_valid: bool, parent: Option<usize>) -> Self {
        Self {
            x,
            y,
            size,
            is_valid,
            best_cost: MAX_COST,
            state: MergeState::LeafEvaluated,
            part_type: None,
            winners: SmallVec::new(),
            parent,
            children: None,
            is_split: false,
        }
    }

    /// Settles the node as one CU of shape `part_type`.
    pub fn finalize(&mut self, part_type: PartType, winners: &[BestOverall], cost: u32) {
        self.part_type = Some(part_type);
        self.winners = winners.iter().copied().collect();
        self.best_cost = cost;
        self.is_split = false;
    }
}

/// Index-addressed storage of the CUs of one CTB.
#[derive(Debug, Clone, Default)]
pub struct CuArena {
    nodes: Vec<CuNode>,
}

impl CuArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn push(&mut self, node: CuNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn node(&self, index: usize) -> &CuNode {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut CuNode {
        &mut self.nodes[index]
    }

    /// Clears the arena and lays out the full quad-tree of the CTB at
    /// (`x`, `y`), from the 64x64 root down to 8x8 leaves. Returns the root.
    pub fn build_ctb(&mut self, x: usize, y: usize, width: usize, height: usize) -> usize {
        self.clear();
        self.build_node(x, y, CTB_SIZE, width, height, None)
    }

    fn build_node(
        &mut self,
        x: usize,
        y: usize,
        size: usize,
        width: usize,
        height: usize,
        parent: Option<usize>,
    ) -> usize {
        let is_valid = x + size <= width && y + size <= height;
        let index = self.push(CuNode::new(x, y, size, is_valid, parent));
        if size > COARSE_BLOCK_SIZE {
            let half = size / 2;
            let children = [(0, 0), (half, 0), (0, half), (half, half)]
                .map(|(dx, dy)| self.build_node(x + dx, y + dy, half, width, height, Some(index)));
            self.nodes[index].children = Some(children);
        }
        index
    }

    /// Indices of the nodes of `size`, in construction order.
    pub fn level(&self, size: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.nodes.len()).filter(move |&i| self.nodes[i].size == size)
    }

    /// Freezes the arena into a result tree rooted at `root`.
    #[must_use]
    pub fn to_tree(&self, root: usize) -> CuTree {
        CuTree {
            x: self.nodes[root].x,
            y: self.nodes[root].y,
            root,
            nodes: self.nodes.clone(),
        }
    }
}

/// The merged coding units of one CTB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuTree {
    pub x: usize,
    pub y: usize,
    root: usize,
    nodes: Vec<CuNode>,
}

impl CuTree {
    #[must_use]
    pub fn root(&self) -> &CuNode {
        &self.nodes[self.root]
    }

    #[must_use]
    pub fn node(&self, index: usize) -> &CuNode {
        &self.nodes[index]
    }

    #[must_use]
    pub fn nodes(&self) -> &[CuNode] {
        &self.nodes
    }

    /// The final CUs: every valid unsplit node reached from the root.
    #[must_use]
    pub fn leaves(&self) -> Vec<&CuNode> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            match node.children {
                Some(children) if node.is_split => stack.extend(children.iter().rev()),
                _ if node.is_valid => out.push(node),
                _ => {}
            }
        }
        out
    }
}
