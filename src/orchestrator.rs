#[cfg(test)]
mod tests;

use std::num::NonZeroUsize;

use anyhow::{Result, anyhow, bail};
use log::debug;
use smallvec::SmallVec;

use crate::{
    candidates::{CandidateContext, CandidateGenerator, CandidateList, Deduplicator, ListRef, block_predictor},
    cost::{CostEvaluator, GridContext, GridPoint, MvCostModel},
    cu_tree::{CuArena, CuTree},
    error::InvariantViolation,
    geometry::{MvRange, NUM_PART_IDS, PartId, PartSet},
    kernels::{CostKernels, select_kernels},
    layer::{BankEntry, LayerContext, MAX_REFS_PER_LIST, MvBankSnapshot, NUM_REF_SLOTS, ref_slot},
    merge::{MergeRef, ParentEvaluator, PartitionMerger},
    mv::{MAX_COST, MotionVector, SearchNode},
    params::{COARSE_BLOCK_SIZE, CTB_SIZE, ENCODE_BLOCK_SIZE, MAX_RESULTS, MeConfig},
    pyramid::{FramePyramid, SubpelPlanes},
    reference::{RefList, ReferenceDescriptor, count_in_list, find_ref},
    result_bank::{BestOverall, PredKind, ResultBank},
    subpel::{MvRefineContext, SubpelRefiner, SubpelScratch},
    sync::RowSync,
    util::Pixel,
    weighted::{WeightParams, WeightedPredContext},
};

/// Smallest search range of a coarse layer, in pixels of that layer.
pub const MIN_LAYER_SEARCH_RANGE: u16 = 4;

/// One frame handed to the search.
#[derive(Debug, Clone, Copy)]
pub struct FrameMeInput<'a, T> {
    pub poc: i32,
    /// The frame itself; only its full-pel planes are read
    pub pyramid: &'a FramePyramid<T>,
    pub refs: &'a [ReferenceDescriptor<'a, T>],
}

/// Search results of one frame.
#[derive(Debug, Clone)]
pub struct FrameMeResult {
    pub poc: i32,
    pub ctb_cols: usize,
    pub ctb_rows: usize,
    /// One tree per CTB, in raster order
    pub ctbs: Vec<CuTree>,
}

impl FrameMeResult {
    #[must_use]
    pub fn ctb(&self, col: usize, row: usize) -> Option<&CuTree> {
        if col >= self.ctb_cols {
            return None;
        }
        self.ctbs.get(row * self.ctb_cols + col)
    }
}

/// A reference of the current frame, resolved to its bank slot.
#[derive(Debug, Clone, Copy)]
struct ActiveRef<'a, T> {
    pyramid: &'a FramePyramid<T>,
    /// Position in the frame's reference slice, which indexes its input view
    view: usize,
    list: RefList,
    list_ref: ListRef,
}

type RefTable<'a, T> = SmallVec<[ActiveRef<'a, T>; MAX_REFS_PER_LIST]>;

#[derive(Debug, Clone, Copy)]
struct BlockPos {
    bx: usize,
    by: usize,
    x: usize,
    y: usize,
    size: usize,
}

/// Scratch memory of one search thread.
#[derive(Debug, Clone)]
pub struct MeWorker<T> {
    results: ResultBank,
    ref_results: ResultBank,
    grid: GridContext,
    visited: Deduplicator,
    generator: CandidateGenerator,
    candidates: CandidateList,
    refine: [MvRefineContext; 2],
    subpel: SubpelScratch<T>,
    block_input: WeightedPredContext<T>,
    ctb_input: WeightedPredContext<T>,
    merger: PartitionMerger<T>,
    arena: CuArena,
    pred: [Vec<T>; 3],
}

impl<T: Pixel> MeWorker<T> {
    #[must_use]
    pub fn new(config: &MeConfig) -> Self {
        Self {
            results: ResultBank::new(config.max_results),
            ref_results: ResultBank::new(MAX_RESULTS),
            grid: GridContext::new(),
            visited: Deduplicator::new(),
            generator: CandidateGenerator::new(config.max_init_candts),
            candidates: CandidateList::new(),
            refine: [MvRefineContext::new(), MvRefineContext::new()],
            subpel: SubpelScratch::new(),
            block_input: WeightedPredContext::new(config.bit_depth),
            ctb_input: WeightedPredContext::new(config.bit_depth),
            merger: PartitionMerger::new(
                config.part_mask,
                config.cluster_area,
                config.max_clusters_per_ref,
            ),
            arena: CuArena::new(),
            pred: [Vec::new(), Vec::new(), Vec::new()],
        }
    }

    pub fn reset(&mut self) {
        self.results.reset();
        self.ref_results.reset();
        self.grid.clear();
        self.visited.reset(MotionVector::ZERO);
        self.candidates.clear();
        for ctx in &mut self.refine {
            ctx.reset();
        }
        self.subpel.clear();
        self.block_input.reset();
        self.ctb_input.reset();
        self.merger.reset();
        self.arena.clear();
    }
}

/// Hierarchical motion search over a sequence of frames of one resolution.
///
/// Layer state persists from one [`HmeEngine::process_frame`] to the next,
/// so frames have to be passed in coding order.
pub struct HmeEngine<T: Pixel> {
    config: MeConfig,
    width: usize,
    height: usize,
    kernels: &'static dyn CostKernels<T>,
    mv_cost: MvCostModel,
    refiner: SubpelRefiner,
    layers: Vec<LayerContext>,
    worker: MeWorker<T>,
    frames: u64,
}

impl<T: Pixel> HmeEngine<T> {
    /// Validates `config` and sets up the layers of a `width` x `height`
    /// sequence.
    pub fn new(mut config: MeConfig, width: usize, height: usize) -> Result<Self> {
        config.validate()?;
        if width == 0
            || height == 0
            || width % COARSE_BLOCK_SIZE != 0
            || height % COARSE_BLOCK_SIZE != 0
        {
            bail!(
                "HmeEngine: dimensions must be non-zero multiples of {COARSE_BLOCK_SIZE}, got {width}x{height}."
            );
        }
        let coarsest = config.num_layers - 1;
        if (width >> coarsest) < COARSE_BLOCK_SIZE || (height >> coarsest) < COARSE_BLOCK_SIZE {
            bail!(
                "HmeEngine: a {width}x{height} picture is too small for {} layers.",
                config.num_layers
            );
        }

        let layers = (0..config.num_layers)
            .map(|level| {
                let block_size = if level == 0 {
                    ENCODE_BLOCK_SIZE
                } else {
                    COARSE_BLOCK_SIZE
                };
                LayerContext::new(level, width >> level, height >> level, block_size)
            })
            .collect();
        let kernels = select_kernels(config.cpu_level);
        debug!(
            "HmeEngine: {}x{} {:?}, {} layers, {:?} kernels",
            width,
            height,
            config.preset,
            config.num_layers,
            kernels.level()
        );

        Ok(Self {
            width,
            height,
            kernels,
            mv_cost: MvCostModel::new(config.lambda, config.lambda_q_shift),
            refiner: SubpelRefiner::new(config.num_hpel_steps, config.num_qpel_steps),
            layers,
            worker: MeWorker::new(&config),
            frames: 0,
            config,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &MeConfig {
        &self.config
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn layer(&self, level: usize) -> Option<&LayerContext> {
        self.layers.get(level)
    }

    /// The bank `level` committed at the end of the last frame.
    #[must_use]
    pub fn snapshot(&self, level: usize) -> Option<&MvBankSnapshot> {
        self.layers.get(level).and_then(LayerContext::previous)
    }

    /// Searches one frame against its references, coarsest layer first.
    ///
    /// Every layer commits its bank at the end so the next frame can use it
    /// for temporal candidates.
    pub fn process_frame(
        &mut self,
        input: &FrameMeInput<'_, T>,
        sync: &dyn RowSync,
    ) -> Result<FrameMeResult> {
        self.check_pyramid(input.pyramid, "input", false)?;

        let mut lists: [RefTable<'_, T>; 2] = Default::default();
        let mut ref_pocs = [None; NUM_REF_SLOTS];
        for (view, desc) in input.refs.iter().enumerate() {
            desc.weight.validate()?;
            let slot = ref_slot(desc.list, usize::from(desc.list_idx))?;
            self.check_pyramid(desc.pyramid, "reference", true)?;
            if find_ref(&input.refs[..view], desc.list, usize::from(desc.list_idx)).is_some() {
                bail!(
                    "HmeEngine: reference {} of {:?} given twice for poc {}.",
                    desc.list_idx,
                    desc.list,
                    input.poc
                );
            }
            ref_pocs[slot] = Some(desc.poc);
            lists[desc.list.index()].push(ActiveRef {
                pyramid: desc.pyramid,
                view,
                list: desc.list,
                list_ref: ListRef {
                    ref_idx: desc.list_idx as i8,
                    slot,
                    poc: desc.poc,
                },
            });
        }
        for (list, table) in RefList::ALL.into_iter().zip(&mut lists) {
            table.sort_unstable_by_key(|r| r.list_ref.ref_idx);
            self.mv_cost.set_num_refs(list, count_in_list(input.refs, list));
        }
        let weights: SmallVec<[WeightParams; NUM_REF_SLOTS]> =
            input.refs.iter().map(|r| r.weight).collect();

        for layer in &mut self.layers {
            layer.begin_frame();
        }
        self.worker.reset();

        let search = FrameSearch {
            config: &self.config,
            kernels: self.kernels,
            mv_cost: &self.mv_cost,
            refiner: self.refiner,
            frame: input.pyramid,
            poc: input.poc,
            lists: &lists,
            weights: &weights,
        };
        let coarsest = self.layers.len() - 1;
        for level in (1..=coarsest).rev() {
            search.search_coarse_layer(&mut self.worker, &mut self.layers, level, sync)?;
            if level == coarsest {
                self.layers[level].derive_global_mvs();
            }
        }
        let (ctbs, ctb_cols, ctb_rows) =
            search.search_encode_layer(&mut self.worker, &mut self.layers, sync)?;
        if coarsest == 0 {
            self.layers[0].derive_global_mvs();
        }

        for layer in &mut self.layers {
            layer.commit(input.poc, ref_pocs);
        }
        self.frames += 1;
        debug!(
            "frame {} (poc {}): {} L0 / {} L1 refs, {} CTBs",
            self.frames,
            input.poc,
            lists[0].len(),
            lists[1].len(),
            ctbs.len()
        );

        Ok(FrameMeResult {
            poc: input.poc,
            ctb_cols,
            ctb_rows,
            ctbs,
        })
    }

    fn check_pyramid(
        &self,
        pyramid: &FramePyramid<T>,
        what: &'static str,
        is_reference: bool,
    ) -> Result<(), InvariantViolation> {
        for layer in &self.layers {
            let level = pyramid.require_level(layer.level, what)?;
            if level.width() != layer.width || level.height() != layer.height {
                return Err(InvariantViolation::DimensionMismatch {
                    what,
                    expected_width: layer.width,
                    expected_height: layer.height,
                    found_width: level.width(),
                    found_height: level.height(),
                });
            }
            if level.plane().pad < self.config.pad {
                return Err(InvariantViolation::PaddingTooSmall {
                    pad: level.plane().pad,
                    required: self.config.pad,
                });
            }
            if is_reference && layer.level == 0 && level.subpel().is_none() {
                return Err(InvariantViolation::LayerMismatch {
                    level: 0,
                    what: "reference without half-pel planes",
                });
            }
        }
        Ok(())
    }
}

fn subpel_planes<T: Pixel>(
    pyramid: &FramePyramid<T>,
) -> Result<SubpelPlanes<'_, T>, InvariantViolation> {
    pyramid
        .require_level(0, "reference")?
        .subpel()
        .ok_or(InvariantViolation::LayerMismatch {
            level: 0,
            what: "reference without half-pel planes",
        })
}

/// The two best whole-block results and the quadrant winners of `list`.
fn bank_entry(results: &ResultBank, list: RefList) -> BankEntry {
    let mut entry = BankEntry::default();
    for (dest, node) in entry
        .best
        .iter_mut()
        .zip(results.results(list, PartId::Part2Nx2N))
    {
        *dest = *node;
    }
    for (dest, part) in entry.quads.iter_mut().zip(PartId::QUADRANTS) {
        if let Some(node) = results.best(list, part) {
            *dest = *node;
        }
    }
    entry
}

/// Per-frame, read-only view of everything the layer searches share.
struct FrameSearch<'s, 'a, T: Pixel> {
    config: &'s MeConfig,
    kernels: &'static dyn CostKernels<T>,
    mv_cost: &'s MvCostModel,
    refiner: SubpelRefiner,
    frame: &'s FramePyramid<T>,
    poc: i32,
    lists: &'s [RefTable<'a, T>; 2],
    weights: &'s [WeightParams],
}

impl<T: Pixel> FrameSearch<'_, '_, T> {
    fn range(&self, layer: &LayerContext, block: BlockPos) -> MvRange {
        let scale = |r: u16| {
            if layer.level == 0 {
                r
            } else {
                (r >> layer.level).max(MIN_LAYER_SEARCH_RANGE)
            }
        };
        MvRange::for_block(
            block.x,
            block.y,
            block.size,
            layer.width,
            layer.height,
            scale(self.config.search_range_x),
            scale(self.config.search_range_y),
            self.config.pad,
        )
    }

    fn find_ref(&self, list: RefList, ref_idx: i8) -> Result<&ActiveRef<'_, T>, InvariantViolation> {
        let table = &self.lists[list.index()];
        table
            .iter()
            .find(|r| r.list_ref.ref_idx == ref_idx)
            .ok_or(InvariantViolation::ReferenceOutOfRange {
                ref_idx: ref_idx.max(0) as usize,
                max: table.len(),
            })
    }

    /// Searches every block of coarse layer `level` against every reference
    /// and stores the winners in the layer's bank.
    fn search_coarse_layer(
        &self,
        worker: &mut MeWorker<T>,
        layers: &mut [LayerContext],
        level: usize,
        sync: &dyn RowSync,
    ) -> Result<()> {
        let exhaustive = level + 1 == layers.len();
        let plane = self.frame.require_level(level, "input")?.plane();
        let (cols, rows, size) = {
            let layer = &layers[level];
            (layer.cols(), layer.rows(), layer.block_size)
        };
        let side = NonZeroUsize::new(size).ok_or(anyhow!("invalid block size"))?;
        let mut parts = PartSet::single(PartId::Part2Nx2N);
        if self.config.coarse_4x4 {
            for quad in PartId::QUADRANTS {
                parts.insert(quad);
            }
        }

        for by in 0..rows {
            sync.wait(level, by);
            for bx in 0..cols {
                let block = BlockPos {
                    bx,
                    by,
                    x: bx * size,
                    y: by * size,
                    size,
                };
                worker
                    .block_input
                    .prepare(plane, block.x, block.y, side, self.weights);
                for list in RefList::ALL {
                    for r in &self.lists[list.index()] {
                        self.search_reference(worker, layers, level, block, r, parts, exhaustive)?;
                        let entry = bank_entry(&worker.ref_results, list);
                        layers[level]
                            .current_mut()
                            .store(bx, by, r.list_ref.slot, entry);
                    }
                }
                layers[level].current_mut().mark_done(bx, by);
            }
            sync.signal(level, by);
        }
        debug!(
            "layer {}: {}x{} blocks searched{}",
            level,
            cols,
            rows,
            if exhaustive { " exhaustively" } else { "" }
        );
        Ok(())
    }

    /// Full-pel search of one block towards one reference into
    /// `worker.ref_results`.
    ///
    /// Each candidate is evaluated with its 3x3 neighborhood. The coarsest
    /// layer then scans its whole range; other layers re-center the grid on
    /// the best whole-block vector a bounded number of times.
    fn search_reference(
        &self,
        worker: &mut MeWorker<T>,
        layers: &[LayerContext],
        level: usize,
        block: BlockPos,
        r: &ActiveRef<'_, T>,
        parts: PartSet,
        exhaustive: bool,
    ) -> Result<()> {
        let layer = &layers[level];
        let plane = r.pyramid.require_level(level, "reference")?.plane();
        let range = self.range(layer, block);
        let predictor = block_predictor(layer.current(), block.bx, block.by, r.list_ref.slot);
        let ref_idx = r.list_ref.ref_idx;

        let ctx = CandidateContext {
            layer,
            coarse: layers.get(level + 1),
            global: layers.last(),
            bx: block.bx,
            by: block.by,
            refs: std::slice::from_ref(&r.list_ref),
            cur_poc: self.poc,
            range,
        };
        worker.generator.generate(&ctx, &mut worker.candidates);

        let eval = CostEvaluator {
            kernels: self.kernels,
            src: worker.block_input.view(r.view),
            src_pitch: worker.block_input.pitch(),
            block_x: block.x as isize,
            block_y: block.y as isize,
            block_size: block.size,
            metric: self.config.fullpel_metric,
            mv_cost: self.mv_cost,
            predictor,
            list: r.list,
        };
        worker.ref_results.reset();
        worker.visited.reset(predictor.round_to_fullpel());

        for cand in &worker.candidates {
            worker.grid.fill_around(cand.mv, ref_idx, 4, parts, &range);
            let visited = &mut worker.visited;
            worker.grid.retain(|p| visited.insert(p.mv, p.ref_idx));
            eval.evaluate_grid(&worker.grid, plane, &mut worker.ref_results)?;
        }

        if exhaustive {
            let (lo, hi) = range.fullpel_bounds();
            worker.grid.clear();
            for y in (lo.y..=hi.y).step_by(4) {
                for x in (lo.x..=hi.x).step_by(4) {
                    let mv = MotionVector::new(x, y);
                    if !worker.visited.insert(mv, ref_idx) {
                        continue;
                    }
                    worker.grid.push(GridPoint { mv, ref_idx, parts });
                    if worker.grid.len() == 9 {
                        eval.evaluate_grid(&worker.grid, plane, &mut worker.ref_results)?;
                        worker.grid.clear();
                    }
                }
            }
            if !worker.grid.is_empty() {
                eval.evaluate_grid(&worker.grid, plane, &mut worker.ref_results)?;
            }
            return Ok(());
        }

        let mut center = None;
        for _ in 0..self.config.fpel_refine_iters {
            let Some(best) = worker
                .ref_results
                .best(r.list, PartId::Part2Nx2N)
                .map(|n| n.mv)
            else {
                break;
            };
            if center == Some(best) {
                break;
            }
            center = Some(best);
            worker.grid.fill_around(best, ref_idx, 4, parts, &range);
            let visited = &mut worker.visited;
            worker.grid.retain(|p| visited.insert(p.mv, p.ref_idx));
            if worker.grid.is_empty() {
                break;
            }
            eval.evaluate_grid(&worker.grid, plane, &mut worker.ref_results)?;
        }
        Ok(())
    }

    /// Searches the encode layer CTB by CTB and merges every CTB.
    fn search_encode_layer(
        &self,
        worker: &mut MeWorker<T>,
        layers: &mut [LayerContext],
        sync: &dyn RowSync,
    ) -> Result<(Vec<CuTree>, usize, usize)> {
        let exhaustive = layers.len() == 1;
        let (width, height, cols, rows) = {
            let layer = &layers[0];
            (layer.width, layer.height, layer.cols(), layer.rows())
        };
        let ctb_cols = width.div_ceil(CTB_SIZE);
        let ctb_rows = height.div_ceil(CTB_SIZE);
        let blocks_per_ctb = CTB_SIZE / ENCODE_BLOCK_SIZE;
        let parts = PartSet::from_mask(self.config.part_mask);
        let mut ctbs = Vec::with_capacity(ctb_cols * ctb_rows);

        for cy in 0..ctb_rows {
            sync.wait(0, cy);
            for cx in 0..ctb_cols {
                let (ctb_x, ctb_y) = (cx * CTB_SIZE, cy * CTB_SIZE);
                let root = worker.arena.build_ctb(ctb_x, ctb_y, width, height);
                for j in 0..blocks_per_ctb {
                    for i in 0..blocks_per_ctb {
                        let (bx, by) = (cx * blocks_per_ctb + i, cy * blocks_per_ctb + j);
                        if bx >= cols || by >= rows {
                            continue;
                        }
                        let block = BlockPos {
                            bx,
                            by,
                            x: bx * ENCODE_BLOCK_SIZE,
                            y: by * ENCODE_BLOCK_SIZE,
                            size: ENCODE_BLOCK_SIZE,
                        };
                        self.search_encode_block(worker, layers, block, parts, exhaustive)?;
                        let node = worker.arena.level(ENCODE_BLOCK_SIZE).find(|&n| {
                            let n = worker.arena.node(n);
                            n.x == block.x && n.y == block.y
                        });
                        if let Some(node) = node {
                            worker
                                .merger
                                .merge_search_block(&mut worker.arena, node, &worker.results);
                        }
                    }
                }
                self.merge_ctb(worker, &layers[0], ctb_x, ctb_y)?;
                ctbs.push(worker.arena.to_tree(root));
            }
            sync.signal(0, cy);
        }
        debug!("layer 0: {}x{} CTBs searched and merged", ctb_cols, ctb_rows);
        Ok((ctbs, ctb_cols, ctb_rows))
    }

    /// Full-pel search, sub-pel refinement and bi-prediction of one 16x16
    /// block, leaving the winners in `worker.results`.
    fn search_encode_block(
        &self,
        worker: &mut MeWorker<T>,
        layers: &mut [LayerContext],
        block: BlockPos,
        parts: PartSet,
        exhaustive: bool,
    ) -> Result<()> {
        let plane = self.frame.require_level(0, "input")?.plane();
        let side = NonZeroUsize::new(block.size).ok_or(anyhow!("invalid block size"))?;
        worker
            .block_input
            .prepare(plane, block.x, block.y, side, self.weights);
        worker.results.reset();

        for list in RefList::ALL {
            for r in &self.lists[list.index()] {
                self.search_reference(worker, layers, 0, block, r, parts, exhaustive)?;
                let entry = bank_entry(&worker.ref_results, list);
                layers[0]
                    .current_mut()
                    .store(block.bx, block.by, r.list_ref.slot, entry);
                for part in parts.iter() {
                    for &node in worker.ref_results.results(list, part) {
                        worker.results.update(list, part, node);
                    }
                }
            }
        }

        self.refine_subpel(worker, &layers[0], block, parts)?;
        for list in RefList::ALL {
            if let Some(first) = self.lists[list.index()].first() {
                worker.results.finalize(list, first.list_ref.ref_idx);
            }
        }
        self.pick_best_overall(worker, block, parts)?;
        layers[0].current_mut().mark_done(block.bx, block.by);
        Ok(())
    }

    /// Refines every full-pel result of the block and replaces it by its
    /// refined counterpart. Results stay distinct per partition.
    fn refine_subpel(
        &self,
        worker: &mut MeWorker<T>,
        layer: &LayerContext,
        block: BlockPos,
        parts: PartSet,
    ) -> Result<()> {
        let range = self.range(layer, block);
        for list in RefList::ALL {
            let table = &self.lists[list.index()];
            if table.is_empty() {
                continue;
            }
            let li = list.index();
            worker.refine[li].reset();
            let mut refined: [SmallVec<[SearchNode; MAX_RESULTS]>; NUM_PART_IDS] =
                Default::default();

            for r in table {
                let planes = subpel_planes(r.pyramid)?;
                worker.subpel.clear();
                let eval = CostEvaluator {
                    kernels: self.kernels,
                    src: worker.block_input.view(r.view),
                    src_pitch: worker.block_input.pitch(),
                    block_x: block.x as isize,
                    block_y: block.y as isize,
                    block_size: block.size,
                    metric: self.config.subpel_metric,
                    mv_cost: self.mv_cost,
                    predictor: block_predictor(layer.current(), block.bx, block.by, r.list_ref.slot),
                    list,
                };
                for part in parts.iter() {
                    for node in worker.results.results(list, part) {
                        if !node.is_valid || node.ref_idx != r.list_ref.ref_idx {
                            continue;
                        }
                        let outcome = self.refiner.refine(
                            &eval,
                            &planes,
                            &range,
                            part,
                            node,
                            &mut worker.refine[li],
                            &mut worker.subpel,
                        );
                        refined[part.index()].push(outcome.node);
                    }
                }
            }

            for part in parts.iter() {
                let nodes = &refined[part.index()];
                if nodes.is_empty() {
                    continue;
                }
                worker.results.replace(list, part, nodes);
                // starts converging on one vector leave room for the runner-up
                if let Some(second) = worker.refine[li].second_node(part) {
                    worker.results.update(list, part, second);
                }
            }
        }
        Ok(())
    }

    /// Records the cheapest of L0, L1 and their average for every partition.
    ///
    /// Single-list costs come from each reference's inverse-weighted view of
    /// the frame, while the average is scored against the unweighted frame.
    /// With weighted references the bi-prediction is therefore judged on
    /// different source samples than the single-list results it competes with.
    fn pick_best_overall(
        &self,
        worker: &mut MeWorker<T>,
        block: BlockPos,
        parts: PartSet,
    ) -> Result<()> {
        let bipred = self.config.bipred && self.lists.iter().all(|t| !t.is_empty());
        let mut cached = [None; 2];
        for part in parts.iter() {
            let uni = RefList::ALL.map(|list| worker.results.best(list, part).copied());
            let valid = uni.map(|n| n.filter(SearchNode::has_cost));

            let mut winner: Option<BestOverall> = None;
            for (list, node) in RefList::ALL.into_iter().zip(valid) {
                let Some(node) = node else {
                    continue;
                };
                if winner.is_none_or(|w| node.total_cost < w.cost) {
                    winner = Some(BestOverall::uni(list, node));
                }
            }
            match valid {
                [Some(l0), Some(l1)] if bipred => {
                    let cost = self.bipred_cost(worker, block, part, l0, l1, &mut cached)?;
                    if winner.is_none_or(|w| cost < w.cost) {
                        winner = Some(BestOverall {
                            kind: PredKind::Bi,
                            cost,
                            l0,
                            l1,
                        });
                    }
                }
                _ => {}
            }

            let winner = winner.or_else(|| {
                RefList::ALL
                    .into_iter()
                    .zip(uni)
                    .find_map(|(list, node)| node.map(|n| BestOverall::uni(list, n)))
            });
            if let Some(winner) = winner {
                worker.results.set_best_overall(part, winner);
            }
        }
        Ok(())
    }

    /// Cost of predicting `part` with the average of `l0` and `l1`.
    fn bipred_cost(
        &self,
        worker: &mut MeWorker<T>,
        block: BlockPos,
        part: PartId,
        l0: SearchNode,
        l1: SearchNode,
        cached: &mut [Option<(i8, MotionVector)>; 2],
    ) -> Result<u32> {
        let side = NonZeroUsize::new(block.size).ok_or(anyhow!("invalid block size"))?;
        let area = block.size * block.size;
        for (k, (list, node)) in [(RefList::L0, l0), (RefList::L1, l1)].into_iter().enumerate() {
            if cached[k] == Some((node.ref_idx, node.mv)) {
                continue;
            }
            let planes = subpel_planes(self.find_ref(list, node.ref_idx)?.pyramid)?;
            let pred = &mut worker.pred[k];
            if pred.len() < area {
                pred.resize(area, T::zero());
            }
            self.kernels.interpolate_subpel(
                &planes,
                block.x as isize,
                block.y as isize,
                node.mv,
                side,
                side,
                pred,
                side,
            );
            cached[k] = Some((node.ref_idx, node.mv));
        }
        let [p0, p1, avg] = &mut worker.pred;
        if avg.len() < area {
            avg.resize(area, T::zero());
        }
        self.kernels.average(avg, side, p0, side, p1, side, side, side);

        let (px, py, pw, ph) = part.geometry().pixel_rect(block.size);
        let (Some(w), Some(h)) = (NonZeroUsize::new(pw), NonZeroUsize::new(ph)) else {
            return Ok(MAX_COST);
        };
        let pitch = worker.block_input.pitch();
        let src = &worker.block_input.input()[py * pitch.get() + px..];
        let distortion = self.kernels.distortion(
            self.config.subpel_metric,
            w,
            h,
            src,
            pitch,
            &avg[py * block.size + px..],
            side,
        );
        Ok(distortion
            .saturating_add(l0.mv_cost)
            .saturating_add(l1.mv_cost))
    }

    /// Settles the 32x32 and 64x64 nodes of the CTB at (`ctb_x`, `ctb_y`).
    fn merge_ctb(
        &self,
        worker: &mut MeWorker<T>,
        layer: &LayerContext,
        ctb_x: usize,
        ctb_y: usize,
    ) -> Result<()> {
        let plane = self.frame.require_level(0, "input")?.plane();
        let side = NonZeroUsize::new(CTB_SIZE).ok_or(anyhow!("invalid CTB size"))?;
        worker
            .ctb_input
            .prepare(plane, ctb_x, ctb_y, side, self.weights);

        let (bx, by) = (ctb_x / ENCODE_BLOCK_SIZE, ctb_y / ENCODE_BLOCK_SIZE);
        let mut refs: SmallVec<[MergeRef<'_, T>; NUM_REF_SLOTS]> = SmallVec::new();
        for r in self.lists.iter().flatten() {
            refs.push(MergeRef {
                list: r.list,
                ref_idx: r.list_ref.ref_idx,
                planes: subpel_planes(r.pyramid)?,
                src: worker.ctb_input.view(r.view),
                predictor: block_predictor(layer.current(), bx, by, r.list_ref.slot),
            });
        }
        let ctb = BlockPos {
            bx,
            by,
            x: ctb_x,
            y: ctb_y,
            size: CTB_SIZE,
        };
        let eval = ParentEvaluator {
            kernels: self.kernels,
            metric: self.config.subpel_metric,
            mv_cost: self.mv_cost,
            refs: &refs,
            src_pitch: worker.ctb_input.pitch(),
            ctb_x,
            ctb_y,
            range: self.range(layer, ctb),
        };
        for size in [CTB_SIZE / 2, CTB_SIZE] {
            let parents: SmallVec<[usize; 4]> = worker.arena.level(size).collect();
            for parent in parents {
                worker.merger.merge_parent(&mut worker.arena, parent, &eval);
            }
        }
        Ok(())
    }
}
