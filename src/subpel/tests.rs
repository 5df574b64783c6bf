#![allow(clippy::unwrap_used, reason = "allow in test files")]

use std::num::NonZeroUsize;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro128StarStar;

use super::*;
use crate::{
    cost::MvCostModel,
    kernels::{CostKernels, RustKernels},
    params::{CostMetric, MIN_PAD},
    pyramid::FramePyramid,
    reference::RefList,
};

const SIZE: usize = 64;
const BLOCK: usize = 16;

fn nz(v: usize) -> NonZeroUsize {
    NonZeroUsize::new(v).unwrap()
}

fn random_pyramid() -> FramePyramid<u8> {
    let mut rng = Xoshiro128StarStar::from_seed(*b"deadbeeflolcakes");
    let pixels: Vec<u8> = (0..SIZE * SIZE).map(|_| rng.random()).collect();
    FramePyramid::build(&pixels, nz(SIZE), nz(SIZE), nz(SIZE), 1, MIN_PAD, true).unwrap()
}

/// The prediction of the block at (16, 16) displaced by `mv`.
fn prediction(pyramid: &FramePyramid<u8>, mv: MotionVector) -> Vec<u8> {
    let planes = pyramid.level(0).unwrap().subpel().unwrap();
    let mut out = vec![0u8; BLOCK * BLOCK];
    RustKernels.interpolate_subpel(&planes, 16, 16, mv, nz(BLOCK), nz(BLOCK), &mut out, nz(BLOCK));
    out
}

fn evaluator<'a>(src: &'a [u8], mv_cost: &'a MvCostModel) -> CostEvaluator<'a, u8> {
    CostEvaluator {
        kernels: &RustKernels,
        src,
        src_pitch: nz(BLOCK),
        block_x: 16,
        block_y: 16,
        block_size: BLOCK,
        metric: CostMetric::Satd,
        mv_cost,
        predictor: MotionVector::ZERO,
        list: RefList::L0,
    }
}

fn wide_range() -> MvRange {
    MvRange::new(MotionVector::new(-40, -40), MotionVector::new(40, 40))
}

#[test]
fn finds_a_half_pel_displacement() {
    let pyramid = random_pyramid();
    let planes = pyramid.level(0).unwrap().subpel().unwrap();
    let target = MotionVector::new(6, 2);
    let src = prediction(&pyramid, target);
    let model = MvCostModel::new(4 << 8, 8);
    let eval = evaluator(&src, &model);

    let start = eval.node(PartId::Part2Nx2N, MotionVector::new(4, 0), 0, 0);
    let mut ctx = MvRefineContext::new();
    let mut scratch = SubpelScratch::new();
    let outcome = SubpelRefiner::new(3, 3).refine(
        &eval,
        &planes,
        &wide_range(),
        PartId::Part2Nx2N,
        &start,
        &mut ctx,
        &mut scratch,
    );

    assert_eq!(outcome.node.mv, target);
    assert_eq!(outcome.node.distortion, 0);
    assert!(outcome.node.is_subpel_done);
    assert_eq!(outcome.node.sdi, ctx.fullpel_distortion(PartId::Part2Nx2N));
    assert_eq!(ctx.best(PartId::Part2Nx2N).mv, target);
    assert_eq!(ctx.best(PartId::Part2Nx2N).total_cost, outcome.node.total_cost);
    assert_ne!(ctx.second(PartId::Part2Nx2N).mv, target);
}

#[test]
fn refinement_never_gets_worse() {
    let pyramid = random_pyramid();
    let planes = pyramid.level(0).unwrap().subpel().unwrap();
    let model = MvCostModel::new(4 << 8, 8);
    let mut rng = Xoshiro128StarStar::from_seed(*b"deadbeeflolcakes");
    let refiner = SubpelRefiner::new(2, 2);

    for _ in 0..16 {
        let target = MotionVector::new(rng.random_range(-12..=12), rng.random_range(-12..=12));
        let src = prediction(&pyramid, target);
        let eval = evaluator(&src, &model);
        let mut ctx = MvRefineContext::new();
        let mut scratch = SubpelScratch::new();
        for part in PartId::ALL {
            let start = eval.node(part, target.round_to_fullpel(), 0, 0);
            let outcome = refiner.refine(
                &eval,
                &planes,
                &wide_range(),
                part,
                &start,
                &mut ctx,
                &mut scratch,
            );
            assert!(outcome.halfpel_cost <= outcome.fullpel_cost);
            assert!(outcome.quarterpel_cost <= outcome.halfpel_cost);
            assert_eq!(outcome.quarterpel_cost, outcome.node.total_cost);
            assert!(wide_range().contains(outcome.node.mv));
        }
    }
}

#[test]
fn zero_steps_keep_the_start_point() {
    let pyramid = random_pyramid();
    let planes = pyramid.level(0).unwrap().subpel().unwrap();
    let src = prediction(&pyramid, MotionVector::new(1, 3));
    let model = MvCostModel::new(4 << 8, 8);
    let eval = evaluator(&src, &model);
    let start = eval.node(PartId::PartNxNTopLeft, MotionVector::ZERO, 0, 0);
    let mut ctx = MvRefineContext::new();
    let mut scratch = SubpelScratch::new();

    let outcome = SubpelRefiner::new(0, 0).refine(
        &eval,
        &planes,
        &wide_range(),
        PartId::PartNxNTopLeft,
        &start,
        &mut ctx,
        &mut scratch,
    );
    assert_eq!(outcome.node.mv, MotionVector::ZERO);
    assert_eq!(outcome.node.sdi, 0);
    assert_eq!(outcome.fullpel_cost, outcome.quarterpel_cost);
}

#[test]
fn refinement_stays_inside_the_range() {
    let pyramid = random_pyramid();
    let planes = pyramid.level(0).unwrap().subpel().unwrap();
    let src = prediction(&pyramid, MotionVector::new(7, 0));
    let model = MvCostModel::new(4 << 8, 8);
    let eval = evaluator(&src, &model);
    let start = eval.node(PartId::Part2Nx2N, MotionVector::new(4, 0), 0, 0);
    let range = MvRange::new(MotionVector::new(-5, -5), MotionVector::new(5, 5));
    let mut ctx = MvRefineContext::new();
    let mut scratch = SubpelScratch::new();

    let outcome = SubpelRefiner::new(4, 4).refine(
        &eval,
        &planes,
        &range,
        PartId::Part2Nx2N,
        &start,
        &mut ctx,
        &mut scratch,
    );
    assert!(range.contains(outcome.node.mv));
    assert!(outcome.node.mv.x <= 4);
}

#[test]
fn context_keeps_distinct_runner_up() {
    let mut ctx = MvRefineContext::new();
    let entry = |cost, x| RefineEntry {
        total_cost: cost,
        mv_cost: 0,
        mv: MotionVector::new(x, 0),
        ref_idx: 0,
    };
    ctx.offer(PartId::Part2NxNTop, entry(50, 1));
    ctx.offer(PartId::Part2NxNTop, entry(40, 1));
    assert_eq!(ctx.best(PartId::Part2NxNTop).total_cost, 40);
    assert_eq!(*ctx.second(PartId::Part2NxNTop), RefineEntry::EMPTY);

    ctx.offer(PartId::Part2NxNTop, entry(45, 2));
    ctx.offer(PartId::Part2NxNTop, entry(30, 3));
    assert_eq!(ctx.best(PartId::Part2NxNTop).mv.x, 3);
    assert_eq!(ctx.second(PartId::Part2NxNTop).mv.x, 1);

    ctx.reset();
    assert_eq!(*ctx.best(PartId::Part2NxNTop), RefineEntry::EMPTY);
}

#[test]
fn runner_up_becomes_a_refined_node() {
    let part = PartId::PartNxNBottomRight;
    let mut ctx = MvRefineContext::new();
    let entry = |cost, x| RefineEntry {
        total_cost: cost,
        mv_cost: 4,
        mv: MotionVector::new(x, 2),
        ref_idx: 1,
    };
    ctx.offer(part, entry(40, 1));
    assert!(ctx.second_node(part).is_none());

    ctx.offer(part, entry(30, 3));
    ctx.fullpel_distortion[part.index()] = 50;
    let node = ctx.second_node(part).unwrap();
    assert_eq!(node.mv, MotionVector::new(1, 2));
    assert_eq!(node.ref_idx, 1);
    assert_eq!(node.part_id, part);
    assert_eq!((node.distortion, node.mv_cost, node.total_cost), (36, 4, 40));
    assert!(node.is_valid && node.is_subpel_done);
    assert_eq!(node.sdi, 14);
}

#[test]
fn scratch_reuses_scored_predictions() {
    let pyramid = random_pyramid();
    let planes = pyramid.level(0).unwrap().subpel().unwrap();
    let src = prediction(&pyramid, MotionVector::ZERO);
    let model = MvCostModel::new(4 << 8, 8);
    let eval = evaluator(&src, &model);
    let mut scratch = SubpelScratch::new();

    let first = scratch.distortions(&eval, &planes, MotionVector::new(2, 2));
    let again = scratch.distortions(&eval, &planes, MotionVector::new(2, 2));
    assert_eq!(first, again);
    assert_eq!(scratch.cache.len(), 1);
    let zero = scratch.distortions(&eval, &planes, MotionVector::ZERO);
    assert!(zero.iter().all(|&d| d == 0));
    scratch.clear();
    assert!(scratch.cache.is_empty());
}
