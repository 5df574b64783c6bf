#![allow(clippy::unwrap_used, reason = "allow in test files")]

use std::num::NonZeroUsize;

use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro128StarStar;

use super::*;
use crate::{kernels::RustKernels, params::PartitionMask};

#[derive(Debug, Clone)]
struct Grid(SubBlockGrid);

impl Arbitrary for Grid {
    fn arbitrary(g: &mut Gen) -> Self {
        let mut grid = [0; 16];
        for d in &mut grid {
            *d = u32::arbitrary(g) % 100_000;
        }
        Self(grid)
    }
}

#[quickcheck]
fn combine_matches_direct_sums(grid: Grid) -> bool {
    let costs = combine(&grid.0);
    verify_partition_costs(&grid.0, &costs).is_ok()
}

#[quickcheck]
fn every_split_adds_up_to_the_whole(grid: Grid) -> bool {
    let costs = combine(&grid.0);
    crate::geometry::PartType::ALL.iter().all(|t| {
        t.parts().iter().map(|p| costs[p.index()]).sum::<u32>() == costs[0]
    })
}

#[test]
fn combine_bands() {
    let mut grid = [0; 16];
    for row in 0..4 {
        for col in 0..4 {
            grid[sub_block_index(col, row)] = (row * 4 + col) as u32;
        }
    }
    let costs = combine(&grid);
    assert_eq!(costs[PartId::Part2Nx2N.index()], 120);
    assert_eq!(costs[PartId::Part2NxnUTop.index()], 6);
    assert_eq!(costs[PartId::Part2NxnDBottom.index()], 12 + 13 + 14 + 15);
    assert_eq!(costs[PartId::PartNLx2NLeft.index()], 24);
    assert_eq!(costs[PartId::PartNRx2NRight.index()], 3 + 7 + 11 + 15);
    assert_eq!(costs[PartId::PartNxNBottomRight.index()], 10 + 11 + 14 + 15);
}

#[test]
fn combine_saturates_without_wrapping() {
    let grid = [u32::MAX / 2; 16];
    let costs = combine(&grid);
    assert_eq!(costs[PartId::Part2Nx2N.index()], u32::MAX);
    assert_eq!(costs[PartId::PartNxNTopLeft.index()], u32::MAX);
}

#[test]
fn verify_reports_the_broken_partition() {
    let grid = [1; 16];
    let mut costs = combine(&grid);
    costs[PartId::PartNx2NRight.index()] += 1;
    assert_eq!(
        verify_partition_costs(&grid, &costs),
        Err(InvariantViolation::PartitionSum {
            part: PartId::PartNx2NRight,
            expected: 8,
            actual: 9,
        })
    );
}

#[test]
fn exp_golomb_lengths() {
    assert_eq!(mv_component_bits(0), 1);
    assert_eq!(mv_component_bits(1), 4);
    assert_eq!(mv_component_bits(-1), 4);
    assert_eq!(mv_component_bits(2), 4);
    assert_eq!(mv_component_bits(3), 6);
    assert_eq!(mv_component_bits(-7), 8);
}

#[test]
fn ref_idx_truncated_unary() {
    assert_eq!(ref_idx_bits(0, 1), 0);
    assert_eq!(ref_idx_bits(0, 2), 1);
    assert_eq!(ref_idx_bits(1, 2), 1);
    assert_eq!(ref_idx_bits(0, 3), 1);
    assert_eq!(ref_idx_bits(1, 3), 2);
    assert_eq!(ref_idx_bits(2, 3), 2);
}

#[test]
fn mv_cost_of_zero_vector() {
    let model = MvCostModel::new(4 << 8, 8);
    // two 1-bit components at lambda 4
    assert_eq!(
        model.cost(MotionVector::ZERO, MotionVector::ZERO, RefList::L0, 0),
        8
    );
}

#[test]
fn mv_cost_grows_with_distance_and_refs() {
    let mut model = MvCostModel::new(4 << 8, 8);
    let near = model.cost(MotionVector::new(4, 0), MotionVector::ZERO, RefList::L0, 0);
    let far = model.cost(MotionVector::new(64, 0), MotionVector::ZERO, RefList::L0, 0);
    assert!(near < far);
    model.set_num_refs(RefList::L0, 3);
    let with_ref = model.cost(MotionVector::new(4, 0), MotionVector::ZERO, RefList::L0, 1);
    assert_eq!(with_ref, near + 8);
    // the other list is unaffected
    assert_eq!(
        model.cost(MotionVector::new(4, 0), MotionVector::ZERO, RefList::L1, 1),
        near
    );
}

#[test]
fn mv_cost_saturates() {
    let model = MvCostModel::new(u32::MAX, 1);
    assert_eq!(
        model.cost(MotionVector::new(4000, -4000), MotionVector::ZERO, RefList::L1, 0),
        i16::MAX as u32
    );
}

#[test]
fn fill_around_skips_points_outside_range() {
    let range = MvRange::new(MotionVector::new(-5, -5), MotionVector::new(5, 5));
    let mut grid = GridContext::new();
    let parts = PartSet::single(PartId::Part2Nx2N);
    grid.fill_around(MotionVector::ZERO, 0, 4, parts, &range);
    assert_eq!(grid.len(), 9);
    assert_eq!(grid.points()[0].mv, MotionVector::ZERO);

    grid.fill_around(MotionVector::new(4, 4), 0, 4, parts, &range);
    let mvs: Vec<_> = grid.points().iter().map(|p| p.mv).collect();
    assert_eq!(
        mvs,
        [
            MotionVector::new(4, 4),
            MotionVector::new(0, 4),
            MotionVector::new(4, 0),
            MotionVector::new(0, 0),
        ]
    );

    grid.retain(|p| p.mv != MotionVector::ZERO);
    assert_eq!(grid.len(), 3);
}

fn nz(v: usize) -> NonZeroUsize {
    NonZeroUsize::new(v).unwrap()
}

#[test]
fn evaluator_finds_true_displacement() {
    let mut rng = Xoshiro128StarStar::from_seed(*b"deadbeeflolcakes");
    let mut pixels = vec![0u8; 48 * 48];
    pixels.iter_mut().for_each(|p| *p = rng.random());
    let plane = Plane::from_slice(&pixels, nz(48), nz(48), nz(48), 16);

    // the source block at (16, 16) equals the reference at (19, 14)
    let mut src = vec![0u8; 256];
    for y in 0..16 {
        for x in 0..16 {
            src[y * 16 + x] = plane.pixel(19 + x as isize, 14 + y as isize);
        }
    }

    let model = MvCostModel::new(4 << 8, 8);
    let eval = CostEvaluator {
        kernels: &RustKernels,
        src: &src,
        src_pitch: nz(16),
        block_x: 16,
        block_y: 16,
        block_size: 16,
        metric: CostMetric::Sad,
        mv_cost: &model,
        predictor: MotionVector::ZERO,
        list: RefList::L0,
    };
    let range = MvRange::new(MotionVector::new(-33, -33), MotionVector::new(33, 33));
    let parts = PartSet::from_mask(PartitionMask::all());
    let mut bank = ResultBank::new(2);
    let mut grid = GridContext::new();
    for cy in [-2i16, 1] {
        for cx in [-2i16, 1, 4] {
            grid.fill_around(MotionVector::from_fullpel(cx, cy), 0, 4, parts, &range);
            eval.evaluate_grid(&grid, &plane, &mut bank).unwrap();
        }
    }

    let target = MotionVector::from_fullpel(3, -2);
    for part in PartId::ALL {
        let best = bank.best(RefList::L0, part).unwrap();
        assert_eq!(best.mv, target, "{part:?}");
        assert_eq!(best.distortion, 0);
        assert_eq!(best.total_cost, best.mv_cost);
    }
}

#[test]
fn evaluator_on_flat_content_prefers_zero_vector() {
    let plane = Plane::from_slice(&[50u8; 64 * 64], nz(64), nz(64), nz(64), 16);
    let src = [50u8; 256];
    let model = MvCostModel::new(4 << 8, 8);
    let eval = CostEvaluator {
        kernels: &RustKernels,
        src: &src,
        src_pitch: nz(16),
        block_x: 16,
        block_y: 16,
        block_size: 16,
        metric: CostMetric::Satd,
        mv_cost: &model,
        predictor: MotionVector::ZERO,
        list: RefList::L0,
    };
    let range = MvRange::new(MotionVector::new(-9, -9), MotionVector::new(9, 9));
    let mut grid = GridContext::new();
    grid.fill_around(
        MotionVector::ZERO,
        0,
        4,
        PartSet::from_mask(PartitionMask::all()),
        &range,
    );
    let mut bank = ResultBank::new(1);
    eval.evaluate_grid(&grid, &plane, &mut bank).unwrap();
    for part in PartId::ALL {
        let best = bank.best(RefList::L0, part).unwrap();
        assert_eq!(best.mv, MotionVector::ZERO);
        assert_eq!(best.total_cost, 8);
    }
}
