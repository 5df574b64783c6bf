#![allow(clippy::unwrap_used, reason = "allow in test files")]

use std::sync::Mutex;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro128StarStar;

use super::*;
use crate::{cu_tree::MergeState, geometry::PartType, params::QualityPreset, sync::NoopSync};

fn nz(v: usize) -> NonZeroUsize {
    NonZeroUsize::new(v).unwrap()
}

fn flat_pyramid(config: &MeConfig, w: usize, h: usize, value: u8, subpel: bool) -> FramePyramid<u8> {
    let src = vec![value; w * h];
    FramePyramid::build(&src, nz(w), nz(w), nz(h), config.num_layers, config.pad, subpel).unwrap()
}

fn reference<'a>(
    pyramid: &'a FramePyramid<u8>,
    poc: i32,
    list: RefList,
    list_idx: u8,
) -> ReferenceDescriptor<'a, u8> {
    ReferenceDescriptor {
        poc,
        list,
        list_idx,
        weight: WeightParams::default(),
        pyramid,
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<(bool, usize, usize)>>,
}

impl RowSync for Recorder {
    fn wait(&self, layer: usize, row: usize) {
        self.events.lock().unwrap().push((false, layer, row));
    }

    fn signal(&self, layer: usize, row: usize) {
        self.events.lock().unwrap().push((true, layer, row));
    }
}

#[test]
fn new_rejects_bad_dimensions() {
    let config = MeConfig::from_preset(QualityPreset::Pristine);
    assert!(HmeEngine::<u8>::new(config.clone(), 0, 64).is_err());
    assert!(HmeEngine::<u8>::new(config.clone(), 60, 64).is_err());
    assert!(HmeEngine::<u8>::new(config.clone(), 64, 12).is_err());
    // three layers need at least 32 pixels on each side
    assert!(HmeEngine::<u8>::new(config.clone(), 64, 16).is_err());
    assert!(HmeEngine::<u8>::new(config, 64, 32).is_ok());
}

#[test]
fn new_rejects_invalid_config() {
    let mut config = MeConfig::from_preset(QualityPreset::Medium);
    config.max_results = 0;
    assert!(HmeEngine::<u8>::new(config, 64, 64).is_err());

    let mut config = MeConfig::from_preset(QualityPreset::Medium);
    config.pad = 16;
    assert!(HmeEngine::<u8>::new(config, 64, 64).is_err());
}

#[test]
fn new_sets_up_one_layer_per_level() {
    let engine = HmeEngine::<u8>::new(MeConfig::from_preset(QualityPreset::Pristine), 128, 64)
        .unwrap();
    assert_eq!(engine.width(), 128);
    assert_eq!(engine.height(), 64);
    let base = engine.layer(0).unwrap();
    assert_eq!((base.width, base.height, base.block_size), (128, 64, 16));
    let coarsest = engine.layer(2).unwrap();
    assert_eq!((coarsest.width, coarsest.height, coarsest.block_size), (32, 16, 8));
    assert!(engine.layer(3).is_none());
    assert!(engine.snapshot(0).is_none());
}

#[test]
fn flat_frame_finds_zero_motion_and_merges_to_one_leaf() {
    let config = MeConfig::from_preset(QualityPreset::Pristine);
    let mut engine = HmeEngine::<u8>::new(config.clone(), 64, 64).unwrap();
    let cur = flat_pyramid(&config, 64, 64, 100, false);
    let ref0 = flat_pyramid(&config, 64, 64, 100, true);
    let refs = [reference(&ref0, 0, RefList::L0, 0)];
    let input = FrameMeInput {
        poc: 1,
        pyramid: &cur,
        refs: &refs,
    };
    let result = engine.process_frame(&input, &NoopSync).unwrap();

    // the last searched block is still in the worker
    for part in PartId::ALL {
        let winner = engine.worker.results.best_overall(part).unwrap();
        assert_eq!(winner.kind, PredKind::L0, "{part:?}");
        assert_eq!(winner.cost, 8, "{part:?}");
        assert_eq!(winner.l0.mv, MotionVector::ZERO, "{part:?}");
    }

    assert_eq!(result.poc, 1);
    assert_eq!((result.ctb_cols, result.ctb_rows), (1, 1));
    let tree = result.ctb(0, 0).unwrap();
    let leaves = tree.leaves();
    assert_eq!(leaves.len(), 1);
    let root = leaves[0];
    assert_eq!(root.size, 64);
    assert_eq!(root.state, MergeState::MergeAccepted);
    assert_eq!(root.part_type, Some(PartType::Size2Nx2N));
    assert_eq!(root.winners[0].l0.mv, MotionVector::ZERO);
    assert!(result.ctb(1, 0).is_none());
}

#[test]
fn average_of_two_lists_beats_either_list() {
    let config = MeConfig::from_preset(QualityPreset::Pristine);
    let mut engine = HmeEngine::<u8>::new(config.clone(), 64, 64).unwrap();
    let cur = flat_pyramid(&config, 64, 64, 130, false);
    let dark = flat_pyramid(&config, 64, 64, 60, true);
    let bright = flat_pyramid(&config, 64, 64, 200, true);
    let refs = [
        reference(&dark, 0, RefList::L0, 0),
        reference(&bright, 2, RefList::L1, 0),
    ];
    let input = FrameMeInput {
        poc: 1,
        pyramid: &cur,
        refs: &refs,
    };
    engine.process_frame(&input, &NoopSync).unwrap();

    for part in PartId::ALL {
        let winner = engine.worker.results.best_overall(part).unwrap();
        assert_eq!(winner.kind, PredKind::Bi, "{part:?}");
        assert_eq!(winner.cost, 16, "{part:?}");
    }
}

#[test]
fn bipred_is_scored_against_the_unweighted_frame() {
    let config = MeConfig::from_preset(QualityPreset::Pristine);
    let mut engine = HmeEngine::<u8>::new(config.clone(), 64, 64).unwrap();
    let cur = flat_pyramid(&config, 64, 64, 100, false);
    let darker = flat_pyramid(&config, 64, 64, 90, true);
    let weight = WeightParams {
        offset: 10,
        ..WeightParams::default()
    };
    let refs = [
        ReferenceDescriptor {
            weight,
            ..reference(&darker, 0, RefList::L0, 0)
        },
        ReferenceDescriptor {
            weight,
            ..reference(&darker, 2, RefList::L1, 0)
        },
    ];
    let input = FrameMeInput {
        poc: 1,
        pyramid: &cur,
        refs: &refs,
    };
    engine.process_frame(&input, &NoopSync).unwrap();

    for part in PartId::ALL {
        // each list matches its inverse-weighted view exactly, while the
        // plain average of the references stays 10 below the frame
        let winner = engine.worker.results.best_overall(part).unwrap();
        assert_eq!(winner.kind, PredKind::L0, "{part:?}");
        assert_eq!(winner.cost, 8, "{part:?}");
    }
}

#[test]
fn bipred_disabled_keeps_single_list() {
    let mut config = MeConfig::from_preset(QualityPreset::Pristine);
    config.bipred = false;
    let mut engine = HmeEngine::<u8>::new(config.clone(), 64, 64).unwrap();
    let cur = flat_pyramid(&config, 64, 64, 130, false);
    let dark = flat_pyramid(&config, 64, 64, 60, true);
    let bright = flat_pyramid(&config, 64, 64, 200, true);
    let refs = [
        reference(&dark, 0, RefList::L0, 0),
        reference(&bright, 2, RefList::L1, 0),
    ];
    let input = FrameMeInput {
        poc: 1,
        pyramid: &cur,
        refs: &refs,
    };
    engine.process_frame(&input, &NoopSync).unwrap();
    let winner = engine.worker.results.best_overall(PartId::Part2Nx2N).unwrap();
    // 60 is closer to 130 than 200
    assert_eq!(winner.kind, PredKind::L0);
}

#[test]
fn mismatched_input_is_rejected() {
    let config = MeConfig::from_preset(QualityPreset::Pristine);
    let mut engine = HmeEngine::<u8>::new(config.clone(), 64, 64).unwrap();
    let cur = flat_pyramid(&config, 128, 64, 100, false);
    let ref0 = flat_pyramid(&config, 64, 64, 100, true);
    let refs = [reference(&ref0, 0, RefList::L0, 0)];
    let input = FrameMeInput {
        poc: 1,
        pyramid: &cur,
        refs: &refs,
    };
    let err = engine.process_frame(&input, &NoopSync).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<InvariantViolation>(),
        Some(InvariantViolation::DimensionMismatch { found_width: 128, .. })
    ));
}

#[test]
fn reference_needs_halfpel_planes() {
    let config = MeConfig::from_preset(QualityPreset::Pristine);
    let mut engine = HmeEngine::<u8>::new(config.clone(), 64, 64).unwrap();
    let cur = flat_pyramid(&config, 64, 64, 100, false);
    let ref0 = flat_pyramid(&config, 64, 64, 100, false);
    let refs = [reference(&ref0, 0, RefList::L0, 0)];
    let input = FrameMeInput {
        poc: 1,
        pyramid: &cur,
        refs: &refs,
    };
    let err = engine.process_frame(&input, &NoopSync).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<InvariantViolation>(),
        Some(InvariantViolation::LayerMismatch { level: 0, .. })
    ));
}

#[test]
fn reference_index_out_of_range() {
    let config = MeConfig::from_preset(QualityPreset::Pristine);
    let mut engine = HmeEngine::<u8>::new(config.clone(), 64, 64).unwrap();
    let cur = flat_pyramid(&config, 64, 64, 100, false);
    let ref0 = flat_pyramid(&config, 64, 64, 100, true);
    let refs = [reference(&ref0, 0, RefList::L0, MAX_REFS_PER_LIST as u8)];
    let input = FrameMeInput {
        poc: 1,
        pyramid: &cur,
        refs: &refs,
    };
    let err = engine.process_frame(&input, &NoopSync).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<InvariantViolation>(),
        Some(InvariantViolation::ReferenceOutOfRange { .. })
    ));
}

#[test]
fn duplicate_reference_is_rejected() {
    let config = MeConfig::from_preset(QualityPreset::Pristine);
    let mut engine = HmeEngine::<u8>::new(config.clone(), 64, 64).unwrap();
    let cur = flat_pyramid(&config, 64, 64, 100, false);
    let ref0 = flat_pyramid(&config, 64, 64, 100, true);
    let refs = [
        reference(&ref0, 0, RefList::L0, 0),
        reference(&ref0, -1, RefList::L0, 0),
    ];
    let input = FrameMeInput {
        poc: 1,
        pyramid: &cur,
        refs: &refs,
    };
    assert!(engine.process_frame(&input, &NoopSync).is_err());
}

#[test]
fn invalid_weight_is_rejected() {
    let config = MeConfig::from_preset(QualityPreset::Pristine);
    let mut engine = HmeEngine::<u8>::new(config.clone(), 64, 64).unwrap();
    let cur = flat_pyramid(&config, 64, 64, 100, false);
    let ref0 = flat_pyramid(&config, 64, 64, 100, true);
    let mut desc = reference(&ref0, 0, RefList::L0, 0);
    desc.weight.weight = 0;
    let refs = [desc];
    let input = FrameMeInput {
        poc: 1,
        pyramid: &cur,
        refs: &refs,
    };
    assert!(engine.process_frame(&input, &NoopSync).is_err());
}

#[test]
fn every_row_of_every_layer_is_synchronized() {
    let config = MeConfig::from_preset(QualityPreset::Pristine);
    let mut engine = HmeEngine::<u8>::new(config.clone(), 64, 64).unwrap();
    let cur = flat_pyramid(&config, 64, 64, 100, false);
    let ref0 = flat_pyramid(&config, 64, 64, 100, true);
    let refs = [reference(&ref0, 0, RefList::L0, 0)];
    let input = FrameMeInput {
        poc: 1,
        pyramid: &cur,
        refs: &refs,
    };
    let recorder = Recorder::default();
    engine.process_frame(&input, &recorder).unwrap();

    let events = recorder.events.into_inner().unwrap();
    // level 2 has 2 block rows, level 1 has 4, the encode layer one CTB row
    let expected: Vec<(bool, usize, usize)> = [(2, 2), (1, 4), (0, 1)]
        .into_iter()
        .flat_map(|(layer, rows)| {
            (0..rows).flat_map(move |row| [(false, layer, row), (true, layer, row)])
        })
        .collect();
    assert_eq!(events, expected);
}

#[test]
fn snapshots_carry_frame_and_reference_pocs() {
    let config = MeConfig::from_preset(QualityPreset::Pristine);
    let mut engine = HmeEngine::<u8>::new(config.clone(), 64, 64).unwrap();
    let cur = flat_pyramid(&config, 64, 64, 100, false);
    let ref0 = flat_pyramid(&config, 64, 64, 100, true);
    let ref1 = flat_pyramid(&config, 64, 64, 100, true);
    let refs = [
        reference(&ref0, 4, RefList::L0, 0),
        reference(&ref1, 8, RefList::L1, 0),
    ];
    let input = FrameMeInput {
        poc: 6,
        pyramid: &cur,
        refs: &refs,
    };
    engine.process_frame(&input, &NoopSync).unwrap();

    for level in 0..config.num_layers {
        let snapshot = engine.snapshot(level).unwrap();
        assert_eq!(snapshot.poc, 6);
        assert_eq!(snapshot.ref_pocs[ref_slot(RefList::L0, 0).unwrap()], Some(4));
        assert_eq!(snapshot.ref_pocs[ref_slot(RefList::L1, 0).unwrap()], Some(8));
        assert_eq!(snapshot.ref_pocs[ref_slot(RefList::L0, 1).unwrap()], None);
        let bank = &snapshot.bank;
        assert!(bank.is_done(0, 0));
        let entry = bank.entry(0, 0, ref_slot(RefList::L0, 0).unwrap());
        assert_eq!(entry.best[0].mv, MotionVector::ZERO);
    }
}

#[test]
fn partial_ctbs_cover_the_picture() {
    let config = MeConfig::from_preset(QualityPreset::Medium);
    let mut engine = HmeEngine::<u8>::new(config.clone(), 96, 64).unwrap();
    let cur = flat_pyramid(&config, 96, 64, 100, false);
    let ref0 = flat_pyramid(&config, 96, 64, 100, true);
    let refs = [reference(&ref0, 0, RefList::L0, 0)];
    let input = FrameMeInput {
        poc: 1,
        pyramid: &cur,
        refs: &refs,
    };
    let result = engine.process_frame(&input, &NoopSync).unwrap();
    assert_eq!((result.ctb_cols, result.ctb_rows), (2, 1));

    let covered: usize = result
        .ctbs
        .iter()
        .flat_map(CuTree::leaves)
        .map(|leaf| {
            assert!(leaf.is_valid);
            assert!(leaf.x + leaf.size <= 96 && leaf.y + leaf.size <= 64);
            leaf.size * leaf.size
        })
        .sum();
    assert_eq!(covered, 96 * 64);
    assert!(!result.ctbs[0].root().is_split);
    // a CTB that sticks out of the picture cannot stay whole
    assert!(result.ctbs[1].root().is_split);
}

#[test]
fn frame_without_references_splits_to_empty_leaves() {
    let config = MeConfig::from_preset(QualityPreset::Medium);
    let mut engine = HmeEngine::<u8>::new(config.clone(), 64, 64).unwrap();
    let cur = flat_pyramid(&config, 64, 64, 100, false);
    let input = FrameMeInput {
        poc: 0,
        pyramid: &cur,
        refs: &[],
    };
    let result = engine.process_frame(&input, &NoopSync).unwrap();
    let leaves = result.ctbs[0].leaves();
    assert_eq!(leaves.len(), 64);
    assert!(leaves.iter().all(|l| l.size == 8 && l.winners.is_empty()));
    assert_eq!(engine.snapshot(0).unwrap().poc, 0);
}

#[test]
fn refined_results_stay_distinct() {
    let config = MeConfig::from_preset(QualityPreset::Pristine);
    assert_eq!(config.max_results, 2);
    let mut engine = HmeEngine::<u8>::new(config.clone(), 64, 64).unwrap();
    let mut rng = Xoshiro128StarStar::from_seed(*b"deadbeeflolcakes");
    let texture: Vec<u8> = (0..64 * 64).map(|_| rng.random()).collect();
    // half a pixel to the right of the reference
    let shifted: Vec<u8> = (0..64 * 64)
        .map(|i| {
            let (x, y) = (i % 64, i / 64);
            let next = texture[y * 64 + (x + 1).min(63)];
            ((u16::from(texture[i]) + u16::from(next) + 1) / 2) as u8
        })
        .collect();
    let build = |src: &[u8], subpel| {
        FramePyramid::build(src, nz(64), nz(64), nz(64), config.num_layers, config.pad, subpel)
            .unwrap()
    };
    let cur = build(&shifted, false);
    let ref0 = build(&texture, true);
    let refs = [reference(&ref0, 0, RefList::L0, 0)];
    let input = FrameMeInput {
        poc: 1,
        pyramid: &cur,
        refs: &refs,
    };
    engine.process_frame(&input, &NoopSync).unwrap();

    for part in PartId::ALL {
        let results = engine.worker.results.results(RefList::L0, part);
        assert!(!results.is_empty(), "{part:?}");
        assert!(results.windows(2).all(|w| w[0].total_cost <= w[1].total_cost));
        for (i, a) in results.iter().enumerate() {
            for b in &results[i + 1..] {
                assert!(a.mv != b.mv || a.ref_idx != b.ref_idx, "{part:?}: {a:?} {b:?}");
            }
        }
    }
}
