#![allow(clippy::unwrap_used, reason = "allow in test files")]

use super::*;

fn node(x: i16, y: i16, ref_idx: i8) -> SearchNode {
    SearchNode::new(MotionVector::new(x, y), ref_idx, PartId::Part2Nx2N).with_cost(10, 2)
}

fn entry_with(best: SearchNode) -> BankEntry {
    BankEntry {
        best: [best, SearchNode::unavailable(-1, PartId::Part2Nx2N)],
        ..BankEntry::default()
    }
}

#[test]
fn ref_slots_are_list_major() {
    assert_eq!(ref_slot(RefList::L0, 0).unwrap(), 0);
    assert_eq!(ref_slot(RefList::L0, 3).unwrap(), 3);
    assert_eq!(ref_slot(RefList::L1, 0).unwrap(), MAX_REFS_PER_LIST);
    assert_eq!(
        ref_slot(RefList::L1, 4).unwrap_err(),
        InvariantViolation::ReferenceOutOfRange {
            ref_idx: 4,
            max: MAX_REFS_PER_LIST
        }
    );
}

#[test]
fn grid_covers_partial_blocks() {
    let layer = LayerContext::new(0, 72, 40, 16);
    assert_eq!((layer.cols(), layer.rows()), (5, 3));
}

#[test]
fn neighbors_need_to_be_searched_first() {
    let mut bank = MvBank::new(3, 2);
    bank.store(1, 0, 2, entry_with(node(4, 4, 2)));
    assert!(bank.neighbor(1, 0, 2).is_none());
    bank.mark_done(1, 0);
    assert_eq!(bank.neighbor(1, 0, 2).unwrap().best[0].mv, MotionVector::new(4, 4));
    assert!(bank.neighbor(-1, 0, 2).is_none());
    assert!(bank.neighbor(3, 0, 2).is_none());
    assert!(bank.neighbor(0, 2, 2).is_none());
}

#[test]
fn commit_moves_bank_into_snapshot() {
    let mut layer = LayerContext::new(1, 32, 32, 8);
    assert!(layer.previous().is_none());

    layer.begin_frame();
    layer.current_mut().store(2, 3, 0, entry_with(node(8, -4, 0)));
    layer.current_mut().mark_done(2, 3);
    let mut ref_pocs = [None; NUM_REF_SLOTS];
    ref_pocs[0] = Some(3);
    layer.commit(4, ref_pocs);

    let snap = layer.previous().unwrap();
    assert_eq!(snap.poc, 4);
    assert_eq!(snap.ref_pocs[0], Some(3));
    assert_eq!(snap.bank.entry(2, 3, 0).best[0].mv, MotionVector::new(8, -4));
    assert!(!layer.current().entry(2, 3, 0).best[0].is_valid);
    assert!(!layer.current().is_done(2, 3));

    // the next commit overwrites the snapshot
    layer.begin_frame();
    layer.commit(5, [None; NUM_REF_SLOTS]);
    let snap = layer.previous().unwrap();
    assert_eq!(snap.poc, 5);
    assert!(!snap.bank.entry(2, 3, 0).best[0].is_valid);
}

#[test]
fn global_mvs_rank_by_frequency() {
    let mut layer = LayerContext::new(2, 32, 32, 8);
    layer.begin_frame();
    let picks = [(4, 0), (8, 8), (8, 8), (4, 0), (8, 8), (-4, 0), (0, 0)];
    for (i, &(x, y)) in picks.iter().enumerate() {
        layer
            .current_mut()
            .store(i % 4, i / 4, 1, entry_with(node(x, y, 1)));
    }
    layer.derive_global_mvs();

    let global = layer.global_mv(1);
    assert_eq!(global.thick, Some(MotionVector::new(8, 8)));
    assert_eq!(global.thin, Some(MotionVector::new(4, 0)));
    assert_eq!(layer.global_mv(0), GlobalMv::default());
}

#[test]
fn global_mv_ties_prefer_first_seen() {
    let mut layer = LayerContext::new(2, 16, 16, 8);
    layer.begin_frame();
    layer.current_mut().store(0, 0, 0, entry_with(node(12, 0, 0)));
    layer.current_mut().store(1, 0, 0, entry_with(node(0, 12, 0)));
    layer.derive_global_mvs();
    let global = layer.global_mv(0);
    assert_eq!(global.thick, Some(MotionVector::new(12, 0)));
    assert_eq!(global.thin, Some(MotionVector::new(0, 12)));
}
