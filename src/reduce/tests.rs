#![allow(clippy::unwrap_used, reason = "allow in test files")]

use std::num::NonZeroUsize;

use super::reduce_average;

fn nz(v: usize) -> NonZeroUsize {
    NonZeroUsize::new(v).unwrap()
}

#[test]
fn reduce_average_u8_basic() {
    let src = [10u8, 20, 30, 40, 50, 60, 70, 80];
    let mut dest = [0u8; 2];
    reduce_average(&mut dest, &src, nz(2), nz(4), nz(2), nz(1));
    // (10+20+50+60+2)/4 = 35, (30+40+70+80+2)/4 = 55
    assert_eq!(dest, [35, 55]);
}

#[test]
fn reduce_average_rounds_to_nearest() {
    let src = [0u8, 0, 1, 1];
    let mut dest = [0u8; 1];
    reduce_average(&mut dest, &src, nz(1), nz(2), nz(1), nz(1));
    assert_eq!(dest, [1]);

    let src = [0u8, 0, 0, 1];
    reduce_average(&mut dest, &src, nz(1), nz(2), nz(1), nz(1));
    assert_eq!(dest, [0]);
}

#[test]
fn reduce_average_u16_max_values() {
    let src = [u16::MAX; 16];
    let mut dest = [0u16; 4];
    reduce_average(&mut dest, &src, nz(2), nz(4), nz(2), nz(2));
    assert_eq!(dest, [u16::MAX; 4]);
}

#[test]
fn reduce_average_respects_pitch() {
    // 4x4 source with pitch 5, 2x2 dest with pitch 3
    let src = [
        1u8, 1, 9, 9, 200, //
        1, 1, 9, 9, 200, //
        5, 5, 7, 7, 200, //
        5, 5, 7, 7, 200,
    ];
    let mut dest = [0xAAu8; 6];
    reduce_average(&mut dest, &src, nz(3), nz(5), nz(2), nz(2));
    assert_eq!(dest, [1, 9, 0xAA, 5, 7, 0xAA]);
}
