
use std::{
    num::NonZeroUsize,
    ops::{Add, Sub},
};

use crate::util::Pixel;

/// Sum of absolute Hadamard-transformed differences, accumulated over 4x4
/// tiles. Both dimensions must be multiples of 4.
#[must_use]
pub fn get_satd<T: Pixel>(
    width: NonZeroUsize,
    height: NonZeroUsize,
    src: &[T],
    src_pitch: NonZeroUsize,
    ref_: &[T],
    ref_pitch: NonZeroUsize,
) -> u64 {
    get_satd_with(width, height, src, src_pitch, ref_, ref_pitch, hadamard4x4)
}

/// [`get_satd`] with the 4x4 transform supplied by the caller.
#[must_use]
pub fn get_satd_with<T: Pixel, F: Fn(&mut [i32; 16])>(
    width: NonZeroUsize,
    height: NonZeroUsize,
    src: &[T],
    src_pitch: NonZeroUsize,
    ref_: &[T],
    ref_pitch: NonZeroUsize,
    transform: F,
) -> u64 {
    debug_assert!(width.get() % 4 == 0 && height.get() % 4 == 0);

    let mut sum = 0;
    for y in (0..height.get()).step_by(4) {
        for x in (0..width.get()).step_by(4) {
            sum += satd_4x4(
                &src[y * src_pitch.get() + x..],
                src_pitch,
                &ref_[y * ref_pitch.get() + x..],
                ref_pitch,
                &transform,
            );
        }
    }
    sum
}

#[must_use]
fn satd_4x4<T: Pixel, F: Fn(&mut [i32; 16])>(
    src: &[T],
    src_pitch: NonZeroUsize,
    ref_: &[T],
    ref_pitch: NonZeroUsize,
    transform: &F,
) -> u64 {
    let mut block = [0i32; 16];
    for i in 0..4 {
        let src_row = &src[i * src_pitch.get()..][..4];
        let ref_row = &ref_[i * ref_pitch.get()..][..4];
        for j in 0..4 {
            let s: i32 = src_row[j].into();
            let r: i32 = ref_row[j].into();
            block[i * 4 + j] = s - r;
        }
    }

    transform(&mut block);
    let sum: u64 = block.iter().map(|c| u64::from(c.unsigned_abs())).sum();
    sum >> 1
}

/// In-place 2D 4x4 Walsh-Hadamard transform of a row-major block.
pub fn hadamard4x4(block: &mut [i32; 16]) {
    for row in block.chunks_exact_mut(4) {
        let [s0, s1, s2, s3] = [row[0], row[1], row[2], row[3]];
        let [d0, d1, d2, d3] = row else {
            unreachable!()
        };
        hadamard4(d0, d1, d2, d3, s0, s1, s2, s3);
    }
    for col in 0..4 {
        let (mut d0, mut d1, mut d2, mut d3) = (0, 0, 0, 0);
        hadamard4(
            &mut d0,
            &mut d1,
            &mut d2,
            &mut d3,
            block[col],
            block[4 + col],
            block[8 + col],
            block[12 + col],
        );
        block[col] = d0;
        block[4 + col] = d1;
        block[8 + col] = d2;
        block[12 + col] = d3;
    }
}

#[inline(always)]
fn hadamard4<T: Copy + Add<T, Output = T> + Sub<T, Output = T>>(
    dest0: &mut T,
    dest1: &mut T,
    dest2: &mut T,
    dest3: &mut T,
    src0: T,
    src1: T,
    src2: T,
    src3: T,
) {
    let temp0: T = src0 + src1;
    let temp1: T = src0 - src1;
    let temp2: T = src2 + src3;
    let temp3: T = src2 - src3;
    *dest0 = temp0 + temp2;
    *dest2 = temp0 - temp2;
    *dest1 = temp1 + temp3;
    *dest3 = temp1 - temp3;
}
