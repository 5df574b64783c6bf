use std::num::NonZeroUsize;

use crate::util::Pixel;

#[must_use]
pub(super) fn get_sad<T: Pixel>(
    width: NonZeroUsize,
    height: NonZeroUsize,
    src: &[T],
    src_pitch: NonZeroUsize,
    ref_: &[T],
    ref_pitch: NonZeroUsize,
) -> u64 {
    match (width.get(), height.get()) {
        (2, 2) => get_sad_impl::<T, 2, 2>(src, src_pitch, ref_, ref_pitch),
        (4, 4) => get_sad_impl::<T, 4, 4>(src, src_pitch, ref_, ref_pitch),
        (8, 8) => get_sad_impl::<T, 8, 8>(src, src_pitch, ref_, ref_pitch),
        (16, 16) => get_sad_impl::<T, 16, 16>(src, src_pitch, ref_, ref_pitch),
        (32, 32) => get_sad_impl::<T, 32, 32>(src, src_pitch, ref_, ref_pitch),
        (64, 64) => get_sad_impl::<T, 64, 64>(src, src_pitch, ref_, ref_pitch),
        (w, h) => get_sad_dyn(w, h, src, src_pitch, ref_, ref_pitch),
    }
}

#[must_use]
fn get_sad_impl<T: Pixel, const WIDTH: usize, const HEIGHT: usize>(
    src: &[T],
    src_pitch: NonZeroUsize,
    ref_: &[T],
    ref_pitch: NonZeroUsize,
) -> u64 {
    get_sad_dyn(WIDTH, HEIGHT, src, src_pitch, ref_, ref_pitch)
}

#[inline(always)]
fn get_sad_dyn<T: Pixel>(
    width: usize,
    height: usize,
    src: &[T],
    src_pitch: NonZeroUsize,
    ref_: &[T],
    ref_pitch: NonZeroUsize,
) -> u64 {
    let mut sum = 0;
    for y in 0..height {
        let src_row = &src[y * src_pitch.get()..][..width];
        let ref_row = &ref_[y * ref_pitch.get()..][..width];
        sum += src_row.iter().zip(ref_row.iter()).fold(0u64, |acc, (&s, &r)| {
            let val1: i32 = s.into();
            let val2: i32 = r.into();
            acc + u64::from((val1 - val2).unsigned_abs())
        });
    }
    sum
}
