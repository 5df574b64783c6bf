
use std::num::NonZeroUsize;

use crate::util::Pixel;

/// Averages two pitched blocks sample by sample, rounding halves up.
///
/// Used to build quarter-pel samples out of two half-pel planes and to form
/// bi-directional predictions.
pub fn average2<T: Pixel>(
    dest: &mut [T],
    dest_pitch: NonZeroUsize,
    src1: &[T],
    src1_pitch: NonZeroUsize,
    src2: &[T],
    src2_pitch: NonZeroUsize,
    width: NonZeroUsize,
    height: NonZeroUsize,
) {
    let width = width.get();
    debug_assert!(dest.len() >= (height.get() - 1) * dest_pitch.get() + width);
    debug_assert!(src1.len() >= (height.get() - 1) * src1_pitch.get() + width);
    debug_assert!(src2.len() >= (height.get() - 1) * src2_pitch.get() + width);

    for y in 0..height.get() {
        let a_row = &src1[y * src1_pitch.get()..][..width];
        let b_row = &src2[y * src2_pitch.get()..][..width];
        let dest_row = &mut dest[y * dest_pitch.get()..][..width];
        for ((d, &a), &b) in dest_row.iter_mut().zip(a_row).zip(b_row) {
            let a: u32 = a.into();
            let b: u32 = b.into();
            *d = T::from_u32_or_max_value((a + b).div_ceil(2));
        }
    }
}
