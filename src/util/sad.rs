#[cfg(target_arch = "x86_64")]
mod avx2;
mod rust;


use std::num::NonZeroUsize;

use crate::util::Pixel;

/// Sum of absolute differences between a `width` x `height` block of `src`
/// and the block of `ref_` at the same position.
#[must_use]
pub fn get_sad<T: Pixel>(
    width: NonZeroUsize,
    height: NonZeroUsize,
    src: &[T],
    src_pitch: NonZeroUsize,
    ref_: &[T],
    ref_pitch: NonZeroUsize,
) -> u64 {
    rust::get_sad(width, height, src, src_pitch, ref_, ref_pitch)
}

/// Vectorized SAD for 8-bit samples. Widths that are not a multiple of 16
/// fall back to the scalar path.
///
/// # Safety
/// The caller must have verified that the CPU supports AVX2.
#[cfg(target_arch = "x86_64")]
#[must_use]
pub(crate) unsafe fn get_sad_u8_avx2(
    width: NonZeroUsize,
    height: NonZeroUsize,
    src: &[u8],
    src_pitch: NonZeroUsize,
    ref_: &[u8],
    ref_pitch: NonZeroUsize,
) -> u64 {
    if width.get() % 16 != 0 {
        return rust::get_sad(width, height, src, src_pitch, ref_, ref_pitch);
    }
    avx2::get_sad_u8(width, height, src, src_pitch, ref_, ref_pitch)
}
