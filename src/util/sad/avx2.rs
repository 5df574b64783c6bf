use std::{arch::x86_64::*, num::NonZeroUsize};

#[target_feature(enable = "avx2")]
pub(super) unsafe fn get_sad_u8(
    width: NonZeroUsize,
    height: NonZeroUsize,
    src: &[u8],
    src_pitch: NonZeroUsize,
    ref_: &[u8],
    ref_pitch: NonZeroUsize,
) -> u64 {
    let width = width.get();
    debug_assert!(width % 16 == 0);

    let mut acc256 = _mm256_setzero_si256();
    let mut acc128 = _mm_setzero_si128();
    for y in 0..height.get() {
        let src_row = &src[y * src_pitch.get()..][..width];
        let ref_row = &ref_[y * ref_pitch.get()..][..width];
        let mut x = 0;
        while x + 32 <= width {
            let a = _mm256_loadu_si256(src_row.as_ptr().add(x).cast());
            let b = _mm256_loadu_si256(ref_row.as_ptr().add(x).cast());
            acc256 = _mm256_add_epi64(acc256, _mm256_sad_epu8(a, b));
            x += 32;
        }
        if x + 16 <= width {
            let a = _mm_loadu_si128(src_row.as_ptr().add(x).cast());
            let b = _mm_loadu_si128(ref_row.as_ptr().add(x).cast());
            acc128 = _mm_add_epi64(acc128, _mm_sad_epu8(a, b));
        }
    }

    let mut lanes256 = [0u64; 4];
    _mm256_storeu_si256(lanes256.as_mut_ptr().cast(), acc256);
    let mut lanes128 = [0u64; 2];
    _mm_storeu_si128(lanes128.as_mut_ptr().cast(), acc128);
    lanes256.iter().sum::<u64>() + lanes128.iter().sum::<u64>()
}
