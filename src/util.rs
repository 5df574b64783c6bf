mod math;
mod sad;
mod satd;


use std::{fmt::Debug, num::NonZeroUsize};

use num_traits::{NumCast, PrimInt};

pub use math::{median, median4, round_div};
pub use sad::get_sad;
#[cfg(target_arch = "x86_64")]
pub(crate) use sad::get_sad_u8_avx2;
pub use satd::{get_satd, get_satd_with, hadamard4x4};

#[cfg(target_arch = "x86_64")]
cpufeatures::new!(cpuid_avx2, "avx2");

#[cfg(target_arch = "x86_64")]
pub use cpuid_avx2::get as has_avx2;

/// Sample type of the planes the search runs on.
///
/// Implemented for `u8` and `u16`, which covers 8 to 16 bit content.
pub trait Pixel:
    PrimInt
    + Into<i32>
    + Into<u32>
    + Into<u64>
    + From<u8>
    + Debug
    + Default
    + Send
    + Sync
    + 'static
{
    /// Narrows `value` into the sample type, saturating at the type's maximum.
    #[must_use]
    fn from_u32_or_max_value(value: u32) -> Self;
}

impl<T> Pixel for T
where
    T: PrimInt
        + Into<i32>
        + Into<u32>
        + Into<u64>
        + From<u8>
        + Debug
        + Default
        + Send
        + Sync
        + 'static,
{
    fn from_u32_or_max_value(value: u32) -> Self {
        <T as NumCast>::from(value).unwrap_or_else(T::max_value)
    }
}

/// Copies a `row_size` x `height` rectangle between two pitched buffers.
///
/// When both pitches equal the row size the copy is done in one go,
/// otherwise row by row so that the padding of either buffer is left untouched.
pub fn bitblt<T: Pixel>(
    dest: &mut [T],
    dest_pitch: NonZeroUsize,
    src: &[T],
    src_pitch: NonZeroUsize,
    row_size: NonZeroUsize,
    height: NonZeroUsize,
) {
    let height = height.get();
    let row_size = row_size.get();
    let src_pitch = src_pitch.get();
    let dest_pitch = dest_pitch.get();

    if src_pitch == dest_pitch && src_pitch == row_size {
        dest[..row_size * height].copy_from_slice(&src[..row_size * height]);
    } else {
        for i in 0..height {
            let src_start = i * src_pitch;
            let dest_start = i * dest_pitch;
            dest[dest_start..dest_start + row_size]
                .copy_from_slice(&src[src_start..src_start + row_size]);
        }
    }
}

/// Largest sample value representable at `bit_depth`.
#[must_use]
pub const fn pixel_max(bit_depth: u8) -> u32 {
    (1u32 << bit_depth) - 1
}
