
use std::num::NonZeroUsize;

use crate::util::Pixel;

/// Samples halfway between horizontal neighbors. The last column has no
/// right neighbor and is copied.
pub fn refine_horizontal_bilinear<T: Pixel>(
    dest: &mut [T],
    src: &[T],
    pitch: NonZeroUsize,
    width: NonZeroUsize,
    height: NonZeroUsize,
) {
    let width = width.get();
    for y in 0..height.get() {
        let src_row = &src[y * pitch.get()..][..width];
        let dest_row = &mut dest[y * pitch.get()..][..width];
        for x in 0..width - 1 {
            let a: u32 = src_row[x].into();
            let b: u32 = src_row[x + 1].into();
            dest_row[x] = T::from_u32_or_max_value((a + b + 1) / 2);
        }
        dest_row[width - 1] = src_row[width - 1];
    }
}

/// Samples halfway between vertical neighbors. The last row is copied.
pub fn refine_vertical_bilinear<T: Pixel>(
    dest: &mut [T],
    src: &[T],
    pitch: NonZeroUsize,
    width: NonZeroUsize,
    height: NonZeroUsize,
) {
    let (pitch, width) = (pitch.get(), width.get());
    let mut offset = 0;
    for _ in 0..height.get() - 1 {
        for x in 0..width {
            let a: u32 = src[offset + x].into();
            let b: u32 = src[offset + x + pitch].into();
            dest[offset + x] = T::from_u32_or_max_value((a + b + 1) / 2);
        }
        offset += pitch;
    }

    // last row
    dest[offset..offset + width].copy_from_slice(&src[offset..offset + width]);
}

/// Samples at the center of every 2x2 neighborhood. The last column and row
/// fall back to two-tap averages, and the last sample is copied.
pub fn refine_diagonal_bilinear<T: Pixel>(
    dest: &mut [T],
    src: &[T],
    pitch: NonZeroUsize,
    width: NonZeroUsize,
    height: NonZeroUsize,
) {
    let (pitch, width) = (pitch.get(), width.get());
    let mut offset = 0;
    for _ in 0..height.get() - 1 {
        for x in 0..width - 1 {
            let a: u32 = src[offset + x].into();
            let b: u32 = src[offset + x + 1].into();
            let c: u32 = src[offset + x + pitch].into();
            let d: u32 = src[offset + x + pitch + 1].into();
            dest[offset + x] = T::from_u32_or_max_value((a + b + c + d + 2) / 4);
        }
        // last column
        let a: u32 = src[offset + width - 1].into();
        let b: u32 = src[offset + width - 1 + pitch].into();
        dest[offset + width - 1] = T::from_u32_or_max_value((a + b + 1) / 2);

        offset += pitch;
    }

    // last row
    for x in 0..width - 1 {
        let a: u32 = src[offset + x].into();
        let b: u32 = src[offset + x + 1].into();
        dest[offset + x] = T::from_u32_or_max_value((a + b + 1) / 2);
    }
    dest[offset + width - 1] = src[offset + width - 1];
}
