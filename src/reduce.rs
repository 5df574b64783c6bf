#[cfg(test)]
mod tests;

use std::num::NonZeroUsize;

use crate::util::Pixel;

/// Halves an image in both directions, each output sample being the rounded
/// mean of a 2x2 source block.
pub fn reduce_average<T: Pixel>(
    dest: &mut [T],
    src: &[T],
    dest_pitch: NonZeroUsize,
    src_pitch: NonZeroUsize,
    dest_width: NonZeroUsize,
    dest_height: NonZeroUsize,
) {
    let width = dest_width.get();
    debug_assert!(src.len() >= src_pitch.get() * (dest_height.get() * 2 - 1) + width * 2);
    debug_assert!(dest.len() >= dest_pitch.get() * (dest_height.get() - 1) + width);

    for y in 0..dest_height.get() {
        let top = &src[y * 2 * src_pitch.get()..][..width * 2];
        let bottom = &src[(y * 2 + 1) * src_pitch.get()..][..width * 2];
        let dest_row = &mut dest[y * dest_pitch.get()..][..width];
        for (x, d) in dest_row.iter_mut().enumerate() {
            let a: u32 = top[x * 2].into();
            let b: u32 = top[x * 2 + 1].into();
            let c: u32 = bottom[x * 2].into();
            let e: u32 = bottom[x * 2 + 1].into();
            *d = T::from_u32_or_max_value((a + b + c + e + 2) / 4);
        }
    }
}
