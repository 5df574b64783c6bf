
use std::num::NonZeroUsize;

use crate::util::Pixel;

/// Fills the `pad` border around a `width` x `height` image by replicating
/// its edge samples.
///
/// `data` holds the padded image, with the visible area starting `pad` rows
/// down and `pad` columns in. Corners take the value of the nearest corner
/// sample.
pub fn pad_plane<T: Pixel>(
    data: &mut [T],
    pitch: NonZeroUsize,
    pad: usize,
    width: NonZeroUsize,
    height: NonZeroUsize,
) {
    let pitch = pitch.get();
    let width = width.get();
    let height = height.get();
    debug_assert!(pitch >= width + 2 * pad);
    debug_assert!(data.len() >= pitch * (height + 2 * pad));

    // Left and right
    for y in pad..pad + height {
        let row = &mut data[y * pitch..][..width + 2 * pad];
        let first = row[pad];
        let last = row[pad + width - 1];
        row[..pad].fill(first);
        row[pad + width..].fill(last);
    }

    // Up
    let first_row = pad * pitch;
    for y in 0..pad {
        data.copy_within(first_row..first_row + pitch, y * pitch);
    }

    // Down
    let last_row = (pad + height - 1) * pitch;
    for y in pad + height..height + 2 * pad {
        data.copy_within(last_row..last_row + pitch, y * pitch);
    }
}
