#[cfg(test)]
mod tests;

use std::cmp::{max, min};

/// find the median between a, b and c
#[must_use]
pub fn median<T: Ord + Copy>(a: T, b: T, c: T) -> T {
    max(min(a, b), min(max(a, b), c))
}

/// Median of four values: the mean of the two middle values, rounded toward
/// negative infinity.
#[must_use]
pub fn median4(a: i32, b: i32, c: i32, d: i32) -> i32 {
    let hi = max(max(a, b), max(c, d));
    let lo = min(min(a, b), min(c, d));
    (a + b + c + d - hi - lo) >> 1
}

/// Integer division rounding half away from zero.
///
/// `den` must be non-zero.
#[must_use]
pub fn round_div(num: i64, den: i64) -> i64 {
    debug_assert!(den != 0);
    let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
    if num >= 0 {
        (num + den / 2) / den
    } else {
        -((-num + den / 2) / den)
    }
}
