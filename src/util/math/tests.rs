use quickcheck_macros::quickcheck;

use super::*;

#[test]
fn median_distinct_values() {
    assert_eq!(median(1, 2, 3), 2);
    assert_eq!(median(1, 3, 2), 2);
    assert_eq!(median(2, 1, 3), 2);
    assert_eq!(median(2, 3, 1), 2);
    assert_eq!(median(3, 1, 2), 2);
    assert_eq!(median(3, 2, 1), 2);
}

#[test]
fn median_duplicate_values() {
    assert_eq!(median(1, 1, 2), 1);
    assert_eq!(median(2, 1, 2), 2);
    assert_eq!(median(5, 3, 5), 5);
    assert_eq!(median(-4, -4, -4), -4);
}

#[test]
fn median4_takes_middle_pair() {
    assert_eq!(median4(1, 2, 3, 4), 2);
    assert_eq!(median4(4, 10, 2, 6), 5);
    assert_eq!(median4(0, 0, 0, 8), 0);
    assert_eq!(median4(-3, -1, 5, 7), 2);
    // floor toward negative infinity
    assert_eq!(median4(-2, -1, 0, 9), -1);
}

#[quickcheck]
fn median4_is_order_independent(a: i16, b: i16, c: i16, d: i16) -> bool {
    let (a, b, c, d) = (i32::from(a), i32::from(b), i32::from(c), i32::from(d));
    let m = median4(a, b, c, d);
    m == median4(d, c, b, a) && m == median4(b, d, a, c)
}

#[test]
fn round_div_rounds_half_away_from_zero() {
    assert_eq!(round_div(16, 2), 8);
    assert_eq!(round_div(3, 2), 2);
    assert_eq!(round_div(-3, 2), -2);
    assert_eq!(round_div(5, 3), 2);
    assert_eq!(round_div(-5, 3), -2);
    assert_eq!(round_div(7, -2), -4);
    assert_eq!(round_div(0, 5), 0);
}
