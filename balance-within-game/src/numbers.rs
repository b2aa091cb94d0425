//! Numeric conversion helpers centralizing safe numeric casts.

use num_traits::cast::cast;

/// Round half-up (toward positive infinity at `.5`) and clamp to the i32 range,
/// returning 0 for NaN values.
#[must_use]
pub fn round_half_up_to_i32(value: f64) -> i32 {
    if value.is_nan() {
        return 0;
    }
    let min = cast::<i32, f64>(i32::MIN).unwrap_or(f64::MIN);
    let max = cast::<i32, f64>(i32::MAX).unwrap_or(f64::MAX);
    let rounded = (value + 0.5).floor().clamp(min, max);
    cast::<f64, i32>(rounded).unwrap_or(0)
}

/// Whole-number percentage of `part / whole`, rounded to nearest. Zero when `whole` is zero.
#[must_use]
pub fn percentage(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    let ratio = f64::from(part) / f64::from(whole) * 100.0;
    u32::try_from(round_half_up_to_i32(ratio).max(0)).unwrap_or(0)
}

/// Convert a non-negative millisecond span to `u64`, flooring negatives at 0.
#[must_use]
pub fn millis_to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Convert a `u64` millisecond span to `i64`, saturating at `i64::MAX`.
#[must_use]
pub fn millis_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
