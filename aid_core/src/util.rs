//! Small numeric helpers shared by the pipeline stages.

/// Milliseconds in one minute.
pub const MS_PER_MIN: f64 = 60_000.0;

/// Replace NaN/±Inf with `fallback`.
#[inline]
pub fn finite_or(x: f64, fallback: f64) -> f64 {
    if x.is_finite() { x } else { fallback }
}

/// Round down to a multiple of `step`. A non-positive step disables rounding.
/// Negative or non-finite values map to 0.
#[inline]
pub fn floor_to_step(x: f64, step: f64) -> f64 {
    if !x.is_finite() || x <= 0.0 {
        return 0.0;
    }
    if !(step.is_finite() && step > 0.0) {
        return x;
    }
    // small epsilon so 0.1 / 0.05 does not floor to 1
    let n = (x / step + 1e-9).floor();
    (n * step).min(x).max(0.0)
}

/// Round to the nearest multiple of `step`, never below 0.
#[inline]
pub fn round_to_step(x: f64, step: f64) -> f64 {
    if !x.is_finite() || x <= 0.0 {
        return 0.0;
    }
    if !(step.is_finite() && step > 0.0) {
        return x;
    }
    ((x / step).round() * step).max(0.0)
}

/// Minutes between two epoch-ms timestamps (`later - earlier`).
#[inline]
pub fn minutes_between(earlier_ms: i64, later_ms: i64) -> f64 {
    (later_ms.saturating_sub(earlier_ms)) as f64 / MS_PER_MIN
}
