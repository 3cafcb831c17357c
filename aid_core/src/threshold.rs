//! Effective hypoglycemia threshold.

/// Anchor of the threshold formula (mg/dL).
const FORMULA_BASE_BG: f64 = 40.0;

/// `min_bg - 0.5 * (min_bg - 40)`, raised to the LGS setting when that is higher.
///
/// Non-decreasing in `lgs`. A non-finite `min_bg` falls back to 100 mg/dL (threshold 70).
#[inline]
pub fn hypo_threshold(min_bg: f64, lgs: Option<f64>) -> f64 {
    let min_bg = if min_bg.is_finite() { min_bg } else { 100.0 };
    let base = min_bg - 0.5 * (min_bg - FORMULA_BASE_BG);
    match lgs {
        Some(l) if l.is_finite() && l > base => l,
        _ => base,
    }
}
