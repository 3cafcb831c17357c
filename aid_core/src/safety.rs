//! Cycle-level safety assessment shared by the basal and bolus paths.

use crate::config::SafetyCfg;
use crate::context::LoopContext;

#[derive(Debug, Clone, PartialEq)]
pub struct SafetyDecision {
    pub stop_basal: bool,
    /// Multiplier for automated boluses, always in `[0, 1]`.
    pub bolus_factor: f64,
    pub reason: String,
    pub is_low_glucose_risk: bool,
}

impl SafetyDecision {
    pub fn neutral() -> Self {
        Self {
            stop_basal: false,
            bolus_factor: 1.0,
            reason: "safety: no concerns".to_string(),
            is_low_glucose_risk: false,
        }
    }
}

/// Assess drop rate, IOB load and recent control quality once per cycle.
/// Every basal stop it raises carries `is_low_glucose_risk`.
pub fn assess(ctx: &LoopContext, cfg: &SafetyCfg) -> SafetyDecision {
    let stop_reason = if !ctx.quality.is_usable() {
        Some("safety: sensor data unusable")
    } else if ctx.min_guard_bg() <= ctx.threshold {
        Some("safety: bg or forecast at or below threshold")
    } else {
        None
    };
    if let Some(reason) = stop_reason {
        return SafetyDecision {
            stop_basal: true,
            bolus_factor: 0.0,
            reason: reason.to_string(),
            is_low_glucose_risk: true,
        };
    }

    let mut factor = 1.0_f64;
    let mut reasons: Vec<String> = Vec::new();
    let mut stop_basal = false;
    let mut low_risk = false;

    if ctx.delta <= cfg.rapid_drop_delta {
        if ctx.bg < ctx.profile.target_bg + cfg.rapid_drop_margin {
            stop_basal = true;
            low_risk = true;
            factor = 0.0;
            reasons.push(format!("rapid drop {:+.1} near target", ctx.delta));
        } else {
            factor *= cfg.rapid_drop_bolus_factor;
            reasons.push(format!("rapid drop {:+.1}", ctx.delta));
        }
    }

    if ctx.tdd_24h_u > 0.0 && ctx.iob > ctx.tdd_24h_u * cfg.high_iob_tdd_frac {
        factor *= cfg.high_iob_factor;
        reasons.push(format!(
            "iob {:.2} above {:.0}% of tdd",
            ctx.iob,
            cfg.high_iob_tdd_frac * 100.0
        ));
    }

    if let Some(tir) = ctx.time_in_range
        && tir < cfg.low_tir
    {
        factor *= cfg.low_tir_factor;
        reasons.push(format!("time in range {:.0}%", tir * 100.0));
    }

    let factor = if factor.is_finite() {
        factor.clamp(0.0, 1.0)
    } else {
        0.0
    };
    if reasons.is_empty() {
        return SafetyDecision::neutral();
    }
    SafetyDecision {
        stop_basal,
        bolus_factor: factor,
        reason: format!("safety: {}", reasons.join(", ")),
        is_low_glucose_risk: low_risk,
    }
}
