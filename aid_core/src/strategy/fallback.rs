use super::{Applied, DecisionResult, DecisionSource, Strategy, StrategyEnv};
use crate::config::SmbCfg;
use crate::context::LoopContext;

/// Prediction-informed bolus proposal before gating: the correction needed to
/// bring the lower of predicted and eventual BG to target, scaled by the
/// delivery ratio and the bolus modulation. Zero at or below target.
pub fn bolus_estimate(ctx: &LoopContext, smb: &SmbCfg) -> f64 {
    let guide = ctx.predicted_bg.min(ctx.eventual_bg);
    let excess = guide - ctx.profile.target_bg;
    if !excess.is_finite() || excess <= 0.0 {
        return 0.0;
    }
    let need = excess / ctx.profile.isf;
    (need * smb.delivery_ratio * ctx.modulation.bolus_multiplier()).max(0.0)
}

/// Basal from the resolver plus the prediction-informed bolus. Always applies.
pub struct GeneralFallback;

impl Strategy for GeneralFallback {
    fn source(&self) -> DecisionSource {
        DecisionSource::GeneralFallback
    }

    fn evaluate(&self, env: &StrategyEnv<'_>) -> DecisionResult {
        let ctx = env.ctx;
        let plan = env.basal.resolve(ctx, env.safety);
        let proposal = bolus_estimate(ctx, &env.cfg.smb);
        let guide = ctx.predicted_bg.min(ctx.eventual_bg);

        let mut action = Applied::new(
            DecisionSource::GeneralFallback,
            format!(
                "general: guide bg {guide:.0} vs target {:.0}, proposal {proposal:.2} U, basal {:.2} U/h",
                ctx.profile.target_bg, plan.rate_uph
            ),
        )
        .with_basal(plan.rate_uph, plan.duration_min)
        .with_notes(plan.notes);
        if proposal > 0.0 {
            action = action.with_bolus(proposal);
        }
        DecisionResult::applied(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modulation::ModulationFactors;

    fn ctx(predicted: f64, eventual: f64) -> LoopContext {
        let mut c = crate::mocks::context_at(150.0, 0.0);
        c.predicted_bg = predicted;
        c.eventual_bg = eventual;
        c
    }

    #[test]
    fn estimate_uses_lower_forecast() {
        let smb = SmbCfg::default();
        // (160 - 110) / 50 * 0.5
        let u = bolus_estimate(&ctx(200.0, 160.0), &smb);
        assert!((u - 0.5).abs() < 1e-9);
    }

    #[test]
    fn estimate_zero_at_or_below_target() {
        let smb = SmbCfg::default();
        assert_eq!(bolus_estimate(&ctx(110.0, 200.0), &smb), 0.0);
        assert_eq!(bolus_estimate(&ctx(90.0, 95.0), &smb), 0.0);
    }

    #[test]
    fn estimate_scales_with_modulation() {
        let smb = SmbCfg::default();
        let mut c = ctx(160.0, 160.0);
        c.modulation = ModulationFactors {
            physiological: 0.9,
            hormonal: 1.0,
            trajectory: 1.1,
        };
        let u = bolus_estimate(&c, &smb);
        assert!((u - 0.5 * 0.9 * 1.1).abs() < 1e-9);
    }
}
