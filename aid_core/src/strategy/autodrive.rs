use super::{Applied, DecisionResult, DecisionSource, Strategy, StrategyEnv};

/// Momentum dosing on a sustained rise without a meal announcement.
pub struct Autodrive;

impl Strategy for Autodrive {
    fn source(&self) -> DecisionSource {
        DecisionSource::Autodrive
    }

    fn evaluate(&self, env: &StrategyEnv<'_>) -> DecisionResult {
        let ctx = env.ctx;
        let cfg = &env.cfg.autodrive;
        let pass = |r: String| DecisionResult::fallthrough(DecisionSource::Autodrive, r);

        if ctx.bg < ctx.prefs.autodrive_floor_bg {
            return pass(format!(
                "bg {:.0} below floor {:.0}",
                ctx.bg, ctx.prefs.autodrive_floor_bg
            ));
        }
        if let Some(since) = ctx.minutes_since_autodrive
            && since < ctx.prefs.autodrive_cooldown_min
        {
            return pass(format!(
                "cooldown: last autodrive {since:.0} min ago < {:.0} min",
                ctx.prefs.autodrive_cooldown_min
            ));
        }
        if ctx.delta < cfg.moderate_delta || ctx.short_avg_delta <= 0.0 {
            return pass(format!(
                "no momentum (delta {:+.1}, short avg {:+.1})",
                ctx.delta, ctx.short_avg_delta
            ));
        }

        let strong = ctx.bg >= cfg.strong_bg
            && ctx.delta >= cfg.strong_delta
            && ctx.short_avg_delta >= cfg.moderate_delta;
        let (label, fraction) = if strong {
            ("strong", cfg.large_fraction)
        } else {
            ("moderate", cfg.small_fraction)
        };
        let max_smb = env.capper.smb_ceiling(ctx);
        let units = max_smb * fraction;
        let basal = ctx.neutral_basal_uph() * cfg.basal_boost;

        DecisionResult::applied(
            Applied::new(
                DecisionSource::Autodrive,
                format!(
                    "autodrive: {label} rise (bg {:.0}, delta {:+.1}, short avg {:+.1}) -> {units:.2} U ({fraction:.2} x max smb {max_smb:.2})",
                    ctx.bg, ctx.delta, ctx.short_avg_delta
                ),
            )
            .with_bolus(units)
            .with_basal(basal, env.basal.duration_min())
            .requiring_bolus(),
        )
    }
}
