use super::{Applied, DecisionResult, DecisionSource, Strategy, StrategyEnv};

/// Doses a confirmed carb estimate, discounted by IOB with a coverage floor.
pub struct ConfirmedMealAdvisor;

impl Strategy for ConfirmedMealAdvisor {
    fn source(&self) -> DecisionSource {
        DecisionSource::ConfirmedMealAdvisor
    }

    fn evaluate(&self, env: &StrategyEnv<'_>) -> DecisionResult {
        let ctx = env.ctx;
        let cfg = &env.cfg.advisor;
        let pass = |r: String| DecisionResult::fallthrough(DecisionSource::ConfirmedMealAdvisor, r);

        let Some(est) = ctx.meal_estimate else {
            return pass("no confirmed meal estimate".to_string());
        };
        if env.cooldown.advised_meal_at_ms == Some(est.at_ms) {
            return pass("estimate already covered".to_string());
        }
        if est.age_min < 0.0 {
            return pass(format!("estimate {:.0} min in the future", -est.age_min));
        }
        let window = ctx.prefs.meal_advisor_window_min;
        if est.age_min > window {
            return pass(format!(
                "estimate {:.0} min old, outside {window:.0} min window",
                est.age_min
            ));
        }
        if let Some(since) = ctx.minutes_since_bolus
            && since < cfg.min_since_bolus_min
        {
            return pass(format!(
                "last bolus {since:.0} min ago < {:.0} min",
                cfg.min_since_bolus_min
            ));
        }

        let carb_need = est.carbs_g / ctx.profile.carb_ratio;
        let iob = ctx.iob.max(0.0);
        let discounted = carb_need - cfg.iob_discount * iob;
        let floor = cfg.min_coverage * carb_need;
        let need = discounted.max(floor);
        let basal = ctx.neutral_basal_uph() * cfg.basal_boost;

        DecisionResult::applied(
            Applied::new(
                DecisionSource::ConfirmedMealAdvisor,
                format!(
                    "meal advisor: {:.0} g / CR {:.1} = {carb_need:.2} U, minus {:.2} x IOB {iob:.2} -> {need:.2} U (floor {floor:.2} U)",
                    est.carbs_g, ctx.profile.carb_ratio, cfg.iob_discount
                ),
            )
            .with_bolus(need)
            .with_basal(basal, env.basal.duration_min())
            .confirmed_meal()
            .requiring_bolus(),
        )
    }
}
