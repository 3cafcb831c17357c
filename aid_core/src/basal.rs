//! Basal Rate Resolver.
//!
//! Order of stages: base rate, safety stop, meal-mode boost under its ceiling,
//! persistent-rise floor, exercise band, hard caps, pump step.

use crate::config::{ActivityCfg, ActivityBand, BasalCfg};
use crate::context::{ExerciseIntensity, LoopContext};
use crate::safety::SafetyDecision;
use crate::util::{floor_to_step, round_to_step};

#[derive(Debug, Clone, PartialEq)]
pub struct BasalPlan {
    pub rate_uph: f64,
    pub duration_min: u32,
    /// A floor lifted a safety stop. Only a stop without low-glucose risk can be
    /// lifted; `safety::assess` raises every stop together with that risk, so
    /// this is only set for a `SafetyDecision` supplied by the caller.
    pub override_safety: bool,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BasalResolver {
    cfg: BasalCfg,
    activity: ActivityCfg,
}

impl BasalResolver {
    pub fn new(cfg: BasalCfg, activity: ActivityCfg) -> Self {
        Self { cfg, activity }
    }

    pub fn duration_min(&self) -> u32 {
        self.cfg.duration_min
    }

    /// Meal mode in its runtime window is the explicit bypass for the basal caps.
    pub fn explicit_bypass(&self, ctx: &LoopContext) -> bool {
        ctx.active_meal_plan().is_some()
    }

    /// Highest rate this cycle may issue.
    pub fn hard_cap(&self, ctx: &LoopContext, explicit: bool) -> f64 {
        let p = &ctx.profile;
        let cap = if explicit {
            p.max_basal_uph
        } else {
            p.max_basal_uph
                .min(self.cfg.daily_safety_multiplier * p.max_daily_basal_uph)
                .min(self.cfg.current_basal_safety_multiplier * p.current_basal_uph)
        };
        if cap.is_finite() { cap.max(0.0) } else { 0.0 }
    }

    /// Clamp any rate (resolver output or strategy intent) into `[0, hard_cap]` on the pump step.
    pub fn clamp_rate(&self, rate_uph: f64, ctx: &LoopContext, explicit: bool) -> f64 {
        let cap = self.hard_cap(ctx, explicit);
        let r = if rate_uph.is_finite() { rate_uph } else { 0.0 };
        floor_to_step(r.clamp(0.0, cap), self.cfg.pump_step_uph)
    }

    fn band(&self, intensity: ExerciseIntensity) -> ActivityBand {
        match intensity {
            ExerciseIntensity::Light => self.activity.light,
            ExerciseIntensity::Moderate => self.activity.moderate,
            ExerciseIntensity::Vigorous => self.activity.vigorous,
        }
    }

    pub fn resolve(&self, ctx: &LoopContext, safety: &SafetyDecision) -> BasalPlan {
        let profile_basal = ctx.profile.current_basal_uph;
        let neutral = round_to_step(ctx.neutral_basal_uph(), self.cfg.pump_step_uph);
        let mut notes = vec![format!(
            "basal base {neutral:.2} U/h (profile {profile_basal:.2} x sens {:.2} x mod {:.2})",
            ctx.profile.sensitivity_ratio,
            ctx.modulation.basal_multiplier()
        )];
        let mut rate = neutral;
        let mut stopped = false;
        let mut override_safety = false;

        if safety.stop_basal {
            rate = 0.0;
            stopped = true;
            notes.push(format!("basal stopped: {}", safety.reason));
        }

        if let Some((mode, plan)) = ctx.active_meal_plan()
            && !stopped
        {
            let boosted = (neutral * plan.basal_boost).max(rate);
            rate = boosted.min(plan.temp_ceiling_uph.max(0.0));
            notes.push(format!(
                "{} mode {:.0}/{:.0} min: boost x{:.2}, ceiling {:.2} U/h",
                mode.kind, mode.elapsed_min, plan.runtime_min, plan.basal_boost, plan.temp_ceiling_uph
            ));
        }

        if ctx.short_avg_delta > 0.0 && ctx.bg > ctx.profile.target_bg {
            let floor = self.cfg.persistent_rise_floor_frac * profile_basal;
            if stopped {
                if safety.is_low_glucose_risk {
                    notes.push("rise floor suppressed: low glucose risk".to_string());
                } else if floor > 0.0 {
                    rate = floor;
                    stopped = false;
                    override_safety = true;
                    notes.push(format!("rise floor {floor:.2} U/h overrides stop"));
                }
            } else if rate < floor {
                rate = floor;
                notes.push(format!("rise floor {floor:.2} U/h"));
            }
        }

        if let Some(intensity) = ctx.modes.exercise {
            let band = self.band(intensity);
            let ceiling = band.ceiling_frac * profile_basal;
            let floor = band.floor_frac * profile_basal;
            let before = rate;
            rate = rate.min(ceiling);
            if !stopped {
                rate = rate.max(floor);
            }
            if (rate - before).abs() > f64::EPSILON {
                notes.push(format!(
                    "exercise {intensity:?} band [{floor:.2}, {ceiling:.2}] U/h applied"
                ));
            }
        }

        let explicit = self.explicit_bypass(ctx);
        let cap = self.hard_cap(ctx, explicit);
        if rate > cap {
            notes.push(format!(
                "basal capped at {cap:.2} U/h{}",
                if explicit { " (explicit: max basal only)" } else { "" }
            ));
        }
        let rate_uph = self.clamp_rate(rate, ctx, explicit);

        BasalPlan {
            rate_uph,
            duration_min: self.cfg.duration_min,
            override_safety,
            notes,
        }
    }
}
