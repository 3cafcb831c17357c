//! Two-phase prebolus for an active meal mode.
//!
//! Phase 1 is due on activation, phase 2 once `phase2_after_min` has elapsed.
//! Delivered phases are recorded in `CooldownState::meal_prebolus`, so the same
//! activation never doses a phase twice. A phase whose window has passed is
//! skipped rather than delivered late.

use super::{Applied, DecisionResult, DecisionSource, MealPhaseClaim, Strategy, StrategyEnv};
use crate::context::MealKind;
use crate::refractory::MealPrebolusMark;
use crate::util::MS_PER_MIN;

/// Minutes after its due time that a phase may still be delivered.
const PHASE_GRACE_MIN: f64 = 30.0;
/// Two activations within this many minutes are the same activation.
const SAME_ACTIVATION_MIN: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrebolusPhase {
    First,
    Second,
}

pub struct ScheduledMealMode;

/// Same meal kind, started within `SAME_ACTIVATION_MIN` of the mark.
pub fn same_activation(mark: &MealPrebolusMark, kind: MealKind, started_at_ms: i64) -> bool {
    mark.kind == kind
        && ((mark.started_at_ms - started_at_ms).abs() as f64) <= SAME_ACTIVATION_MIN * MS_PER_MIN
}

impl Strategy for ScheduledMealMode {
    fn source(&self) -> DecisionSource {
        DecisionSource::ScheduledMealMode
    }

    fn evaluate(&self, env: &StrategyEnv<'_>) -> DecisionResult {
        let ctx = env.ctx;
        let pass = |r: String| DecisionResult::fallthrough(DecisionSource::ScheduledMealMode, r);

        let Some((mode, plan)) = ctx.active_meal_plan() else {
            return pass("no meal mode active".to_string());
        };
        let started_at_ms = ctx.now_ms - (mode.elapsed_min * MS_PER_MIN).round() as i64;
        let mark = env
            .cooldown
            .meal_prebolus
            .filter(|m| same_activation(m, mode.kind, started_at_ms));
        let phase1_done = mark.is_some_and(|m| m.phase1_at_ms.is_some());
        let phase2_done = mark.is_some_and(|m| m.phase2_at_ms.is_some());
        let elapsed = mode.elapsed_min;

        let phase1_pending = !phase1_done && plan.prebolus1_u > 0.0;
        let phase1_deadline = PHASE_GRACE_MIN.min(plan.phase2_after_min);

        let (phase, units) = if phase1_pending && elapsed <= phase1_deadline {
            (PrebolusPhase::First, plan.prebolus1_u)
        } else if !phase2_done && plan.prebolus2_u > 0.0 {
            if elapsed < plan.phase2_after_min {
                return pass(format!(
                    "{} phase 2 due in {:.0} min",
                    mode.kind,
                    plan.phase2_after_min - elapsed
                ));
            }
            if elapsed > plan.phase2_after_min + PHASE_GRACE_MIN {
                return pass(format!(
                    "{} phase 2 window passed ({elapsed:.0} min elapsed)",
                    mode.kind
                ));
            }
            if ctx.delta <= env.cfg.hypo.fast_fall_delta {
                return pass(format!(
                    "{} phase 2 held: bg falling {:+.1}",
                    mode.kind, ctx.delta
                ));
            }
            (PrebolusPhase::Second, plan.prebolus2_u)
        } else if phase1_pending {
            return pass(format!(
                "{} phase 1 window passed ({elapsed:.0} min elapsed)",
                mode.kind
            ));
        } else {
            return pass(format!("{} prebolus phases complete", mode.kind));
        };

        let n = match phase {
            PrebolusPhase::First => 1,
            PrebolusPhase::Second => 2,
        };
        DecisionResult::applied(
            Applied::new(
                DecisionSource::ScheduledMealMode,
                format!(
                    "{} mode phase {n}: prebolus {units:.2} U at {elapsed:.0} min",
                    mode.kind
                ),
            )
            .with_bolus(units)
            .explicit()
            .requiring_bolus()
            .claiming(MealPhaseClaim {
                kind: mode.kind,
                started_at_ms,
                phase,
            }),
        )
    }
}
