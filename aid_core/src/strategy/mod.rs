//! Priority-ordered dosing strategies.
//!
//! Each strategy either claims the cycle (`Applied`) or passes (`Fallthrough`).
//! The resolver runs every `Applied` through the Dose Capper and the Basal
//! Resolver before accepting it. An action whose capped result has no net
//! effect is demoted to a fallthrough and the next strategy gets its turn.

mod autodrive;
mod fallback;
mod meal_advisor;
mod meal_mode;
mod safety_halt;

pub use autodrive::Autodrive;
pub use fallback::{GeneralFallback, bolus_estimate};
pub use meal_advisor::ConfirmedMealAdvisor;
pub use meal_mode::{PrebolusPhase, ScheduledMealMode, same_activation};
pub use safety_halt::SafetyHalt;

use crate::basal::BasalResolver;
use crate::config::LoopCfg;
use crate::context::{LoopContext, MealKind};
use crate::dose_capper::{DoseCapper, DoseGateAudit, DoseKind, GateRequest};
use crate::hypo_guard::HypoVerdict;
use crate::refractory::CooldownState;
use crate::safety::SafetyDecision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionSource {
    SafetyHalt,
    ConfirmedMealAdvisor,
    Autodrive,
    ScheduledMealMode,
    GeneralFallback,
    /// Review collaborator changed the directive.
    Reviewed,
}

impl DecisionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionSource::SafetyHalt => "safety_halt",
            DecisionSource::ConfirmedMealAdvisor => "confirmed_meal_advisor",
            DecisionSource::Autodrive => "autodrive",
            DecisionSource::ScheduledMealMode => "scheduled_meal_mode",
            DecisionSource::GeneralFallback => "general_fallback",
            DecisionSource::Reviewed => "reviewed",
        }
    }
}

impl core::fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasalIntent {
    pub rate_uph: f64,
    pub duration_min: u32,
}

/// Meal-mode phase claimed by an `Applied`, committed once the bolus is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MealPhaseClaim {
    pub kind: MealKind,
    pub started_at_ms: i64,
    pub phase: PrebolusPhase,
}

/// A strategy's proposed action. Built with `Applied::new` and the `with_*` methods.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub source: DecisionSource,
    pub bolus_u: Option<f64>,
    pub basal: Option<BasalIntent>,
    pub reason: String,
    /// Extra trail lines.
    pub notes: Vec<String>,
    /// Which gate stages the bolus may skip.
    pub dose_kind: DoseKind,
    /// Only a non-zero capped bolus counts as this action's effect.
    pub requires_bolus: bool,
    pub meal_phase: Option<MealPhaseClaim>,
}

impl Applied {
    pub fn new(source: DecisionSource, reason: impl Into<String>) -> Self {
        Self {
            source,
            bolus_u: None,
            basal: None,
            reason: reason.into(),
            notes: Vec::new(),
            dose_kind: DoseKind::Automated,
            requires_bolus: false,
            meal_phase: None,
        }
    }

    pub fn with_bolus(mut self, units: f64) -> Self {
        self.bolus_u = Some(units);
        self
    }

    pub fn with_basal(mut self, rate_uph: f64, duration_min: u32) -> Self {
        self.basal = Some(BasalIntent {
            rate_uph,
            duration_min,
        });
        self
    }

    pub fn with_notes(mut self, notes: Vec<String>) -> Self {
        self.notes = notes;
        self
    }

    /// User-initiated: explicit for the capper and the basal caps.
    pub fn explicit(mut self) -> Self {
        self.dose_kind = DoseKind::Explicit;
        self
    }

    /// Bolus against user-confirmed carbs.
    pub fn confirmed_meal(mut self) -> Self {
        self.dose_kind = DoseKind::ConfirmedMeal;
        self
    }

    fn is_explicit(&self) -> bool {
        self.dose_kind == DoseKind::Explicit
    }

    pub fn requiring_bolus(mut self) -> Self {
        self.requires_bolus = true;
        self
    }

    pub fn claiming(mut self, claim: MealPhaseClaim) -> Self {
        self.meal_phase = Some(claim);
        self
    }

    fn is_empty(&self) -> bool {
        self.bolus_u.is_none() && self.basal.is_none()
    }

    fn has_effect(&self, final_bolus_u: f64) -> bool {
        if self.requires_bolus {
            final_bolus_u > 0.0
        } else {
            final_bolus_u > 0.0 || self.basal.is_some()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecisionResult {
    Applied(Applied),
    Fallthrough { source: DecisionSource, reason: String },
}

impl DecisionResult {
    /// Wrap an action. One with neither bolus nor basal intent becomes a fallthrough.
    pub fn applied(a: Applied) -> Self {
        if a.is_empty() {
            DecisionResult::Fallthrough {
                source: a.source,
                reason: format!("{} (no intent)", a.reason),
            }
        } else {
            DecisionResult::Applied(a)
        }
    }

    pub fn fallthrough(source: DecisionSource, reason: impl Into<String>) -> Self {
        DecisionResult::Fallthrough {
            source,
            reason: reason.into(),
        }
    }
}

/// Read-only per-cycle view handed to every strategy.
pub struct StrategyEnv<'a> {
    pub ctx: &'a LoopContext,
    pub hypo: &'a HypoVerdict,
    pub safety: &'a SafetyDecision,
    pub cooldown: &'a CooldownState,
    pub cfg: &'a LoopCfg,
    pub capper: &'a DoseCapper,
    pub basal: &'a BasalResolver,
}

pub trait Strategy {
    fn source(&self) -> DecisionSource;
    fn evaluate(&self, env: &StrategyEnv<'_>) -> DecisionResult;
}

/// Accepted action after capping.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub source: DecisionSource,
    pub bolus_u: f64,
    pub basal_rate_uph: f64,
    pub basal_duration_min: u32,
    pub audit: Option<DoseGateAudit>,
    pub trail: Vec<String>,
    pub meal_phase: Option<MealPhaseClaim>,
}

pub struct StrategyResolver {
    strategies: Vec<Box<dyn Strategy + Send + Sync>>,
}

impl Default for StrategyResolver {
    fn default() -> Self {
        Self::new(vec![
            Box::new(SafetyHalt),
            Box::new(ConfirmedMealAdvisor),
            Box::new(Autodrive),
            Box::new(ScheduledMealMode),
            Box::new(GeneralFallback),
        ])
    }
}

impl StrategyResolver {
    pub fn new(strategies: Vec<Box<dyn Strategy + Send + Sync>>) -> Self {
        Self { strategies }
    }

    pub fn order(&self) -> Vec<DecisionSource> {
        self.strategies.iter().map(|s| s.source()).collect()
    }

    /// First action with a net effect after capping wins.
    pub fn resolve(&self, env: &StrategyEnv<'_>) -> Resolution {
        let mut trail = Vec::new();
        for s in &self.strategies {
            match s.evaluate(env) {
                DecisionResult::Fallthrough { source, reason } => {
                    trail.push(format!("{source}: {reason}"));
                }
                DecisionResult::Applied(a) => {
                    let fin = finalize(&a, env);
                    if !a.has_effect(fin.bolus_u) {
                        let why = fin
                            .audit
                            .as_ref()
                            .map_or_else(|| "no bolus".to_string(), DoseGateAudit::summary);
                        tracing::debug!(source = %a.source, "applied action demoted");
                        trail.push(format!(
                            "{}: demoted, no net effect after capping ({why})",
                            a.source
                        ));
                        continue;
                    }
                    trail.push(a.reason.clone());
                    trail.extend(a.notes.iter().cloned());
                    if let Some(audit) = &fin.audit {
                        trail.push(audit.summary());
                    }
                    trail.extend(fin.basal_notes);
                    return Resolution {
                        source: a.source,
                        bolus_u: fin.bolus_u,
                        basal_rate_uph: fin.basal_rate_uph,
                        basal_duration_min: fin.basal_duration_min,
                        audit: fin.audit,
                        trail,
                        meal_phase: a.meal_phase,
                    };
                }
            }
        }

        // Only reachable with a custom strategy list lacking a fallback.
        let plan = env.basal.resolve(env.ctx, env.safety);
        trail.push("no strategy applied: basal resolver only".to_string());
        trail.extend(plan.notes);
        Resolution {
            source: DecisionSource::GeneralFallback,
            bolus_u: 0.0,
            basal_rate_uph: plan.rate_uph,
            basal_duration_min: plan.duration_min,
            audit: None,
            trail,
            meal_phase: None,
        }
    }
}

struct Finalized {
    bolus_u: f64,
    audit: Option<DoseGateAudit>,
    basal_rate_uph: f64,
    basal_duration_min: u32,
    basal_notes: Vec<String>,
}

fn finalize(a: &Applied, env: &StrategyEnv<'_>) -> Finalized {
    let (bolus_u, audit) = match a.bolus_u {
        Some(units) => {
            let req = GateRequest {
                proposed_u: units,
                kind: a.dose_kind,
            };
            let (final_u, audit) = env.capper.gate(req, env.ctx, env.hypo, env.safety);
            (final_u, Some(audit))
        }
        None => (0.0, None),
    };

    let explicit_basal = a.is_explicit() || env.basal.explicit_bypass(env.ctx);
    let (basal_rate_uph, basal_duration_min, basal_notes) = match a.basal {
        // A safety stop outranks any non-explicit raise.
        Some(intent) if !(env.safety.stop_basal && intent.rate_uph > 0.0 && !a.is_explicit()) => {
            let rate = env.basal.clamp_rate(intent.rate_uph, env.ctx, explicit_basal);
            let notes = if (rate - intent.rate_uph).abs() > 1e-9 {
                vec![format!(
                    "basal intent {:.2} U/h clamped to {rate:.2} U/h",
                    intent.rate_uph
                )]
            } else {
                Vec::new()
            };
            (rate, intent.duration_min, notes)
        }
        _ => {
            let plan = env.basal.resolve(env.ctx, env.safety);
            (plan.rate_uph, plan.duration_min, plan.notes)
        }
    };

    Finalized {
        bolus_u,
        audit,
        basal_rate_uph,
        basal_duration_min,
        basal_notes,
    }
}
