//! Dosing orchestrator.
//!
//! `LoopController` owns the persisted `LoopState` behind a single mutex and
//! runs one pipeline pass per call:
//!
//! inputs → context → modulation → hypo guard → safety → strategies (capped) →
//! optional review → directive.
//!
//! `decide` is the pure part: it reads a state snapshot and returns the next
//! state without touching the shared one. `run_cycle` commits that state only
//! after the review, so a discarded proposal never moves a cooldown clock.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use aid_traits::clock::{Clock, SystemClock};
use aid_traits::{DirectiveReviewer, Modulator, ReviewRequest};

use crate::basal::BasalResolver;
use crate::config::LoopCfg;
use crate::context::{LoopContext, LoopInputs};
use crate::directive::{DosingDirective, ReasonTrail};
use crate::dose_capper::{DoseCapper, DoseGateAudit};
use crate::error::{BuildError, Result};
use crate::hypo_guard::{HypoGuard, HypoReading, HypoVerdict, HysteresisState};
use crate::modulation::{self, ModulationFactors, ModulationMemory};
use crate::refractory::{CooldownState, MealPrebolusMark};
use crate::review::{ReviewLimits, ReviewWorker, apply_verdict};
use crate::safety::{self, SafetyDecision};
use crate::strategy::{
    DecisionSource, MealPhaseClaim, PrebolusPhase, StrategyEnv, StrategyResolver,
    same_activation,
};

/// Everything persisted between cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopState {
    pub hysteresis: HysteresisState,
    pub cooldown: CooldownState,
    pub modulation: ModulationMemory,
}

/// Cooldown effects of an accepted action, applied once the bolus is final.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CooldownClaim {
    pub source: DecisionSource,
    pub now_ms: i64,
    pub meal_phase: Option<MealPhaseClaim>,
    pub advised_meal_at_ms: Option<i64>,
}

impl CooldownClaim {
    /// Next cooldown state for a delivered bolus of `bolus_units`.
    pub fn apply(&self, prev: &CooldownState, bolus_units: f64) -> CooldownState {
        let mut next = *prev;
        if bolus_units <= 0.0 {
            return next;
        }
        next.last_bolus_at_ms = Some(self.now_ms);
        match self.source {
            DecisionSource::Autodrive => next.last_autodrive_at_ms = Some(self.now_ms),
            DecisionSource::ConfirmedMealAdvisor => {
                if self.advised_meal_at_ms.is_some() {
                    next.advised_meal_at_ms = self.advised_meal_at_ms;
                }
            }
            _ => {}
        }
        if let Some(claim) = self.meal_phase {
            let mut mark = match prev.meal_prebolus {
                Some(m) if same_activation(&m, claim.kind, claim.started_at_ms) => m,
                _ => MealPrebolusMark {
                    kind: claim.kind,
                    started_at_ms: claim.started_at_ms,
                    phase1_at_ms: None,
                    phase2_at_ms: None,
                },
            };
            match claim.phase {
                PrebolusPhase::First => mark.phase1_at_ms = Some(self.now_ms),
                PrebolusPhase::Second => mark.phase2_at_ms = Some(self.now_ms),
            }
            next.meal_prebolus = Some(mark);
        }
        next
    }
}

/// Output of the pure decision step.
#[derive(Debug, Clone)]
pub struct Decision {
    pub directive: DosingDirective,
    pub audit: Option<DoseGateAudit>,
    pub hypo: HypoVerdict,
    pub safety: SafetyDecision,
    pub context: LoopContext,
    /// Highest basal this directive may carry; bounds review substitutions.
    pub basal_cap_uph: f64,
    pub claim: CooldownClaim,
    /// State with hysteresis and modulation memory advanced, cooldown untouched.
    pub base_state: LoopState,
}

impl Decision {
    pub fn next_state(&self, bolus_units: f64) -> LoopState {
        LoopState {
            cooldown: self.claim.apply(&self.base_state.cooldown, bolus_units),
            ..self.base_state
        }
    }
}

/// Directive plus diagnostics for one cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub directive: DosingDirective,
    pub audit: Option<DoseGateAudit>,
    pub hypo: HypoVerdict,
    pub safety: SafetyDecision,
    pub reviewed: bool,
    pub state: LoopState,
}

pub struct LoopController {
    cfg: LoopCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    modulators: Vec<Box<dyn Modulator + Send + Sync>>,
    reviewer: Option<ReviewWorker>,
    resolver: StrategyResolver,
    guard: HypoGuard,
    capper: DoseCapper,
    basal: BasalResolver,
    state: Mutex<LoopState>,
}

impl core::fmt::Debug for LoopController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoopController")
            .field("strategies", &self.resolver.order())
            .field("modulators", &self.modulators.len())
            .field("reviewer", &self.reviewer.is_some())
            .field("state", &self.state_snapshot())
            .finish()
    }
}

impl LoopController {
    pub fn builder() -> LoopControllerBuilder<Missing> {
        LoopControllerBuilder::default()
    }

    pub fn config(&self) -> &LoopCfg {
        &self.cfg
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn state_snapshot(&self) -> LoopState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn restore_state(&self, state: LoopState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Pure pipeline pass over `state`. Only the modulators are consulted.
    pub fn decide(&self, inputs: &LoopInputs, now_ms: i64, state: &LoopState) -> Decision {
        let cfg = &self.cfg;
        let base = LoopContext::build(
            inputs,
            now_ms,
            &state.cooldown,
            ModulationFactors::neutral(),
            &cfg.sensor,
            &cfg.smb,
        );
        let (factors, memory, modulation_notes) =
            modulation::collect(&self.modulators, &base.snapshot(), &state.modulation, &cfg.modulation);
        let ctx = LoopContext {
            modulation: factors,
            ..base
        };

        let mut hysteresis = state.hysteresis;
        let reading = HypoReading {
            bg: ctx.bg,
            predicted_bg: ctx.predicted_bg,
            eventual_bg: ctx.eventual_bg,
            threshold: ctx.threshold,
            delta: ctx.delta,
        };
        let hypo = self.guard.is_blocked(&mut hysteresis, &reading, now_ms);
        let safety = safety::assess(&ctx, &cfg.safety);

        let mut trail = ReasonTrail::new();
        trail.extend(ctx.notes.iter().cloned());
        trail.extend(modulation_notes);
        if !ctx.forecast_available {
            trail.push("prediction missing: conservative mode");
        }
        trail.push(format!(
            "bg {:.0} delta {:+.1}, threshold {:.0}, iob {:.2}",
            ctx.bg, ctx.delta, ctx.threshold, ctx.iob
        ));
        trail.push(hypo.describe());
        trail.push(safety.reason.clone());

        let env = StrategyEnv {
            ctx: &ctx,
            hypo: &hypo,
            safety: &safety,
            cooldown: &state.cooldown,
            cfg,
            capper: &self.capper,
            basal: &self.basal,
        };
        let resolution = self.resolver.resolve(&env);
        trail.extend(resolution.trail);

        let directive = DosingDirective {
            basal_rate_uph: resolution.basal_rate_uph.max(0.0),
            basal_duration_min: resolution.basal_duration_min,
            bolus_units: resolution.bolus_u.max(0.0),
            source: resolution.source,
            trail,
        };
        let explicit_basal = self.basal.explicit_bypass(&ctx);
        let basal_cap_uph = self.basal.hard_cap(&ctx, explicit_basal);
        let claim = CooldownClaim {
            source: resolution.source,
            now_ms,
            meal_phase: resolution.meal_phase,
            advised_meal_at_ms: ctx.meal_estimate.map(|e| e.at_ms),
        };

        Decision {
            directive,
            audit: resolution.audit,
            hypo,
            safety,
            context: ctx,
            basal_cap_uph,
            claim,
            base_state: LoopState {
                hysteresis,
                cooldown: state.cooldown,
                modulation: memory,
            },
        }
    }

    /// One cycle. Always yields a directive.
    pub fn run_cycle(&self, inputs: &LoopInputs) -> DosingDirective {
        self.run_cycle_report(inputs).directive
    }

    pub fn run_cycle_report(&self, inputs: &LoopInputs) -> CycleReport {
        let now_ms = self.clock.now_ms();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let decision = self.decide(inputs, now_ms, &state);
        let (directive, reviewed) = self.review(&decision);
        let next = decision.next_state(directive.bolus_units);
        *state = next;
        drop(state);

        tracing::info!(
            source = %directive.source,
            bolus_u = directive.bolus_units,
            basal_uph = directive.basal_rate_uph,
            duration_min = directive.basal_duration_min,
            reviewed,
            "directive"
        );

        CycleReport {
            directive,
            audit: decision.audit,
            hypo: decision.hypo,
            safety: decision.safety,
            reviewed,
            state: next,
        }
    }

    fn review(&self, decision: &Decision) -> (DosingDirective, bool) {
        let mut directive = decision.directive.clone();
        let Some(reviewer) = &self.reviewer else {
            return (directive, false);
        };
        let req = ReviewRequest {
            snapshot: decision.context.snapshot(),
            bolus_units: directive.bolus_units,
            basal_rate_uph: directive.basal_rate_uph,
            basal_duration_min: directive.basal_duration_min,
            trail: directive.trail.lines().to_vec(),
        };
        let timeout = Duration::from_millis(self.cfg.review.timeout_ms);
        match reviewer.request(req, timeout) {
            Ok(verdict) => {
                let limits = ReviewLimits {
                    basal_cap_uph: decision.basal_cap_uph,
                    basal_step_uph: self.cfg.basal.pump_step_uph,
                    bolus_step_u: self.cfg.smb.bolus_step_u,
                };
                let out = apply_verdict(
                    &verdict,
                    directive.bolus_units,
                    directive.basal_rate_uph,
                    limits,
                );
                directive.trail.extend(out.notes);
                if out.changed {
                    directive
                        .trail
                        .push(format!("source {} revised by reviewer", directive.source));
                    directive.bolus_units = out.bolus_units;
                    directive.basal_rate_uph = out.basal_rate_uph;
                    directive.source = DecisionSource::Reviewed;
                }
                (directive, true)
            }
            Err(e) => {
                tracing::warn!(error = %e, "review unavailable, original directive kept");
                directive
                    .trail
                    .push(format!("review unavailable ({e}): original directive kept"));
                (directive, false)
            }
        }
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `LoopController`. `build()` needs a configuration.
pub struct LoopControllerBuilder<C> {
    cfg: Option<LoopCfg>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    modulators: Vec<Box<dyn Modulator + Send + Sync>>,
    reviewer: Option<Arc<dyn DirectiveReviewer>>,
    resolver: Option<StrategyResolver>,
    state: LoopState,
    _c: PhantomData<C>,
}

impl Default for LoopControllerBuilder<Missing> {
    fn default() -> Self {
        Self {
            cfg: None,
            clock: None,
            modulators: Vec::new(),
            reviewer: None,
            resolver: None,
            state: LoopState::default(),
            _c: PhantomData,
        }
    }
}

impl LoopControllerBuilder<Missing> {
    pub fn with_config(self, cfg: LoopCfg) -> LoopControllerBuilder<Set> {
        LoopControllerBuilder {
            cfg: Some(cfg),
            clock: self.clock,
            modulators: self.modulators,
            reviewer: self.reviewer,
            resolver: self.resolver,
            state: self.state,
            _c: PhantomData,
        }
    }
}

impl LoopControllerBuilder<Set> {
    pub fn build(self) -> Result<LoopController> {
        self.try_build()
    }
}

impl<C> LoopControllerBuilder<C> {
    /// Defaults to `SystemClock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_modulator(mut self, m: impl Modulator + Send + Sync + 'static) -> Self {
        self.modulators.push(Box::new(m));
        self
    }

    pub fn with_reviewer(mut self, reviewer: Arc<dyn DirectiveReviewer>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    /// Replace the default strategy order.
    pub fn with_strategies(mut self, resolver: StrategyResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Resume from a previously persisted state.
    pub fn with_state(mut self, state: LoopState) -> Self {
        self.state = state;
        self
    }

    pub fn try_build(self) -> Result<LoopController> {
        let cfg = self
            .cfg
            .ok_or_else(|| eyre::Report::new(BuildError::MissingConfig))?;
        validate(&cfg)?;
        let reviewer = self.reviewer.map(ReviewWorker::spawn).transpose()?;
        Ok(LoopController {
            guard: HypoGuard::new(cfg.hypo.clone()),
            capper: DoseCapper::new(cfg.smb.clone(), cfg.explicit.clone(), cfg.activity.clone()),
            basal: BasalResolver::new(cfg.basal.clone(), cfg.activity.clone()),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            modulators: self.modulators,
            reviewer,
            resolver: self.resolver.unwrap_or_default(),
            state: Mutex::new(self.state),
            cfg,
        })
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn validate(cfg: &LoopCfg) -> Result<()> {
    let finite_non_neg = |v: f64| v.is_finite() && v >= 0.0;
    let fraction = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);

    if !finite_non_neg(cfg.hypo.margin_mg_dl) {
        return Err(invalid("hypo margin must be >= 0"));
    }
    if !finite_non_neg(cfg.hypo.release_hold_min) {
        return Err(invalid("hypo release hold must be >= 0"));
    }
    if !(cfg.smb.interval_min.is_finite() && cfg.smb.interval_min > 0.0) {
        return Err(invalid("smb interval must be > 0"));
    }
    if !(cfg.smb.blind_interval_factor.is_finite() && cfg.smb.blind_interval_factor >= 1.0) {
        return Err(invalid("blind interval factor must be >= 1"));
    }
    if !fraction(cfg.smb.blind_smb_fraction) {
        return Err(invalid("blind smb fraction must be in [0, 1]"));
    }
    if !(cfg.smb.delivery_ratio.is_finite()
        && cfg.smb.delivery_ratio > 0.0
        && cfg.smb.delivery_ratio <= 1.0)
    {
        return Err(invalid("delivery ratio must be in (0, 1]"));
    }
    if !(cfg.smb.bolus_step_u.is_finite() && cfg.smb.bolus_step_u > 0.0) {
        return Err(invalid("bolus step must be > 0"));
    }
    if !fraction(cfg.smb.absorption_damp) || !fraction(cfg.smb.absorption_damp_rising) {
        return Err(invalid("absorption damp must be in [0, 1]"));
    }
    if !(cfg.basal.pump_step_uph.is_finite() && cfg.basal.pump_step_uph > 0.0) {
        return Err(invalid("basal pump step must be > 0"));
    }
    if cfg.basal.duration_min == 0 {
        return Err(invalid("basal duration must be >= 1 min"));
    }
    if !finite_non_neg(cfg.explicit.absolute_hard_cap_u) {
        return Err(invalid("explicit hard cap must be >= 0"));
    }
    if !fraction(cfg.advisor.iob_discount) || !fraction(cfg.advisor.min_coverage) {
        return Err(invalid("advisor fractions must be in [0, 1]"));
    }
    if !fraction(cfg.autodrive.large_fraction) || !fraction(cfg.autodrive.small_fraction) {
        return Err(invalid("autodrive fractions must be in [0, 1]"));
    }
    if !(cfg.sensor.stale_after_min.is_finite() && cfg.sensor.stale_after_min > 0.0) {
        return Err(invalid("sensor stale window must be > 0"));
    }
    let m = &cfg.modulation;
    if !(m.min_factor.is_finite() && m.max_factor.is_finite())
        || m.min_factor <= 0.0
        || m.min_factor > 1.0
        || m.max_factor < 1.0
    {
        return Err(invalid("modulation range must satisfy 0 < min <= 1 <= max"));
    }
    if cfg.review.timeout_ms == 0 {
        return Err(invalid("review timeout must be >= 1 ms"));
    }
    for band in [&cfg.activity.light, &cfg.activity.moderate, &cfg.activity.vigorous] {
        if !fraction(band.bolus_damper) {
            return Err(invalid("activity bolus damper must be in [0, 1]"));
        }
        if !(finite_non_neg(band.floor_frac)
            && finite_non_neg(band.ceiling_frac)
            && band.floor_frac <= band.ceiling_frac)
        {
            return Err(invalid("activity band must satisfy 0 <= floor <= ceiling"));
        }
    }
    Ok(())
}
