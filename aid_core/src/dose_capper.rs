//! Staged bolus gating.
//!
//! `DoseCapper::gate` runs a proposed bolus through fixed stages. Every stage
//! can only lower the running value, and every stage appends an audit entry
//! whether it fired or not:
//!
//! 1. critical-safety zero-out (skipped for explicit actions)
//! 2. context dampers (exercise, hormonal, cycle safety factor), each capped at 1.0
//! 3. refractory gate
//! 4. absorption guard
//! 5. ceilings: max SMB then remaining IOB room. A confirmed meal swaps max SMB
//!    for the absolute hard cap; an explicit action uses the hard cap alone
//! 6. pump bolus increment (round down)

use crate::config::{ActivityCfg, ExplicitCfg, SmbCfg};
use crate::context::{ExerciseIntensity, LoopContext};
use crate::hypo_guard::HypoVerdict;
use crate::refractory::{RefractoryGate, RefractoryVerdict};
use crate::safety::SafetyDecision;
use crate::util::floor_to_step;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStage {
    CriticalSafety,
    ExerciseDamper,
    HormonalDamper,
    SafetyFactor,
    Refractory,
    Absorption,
    SmbCeiling,
    IobCeiling,
    ExplicitHardCap,
    PumpStep,
}

impl GateStage {
    pub fn as_str(self) -> &'static str {
        match self {
            GateStage::CriticalSafety => "critical_safety",
            GateStage::ExerciseDamper => "exercise_damper",
            GateStage::HormonalDamper => "hormonal_damper",
            GateStage::SafetyFactor => "safety_factor",
            GateStage::Refractory => "refractory",
            GateStage::Absorption => "absorption",
            GateStage::SmbCeiling => "smb_ceiling",
            GateStage::IobCeiling => "iob_ceiling",
            GateStage::ExplicitHardCap => "explicit_hard_cap",
            GateStage::PumpStep => "pump_step",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateEntry {
    pub stage: GateStage,
    pub before: f64,
    pub after: f64,
    pub fired: bool,
    pub note: String,
}

/// Write-only record of one gating pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DoseGateAudit {
    pub proposed: f64,
    /// After stages 1–4.
    pub gated: f64,
    /// After stage 5.
    pub capped: f64,
    pub final_units: f64,
    pub kind: DoseKind,
    pub entries: Vec<GateEntry>,
}

impl DoseGateAudit {
    /// Stages that changed the value, in order.
    pub fn fired(&self) -> impl Iterator<Item = &GateEntry> {
        self.entries.iter().filter(|e| e.fired)
    }

    pub fn fired_stage(&self, stage: GateStage) -> bool {
        self.fired().any(|e| e.stage == stage)
    }

    /// One-line summary for the reason trail.
    pub fn summary(&self) -> String {
        let fired: Vec<&str> = self.fired().map(|e| e.stage.as_str()).collect();
        if fired.is_empty() {
            format!(
                "dose gate: {:.2} U proposed, {:.2} U final",
                self.proposed, self.final_units
            )
        } else {
            format!(
                "dose gate: {:.2} U proposed, {:.2} U final ({})",
                self.proposed,
                self.final_units,
                fired.join(", ")
            )
        }
    }
}

/// How much of the gate a bolus request may skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoseKind {
    /// Every stage applies.
    Automated,
    /// User-confirmed carbs: the SMB ceiling becomes the absolute hard cap.
    /// Critical zero-out, refractory gate and IOB ceiling still apply.
    ConfirmedMeal,
    /// User-initiated (meal mode): skips the critical zero-out, the refractory
    /// gate and both ceilings, bounded by the absolute hard cap instead.
    Explicit,
}

impl DoseKind {
    pub fn uses_hard_cap(self) -> bool {
        !matches!(self, DoseKind::Automated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateRequest {
    pub proposed_u: f64,
    pub kind: DoseKind,
}

impl GateRequest {
    pub fn automated(proposed_u: f64) -> Self {
        Self {
            proposed_u,
            kind: DoseKind::Automated,
        }
    }

    pub fn confirmed_meal(proposed_u: f64) -> Self {
        Self {
            proposed_u,
            kind: DoseKind::ConfirmedMeal,
        }
    }

    pub fn explicit(proposed_u: f64) -> Self {
        Self {
            proposed_u,
            kind: DoseKind::Explicit,
        }
    }
}

/// Running value plus audit; each `apply` can only lower the value.
struct Stages {
    value: f64,
    entries: Vec<GateEntry>,
}

impl Stages {
    fn apply(&mut self, stage: GateStage, candidate: f64, note: impl Into<String>) {
        let before = self.value;
        let after = if candidate.is_finite() {
            candidate.clamp(0.0, before)
        } else {
            0.0
        };
        let fired = after < before;
        let note = note.into();
        if fired {
            tracing::debug!(stage = stage.as_str(), before, after, note = %note, "dose gate");
        }
        self.value = after;
        self.entries.push(GateEntry {
            stage,
            before,
            after,
            fired,
            note,
        });
    }
}

#[derive(Debug, Clone, Default)]
pub struct DoseCapper {
    smb: SmbCfg,
    explicit: ExplicitCfg,
    activity: ActivityCfg,
    refractory: RefractoryGate,
}

impl DoseCapper {
    pub fn new(smb: SmbCfg, explicit: ExplicitCfg, activity: ActivityCfg) -> Self {
        Self {
            refractory: RefractoryGate::new(smb.clone()),
            smb,
            explicit,
            activity,
        }
    }

    /// Max SMB for this cycle: the high-BG preference when high, scaled by
    /// `blind_smb_fraction` while the forecast is missing.
    pub fn smb_ceiling(&self, ctx: &LoopContext) -> f64 {
        let base = if ctx.bg >= self.smb.high_bg_threshold {
            ctx.prefs.max_smb_high_bg_u
        } else {
            ctx.prefs.max_smb_u
        };
        if ctx.forecast_available {
            base
        } else {
            base * self.smb.blind_smb_fraction
        }
    }

    /// Remaining room under max IOB.
    pub fn iob_room(&self, ctx: &LoopContext) -> f64 {
        (ctx.prefs.max_iob_u - ctx.iob).max(0.0)
    }

    pub fn hard_cap(&self) -> f64 {
        self.explicit.absolute_hard_cap_u.max(0.0)
    }

    /// Upper bound a bolus of `kind` can reach this cycle.
    pub fn ceiling(&self, ctx: &LoopContext, kind: DoseKind) -> f64 {
        match kind {
            DoseKind::Automated => self.smb_ceiling(ctx).min(self.iob_room(ctx)).max(0.0),
            DoseKind::ConfirmedMeal => self.hard_cap().min(self.iob_room(ctx)),
            DoseKind::Explicit => self.hard_cap(),
        }
    }

    fn critical_conditions(
        &self,
        ctx: &LoopContext,
        hypo: &HypoVerdict,
        safety: &SafetyDecision,
    ) -> Vec<String> {
        let mut hits = Vec::new();
        if !ctx.quality.is_usable() {
            hits.push("sensor data unusable".to_string());
        }
        if hypo.is_blocked() {
            hits.push(hypo.describe());
        }
        if safety.is_low_glucose_risk {
            hits.push("low glucose risk".to_string());
        }
        if ctx.modes.sensitive_phase && ctx.delta < 0.0 {
            hits.push(format!("falling {:+.1} during sensitive phase", ctx.delta));
        }
        if ctx.delta <= self.smb.excessive_drop_delta {
            hits.push(format!("delta {:+.1} excessive drop", ctx.delta));
        }
        if ctx.modes.fasting {
            hits.push("fasting".to_string());
        }
        if ctx.modes.recent_calibration {
            hits.push("recent calibration".to_string());
        }
        if ctx.bg < self.smb.absolute_floor_bg {
            hits.push(format!(
                "bg {:.0} below floor {:.0}",
                ctx.bg, self.smb.absolute_floor_bg
            ));
        }
        hits
    }

    fn exercise_damper(&self, ctx: &LoopContext) -> f64 {
        match ctx.modes.exercise {
            None => 1.0,
            Some(ExerciseIntensity::Light) => self.activity.light.bolus_damper,
            Some(ExerciseIntensity::Moderate) => self.activity.moderate.bolus_damper,
            Some(ExerciseIntensity::Vigorous) => self.activity.vigorous.bolus_damper,
        }
        .min(1.0)
    }

    fn apply_iob_ceiling(&self, s: &mut Stages, ctx: &LoopContext) {
        let room = self.iob_room(ctx);
        s.apply(
            GateStage::IobCeiling,
            s.value.min(room),
            format!(
                "iob room {room:.2} U (max {:.2}, iob {:.2})",
                ctx.prefs.max_iob_u, ctx.iob
            ),
        );
    }

    pub fn gate(
        &self,
        req: GateRequest,
        ctx: &LoopContext,
        hypo: &HypoVerdict,
        safety: &SafetyDecision,
    ) -> (f64, DoseGateAudit) {
        let proposed = if req.proposed_u.is_finite() {
            req.proposed_u.max(0.0)
        } else {
            0.0
        };
        let mut s = Stages {
            value: proposed,
            entries: Vec::with_capacity(10),
        };

        // 1. critical safety
        let hits = self.critical_conditions(ctx, hypo, safety);
        if hits.is_empty() {
            s.apply(GateStage::CriticalSafety, s.value, "no critical condition");
        } else if req.kind == DoseKind::Explicit {
            s.apply(
                GateStage::CriticalSafety,
                s.value,
                format!("explicit action, zero-out bypassed: {}", hits.join(", ")),
            );
        } else {
            s.apply(GateStage::CriticalSafety, 0.0, hits.join(", "));
        }

        // 2. dampers
        let ex = self.exercise_damper(ctx);
        s.apply(
            GateStage::ExerciseDamper,
            s.value * ex,
            format!("exercise x{ex:.2}"),
        );
        let hormonal = ctx.modulation.hormonal_damper();
        s.apply(
            GateStage::HormonalDamper,
            s.value * hormonal,
            format!("hormonal x{hormonal:.2}"),
        );
        let factor = safety.bolus_factor.clamp(0.0, 1.0);
        s.apply(
            GateStage::SafetyFactor,
            s.value * factor,
            format!("safety x{factor:.2}"),
        );

        // 3. refractory
        let bypass = req.kind == DoseKind::Explicit;
        match self
            .refractory
            .check(ctx.minutes_since_bolus, ctx.forecast_available, bypass)
        {
            RefractoryVerdict::Blocked {
                minutes_since,
                interval_min,
            } => s.apply(
                GateStage::Refractory,
                0.0,
                format!("last bolus {minutes_since:.1} min ago < {interval_min:.1} min"),
            ),
            RefractoryVerdict::Open { interval_min } => s.apply(
                GateStage::Refractory,
                s.value,
                format!("open, interval {interval_min:.1} min"),
            ),
            RefractoryVerdict::Bypassed => {
                s.apply(GateStage::Refractory, s.value, "bypassed by explicit action")
            }
        }

        // 4. absorption guard
        let hourly_tdd = ctx.tdd_24h_u / 24.0;
        let recent = ctx
            .minutes_since_bolus
            .is_some_and(|m| m < self.smb.absorption_window_min);
        if recent && hourly_tdd > 0.0 && ctx.activity_uph > self.smb.absorption_activity_frac * hourly_tdd
        {
            let damp = if ctx.bg >= self.smb.high_bg_threshold && ctx.delta > 0.0 {
                self.smb.absorption_damp_rising
            } else {
                self.smb.absorption_damp
            };
            s.apply(
                GateStage::Absorption,
                s.value * damp.min(1.0),
                format!(
                    "activity {:.2} U/h > {:.0}% of hourly tdd, x{damp:.2}",
                    ctx.activity_uph,
                    self.smb.absorption_activity_frac * 100.0
                ),
            );
        } else {
            let note = if recent && hourly_tdd <= 0.0 {
                "tdd unknown, guard skipped"
            } else {
                "insulin not stacking"
            };
            s.apply(GateStage::Absorption, s.value, note);
        }
        let gated = s.value;

        // 5. ceilings
        match req.kind {
            DoseKind::Automated => {
                let smb_cap = self.smb_ceiling(ctx);
                let note = if ctx.forecast_available {
                    format!("max smb {smb_cap:.2} U")
                } else {
                    format!("max smb {smb_cap:.2} U (prediction missing)")
                };
                s.apply(GateStage::SmbCeiling, s.value.min(smb_cap), note);
                self.apply_iob_ceiling(&mut s, ctx);
            }
            DoseKind::ConfirmedMeal => {
                let cap = self.hard_cap();
                s.apply(
                    GateStage::ExplicitHardCap,
                    s.value.min(cap),
                    format!("confirmed meal: max smb replaced by hard cap {cap:.2} U"),
                );
                self.apply_iob_ceiling(&mut s, ctx);
            }
            DoseKind::Explicit => {
                let cap = self.hard_cap();
                let iob_room = self.iob_room(ctx);
                let note = if s.value > iob_room {
                    format!("explicit: iob ceiling {iob_room:.2} U bypassed, hard cap {cap:.2} U")
                } else {
                    format!("explicit: hard cap {cap:.2} U")
                };
                s.apply(GateStage::ExplicitHardCap, s.value.min(cap), note);
            }
        }
        let capped = s.value;

        // 6. pump increment
        let stepped = floor_to_step(s.value, self.smb.bolus_step_u);
        s.apply(
            GateStage::PumpStep,
            stepped,
            format!("step {:.2} U", self.smb.bolus_step_u),
        );

        let final_units = s.value;
        let audit = DoseGateAudit {
            proposed,
            gated,
            capped,
            final_units,
            kind: req.kind,
            entries: s.entries,
        };
        (final_units, audit)
    }
}
