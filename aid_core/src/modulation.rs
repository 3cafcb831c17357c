//! Bounded modulation factors from optional collaborators.
//!
//! Each `Modulator` returns a multiplicative factor. Whatever it returns is
//! clamped to `[min_factor, max_factor]`. A failing or non-finite collaborator
//! falls back to its last-known-good factor while that is younger than
//! `last_good_max_age_min`, otherwise to neutral 1.0. Failures never abort a cycle.

use aid_traits::{GlucoseSnapshot, ModulationKind, Modulator};

use crate::config::ModulationCfg;
use crate::error::LoopError;
use crate::util::minutes_between;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModulationFactors {
    pub physiological: f64,
    pub hormonal: f64,
    pub trajectory: f64,
}

impl Default for ModulationFactors {
    fn default() -> Self {
        Self::neutral()
    }
}

impl ModulationFactors {
    pub const fn neutral() -> Self {
        Self {
            physiological: 1.0,
            hormonal: 1.0,
            trajectory: 1.0,
        }
    }

    pub fn get(&self, kind: ModulationKind) -> f64 {
        match kind {
            ModulationKind::Physiological => self.physiological,
            ModulationKind::Hormonal => self.hormonal,
            ModulationKind::Trajectory => self.trajectory,
        }
    }

    fn set(&mut self, kind: ModulationKind, v: f64) {
        match kind {
            ModulationKind::Physiological => self.physiological = v,
            ModulationKind::Hormonal => self.hormonal = v,
            ModulationKind::Trajectory => self.trajectory = v,
        }
    }

    /// Scales the neutral basal.
    pub fn basal_multiplier(&self) -> f64 {
        self.physiological * self.hormonal
    }

    /// Scales the prediction-informed bolus estimate.
    pub fn bolus_multiplier(&self) -> f64 {
        self.physiological * self.trajectory
    }

    /// Hormonal damper for the Dose Capper; never amplifies.
    pub fn hormonal_damper(&self) -> f64 {
        self.hormonal.min(1.0)
    }
}

/// Last-known-good factor per collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModulationMemory {
    physiological: Option<(f64, i64)>,
    hormonal: Option<(f64, i64)>,
    trajectory: Option<(f64, i64)>,
}

impl ModulationMemory {
    fn slot(&mut self, kind: ModulationKind) -> &mut Option<(f64, i64)> {
        match kind {
            ModulationKind::Physiological => &mut self.physiological,
            ModulationKind::Hormonal => &mut self.hormonal,
            ModulationKind::Trajectory => &mut self.trajectory,
        }
    }
}

fn kind_name(kind: ModulationKind) -> &'static str {
    match kind {
        ModulationKind::Physiological => "physiological",
        ModulationKind::Hormonal => "hormonal",
        ModulationKind::Trajectory => "trajectory",
    }
}

/// Query every collaborator. Returns the factors plus trail notes for any degraded path.
pub fn collect(
    modulators: &[Box<dyn Modulator + Send + Sync>],
    snapshot: &GlucoseSnapshot,
    memory: &ModulationMemory,
    cfg: &ModulationCfg,
) -> (ModulationFactors, ModulationMemory, Vec<String>) {
    let mut factors = ModulationFactors::neutral();
    let mut memory = *memory;
    let mut notes = Vec::new();
    let now_ms = snapshot.now_ms;

    for m in modulators {
        let kind = m.kind();
        let name = kind_name(kind);
        let outcome = m
            .factor(snapshot)
            .map_err(|e| LoopError::Collaborator {
                name,
                message: e.to_string(),
            })
            .and_then(|v| {
                if v.is_finite() {
                    Ok(v)
                } else {
                    Err(LoopError::Collaborator {
                        name,
                        message: format!("non-finite factor {v}"),
                    })
                }
            });
        match outcome {
            Ok(raw) => {
                let clamped = raw.clamp(cfg.min_factor, cfg.max_factor);
                if (clamped - raw).abs() > f64::EPSILON {
                    tracing::debug!(collaborator = name, raw, clamped, "modulation clamped");
                    notes.push(format!("{name} modulation {raw:.3} clamped to {clamped:.3}"));
                }
                factors.set(kind, clamped);
                *memory.slot(kind) = Some((clamped, now_ms));
            }
            Err(e) => {
                let fallback = match *memory.slot(kind) {
                    Some((v, at))
                        if minutes_between(at, now_ms) <= cfg.last_good_max_age_min
                            && at <= now_ms =>
                    {
                        notes.push(format!("{e}; using last-known-good {v:.3}"));
                        v
                    }
                    _ => {
                        notes.push(format!("{e}; using neutral 1.0"));
                        1.0
                    }
                };
                tracing::warn!(collaborator = name, error = %e, fallback, "modulation failed");
                factors.set(kind, fallback);
            }
        }
    }

    (factors, memory, notes)
}
