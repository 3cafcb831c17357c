//! Test and helper mocks for aid_core

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use aid_traits::{
    CollaboratorError, DirectiveReviewer, GlucoseSnapshot, ModulationKind, Modulator,
    ReviewRequest, ReviewVerdict,
};

use crate::config::{SensorCfg, SmbCfg};
use crate::context::{
    CarbInput, Forecast, GlucoseInput, InsulinInput, LoopContext, LoopInputs, ModeFlags,
    Preferences, Profile,
};
use crate::modulation::ModulationFactors;
use crate::refractory::CooldownState;

/// Returns the same factor every call.
pub struct StaticModulator {
    pub kind: ModulationKind,
    pub factor: f64,
}

impl Modulator for StaticModulator {
    fn kind(&self) -> ModulationKind {
        self.kind
    }

    fn factor(&self, _: &GlucoseSnapshot) -> Result<f64, CollaboratorError> {
        Ok(self.factor)
    }
}

/// Always errors.
pub struct FailingModulator {
    pub kind: ModulationKind,
}

impl Modulator for FailingModulator {
    fn kind(&self) -> ModulationKind {
        self.kind
    }

    fn factor(&self, _: &GlucoseSnapshot) -> Result<f64, CollaboratorError> {
        Err(Box::new(std::io::Error::other("modulator offline")))
    }
}

/// Plays back a script of results, then keeps failing.
pub struct ScriptedModulator {
    pub kind: ModulationKind,
    script: Mutex<Vec<Option<f64>>>,
}

impl ScriptedModulator {
    /// `None` entries fail.
    pub fn new(kind: ModulationKind, mut script: Vec<Option<f64>>) -> Self {
        script.reverse();
        Self {
            kind,
            script: Mutex::new(script),
        }
    }
}

impl Modulator for ScriptedModulator {
    fn kind(&self) -> ModulationKind {
        self.kind
    }

    fn factor(&self, _: &GlucoseSnapshot) -> Result<f64, CollaboratorError> {
        let next = self
            .script
            .lock()
            .map_err(|_| std::io::Error::other("script poisoned"))?
            .pop()
            .flatten();
        next.ok_or_else(|| std::io::Error::other("scripted failure").into())
    }
}

/// Returns a fixed verdict and counts calls.
pub struct FixedReviewer {
    pub verdict: ReviewVerdict,
    pub calls: AtomicUsize,
}

impl FixedReviewer {
    pub fn new(verdict: ReviewVerdict) -> Self {
        Self {
            verdict,
            calls: AtomicUsize::new(0),
        }
    }
}

impl DirectiveReviewer for FixedReviewer {
    fn review(&self, _: &ReviewRequest) -> Result<ReviewVerdict, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.verdict.clone())
    }
}

/// Sleeps before answering; used to exercise the review timeout.
pub struct SlowReviewer {
    pub delay: Duration,
    pub verdict: ReviewVerdict,
}

impl DirectiveReviewer for SlowReviewer {
    fn review(&self, _: &ReviewRequest) -> Result<ReviewVerdict, CollaboratorError> {
        std::thread::sleep(self.delay);
        Ok(self.verdict.clone())
    }
}

pub struct FailingReviewer;

impl DirectiveReviewer for FailingReviewer {
    fn review(&self, _: &ReviewRequest) -> Result<ReviewVerdict, CollaboratorError> {
        Err(Box::new(std::io::Error::other("reviewer offline")))
    }
}

/// Flat forecast series of `n` points at `bg`.
pub fn flat_series(bg: f64, n: usize) -> Vec<f64> {
    vec![bg; n]
}

/// Clean, in-range inputs at `now_ms`: fresh reading, full forecast at `bg`,
/// no boluses, default profile and preferences.
pub fn inputs_at(now_ms: i64, bg: f64, delta: f64) -> LoopInputs {
    LoopInputs {
        glucose: GlucoseInput {
            bg,
            delta,
            short_avg_delta: delta,
            long_avg_delta: delta,
            acceleration: 0.0,
            noise: 0,
            reading_at_ms: now_ms,
        },
        insulin: InsulinInput {
            iob: 0.0,
            activity_uph: 0.0,
            activity_30m_uph: 0.0,
            minutes_to_peak: None,
            tdd_24h_u: 30.0,
            last_bolus_at_ms: None,
            current_temp: None,
        },
        carbs: CarbInput::default(),
        forecast: Forecast {
            predicted_bg: Some(bg),
            eventual_bg: Some(bg),
            series: flat_series(bg, 12),
        },
        profile: Profile::default(),
        preferences: Preferences::default(),
        modes: ModeFlags::default(),
        time_in_range: None,
    }
}

/// Context for `inputs_at(0, bg, delta)` with default config and neutral modulation.
pub fn context_at(bg: f64, delta: f64) -> LoopContext {
    LoopContext::build(
        &inputs_at(0, bg, delta),
        0,
        &CooldownState::default(),
        ModulationFactors::neutral(),
        &SensorCfg::default(),
        &SmbCfg::default(),
    )
}
