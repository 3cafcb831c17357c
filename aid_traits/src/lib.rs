pub mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

/// Boxed error used at every collaborator boundary.
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// Minimal glucose/insulin view handed to optional collaborators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlucoseSnapshot {
    pub now_ms: i64,
    pub bg: f64,
    pub delta: f64,
    pub iob: f64,
    pub cob: f64,
}

/// Which part of the loop a modulation factor feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModulationKind {
    /// Sleep/HRV style scoring; scales basal and bolus sensitivity.
    Physiological,
    /// Cycle-phase adjustment; scales basal, damps boluses.
    Hormonal,
    /// Trend/trajectory model; scales the bolus estimate.
    Trajectory,
}

/// Produces a multiplicative factor around 1.0. The core clamps whatever comes back.
pub trait Modulator {
    fn kind(&self) -> ModulationKind;
    fn factor(&self, snapshot: &GlucoseSnapshot) -> Result<f64, CollaboratorError>;
}

/// A computed, not yet delivered directive, as seen by a reviewer.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRequest {
    pub snapshot: GlucoseSnapshot,
    pub bolus_units: f64,
    pub basal_rate_uph: f64,
    pub basal_duration_min: u32,
    pub trail: Vec<String>,
}

/// Reviewer answer. `None` keeps the original field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewVerdict {
    pub bolus_units: Option<f64>,
    pub basal_rate_uph: Option<f64>,
    pub note: Option<String>,
}

/// Post-hoc reviewer; may be slow, runs off the control thread.
pub trait DirectiveReviewer: Send + Sync {
    fn review(&self, request: &ReviewRequest) -> Result<ReviewVerdict, CollaboratorError>;
}
