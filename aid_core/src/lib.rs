#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Closed-loop insulin dosing decision core (device-agnostic).
//!
//! Every ~5 minutes `LoopController::run_cycle` turns one `LoopInputs`
//! snapshot into a `DosingDirective`: a temp basal, an optional bolus (SMB),
//! and an append-only reason trail. Pump, CGM and persistence stay outside;
//! optional collaborators plug in through `aid_traits`.
//!
//! ## Pipeline
//!
//! - **Context**: inputs sanitized once into an immutable `LoopContext` (`context`)
//! - **Threshold** and **HypoGuard** with release hysteresis (`threshold`, `hypo_guard`)
//! - **Safety assessment** shared by basal and bolus paths (`safety`)
//! - **Strategies** in priority order, first effective action wins (`strategy`)
//! - **Dose Capper** with the embedded refractory gate (`dose_capper`, `refractory`)
//! - **Basal Resolver** for temp-basal floors, boosts and caps (`basal`)
//! - **Review** by an optional collaborator, reduce-only (`review`)
//!
//! ## State
//!
//! Only the hypo guard hysteresis, the cooldown clocks and the modulation
//! memory persist between cycles (`controller::LoopState`). Everything else is
//! recomputed from the inputs.

pub mod basal;
pub mod config;
pub mod context;
pub mod controller;
pub mod conversions;
pub mod directive;
pub mod dose_capper;
pub mod error;
pub mod hypo_guard;
pub mod mocks;
pub mod modulation;
pub mod refractory;
pub mod review;
pub mod runner;
pub mod safety;
pub mod strategy;
pub mod threshold;
pub mod util;

pub use basal::{BasalPlan, BasalResolver};
pub use config::LoopCfg;
pub use context::{LoopContext, LoopInputs};
pub use controller::{CycleReport, LoopController, LoopControllerBuilder, LoopState};
pub use directive::{DosingDirective, ReasonTrail};
pub use dose_capper::{DoseCapper, DoseGateAudit, DoseKind, GateRequest, GateStage};
pub use error::{BuildError, LoopError, Result};
pub use hypo_guard::{HypoGuard, HypoVerdict, HysteresisState};
pub use safety::SafetyDecision;
pub use strategy::{DecisionResult, DecisionSource, StrategyResolver};
pub use threshold::hypo_threshold;
