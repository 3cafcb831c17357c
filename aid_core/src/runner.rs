//! Deterministic replay of recorded inputs through a `LoopController`.

use std::ops::ControlFlow;

use aid_traits::clock::ManualClock;

use crate::context::LoopInputs;
use crate::controller::{CycleReport, LoopController};
use crate::strategy::DecisionSource;

/// One recorded tick.
#[derive(Debug, Clone)]
pub struct ReplayStep {
    pub at_ms: i64,
    pub inputs: LoopInputs,
}

#[derive(Debug, Clone, Default)]
pub struct ReplaySummary {
    pub reports: Vec<CycleReport>,
    pub cycles: usize,
    pub boluses: usize,
    pub total_bolus_u: f64,
    pub halts: usize,
    /// Replay stopped before the last step.
    pub interrupted: bool,
}

/// Run `steps` in order, pinning `clock` to each step's timestamp.
///
/// `controller` must have been built with a clone of `clock`. Each delivered
/// bolus is fed back as the last-bolus time of later steps whose inputs carry
/// none, the way a pump would report it. `on_cycle` may stop the replay early.
pub fn replay<I, F>(
    controller: &LoopController,
    clock: &ManualClock,
    steps: I,
    mut on_cycle: F,
) -> ReplaySummary
where
    I: IntoIterator<Item = ReplayStep>,
    F: FnMut(&CycleReport) -> ControlFlow<()>,
{
    let mut summary = ReplaySummary::default();
    let mut delivered_at: Option<i64> = None;

    for step in steps {
        clock.set_ms(step.at_ms);
        let mut inputs = step.inputs;
        inputs.insulin.last_bolus_at_ms = match (inputs.insulin.last_bolus_at_ms, delivered_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        let report = controller.run_cycle_report(&inputs);
        let d = &report.directive;
        summary.cycles += 1;
        if d.delivers_bolus() {
            summary.boluses += 1;
            summary.total_bolus_u += d.bolus_units;
            delivered_at = Some(step.at_ms);
        }
        if d.source == DecisionSource::SafetyHalt {
            summary.halts += 1;
        }
        tracing::debug!(
            at_ms = step.at_ms,
            source = %d.source,
            bolus_u = d.bolus_units,
            "replay step"
        );

        let flow = on_cycle(&report);
        summary.reports.push(report);
        if flow.is_break() {
            summary.interrupted = true;
            break;
        }
    }

    summary
}
