use std::ops::ControlFlow;
use std::sync::Arc;

use aid_core::mocks::inputs_at;
use aid_core::runner::{ReplayStep, replay};
use aid_core::{DecisionSource, LoopCfg, LoopController};
use aid_traits::ManualClock;
use rstest::rstest;

const NOW: i64 = 1_700_000_000_000;
const MIN: i64 = 60_000;

fn steps(bgs: &[f64], spacing_min: i64) -> Vec<ReplayStep> {
    bgs.iter()
        .enumerate()
        .map(|(n, &bg)| {
            let at_ms = NOW + n as i64 * spacing_min * MIN;
            ReplayStep {
                at_ms,
                inputs: inputs_at(at_ms, bg, 0.0),
            }
        })
        .collect()
}

fn controller(clock: &ManualClock) -> LoopController {
    LoopController::builder()
        .with_config(LoopCfg::default())
        .with_clock(Arc::new(clock.clone()))
        .build()
        .unwrap()
}

#[rstest]
fn replay_counts_boluses_and_halts() {
    let clock = ManualClock::new(0);
    let c = controller(&clock);
    let summary = replay(&c, &clock, steps(&[200.0, 200.0, 60.0, 200.0], 5), |_| {
        ControlFlow::Continue(())
    });

    assert_eq!(summary.cycles, 4);
    assert_eq!(summary.halts, 1);
    assert!(!summary.interrupted);
    assert_eq!(summary.reports[2].directive.source, DecisionSource::SafetyHalt);
    assert!(summary.boluses >= 2);
    let total: f64 = summary.reports.iter().map(|r| r.directive.bolus_units).sum();
    assert!((summary.total_bolus_u - total).abs() < 1e-9);
}

#[rstest]
fn replay_feeds_back_delivered_boluses() {
    let clock = ManualClock::new(0);
    let c = controller(&clock);
    // Four minutes apart: the second tick sits inside the refractory window.
    let summary = replay(&c, &clock, steps(&[200.0, 200.0], 4), |_| ControlFlow::Continue(()));
    assert!(summary.reports[0].directive.bolus_units > 0.0);
    assert_eq!(summary.reports[1].directive.bolus_units, 0.0);
    assert_eq!(summary.boluses, 1);
}

#[rstest]
fn callback_can_stop_replay() {
    let clock = ManualClock::new(0);
    let c = controller(&clock);
    let mut seen = 0;
    let summary = replay(&c, &clock, steps(&[150.0; 5], 5), |_| {
        seen += 1;
        if seen == 2 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    assert!(summary.interrupted);
    assert_eq!(summary.cycles, 2);
    assert_eq!(summary.reports.len(), 2);
}
