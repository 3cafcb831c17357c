use std::sync::Arc;

use aid_core::mocks::{FailingModulator, ScriptedModulator, StaticModulator, inputs_at};
use aid_core::{LoopCfg, LoopController};
use aid_traits::{Clock, ManualClock, ModulationKind};
use rstest::rstest;

const NOW: i64 = 1_700_000_000_000;

fn build(clock: &ManualClock, m: impl aid_traits::Modulator + Send + Sync + 'static) -> LoopController {
    LoopController::builder()
        .with_config(LoopCfg::default())
        .with_clock(Arc::new(clock.clone()))
        .with_modulator(m)
        .build()
        .unwrap()
}

#[rstest]
#[case::above_range(2.0, 1.15)]
#[case::below_range(0.1, 0.85)]
#[case::inside_range(0.9, 0.9)]
fn physiological_factor_is_clamped(#[case] raw: f64, #[case] basal: f64) {
    let clock = ManualClock::new(NOW);
    let c = build(
        &clock,
        StaticModulator {
            kind: ModulationKind::Physiological,
            factor: raw,
        },
    );
    let d = c.run_cycle(&inputs_at(NOW, 110.0, 0.0));
    assert!((d.basal_rate_uph - basal).abs() < 1e-9, "got {}", d.basal_rate_uph);
}

#[rstest]
fn clamping_is_noted_in_trail() {
    let clock = ManualClock::new(NOW);
    let c = build(
        &clock,
        StaticModulator {
            kind: ModulationKind::Trajectory,
            factor: 3.0,
        },
    );
    let d = c.run_cycle(&inputs_at(NOW, 110.0, 0.0));
    assert!(d.trail.mentions("trajectory modulation 3.000 clamped to 1.150"));
}

#[rstest]
fn failing_modulator_never_aborts_the_cycle() {
    let clock = ManualClock::new(NOW);
    let c = build(
        &clock,
        FailingModulator {
            kind: ModulationKind::Hormonal,
        },
    );
    let d = c.run_cycle(&inputs_at(NOW, 110.0, 0.0));
    assert!((d.basal_rate_uph - 1.0).abs() < 1e-9);
    assert!(d.trail.mentions("using neutral 1.0"));
}

#[rstest]
fn last_known_good_expires() {
    let clock = ManualClock::new(NOW);
    let c = build(
        &clock,
        ScriptedModulator::new(ModulationKind::Physiological, vec![Some(0.9), None, None]),
    );
    let tick = |clock: &ManualClock| inputs_at(clock.now_ms(), 110.0, 0.0);

    let first = c.run_cycle(&tick(&clock));
    assert!((first.basal_rate_uph - 0.9).abs() < 1e-9);

    clock.advance_min(10);
    let second = c.run_cycle(&tick(&clock));
    assert!(second.trail.mentions("using last-known-good 0.900"));
    assert!((second.basal_rate_uph - 0.9).abs() < 1e-9);

    clock.advance_min(30);
    let third = c.run_cycle(&tick(&clock));
    assert!(third.trail.mentions("using neutral 1.0"));
    assert!((third.basal_rate_uph - 1.0).abs() < 1e-9);
}
