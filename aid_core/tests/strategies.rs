//! Strategy ordering, demotion and per-strategy cooldowns through the controller.

use std::sync::Arc;

use aid_core::context::{ActiveMealMode, LoopInputs, MealEstimate, MealKind};
use aid_core::mocks::inputs_at;
use aid_core::strategy::{Applied, SafetyHalt};
use aid_core::{
    DecisionResult, DecisionSource, LoopCfg, LoopController, StrategyResolver,
};
use aid_traits::ManualClock;
use rstest::rstest;

const NOW: i64 = 1_700_000_000_000;
const MIN: i64 = 60_000;

fn controller(clock: &ManualClock) -> LoopController {
    LoopController::builder()
        .with_config(LoopCfg::default())
        .with_clock(Arc::new(clock.clone()))
        .build()
        .unwrap()
}

/// Same inputs with a fresh reading at the clock's current time.
fn at(clock: &ManualClock, inputs: &LoopInputs) -> LoopInputs {
    use aid_traits::Clock;
    let mut i = inputs.clone();
    i.glucose.reading_at_ms = clock.now_ms();
    i
}

#[rstest]
fn default_priority_order() {
    assert_eq!(
        StrategyResolver::default().order(),
        vec![
            DecisionSource::SafetyHalt,
            DecisionSource::ConfirmedMealAdvisor,
            DecisionSource::Autodrive,
            DecisionSource::ScheduledMealMode,
            DecisionSource::GeneralFallback,
        ]
    );
}

#[rstest]
fn empty_action_is_a_fallthrough() {
    let r = DecisionResult::applied(Applied::new(DecisionSource::Autodrive, "nothing"));
    assert!(matches!(
        r,
        DecisionResult::Fallthrough { source: DecisionSource::Autodrive, .. }
    ));
}

#[rstest]
fn autodrive_capped_to_zero_is_demoted() {
    let clock = ManualClock::new(NOW);
    let mut inputs = inputs_at(NOW, 180.0, 6.0);
    inputs.insulin.iob = 6.0;

    let d = controller(&clock).run_cycle(&inputs);

    assert_eq!(d.source, DecisionSource::GeneralFallback);
    assert_eq!(d.bolus_units, 0.0);
    assert!(d.trail.mentions("autodrive: demoted, no net effect after capping"));
}

#[rstest]
fn autodrive_respects_its_cooldown() {
    let clock = ManualClock::new(NOW);
    let c = controller(&clock);
    let inputs = inputs_at(NOW, 180.0, 6.0);

    let first = c.run_cycle(&inputs);
    assert_eq!(first.source, DecisionSource::Autodrive);

    clock.advance_min(10);
    let second = c.run_cycle(&at(&clock, &inputs));
    assert_ne!(second.source, DecisionSource::Autodrive);
    assert!(second.trail.mentions("cooldown: last autodrive 10 min ago"));
}

#[rstest]
fn advisor_covers_each_estimate_once() {
    let clock = ManualClock::new(NOW);
    let c = controller(&clock);
    let mut inputs = inputs_at(NOW, 140.0, 1.0);
    inputs.carbs.estimate = Some(MealEstimate {
        carbs_g: 30.0,
        at_ms: NOW - 5 * MIN,
    });

    let first = c.run_cycle(&inputs);
    assert_eq!(first.source, DecisionSource::ConfirmedMealAdvisor);
    assert_eq!(
        c.state_snapshot().cooldown.advised_meal_at_ms,
        Some(NOW - 5 * MIN)
    );

    // At target, so the fallback adds no bolus of its own.
    clock.advance_min(50);
    let mut settled = inputs_at(NOW + 50 * MIN, 110.0, 1.0);
    settled.carbs = inputs.carbs.clone();
    let second = c.run_cycle(&settled);
    assert_ne!(second.source, DecisionSource::ConfirmedMealAdvisor);
    assert!(second.trail.mentions("estimate already covered"));

    let mut next_meal = inputs.clone();
    next_meal.carbs.estimate = Some(MealEstimate {
        carbs_g: 20.0,
        at_ms: NOW + 48 * MIN,
    });
    clock.advance_min(1);
    let third = c.run_cycle(&at(&clock, &next_meal));
    assert_eq!(third.source, DecisionSource::ConfirmedMealAdvisor);
}

#[rstest]
fn advisor_waits_after_recent_bolus() {
    let clock = ManualClock::new(NOW);
    let mut inputs = inputs_at(NOW, 140.0, 1.0);
    inputs.insulin.last_bolus_at_ms = Some(NOW - 20 * MIN);
    inputs.carbs.estimate = Some(MealEstimate {
        carbs_g: 30.0,
        at_ms: NOW - 5 * MIN,
    });
    let d = controller(&clock).run_cycle(&inputs);
    assert_ne!(d.source, DecisionSource::ConfirmedMealAdvisor);
    assert!(d.trail.mentions("last bolus 20 min ago"));
}

#[rstest]
fn meal_mode_delivers_each_phase_once() {
    let clock = ManualClock::new(NOW);
    let c = controller(&clock);
    let base = inputs_at(NOW, 120.0, 0.0);
    let tick = |elapsed: i64| {
        clock.set_ms(NOW + elapsed * MIN);
        let mut i = at(&clock, &base);
        i.modes.meal_mode = Some(ActiveMealMode {
            kind: MealKind::Lunch,
            elapsed_min: elapsed as f64,
        });
        c.run_cycle(&i)
    };

    let phase1 = tick(0);
    assert_eq!(phase1.source, DecisionSource::ScheduledMealMode);
    assert!((phase1.bolus_units - 2.0).abs() < 1e-9);

    let waiting = tick(5);
    assert_ne!(waiting.source, DecisionSource::ScheduledMealMode);
    assert!(waiting.trail.mentions("lunch phase 2 due in 15 min"));

    let phase2 = tick(20);
    assert_eq!(phase2.source, DecisionSource::ScheduledMealMode);
    assert!((phase2.bolus_units - 1.0).abs() < 1e-9);

    let done = tick(25);
    assert_ne!(done.source, DecisionSource::ScheduledMealMode);
    assert!(done.trail.mentions("lunch prebolus phases complete"));
}

#[rstest]
fn meal_mode_phase_two_held_while_falling() {
    let clock = ManualClock::new(NOW);
    let mut inputs = inputs_at(NOW, 150.0, -3.0);
    inputs.modes.meal_mode = Some(ActiveMealMode {
        kind: MealKind::Dinner,
        elapsed_min: 35.0,
    });
    let d = controller(&clock).run_cycle(&inputs);
    assert_ne!(d.source, DecisionSource::ScheduledMealMode);
    assert!(d.trail.mentions("dinner phase 2 held: bg falling"));
}

#[rstest]
fn stale_reading_halts() {
    let clock = ManualClock::new(NOW);
    let mut inputs = inputs_at(NOW, 150.0, 0.0);
    inputs.glucose.reading_at_ms = NOW - 15 * MIN;
    let d = controller(&clock).run_cycle(&inputs);
    assert_eq!(d.source, DecisionSource::SafetyHalt);
    assert_eq!(d.basal_rate_uph, 0.0);
    assert!(d.trail.mentions("safety halt: data stale"));
}

#[rstest]
fn missing_reading_halts() {
    let clock = ManualClock::new(NOW);
    let inputs = inputs_at(NOW, f64::NAN, 0.0);
    let d = controller(&clock).run_cycle(&inputs);
    assert_eq!(d.source, DecisionSource::SafetyHalt);
    assert_eq!(d.bolus_units, 0.0);
    assert!(d.trail.mentions("safety halt: data missing"));
}

#[rstest]
fn resolver_without_fallback_uses_basal_plan() {
    let clock = ManualClock::new(NOW);
    let c = LoopController::builder()
        .with_config(LoopCfg::default())
        .with_clock(Arc::new(clock.clone()))
        .with_strategies(StrategyResolver::new(vec![Box::new(SafetyHalt)]))
        .build()
        .unwrap();
    let d = c.run_cycle(&inputs_at(NOW, 150.0, 0.0));
    assert_eq!(d.source, DecisionSource::GeneralFallback);
    assert_eq!(d.bolus_units, 0.0);
    assert!(d.trail.mentions("no strategy applied"));
    assert!((d.basal_rate_uph - 1.0).abs() < 1e-9);
}
