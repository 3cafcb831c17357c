use aid_core::config::{SensorCfg, SmbCfg};
use aid_core::context::{ActiveMealMode, ExerciseIntensity, LoopInputs, MealKind};
use aid_core::mocks::inputs_at;
use aid_core::modulation::ModulationFactors;
use aid_core::refractory::CooldownState;
use aid_core::{BasalResolver, LoopContext, SafetyDecision};
use rstest::rstest;

const NOW: i64 = 1_700_000_000_000;

fn ctx(inputs: &LoopInputs) -> LoopContext {
    LoopContext::build(
        inputs,
        NOW,
        &CooldownState::default(),
        ModulationFactors::neutral(),
        &SensorCfg::default(),
        &SmbCfg::default(),
    )
}

fn stop(low_risk: bool) -> SafetyDecision {
    SafetyDecision {
        stop_basal: true,
        bolus_factor: 0.0,
        reason: "test stop".to_string(),
        is_low_glucose_risk: low_risk,
    }
}

#[rstest]
fn neutral_rate_follows_autosens() {
    let mut inputs = inputs_at(NOW, 110.0, 0.0);
    inputs.profile.sensitivity_ratio = 1.2;
    let plan = BasalResolver::default().resolve(&ctx(&inputs), &SafetyDecision::neutral());
    assert!((plan.rate_uph - 1.2).abs() < 1e-9);
    assert_eq!(plan.duration_min, 30);
    assert!(!plan.override_safety);
}

#[rstest]
fn low_risk_stop_is_never_lifted() {
    let mut inputs = inputs_at(NOW, 150.0, 2.0);
    inputs.glucose.short_avg_delta = 2.0;
    let plan = BasalResolver::default().resolve(&ctx(&inputs), &stop(true));
    assert_eq!(plan.rate_uph, 0.0);
    assert!(plan.notes.iter().any(|n| n.contains("rise floor suppressed")));
}

#[rstest]
fn rise_floor_overrides_stop_without_low_risk() {
    let mut inputs = inputs_at(NOW, 150.0, 2.0);
    inputs.glucose.short_avg_delta = 2.0;
    let plan = BasalResolver::default().resolve(&ctx(&inputs), &stop(false));
    assert!((plan.rate_uph - 0.8).abs() < 1e-9);
    assert!(plan.override_safety);
}

#[rstest]
#[case::boost_under_ceiling(1.0, 1.5)]
#[case::ceiling_binds(2.0, 2.5)]
fn meal_mode_boost_respects_ceiling(#[case] profile_basal: f64, #[case] expected: f64) {
    let mut inputs = inputs_at(NOW, 110.0, 0.0);
    inputs.profile.current_basal_uph = profile_basal;
    inputs.modes.meal_mode = Some(ActiveMealMode {
        kind: MealKind::Lunch,
        elapsed_min: 10.0,
    });
    let plan = BasalResolver::default().resolve(&ctx(&inputs), &SafetyDecision::neutral());
    assert!((plan.rate_uph - expected).abs() < 1e-9, "got {}", plan.rate_uph);
}

#[rstest]
fn meal_mode_past_runtime_is_ignored() {
    let mut inputs = inputs_at(NOW, 110.0, 0.0);
    inputs.modes.meal_mode = Some(ActiveMealMode {
        kind: MealKind::Lunch,
        elapsed_min: 121.0,
    });
    let c = ctx(&inputs);
    let resolver = BasalResolver::default();
    assert!(!resolver.explicit_bypass(&c));
    let plan = resolver.resolve(&c, &SafetyDecision::neutral());
    assert!((plan.rate_uph - 1.0).abs() < 1e-9);
}

#[rstest]
#[case::light(ExerciseIntensity::Light, 1.0)]
#[case::moderate(ExerciseIntensity::Moderate, 0.8)]
#[case::vigorous(ExerciseIntensity::Vigorous, 0.6)]
fn exercise_band_ceiling(#[case] intensity: ExerciseIntensity, #[case] ceiling: f64) {
    let mut inputs = inputs_at(NOW, 110.0, 0.0);
    inputs.profile.sensitivity_ratio = 1.5;
    inputs.modes.exercise = Some(intensity);
    let plan = BasalResolver::default().resolve(&ctx(&inputs), &SafetyDecision::neutral());
    assert!(plan.rate_uph <= ceiling + 1e-9, "got {}", plan.rate_uph);
}

#[rstest]
fn hard_cap_takes_lowest_limit_unless_explicit() {
    let mut inputs = inputs_at(NOW, 110.0, 0.0);
    inputs.profile.max_daily_basal_uph = 0.5;
    let c = ctx(&inputs);
    let resolver = BasalResolver::default();
    assert!((resolver.hard_cap(&c, false) - 1.5).abs() < 1e-9);
    assert!((resolver.hard_cap(&c, true) - 3.0).abs() < 1e-9);
    assert!((resolver.clamp_rate(5.0, &c, false) - 1.5).abs() < 1e-9);
    assert_eq!(resolver.clamp_rate(f64::NAN, &c, false), 0.0);
    assert_eq!(resolver.clamp_rate(-2.0, &c, true), 0.0);
}

#[rstest]
fn rate_lands_on_pump_step() {
    let mut inputs = inputs_at(NOW, 110.0, 0.0);
    inputs.profile.current_basal_uph = 0.83;
    let plan = BasalResolver::default().resolve(&ctx(&inputs), &SafetyDecision::neutral());
    let steps = plan.rate_uph / 0.05;
    assert!((steps - steps.round()).abs() < 1e-6, "got {}", plan.rate_uph);
}
