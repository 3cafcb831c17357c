//! Dose Capper stage ordering, kinds and guards.

use aid_core::config::{SensorCfg, SmbCfg};
use aid_core::context::{ExerciseIntensity, LoopInputs};
use aid_core::hypo_guard::HypoBlock;
use aid_core::mocks::{context_at, inputs_at};
use aid_core::modulation::ModulationFactors;
use aid_core::refractory::CooldownState;
use aid_core::{
    DoseCapper, DoseKind, GateRequest, GateStage, HypoVerdict, LoopContext, SafetyDecision,
};
use rstest::rstest;

const NOW: i64 = 1_700_000_000_000;
const MIN: i64 = 60_000;

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

fn gate(req: GateRequest, c: &LoopContext) -> (f64, aid_core::DoseGateAudit) {
    DoseCapper::default().gate(req, c, &HypoVerdict::Clear, &SafetyDecision::neutral())
}

#[rstest]
#[case::automated(
    GateRequest::automated(0.8),
    vec![
        GateStage::CriticalSafety,
        GateStage::ExerciseDamper,
        GateStage::HormonalDamper,
        GateStage::SafetyFactor,
        GateStage::Refractory,
        GateStage::Absorption,
        GateStage::SmbCeiling,
        GateStage::IobCeiling,
        GateStage::PumpStep,
    ]
)]
#[case::confirmed_meal(
    GateRequest::confirmed_meal(0.8),
    vec![
        GateStage::CriticalSafety,
        GateStage::ExerciseDamper,
        GateStage::HormonalDamper,
        GateStage::SafetyFactor,
        GateStage::Refractory,
        GateStage::Absorption,
        GateStage::ExplicitHardCap,
        GateStage::IobCeiling,
        GateStage::PumpStep,
    ]
)]
#[case::explicit(
    GateRequest::explicit(0.8),
    vec![
        GateStage::CriticalSafety,
        GateStage::ExerciseDamper,
        GateStage::HormonalDamper,
        GateStage::SafetyFactor,
        GateStage::Refractory,
        GateStage::Absorption,
        GateStage::ExplicitHardCap,
        GateStage::PumpStep,
    ]
)]
fn every_stage_leaves_an_entry(#[case] req: GateRequest, #[case] stages: Vec<GateStage>) {
    let (final_u, audit) = gate(req, &context_at(150.0, 0.0));
    let seen: Vec<GateStage> = audit.entries.iter().map(|e| e.stage).collect();
    assert_eq!(seen, stages);
    assert!((final_u - 0.8).abs() < 1e-9);
    assert_eq!(audit.kind, req.kind);
    for pair in audit.entries.windows(2) {
        assert!((pair[1].before - pair[0].after).abs() < 1e-12);
    }
}

#[rstest]
#[case::fasting(|i: &mut LoopInputs| i.modes.fasting = true)]
#[case::calibration(|i: &mut LoopInputs| i.modes.recent_calibration = true)]
#[case::excessive_drop(|i: &mut LoopInputs| i.glucose.delta = -7.0)]
#[case::below_floor(|i: &mut LoopInputs| i.glucose.bg = 79.0)]
#[case::sensitive_and_falling(|i: &mut LoopInputs| {
    i.modes.sensitive_phase = true;
    i.glucose.delta = -0.5;
})]
#[case::noisy(|i: &mut LoopInputs| i.glucose.noise = 4)]
fn critical_conditions_zero_automated_only(#[case] tweak: fn(&mut LoopInputs)) {
    let mut inputs = inputs_at(NOW, 150.0, 0.0);
    tweak(&mut inputs);
    let c = ctx(&inputs);

    let (auto_u, audit) = gate(GateRequest::automated(1.0), &c);
    assert_eq!(auto_u, 0.0);
    assert!(audit.fired_stage(GateStage::CriticalSafety));

    let (meal_u, _) = gate(GateRequest::confirmed_meal(1.0), &c);
    assert_eq!(meal_u, 0.0);

    let (explicit_u, audit) = gate(GateRequest::explicit(1.0), &c);
    assert!(explicit_u > 0.0);
    assert!(!audit.fired_stage(GateStage::CriticalSafety));
}

#[rstest]
fn hypo_block_zeroes_automated_dose() {
    let c = context_at(150.0, 0.0);
    let (u, audit) = DoseCapper::default().gate(
        GateRequest::automated(1.0),
        &c,
        &HypoVerdict::Blocked(HypoBlock::Holding),
        &SafetyDecision::neutral(),
    );
    assert_eq!(u, 0.0);
    assert!(audit.entries[0].note.contains("hypo guard blocked"));
}

#[rstest]
#[case::light(ExerciseIntensity::Light, 0.8)]
#[case::moderate(ExerciseIntensity::Moderate, 0.6)]
#[case::vigorous(ExerciseIntensity::Vigorous, 0.4)]
fn exercise_damps_by_intensity(#[case] intensity: ExerciseIntensity, #[case] factor: f64) {
    let mut inputs = inputs_at(NOW, 150.0, 0.0);
    inputs.modes.exercise = Some(intensity);
    let (u, audit) = gate(GateRequest::automated(1.0), &ctx(&inputs));
    assert!((u - factor).abs() < 1e-9, "got {u}");
    assert!(audit.fired_stage(GateStage::ExerciseDamper));
}

#[rstest]
fn safety_factor_multiplies_dose() {
    let c = context_at(150.0, 0.0);
    let safety = SafetyDecision {
        bolus_factor: 0.5,
        ..SafetyDecision::neutral()
    };
    let (u, _) = DoseCapper::default().gate(GateRequest::automated(0.8), &c, &HypoVerdict::Clear, &safety);
    assert!((u - 0.4).abs() < 1e-9);
}

#[rstest]
#[case::calm(150.0, 0.0, 0.5)]
#[case::high_and_rising(200.0, 2.0, 0.75)]
fn absorption_guard_damps_stacking(#[case] bg: f64, #[case] delta: f64, #[case] damp: f64) {
    let mut inputs = inputs_at(NOW, bg, delta);
    inputs.insulin.last_bolus_at_ms = Some(NOW - 10 * MIN);
    inputs.insulin.tdd_24h_u = 24.0;
    inputs.insulin.activity_uph = 0.5;
    let (u, audit) = gate(GateRequest::automated(1.0), &ctx(&inputs));
    assert!(audit.fired_stage(GateStage::Absorption));
    assert!((u - damp).abs() < 1e-9, "got {u}");
}

#[rstest]
fn absorption_guard_skipped_when_tdd_unknown() {
    let mut inputs = inputs_at(NOW, 150.0, 0.0);
    inputs.insulin.last_bolus_at_ms = Some(NOW - 10 * MIN);
    inputs.insulin.tdd_24h_u = 0.0;
    inputs.insulin.activity_uph = 2.0;
    let (u, audit) = gate(GateRequest::automated(1.0), &ctx(&inputs));
    assert!((u - 1.0).abs() < 1e-9);
    let entry = audit
        .entries
        .iter()
        .find(|e| e.stage == GateStage::Absorption)
        .expect("absorption entry");
    assert!(entry.note.contains("tdd unknown"));
}

#[rstest]
fn refractory_blocks_automated_and_confirmed_but_not_explicit() {
    let mut inputs = inputs_at(NOW, 150.0, 0.0);
    inputs.insulin.last_bolus_at_ms = Some(NOW - 2 * MIN);
    let c = ctx(&inputs);
    assert_eq!(gate(GateRequest::automated(1.0), &c).0, 0.0);
    assert_eq!(gate(GateRequest::confirmed_meal(1.0), &c).0, 0.0);
    assert!((gate(GateRequest::explicit(1.0), &c).0 - 1.0).abs() < 1e-9);
}

#[rstest]
fn ceilings_differ_by_kind() {
    let mut inputs = inputs_at(NOW, 150.0, 0.0);
    inputs.insulin.iob = 3.0;
    let c = ctx(&inputs);
    let capper = DoseCapper::default();

    // max smb 1.0, iob room 3.0, hard cap 6.0
    assert!((capper.ceiling(&c, DoseKind::Automated) - 1.0).abs() < 1e-9);
    assert!((capper.ceiling(&c, DoseKind::ConfirmedMeal) - 3.0).abs() < 1e-9);
    assert!((capper.ceiling(&c, DoseKind::Explicit) - 6.0).abs() < 1e-9);

    assert!((gate(GateRequest::automated(10.0), &c).0 - 1.0).abs() < 1e-9);
    assert!((gate(GateRequest::confirmed_meal(10.0), &c).0 - 3.0).abs() < 1e-9);
    let (u, audit) = gate(GateRequest::explicit(10.0), &c);
    assert!((u - 6.0).abs() < 1e-9);
    assert!(audit.entries.iter().any(|e| e.note.contains("iob ceiling")));
}

#[rstest]
fn high_bg_uses_high_bg_max_smb() {
    let (u, _) = gate(GateRequest::automated(5.0), &context_at(200.0, 0.0));
    assert!((u - 1.5).abs() < 1e-9);
}

#[rstest]
#[case(0.37, 0.35)]
#[case(0.1, 0.1)]
#[case(0.04, 0.0)]
fn pump_step_rounds_down(#[case] proposed: f64, #[case] expected: f64) {
    let (u, _) = gate(GateRequest::automated(proposed), &context_at(150.0, 0.0));
    assert!((u - expected).abs() < 1e-9, "{proposed} -> {u}");
}

#[rstest]
#[case(f64::NAN)]
#[case(-1.0)]
#[case(f64::INFINITY)]
fn bad_proposals_gate_to_zero(#[case] proposed: f64) {
    let (u, audit) = gate(GateRequest::explicit(proposed), &context_at(150.0, 0.0));
    assert_eq!(u, 0.0);
    assert_eq!(audit.proposed, 0.0);
}

#[rstest]
fn summary_lists_fired_stages() {
    let (_, audit) = gate(GateRequest::automated(3.0), &context_at(150.0, 0.0));
    let s = audit.summary();
    assert!(s.contains("3.00 U proposed"));
    assert!(s.contains("smb_ceiling"));
}
