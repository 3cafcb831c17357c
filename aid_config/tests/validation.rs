use aid_config::load_toml;
use rstest::rstest;

#[test]
fn empty_document_uses_defaults() {
    let cfg = load_toml("").expect("parse TOML");
    cfg.validate().expect("defaults are valid");
    assert!((cfg.smb.interval_min - 5.0).abs() < 1e-12);
    assert!((cfg.explicit.absolute_hard_cap_u - 6.0).abs() < 1e-12);
    assert!(cfg.hypo.fast_rise_bypass);
    assert_eq!(cfg.review.timeout_ms, 2_000);
}

#[test]
fn partial_sections_keep_other_defaults() {
    let toml = r#"
[smb]
interval_min = 6.0

[meal_mode.lunch]
prebolus1_u = 1.5

[profile]
carb_ratio = 12.0
lgs_threshold = 75.0
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid");
    assert!((cfg.smb.interval_min - 6.0).abs() < 1e-12);
    assert!((cfg.smb.bolus_step_u - 0.05).abs() < 1e-12);
    assert!((cfg.meal_mode.lunch.prebolus1_u - 1.5).abs() < 1e-12);
    assert!((cfg.meal_mode.lunch.prebolus2_u - 1.0).abs() < 1e-12);
    assert_eq!(cfg.profile.lgs_threshold, Some(75.0));
}

#[rstest]
#[case("[smb]\ninterval_min = 0.0", "smb.interval_min must be > 0")]
#[case("[smb]\ndelivery_ratio = 1.5", "smb.delivery_ratio must be in")]
#[case("[basal]\nduration_min = 0", "basal.duration_min must be in")]
#[case("[explicit]\nabsolute_hard_cap_u = -1.0", "explicit.absolute_hard_cap_u")]
#[case("[modulation]\nmin_factor = 1.2", "modulation.min_factor")]
#[case("[modulation]\nmax_factor = 0.9", "modulation.max_factor")]
#[case("[review]\ntimeout_ms = 0", "review.timeout_ms must be >= 1")]
#[case("[preferences]\nmax_iob_u = 0.0", "preferences.max_iob_u must be > 0")]
#[case("[profile]\ncarb_ratio = 0.0", "profile.carb_ratio must be > 0")]
#[case("[profile]\nmin_bg = 140.0\nmax_bg = 120.0", "profile.min_bg must be <=")]
#[case("[logging]\nrotation = \"weekly\"", "logging.rotation must be one of")]
#[case("[meal_mode.snack]\nprebolus1_u = -0.5", "meal_mode.snack prebolus")]
#[case("[hypo]\nfast_fall_delta = 1.0", "hypo.fast_fall_delta must be < 0")]
fn rejects_invalid_values(#[case] toml: &str, #[case] expected: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(expected),
        "expected '{expected}' in '{err}'"
    );
}

#[test]
fn rejects_unknown_value_types() {
    let err = load_toml("[smb]\ninterval_min = \"five\"").expect_err("type error");
    assert!(err.to_string().contains("interval_min"));
}
