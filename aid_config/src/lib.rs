#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and replay-trace parsing for the insulin dosing loop.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//!   Every section is optional and falls back to its `Default`.
//! - The trace CSV loader enforces exact headers and rejects non-finite glucose.
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HypoCfg {
    /// Strong-block and release margin around the threshold (mg/dL).
    pub margin_mg_dl: f64,
    /// BG must stay above `threshold + margin` this long before release (min).
    pub release_hold_min: f64,
    /// Skip predictive blocking on a confirmed fast rise.
    pub fast_rise_bypass: bool,
    pub fast_rise_delta: f64,
    pub rising_exempt_delta: f64,
    pub fast_fall_delta: f64,
}

impl Default for HypoCfg {
    fn default() -> Self {
        Self {
            margin_mg_dl: 5.0,
            release_hold_min: 5.0,
            fast_rise_bypass: true,
            fast_rise_delta: 4.0,
            rising_exempt_delta: 2.0,
            fast_fall_delta: -2.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SmbCfg {
    pub interval_min: f64,
    pub blind_interval_factor: f64,
    pub blind_interval_floor_min: f64,
    /// Forecast series shorter than this counts as missing.
    pub min_forecast_points: usize,
    pub blind_smb_fraction: f64,
    pub absorption_window_min: f64,
    pub absorption_activity_frac: f64,
    pub absorption_damp: f64,
    pub absorption_damp_rising: f64,
    pub high_bg_threshold: f64,
    pub excessive_drop_delta: f64,
    pub absolute_floor_bg: f64,
    pub delivery_ratio: f64,
    pub bolus_step_u: f64,
}

impl Default for SmbCfg {
    fn default() -> Self {
        Self {
            interval_min: 5.0,
            blind_interval_factor: 1.5,
            blind_interval_floor_min: 5.0,
            min_forecast_points: 6,
            blind_smb_fraction: 0.5,
            absorption_window_min: 20.0,
            absorption_activity_frac: 0.15,
            absorption_damp: 0.5,
            absorption_damp_rising: 0.75,
            high_bg_threshold: 180.0,
            excessive_drop_delta: -6.0,
            absolute_floor_bg: 80.0,
            delivery_ratio: 0.5,
            bolus_step_u: 0.05,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BasalCfg {
    pub pump_step_uph: f64,
    pub duration_min: u32,
    pub daily_safety_multiplier: f64,
    pub current_basal_safety_multiplier: f64,
    pub persistent_rise_floor_frac: f64,
}

impl Default for BasalCfg {
    fn default() -> Self {
        Self {
            pump_step_uph: 0.05,
            duration_min: 30,
            daily_safety_multiplier: 3.0,
            current_basal_safety_multiplier: 4.0,
            persistent_rise_floor_frac: 0.8,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExplicitCfg {
    /// Upper bound for meal-mode boluses that bypass the SMB/IOB ceilings (U).
    pub absolute_hard_cap_u: f64,
}

impl Default for ExplicitCfg {
    fn default() -> Self {
        Self {
            absolute_hard_cap_u: 6.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AdvisorCfg {
    pub min_since_bolus_min: f64,
    pub iob_discount: f64,
    pub min_coverage: f64,
    pub basal_boost: f64,
}

impl Default for AdvisorCfg {
    fn default() -> Self {
        Self {
            min_since_bolus_min: 45.0,
            iob_discount: 0.7,
            min_coverage: 0.25,
            basal_boost: 1.5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AutodriveCfg {
    pub strong_bg: f64,
    pub strong_delta: f64,
    pub moderate_delta: f64,
    pub large_fraction: f64,
    pub small_fraction: f64,
    pub basal_boost: f64,
}

impl Default for AutodriveCfg {
    fn default() -> Self {
        Self {
            strong_bg: 100.0,
            strong_delta: 5.0,
            moderate_delta: 3.0,
            large_fraction: 1.0,
            small_fraction: 0.5,
            basal_boost: 2.0,
        }
    }
}

/// One meal type's prebolus schedule.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct MealPlanCfg {
    pub prebolus1_u: f64,
    pub prebolus2_u: f64,
    pub phase2_after_min: f64,
    pub runtime_min: f64,
    pub basal_boost: f64,
    pub temp_ceiling_uph: f64,
}

impl Default for MealPlanCfg {
    fn default() -> Self {
        Self {
            prebolus1_u: 2.0,
            prebolus2_u: 1.0,
            phase2_after_min: 20.0,
            runtime_min: 120.0,
            basal_boost: 1.5,
            temp_ceiling_uph: 2.5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MealModeCfg {
    pub breakfast: MealPlanCfg,
    pub lunch: MealPlanCfg,
    pub dinner: MealPlanCfg,
    pub snack: MealPlanCfg,
    pub high_carb: MealPlanCfg,
}

impl Default for MealModeCfg {
    fn default() -> Self {
        Self {
            breakfast: MealPlanCfg::default(),
            lunch: MealPlanCfg::default(),
            dinner: MealPlanCfg::default(),
            snack: MealPlanCfg {
                prebolus1_u: 0.8,
                prebolus2_u: 0.0,
                ..MealPlanCfg::default()
            },
            high_carb: MealPlanCfg {
                prebolus1_u: 3.0,
                prebolus2_u: 1.5,
                phase2_after_min: 25.0,
                runtime_min: 180.0,
                basal_boost: 1.8,
                temp_ceiling_uph: 3.0,
            },
        }
    }
}

impl MealModeCfg {
    fn plans(&self) -> [(&'static str, &MealPlanCfg); 5] {
        [
            ("breakfast", &self.breakfast),
            ("lunch", &self.lunch),
            ("dinner", &self.dinner),
            ("snack", &self.snack),
            ("high_carb", &self.high_carb),
        ]
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SensorCfg {
    /// Readings older than this are stale (min).
    pub stale_after_min: f64,
    /// Noise level at or above this is unusable.
    pub max_noise: u8,
    pub min_valid_bg: f64,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            stale_after_min: 12.0,
            max_noise: 3,
            min_valid_bg: 39.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModulationCfg {
    pub min_factor: f64,
    pub max_factor: f64,
    pub last_good_max_age_min: f64,
}

impl Default for ModulationCfg {
    fn default() -> Self {
        Self {
            min_factor: 0.85,
            max_factor: 1.15,
            last_good_max_age_min: 30.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReviewCfg {
    pub timeout_ms: u64,
}

impl Default for ReviewCfg {
    fn default() -> Self {
        Self { timeout_ms: 2_000 }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProfileCfg {
    pub target_bg: f64,
    pub min_bg: f64,
    pub max_bg: f64,
    pub max_basal_uph: f64,
    pub max_daily_basal_uph: f64,
    pub current_basal_uph: f64,
    pub carb_ratio: f64,
    pub isf: f64,
    pub dia_hours: f64,
    pub peak_time_min: f64,
    pub lgs_threshold: Option<f64>,
    pub sensitivity_ratio: f64,
    /// Total daily dose used by replay when the trace carries none (U).
    pub tdd_24h_u: f64,
}

impl Default for ProfileCfg {
    fn default() -> Self {
        Self {
            target_bg: 110.0,
            min_bg: 100.0,
            max_bg: 120.0,
            max_basal_uph: 3.0,
            max_daily_basal_uph: 1.0,
            current_basal_uph: 1.0,
            carb_ratio: 10.0,
            isf: 50.0,
            dia_hours: 5.0,
            peak_time_min: 75.0,
            lgs_threshold: None,
            sensitivity_ratio: 1.0,
            tdd_24h_u: 30.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PreferencesCfg {
    pub max_smb_u: f64,
    pub max_smb_high_bg_u: f64,
    pub max_iob_u: f64,
    pub autodrive_floor_bg: f64,
    pub autodrive_cooldown_min: f64,
    pub meal_advisor_window_min: f64,
}

impl Default for PreferencesCfg {
    fn default() -> Self {
        Self {
            max_smb_u: 1.0,
            max_smb_high_bg_u: 1.5,
            max_iob_u: 6.0,
            autodrive_floor_bg: 110.0,
            autodrive_cooldown_min: 45.0,
            meal_advisor_window_min: 120.0,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub hypo: HypoCfg,
    pub smb: SmbCfg,
    pub basal: BasalCfg,
    pub explicit: ExplicitCfg,
    pub advisor: AdvisorCfg,
    pub autodrive: AutodriveCfg,
    pub meal_mode: MealModeCfg,
    pub sensor: SensorCfg,
    pub modulation: ModulationCfg,
    pub review: ReviewCfg,
    pub logging: Logging,
    pub profile: ProfileCfg,
    pub preferences: PreferencesCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Replay trace schema.
///
/// Expected headers:
/// t_min,bg,delta,short_avg_delta,long_avg_delta,iob,cob,activity,predicted_bg,eventual_bg,carbs_g
///
/// The last three columns may be empty. Example:
/// t_min,bg,delta,short_avg_delta,long_avg_delta,iob,cob,activity,predicted_bg,eventual_bg,carbs_g
/// 0,120,2,1.5,1,0.5,0,0.2,130,140,
/// 5,126,6,4,2,0.5,0,0.2,150,170,45
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct TraceRow {
    pub t_min: f64,
    pub bg: f64,
    pub delta: f64,
    pub short_avg_delta: f64,
    pub long_avg_delta: f64,
    pub iob: f64,
    pub cob: f64,
    pub activity: f64,
    pub predicted_bg: Option<f64>,
    pub eventual_bg: Option<f64>,
    pub carbs_g: Option<f64>,
}

pub const TRACE_HEADERS: [&str; 11] = [
    "t_min",
    "bg",
    "delta",
    "short_avg_delta",
    "long_avg_delta",
    "iob",
    "cob",
    "activity",
    "predicted_bg",
    "eventual_bg",
    "carbs_g",
];

pub fn load_trace_csv(path: &std::path::Path) -> eyre::Result<Vec<TraceRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open trace CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != TRACE_HEADERS {
        eyre::bail!(
            "trace CSV must have headers '{}', got: {}",
            TRACE_HEADERS.join(","),
            actual.join(",")
        );
    }

    let mut rows: Vec<TraceRow> = Vec::new();
    for (idx, rec) in rdr.deserialize::<TraceRow>().enumerate() {
        let line = idx + 2;
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", line, e))?;
        if !row.t_min.is_finite() || row.t_min < 0.0 {
            eyre::bail!("invalid CSV row {}: t_min must be a finite value >= 0", line);
        }
        if !row.bg.is_finite() {
            eyre::bail!("invalid CSV row {}: bg must be finite", line);
        }
        if let Some(prev) = rows.last()
            && row.t_min <= prev.t_min
        {
            eyre::bail!(
                "invalid CSV row {}: t_min {} must increase (previous {})",
                line,
                row.t_min,
                prev.t_min
            );
        }
        rows.push(row);
    }

    if rows.is_empty() {
        eyre::bail!("trace CSV {:?} has no rows", path);
    }
    Ok(rows)
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

fn unit_fraction(v: f64) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Hypo
        if !non_negative(self.hypo.margin_mg_dl) {
            eyre::bail!("hypo.margin_mg_dl must be >= 0");
        }
        if !non_negative(self.hypo.release_hold_min) {
            eyre::bail!("hypo.release_hold_min must be >= 0");
        }
        if !(self.hypo.fast_fall_delta.is_finite() && self.hypo.fast_fall_delta < 0.0) {
            eyre::bail!("hypo.fast_fall_delta must be < 0");
        }
        if !positive(self.hypo.fast_rise_delta) {
            eyre::bail!("hypo.fast_rise_delta must be > 0");
        }

        // SMB
        if !positive(self.smb.interval_min) {
            eyre::bail!("smb.interval_min must be > 0");
        }
        if !(self.smb.blind_interval_factor.is_finite() && self.smb.blind_interval_factor >= 1.0) {
            eyre::bail!("smb.blind_interval_factor must be >= 1.0");
        }
        if !unit_fraction(self.smb.blind_smb_fraction) {
            eyre::bail!("smb.blind_smb_fraction must be in [0.0, 1.0]");
        }
        if !unit_fraction(self.smb.absorption_damp) {
            eyre::bail!("smb.absorption_damp must be in [0.0, 1.0]");
        }
        if !unit_fraction(self.smb.absorption_damp_rising) {
            eyre::bail!("smb.absorption_damp_rising must be in [0.0, 1.0]");
        }
        if !(positive(self.smb.delivery_ratio) && self.smb.delivery_ratio <= 1.0) {
            eyre::bail!("smb.delivery_ratio must be in (0.0, 1.0]");
        }
        if !positive(self.smb.bolus_step_u) {
            eyre::bail!("smb.bolus_step_u must be > 0");
        }
        if self.smb.min_forecast_points == 0 {
            eyre::bail!("smb.min_forecast_points must be >= 1");
        }

        // Basal
        if !positive(self.basal.pump_step_uph) {
            eyre::bail!("basal.pump_step_uph must be > 0");
        }
        if self.basal.duration_min == 0 || self.basal.duration_min > 24 * 60 {
            eyre::bail!("basal.duration_min must be in [1, 1440]");
        }
        if !positive(self.basal.daily_safety_multiplier) {
            eyre::bail!("basal.daily_safety_multiplier must be > 0");
        }
        if !positive(self.basal.current_basal_safety_multiplier) {
            eyre::bail!("basal.current_basal_safety_multiplier must be > 0");
        }
        if !unit_fraction(self.basal.persistent_rise_floor_frac) {
            eyre::bail!("basal.persistent_rise_floor_frac must be in [0.0, 1.0]");
        }

        // Explicit actions
        if !non_negative(self.explicit.absolute_hard_cap_u) || self.explicit.absolute_hard_cap_u > 25.0
        {
            eyre::bail!("explicit.absolute_hard_cap_u must be in [0.0, 25.0]");
        }

        // Strategies
        if !unit_fraction(self.advisor.iob_discount) {
            eyre::bail!("advisor.iob_discount must be in [0.0, 1.0]");
        }
        if !unit_fraction(self.advisor.min_coverage) {
            eyre::bail!("advisor.min_coverage must be in [0.0, 1.0]");
        }
        if !non_negative(self.advisor.basal_boost) {
            eyre::bail!("advisor.basal_boost must be >= 0");
        }
        if !unit_fraction(self.autodrive.large_fraction) {
            eyre::bail!("autodrive.large_fraction must be in [0.0, 1.0]");
        }
        if !unit_fraction(self.autodrive.small_fraction) {
            eyre::bail!("autodrive.small_fraction must be in [0.0, 1.0]");
        }
        if !non_negative(self.autodrive.basal_boost) {
            eyre::bail!("autodrive.basal_boost must be >= 0");
        }
        for (name, plan) in self.meal_mode.plans() {
            if !non_negative(plan.prebolus1_u) || !non_negative(plan.prebolus2_u) {
                eyre::bail!("meal_mode.{name} prebolus units must be >= 0");
            }
            if !non_negative(plan.phase2_after_min) || !positive(plan.runtime_min) {
                eyre::bail!("meal_mode.{name} timings must be >= 0 with runtime_min > 0");
            }
            if !non_negative(plan.basal_boost) || !non_negative(plan.temp_ceiling_uph) {
                eyre::bail!("meal_mode.{name} basal_boost and temp_ceiling_uph must be >= 0");
            }
        }

        // Sensor
        if !positive(self.sensor.stale_after_min) {
            eyre::bail!("sensor.stale_after_min must be > 0");
        }
        if self.sensor.max_noise == 0 {
            eyre::bail!("sensor.max_noise must be >= 1");
        }

        // Modulation
        let m = &self.modulation;
        if !(positive(m.min_factor) && m.min_factor <= 1.0) {
            eyre::bail!("modulation.min_factor must be in (0.0, 1.0]");
        }
        if !(m.max_factor.is_finite() && m.max_factor >= 1.0 && m.max_factor <= 2.0) {
            eyre::bail!("modulation.max_factor must be in [1.0, 2.0]");
        }
        if !non_negative(m.last_good_max_age_min) {
            eyre::bail!("modulation.last_good_max_age_min must be >= 0");
        }

        // Review
        if self.review.timeout_ms == 0 {
            eyre::bail!("review.timeout_ms must be >= 1");
        }
        if self.review.timeout_ms > 5 * 60 * 1000 {
            eyre::bail!("review.timeout_ms is unreasonably large (>5min)");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        // Profile
        let p = &self.profile;
        if !positive(p.target_bg) || !positive(p.min_bg) || !positive(p.max_bg) {
            eyre::bail!("profile.target_bg, min_bg and max_bg must be > 0");
        }
        if p.min_bg > p.max_bg {
            eyre::bail!("profile.min_bg must be <= profile.max_bg");
        }
        if !positive(p.carb_ratio) {
            eyre::bail!("profile.carb_ratio must be > 0");
        }
        if !positive(p.isf) {
            eyre::bail!("profile.isf must be > 0");
        }
        if !non_negative(p.max_basal_uph)
            || !non_negative(p.max_daily_basal_uph)
            || !non_negative(p.current_basal_uph)
        {
            eyre::bail!("profile basal rates must be >= 0");
        }
        if !positive(p.sensitivity_ratio) {
            eyre::bail!("profile.sensitivity_ratio must be > 0");
        }
        if let Some(lgs) = p.lgs_threshold
            && !positive(lgs)
        {
            eyre::bail!("profile.lgs_threshold must be > 0 when set");
        }

        // Preferences
        let pr = &self.preferences;
        if !positive(pr.max_iob_u) {
            eyre::bail!("preferences.max_iob_u must be > 0");
        }
        if !non_negative(pr.max_smb_u) || !non_negative(pr.max_smb_high_bg_u) {
            eyre::bail!("preferences.max_smb_u and max_smb_high_bg_u must be >= 0");
        }
        if !non_negative(pr.autodrive_cooldown_min) || !non_negative(pr.meal_advisor_window_min) {
            eyre::bail!("preferences windows must be >= 0");
        }

        Ok(())
    }
}
