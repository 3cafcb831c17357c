//! Per-cycle inputs and the immutable `LoopContext` built from them.
//!
//! `LoopInputs` is what the pump/CGM side hands the core each tick, unvalidated.
//! `LoopContext::build` sanitizes it once (non-finite values, impossible profile
//! limits, data age) and every stage downstream reads only the context.

use crate::config::{SensorCfg, SmbCfg};
use crate::modulation::ModulationFactors;
use crate::refractory::CooldownState;
use crate::threshold::hypo_threshold;
use crate::util::{finite_or, minutes_between};

/// CGM reading and trend. Deltas are mg/dL per 5 minutes.
#[derive(Debug, Clone, PartialEq)]
pub struct GlucoseInput {
    pub bg: f64,
    pub delta: f64,
    pub short_avg_delta: f64,
    pub long_avg_delta: f64,
    pub acceleration: f64,
    /// Sensor noise level (0 = clean, 4 = heavy).
    pub noise: u8,
    pub reading_at_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempBasal {
    pub rate_uph: f64,
    pub remaining_min: f64,
}

/// Insulin state. Activity is expressed in U/h.
#[derive(Debug, Clone, PartialEq)]
pub struct InsulinInput {
    pub iob: f64,
    pub activity_uph: f64,
    pub activity_30m_uph: f64,
    pub minutes_to_peak: Option<f64>,
    pub tdd_24h_u: f64,
    pub last_bolus_at_ms: Option<i64>,
    pub current_temp: Option<TempBasal>,
}

/// Externally confirmed carb estimate (photo/meal log).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MealEstimate {
    pub carbs_g: f64,
    pub at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CarbInput {
    pub cob_g: f64,
    pub estimate: Option<MealEstimate>,
}

/// Forecast from the prediction engine. Any part may be absent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Forecast {
    /// BG predicted ~30 minutes ahead.
    pub predicted_bg: Option<f64>,
    pub eventual_bg: Option<f64>,
    /// 5-minute forecast points.
    pub series: Vec<f64>,
}

/// Pump profile limits.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub target_bg: f64,
    pub min_bg: f64,
    pub max_bg: f64,
    pub max_basal_uph: f64,
    pub max_daily_basal_uph: f64,
    pub current_basal_uph: f64,
    /// Grams of carbohydrate per unit.
    pub carb_ratio: f64,
    /// mg/dL per unit.
    pub isf: f64,
    pub dia_hours: f64,
    pub peak_time_min: f64,
    pub lgs_threshold: Option<f64>,
    pub sensitivity_ratio: f64,
}

impl Default for Profile {
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
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MealKind {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
    HighCarb,
}

impl MealKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MealKind::Breakfast => "breakfast",
            MealKind::Lunch => "lunch",
            MealKind::Dinner => "dinner",
            MealKind::Snack => "snack",
            MealKind::HighCarb => "high_carb",
        }
    }
}

impl core::fmt::Display for MealKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prebolus schedule and basal limits for one meal type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MealModePlan {
    pub prebolus1_u: f64,
    pub prebolus2_u: f64,
    /// Phase 2 becomes due this many minutes after activation.
    pub phase2_after_min: f64,
    /// The mode stops influencing dosing after this runtime.
    pub runtime_min: f64,
    /// Basal multiplier while the mode runs.
    pub basal_boost: f64,
    /// Temp-basal ceiling while the mode runs (U/h).
    pub temp_ceiling_uph: f64,
}

impl Default for MealModePlan {
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

#[derive(Debug, Clone, PartialEq)]
pub struct MealModePrefs {
    pub breakfast: MealModePlan,
    pub lunch: MealModePlan,
    pub dinner: MealModePlan,
    pub snack: MealModePlan,
    pub high_carb: MealModePlan,
}

impl Default for MealModePrefs {
    fn default() -> Self {
        Self {
            breakfast: MealModePlan::default(),
            lunch: MealModePlan::default(),
            dinner: MealModePlan::default(),
            snack: MealModePlan {
                prebolus1_u: 0.8,
                prebolus2_u: 0.0,
                ..MealModePlan::default()
            },
            high_carb: MealModePlan {
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

impl MealModePrefs {
    pub fn plan(&self, kind: MealKind) -> &MealModePlan {
        match kind {
            MealKind::Breakfast => &self.breakfast,
            MealKind::Lunch => &self.lunch,
            MealKind::Dinner => &self.dinner,
            MealKind::Snack => &self.snack,
            MealKind::HighCarb => &self.high_carb,
        }
    }
}

/// User-tunable dosing preferences.
#[derive(Debug, Clone, PartialEq)]
pub struct Preferences {
    pub max_smb_u: f64,
    pub max_smb_high_bg_u: f64,
    pub max_iob_u: f64,
    pub autodrive_floor_bg: f64,
    pub autodrive_cooldown_min: f64,
    pub meal_advisor_window_min: f64,
    pub meal_modes: MealModePrefs,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            max_smb_u: 1.0,
            max_smb_high_bg_u: 1.5,
            max_iob_u: 6.0,
            autodrive_floor_bg: 110.0,
            autodrive_cooldown_min: 45.0,
            meal_advisor_window_min: 120.0,
            meal_modes: MealModePrefs::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExerciseIntensity {
    Light,
    Moderate,
    Vigorous,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveMealMode {
    pub kind: MealKind,
    pub elapsed_min: f64,
}

/// Operating-mode flags.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModeFlags {
    pub meal_mode: Option<ActiveMealMode>,
    pub exercise: Option<ExerciseIntensity>,
    pub fasting: bool,
    pub recent_calibration: bool,
    /// Overnight or otherwise insulin-sensitive phase.
    pub sensitive_phase: bool,
}

/// Everything the core receives for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopInputs {
    pub glucose: GlucoseInput,
    pub insulin: InsulinInput,
    pub carbs: CarbInput,
    pub forecast: Forecast,
    pub profile: Profile,
    pub preferences: Preferences,
    pub modes: ModeFlags,
    /// Fraction of the last 24h in range (0..=1), if known.
    pub time_in_range: Option<f64>,
}

/// Sensor data usability for this cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DataQuality {
    Ok,
    Missing,
    Stale { age_min: f64 },
    Noisy { level: u8 },
}

impl DataQuality {
    pub fn is_usable(&self) -> bool {
        matches!(self, DataQuality::Ok)
    }
}

/// Confirmed estimate with its age at this cycle. Age is negative for future timestamps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MealEstimateView {
    pub carbs_g: f64,
    pub at_ms: i64,
    pub age_min: f64,
}

/// Immutable per-cycle view. Built once, read by every stage.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopContext {
    pub now_ms: i64,
    pub bg: f64,
    pub delta: f64,
    pub short_avg_delta: f64,
    pub long_avg_delta: f64,
    pub acceleration: f64,
    pub glucose_age_min: f64,
    pub quality: DataQuality,
    pub iob: f64,
    pub activity_uph: f64,
    pub activity_30m_uph: f64,
    pub minutes_to_peak: Option<f64>,
    pub tdd_24h_u: f64,
    pub cob_g: f64,
    pub meal_estimate: Option<MealEstimateView>,
    pub predicted_bg: f64,
    pub eventual_bg: f64,
    pub forecast_available: bool,
    pub forecast_min_bg: f64,
    pub profile: Profile,
    pub prefs: Preferences,
    pub modes: ModeFlags,
    pub minutes_since_bolus: Option<f64>,
    pub minutes_since_autodrive: Option<f64>,
    pub current_temp: Option<TempBasal>,
    pub time_in_range: Option<f64>,
    pub threshold: f64,
    pub modulation: ModulationFactors,
    /// Sanitization notes; copied into the reason trail.
    pub notes: Vec<String>,
}

impl LoopContext {
    /// Sanitize inputs into a context. Never fails: bad values are clamped and noted.
    pub fn build(
        inputs: &LoopInputs,
        now_ms: i64,
        cooldown: &CooldownState,
        modulation: ModulationFactors,
        sensor: &SensorCfg,
        smb: &SmbCfg,
    ) -> Self {
        let mut notes = Vec::new();
        let g = &inputs.glucose;

        let glucose_age_min = minutes_between(g.reading_at_ms, now_ms).max(0.0);
        let bg_valid = g.bg.is_finite() && g.bg >= sensor.min_valid_bg;
        let quality = if !bg_valid {
            DataQuality::Missing
        } else if glucose_age_min > sensor.stale_after_min {
            DataQuality::Stale {
                age_min: glucose_age_min,
            }
        } else if g.noise >= sensor.max_noise {
            DataQuality::Noisy { level: g.noise }
        } else {
            DataQuality::Ok
        };
        // Without a usable reading the value only feeds the trail; 0 keeps every
        // downstream comparison on the conservative side.
        let bg = if bg_valid { g.bg } else { 0.0 };

        let profile = sanitize_profile(&inputs.profile, &mut notes);
        let prefs = sanitize_prefs(&inputs.preferences, &mut notes);

        let ins = &inputs.insulin;
        let iob = finite_or(ins.iob, 0.0);
        if !ins.iob.is_finite() {
            notes.push("iob not finite, treated as 0".to_string());
        }

        let forecast_available = inputs.forecast.series.len() >= smb.min_forecast_points
            && inputs.forecast.series.iter().all(|v| v.is_finite());
        let predicted_bg = inputs
            .forecast
            .predicted_bg
            .filter(|v| v.is_finite())
            .or_else(|| inputs.forecast.series.get(5).copied().filter(|v| v.is_finite()))
            .unwrap_or(bg);
        let eventual_bg = inputs
            .forecast
            .eventual_bg
            .filter(|v| v.is_finite())
            .or_else(|| inputs.forecast.series.last().copied().filter(|v| v.is_finite()))
            .unwrap_or(bg);
        let forecast_min_bg = if forecast_available {
            inputs
                .forecast
                .series
                .iter()
                .copied()
                .fold(f64::INFINITY, f64::min)
        } else {
            predicted_bg.min(eventual_bg)
        };

        let pump_last = ins.last_bolus_at_ms;
        let last_bolus = match (pump_last, cooldown.last_bolus_at_ms) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let minutes_since_bolus = last_bolus.map(|t| minutes_between(t, now_ms).max(0.0));
        let minutes_since_autodrive = cooldown
            .last_autodrive_at_ms
            .map(|t| minutes_between(t, now_ms).max(0.0));

        let meal_estimate = inputs.carbs.estimate.and_then(|e| {
            (e.carbs_g.is_finite() && e.carbs_g > 0.0).then(|| MealEstimateView {
                carbs_g: e.carbs_g,
                at_ms: e.at_ms,
                age_min: minutes_between(e.at_ms, now_ms),
            })
        });

        let threshold = hypo_threshold(profile.min_bg, profile.lgs_threshold);

        Self {
            now_ms,
            bg,
            delta: finite_or(g.delta, 0.0),
            short_avg_delta: finite_or(g.short_avg_delta, 0.0),
            long_avg_delta: finite_or(g.long_avg_delta, 0.0),
            acceleration: finite_or(g.acceleration, 0.0),
            glucose_age_min,
            quality,
            iob,
            activity_uph: finite_or(ins.activity_uph, 0.0).max(0.0),
            activity_30m_uph: finite_or(ins.activity_30m_uph, 0.0).max(0.0),
            minutes_to_peak: ins.minutes_to_peak.filter(|v| v.is_finite()),
            tdd_24h_u: finite_or(ins.tdd_24h_u, 0.0).max(0.0),
            cob_g: finite_or(inputs.carbs.cob_g, 0.0).max(0.0),
            meal_estimate,
            predicted_bg,
            eventual_bg,
            forecast_available,
            forecast_min_bg,
            profile,
            prefs,
            modes: inputs.modes.clone(),
            minutes_since_bolus,
            minutes_since_autodrive,
            current_temp: ins.current_temp,
            time_in_range: inputs
                .time_in_range
                .filter(|v| v.is_finite())
                .map(|v| v.clamp(0.0, 1.0)),
            threshold,
            modulation,
            notes,
        }
    }

    /// Lowest of current, predicted and eventual BG.
    pub fn min_guard_bg(&self) -> f64 {
        self.bg.min(self.predicted_bg).min(self.eventual_bg)
    }

    /// Scheduled basal scaled by autosens and modulation, before any resolver stage.
    pub fn neutral_basal_uph(&self) -> f64 {
        (self.profile.current_basal_uph
            * self.profile.sensitivity_ratio
            * self.modulation.basal_multiplier())
        .max(0.0)
    }

    /// Active meal mode and its plan, if still inside its runtime window.
    pub fn active_meal_plan(&self) -> Option<(ActiveMealMode, MealModePlan)> {
        let mode = self.modes.meal_mode?;
        if !mode.elapsed_min.is_finite() || mode.elapsed_min < 0.0 {
            return None;
        }
        let plan = *self.prefs.meal_modes.plan(mode.kind);
        (mode.elapsed_min <= plan.runtime_min).then_some((mode, plan))
    }

    /// Glucose view handed to collaborators.
    pub fn snapshot(&self) -> aid_traits::GlucoseSnapshot {
        aid_traits::GlucoseSnapshot {
            now_ms: self.now_ms,
            bg: self.bg,
            delta: self.delta,
            iob: self.iob,
            cob: self.cob_g,
        }
    }
}

fn positive_or(value: f64, floor: f64, name: &str, notes: &mut Vec<String>) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        tracing::warn!(field = name, value, floor, "profile value invalid, clamped");
        notes.push(format!("{name} invalid ({value}), clamped to {floor}"));
        floor
    }
}

fn non_negative(value: f64, name: &str, notes: &mut Vec<String>) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        tracing::warn!(field = name, value, "value invalid, clamped to 0");
        notes.push(format!("{name} invalid ({value}), clamped to 0"));
        0.0
    }
}

fn sanitize_profile(p: &Profile, notes: &mut Vec<String>) -> Profile {
    let defaults = Profile::default();
    Profile {
        target_bg: positive_or(p.target_bg, defaults.target_bg, "target_bg", notes),
        min_bg: positive_or(p.min_bg, defaults.min_bg, "min_bg", notes),
        max_bg: positive_or(p.max_bg, defaults.max_bg, "max_bg", notes),
        max_basal_uph: non_negative(p.max_basal_uph, "max_basal", notes),
        max_daily_basal_uph: non_negative(p.max_daily_basal_uph, "max_daily_basal", notes),
        current_basal_uph: non_negative(p.current_basal_uph, "current_basal", notes),
        // A tiny ratio or ISF would inflate every need; the floors stay on the small-dose side.
        carb_ratio: positive_or(p.carb_ratio, 30.0, "carb_ratio", notes).max(1.0),
        isf: positive_or(p.isf, 100.0, "isf", notes).max(5.0),
        dia_hours: positive_or(p.dia_hours, defaults.dia_hours, "dia", notes),
        peak_time_min: positive_or(p.peak_time_min, defaults.peak_time_min, "peak_time", notes),
        lgs_threshold: p.lgs_threshold.filter(|v| v.is_finite() && *v > 0.0),
        sensitivity_ratio: positive_or(p.sensitivity_ratio, 1.0, "sensitivity_ratio", notes)
            .clamp(0.5, 2.0),
    }
}

fn sanitize_prefs(p: &Preferences, notes: &mut Vec<String>) -> Preferences {
    let mut out = p.clone();
    out.max_smb_u = non_negative(p.max_smb_u, "max_smb", notes);
    out.max_smb_high_bg_u = non_negative(p.max_smb_high_bg_u, "max_smb_high_bg", notes);
    if !(p.max_iob_u.is_finite() && p.max_iob_u > 0.0) {
        tracing::warn!(value = p.max_iob_u, "max_iob must be > 0, automated boluses disabled");
        notes.push(format!(
            "max_iob invalid ({}), clamped to 0: automated boluses disabled",
            p.max_iob_u
        ));
        out.max_iob_u = 0.0;
    }
    out.autodrive_cooldown_min = non_negative(p.autodrive_cooldown_min, "autodrive_cooldown", notes);
    out.meal_advisor_window_min =
        non_negative(p.meal_advisor_window_min, "meal_advisor_window", notes);
    if !p.autodrive_floor_bg.is_finite() {
        notes.push("autodrive_floor invalid, autodrive disabled".to_string());
        out.autodrive_floor_bg = f64::INFINITY;
    }
    out
}
