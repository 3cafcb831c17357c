//! Builds `LoopInputs` from the config plus command-line or trace values.

use aid_config::{Config, TraceRow};
use aid_core::context::{
    ActiveMealMode, CarbInput, Forecast, GlucoseInput, InsulinInput, LoopInputs, MealEstimate,
    ModeFlags, Preferences, Profile,
};

use crate::cli::DecideArgs;

/// Points in a synthesized forecast series (5-minute steps).
const SERIES_POINTS: usize = 12;

/// Straight line from `bg` toward the eventual (or predicted) value.
/// No forecast values means no series, which the core treats as prediction missing.
pub fn synth_forecast(bg: f64, predicted: Option<f64>, eventual: Option<f64>) -> Forecast {
    let Some(end) = eventual.or(predicted) else {
        return Forecast::default();
    };
    let series = (1..=SERIES_POINTS)
        .map(|k| bg + (end - bg) * k as f64 / SERIES_POINTS as f64)
        .collect();
    Forecast {
        predicted_bg: predicted,
        eventual_bg: eventual,
        series,
    }
}

fn base(cfg: &Config, now_ms: i64) -> LoopInputs {
    LoopInputs {
        glucose: GlucoseInput {
            bg: 0.0,
            delta: 0.0,
            short_avg_delta: 0.0,
            long_avg_delta: 0.0,
            acceleration: 0.0,
            noise: 0,
            reading_at_ms: now_ms,
        },
        insulin: InsulinInput {
            iob: 0.0,
            activity_uph: 0.0,
            activity_30m_uph: 0.0,
            minutes_to_peak: None,
            tdd_24h_u: cfg.profile.tdd_24h_u,
            last_bolus_at_ms: None,
            current_temp: None,
        },
        carbs: CarbInput::default(),
        forecast: Forecast::default(),
        profile: Profile::from(&cfg.profile),
        preferences: Preferences::from(cfg),
        modes: ModeFlags::default(),
        time_in_range: None,
    }
}

fn minutes_to_ms(min: f64) -> i64 {
    (min * 60_000.0).round() as i64
}

pub fn from_args(cfg: &Config, a: &DecideArgs, now_ms: i64) -> LoopInputs {
    let mut i = base(cfg, now_ms);
    i.glucose.bg = a.bg;
    i.glucose.delta = a.delta;
    i.glucose.short_avg_delta = a.short_avg_delta.unwrap_or(a.delta);
    i.glucose.long_avg_delta = a.long_avg_delta.unwrap_or(a.delta);
    i.insulin.iob = a.iob;
    i.insulin.activity_uph = a.activity;
    i.insulin.last_bolus_at_ms = a.since_bolus_min.map(|m| now_ms - minutes_to_ms(m));
    i.carbs.cob_g = a.cob;
    i.carbs.estimate = a.carbs.map(|carbs_g| MealEstimate {
        carbs_g,
        at_ms: now_ms - minutes_to_ms(a.carbs_age_min),
    });
    i.forecast = synth_forecast(a.bg, a.predicted, a.eventual);
    i.modes = ModeFlags {
        meal_mode: a.meal.zip(a.meal_elapsed_min).map(|(kind, elapsed_min)| ActiveMealMode {
            kind: kind.into(),
            elapsed_min,
        }),
        exercise: a.exercise.map(Into::into),
        fasting: a.fasting,
        ..ModeFlags::default()
    };
    i
}

/// Inputs for one trace row. `estimate` is the latest carb entry seen so far.
pub fn from_row(cfg: &Config, row: &TraceRow, now_ms: i64, estimate: Option<MealEstimate>) -> LoopInputs {
    let mut i = base(cfg, now_ms);
    i.glucose.bg = row.bg;
    i.glucose.delta = row.delta;
    i.glucose.short_avg_delta = row.short_avg_delta;
    i.glucose.long_avg_delta = row.long_avg_delta;
    i.insulin.iob = row.iob;
    i.insulin.activity_uph = row.activity;
    i.carbs.cob_g = row.cob;
    i.carbs.estimate = estimate;
    i.forecast = synth_forecast(row.bg, row.predicted_bg, row.eventual_bg);
    i
}

/// Steady in-range reading at the profile target, for `self-check`.
pub fn in_range(cfg: &Config, now_ms: i64) -> LoopInputs {
    let mut i = base(cfg, now_ms);
    let bg = cfg.profile.target_bg;
    i.glucose.bg = bg;
    i.forecast = synth_forecast(bg, Some(bg), Some(bg));
    i
}
