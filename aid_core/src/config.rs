//! Configuration types for the decision pipeline.
//!
//! These are the runtime configuration structs used by `LoopController`.
//! They are separate from the TOML-deserialized config in `aid_config`.

/// Hypoglycemia guard and hysteresis.
#[derive(Debug, Clone)]
pub struct HypoCfg {
    /// Margin below the threshold for "strong" blocks, and above it for release (mg/dL).
    pub margin_mg_dl: f64,
    /// BG must stay above `threshold + margin` this long before a block releases.
    pub release_hold_min: f64,
    /// When true, a confirmed fast rise (`delta >= fast_rise_delta`) skips predictive blocking.
    pub fast_rise_bypass: bool,
    /// Delta (mg/dL per 5 min) that counts as a confirmed fast rise.
    pub fast_rise_delta: f64,
    /// A rise at least this fast with BG above threshold exempts the strong-future block.
    pub rising_exempt_delta: f64,
    /// Delta at or below this is a fast fall.
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

/// Bolus gating (Dose Capper and Refractory Gate).
#[derive(Debug, Clone)]
pub struct SmbCfg {
    /// Minimum spacing between automated boluses (minutes).
    pub interval_min: f64,
    /// Interval multiplier when the forecast is missing or short.
    pub blind_interval_factor: f64,
    /// Lower bound of the widened interval (minutes).
    pub blind_interval_floor_min: f64,
    /// Forecast series shorter than this counts as missing.
    pub min_forecast_points: usize,
    /// Fraction of max SMB allowed while the forecast is missing.
    pub blind_smb_fraction: f64,
    /// Absorption guard window after the last bolus (minutes).
    pub absorption_window_min: f64,
    /// Activity above this fraction of hourly-average TDD triggers the absorption guard.
    pub absorption_activity_frac: f64,
    /// Absorption damping factor.
    pub absorption_damp: f64,
    /// Damping used instead when BG is high and rising.
    pub absorption_damp_rising: f64,
    /// BG at or above this is "high" (high-BG max SMB, rising absorption damp).
    pub high_bg_threshold: f64,
    /// Delta at or below this zeroes any non-explicit bolus.
    pub excessive_drop_delta: f64,
    /// No automated bolus below this BG (mg/dL).
    pub absolute_floor_bg: f64,
    /// Share of the insulin requirement delivered per automated bolus.
    pub delivery_ratio: f64,
    /// Pump bolus increment (U); final doses round down to it.
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

/// Basal Rate Resolver.
#[derive(Debug, Clone)]
pub struct BasalCfg {
    /// Pump temp-basal increment (U/h).
    pub pump_step_uph: f64,
    /// Duration of every issued temp basal (minutes).
    pub duration_min: u32,
    /// Cap as a multiple of the profile's max daily basal.
    pub daily_safety_multiplier: f64,
    /// Cap as a multiple of the currently scheduled basal.
    pub current_basal_safety_multiplier: f64,
    /// Floor during a persistent rise, as a fraction of profile basal.
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

/// Explicit (meal-mode) bypass limits.
#[derive(Debug, Clone)]
pub struct ExplicitCfg {
    /// Absolute ceiling for an explicit bolus that bypasses the SMB and IOB ceilings.
    pub absolute_hard_cap_u: f64,
}

impl Default for ExplicitCfg {
    fn default() -> Self {
        Self {
            absolute_hard_cap_u: 6.0,
        }
    }
}

/// Confirmed-meal advisor.
#[derive(Debug, Clone)]
pub struct AdvisorCfg {
    /// No advisor bolus if any bolus happened within this many minutes.
    pub min_since_bolus_min: f64,
    /// Share of IOB subtracted from the meal need.
    pub iob_discount: f64,
    /// Minimum share of the carb need always covered.
    pub min_coverage: f64,
    /// Temp-basal boost as a multiple of profile basal.
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

/// Predictive acceleration ("autodrive").
#[derive(Debug, Clone)]
pub struct AutodriveCfg {
    /// BG at or above which strong momentum selects the large bolus.
    pub strong_bg: f64,
    /// Delta for strong momentum.
    pub strong_delta: f64,
    /// Delta for moderate momentum (the minimum to fire at all).
    pub moderate_delta: f64,
    /// Large bolus as a fraction of max SMB.
    pub large_fraction: f64,
    /// Small bolus as a fraction of max SMB.
    pub small_fraction: f64,
    /// Temp-basal boost as a multiple of profile basal.
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

/// Sensor data quality limits.
#[derive(Debug, Clone)]
pub struct SensorCfg {
    /// Readings older than this are stale (minutes).
    pub stale_after_min: f64,
    /// Noise level at or above this is noisy.
    pub max_noise: u8,
    /// Values below this are sensor sentinels, not glucose.
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

/// Cycle-level safety assessment (`SafetyDecision`).
#[derive(Debug, Clone)]
pub struct SafetyCfg {
    /// Delta at or below this is a rapid drop.
    pub rapid_drop_delta: f64,
    /// A rapid drop within this margin above target stops basal.
    pub rapid_drop_margin: f64,
    /// Bolus factor during a rapid drop well above target.
    pub rapid_drop_bolus_factor: f64,
    /// IOB above this fraction of TDD halves the bolus factor.
    pub high_iob_tdd_frac: f64,
    pub high_iob_factor: f64,
    /// Time-in-range below this fraction reduces the bolus factor.
    pub low_tir: f64,
    pub low_tir_factor: f64,
}

impl Default for SafetyCfg {
    fn default() -> Self {
        Self {
            rapid_drop_delta: -8.0,
            rapid_drop_margin: 40.0,
            rapid_drop_bolus_factor: 0.3,
            high_iob_tdd_frac: 0.25,
            high_iob_factor: 0.5,
            low_tir: 0.5,
            low_tir_factor: 0.85,
        }
    }
}

/// Basal band and bolus damper for one exercise intensity.
#[derive(Debug, Clone, Copy)]
pub struct ActivityBand {
    pub floor_frac: f64,
    pub ceiling_frac: f64,
    pub bolus_damper: f64,
}

/// Exercise bands keyed by intensity.
#[derive(Debug, Clone)]
pub struct ActivityCfg {
    pub light: ActivityBand,
    pub moderate: ActivityBand,
    pub vigorous: ActivityBand,
}

impl Default for ActivityCfg {
    fn default() -> Self {
        Self {
            light: ActivityBand {
                floor_frac: 0.6,
                ceiling_frac: 1.0,
                bolus_damper: 0.8,
            },
            moderate: ActivityBand {
                floor_frac: 0.4,
                ceiling_frac: 0.8,
                bolus_damper: 0.6,
            },
            vigorous: ActivityBand {
                floor_frac: 0.2,
                ceiling_frac: 0.6,
                bolus_damper: 0.4,
            },
        }
    }
}

/// Bounds applied to collaborator modulation factors.
#[derive(Debug, Clone)]
pub struct ModulationCfg {
    pub min_factor: f64,
    pub max_factor: f64,
    /// Last-known-good factors older than this fall back to neutral.
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

/// Post-hoc reviewer boundary.
#[derive(Debug, Clone)]
pub struct ReviewCfg {
    pub timeout_ms: u64,
}

impl Default for ReviewCfg {
    fn default() -> Self {
        Self { timeout_ms: 2_000 }
    }
}

/// Everything the pipeline is tuned by.
#[derive(Debug, Clone, Default)]
pub struct LoopCfg {
    pub hypo: HypoCfg,
    pub smb: SmbCfg,
    pub basal: BasalCfg,
    pub explicit: ExplicitCfg,
    pub advisor: AdvisorCfg,
    pub autodrive: AutodriveCfg,
    pub sensor: SensorCfg,
    pub safety: SafetyCfg,
    pub activity: ActivityCfg,
    pub modulation: ModulationCfg,
    pub review: ReviewCfg,
}
