//! `From` implementations bridging `aid_config` types to `aid_core` types.

use crate::config::{
    AdvisorCfg, AutodriveCfg, BasalCfg, ExplicitCfg, HypoCfg, LoopCfg, ModulationCfg, ReviewCfg,
    SensorCfg, SmbCfg,
};
use crate::context::{MealModePlan, MealModePrefs, Preferences, Profile};

// ── HypoCfg ──────────────────────────────────────────────────────────────────

impl From<&aid_config::HypoCfg> for HypoCfg {
    fn from(c: &aid_config::HypoCfg) -> Self {
        Self {
            margin_mg_dl: c.margin_mg_dl,
            release_hold_min: c.release_hold_min,
            fast_rise_bypass: c.fast_rise_bypass,
            fast_rise_delta: c.fast_rise_delta,
            rising_exempt_delta: c.rising_exempt_delta,
            fast_fall_delta: c.fast_fall_delta,
        }
    }
}

// ── SmbCfg ───────────────────────────────────────────────────────────────────

impl From<&aid_config::SmbCfg> for SmbCfg {
    fn from(c: &aid_config::SmbCfg) -> Self {
        Self {
            interval_min: c.interval_min,
            blind_interval_factor: c.blind_interval_factor,
            blind_interval_floor_min: c.blind_interval_floor_min,
            min_forecast_points: c.min_forecast_points,
            blind_smb_fraction: c.blind_smb_fraction,
            absorption_window_min: c.absorption_window_min,
            absorption_activity_frac: c.absorption_activity_frac,
            absorption_damp: c.absorption_damp,
            absorption_damp_rising: c.absorption_damp_rising,
            high_bg_threshold: c.high_bg_threshold,
            excessive_drop_delta: c.excessive_drop_delta,
            absolute_floor_bg: c.absolute_floor_bg,
            delivery_ratio: c.delivery_ratio,
            bolus_step_u: c.bolus_step_u,
        }
    }
}

// ── BasalCfg ─────────────────────────────────────────────────────────────────

impl From<&aid_config::BasalCfg> for BasalCfg {
    fn from(c: &aid_config::BasalCfg) -> Self {
        Self {
            pump_step_uph: c.pump_step_uph,
            duration_min: c.duration_min,
            daily_safety_multiplier: c.daily_safety_multiplier,
            current_basal_safety_multiplier: c.current_basal_safety_multiplier,
            persistent_rise_floor_frac: c.persistent_rise_floor_frac,
        }
    }
}

impl From<&aid_config::ExplicitCfg> for ExplicitCfg {
    fn from(c: &aid_config::ExplicitCfg) -> Self {
        Self {
            absolute_hard_cap_u: c.absolute_hard_cap_u,
        }
    }
}

// ── Strategies ───────────────────────────────────────────────────────────────

impl From<&aid_config::AdvisorCfg> for AdvisorCfg {
    fn from(c: &aid_config::AdvisorCfg) -> Self {
        Self {
            min_since_bolus_min: c.min_since_bolus_min,
            iob_discount: c.iob_discount,
            min_coverage: c.min_coverage,
            basal_boost: c.basal_boost,
        }
    }
}

impl From<&aid_config::AutodriveCfg> for AutodriveCfg {
    fn from(c: &aid_config::AutodriveCfg) -> Self {
        Self {
            strong_bg: c.strong_bg,
            strong_delta: c.strong_delta,
            moderate_delta: c.moderate_delta,
            large_fraction: c.large_fraction,
            small_fraction: c.small_fraction,
            basal_boost: c.basal_boost,
        }
    }
}

impl From<&aid_config::MealPlanCfg> for MealModePlan {
    fn from(c: &aid_config::MealPlanCfg) -> Self {
        Self {
            prebolus1_u: c.prebolus1_u,
            prebolus2_u: c.prebolus2_u,
            phase2_after_min: c.phase2_after_min,
            runtime_min: c.runtime_min,
            basal_boost: c.basal_boost,
            temp_ceiling_uph: c.temp_ceiling_uph,
        }
    }
}

impl From<&aid_config::MealModeCfg> for MealModePrefs {
    fn from(c: &aid_config::MealModeCfg) -> Self {
        Self {
            breakfast: (&c.breakfast).into(),
            lunch: (&c.lunch).into(),
            dinner: (&c.dinner).into(),
            snack: (&c.snack).into(),
            high_carb: (&c.high_carb).into(),
        }
    }
}

// ── Collaborators and sensor ─────────────────────────────────────────────────

impl From<&aid_config::SensorCfg> for SensorCfg {
    fn from(c: &aid_config::SensorCfg) -> Self {
        Self {
            stale_after_min: c.stale_after_min,
            max_noise: c.max_noise,
            min_valid_bg: c.min_valid_bg,
        }
    }
}

impl From<&aid_config::ModulationCfg> for ModulationCfg {
    fn from(c: &aid_config::ModulationCfg) -> Self {
        Self {
            min_factor: c.min_factor,
            max_factor: c.max_factor,
            last_good_max_age_min: c.last_good_max_age_min,
        }
    }
}

impl From<&aid_config::ReviewCfg> for ReviewCfg {
    fn from(c: &aid_config::ReviewCfg) -> Self {
        Self {
            timeout_ms: c.timeout_ms,
        }
    }
}

// ── Per-cycle profile and preferences ────────────────────────────────────────

impl From<&aid_config::ProfileCfg> for Profile {
    fn from(c: &aid_config::ProfileCfg) -> Self {
        Self {
            target_bg: c.target_bg,
            min_bg: c.min_bg,
            max_bg: c.max_bg,
            max_basal_uph: c.max_basal_uph,
            max_daily_basal_uph: c.max_daily_basal_uph,
            current_basal_uph: c.current_basal_uph,
            carb_ratio: c.carb_ratio,
            isf: c.isf,
            dia_hours: c.dia_hours,
            peak_time_min: c.peak_time_min,
            lgs_threshold: c.lgs_threshold,
            sensitivity_ratio: c.sensitivity_ratio,
        }
    }
}

/// Preferences need the meal-mode table too, so they convert from the whole config.
impl From<&aid_config::Config> for Preferences {
    fn from(c: &aid_config::Config) -> Self {
        let p = &c.preferences;
        Self {
            max_smb_u: p.max_smb_u,
            max_smb_high_bg_u: p.max_smb_high_bg_u,
            max_iob_u: p.max_iob_u,
            autodrive_floor_bg: p.autodrive_floor_bg,
            autodrive_cooldown_min: p.autodrive_cooldown_min,
            meal_advisor_window_min: p.meal_advisor_window_min,
            meal_modes: (&c.meal_mode).into(),
        }
    }
}

// ── LoopCfg ──────────────────────────────────────────────────────────────────

/// Sections without a TOML counterpart (safety factors, activity bands) keep their defaults.
impl From<&aid_config::Config> for LoopCfg {
    fn from(c: &aid_config::Config) -> Self {
        Self {
            hypo: (&c.hypo).into(),
            smb: (&c.smb).into(),
            basal: (&c.basal).into(),
            explicit: (&c.explicit).into(),
            advisor: (&c.advisor).into(),
            autodrive: (&c.autodrive).into(),
            sensor: (&c.sensor).into(),
            modulation: (&c.modulation).into(),
            review: (&c.review).into(),
            ..Self::default()
        }
    }
}
