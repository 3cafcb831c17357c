//! Minimum spacing between automated boluses, plus the persisted cooldown clocks.

use crate::config::SmbCfg;
use crate::context::MealKind;

/// Meal-mode prebolus phases delivered for one activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MealPrebolusMark {
    pub kind: MealKind,
    /// Activation time, derived from `now - elapsed`.
    pub started_at_ms: i64,
    pub phase1_at_ms: Option<i64>,
    pub phase2_at_ms: Option<i64>,
}

/// Persisted across cycles. Only committed after a directive is final.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CooldownState {
    pub last_bolus_at_ms: Option<i64>,
    pub last_autodrive_at_ms: Option<i64>,
    pub meal_prebolus: Option<MealPrebolusMark>,
    /// Timestamp of the confirmed meal estimate the advisor already covered.
    pub advised_meal_at_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefractoryVerdict {
    Open { interval_min: f64 },
    Blocked { minutes_since: f64, interval_min: f64 },
    Bypassed,
}

impl RefractoryVerdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, RefractoryVerdict::Blocked { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct RefractoryGate {
    cfg: SmbCfg,
}

impl RefractoryGate {
    pub fn new(cfg: SmbCfg) -> Self {
        Self { cfg }
    }

    /// Effective spacing. Widened when flying without a forecast.
    pub fn interval_min(&self, forecast_available: bool) -> f64 {
        if forecast_available {
            self.cfg.interval_min
        } else {
            (self.cfg.interval_min * self.cfg.blind_interval_factor)
                .max(self.cfg.blind_interval_floor_min)
        }
    }

    pub fn check(
        &self,
        minutes_since_bolus: Option<f64>,
        forecast_available: bool,
        bypass: bool,
    ) -> RefractoryVerdict {
        if bypass {
            return RefractoryVerdict::Bypassed;
        }
        let interval_min = self.interval_min(forecast_available);
        match minutes_since_bolus {
            Some(since) if since < interval_min => RefractoryVerdict::Blocked {
                minutes_since: since,
                interval_min,
            },
            _ => RefractoryVerdict::Open { interval_min },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blind_interval_widens_with_floor() {
        let g = RefractoryGate::default();
        assert!((g.interval_min(true) - 5.0).abs() < 1e-9);
        assert!((g.interval_min(false) - 7.5).abs() < 1e-9);

        let short = RefractoryGate::new(SmbCfg {
            interval_min: 3.0,
            ..SmbCfg::default()
        });
        assert!((short.interval_min(false) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn blocks_inside_window_only() {
        let g = RefractoryGate::default();
        assert!(g.check(Some(4.0), true, false).is_blocked());
        assert!(!g.check(Some(5.0), true, false).is_blocked());
        assert!(!g.check(None, true, false).is_blocked());
        assert!(g.check(Some(6.0), false, false).is_blocked());
        assert_eq!(g.check(Some(0.0), true, true), RefractoryVerdict::Bypassed);
    }
}
