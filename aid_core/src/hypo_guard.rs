//! Hypoglycemia guard with release hysteresis.
//!
//! A raw block is re-evaluated every cycle from BG, forecast and delta. Once any
//! raw block fires, the guard holds until BG has stayed above
//! `threshold + margin` for `release_hold_min` without interruption. A dip below
//! the release line during the hold restarts the clock.
//!
//! States: `Clear` → (raw block) → `Blocked` → (BG above release line) →
//! `Clearing` → (hold elapsed) → `Clear`.

use crate::config::HypoCfg;
use crate::util::minutes_between;

/// Persisted across cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HysteresisState {
    pub last_blocked_at_ms: Option<i64>,
    pub clear_candidate_since_ms: Option<i64>,
}

impl HysteresisState {
    pub fn is_holding(&self) -> bool {
        self.last_blocked_at_ms.is_some()
    }
}

/// Why the guard is blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HypoBlock {
    /// BG already at or below `threshold - margin`.
    StrongNow,
    /// Predicted and eventual BG both at or below `threshold - margin`.
    StrongFuture,
    /// Falling fast toward a predicted value at or below threshold.
    FastFall,
    /// No raw block this cycle, but BG has not cleared the release line.
    Holding,
}

impl HypoBlock {
    pub fn as_str(self) -> &'static str {
        match self {
            HypoBlock::StrongNow => "bg below threshold",
            HypoBlock::StrongFuture => "predicted and eventual bg below threshold",
            HypoBlock::FastFall => "fast fall toward threshold",
            HypoBlock::Holding => "holding until bg clears release line",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HypoVerdict {
    Blocked(HypoBlock),
    /// Above the release line, waiting for the hold to elapse. Still blocks.
    Clearing { held_min: f64 },
    Clear,
}

impl HypoVerdict {
    pub fn is_blocked(&self) -> bool {
        !matches!(self, HypoVerdict::Clear)
    }

    pub fn describe(&self) -> String {
        match self {
            HypoVerdict::Blocked(b) => format!("hypo guard blocked: {}", b.as_str()),
            HypoVerdict::Clearing { held_min } => {
                format!("hypo guard clearing: above release line for {held_min:.1} min")
            }
            HypoVerdict::Clear => "hypo guard clear".to_string(),
        }
    }
}

/// One cycle's guard inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HypoReading {
    pub bg: f64,
    pub predicted_bg: f64,
    pub eventual_bg: f64,
    pub threshold: f64,
    pub delta: f64,
}

#[derive(Debug, Clone, Default)]
pub struct HypoGuard {
    cfg: HypoCfg,
}

impl HypoGuard {
    pub fn new(cfg: HypoCfg) -> Self {
        Self { cfg }
    }

    /// Stateless raw evaluation for one reading.
    pub fn raw_block(&self, r: &HypoReading) -> Option<HypoBlock> {
        let strong_line = r.threshold - self.cfg.margin_mg_dl;
        if r.bg <= strong_line {
            return Some(HypoBlock::StrongNow);
        }
        // A confirmed fast rise outranks forecasts that lag behind it.
        if self.cfg.fast_rise_bypass && r.delta >= self.cfg.fast_rise_delta {
            return None;
        }
        let rising_above = r.delta >= self.cfg.rising_exempt_delta && r.bg > r.threshold;
        if r.predicted_bg <= strong_line && r.eventual_bg <= strong_line && !rising_above {
            return Some(HypoBlock::StrongFuture);
        }
        if r.delta <= self.cfg.fast_fall_delta && r.predicted_bg <= r.threshold {
            return Some(HypoBlock::FastFall);
        }
        None
    }

    /// Evaluate and advance the hysteresis state. Replaying the same `(reading, now_ms)`
    /// against the resulting state yields the same verdict and leaves the state unchanged.
    pub fn is_blocked(
        &self,
        state: &mut HysteresisState,
        r: &HypoReading,
        now_ms: i64,
    ) -> HypoVerdict {
        if let Some(block) = self.raw_block(r) {
            state.last_blocked_at_ms = Some(now_ms);
            state.clear_candidate_since_ms = None;
            tracing::debug!(reason = block.as_str(), bg = r.bg, "hypo guard raw block");
            return HypoVerdict::Blocked(block);
        }

        if !state.is_holding() {
            state.clear_candidate_since_ms = None;
            return HypoVerdict::Clear;
        }

        let release_line = r.threshold + self.cfg.margin_mg_dl;
        if r.bg <= release_line {
            state.clear_candidate_since_ms = None;
            return HypoVerdict::Blocked(HypoBlock::Holding);
        }

        let since = *state.clear_candidate_since_ms.get_or_insert(now_ms);
        let held_min = minutes_between(since, now_ms).max(0.0);
        if held_min >= self.cfg.release_hold_min {
            state.last_blocked_at_ms = None;
            state.clear_candidate_since_ms = None;
            tracing::debug!(held_min, "hypo guard released");
            HypoVerdict::Clear
        } else {
            HypoVerdict::Clearing { held_min }
        }
    }
}
