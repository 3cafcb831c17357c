use super::{Applied, DecisionResult, DecisionSource, Strategy, StrategyEnv};
use crate::context::DataQuality;

/// Halts all insulin for unusable data or BG/forecast at or below threshold.
pub struct SafetyHalt;

impl Strategy for SafetyHalt {
    fn source(&self) -> DecisionSource {
        DecisionSource::SafetyHalt
    }

    fn evaluate(&self, env: &StrategyEnv<'_>) -> DecisionResult {
        let ctx = env.ctx;
        let reason = match ctx.quality {
            DataQuality::Missing => Some("safety halt: data missing".to_string()),
            DataQuality::Stale { age_min } => {
                Some(format!("safety halt: data stale ({age_min:.1} min old)"))
            }
            DataQuality::Noisy { level } => {
                Some(format!("safety halt: sensor noise level {level}"))
            }
            DataQuality::Ok if ctx.bg <= ctx.threshold => Some(format!(
                "safety halt: BG below threshold ({:.0} <= {:.0})",
                ctx.bg, ctx.threshold
            )),
            DataQuality::Ok if ctx.min_guard_bg() <= ctx.threshold => Some(format!(
                "safety halt: forecast below threshold ({:.0} <= {:.0})",
                ctx.min_guard_bg(),
                ctx.threshold
            )),
            DataQuality::Ok => None,
        };

        match reason {
            Some(r) => {
                tracing::info!(reason = %r, "safety halt");
                DecisionResult::applied(
                    Applied::new(DecisionSource::SafetyHalt, r)
                        .with_basal(0.0, env.basal.duration_min()),
                )
            }
            None => DecisionResult::fallthrough(DecisionSource::SafetyHalt, "no halt condition"),
        }
    }
}
