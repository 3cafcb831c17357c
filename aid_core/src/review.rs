//! Optional post-hoc review of a directive.
//!
//! One long-lived worker thread owns the reviewer. A cycle hands it a request
//! over a rendezvous channel and waits on a bounded reply channel, both within
//! `review.timeout_ms`. While a review is still running the next cycle cannot
//! hand off and times out instead of stacking threads.
//!
//! A verdict may only lower the bolus or the basal. Timeouts and errors keep
//! the original directive.

use std::sync::Arc;
use std::time::{Duration, Instant};

use aid_traits::{DirectiveReviewer, ReviewRequest, ReviewVerdict};
use crossbeam_channel as xch;

use crate::error::LoopError;
use crate::util::floor_to_step;

type Reply = Result<ReviewVerdict, String>;

struct Job {
    req: ReviewRequest,
    reply: xch::Sender<Reply>,
}

/// Handle to the reviewer thread. Dropping it lets the thread exit once idle.
pub struct ReviewWorker {
    tx: xch::Sender<Job>,
}

impl ReviewWorker {
    pub fn spawn(reviewer: Arc<dyn DirectiveReviewer>) -> Result<Self, LoopError> {
        let (tx, rx) = xch::bounded::<Job>(0);
        std::thread::Builder::new()
            .name("aid-review".to_string())
            .spawn(move || {
                for job in rx.iter() {
                    let outcome = reviewer.review(&job.req).map_err(|e| e.to_string());
                    // Receiver gone means that cycle already timed out.
                    let _ = job.reply.send(outcome);
                }
            })
            .map_err(|e| LoopError::Io(format!("spawn reviewer: {e}")))?;
        Ok(Self { tx })
    }

    /// Ask the reviewer, bounded by `timeout` end to end.
    pub fn request(&self, req: ReviewRequest, timeout: Duration) -> Result<ReviewVerdict, LoopError> {
        let deadline = Instant::now() + timeout;
        let (reply_tx, reply_rx) = xch::bounded(1);
        match self.tx.send_timeout(Job { req, reply: reply_tx }, timeout) {
            Ok(()) => {}
            Err(xch::SendTimeoutError::Timeout(_)) => {
                return Err(LoopError::Timeout("reviewer (previous review still running)"));
            }
            Err(xch::SendTimeoutError::Disconnected(_)) => {
                return Err(LoopError::Collaborator {
                    name: "reviewer",
                    message: "review worker exited".to_string(),
                });
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        match reply_rx.recv_timeout(remaining) {
            Ok(Ok(verdict)) => Ok(verdict),
            Ok(Err(message)) => Err(LoopError::Collaborator {
                name: "reviewer",
                message,
            }),
            Err(xch::RecvTimeoutError::Timeout) => Err(LoopError::Timeout("reviewer")),
            Err(xch::RecvTimeoutError::Disconnected) => Err(LoopError::Collaborator {
                name: "reviewer",
                message: "exited without a verdict".to_string(),
            }),
        }
    }
}

/// Directive values after applying a verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewOutcome {
    pub bolus_units: f64,
    pub basal_rate_uph: f64,
    pub changed: bool,
    pub notes: Vec<String>,
}

/// Step sizes and caps a verdict is held to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReviewLimits {
    pub basal_cap_uph: f64,
    pub basal_step_uph: f64,
    pub bolus_step_u: f64,
}

pub fn apply_verdict(
    verdict: &ReviewVerdict,
    bolus_units: f64,
    basal_rate_uph: f64,
    limits: ReviewLimits,
) -> ReviewOutcome {
    let mut out = ReviewOutcome {
        bolus_units,
        basal_rate_uph,
        changed: false,
        notes: Vec::new(),
    };

    match verdict.bolus_units {
        Some(b) if !b.is_finite() => out.notes.push("review: non-finite bolus ignored".into()),
        Some(b) if b < bolus_units => {
            let reduced = floor_to_step(b.max(0.0), limits.bolus_step_u);
            out.notes.push(format!(
                "review: bolus reduced {bolus_units:.2} -> {reduced:.2} U"
            ));
            out.bolus_units = reduced;
            out.changed = true;
        }
        Some(b) if b > bolus_units => out.notes.push(format!(
            "review: bolus increase to {b:.2} U ignored"
        )),
        _ => {}
    }

    // The decided basal is the ceiling; a halt's zero stays zero.
    match verdict.basal_rate_uph {
        Some(r) if !r.is_finite() => out.notes.push("review: non-finite basal ignored".into()),
        Some(r) if r > basal_rate_uph => out.notes.push(format!(
            "review: basal increase to {r:.2} U/h ignored"
        )),
        Some(r) => {
            let upper = basal_rate_uph.min(limits.basal_cap_uph).max(0.0);
            let reduced = floor_to_step(r.clamp(0.0, upper), limits.basal_step_uph);
            if (reduced - basal_rate_uph).abs() > 1e-9 {
                out.notes.push(format!(
                    "review: basal reduced {basal_rate_uph:.2} -> {reduced:.2} U/h"
                ));
                out.basal_rate_uph = reduced;
                out.changed = true;
            }
        }
        None => {}
    }

    if let Some(note) = &verdict.note {
        out.notes.push(format!("review: {note}"));
    }
    out
}
