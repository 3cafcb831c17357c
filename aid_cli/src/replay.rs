//! `aid replay`: drive a recorded trace through the loop on a manual clock.

use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use aid_config::{Config, TraceRow};
use aid_core::context::MealEstimate;
use aid_core::runner::{ReplayStep, ReplaySummary, replay};
use aid_core::{LoopCfg, LoopController};
use aid_traits::{Clock, ManualClock};
use eyre::Result;

use crate::error_fmt::CliError;
use crate::inputs;
use crate::render;

pub struct ReplayOpts {
    pub paced_ms: Option<u64>,
    pub trail: bool,
    pub json: bool,
}

fn row_ms(t_min: f64) -> i64 {
    (t_min * 60_000.0).round() as i64
}

/// Carb entries stay visible to later rows; the core skips estimates it already covered.
pub fn steps(cfg: &Config, rows: &[TraceRow]) -> Vec<ReplayStep> {
    let mut estimate: Option<MealEstimate> = None;
    rows.iter()
        .map(|row| {
            let at_ms = row_ms(row.t_min);
            if let Some(carbs_g) = row.carbs_g.filter(|c| *c > 0.0) {
                estimate = Some(MealEstimate { carbs_g, at_ms });
            }
            ReplayStep {
                at_ms,
                inputs: inputs::from_row(cfg, row, at_ms, estimate),
            }
        })
        .collect()
}

pub fn run(cfg: &Config, trace: &Path, opts: &ReplayOpts, shutdown: Arc<AtomicBool>) -> Result<ReplaySummary> {
    let rows = aid_config::load_trace_csv(trace)
        .map_err(|e| eyre::Report::new(CliError::Trace(format!("{e:#}"))))?;
    tracing::info!(rows = rows.len(), path = %trace.display(), "trace loaded");

    let clock = ManualClock::new(0);
    let controller = LoopController::builder()
        .with_config(LoopCfg::from(cfg))
        .with_clock(Arc::new(clock.clone()))
        .build()?;

    let pace = opts.paced_ms.map(Duration::from_millis);
    let summary = replay(&controller, &clock, steps(cfg, &rows), |report| {
        // The replay pins the clock to the current row.
        let t_min = Some(clock.now_ms() as f64 / 60_000.0);
        if opts.json {
            println!("{}", render::directive_json(t_min, report));
        } else {
            println!("{}", render::directive_line(t_min, &report.directive));
            if opts.trail {
                for line in report.directive.trail.lines() {
                    println!("    {line}");
                }
            }
        }
        if let Some(p) = pace {
            std::thread::sleep(p);
        }
        if shutdown.load(Ordering::SeqCst) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });

    if summary.interrupted {
        tracing::warn!(cycles = summary.cycles, "replay interrupted");
    }
    if opts.json {
        println!("{}", render::summary_json(&summary));
    } else {
        println!("{}", render::summary_line(&summary));
    }
    Ok(summary)
}
