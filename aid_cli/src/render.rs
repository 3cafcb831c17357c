//! Directive output: one human line, or one JSON object per cycle.

use aid_core::{CycleReport, DosingDirective};
use aid_core::runner::ReplaySummary;
use serde_json::{Value, json};

pub fn directive_json(t_min: Option<f64>, report: &CycleReport) -> Value {
    let d = &report.directive;
    json!({
        "t_min": t_min,
        "source": d.source.as_str(),
        "bolus_u": d.bolus_units,
        "basal_uph": d.basal_rate_uph,
        "basal_duration_min": d.basal_duration_min,
        "hypo": report.hypo.describe(),
        "reviewed": report.reviewed,
        "gate": report.audit.as_ref().map(|a| json!({
            "proposed_u": a.proposed,
            "final_u": a.final_units,
            "fired": a.fired().map(|e| e.stage.as_str()).collect::<Vec<_>>(),
        })),
        "trail": d.trail.lines(),
    })
}

pub fn directive_line(t_min: Option<f64>, d: &DosingDirective) -> String {
    let basal = format!(
        "basal {:.2} U/h for {} min",
        d.basal_rate_uph, d.basal_duration_min
    );
    let head = match t_min {
        Some(t) => format!("t={t:>7.1} min  "),
        None => String::new(),
    };
    format!(
        "{head}{:<22} bolus {:.2} U, {basal}",
        d.source.as_str(),
        d.bolus_units
    )
}

pub fn summary_json(s: &ReplaySummary) -> Value {
    json!({
        "summary": {
            "cycles": s.cycles,
            "boluses": s.boluses,
            "total_bolus_u": s.total_bolus_u,
            "halts": s.halts,
            "interrupted": s.interrupted,
        }
    })
}

pub fn summary_line(s: &ReplaySummary) -> String {
    format!(
        "{} cycles, {} boluses ({:.2} U total), {} safety halts{}",
        s.cycles,
        s.boluses,
        s.total_bolus_u,
        s.halts,
        if s.interrupted { ", interrupted" } else { "" }
    )
}
