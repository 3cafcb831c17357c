//! Human-readable error descriptions and structured JSON error formatting.

use aid_core::error::BuildError;

/// Failures raised by the CLI itself, before the core runs.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid trace: {0}")]
    Trace(String),
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(ce) = err.downcast_ref::<CliError>() {
        return match ce {
            CliError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: A TOML syntax error or an out-of-range value.\nHow to fix: Edit the config file, then rerun `aid self-check`."
            ),
            CliError::Trace(msg) => format!(
                "What happened: The trace CSV could not be used ({msg}).\nLikely causes: Wrong header, a non-numeric cell, or t_min not strictly increasing.\nHow to fix: The header must be exactly {}.",
                aid_config::TRACE_HEADERS.join(",")
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingConfig => {
                "What happened: The loop controller was built without a configuration.\nLikely causes: An internal wiring error.\nHow to fix: Report this; it is not caused by your inputs.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun `aid self-check`."
            ),
        };
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("no such file") || lower.contains("permission denied") {
        return format!(
            "What happened: A file could not be read ({msg}).\nHow to fix: Check the path passed to --config or --trace."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 3 config, 4 trace, 1 anything else. Clap uses 2 for usage errors.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(ce) = err.downcast_ref::<CliError>() {
        return match ce {
            CliError::Config(_) => 3,
            CliError::Trace(_) => 4,
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return 3;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<CliError>() {
        Some(CliError::Config(_)) => "InvalidConfig",
        Some(CliError::Trace(_)) => "InvalidTrace",
        None if err.downcast_ref::<BuildError>().is_some() => "InvalidConfig",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;
    json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_error_kind() {
        let cfg = eyre::Report::new(CliError::Config("x".into()));
        let trace = eyre::Report::new(CliError::Trace("y".into()));
        let build = eyre::Report::new(BuildError::InvalidConfig("z"));
        let other = eyre::eyre!("boom");
        assert_eq!(exit_code_for_error(&cfg), 3);
        assert_eq!(exit_code_for_error(&trace), 4);
        assert_eq!(exit_code_for_error(&build), 3);
        assert_eq!(exit_code_for_error(&other), 1);
        assert!(format_error_json(&trace).contains("\"InvalidTrace\""));

        // Core loop errors never reach the CLI typed; they format generically.
        let core = eyre::Report::new(aid_core::LoopError::Timeout("reviewer"));
        assert_eq!(exit_code_for_error(&core), 1);
        assert!(humanize(&core).starts_with("Something went wrong."));
    }
}
