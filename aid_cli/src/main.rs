mod cli;
mod error_fmt;
mod inputs;
mod render;
mod replay;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use aid_config::Config;
use aid_core::{LoopCfg, LoopController};
use aid_traits::{Clock, SystemClock};
use clap::Parser;
use eyre::Result;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{CliError, exit_code_for_error, format_error_json, humanize};
use crate::replay::ReplayOpts;

fn main() {
    // Colored panic and error reports; ignore a second install.
    let _ = color_eyre::install();

    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = run(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(cli.config.as_deref())?;
    init_tracing(cli.json, cli.log_level.as_deref(), &cfg)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    match cli.cmd {
        Commands::Replay {
            trace,
            paced_ms,
            trail,
        } => {
            let opts = ReplayOpts {
                paced_ms,
                trail,
                json: cli.json,
            };
            let summary = replay::run(&cfg, &trace, &opts, shutdown)?;
            tracing::info!(
                cycles = summary.cycles,
                boluses = summary.boluses,
                total_bolus_u = summary.total_bolus_u,
                "replay finished"
            );
            Ok(())
        }
        Commands::Decide(args) => {
            let clock = SystemClock::new();
            let controller = controller_for(&cfg, clock)?;
            let now_ms = clock.now_ms();
            let report = controller.run_cycle_report(&inputs::from_args(&cfg, &args, now_ms));
            if cli.json {
                println!("{}", render::directive_json(None, &report));
            } else {
                println!("{}", render::directive_line(None, &report.directive));
                for line in report.directive.trail.lines() {
                    println!("    {line}");
                }
            }
            Ok(())
        }
        Commands::SelfCheck => {
            let clock = SystemClock::new();
            let controller = controller_for(&cfg, clock)?;
            let report = controller.run_cycle_report(&inputs::in_range(&cfg, clock.now_ms()));
            tracing::debug!(source = %report.directive.source, "self-check cycle");
            if report.directive.bolus_units < 0.0 || !report.directive.basal_rate_uph.is_finite() {
                eyre::bail!("self-check produced an invalid directive");
            }
            println!("self-check ok");
            Ok(())
        }
    }
}

fn controller_for(cfg: &Config, clock: SystemClock) -> Result<LoopController> {
    LoopController::builder()
        .with_config(LoopCfg::from(cfg))
        .with_clock(Arc::new(clock))
        .try_build()
}

/// Read, parse and validate the typed config. No path means built-in defaults.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = fs::read_to_string(path).map_err(|e| {
        eyre::Report::new(CliError::Config(format!("failed to read {}: {e}", path.display())))
    })?;
    let cfg = aid_config::load_toml(&text)
        .map_err(|e| eyre::Report::new(CliError::Config(e.to_string())))?;
    cfg.validate()
        .map_err(|e| eyre::Report::new(CliError::Config(format!("{e:#}"))))?;
    Ok(cfg)
}

fn init_tracing(json: bool, cli_level: Option<&str>, cfg: &Config) -> Result<()> {
    let level = cli_level
        .map(str::to_owned)
        .or_else(|| cfg.logging.level.clone())
        .unwrap_or_else(|| "info".to_string());
    // RUST_LOG wins over both.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .map_err(|e| eyre::Report::new(CliError::Config(format!("bad log level {level:?}: {e}"))))?;

    // Console logs go to stderr so stdout stays machine-readable.
    let console = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file_layer = match cfg.logging.file.as_deref() {
        Some(file) => {
            let p = Path::new(file);
            let dir = p
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = p
                .file_name()
                .map_or_else(|| "aid.log".into(), |n| n.to_string_lossy().into_owned());
            let appender = match cfg.logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| eyre::eyre!("failed to initialize logging: {e}"))?;
    Ok(())
}
