//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

use aid_core::context::{ExerciseIntensity, MealKind};

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "aid", version, about = "Closed-loop insulin dosing decision core")]
pub struct Cli {
    /// Path to config TOML (typed). Built-in defaults when omitted.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print directives and errors as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging].level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum MealArg {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
    HighCarb,
}

impl From<MealArg> for MealKind {
    fn from(m: MealArg) -> Self {
        match m {
            MealArg::Breakfast => MealKind::Breakfast,
            MealArg::Lunch => MealKind::Lunch,
            MealArg::Dinner => MealKind::Dinner,
            MealArg::Snack => MealKind::Snack,
            MealArg::HighCarb => MealKind::HighCarb,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExerciseArg {
    Light,
    Moderate,
    Vigorous,
}

impl From<ExerciseArg> for ExerciseIntensity {
    fn from(e: ExerciseArg) -> Self {
        match e {
            ExerciseArg::Light => ExerciseIntensity::Light,
            ExerciseArg::Moderate => ExerciseIntensity::Moderate,
            ExerciseArg::Vigorous => ExerciseIntensity::Vigorous,
        }
    }
}

/// One-shot cycle inputs. Unset averages follow `--delta`.
#[derive(clap::Args, Debug, Clone)]
pub struct DecideArgs {
    /// Current glucose (mg/dL)
    #[arg(long)]
    pub bg: f64,
    /// Change over the last 5 minutes (mg/dL)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub delta: f64,
    #[arg(long, allow_negative_numbers = true)]
    pub short_avg_delta: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub long_avg_delta: Option<f64>,
    /// Insulin on board (U)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub iob: f64,
    /// Carbs on board (g)
    #[arg(long, default_value_t = 0.0)]
    pub cob: f64,
    /// Current insulin activity (U/h)
    #[arg(long, default_value_t = 0.0)]
    pub activity: f64,
    /// Predicted BG from the forecast engine (mg/dL)
    #[arg(long)]
    pub predicted: Option<f64>,
    /// Eventual BG from the forecast engine (mg/dL)
    #[arg(long)]
    pub eventual: Option<f64>,
    /// User-confirmed meal estimate (g)
    #[arg(long)]
    pub carbs: Option<f64>,
    /// Age of the meal estimate (minutes)
    #[arg(long, default_value_t = 0.0)]
    pub carbs_age_min: f64,
    /// Minutes since the last bolus the pump reported
    #[arg(long, value_name = "MIN")]
    pub since_bolus_min: Option<f64>,
    /// Active meal mode
    #[arg(long, value_enum, requires = "meal_elapsed_min")]
    pub meal: Option<MealArg>,
    /// Minutes since the meal mode was activated
    #[arg(long, value_name = "MIN")]
    pub meal_elapsed_min: Option<f64>,
    /// Active exercise intensity
    #[arg(long, value_enum)]
    pub exercise: Option<ExerciseArg>,
    #[arg(long, action = ArgAction::SetTrue)]
    pub fasting: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a recorded CSV trace through the loop
    Replay {
        /// Trace CSV with the strict header
        #[arg(long, value_name = "FILE")]
        trace: PathBuf,
        /// Sleep this long between cycles; Ctrl-C stops the replay
        #[arg(long, value_name = "MS")]
        paced_ms: Option<u64>,
        /// Print the reason trail under each directive
        #[arg(long, action = ArgAction::SetTrue)]
        trail: bool,
    },
    /// Run a single cycle from command-line inputs
    Decide(DecideArgs),
    /// Validate the config and run one synthetic cycle
    SelfCheck,
}
