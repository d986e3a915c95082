//! Mood CLI - Command-line interface for Synheart Mood
//!
//! Commands:
//! - upload: Ingest export files (.json or .zip) and predict affected days
//! - recompute: Recompute features and predictions for every stored day
//! - history: Print predictions for a date range
//! - today: Print the prediction for one day
//! - infer: Score a feature row read from a file or stdin
//! - label: Record a self-reported mood
//! - doctor: Diagnose configuration and database health

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use synheart_mood::query::{history, mood_history, record_mood, today};
use synheart_mood::types::{DerivedFeatureRow, Prediction};
use synheart_mood::{
    infer_mood, Config, MoodError, MoodPipeline, SqliteStore, UploadFile, UserId, MOOD_VERSION,
    PRODUCER_NAME,
};

/// Mood - Baseline-relative mood estimation from wearable exports
#[derive(Parser)]
#[command(name = "mood")]
#[command(author = "Synheart AI Inc")]
#[command(version = MOOD_VERSION)]
#[command(about = "Estimate daily mood from wearable health exports", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the configuration
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest export files and predict affected days
    Upload {
        /// User identifier
        #[arg(short, long)]
        user: String,

        /// Export files (.json) or archives (.zip)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Recompute features and predictions for every stored day
    Recompute {
        #[arg(short, long)]
        user: String,
    },

    /// Print predictions for a date range
    History {
        #[arg(short, long)]
        user: String,

        /// First day (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,

        /// Print self-reported moods instead of predictions
        #[arg(long)]
        labels: bool,
    },

    /// Print the prediction for one day
    Today {
        #[arg(short, long)]
        user: String,

        /// Day to look up (defaults to the local date)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Score a feature row (JSON) without touching the database
    Infer {
        /// Input file path (reads stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Record a self-reported mood
    Label {
        #[arg(short, long)]
        user: String,

        #[arg(long)]
        date: NaiveDate,

        /// Mood from 1 to 5
        #[arg(long)]
        mood: u8,

        #[arg(long)]
        note: Option<String>,
    },

    /// Diagnose configuration and database health
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), MoodCliError> {
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path)?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }
    init_tracing(&config.log_filter);

    match cli.command {
        Commands::Upload { user, files } => cmd_upload(&config, &UserId::new(user), &files),
        Commands::Recompute { user } => cmd_recompute(&config, &UserId::new(user)),
        Commands::History {
            user,
            start,
            end,
            labels,
        } => cmd_history(&config, &UserId::new(user), start, end, labels),
        Commands::Today { user, date } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            cmd_today(&config, &UserId::new(user), date)
        }
        Commands::Infer { input } => cmd_infer(input.as_deref()),
        Commands::Label {
            user,
            date,
            mood,
            note,
        } => cmd_label(&config, &UserId::new(user), date, mood, note),
        Commands::Doctor { json } => cmd_doctor(&config, &config_path, json),
    }
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
}

fn open_pipeline(config: &Config) -> Result<MoodPipeline<SqliteStore>, MoodCliError> {
    let store = SqliteStore::open(&config.database_path)?;
    Ok(MoodPipeline::with_config(store, config.feature_config())
        .retry_failed_uploads(config.retry_failed_uploads))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), MoodCliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_upload(config: &Config, user: &UserId, paths: &[PathBuf]) -> Result<(), MoodCliError> {
    let files = paths
        .iter()
        .map(UploadFile::from_path)
        .collect::<Result<Vec<_>, _>>()?;

    let pipeline = open_pipeline(config)?;
    let summary = pipeline.process_upload(user, files)?;
    print_json(&summary)
}

fn cmd_recompute(config: &Config, user: &UserId) -> Result<(), MoodCliError> {
    let pipeline = open_pipeline(config)?;
    let days_predicted = pipeline.recompute_user(user)?;
    print_json(&serde_json::json!({ "days_predicted": days_predicted }))
}

fn cmd_history(
    config: &Config,
    user: &UserId,
    start: NaiveDate,
    end: NaiveDate,
    labels: bool,
) -> Result<(), MoodCliError> {
    let store = SqliteStore::open(&config.database_path)?;
    if labels {
        print_json(&mood_history(&store, user, start, end)?)
    } else {
        print_json(&history(&store, user, start, end)?)
    }
}

fn cmd_today(config: &Config, user: &UserId, date: NaiveDate) -> Result<(), MoodCliError> {
    let store = SqliteStore::open(&config.database_path)?;
    print_json(&today(&store, user, date)?)
}

fn cmd_infer(input: Option<&Path>) -> Result<(), MoodCliError> {
    let input_data = match input {
        Some(path) if path.to_string_lossy() != "-" => fs::read_to_string(path)?,
        _ => {
            if atty::is(atty::Stream::Stdin) {
                return Err(MoodCliError::NoInput);
            }
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let row: DerivedFeatureRow = serde_json::from_str(&input_data)?;
    let prediction = Prediction::from_estimate(row.date, infer_mood(&row));
    print_json(&prediction)
}

fn cmd_label(
    config: &Config,
    user: &UserId,
    date: NaiveDate,
    mood: u8,
    note: Option<String>,
) -> Result<(), MoodCliError> {
    let store = SqliteStore::open(&config.database_path)?;
    print_json(&record_mood(&store, user, date, mood, note)?)
}

fn cmd_doctor(config: &Config, config_path: &Path, json: bool) -> Result<(), MoodCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "mood_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Mood version {}", MOOD_VERSION),
    });

    checks.push(if config_path.exists() {
        DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: format!("Loaded {}", config_path.display()),
        }
    } else {
        DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Warning,
            message: format!("{} does not exist, using defaults", config_path.display()),
        }
    });

    checks.push(DoctorCheck {
        name: "baseline".to_string(),
        status: CheckStatus::Ok,
        message: format!(
            "{}-day window; minimum days sleep={} hrv={} activity={} stress={}",
            config.baseline_window_days,
            config.min_sleep_baseline_days,
            config.min_hrv_baseline_days,
            config.min_activity_baseline_days,
            config.min_stress_baseline_days
        ),
    });

    checks.push(match SqliteStore::open(&config.database_path) {
        Ok(store) => match store.schema_version() {
            Ok(version) => DoctorCheck {
                name: "database".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "{} (schema version {})",
                    config.database_path.display(),
                    version
                ),
            },
            Err(e) => DoctorCheck {
                name: "database".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read schema version: {}", e),
            },
        },
        Err(e) => DoctorCheck {
            name: "database".to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot open {}: {}", config.database_path.display(), e),
        },
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: MOOD_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Mood Doctor Report");
        println!("==================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(MoodCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum MoodCliError {
    Io(io::Error),
    Mood(MoodError),
    Json(serde_json::Error),
    NoInput,
    DoctorFailed,
}

impl From<io::Error> for MoodCliError {
    fn from(e: io::Error) -> Self {
        MoodCliError::Io(e)
    }
}

impl From<MoodError> for MoodCliError {
    fn from(e: MoodError) -> Self {
        MoodCliError::Mood(e)
    }
}

impl From<serde_json::Error> for MoodCliError {
    fn from(e: serde_json::Error) -> Self {
        MoodCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<MoodCliError> for CliError {
    fn from(e: MoodCliError) -> Self {
        match e {
            MoodCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            MoodCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            MoodCliError::NoInput => CliError {
                code: "NO_INPUT".to_string(),
                message: "No feature row provided".to_string(),
                hint: Some("Pass --input <file> or pipe a feature row on stdin".to_string()),
            },
            MoodCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            MoodCliError::Mood(e) => {
                let (code, hint) = match &e {
                    MoodError::UnsupportedUpload(_) | MoodError::Archive(_) => (
                        "UPLOAD_REJECTED",
                        "Upload .json export files or a .zip export archive",
                    ),
                    MoodError::Pipeline { .. } => (
                        "PIPELINE_FAILED",
                        "The upload was marked failed; see the log for the failing stage",
                    ),
                    MoodError::InvalidRange(_) | MoodError::InvalidDate(_) => {
                        ("INVALID_DATE", "Dates use YYYY-MM-DD and start must not be after end")
                    }
                    MoodError::InvalidLabel(_) => ("INVALID_LABEL", "Mood labels range from 1 to 5"),
                    MoodError::Config(_) => ("CONFIG_ERROR", "Fix or remove the configuration file"),
                    MoodError::Storage(_) | MoodError::Ledger(_) => {
                        ("STORAGE_ERROR", "Run 'mood doctor' to check the database")
                    }
                    MoodError::Json(_) => ("JSON_ERROR", "Check JSON syntax"),
                    MoodError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
