use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::*;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;

use adaptrs::adaptation::{AdaptationDecisionEngine, AdaptationService};
use adaptrs::catalog::StaticCatalog;
use adaptrs::coaching::SilentCoach;
use adaptrs::config::EngineConfig;
use adaptrs::intensity::{IntensityScorer, SetCompletion};
use adaptrs::logging::{init_logging, LogConfig, LogLevel};
use adaptrs::mesocycle::MesocycleTracker;
use adaptrs::models::{AccountKind, WorkoutContext};
use adaptrs::schedule::{HistoryCleanup, WeeklyRollover};
use adaptrs::store::{HistoryStore, SqliteStore, UserLocks};
use adaptrs::strain::StrainStatus;
use adaptrs::sync::ConflictResolver;

/// Adaptive training-intensity engine CLI
///
/// Scores completed sets, evaluates adaptation decisions, runs the
/// weekly batch jobs, and reconciles divergent records.
#[derive(Parser)]
#[command(name = "adaptrs")]
#[command(version = "0.1.0")]
#[command(about = "Adaptive training-intensity engine", long_about = None)]
struct Cli {
    /// Path to the SQLite history store
    #[arg(short, long, value_name = "FILE", default_value = "adaptrs.db")]
    database: PathBuf,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a completed set and persist the result
    Score {
        /// User identifier
        #[arg(long)]
        user: String,

        /// Set identifier
        #[arg(long)]
        set: String,

        /// Tempo adherence score (0-100)
        #[arg(long)]
        tempo: Decimal,

        /// Motion smoothness score (0-100)
        #[arg(long)]
        smoothness: Decimal,

        /// Rep consistency score (0-100)
        #[arg(long)]
        consistency: Decimal,

        /// User feedback adjustment (-15 to 20)
        #[arg(long, default_value = "0")]
        feedback: Decimal,

        /// Live strain status at completion (green, yellow, red)
        #[arg(long, default_value = "green")]
        strain: String,

        /// Mark the score as based on fallback inputs
        #[arg(long)]
        estimated: bool,

        /// Score for a trainer account (uncapped)
        #[arg(long)]
        trainer: bool,
    },

    /// Evaluate an adaptation decision from a JSON workout context
    Evaluate {
        /// Path to a JSON file with the workout context
        #[arg(long)]
        context: PathBuf,
    },

    /// Run the weekly rollover for all users
    Rollover,

    /// Purge history older than the retention window
    Cleanup {
        /// Override the retention window in days
        #[arg(long)]
        retention_days: Option<u16>,
    },

    /// Merge two divergent versions of a preference record
    Merge {
        /// Path to the local version (JSON)
        #[arg(long)]
        local: PathBuf,

        /// Path to the remote version (JSON)
        #[arg(long)]
        remote: PathBuf,
    },

    /// Show the effective engine configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LogLevel::Warn,
        1 => LogLevel::Info,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };
    init_logging(&LogConfig {
        level,
        ..LogConfig::default()
    })?;

    let config = EngineConfig::load_or_default();

    match cli.command {
        Commands::Score {
            user,
            set,
            tempo,
            smoothness,
            consistency,
            feedback,
            strain,
            estimated,
            trainer,
        } => {
            let status = parse_strain_status(&strain)?;
            let completion = SetCompletion {
                user_id: user.clone(),
                set_id: set,
                tempo_score: tempo,
                motion_smoothness_score: smoothness,
                rep_consistency_score: consistency,
                user_feedback_score: feedback,
                strain_modifier: status.modifier(),
                is_estimated: estimated,
            };
            let account = if trainer {
                AccountKind::Trainer
            } else {
                AccountKind::Standard
            };

            let scorer = IntensityScorer::with_config(config.scoring);
            let score = scorer
                .score_set(&completion, account)
                .map_err(|e| anyhow!(e.to_string()))?;

            let store = SqliteStore::open(&cli.database)?;
            store.append_score(&user, &score)?;

            println!("{}", "Set scored".green().bold());
            println!("  Total: {}", score.total_score);
            if score.is_estimated {
                println!("  {}", "(estimated: fallback inputs were used)".dimmed());
            }
        }

        Commands::Evaluate { context } => {
            let content = std::fs::read_to_string(&context)
                .with_context(|| format!("Failed to read context file: {}", context.display()))?;
            let workout: WorkoutContext =
                serde_json::from_str(&content).context("Invalid workout context JSON")?;

            let store = SqliteStore::open(&cli.database)?;
            let tracker = MesocycleTracker::new(store.clone());
            let service = AdaptationService::new(
                AdaptationDecisionEngine::with_config(config.adaptation),
                store,
                tracker,
                StaticCatalog::seeded(),
                SilentCoach,
            );

            let result = service
                .evaluate_and_apply(&workout)
                .map_err(|e| anyhow!(e.to_string()))?;

            println!("{}", "Adaptation decision".blue().bold());
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Rollover => {
            let store = SqliteStore::open(&cli.database)?;
            let tracker = MesocycleTracker::new(store.clone());
            let rollover = WeeklyRollover::new(
                store,
                tracker,
                Arc::new(UserLocks::new()),
                config.retry.clone(),
            )
            .with_progress(true);

            let report = rollover.run(Utc::now()).map_err(|e| anyhow!(e.to_string()))?;
            report.print_summary();
        }

        Commands::Cleanup { retention_days } => {
            let store = SqliteStore::open(&cli.database)?;
            let retention = retention_days.unwrap_or(config.cleanup.retention_days);
            let cleanup = HistoryCleanup::new(store, retention, config.retry.clone());

            let report = cleanup.run(Utc::now()).map_err(|e| anyhow!(e.to_string()))?;
            report.print_summary();
        }

        Commands::Merge { local, remote } => {
            let local_prefs = read_preferences(&local)?;
            let remote_prefs = read_preferences(&remote)?;

            let outcome = ConflictResolver::merge_preferences(&local_prefs, &remote_prefs)
                .map_err(|e| anyhow!(e.to_string()))?;

            println!("{}", "Merged record".cyan().bold());
            println!("{}", serde_json::to_string_pretty(&outcome.merged)?);
            if outcome.is_clean() {
                println!("{}", "No conflicts".green());
            } else {
                println!("{}", format!("{} conflicting field(s):", outcome.conflicts.len()).yellow());
                for conflict in &outcome.conflicts {
                    println!(
                        "  {}: local={} remote={}",
                        conflict.field, conflict.local, conflict.remote
                    );
                }
            }
        }

        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn parse_strain_status(s: &str) -> Result<StrainStatus> {
    match s.to_lowercase().as_str() {
        "green" => Ok(StrainStatus::Green),
        "yellow" => Ok(StrainStatus::Yellow),
        "red" => Ok(StrainStatus::Red),
        _ => Err(anyhow!("Unknown strain status: {s} (expected green, yellow, or red)")),
    }
}

fn read_preferences(path: &PathBuf) -> Result<adaptrs::models::UserTrainingPreferences> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    serde_json::from_str(&content).context("Invalid preference record JSON")
}
