//! ap_cli - CLI commands for autoprotect
//!
//! This crate provides:
//! - clap-based command definitions
//! - JSON envelope and text output for reports
//! - Wiring of the OpenStack and workloadmgr adapters into a sweeper
//! - One-shot and daemon sweeps

use ap_cloud::{Executor, OpenStackCli, WorkloadMgrCli};
use ap_config::ApConfig;
use ap_sweep::{SweepError, SweepLease, SweepReport, Sweeper, lease, planner};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

pub mod report;

pub use report::{PlanData, ReportEnvelope};

/// CLI errors
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Config error: {0}")]
    ConfigError(#[from] ap_config::ConfigError),

    #[error("Sweep error: {0}")]
    SweepError(#[from] SweepError),

    #[error("Schedule error: {0}")]
    PlanError(#[from] planner::PlanError),

    #[error("Sweep finished with {0} failure(s)")]
    SweepFailures(usize),
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    /// JSON wrapped in a report envelope
    Json,
    /// Human-readable text
    Text,
}

/// Main CLI application
#[derive(Parser, Debug)]
#[command(name = "autoprotect")]
#[command(
    author,
    version,
    about = "Enroll unprotected OpenStack instances into backup jobs"
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Legacy `export KEY=value` rc file, used when no --config is given
    #[arg(long, global = true)]
    pub rc_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format for commands
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one sweep over every domain
    Sweep {
        /// Classify and plan but create no jobs
        #[arg(long)]
        dry_run: bool,

        /// Exit non-zero if any domain, project or instance failed
        #[arg(long)]
        fail_on_error: bool,
    },

    /// Sweep repeatedly every `global.poll_interval_secs`
    Daemon {
        /// Classify and plan but create no jobs
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the schedule the next enrollment would use
    Plan,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration with secrets masked
    Show,

    /// Validate the configuration and exit
    Validate,

    /// List config file search paths
    Paths,
}

impl Cli {
    /// Load the configuration selected by `--config`, `--rc-file` or discovery.
    ///
    /// # Errors
    /// Returns [`CliError::ConfigError`] if the configuration is missing or invalid.
    pub fn load_config(&self) -> Result<ApConfig, CliError> {
        let config = match (&self.config, &self.rc_file) {
            (Some(path), _) => ApConfig::load_with_env(path)?,
            (None, Some(rc)) => ApConfig::from_rc_file(rc)?,
            (None, None) => ApConfig::discover_with_env()?,
        };
        Ok(config)
    }

    /// Run the CLI
    ///
    /// # Errors
    /// Returns a [`CliError`] if the configuration or the command fails.
    pub async fn run(self) -> Result<(), CliError> {
        if let Commands::Config {
            command: ConfigCommands::Paths,
        } = self.command
        {
            print_paths();
            return Ok(());
        }
        let config = self.load_config()?;
        self.run_with_config(config).await
    }

    /// Run the CLI against an already loaded configuration
    ///
    /// # Errors
    /// Returns a [`CliError`] if the command fails.
    pub async fn run_with_config(self, config: ApConfig) -> Result<(), CliError> {
        match self.command {
            Commands::Sweep {
                dry_run,
                fail_on_error,
            } => {
                let report = run_sweep(&config, dry_run || config.sweep.dry_run).await?;
                print_report(&report, self.format);
                if fail_on_error && report.has_failures() {
                    return Err(CliError::SweepFailures(report.failures().count()));
                }
            }
            Commands::Daemon { dry_run } => {
                run_daemon(&config, dry_run || config.sweep.dry_run, self.format).await;
            }
            Commands::Plan => {
                let now = Utc::now();
                let data = PlanData {
                    now,
                    schedule: planner::plan(now, &config.schedule)?,
                    description: config.sweep.description.clone(),
                    min_age_days: config.sweep.min_age_days,
                    dry_run: config.sweep.dry_run,
                };
                match self.format {
                    OutputFormat::Json => {
                        let envelope = ReportEnvelope::new(report::PLAN_SCHEMA, data);
                        println!("{}", envelope.to_json_pretty());
                    }
                    OutputFormat::Text => {
                        println!("start_date  {}", data.schedule.start_date);
                        println!("start_time  {}", data.schedule.start_time);
                        println!("interval    {}", data.schedule.interval);
                        println!("retention   {}", data.schedule.retention);
                        println!("min age     {} day(s)", data.min_age_days);
                    }
                }
            }
            Commands::Config { command } => match command {
                ConfigCommands::Show => {
                    let shown = config.redacted();
                    match self.format {
                        OutputFormat::Json => {
                            let envelope = ReportEnvelope::new(report::CONFIG_SCHEMA, shown);
                            println!("{}", envelope.to_json_pretty());
                        }
                        OutputFormat::Text => println!("{}", shown.to_toml()?),
                    }
                }
                ConfigCommands::Validate => {
                    // Loading validated the fields; also make sure the schedule renders.
                    planner::plan(Utc::now(), &config.schedule)?;
                    println!("✓ Configuration is valid");
                }
                ConfigCommands::Paths => print_paths(),
            },
        }

        Ok(())
    }
}

/// Build a sweeper backed by the `openstack` and `workloadmgr` CLIs
#[must_use]
pub fn build_sweeper(config: &ApConfig) -> Sweeper {
    let executor = Executor::new(config.command_timeout());
    let openstack = Arc::new(OpenStackCli::new(config.cloud.clone(), executor.clone()));
    let workloadmgr = Arc::new(WorkloadMgrCli::new(config.cloud.clone(), executor));
    Sweeper::new(config.clone(), openstack.clone(), openstack, workloadmgr)
}

/// Take the configured lease, if any, and run one sweep.
///
/// # Errors
/// Returns [`CliError::SweepError`] if the lease is held or the sweep aborts.
pub async fn run_sweep(config: &ApConfig, dry_run: bool) -> Result<SweepReport, CliError> {
    let _lease = match &config.sweep.lease_path {
        Some(path) => Some(
            SweepLease::acquire(
                path,
                lease::default_holder(),
                config.lease_ttl(),
                Utc::now(),
            )
            .map_err(SweepError::from)?,
        ),
        None => None,
    };

    let report = build_sweeper(config).with_dry_run(dry_run).run().await?;
    Ok(report)
}

async fn run_daemon(config: &ApConfig, dry_run: bool, format: OutputFormat) {
    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!(
        interval_secs = config.global.poll_interval_secs,
        dry_run, "Starting autoprotect daemon"
    );

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = ticker.tick() => {
                match run_sweep(config, dry_run).await {
                    Ok(report) => print_report(&report, format),
                    Err(CliError::SweepError(SweepError::Lease(e))) => {
                        warn!(error = %e, "Sweep skipped, lease held");
                    }
                    Err(e) => error!(error = %e, "Sweep aborted"),
                }
            }
        }
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

fn print_report(report: &SweepReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", report::sweep_envelope(report).to_json_pretty()),
        OutputFormat::Text => print!("{}", report::render_text(report)),
    }
}

fn print_paths() {
    let paths = ApConfig::config_paths();
    println!("Config file search paths (in order of precedence):");
    for (i, path) in paths.iter().enumerate() {
        let marker = if path.exists() { "✓" } else { " " };
        println!("  {} {}. {}", marker, i + 1, path.display());
    }
}
