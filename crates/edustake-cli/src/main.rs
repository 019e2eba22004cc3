//! EduStake CLI
//!
//! Command-line interface for running and exercising the staking service.

use clap::{Parser, Subcommand, ValueEnum};
use edustake_core::prelude::{AccountId, ManualClock, SystemClock, ONE_TOKEN, SECONDS_PER_DAY};
use edustake_economics::multiplier::Achievement;
use edustake_service::config::LoggingConfig;
use edustake_service::{ServiceConfig, StakingRuntime};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "edustake")]
#[command(version = "0.1.0")]
#[command(about = "EduStake - neuron staking with educational reward multipliers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the service with its reward sweep until interrupted
    Run {
        /// Configuration file path
        #[arg(short, long, default_value = "edustake.toml")]
        config: PathBuf,
    },

    /// Simulate one neuron's life on a manual clock and print the result
    Simulate {
        /// Stake in whole tokens
        #[arg(long, default_value = "1000")]
        stake: u64,

        /// Initial dissolve delay in days
        #[arg(long, default_value = "180")]
        delay_days: u64,

        /// Days to let the neuron mature
        #[arg(long, default_value = "365")]
        days: u64,

        /// Completed courses
        #[arg(long = "course", value_enum)]
        courses: Vec<Course>,

        /// Dissolve and disburse after maturing
        #[arg(long)]
        disburse: bool,
    },

    /// Print the default configuration
    Config,

    /// Validate a configuration file
    Check {
        /// Configuration file path
        config: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Course {
    BlockchainBasics,
    DefiExplorer,
    SmartContractDeveloper,
    LearningPathMaster,
}

impl From<Course> for Achievement {
    fn from(course: Course) -> Self {
        match course {
            Course::BlockchainBasics => Achievement::BlockchainBasics,
            Course::DefiExplorer => Achievement::DefiExplorer,
            Course::SmartContractDeveloper => Achievement::SmartContractDeveloper,
            Course::LearningPathMaster => Achievement::LearningPathMaster,
        }
    }
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn load_config(path: &Path) -> anyhow::Result<ServiceConfig> {
    if path.exists() {
        Ok(ServiceConfig::load(path)?)
    } else {
        Ok(ServiceConfig::default())
    }
}

#[derive(Serialize)]
struct SimulationReport {
    courses: Vec<String>,
    multiplier: String,
    neuron: edustake_service::NeuronView,
    summary: edustake_service::OwnerSummary,
    disbursed: Option<u64>,
}

async fn simulate(
    stake: u64,
    delay_days: u64,
    days: u64,
    courses: Vec<Course>,
    disburse: bool,
) -> anyhow::Result<SimulationReport> {
    let clock = Arc::new(ManualClock::new(0));
    let mut config = ServiceConfig::default();
    config.sweep.enabled = false;
    let runtime = StakingRuntime::new(config, clock.clone())?;
    let service = runtime.service();

    let owner = AccountId::from_principal("simulated-learner");
    let amount = stake
        .checked_mul(ONE_TOKEN)
        .ok_or_else(|| anyhow::anyhow!("stake of {} tokens is too large", stake))?;
    runtime.custody().deposit(owner, amount);

    let mut names = Vec::new();
    for course in courses {
        let achievement = Achievement::from(course);
        names.push(achievement.name().to_string());
        runtime.multipliers().record_completion(owner, achievement);
    }
    let multiplier = runtime.multipliers().multiplier_of(&owner);

    let id = service
        .create_neuron(owner, amount, delay_days.saturating_mul(SECONDS_PER_DAY))
        .await?;
    clock.advance(days.saturating_mul(SECONDS_PER_DAY));
    service.refresh_rewards(&id, &owner).await?;
    let neuron = service.get_neuron(&id).await?;

    let disbursed = if disburse {
        service.start_dissolving(&id, &owner).await?;
        clock.advance(neuron.dissolve_delay_seconds);
        Some(service.disburse(&id, &owner).await?)
    } else {
        None
    };
    let summary = service.owner_summary(&owner).await?;

    Ok(SimulationReport {
        courses: names,
        multiplier: multiplier.to_string(),
        neuron,
        summary,
        disbursed,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let service_config = load_config(&config)?;
            init_logging(&service_config.logging, cli.verbose);

            tracing::info!("EduStake v{}", env!("CARGO_PKG_VERSION"));
            if config.exists() {
                tracing::info!("Config: {:?}", config);
            } else {
                tracing::info!("Config {:?} not found, using defaults", config);
            }

            let runtime = StakingRuntime::new(service_config, Arc::new(SystemClock::new()))?;
            runtime.run().await?;

            if let Some(metrics) = runtime.metrics() {
                tracing::debug!("Final metrics:\n{}", metrics.render()?);
            }
        }

        Commands::Simulate {
            stake,
            delay_days,
            days,
            courses,
            disburse,
        } => {
            init_logging(&LoggingConfig::default(), cli.verbose);
            let report = simulate(stake, delay_days, days, courses, disburse).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Config => {
            print!("{}", ServiceConfig::default().to_toml_string()?);
        }

        Commands::Check { config } => {
            let service_config = ServiceConfig::load(&config)?;
            println!("{:?}: OK", config);
            println!(
                "  base rate: {} bps, delay: {}..{} days, multiplier cap: {} bps",
                service_config.policy.base_annual_rate_bps,
                service_config.policy.min_dissolve_delay_seconds / SECONDS_PER_DAY,
                service_config.policy.max_dissolve_delay_seconds / SECONDS_PER_DAY,
                service_config.policy.max_multiplier_bps,
            );
        }
    }

    Ok(())
}
