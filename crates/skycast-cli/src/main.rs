//! Skycast CLI - weather forecasts for a street address.
//!
//! Usage:
//!   skycast forecast "1600 Pennsylvania Ave, Washington DC" --ip 73.12.44.1
//!   skycast forecast "New York, NY" --json
//!   skycast timezone 8.8.8.8
//!   skycast config

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use skycast_core::TimezoneResult;
use skycast_runtime::{ForecastOrchestrator, SkycastConfig};

mod output;

use output::{render_forecast, render_timezone, ForecastReport};

#[derive(Parser)]
#[command(name = "skycast")]
#[command(about = "Weather forecasts for any address", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (YAML); environment overrides still apply
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Retrieve the forecast for an address
    Forecast {
        /// Street address, city or postal code
        address: String,

        /// Requester IP, used to render times in its timezone
        #[arg(long)]
        ip: Option<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Resolve the timezone for an IP address
    Timezone {
        /// IPv4 or IPv6 address
        ip: String,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let validate = !matches!(cli.command, Commands::Config);
    let config = load_config(cli.config.as_deref(), validate)?;
    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Forecast { address, ip, json } => forecast(&config, &address, ip.as_deref(), json).await,
        Commands::Timezone { ip } => {
            let orchestrator = build_orchestrator(&config)?;
            let timezone = orchestrator.resolve_timezone(&ip).await;
            print!("{}", render_timezone(&timezone));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config => {
            let yaml = config.to_yaml().context("Failed to serialize configuration")?;
            print!("{yaml}");
            if let Err(e) = config.validate() {
                eprintln!("Warning: {e}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn forecast(config: &SkycastConfig, address: &str, ip: Option<&str>, json: bool) -> Result<ExitCode> {
    let orchestrator = build_orchestrator(config)?;

    let (result, timezone) = match ip {
        Some(ip) => orchestrator.retrieve_with_timezone(address, ip).await,
        None => (orchestrator.retrieve(address).await, TimezoneResult::utc()),
    };

    let forecast = match result {
        Ok(forecast) => forecast,
        Err(e) => {
            tracing::debug!(error = %e, kind = %e.kind(), "Forecast failed");
            eprintln!("{}", e.user_message());
            return Ok(ExitCode::FAILURE);
        }
    };

    if json {
        let report = ForecastReport::new(&forecast, &timezone);
        let rendered = serde_json::to_string_pretty(&report).context("Failed to serialize forecast")?;
        println!("{rendered}");
    } else {
        print!("{}", render_forecast(&forecast, &timezone));
    }
    Ok(ExitCode::SUCCESS)
}

fn load_config(path: Option<&Path>, validate: bool) -> Result<SkycastConfig> {
    if validate {
        return SkycastConfig::load(path).context("Failed to load configuration");
    }

    let mut config = match path {
        Some(path) => SkycastConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => SkycastConfig::default(),
    };
    config
        .apply_overrides(|name| std::env::var(name).ok())
        .context("Failed to apply environment overrides")?;
    Ok(config)
}

fn build_orchestrator(config: &SkycastConfig) -> Result<ForecastOrchestrator> {
    ForecastOrchestrator::from_config(config).context("Failed to set up upstream clients")
}

/// `RUST_LOG` wins; otherwise `--verbose`, then the configured level.
fn init_logging(config: &SkycastConfig, verbose: bool) {
    let fallback = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
