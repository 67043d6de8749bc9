//! Probe harness for the FitKit service worker.
//!
//! Provides commands for:
//! - Installing a worker against a live origin and fetching paths through it
//! - Printing the default worker configuration
//!
//! ## Usage
//!
//! ```bash
//! # Install against a dev server, go offline, see what still works
//! sw-probe probe --origin http://localhost:3000/ --offline / /api/drills /static/js/bundle.js
//!
//! # Start a config file from the defaults
//! sw-probe config > sw.json
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use fitkit_common::{init_logging, FitKitError, LogConfig, LogFormat, ResultExt};
use fitkit_sw::WorkerConfig;
use tracing::error;
use url::Url;

mod probe;

#[derive(Parser)]
#[command(name = "sw-probe")]
#[command(about = "Drive the FitKit service worker against a live origin")]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install and activate a worker, then fetch paths through it
    Probe {
        /// Origin the worker controls (overrides the config file)
        #[arg(long)]
        origin: Option<Url>,
        /// Worker configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Drop connectivity after activation
        #[arg(long)]
        offline: bool,
        /// Per-request HTTP timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Paths to fetch, relative to the origin
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Print the default worker configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> Result<(), FitKitError> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_verbosity(cli.verbose);
    if cli.json_logs {
        log_config = log_config.with_format(LogFormat::Json);
    }
    init_logging(&log_config)?;

    match cli.command {
        Commands::Probe {
            origin,
            config,
            offline,
            timeout_ms,
            paths,
        } => {
            let config = probe::load_config(config.as_deref(), origin)?;
            let options = probe::ProbeOptions {
                offline,
                timeout: timeout_ms.map(Duration::from_millis),
            };

            let reports = probe::run(config, options, &paths).await?;
            for report in &reports {
                println!("{}", serde_json::to_string(report).context("encoding probe report")?);
            }

            let failed = reports.iter().filter(|r| r.is_error()).count();
            if failed > 0 {
                error!(failed, total = reports.len(), "Some paths could not be served");
                return Err(FitKitError::worker(format!(
                    "{} of {} paths failed",
                    failed,
                    reports.len()
                )));
            }
        }

        Commands::Config => {
            let json = serde_json::to_string_pretty(&WorkerConfig::default())
                .map_err(|e| FitKitError::Json(e.to_string()))?;
            println!("{}", json);
        }
    }

    Ok(())
}
