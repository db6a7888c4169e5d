mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use restreamer_core::{logging, Config};

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let mut config = Config::load(Some(&args.config))?;
    if args.command.verbose() || config.verbose {
        config.logging.level = "debug".to_string();
    }

    // 2. Initialize logging; the guard flushes the log file on exit
    let _log_guard = logging::init_logging(&config.logging)?;
    info!(config = %args.config, "Restreamer starting");

    // 3. Report configuration problems; offending relays are skipped later
    if let Err(problems) = config.validate() {
        for problem in &problems {
            warn!("Configuration problem: {}", problem);
        }
    }

    match args.command {
        Command::Monitor { interval, verbose } => commands::run_monitor(config, interval, verbose).await,
        Command::Relay { quality, .. } => commands::run_relay(config, quality).await,
    }
}
