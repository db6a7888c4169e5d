// Command-line interface

use clap::{Parser, Subcommand};
use restreamer_core::Quality;

#[derive(Parser, Debug)]
#[command(name = "restreamer")]
#[command(about = "Live stream monitor and multi-destination relay", long_about = None)]
pub struct Args {
    /// Configuration file
    #[arg(short, long, env = "RESTREAMER_CONFIG", default_value = "config.json")]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Watch rooms and report when they go live or offline
    Monitor {
        /// Polling interval, overrides the configured one (e.g. "30s", "1m")
        #[arg(short, long)]
        interval: Option<String>,

        /// Log every status check
        #[arg(short, long)]
        verbose: bool,
    },

    /// Relay live rooms to their configured destinations
    Relay {
        /// Debug logging
        #[arg(short, long)]
        verbose: bool,

        /// Quality for relays that do not set one (best, worst, 720p, 480p)
        #[arg(short, long)]
        quality: Option<Quality>,
    },
}

impl Command {
    #[must_use]
    pub fn verbose(&self) -> bool {
        match self {
            Self::Monitor { verbose, .. } | Self::Relay { verbose, .. } => *verbose,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_monitor_flags() {
        let args = Args::try_parse_from(["restreamer", "-c", "rooms.json", "monitor", "-i", "45s", "-v"]).unwrap();
        assert_eq!(args.config, "rooms.json");
        match args.command {
            Command::Monitor { interval, verbose } => {
                assert_eq!(interval.as_deref(), Some("45s"));
                assert!(verbose);
            }
            Command::Relay { .. } => panic!("expected monitor"),
        }
    }

    #[test]
    fn test_relay_flags() {
        let args = Args::try_parse_from(["restreamer", "relay", "--quality", "720p"]).unwrap();
        assert_eq!(args.config, "config.json");
        assert!(!args.command.verbose());
        match args.command {
            Command::Relay { quality, .. } => assert_eq!(quality, Some(Quality::P720)),
            Command::Monitor { .. } => panic!("expected relay"),
        }
    }

    #[test]
    fn test_rejects_unknown_quality() {
        assert!(Args::try_parse_from(["restreamer", "relay", "-q", "1080p"]).is_err());
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Args::try_parse_from(["restreamer"]).is_err());
    }
}
