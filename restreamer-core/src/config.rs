use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::{RelayDefinition, RoomDefinition};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rooms: Vec<RoomDefinition>,
    pub relays: Vec<RelayDefinition>,
    /// Monitor polling cadence, humantime format ("30s", "1m")
    pub interval: String,
    pub verbose: bool,
    pub logging: LoggingConfig,
    pub relay: RelaySettingsConfig,
    pub bilibili: BilibiliConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rooms: Vec::new(),
            relays: Vec::new(),
            interval: "30s".to_string(),
            verbose: false,
            logging: LoggingConfig::default(),
            relay: RelaySettingsConfig::default(),
            bilibili: BilibiliConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Relay supervision settings shared by every relay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettingsConfig {
    /// How often an offline source is re-checked
    pub poll_interval: String,
    /// Pause after a failed streaming cycle
    pub restart_delay: String,
    /// Transcoder executable
    pub transcoder_path: String,
    /// Forward transcoder stdout/stderr to our own
    pub transcoder_output: bool,
}

impl Default for RelaySettingsConfig {
    fn default() -> Self {
        Self {
            poll_interval: "10s".to_string(),
            restart_delay: "5s".to_string(),
            transcoder_path: "ffmpeg".to_string(),
            transcoder_output: false,
        }
    }
}

impl RelaySettingsConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        parse_duration_or("relay.poll_interval", &self.poll_interval, DEFAULT_POLL_INTERVAL)
    }

    #[must_use]
    pub fn restart_delay(&self) -> Duration {
        parse_duration_or("relay.restart_delay", &self.restart_delay, DEFAULT_RESTART_DELAY)
    }
}

/// Bilibili API client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BilibiliConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub retry_count: usize,
    pub retry_wait_seconds: u64,
}

impl Default for BilibiliConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.live.bilibili.com".to_string(),
            timeout_seconds: 30,
            retry_count: 3,
            retry_wait_seconds: 5,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided and present)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        match config_file {
            Some(path) if Path::new(path).exists() => {
                builder = builder.add_source(File::with_name(path));
            }
            Some(path) => {
                info!("Config file {} not found, using default configuration", path);
            }
            None => {
                info!("No config file specified, using default configuration");
            }
        }

        // RESTREAMER_VERBOSE, RESTREAMER_LOGGING__LEVEL, ...
        builder = builder.add_source(
            Environment::with_prefix("RESTREAMER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Monitor polling interval, falling back to 30s on an unparsable value
    #[must_use]
    pub fn monitor_interval(&self) -> Duration {
        parse_duration_or("interval", &self.interval, DEFAULT_INTERVAL)
    }

    /// Report configuration problems.
    ///
    /// None of these abort startup: offending relays are skipped when the relay manager is built.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let mut names = HashSet::new();

        for relay in &self.relays {
            if relay.name.trim().is_empty() {
                errors.push("relay with empty name".to_string());
            } else if !names.insert(relay.name.as_str()) {
                errors.push(format!("duplicate relay name '{}'", relay.name));
            }
            if relay.destinations.is_empty() {
                errors.push(format!("relay '{}' has no destinations", relay.name));
            }
            for dest in &relay.destinations {
                if dest.url.trim().is_empty() {
                    errors.push(format!(
                        "relay '{}' destination '{}' has an empty URL",
                        relay.name, dest.name
                    ));
                }
            }
        }

        for room in &self.rooms {
            if room.room_id.trim().is_empty() {
                errors.push(format!("room on platform '{}' has an empty room_id", room.platform));
            }
        }

        if humantime::parse_duration(&self.interval).is_err() {
            errors.push(format!("invalid interval '{}'", self.interval));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn parse_duration_or(field: &str, value: &str, default: Duration) -> Duration {
    match humantime::parse_duration(value) {
        Ok(duration) if !duration.is_zero() => duration,
        _ => {
            warn!("Invalid {} '{}', using default {:?}", field, value, default);
            default
        }
    }
}
