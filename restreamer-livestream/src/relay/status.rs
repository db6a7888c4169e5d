// Relay status snapshots

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where a relay's supervision loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayPhase {
    /// Constructed, never started
    Idle,
    WaitingForLiveSource,
    Streaming,
    /// Pausing after a failed cycle
    BackoffWait,
    /// Terminal
    Stopped,
}

impl RelayPhase {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::WaitingForLiveSource => "waiting_for_live_source",
            Self::Streaming => "streaming",
            Self::BackoffWait => "backoff_wait",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for RelayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a relay, computed on demand
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayStatus {
    pub name: String,
    pub is_running: bool,
    pub phase: RelayPhase,
    pub start_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub restart_count: u64,
    pub process_count: usize,
}

impl fmt::Display for RelayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] running={} processes={} restarts={}",
            self.name, self.phase, self.is_running, self.process_count, self.restart_count
        )?;
        if let Some(error) = &self.last_error {
            write!(f, " last_error=\"{error}\"")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_and_json() {
        let status = RelayStatus {
            name: "demo".to_string(),
            is_running: true,
            phase: RelayPhase::BackoffWait,
            start_time: None,
            last_error: Some("boom".to_string()),
            restart_count: 2,
            process_count: 0,
        };
        assert_eq!(
            status.to_string(),
            "demo [backoff_wait] running=true processes=0 restarts=2 last_error=\"boom\""
        );

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["phase"], "backoff_wait");
        assert_eq!(json["restart_count"], 2);
    }
}
