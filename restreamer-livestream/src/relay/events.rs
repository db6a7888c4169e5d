// Relay lifecycle events, fanned out over a tokio broadcast channel

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RelayEvent {
    Started {
        relay: String,
    },
    Streaming {
        relay: String,
        url: String,
        destinations: Vec<String>,
    },
    UrlUnavailable {
        relay: String,
        error: String,
    },
    /// Every destination exited cleanly
    CycleCompleted {
        relay: String,
    },
    CycleFailed {
        relay: String,
        error: String,
        restart_count: u64,
    },
    Stopped {
        relay: String,
    },
}

impl RelayEvent {
    #[must_use]
    pub fn relay(&self) -> &str {
        match self {
            Self::Started { relay }
            | Self::Streaming { relay, .. }
            | Self::UrlUnavailable { relay, .. }
            | Self::CycleCompleted { relay }
            | Self::CycleFailed { relay, .. }
            | Self::Stopped { relay } => relay,
        }
    }
}
