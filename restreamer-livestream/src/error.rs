use std::process::ExitStatus;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("no relays configured")]
    NoRelaysConfigured,

    #[error("no sources configured")]
    NoSourcesConfigured,

    #[error("playable URL unavailable: {0}")]
    UrlUnavailable(String),

    #[error("failed to launch transcoder for destination {destination}: {source}")]
    Launch {
        destination: String,
        source: std::io::Error,
    },

    #[error("transcoder for destination {destination} exited with {status}")]
    Exited {
        destination: String,
        status: ExitStatus,
    },

    #[error("failed to wait for transcoder of destination {destination}: {source}")]
    Wait {
        destination: String,
        source: std::io::Error,
    },

    #[error("destination worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Config(#[from] restreamer_core::Error),
}

pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    /// Destination the error belongs to, if any
    #[must_use]
    pub fn destination(&self) -> Option<&str> {
        match self {
            Self::Launch { destination, .. }
            | Self::Exited { destination, .. }
            | Self::Wait { destination, .. } => Some(destination),
            _ => None,
        }
    }
}
