//! Bilibili Client Error Types

use restreamer_core::SourceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BilibiliError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (code {code}): {message}")]
    Api { code: i64, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid room ID: {0}")]
    InvalidRoomId(String),

    #[error("Room {0} does not exist")]
    RoomNotFound(String),

    #[error("No live stream URLs found for room {0}")]
    NoStreamUrls(String),
}

impl BilibiliError {
    /// Failures worth retrying: the request never produced an API answer.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<reqwest::Error> for BilibiliError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BilibiliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<BilibiliError> for SourceError {
    fn from(err: BilibiliError) -> Self {
        match err {
            BilibiliError::Network(msg) => Self::Network(msg),
            BilibiliError::Api { .. } | BilibiliError::RoomNotFound(_) => Self::Api(err.to_string()),
            BilibiliError::Parse(msg) => Self::Parse(msg),
            BilibiliError::InvalidRoomId(msg) => Self::InvalidRoomId(msg),
            BilibiliError::NoStreamUrls(_) => Self::NoPlayableUrl,
        }
    }
}
