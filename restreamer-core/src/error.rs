use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by a [`StreamSource`](crate::source::StreamSource) or while creating one.
///
/// Creation errors (`UnsupportedPlatform`, `InvalidRoomId`) are fatal to the relay or room being built.
/// Everything else is transient: callers log it and try again on the next poll.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("invalid room ID: {0}")]
    InvalidRoomId(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("no playable stream URL available")]
    NoPlayableUrl,
}

impl SourceError {
    /// Whether this error prevents the source from ever being constructed.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::UnsupportedPlatform(_) | Self::InvalidRoomId(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors() {
        assert!(SourceError::UnsupportedPlatform("twitch".into()).is_configuration());
        assert!(SourceError::InvalidRoomId("abc".into()).is_configuration());
        assert!(!SourceError::Network("timeout".into()).is_configuration());
        assert!(!SourceError::NoPlayableUrl.is_configuration());
    }

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("relay name is empty".to_string());
        assert_eq!(err.to_string(), "Invalid input: relay name is empty");
        assert_eq!(
            SourceError::UnsupportedPlatform("unsupported".into()).to_string(),
            "unsupported platform: unsupported"
        );
    }
}
