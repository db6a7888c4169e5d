// Stream source capability
//
// The relay engine and the monitor only ever see `dyn StreamSource`; platform
// clients live in restreamer-providers.

use crate::error::SourceError;
use crate::models::{RoomInfo, SourceDefinition};
use async_trait::async_trait;
use std::sync::Arc;

/// A live room on some streaming platform.
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Platform identifier (e.g. "bilibili")
    fn platform(&self) -> &str;

    /// Room identifier as configured
    fn room_id(&self) -> &str;

    /// Check whether the room is currently live.
    ///
    /// Callers treat an error as "not live" and log it; it is never fatal.
    async fn is_live(&self) -> Result<bool, SourceError>;

    /// Resolve a URL the transcoder can read the live stream from.
    async fn playable_url(&self) -> Result<String, SourceError>;

    /// Best-effort room details for notifications.
    async fn room_info(&self) -> RoomInfo;

    /// Start the out-of-band message listener. Fire and forget.
    fn start_listener(&self);

    /// Stop the out-of-band message listener. Fire and forget.
    fn stop_listener(&self);
}

/// Builds a [`StreamSource`] for a `{platform, room_id}` pair.
pub trait SourceFactory: Send + Sync {
    fn create(&self, definition: &SourceDefinition) -> Result<Arc<dyn StreamSource>, SourceError>;
}

impl<F> SourceFactory for F
where
    F: Fn(&SourceDefinition) -> Result<Arc<dyn StreamSource>, SourceError> + Send + Sync,
{
    fn create(&self, definition: &SourceDefinition) -> Result<Arc<dyn StreamSource>, SourceError> {
        self(definition)
    }
}
