// Maps a configured {platform, room_id} pair to a concrete stream source

use std::sync::Arc;

use restreamer_core::config::BilibiliConfig;
use restreamer_core::{SourceDefinition, SourceError, SourceFactory, StreamSource};

use crate::bilibili::{BilibiliClient, BilibiliError, BilibiliStreamSource};

/// Source factory for every platform this crate supports.
///
/// Platform names are matched case-insensitively.
pub struct PlatformSourceFactory {
    bilibili: Arc<BilibiliClient>,
}

impl PlatformSourceFactory {
    pub fn new(bilibili: &BilibiliConfig) -> Result<Self, BilibiliError> {
        Ok(Self {
            bilibili: Arc::new(BilibiliClient::with_config(bilibili)?),
        })
    }

    #[must_use]
    pub fn supported_platforms() -> &'static [&'static str] {
        &["bilibili"]
    }
}

impl SourceFactory for PlatformSourceFactory {
    fn create(&self, definition: &SourceDefinition) -> Result<Arc<dyn StreamSource>, SourceError> {
        match definition.platform.to_lowercase().as_str() {
            "bilibili" => {
                let source = BilibiliStreamSource::new(&definition.room_id, self.bilibili.clone())?;
                Ok(Arc::new(source))
            }
            other => Err(SourceError::UnsupportedPlatform(other.to_string())),
        }
    }
}
