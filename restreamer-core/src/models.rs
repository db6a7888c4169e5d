// Relay and room definitions
//
// Everything here is read from configuration once and never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Output quality preset for a relay.
///
/// `Best` keeps the source quality untouched; the other presets cap the video bitrate and, for the
/// resolution presets, scale the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "best")]
    Best,
    #[serde(rename = "worst")]
    Worst,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
}

impl Quality {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Best => "best",
            Self::Worst => "worst",
            Self::P720 => "720p",
            Self::P480 => "480p",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "best" => Ok(Self::Best),
            "worst" => Ok(Self::Worst),
            "720p" => Ok(Self::P720),
            "480p" => Ok(Self::P480),
            other => Err(format!("unknown quality '{other}', expected one of: best, worst, 720p, 480p")),
        }
    }
}

/// Where a relay pulls its stream from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDefinition {
    pub platform: String,
    pub room_id: String,
}

impl SourceDefinition {
    /// Key used to identify the source in logs and maps (`platform:room_id`)
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.platform, self.room_id)
    }
}

/// One sink endpoint of a relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationDefinition {
    pub name: String,
    /// Opaque sink address handed to the transcoder as its output
    pub url: String,
    /// Transport hint (rtmp, rtmps, srt, ...)
    #[serde(default)]
    pub protocol: String,
    /// Extra encoder/sink flags, one `-key value` pair per entry
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// A configured pipeline from one source to one or more destinations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayDefinition {
    pub name: String,
    pub source: SourceDefinition,
    #[serde(default)]
    pub destinations: Vec<DestinationDefinition>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
}

/// A room watched by the monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDefinition {
    pub platform: String,
    pub room_id: String,
    #[serde(default)]
    pub enabled: bool,
}

impl RoomDefinition {
    #[must_use]
    pub fn source(&self) -> SourceDefinition {
        SourceDefinition {
            platform: self.platform.clone(),
            room_id: self.room_id.clone(),
        }
    }
}

/// Live room information as reported by a platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub platform: String,
    pub room_id: String,
    pub uid: String,
    pub uname: String,
    pub real_room_id: String,
    pub is_live: bool,
    pub user_cover: String,
    pub keyframe: String,
    pub title: String,
    pub start_time: Option<DateTime<Utc>>,
}
