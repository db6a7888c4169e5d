//! Bilibili live API response shapes

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

/// Common envelope of every live API response.
///
/// Some endpoints report their message as `msg`, others as `message`.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn message(&self) -> &str {
        if self.msg.is_empty() {
            &self.message
        } else {
            &self.msg
        }
    }
}

/// `room/v1/Room/room_init`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoomInit {
    #[serde(default)]
    pub room_id: u64,
    #[serde(default)]
    pub short_id: u64,
    #[serde(default)]
    pub uid: u64,
    #[serde(default)]
    pub live_status: i64,
}

impl RoomInit {
    pub fn is_live(&self) -> bool {
        self.live_status == 1
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DurlItem {
    pub url: String,
}

/// `room/v1/Room/playUrl`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayUrlData {
    #[serde(default)]
    pub durl: Vec<DurlItem>,
}

/// `xlive/web-room/v2/index/getRoomPlayInfo`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoomPlayInfoData {
    #[serde(default)]
    pub playurl_info: Option<PlayUrlInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayUrlInfo {
    #[serde(default)]
    pub playurl: Option<PlayUrlData>,
}

/// `room/v1/Room/get_info`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoomDetails {
    #[serde(default)]
    pub uid: u64,
    #[serde(default)]
    pub room_id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub user_cover: String,
    #[serde(default)]
    pub keyframe: String,
    #[serde(default)]
    pub live_status: i64,
    /// "YYYY-MM-DD hh:mm:ss" in China Standard Time, all zeros when offline
    #[serde(default)]
    pub live_time: String,
}

impl RoomDetails {
    pub fn live_start(&self) -> Option<DateTime<Utc>> {
        parse_live_time(&self.live_time)
    }
}

/// `live_user/v1/Master/info`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MasterInfo {
    #[serde(default)]
    pub info: MasterUser,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MasterUser {
    #[serde(default)]
    pub uid: u64,
    #[serde(default)]
    pub uname: String,
}

fn parse_live_time(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").ok()?;
    let cst = FixedOffset::east_opt(8 * 3600)?;
    cst.from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}
