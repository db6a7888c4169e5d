//! Bilibili Live HTTP Client

use std::time::Duration;

use backon::{BackoffBuilder, ConstantBuilder};
use regex::Regex;
use reqwest::Client;
use restreamer_core::config::BilibiliConfig;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use super::error::BilibiliError;
use super::types::{ApiResponse, MasterInfo, PlayUrlData, RoomDetails, RoomInit, RoomPlayInfoData};

const USER_AGENT: &str = "Mozilla/5.0 (iPod; CPU iPhone OS 14_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/87.0.4280.163 Mobile/15E148 Safari/604.1";

const ROOM_INIT_PATH: &str = "room/v1/Room/room_init";
const PLAY_URL_PATH: &str = "room/v1/Room/playUrl";
const ROOM_PLAY_INFO_PATH: &str = "xlive/web-room/v2/index/getRoomPlayInfo";
const ROOM_DETAILS_PATH: &str = "room/v1/Room/get_info";
const MASTER_INFO_PATH: &str = "live_user/v1/Master/info";

/// Live API answer for a room that does not exist
const ROOM_NOT_FOUND_CODE: i64 = 60004;
const ROOM_NOT_FOUND_MSG: &str = "直播间不存在";

const MAX_ROOM_ID_LEN: usize = 20;

/// Bilibili Live HTTP Client
///
/// One client is shared by every Bilibili source; it holds the connection
/// pool and the retry policy.
#[derive(Debug, Clone)]
pub struct BilibiliClient {
    client: Client,
    base_url: Url,
    retry_count: usize,
    retry_wait: Duration,
}

impl BilibiliClient {
    /// Create a client against the public live API with default settings
    pub fn new() -> Result<Self, BilibiliError> {
        Self::with_config(&BilibiliConfig::default())
    }

    pub fn with_config(config: &BilibiliConfig) -> Result<Self, BilibiliError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| BilibiliError::Network(e.to_string()))?;

        // Url::join drops the last segment of a base without a trailing slash
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| BilibiliError::Parse(format!("invalid base URL '{}': {e}", config.base_url)))?;

        Ok(Self {
            client,
            base_url,
            retry_count: config.retry_count,
            retry_wait: Duration::from_secs(config.retry_wait_seconds),
        })
    }

    /// GET an endpoint and decode the live API envelope.
    ///
    /// Network failures are retried with a constant delay; API-level
    /// failures come back as a decoded envelope with a non-zero code.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<ApiResponse<T>, BilibiliError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| BilibiliError::Parse(e.to_string()))?;

        let backoff = ConstantBuilder::default()
            .with_delay(self.retry_wait)
            .with_max_times(self.retry_count)
            .build();

        let mut last_err = None;
        for delay in std::iter::once(Duration::ZERO).chain(backoff) {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.send(url.clone(), query).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_transient() => {
                    warn!(path, error = %e, "Bilibili request failed, retrying");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| BilibiliError::Network("retry exhausted".to_string())))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<ApiResponse<T>, BilibiliError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await?
            .error_for_status()?;

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetch `room_init` for a (possibly short) room id
    pub async fn room_init(&self, room_id: &str) -> Result<RoomInit, BilibiliError> {
        validate_room_id(room_id)?;

        let resp: ApiResponse<RoomInit> = self.get(ROOM_INIT_PATH, &[("id", room_id)]).await?;
        if resp.code == ROOM_NOT_FOUND_CODE || resp.message() == ROOM_NOT_FOUND_MSG {
            return Err(BilibiliError::RoomNotFound(room_id.to_string()));
        }
        if resp.code != 0 {
            return Err(BilibiliError::Api {
                code: resp.code,
                message: resp.message().to_string(),
            });
        }

        resp.data
            .ok_or_else(|| BilibiliError::Parse("Missing room_init data".to_string()))
    }

    /// Whether the room is broadcasting right now
    pub async fn live_status(&self, room_id: &str) -> Result<bool, BilibiliError> {
        let init = self.room_init(room_id).await?;
        let is_live = init.is_live();
        debug!(room_id, is_live, "Bilibili room status");
        Ok(is_live)
    }

    /// Resolve a short room id to the real one
    pub async fn real_room_id(&self, room_id: &str) -> Result<String, BilibiliError> {
        Ok(self.room_init(room_id).await?.room_id.to_string())
    }

    /// Candidate stream URLs for a real room id, best candidate first
    pub async fn live_urls(&self, real_room_id: &str) -> Result<Vec<String>, BilibiliError> {
        validate_room_id(real_room_id)?;

        let resp: ApiResponse<PlayUrlData> = self
            .get(
                PLAY_URL_PATH,
                &[("cid", real_room_id), ("qn", "10000"), ("platform", "web")],
            )
            .await?;

        if resp.code != 0 {
            debug!(
                room_id = real_room_id,
                code = resp.code,
                message = resp.message(),
                "playUrl API failed, falling back to room play info"
            );
        } else if let Some(first) = resp.data.and_then(|data| data.durl.into_iter().next()) {
            return Ok(vec![flv_to_m3u8(&first.url), first.url]);
        }

        self.room_play_info_urls(real_room_id).await
    }

    async fn room_play_info_urls(&self, real_room_id: &str) -> Result<Vec<String>, BilibiliError> {
        let resp: ApiResponse<RoomPlayInfoData> = self
            .get(
                ROOM_PLAY_INFO_PATH,
                &[
                    ("room_id", real_room_id),
                    ("no_playurl", "0"),
                    ("mask", "0"),
                    ("qn", "10000"),
                    ("platform", "web"),
                    ("protocol", "0,1"),
                    ("format", "0,1,2"),
                    ("codec", "0,1"),
                ],
            )
            .await?;

        if resp.code != 0 {
            return Err(BilibiliError::Api {
                code: resp.code,
                message: resp.message().to_string(),
            });
        }

        let urls: Vec<String> = resp
            .data
            .and_then(|data| data.playurl_info)
            .and_then(|info| info.playurl)
            .map(|playurl| playurl.durl.iter().map(|d| flv_to_m3u8(&d.url)).collect())
            .unwrap_or_default();

        if urls.is_empty() {
            return Err(BilibiliError::NoStreamUrls(real_room_id.to_string()));
        }
        Ok(urls)
    }

    /// Title, cover, keyframe and live start time of a room
    pub async fn room_details(&self, room_id: &str) -> Result<RoomDetails, BilibiliError> {
        validate_room_id(room_id)?;

        let resp: ApiResponse<RoomDetails> =
            self.get(ROOM_DETAILS_PATH, &[("room_id", room_id)]).await?;
        if resp.code != 0 {
            return Err(BilibiliError::Api {
                code: resp.code,
                message: resp.message().to_string(),
            });
        }

        resp.data
            .ok_or_else(|| BilibiliError::Parse("Missing room details".to_string()))
    }

    /// Display name of the streamer behind `uid`
    pub async fn anchor_name(&self, uid: u64) -> Result<String, BilibiliError> {
        let uid = uid.to_string();
        let resp: ApiResponse<MasterInfo> = self.get(MASTER_INFO_PATH, &[("uid", &uid)]).await?;
        if resp.code != 0 {
            return Err(BilibiliError::Api {
                code: resp.code,
                message: resp.message().to_string(),
            });
        }

        resp.data
            .map(|data| data.info.uname)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| BilibiliError::Parse("Missing anchor name".to_string()))
    }
}

/// Check that a room id is a plausible numeric Bilibili id
pub fn validate_room_id(room_id: &str) -> Result<(), BilibiliError> {
    if room_id.is_empty() {
        return Err(BilibiliError::InvalidRoomId("room ID cannot be empty".to_string()));
    }

    let re = Regex::new(r"^[0-9]+$").map_err(|e| BilibiliError::Parse(e.to_string()))?;
    if !re.is_match(room_id) {
        return Err(BilibiliError::InvalidRoomId(format!(
            "room ID must contain only digits: {room_id}"
        )));
    }

    if room_id.len() > MAX_ROOM_ID_LEN {
        return Err(BilibiliError::InvalidRoomId(format!("room ID is too long: {room_id}")));
    }

    Ok(())
}

/// Extract a room id from a live room link, or accept a bare id
pub fn extract_room_id(input: &str) -> Option<String> {
    let input = input.trim();
    if validate_room_id(input).is_ok() {
        return Some(input.to_string());
    }

    let re = Regex::new(r"live\.bilibili\.com/(?:h5/)?(\d+)").ok()?;
    re.captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Rewrite an FLV stream URL to its HLS playlist.
///
/// `.../name.flv?query` becomes `.../name/index.m3u8` with the query dropped;
/// any other URL is returned untouched.
pub fn flv_to_m3u8(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        warn!(url = raw, "Failed to parse stream URL");
        return raw.to_string();
    };

    let path = url.path().to_string();
    let Some(stem) = path.strip_suffix(".flv") else {
        return raw.to_string();
    };

    url.set_path(&format!("{stem}/index.m3u8"));
    url.set_query(None);
    url.to_string()
}
