//! Bilibili implementation of the `StreamSource` capability

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use restreamer_core::{RoomInfo, SourceError, StreamSource};
use tracing::{debug, info, warn};

use super::client::{validate_room_id, BilibiliClient};
use super::error::BilibiliError;

pub const PLATFORM: &str = "bilibili";

/// A single Bilibili live room
pub struct BilibiliStreamSource {
    client: Arc<BilibiliClient>,
    room_id: String,
    state: Mutex<SourceState>,
    listening: AtomicBool,
}

struct SourceState {
    room_info: RoomInfo,
    last_status: bool,
}

impl BilibiliStreamSource {
    pub fn new(room_id: &str, client: Arc<BilibiliClient>) -> Result<Self, BilibiliError> {
        validate_room_id(room_id)?;

        Ok(Self {
            client,
            room_id: room_id.to_string(),
            state: Mutex::new(SourceState {
                room_info: RoomInfo {
                    platform: PLATFORM.to_string(),
                    room_id: room_id.to_string(),
                    ..Default::default()
                },
                last_status: false,
            }),
            listening: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    async fn real_room_id(&self) -> Result<String, BilibiliError> {
        let cached = self.state.lock().room_info.real_room_id.clone();
        if !cached.is_empty() {
            return Ok(cached);
        }

        let real = self.client.real_room_id(&self.room_id).await?;
        self.state.lock().room_info.real_room_id = real.clone();
        Ok(real)
    }
}

#[async_trait]
impl StreamSource for BilibiliStreamSource {
    fn platform(&self) -> &str {
        PLATFORM
    }

    fn room_id(&self) -> &str {
        &self.room_id
    }

    async fn is_live(&self) -> Result<bool, SourceError> {
        let status = self.client.live_status(&self.room_id).await?;

        let mut state = self.state.lock();
        if status != state.last_status {
            state.room_info.is_live = status;
            if status {
                state.room_info.start_time = Some(Utc::now());
            }
            state.last_status = status;
        }

        Ok(status)
    }

    async fn playable_url(&self) -> Result<String, SourceError> {
        let real_room_id = self.real_room_id().await?;
        let urls = self.client.live_urls(&real_room_id).await?;
        urls.into_iter().next().ok_or(SourceError::NoPlayableUrl)
    }

    async fn room_info(&self) -> RoomInfo {
        if let Err(e) = self.real_room_id().await {
            warn!(room_id = %self.room_id, error = %e, "Failed to resolve real room ID");
        }

        let snapshot = self.state.lock().room_info.clone();
        let lookup_id = if snapshot.real_room_id.is_empty() {
            self.room_id.clone()
        } else {
            snapshot.real_room_id.clone()
        };

        if snapshot.title.is_empty() || snapshot.user_cover.is_empty() || snapshot.uid.is_empty() {
            match self.client.room_details(&lookup_id).await {
                Ok(details) => {
                    let mut state = self.state.lock();
                    let info = &mut state.room_info;
                    info.title = details.title.clone();
                    info.user_cover = details.user_cover.clone();
                    info.keyframe = details.keyframe.clone();
                    if details.uid != 0 {
                        info.uid = details.uid.to_string();
                    }
                    if info.start_time.is_none() {
                        info.start_time = details.live_start();
                    }
                }
                Err(e) => warn!(room_id = %self.room_id, error = %e, "Failed to get room details"),
            }
        }

        let (uid, uname) = {
            let state = self.state.lock();
            (state.room_info.uid.clone(), state.room_info.uname.clone())
        };
        if uname.is_empty() {
            let resolved = match uid.parse::<u64>() {
                Ok(uid) => self.client.anchor_name(uid).await,
                Err(_) => Err(BilibiliError::Parse("unknown anchor uid".to_string())),
            };
            let name = resolved.unwrap_or_else(|e| {
                let fallback = format!("主播{}", self.room_id);
                warn!(room_id = %self.room_id, error = %e, anchor_name = %fallback, "Using default anchor name");
                fallback
            });
            self.state.lock().room_info.uname = name;
        }

        self.state.lock().room_info.clone()
    }

    fn start_listener(&self) {
        if !self.listening.swap(true, Ordering::AcqRel) {
            info!(room_id = %self.room_id, "Starting message listener");
        }
    }

    fn stop_listener(&self) {
        if self.listening.swap(false, Ordering::AcqRel) {
            info!(room_id = %self.room_id, "Closing message listener");
        } else {
            debug!(room_id = %self.room_id, "Message listener already closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restreamer_core::config::BilibiliConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> Arc<BilibiliClient> {
        let config = BilibiliConfig {
            base_url: server.uri(),
            timeout_seconds: 5,
            retry_count: 0,
            retry_wait_seconds: 0,
        };
        Arc::new(BilibiliClient::with_config(&config).unwrap())
    }

    async fn mount_room_init(server: &MockServer, live_status: i64) {
        Mock::given(method("GET"))
            .and(path("/room/v1/Room/room_init"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"{{"code":0,"msg":"ok","data":{{"room_id":14073662,"short_id":76,"uid":9617619,"live_status":{live_status}}}}}"#
            )))
            .mount(server)
            .await;
    }

    #[test]
    fn test_rejects_invalid_room_id() {
        let client = Arc::new(BilibiliClient::new().unwrap());
        assert!(BilibiliStreamSource::new("", client.clone()).is_err());
        assert!(BilibiliStreamSource::new("abc", client).is_err());
    }

    #[tokio::test]
    async fn test_is_live_updates_room_info() {
        let server = MockServer::start().await;
        mount_room_init(&server, 1).await;

        let source = BilibiliStreamSource::new("76", client_for(&server)).unwrap();
        assert_eq!(source.platform(), "bilibili");
        assert_eq!(source.room_id(), "76");
        assert!(source.is_live().await.unwrap());

        let state = source.state.lock();
        assert!(state.room_info.is_live);
        assert!(state.room_info.start_time.is_some());
    }

    #[tokio::test]
    async fn test_playable_url_uses_real_room_id() {
        let server = MockServer::start().await;
        mount_room_init(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/room/v1/Room/playUrl"))
            .and(wiremock::matchers::query_param("cid", "14073662"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"code":0,"msg":"0","data":{"durl":[{"url":"https://d1.bilivideo.com/live/s.flv?t=1"}]}}"#,
            ))
            .mount(&server)
            .await;

        let source = BilibiliStreamSource::new("76", client_for(&server)).unwrap();
        assert_eq!(
            source.playable_url().await.unwrap(),
            "https://d1.bilivideo.com/live/s/index.m3u8"
        );
    }

    #[tokio::test]
    async fn test_playable_url_failure_maps_to_source_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/room/v1/Room/room_init"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"code":-1,"msg":"busy","data":null}"#),
            )
            .mount(&server)
            .await;

        let source = BilibiliStreamSource::new("76", client_for(&server)).unwrap();
        assert!(matches!(source.playable_url().await, Err(SourceError::Api(_))));
    }

    #[tokio::test]
    async fn test_room_info_falls_back_to_default_anchor_name() {
        let server = MockServer::start().await;
        mount_room_init(&server, 0).await;
        Mock::given(method("GET"))
            .and(path("/room/v1/Room/get_info"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"code":0,"msg":"ok","data":{"uid":9617619,"room_id":14073662,"title":"t",
                    "user_cover":"c","keyframe":"k","live_status":0,"live_time":"0000-00-00 00:00:00"}}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/live_user/v1/Master/info"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let source = BilibiliStreamSource::new("76", client_for(&server)).unwrap();
        let info = source.room_info().await;
        assert_eq!(info.real_room_id, "14073662");
        assert_eq!(info.uid, "9617619");
        assert_eq!(info.title, "t");
        assert_eq!(info.uname, "主播76");
        assert!(info.start_time.is_none());
    }

    #[test]
    fn test_listener_hooks_are_idempotent() {
        let source = BilibiliStreamSource::new("76", Arc::new(BilibiliClient::new().unwrap())).unwrap();
        assert!(!source.is_listening());
        source.start_listener();
        source.start_listener();
        assert!(source.is_listening());
        source.stop_listener();
        source.stop_listener();
        assert!(!source.is_listening());
    }
}
