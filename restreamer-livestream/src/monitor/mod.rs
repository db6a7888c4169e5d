// Live status monitor
//
// Polls every configured room on a fixed interval and publishes a
// `MonitorEvent` whenever a room goes live or offline.

pub mod tracker;

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use restreamer_core::{RoomDefinition, RoomInfo, SourceFactory, StreamSource};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{RelayError, RelayResult};

pub use tracker::{StatusTracker, StatusTransition};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    LiveStatusChanged {
        key: String,
        platform: String,
        room_id: String,
        is_live: bool,
        room_info: RoomInfo,
    },
}

pub struct Monitor {
    sources: IndexMap<String, Arc<dyn StreamSource>>,
    interval: Duration,
    verbose: bool,
    tracker: Mutex<StatusTracker>,
    cancel_token: CancellationToken,
    events: broadcast::Sender<MonitorEvent>,
}

impl Monitor {
    /// One source per enabled room, keyed `platform:room_id`.
    ///
    /// Rooms whose source cannot be created are logged and skipped.
    pub fn new(
        rooms: &[RoomDefinition],
        interval: Duration,
        verbose: bool,
        factory: &dyn SourceFactory,
    ) -> Self {
        let mut sources = IndexMap::new();

        for room in rooms {
            if !room.enabled {
                debug!(platform = %room.platform, room_id = %room.room_id, "Room disabled, skipping");
                continue;
            }

            let definition = room.source();
            let key = definition.key();
            if sources.contains_key(&key) {
                warn!(key = %key, "Duplicate room, skipping");
                continue;
            }

            match factory.create(&definition) {
                Ok(source) => {
                    info!(key = %key, "Monitoring room");
                    sources.insert(key, source);
                }
                Err(e) => {
                    error!(key = %key, error = %e, "Failed to create stream source, skipping room");
                }
            }
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sources,
            interval,
            verbose,
            tracker: Mutex::new(StatusTracker::new()),
            cancel_token: CancellationToken::new(),
            events,
        }
    }

    /// Poll every source each interval until stopped.
    ///
    /// The first check happens one interval after start.
    pub async fn run(&self) -> RelayResult<()> {
        if self.sources.is_empty() {
            return Err(RelayError::NoSourcesConfigured);
        }

        for source in self.sources.values() {
            source.start_listener();
        }
        info!(
            sources = self.sources.len(),
            interval = ?self.interval,
            "Monitor started"
        );

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        () = self.cancel_token.cancelled() => break,
                        () = self.check_all_sources() => {}
                    }
                }
            }
        }

        for source in self.sources.values() {
            source.stop_listener();
        }
        info!("Monitor stopped");
        Ok(())
    }

    /// Check every source once, publishing an event for each transition
    pub async fn check_all_sources(&self) {
        for (key, source) in &self.sources {
            let is_live = match source.is_live().await {
                Ok(is_live) => is_live,
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to check live status, treating as offline");
                    false
                }
            };

            if self.verbose {
                info!(key = %key, is_live, "Room status");
            } else {
                debug!(key = %key, is_live, "Room status");
            }

            let transition = self.tracker.lock().observe(key, is_live);
            if let Some(transition) = transition {
                let room_info = source.room_info().await;
                info!(
                    key = %key,
                    previous = ?transition.previous,
                    is_live,
                    title = %room_info.title,
                    anchor = %room_info.uname,
                    "Live status changed"
                );
                // No receivers is fine
                let _ = self.events.send(MonitorEvent::LiveStatusChanged {
                    key: key.clone(),
                    platform: source.platform().to_string(),
                    room_id: source.room_id().to_string(),
                    is_live,
                    room_info,
                });
            }
        }
    }

    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    #[must_use]
    pub fn source_keys(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}
