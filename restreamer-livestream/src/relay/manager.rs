// Relay manager
//
// Owns every enabled relay, starts them as a group and tears them down as a
// group. Each relay's supervision task lives in one JoinSet owned here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use restreamer_core::{Config, RelayDefinition, SourceFactory};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use super::events::RelayEvent;
use super::process::{FfmpegSpawner, ProcessSpawner};
use super::status::RelayStatus;
use super::stream_relay::{RelayTiming, StreamRelay};
use crate::error::{RelayError, RelayResult};

const EVENT_CHANNEL_CAPACITY: usize = 256;

pub struct RelayManager {
    definitions: Vec<RelayDefinition>,
    relays: IndexMap<String, Arc<StreamRelay>>,
    cancel_token: CancellationToken,
    tasks: tokio::sync::Mutex<JoinSet<()>>,
    stopping: AtomicBool,
    events: broadcast::Sender<RelayEvent>,
}

impl RelayManager {
    /// Build one relay per enabled definition.
    ///
    /// A definition whose source cannot be created, that has no destinations
    /// or whose name is already taken is logged and skipped.
    pub fn new(
        definitions: Vec<RelayDefinition>,
        timing: RelayTiming,
        factory: &dyn SourceFactory,
        spawner: Arc<dyn ProcessSpawner>,
    ) -> Self {
        let cancel_token = CancellationToken::new();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let mut relays = IndexMap::new();

        for definition in &definitions {
            if !definition.enabled {
                info!(relay = %definition.name, "Relay disabled, skipping");
                continue;
            }
            if definition.destinations.is_empty() {
                warn!(relay = %definition.name, "Relay has no destinations, skipping");
                continue;
            }
            if relays.contains_key(&definition.name) {
                warn!(relay = %definition.name, "Duplicate relay name, skipping");
                continue;
            }

            let source = match factory.create(&definition.source) {
                Ok(source) => source,
                Err(e) => {
                    error!(
                        relay = %definition.name,
                        source = %definition.source.key(),
                        error = %e,
                        "Failed to create stream source, skipping relay"
                    );
                    continue;
                }
            };

            let relay = StreamRelay::new(
                definition.clone(),
                source,
                Arc::clone(&spawner),
                timing,
                &cancel_token,
            )
            .with_events(events.clone());

            info!(relay = %definition.name, source = %definition.source.key(), "Relay created");
            relays.insert(definition.name.clone(), Arc::new(relay));
        }

        Self {
            definitions,
            relays,
            cancel_token,
            tasks: tokio::sync::Mutex::new(JoinSet::new()),
            stopping: AtomicBool::new(false),
            events,
        }
    }

    /// Build from loaded configuration, spawning the configured transcoder
    pub fn from_config(config: &Config, factory: &dyn SourceFactory) -> Self {
        Self::new(
            config.relays.clone(),
            RelayTiming::from_config(&config.relay),
            factory,
            Arc::new(FfmpegSpawner::from_config(&config.relay)),
        )
    }

    /// Load configuration from `path` and build from it.
    ///
    /// Fails only if the file exists but cannot be parsed.
    pub fn from_config_file(path: &str, factory: &dyn SourceFactory) -> RelayResult<Self> {
        let config = Config::from_file(path).map_err(restreamer_core::Error::from)?;
        Ok(Self::from_config(&config, factory))
    }

    /// Start every relay and block until the shutdown token fires, then stop.
    pub async fn run(&self) -> RelayResult<()> {
        if self.relays.is_empty() {
            return Err(RelayError::NoRelaysConfigured);
        }
        if self.cancel_token.is_cancelled() {
            self.stop().await;
            return Ok(());
        }

        {
            let mut tasks = self.tasks.lock().await;
            for (name, relay) in &self.relays {
                let relay = Arc::clone(relay);
                let span = info_span!("relay", name = %name);
                tasks.spawn(async move { relay.start().await }.instrument(span));
            }
        }
        info!(count = self.relays.len(), "Relay manager started");

        self.cancel_token.cancelled().await;
        self.stop().await;
        Ok(())
    }

    /// Stop every relay and wait for their supervision tasks to exit.
    ///
    /// Idempotent; concurrent callers all return once the tasks are gone.
    pub async fn stop(&self) {
        if !self.stopping.swap(true, Ordering::AcqRel) {
            info!("Stopping all relays");
            for relay in self.relays.values() {
                relay.stop();
            }
            self.cancel_token.cancel();
        }

        let mut tasks = self.tasks.lock().await;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Relay task failed");
            }
        }
    }

    #[must_use]
    pub fn relay_names(&self) -> Vec<String> {
        self.relays.keys().cloned().collect()
    }

    #[must_use]
    pub fn relay(&self, name: &str) -> Option<Arc<StreamRelay>> {
        self.relays.get(name).cloned()
    }

    #[must_use]
    pub fn status(&self, name: &str) -> Option<RelayStatus> {
        self.relays.get(name).map(|relay| relay.status())
    }

    /// Status of every relay, in definition order
    #[must_use]
    pub fn statuses(&self) -> Vec<RelayStatus> {
        self.relays.values().map(|relay| relay.status()).collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }

    /// Cancelling this token makes `run()` stop every relay and return
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    #[must_use]
    pub fn definitions(&self) -> &[RelayDefinition] {
        &self.definitions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.relays.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }
}
