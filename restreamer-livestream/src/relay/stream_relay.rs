// Per-relay supervision loop
//
// Idle -> WaitingForLiveSource -> Streaming -> BackoffWait -> WaitingForLiveSource ...
// Any phase -> Stopped on cancellation.
//
// All mutable state sits behind one lock. The loop and `stop()` both take it,
// never across an await.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use restreamer_core::config::RelaySettingsConfig;
use restreamer_core::{RelayDefinition, SourceError, StreamSource};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::args::build_transcoder_args;
use super::events::RelayEvent;
use super::process::{DestinationProcess, ProcessSpawner};
use super::status::{RelayPhase, RelayStatus};
use crate::error::{RelayError, RelayResult};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Fixed delays of the supervision loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayTiming {
    /// Pause between liveness checks of an offline source
    pub poll_interval: Duration,
    /// Pause after a failed streaming cycle
    pub restart_delay: Duration,
}

impl Default for RelayTiming {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            restart_delay: DEFAULT_RESTART_DELAY,
        }
    }
}

impl RelayTiming {
    #[must_use]
    pub fn from_config(config: &RelaySettingsConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            restart_delay: config.restart_delay(),
        }
    }
}

/// Handle to a running destination process, as seen from outside its worker
#[derive(Debug)]
struct ProcessHandle {
    pid: Option<u32>,
    kill_token: CancellationToken,
    started_at: DateTime<Utc>,
}

#[derive(Debug)]
struct RelayState {
    phase: RelayPhase,
    running: bool,
    start_time: Option<DateTime<Utc>>,
    last_error: Option<String>,
    restart_count: u64,
    active_processes: HashMap<String, ProcessHandle>,
}

enum CycleOutcome {
    /// Every destination exited cleanly
    Completed,
    Failed(RelayError),
    Cancelled,
}

type WorkerResult = (String, RelayResult<()>);

/// One source fanned out to N destinations
pub struct StreamRelay {
    definition: RelayDefinition,
    source: Arc<dyn StreamSource>,
    spawner: Arc<dyn ProcessSpawner>,
    timing: RelayTiming,
    cancel_token: CancellationToken,
    events: Option<broadcast::Sender<RelayEvent>>,
    state: Mutex<RelayState>,
}

impl StreamRelay {
    /// The relay's cancellation scope is a child of `parent`: cancelling the
    /// parent stops the relay, stopping the relay leaves the parent alone.
    pub fn new(
        definition: RelayDefinition,
        source: Arc<dyn StreamSource>,
        spawner: Arc<dyn ProcessSpawner>,
        timing: RelayTiming,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            definition,
            source,
            spawner,
            timing,
            cancel_token: parent.child_token(),
            events: None,
            state: Mutex::new(RelayState {
                phase: RelayPhase::Idle,
                running: false,
                start_time: None,
                last_error: None,
                restart_count: 0,
                active_processes: HashMap::new(),
            }),
        }
    }

    /// Publish lifecycle events on `sender`
    #[must_use]
    pub fn with_events(mut self, sender: broadcast::Sender<RelayEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    #[must_use]
    pub fn definition(&self) -> &RelayDefinition {
        &self.definition
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    #[must_use]
    pub fn restart_count(&self) -> u64 {
        self.state.lock().restart_count
    }

    /// Pids of the transcoders of the current cycle, by destination
    #[must_use]
    pub fn process_ids(&self) -> HashMap<String, u32> {
        self.state
            .lock()
            .active_processes
            .iter()
            .filter_map(|(name, handle)| handle.pid.map(|pid| (name.clone(), pid)))
            .collect()
    }

    #[must_use]
    pub fn status(&self) -> RelayStatus {
        let state = self.state.lock();
        RelayStatus {
            name: self.definition.name.clone(),
            is_running: state.running,
            phase: state.phase,
            start_time: state.start_time,
            last_error: state.last_error.clone(),
            restart_count: state.restart_count,
            process_count: state.active_processes.len(),
        }
    }

    /// Run the supervision loop until the relay is stopped or its parent
    /// scope is cancelled.
    ///
    /// Returns immediately if the relay is already running or already stopped.
    pub async fn start(&self) {
        {
            let mut state = self.state.lock();
            if state.running || self.cancel_token.is_cancelled() {
                debug!(relay = %self.definition.name, "Relay already running or stopped, ignoring start");
                return;
            }
            state.running = true;
            state.start_time = Some(Utc::now());
            state.phase = RelayPhase::WaitingForLiveSource;
        }

        info!(
            relay = %self.definition.name,
            platform = %self.source.platform(),
            room_id = %self.source.room_id(),
            destinations = self.definition.destinations.len(),
            "Starting relay"
        );
        self.source.start_listener();
        self.emit(RelayEvent::Started {
            relay: self.definition.name.clone(),
        });

        self.supervise().await;

        self.source.stop_listener();
        {
            let mut state = self.state.lock();
            state.running = false;
            state.phase = RelayPhase::Stopped;
            state.active_processes.clear();
        }
        self.emit(RelayEvent::Stopped {
            relay: self.definition.name.clone(),
        });
        info!(relay = %self.definition.name, "Relay stopped");
    }

    /// Stop the relay: cancel its scope and kill every tracked process.
    ///
    /// Idempotent, never blocks on the supervision loop.
    pub fn stop(&self) {
        let (was_running, killed) = {
            let mut state = self.state.lock();
            let was_running = state.running;
            state.running = false;
            state.phase = RelayPhase::Stopped;
            self.cancel_token.cancel();

            let killed = state.active_processes.len();
            for (destination, handle) in state.active_processes.drain() {
                debug!(
                    relay = %self.definition.name,
                    destination = %destination,
                    pid = ?handle.pid,
                    uptime_secs = (Utc::now() - handle.started_at).num_seconds(),
                    "Killing transcoder"
                );
                handle.kill_token.cancel();
            }
            (was_running, killed)
        };

        if was_running {
            info!(relay = %self.definition.name, killed, "Relay stop requested");
        }
    }

    async fn supervise(&self) {
        let name = &self.definition.name;

        loop {
            if self.cancel_token.is_cancelled() {
                break;
            }
            self.set_phase(RelayPhase::WaitingForLiveSource);

            let live = tokio::select! {
                () = self.cancel_token.cancelled() => break,
                live = self.source.is_live() => live,
            };
            match live {
                Ok(true) => {}
                Ok(false) => {
                    debug!(relay = %name, "Source offline, waiting");
                    if !self.pause(self.timing.poll_interval).await {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    warn!(relay = %name, error = %e, "Failed to check source status, treating as offline");
                    if !self.pause(self.timing.poll_interval).await {
                        break;
                    }
                    continue;
                }
            }

            let url = tokio::select! {
                () = self.cancel_token.cancelled() => break,
                url = self.source.playable_url() => url,
            };
            let url = match url.and_then(|url| {
                if url.is_empty() {
                    Err(SourceError::NoPlayableUrl)
                } else {
                    Ok(url)
                }
            }) {
                Ok(url) => url,
                Err(e) => {
                    // Not charged as a restart
                    let err = RelayError::UrlUnavailable(e.to_string());
                    warn!(relay = %name, error = %err, "Source is live but no playable URL");
                    self.state.lock().last_error = Some(err.to_string());
                    self.emit(RelayEvent::UrlUnavailable {
                        relay: name.clone(),
                        error: err.to_string(),
                    });
                    if !self.pause(self.timing.poll_interval).await {
                        break;
                    }
                    continue;
                }
            };

            match self.run_cycle(&url).await {
                CycleOutcome::Cancelled => break,
                CycleOutcome::Completed => {
                    info!(relay = %name, "All destinations finished, waiting for source");
                    self.emit(RelayEvent::CycleCompleted { relay: name.clone() });
                    self.set_phase(RelayPhase::WaitingForLiveSource);
                    if !self.pause(self.timing.poll_interval).await {
                        break;
                    }
                }
                CycleOutcome::Failed(err) => {
                    let restart_count = {
                        let mut state = self.state.lock();
                        state.last_error = Some(err.to_string());
                        state.restart_count += 1;
                        if state.running {
                            state.phase = RelayPhase::BackoffWait;
                        }
                        state.restart_count
                    };
                    error!(
                        relay = %name,
                        error = %err,
                        restart_count,
                        delay = ?self.timing.restart_delay,
                        "Relay cycle failed, restarting after delay"
                    );
                    self.emit(RelayEvent::CycleFailed {
                        relay: name.clone(),
                        error: err.to_string(),
                        restart_count,
                    });
                    if !self.pause(self.timing.restart_delay).await {
                        break;
                    }
                }
            }
        }
    }

    /// Launch one transcoder per destination and wait for the first failure.
    ///
    /// Always tears the whole cycle down before returning.
    async fn run_cycle(&self, url: &str) -> CycleOutcome {
        let name = &self.definition.name;
        let cycle_token = self.cancel_token.child_token();
        let mut workers: JoinSet<WorkerResult> = JoinSet::new();
        let mut launch_error = None;

        {
            let mut state = self.state.lock();
            if !state.running || self.cancel_token.is_cancelled() {
                return CycleOutcome::Cancelled;
            }

            for destination in &self.definition.destinations {
                let args = build_transcoder_args(url, self.definition.quality, destination);
                let kill_token = cycle_token.child_token();

                match DestinationProcess::launch(
                    self.spawner.as_ref(),
                    destination,
                    &args,
                    kill_token.clone(),
                ) {
                    Ok(process) => {
                        debug!(relay = %name, destination = %destination.name, pid = ?process.id(), "Transcoder started");
                        state.active_processes.insert(
                            destination.name.clone(),
                            ProcessHandle {
                                pid: process.id(),
                                kill_token,
                                started_at: Utc::now(),
                            },
                        );
                        let destination_name = destination.name.clone();
                        workers.spawn(async move { (destination_name, process.run().await) });
                    }
                    Err(err) => {
                        launch_error = Some(err);
                        break;
                    }
                }
            }

            if launch_error.is_none() {
                state.phase = RelayPhase::Streaming;
            }
        }

        if let Some(err) = launch_error {
            self.teardown(&cycle_token, workers).await;
            return CycleOutcome::Failed(err);
        }

        info!(relay = %name, url, "Streaming to {} destination(s)", self.definition.destinations.len());
        self.emit(RelayEvent::Streaming {
            relay: name.clone(),
            url: url.to_string(),
            destinations: self
                .definition
                .destinations
                .iter()
                .map(|d| d.name.clone())
                .collect(),
        });

        let outcome = loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => break CycleOutcome::Cancelled,
                joined = workers.join_next() => match joined {
                    None => break CycleOutcome::Completed,
                    Some(Ok((destination, Ok(())))) => {
                        debug!(relay = %name, destination = %destination, "Destination finished");
                        self.state.lock().active_processes.remove(&destination);
                    }
                    Some(Ok((_, Err(err)))) => break CycleOutcome::Failed(err),
                    Some(Err(join_err)) => {
                        break CycleOutcome::Failed(RelayError::Worker(join_err.to_string()));
                    }
                },
            }
        };

        self.teardown(&cycle_token, workers).await;
        outcome
    }

    /// Kill whatever is left of a cycle and wait for the workers to exit
    async fn teardown(&self, cycle_token: &CancellationToken, mut workers: JoinSet<WorkerResult>) {
        cycle_token.cancel();
        self.state.lock().active_processes.clear();

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((destination, Err(err))) => {
                    debug!(relay = %self.definition.name, destination = %destination, error = %err, "Sibling exited during teardown");
                }
                Ok(_) => {}
                Err(join_err) => {
                    warn!(relay = %self.definition.name, error = %join_err, "Destination worker panicked");
                }
            }
        }
    }

    /// Sleep unless cancelled first. Returns false on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.cancel_token.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }

    fn set_phase(&self, phase: RelayPhase) {
        let mut state = self.state.lock();
        if state.running {
            state.phase = phase;
        }
    }

    fn emit(&self, event: RelayEvent) {
        if let Some(events) = &self.events {
            // No receivers is fine
            let _ = events.send(event);
        }
    }
}
