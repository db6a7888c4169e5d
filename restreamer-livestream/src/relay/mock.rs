// Test doubles for the relay engine
//
// `MockStreamSource` answers liveness and URL queries from settable values.
// `ScriptedSpawner` runs `sh -c <script>` per destination instead of a transcoder.

use std::collections::{HashMap, HashSet};
use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use restreamer_core::{DestinationDefinition, RoomInfo, SourceError, StreamSource};
use tokio::process::{Child, Command};

use super::process::ProcessSpawner;

pub struct MockStreamSource {
    room_id: String,
    live: Mutex<Result<bool, SourceError>>,
    url: Mutex<Result<String, SourceError>>,
    live_checks: AtomicUsize,
    url_requests: AtomicUsize,
    listener_starts: AtomicUsize,
    listener_stops: AtomicUsize,
}

impl MockStreamSource {
    /// Offline, no URL
    pub fn new(room_id: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            live: Mutex::new(Ok(false)),
            url: Mutex::new(Err(SourceError::NoPlayableUrl)),
            live_checks: AtomicUsize::new(0),
            url_requests: AtomicUsize::new(0),
            listener_starts: AtomicUsize::new(0),
            listener_stops: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_live(self, live: bool) -> Self {
        self.set_live(Ok(live));
        self
    }

    #[must_use]
    pub fn with_url(self, url: &str) -> Self {
        self.set_url(Ok(url.to_string()));
        self
    }

    pub fn set_live(&self, live: Result<bool, SourceError>) {
        *self.live.lock() = live;
    }

    pub fn set_url(&self, url: Result<String, SourceError>) {
        *self.url.lock() = url;
    }

    pub fn live_checks(&self) -> usize {
        self.live_checks.load(Ordering::SeqCst)
    }

    pub fn url_requests(&self) -> usize {
        self.url_requests.load(Ordering::SeqCst)
    }

    pub fn listener_starts(&self) -> usize {
        self.listener_starts.load(Ordering::SeqCst)
    }

    pub fn listener_stops(&self) -> usize {
        self.listener_stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamSource for MockStreamSource {
    fn platform(&self) -> &str {
        "mock"
    }

    fn room_id(&self) -> &str {
        &self.room_id
    }

    async fn is_live(&self) -> Result<bool, SourceError> {
        self.live_checks.fetch_add(1, Ordering::SeqCst);
        self.live.lock().clone()
    }

    async fn playable_url(&self) -> Result<String, SourceError> {
        self.url_requests.fetch_add(1, Ordering::SeqCst);
        self.url.lock().clone()
    }

    async fn room_info(&self) -> RoomInfo {
        RoomInfo {
            platform: "mock".to_string(),
            room_id: self.room_id.clone(),
            uname: format!("mock-{}", self.room_id),
            is_live: matches!(*self.live.lock(), Ok(true)),
            ..Default::default()
        }
    }

    fn start_listener(&self) {
        self.listener_starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop_listener(&self) {
        self.listener_stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// One recorded spawn
#[derive(Debug, Clone)]
pub struct Launch {
    pub destination: String,
    pub args: Vec<String>,
    pub pid: Option<u32>,
}

pub struct ScriptedSpawner {
    default_script: String,
    scripts: HashMap<String, String>,
    failing: HashSet<String>,
    launches: Mutex<Vec<Launch>>,
}

impl ScriptedSpawner {
    /// Every destination runs `default_script` unless given its own
    pub fn new(default_script: &str) -> Self {
        Self {
            default_script: default_script.to_string(),
            scripts: HashMap::new(),
            failing: HashSet::new(),
            launches: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn script(mut self, destination: &str, script: &str) -> Self {
        self.scripts.insert(destination.to_string(), script.to_string());
        self
    }

    /// Make spawning `destination` fail as if the binary were missing
    #[must_use]
    pub fn fail_launch(mut self, destination: &str) -> Self {
        self.failing.insert(destination.to_string());
        self
    }

    pub fn launches(&self) -> Vec<Launch> {
        self.launches.lock().clone()
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().len()
    }

    /// Pids of every launch of `destination`, oldest first
    pub fn pids(&self, destination: &str) -> Vec<u32> {
        self.launches
            .lock()
            .iter()
            .filter(|launch| launch.destination == destination)
            .filter_map(|launch| launch.pid)
            .collect()
    }
}

impl ProcessSpawner for ScriptedSpawner {
    fn spawn(&self, destination: &DestinationDefinition, args: &[String]) -> io::Result<Child> {
        if self.failing.contains(&destination.name) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no transcoder for {}", destination.name),
            ));
        }

        let script = self
            .scripts
            .get(&destination.name)
            .unwrap_or(&self.default_script);

        let child = Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        self.launches.lock().push(Launch {
            destination: destination.name.clone(),
            args: args.to_vec(),
            pid: child.id(),
        });
        Ok(child)
    }
}
