//! Supervision loop behaviour against real child processes
//!
//! Destinations run short `sh -c` scripts in place of the transcoder.
//!
//! Run with: cargo test --test relay_supervision

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use restreamer_core::{DestinationDefinition, Quality, RelayDefinition, SourceDefinition, SourceError};
use restreamer_livestream::relay::mock::{MockStreamSource, ScriptedSpawner};
use restreamer_livestream::{RelayEvent, RelayPhase, RelayTiming, StreamRelay};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SOURCE_URL: &str = "http://src/index.m3u8";

fn definition(destinations: &[&str]) -> RelayDefinition {
    RelayDefinition {
        name: "demo".to_string(),
        source: SourceDefinition {
            platform: "mock".to_string(),
            room_id: "1".to_string(),
        },
        destinations: destinations
            .iter()
            .map(|name| DestinationDefinition {
                name: (*name).to_string(),
                url: format!("rtmp://x/{name}"),
                protocol: "rtmp".to_string(),
                options: BTreeMap::from([("bufsize".to_string(), "3000k".to_string())]),
            })
            .collect(),
        enabled: true,
        quality: Some(Quality::P720),
    }
}

fn fast_timing(restart_delay: Duration) -> RelayTiming {
    RelayTiming {
        poll_interval: Duration::from_millis(20),
        restart_delay,
    }
}

fn spawn_relay(relay: &Arc<StreamRelay>) -> JoinHandle<()> {
    let relay = Arc::clone(relay);
    tokio::spawn(async move { relay.start().await })
}

/// Poll `condition` every 10ms until it holds, failing after 5s
async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn finishes<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("did not finish in time")
}

fn process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[tokio::test]
async fn test_offline_source_never_streams() {
    let source = Arc::new(MockStreamSource::new("1"));
    let spawner = Arc::new(ScriptedSpawner::new("exec sleep 30"));
    let relay = Arc::new(StreamRelay::new(
        definition(&["a"]),
        source.clone(),
        spawner.clone(),
        fast_timing(Duration::from_millis(20)),
        &CancellationToken::new(),
    ));

    let task = spawn_relay(&relay);
    wait_until(|| source.live_checks() >= 5).await;

    let status = relay.status();
    assert!(status.is_running);
    assert_eq!(status.phase, RelayPhase::WaitingForLiveSource);
    assert_eq!(status.restart_count, 0);
    assert_eq!(status.process_count, 0);
    assert!(status.last_error.is_none());
    assert_eq!(source.url_requests(), 0);
    assert_eq!(spawner.launch_count(), 0);

    relay.stop();
    finishes(task).await.unwrap();
}

#[tokio::test]
async fn test_liveness_errors_read_as_offline() {
    let source = Arc::new(MockStreamSource::new("1"));
    source.set_live(Err(SourceError::Network("connection refused".to_string())));
    let spawner = Arc::new(ScriptedSpawner::new("exec sleep 30"));
    let relay = Arc::new(StreamRelay::new(
        definition(&["a"]),
        source.clone(),
        spawner.clone(),
        fast_timing(Duration::from_millis(20)),
        &CancellationToken::new(),
    ));

    let task = spawn_relay(&relay);
    wait_until(|| source.live_checks() >= 3).await;
    assert_eq!(relay.restart_count(), 0);
    assert_eq!(spawner.launch_count(), 0);

    relay.stop();
    finishes(task).await.unwrap();
}

#[tokio::test]
async fn test_missing_url_is_not_a_restart() {
    let source = Arc::new(MockStreamSource::new("1").with_live(true));
    source.set_url(Err(SourceError::Api("playurl unavailable".to_string())));
    let spawner = Arc::new(ScriptedSpawner::new("exec sleep 30"));
    let relay = Arc::new(StreamRelay::new(
        definition(&["a"]),
        source.clone(),
        spawner.clone(),
        fast_timing(Duration::from_secs(10)),
        &CancellationToken::new(),
    ));

    let task = spawn_relay(&relay);
    wait_until(|| source.url_requests() >= 3).await;

    let status = relay.status();
    assert_eq!(status.restart_count, 0);
    assert_eq!(status.phase, RelayPhase::WaitingForLiveSource);
    assert!(status
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("playurl unavailable")));
    assert_eq!(spawner.launch_count(), 0);

    // An empty URL is the same failure
    source.set_url(Ok(String::new()));
    let before = source.url_requests();
    wait_until(|| source.url_requests() >= before + 2).await;
    assert_eq!(relay.restart_count(), 0);
    assert_eq!(spawner.launch_count(), 0);

    relay.stop();
    finishes(task).await.unwrap();
}

#[tokio::test]
async fn test_destination_failure_tears_down_siblings() {
    let source = Arc::new(MockStreamSource::new("1").with_live(true).with_url(SOURCE_URL));
    let spawner = Arc::new(
        ScriptedSpawner::new("exec sleep 30")
            .script("b", "sleep 0.2; exit 3"),
    );
    let relay = Arc::new(StreamRelay::new(
        definition(&["a", "b"]),
        source.clone(),
        spawner.clone(),
        fast_timing(Duration::from_secs(30)),
        &CancellationToken::new(),
    ));

    let task = spawn_relay(&relay);
    wait_until(|| relay.restart_count() == 1).await;

    let status = relay.status();
    assert_eq!(status.phase, RelayPhase::BackoffWait);
    assert_eq!(status.process_count, 0);
    assert!(status
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("destination b exited")));

    // Both destinations were launched with the same resolved URL
    let launches = spawner.launches();
    assert_eq!(launches.len(), 2);
    for launch in &launches {
        assert_eq!(launch.args[1], SOURCE_URL);
        assert_eq!(launch.args.last(), Some(&format!("rtmp://x/{}", launch.destination)));
    }

    let sibling = spawner.pids("a");
    assert_eq!(sibling.len(), 1);
    assert!(!process_alive(sibling[0]), "sibling transcoder still running");

    // Still backing off: exactly one restart counted
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(relay.restart_count(), 1);
    assert_eq!(spawner.launch_count(), 2);

    relay.stop();
    finishes(task).await.unwrap();
}

#[tokio::test]
async fn test_launch_failure_counts_as_cycle_failure() {
    let source = Arc::new(MockStreamSource::new("1").with_live(true).with_url(SOURCE_URL));
    let spawner = Arc::new(ScriptedSpawner::new("exec sleep 30").fail_launch("b"));
    let relay = Arc::new(StreamRelay::new(
        definition(&["a", "b"]),
        source.clone(),
        spawner.clone(),
        fast_timing(Duration::from_secs(30)),
        &CancellationToken::new(),
    ));

    let task = spawn_relay(&relay);
    wait_until(|| relay.restart_count() == 1).await;

    let status = relay.status();
    assert_eq!(status.process_count, 0);
    assert!(status
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("failed to launch")));
    let started = spawner.pids("a");
    assert_eq!(started.len(), 1);
    assert!(!process_alive(started[0]));

    relay.stop();
    finishes(task).await.unwrap();
}

#[tokio::test]
async fn test_failed_cycles_restart_after_backoff() {
    let source = Arc::new(MockStreamSource::new("1").with_live(true).with_url(SOURCE_URL));
    let spawner = Arc::new(ScriptedSpawner::new("exit 1"));
    let relay = Arc::new(StreamRelay::new(
        definition(&["a"]),
        source.clone(),
        spawner.clone(),
        fast_timing(Duration::from_millis(30)),
        &CancellationToken::new(),
    ));

    let task = spawn_relay(&relay);

    let mut last = 0;
    tokio::time::timeout(Duration::from_secs(5), async {
        while last < 3 {
            let current = relay.restart_count();
            assert!(current >= last, "restart count went backwards");
            last = current;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("relay did not restart");

    // Each restart went back through the liveness check
    assert!(source.live_checks() >= 3);
    assert!(spawner.launch_count() >= 3);

    relay.stop();
    finishes(task).await.unwrap();
}

#[tokio::test]
async fn test_completed_cycle_is_not_a_restart() {
    let source = Arc::new(MockStreamSource::new("1").with_live(true).with_url(SOURCE_URL));
    let spawner = Arc::new(ScriptedSpawner::new("exit 0"));
    let relay = Arc::new(StreamRelay::new(
        definition(&["a", "b"]),
        source.clone(),
        spawner.clone(),
        fast_timing(Duration::from_millis(30)),
        &CancellationToken::new(),
    ));

    let task = spawn_relay(&relay);
    wait_until(|| spawner.launch_count() >= 4).await;
    assert_eq!(relay.restart_count(), 0);
    assert!(relay.status().last_error.is_none());

    relay.stop();
    finishes(task).await.unwrap();
}

#[tokio::test]
async fn test_completed_cycle_leaves_streaming_phase() {
    let source = Arc::new(MockStreamSource::new("1").with_live(true).with_url(SOURCE_URL));
    let spawner = Arc::new(ScriptedSpawner::new("exit 0"));
    let (sender, mut events) = tokio::sync::broadcast::channel(16);
    let relay = Arc::new(
        StreamRelay::new(
            definition(&["a"]),
            source.clone(),
            spawner.clone(),
            RelayTiming {
                poll_interval: Duration::from_secs(5),
                restart_delay: Duration::from_secs(5),
            },
            &CancellationToken::new(),
        )
        .with_events(sender),
    );

    let task = spawn_relay(&relay);
    finishes(async {
        while !matches!(events.recv().await, Ok(RelayEvent::CycleCompleted { .. })) {}
    })
    .await;

    // Nothing runs while the poll interval is waited out
    tokio::time::sleep(Duration::from_millis(200)).await;
    let status = relay.status();
    assert_eq!(status.phase, RelayPhase::WaitingForLiveSource);
    assert_eq!(status.process_count, 0);
    assert_eq!(status.restart_count, 0);
    assert_eq!(spawner.launch_count(), 1);

    relay.stop();
    finishes(task).await.unwrap();
}

#[tokio::test]
async fn test_stop_while_streaming_kills_processes() {
    let source = Arc::new(MockStreamSource::new("1").with_live(true).with_url(SOURCE_URL));
    let spawner = Arc::new(ScriptedSpawner::new("exec sleep 30"));
    let relay = Arc::new(StreamRelay::new(
        definition(&["a", "b"]),
        source.clone(),
        spawner.clone(),
        fast_timing(Duration::from_millis(30)),
        &CancellationToken::new(),
    ));

    let task = spawn_relay(&relay);
    wait_until(|| relay.status().process_count == 2).await;
    assert_eq!(relay.status().phase, RelayPhase::Streaming);
    let pids: Vec<u32> = relay.process_ids().into_values().collect();
    assert_eq!(pids.len(), 2);

    relay.stop();
    let status = relay.status();
    assert!(!status.is_running);
    assert_eq!(status.phase, RelayPhase::Stopped);
    assert_eq!(status.process_count, 0);

    finishes(task).await.unwrap();
    for pid in pids {
        assert!(!process_alive(pid), "transcoder {pid} survived stop");
    }
    assert_eq!(relay.restart_count(), 0);
    assert_eq!(source.listener_starts(), 1);
    assert_eq!(source.listener_stops(), 1);

    // Stopped is terminal
    relay.stop();
    finishes(relay.start()).await;
    assert_eq!(source.listener_starts(), 1);
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let source = Arc::new(MockStreamSource::new("1"));
    let relay = Arc::new(StreamRelay::new(
        definition(&["a"]),
        source.clone(),
        Arc::new(ScriptedSpawner::new("exit 0")),
        fast_timing(Duration::from_millis(20)),
        &CancellationToken::new(),
    ));

    let task = spawn_relay(&relay);
    wait_until(|| relay.is_running()).await;

    // A second start returns at once instead of running a second loop
    finishes(relay.start()).await;
    assert!(relay.is_running());
    assert_eq!(source.listener_starts(), 1);

    relay.stop();
    finishes(task).await.unwrap();
}

#[tokio::test]
async fn test_events_follow_the_cycle() {
    let source = Arc::new(MockStreamSource::new("1").with_live(true).with_url(SOURCE_URL));
    let (events, mut rx) = tokio::sync::broadcast::channel(64);
    let relay = Arc::new(
        StreamRelay::new(
            definition(&["a"]),
            source.clone(),
            Arc::new(ScriptedSpawner::new("exit 2")),
            fast_timing(Duration::from_secs(30)),
            &CancellationToken::new(),
        )
        .with_events(events),
    );

    let task = spawn_relay(&relay);
    wait_until(|| relay.restart_count() == 1).await;
    relay.stop();
    finishes(task).await.unwrap();

    let mut received = Vec::new();
    while let Ok(event) = rx.try_recv() {
        received.push(event);
    }

    assert!(matches!(received.first(), Some(RelayEvent::Started { relay }) if relay == "demo"));
    assert!(received.iter().any(|e| matches!(
        e,
        RelayEvent::Streaming { url, destinations, .. } if url == SOURCE_URL && destinations == &["a".to_string()]
    )));
    assert!(received
        .iter()
        .any(|e| matches!(e, RelayEvent::CycleFailed { restart_count: 1, .. })));
    assert!(matches!(received.last(), Some(RelayEvent::Stopped { .. })));
}
