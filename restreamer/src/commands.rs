// Subcommand drivers: wire configuration, sources and signals together

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use restreamer_core::{Config, Quality};
use restreamer_livestream::{Monitor, MonitorEvent, RelayEvent, RelayManager};
use restreamer_providers::PlatformSourceFactory;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval_at, Instant};
use tracing::{error, info, warn};

const STATUS_REPORT_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run_monitor(mut config: Config, interval: Option<String>, verbose: bool) -> Result<()> {
    if let Some(interval) = interval {
        config.interval = interval;
    }

    let factory = PlatformSourceFactory::new(&config.bilibili)?;
    let monitor = Monitor::new(
        &config.rooms,
        config.monitor_interval(),
        verbose || config.verbose,
        &factory,
    );
    info!(
        rooms = ?monitor.source_keys(),
        interval = ?monitor.interval(),
        "Monitor configured"
    );

    let mut events = monitor.subscribe();
    let event_logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(MonitorEvent::LiveStatusChanged { key, is_live, room_info, .. }) => {
                    let status = if is_live { "live" } else { "offline" };
                    info!(
                        key = %key,
                        anchor = %room_info.uname,
                        title = %room_info.title,
                        "Room is now {}", status
                    );
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Monitor event logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let shutdown = monitor.shutdown_token();
    let signal_watcher = tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.cancel();
    });

    let result = monitor.run().await;

    signal_watcher.abort();
    event_logger.abort();
    result?;
    info!("Monitor exited");
    Ok(())
}

pub async fn run_relay(mut config: Config, quality: Option<Quality>) -> Result<()> {
    if let Some(quality) = quality {
        for relay in &mut config.relays {
            relay.quality.get_or_insert(quality);
        }
    }

    let factory = PlatformSourceFactory::new(&config.bilibili)?;
    let manager = Arc::new(RelayManager::from_config(&config, &factory));
    info!(
        relays = ?manager.relay_names(),
        configured = manager.definitions().len(),
        platforms = ?PlatformSourceFactory::supported_platforms(),
        "Relay manager configured"
    );

    let mut events = manager.subscribe();
    let event_logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_relay_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Relay event logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let shutdown = manager.shutdown_token();
    let status_reporter = tokio::spawn({
        let manager = Arc::clone(&manager);
        let shutdown = shutdown.clone();
        async move {
            let mut ticker = interval_at(Instant::now() + STATUS_REPORT_INTERVAL, STATUS_REPORT_INTERVAL);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        for status in manager.statuses() {
                            info!(
                                relay = %status.name,
                                phase = %status.phase,
                                running = status.is_running,
                                processes = status.process_count,
                                restarts = status.restart_count,
                                last_error = ?status.last_error,
                                "Relay status"
                            );
                        }
                    }
                }
            }
        }
    });

    let signal_watcher = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let result = manager.run().await;

    shutdown.cancel();
    signal_watcher.abort();
    if let Err(e) = status_reporter.await {
        error!("Status reporter failed: {}", e);
    }
    event_logger.abort();

    result?;
    info!("All relays stopped");
    Ok(())
}

fn log_relay_event(event: &RelayEvent) {
    match event {
        RelayEvent::Started { relay } => info!(relay = %relay, "Relay started"),
        RelayEvent::Streaming { relay, url, destinations } => {
            info!(relay = %relay, url = %url, ?destinations, "Relay streaming");
        }
        RelayEvent::UrlUnavailable { relay, error } => {
            warn!(relay = %relay, error = %error, "Relay source has no playable URL");
        }
        RelayEvent::CycleCompleted { relay } => info!(relay = %relay, "Relay cycle completed"),
        RelayEvent::CycleFailed { relay, error, restart_count } => {
            error!(relay = %relay, error = %error, restart_count, "Relay cycle failed");
        }
        RelayEvent::Stopped { relay } => info!(relay = %relay, "Relay stopped"),
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C, shutting down"); }
        () = terminate => { info!("Received SIGTERM, shutting down"); }
    }
}
