mod core;
mod error;
mod http;
mod lastfm;
mod lcu;
mod monitor;
mod scheduler;
#[cfg(test)]
mod testing;
mod timer;

use std::sync::Arc;
use std::time::Duration;

use profile_proto::activity::ActivityLog;
use profile_proto::config::Config;
use profile_proto::settings::JsonSettingsStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::lastfm::LastfmClient;
use crate::lcu::{LcuClient, LockfileProvider};
use crate::monitor::ConnectionMonitor;
use crate::scheduler::SyncScheduler;

/// A custom tracing layer that copies warnings and errors into the
/// user-visible activity log
struct ActivityLayer {
    activity: ActivityLog,
}

impl ActivityLayer {
    fn new(activity: ActivityLog) -> Self {
        Self { activity }
    }
}

impl<S> tracing_subscriber::Layer<S> for ActivityLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let metadata = event.metadata();
        let level = metadata.level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }
        // Lines recorded through ActivityLog are already in the book
        if metadata.target() == "activity" {
            return;
        }

        let mut message = format!("[{}] ", level);
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        self.activity.push_raw(message);
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Activity log first so the tracing layer can feed it
    let activity = ActivityLog::new();

    // Setup file logging + activity layer
    let data_dir = profile_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(ActivityLayer::new(activity.clone()))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,profile_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let lcu_timeout = Duration::from_millis(config.lcu.request_timeout_ms);
    // Outer bound on any single fetch or publish, on top of the clients' own
    let call_timeout = lcu_timeout.max(Duration::from_millis(config.lastfm.request_timeout_ms));

    let client = Arc::new(LcuClient::new(&config.lcu)?);
    let source = Arc::new(LastfmClient::new(&config.lastfm)?);
    let provider = Arc::new(LockfileProvider::new(&config.lcu));
    let store = JsonSettingsStore::new(config.paths.settings_file.clone());
    info!("Music bio settings at {:?}", store.path());

    // Event channel: timers and the HTTP API all funnel into DaemonCore
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<core::DaemonEvent>(256);
    let shutdown = CancellationToken::new();

    let monitor = ConnectionMonitor::new(provider, lcu_timeout, activity.clone());
    let scheduler = SyncScheduler::new(
        Box::new(store),
        source,
        client.clone(),
        activity.clone(),
        event_tx.clone(),
        call_timeout,
    );
    let daemon_core = core::DaemonCore::new(
        monitor,
        Duration::from_secs(config.lcu.poll_interval_secs.max(1)),
        scheduler,
        client,
        activity.clone(),
        event_tx.clone(),
        call_timeout,
    );

    // Start HTTP API if enabled
    let http_handle = if config.http.enabled {
        let app = http::router(
            event_tx.clone(),
            activity.clone(),
            config.paths.export_dir.clone(),
            config.http.allowed_origins.clone(),
        );
        Some(http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            app,
            shutdown.clone(),
        ))
    } else {
        None
    };

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(e) => warn!("Could not listen for Ctrl-C: {}", e),
        }
        signal_token.cancel();
    });

    info!("Daemon initialised, running event loop");
    daemon_core.run(event_rx, shutdown.clone()).await?;

    shutdown.cancel();
    if let Some(handle) = http_handle {
        let _ = handle.await;
    }
    info!("Daemon stopped");
    Ok(())
}
