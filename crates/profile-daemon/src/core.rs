/// DaemonCore: single-owner event loop for all mutable sync state.
///
/// The connection monitor, the sync scheduler and the user's manual actions
/// all run here, one event at a time. Timers and the HTTP API only ever send
/// `DaemonEvent`s into this loop; nothing else touches the monitor or the
/// scheduler, so a tick's fetch/publish pair always settles before the next
/// tick or user action is looked at.
use std::sync::Arc;
use std::time::Duration;

use profile_proto::activity::ActivityLog;
use profile_proto::protocol::{
    Availability, ConnectionInfo, Division, RankTier, SettingsEdit, SetupReport, StatusSnapshot,
};
use profile_proto::template::truncate_bio;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::lcu::GameClient;
use crate::monitor::ConnectionMonitor;
use crate::scheduler::SyncScheduler;
use crate::timer::Ticker;

// ── DaemonEvent ───────────────────────────────────────────────────────────────

pub type Responder<T> = oneshot::Sender<Result<T, SyncError>>;

/// A user action from the control API, with the channel its outcome goes
/// back on.
#[derive(Debug)]
pub enum ControlCommand {
    Status(Responder<StatusSnapshot>),
    UpdateSettings(SettingsEdit, Responder<StatusSnapshot>),
    Enable(Responder<StatusSnapshot>),
    Disable(Responder<StatusSnapshot>),
    TestSetup(Responder<SetupReport>),
    ApplyBio(String, Responder<()>),
    OverrideRank(RankTier, Division, Responder<()>),
    GetAvailability(Responder<Availability>),
    SetAvailability(Availability, Responder<()>),
}

/// All inputs into the DaemonCore loop.
#[derive(Debug)]
pub enum DaemonEvent {
    /// Time to ask whether the game client is running.
    MonitorTick { generation: u64 },
    /// Time for one scheduler poll cycle.
    SyncTick { generation: u64 },
    Control(ControlCommand),
    Shutdown,
}

// ── DaemonCore ────────────────────────────────────────────────────────────────

pub struct DaemonCore {
    monitor: ConnectionMonitor,
    monitor_timer: Ticker,
    monitor_period: Duration,
    scheduler: SyncScheduler,
    client: Arc<dyn GameClient>,
    activity: ActivityLog,
    events: mpsc::Sender<DaemonEvent>,
    call_timeout: Duration,
}

impl DaemonCore {
    pub fn new(
        monitor: ConnectionMonitor,
        monitor_period: Duration,
        scheduler: SyncScheduler,
        client: Arc<dyn GameClient>,
        activity: ActivityLog,
        events: mpsc::Sender<DaemonEvent>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            monitor,
            monitor_timer: Ticker::new(),
            monitor_period,
            scheduler,
            client,
            activity,
            events,
            call_timeout,
        }
    }

    /// Run the core event loop. Returns on `Shutdown`, when `shutdown` is
    /// cancelled, or when every sender is gone.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<DaemonEvent>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        info!("DaemonCore: starting event loop");
        self.start().await;

        loop {
            let evt = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("DaemonCore: shutdown requested");
                    break;
                }
                evt = events.recv() => evt,
            };
            match evt {
                None => {
                    info!("DaemonCore: event channel closed, shutting down");
                    break;
                }
                Some(DaemonEvent::Shutdown) => {
                    info!("DaemonCore: shutdown requested");
                    break;
                }
                Some(evt) => self.handle(evt).await,
            }
        }

        self.monitor_timer.stop();
        Ok(())
    }

    /// Initial discovery, then re-enter whatever sync state was persisted.
    async fn start(&mut self) {
        self.poll_monitor().await;
        let tx = self.events.clone();
        self.monitor_timer
            .start(self.monitor_period, tx, |generation| DaemonEvent::MonitorTick { generation });
        let conn = self.monitor.current().cloned();
        self.scheduler.resume(conn.as_ref()).await;
    }

    async fn handle(&mut self, evt: DaemonEvent) {
        match evt {
            DaemonEvent::MonitorTick { generation } => {
                if self.monitor_timer.is_current(generation) {
                    self.poll_monitor().await;
                }
            }
            DaemonEvent::SyncTick { generation } => {
                if !self.scheduler.is_current_tick(generation) {
                    debug!("DaemonCore: dropping stale sync tick {}", generation);
                    return;
                }
                let conn = self.monitor.current().cloned();
                self.scheduler.tick(conn.as_ref()).await;
            }
            DaemonEvent::Control(command) => self.handle_command(command).await,
            DaemonEvent::Shutdown => {}
        }
    }

    async fn poll_monitor(&mut self) {
        if let Some(transition) = self.monitor.poll().await {
            self.scheduler.on_connection(&transition);
        }
    }

    // ── Control commands ──────────────────────────────────────────────────────

    async fn handle_command(&mut self, command: ControlCommand) {
        debug!("DaemonCore: command {:?}", command);
        let conn = self.monitor.current().cloned();
        let conn = conn.as_ref();
        match command {
            ControlCommand::Status(reply) => {
                let _ = reply.send(Ok(self.snapshot()));
            }
            ControlCommand::UpdateSettings(edit, reply) => {
                let result = self.scheduler.update_settings(edit, conn).await;
                let _ = reply.send(result.map(|_| self.snapshot()));
            }
            ControlCommand::Enable(reply) => {
                let result = self.scheduler.enable(conn).await;
                let _ = reply.send(result.map(|_| self.snapshot()));
            }
            ControlCommand::Disable(reply) => {
                let result = self.scheduler.disable(conn).await;
                let _ = reply.send(result.map(|_| self.snapshot()));
            }
            ControlCommand::TestSetup(reply) => {
                let _ = reply.send(self.scheduler.test_setup(conn).await);
            }
            ControlCommand::ApplyBio(text, reply) => {
                let _ = reply.send(self.apply_bio(conn, &text).await);
            }
            ControlCommand::OverrideRank(tier, division, reply) => {
                let _ = reply.send(self.override_rank(conn, tier, division).await);
            }
            ControlCommand::GetAvailability(reply) => {
                let result = match conn {
                    Some(conn) => self.bounded(self.client.availability(conn)).await,
                    None => Err(SyncError::Unreachable),
                };
                let _ = reply.send(result);
            }
            ControlCommand::SetAvailability(availability, reply) => {
                let _ = reply.send(self.set_availability(conn, availability).await);
            }
        }
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            connected: self.monitor.is_reachable(),
            sync_state: self.scheduler.state(),
            settings: self.scheduler.settings().masked(),
            last_published: self.scheduler.last_published().map(str::to_string),
        }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, SyncError>
    where
        F: std::future::Future<Output = Result<T, SyncError>>,
    {
        tokio::time::timeout(self.call_timeout, call).await?
    }

    async fn apply_bio(&self, conn: Option<&ConnectionInfo>, text: &str) -> Result<(), SyncError> {
        let text = truncate_bio(text);
        if text.is_empty() {
            return Err(SyncError::ConfigurationInvalid("Bio text is empty".to_string()));
        }
        let conn = conn.ok_or(SyncError::Unreachable)?;
        match self.bounded(self.client.publish_bio(conn, &text)).await {
            Ok(()) => {
                self.activity.record(format!("Bio updated: \"{}\"", text));
                Ok(())
            }
            Err(e) => {
                self.activity.record(format!("Error updating bio: {}", e));
                Err(e)
            }
        }
    }

    async fn override_rank(
        &self,
        conn: Option<&ConnectionInfo>,
        tier: RankTier,
        division: Division,
    ) -> Result<(), SyncError> {
        let conn = conn.ok_or(SyncError::Unreachable)?;
        match self.bounded(self.client.publish_rank(conn, tier, division)).await {
            Ok(()) => {
                self.activity
                    .record(format!("Rank override: {} {}", tier.as_str(), division.as_str()));
                Ok(())
            }
            Err(e) => {
                self.activity.record(format!("Rank override failed: {}", e));
                Err(e)
            }
        }
    }

    async fn set_availability(
        &self,
        conn: Option<&ConnectionInfo>,
        availability: Availability,
    ) -> Result<(), SyncError> {
        let conn = conn.ok_or(SyncError::Unreachable)?;
        match self.bounded(self.client.set_availability(conn, availability)).await {
            Ok(()) => {
                self.activity
                    .record(format!("Availability set to {}", availability.as_str()));
                Ok(())
            }
            Err(e) => {
                warn!("Availability change failed: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{connection, credentials, track, FakeClient, FakeProvider, FakeSource, MemoryStore};
    use profile_proto::protocol::SyncState;
    use profile_proto::settings::MusicBioSettings;

    struct Harness {
        tx: mpsc::Sender<DaemonEvent>,
        provider: Arc<FakeProvider>,
        client: Arc<FakeClient>,
        source: Arc<FakeSource>,
        store: MemoryStore,
        activity: ActivityLog,
        shutdown: CancellationToken,
        handle: tokio::task::JoinHandle<anyhow::Result<()>>,
    }

    fn spawn_core(store: MemoryStore, provider: Arc<FakeProvider>) -> Harness {
        let client = Arc::new(FakeClient::default());
        let source = Arc::new(FakeSource::default());
        let activity = ActivityLog::new();
        let (tx, rx) = mpsc::channel(64);
        let monitor = ConnectionMonitor::new(provider.clone(), Duration::from_secs(1), activity.clone());
        let scheduler = SyncScheduler::new(
            Box::new(store.clone()),
            source.clone(),
            client.clone(),
            activity.clone(),
            tx.clone(),
            Duration::from_secs(2),
        );
        let core = DaemonCore::new(
            monitor,
            Duration::from_secs(5),
            scheduler,
            client.clone(),
            activity.clone(),
            tx.clone(),
            Duration::from_secs(2),
        );
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(core.run(rx, shutdown.clone()));
        Harness {
            tx,
            provider,
            client,
            source,
            store,
            activity,
            shutdown,
            handle,
        }
    }

    fn connected_provider() -> Arc<FakeProvider> {
        let provider = Arc::new(FakeProvider::default());
        provider.set(Some(connection()));
        provider
    }

    async fn ask<T>(
        tx: &mpsc::Sender<DaemonEvent>,
        make: impl FnOnce(Responder<T>) -> ControlCommand,
    ) -> Result<T, SyncError> {
        let (reply, rx) = oneshot::channel();
        tx.send(DaemonEvent::Control(make(reply))).await.unwrap();
        rx.await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_connection_and_masks_key() {
        let store = MemoryStore::with(MusicBioSettings {
            lastfm_api_key: "abcdef123456".to_string(),
            ..credentials()
        });
        let h = spawn_core(store, connected_provider());

        let status = ask(&h.tx, ControlCommand::Status).await.unwrap();
        assert!(status.connected);
        assert_eq!(status.sync_state, SyncState::Disabled);
        assert_eq!(status.settings.lastfm_api_key, "********3456");
        assert_eq!(status.last_published, None);

        h.shutdown.cancel();
        h.handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_enable_then_ticks_publish_track() {
        let h = spawn_core(MemoryStore::with(credentials()), connected_provider());
        h.source.set(Ok(Some(track("Song"))));

        let status = ask(&h.tx, ControlCommand::Enable).await.unwrap();
        assert_eq!(status.sync_state, SyncState::EnabledIdle);
        assert_eq!(h.client.bios(), vec!["idle".to_string()]);

        // Default interval is 15 s; three ticks of the same track publish once.
        tokio::time::sleep(Duration::from_secs(46)).await;
        let status = ask(&h.tx, ControlCommand::Status).await.unwrap();
        assert_eq!(status.sync_state, SyncState::EnabledActive);
        assert_eq!(h.client.bios(), vec!["idle".to_string(), "Song by Artist".to_string()]);
        assert_eq!(h.source.fetches(), 3);

        h.tx.send(DaemonEvent::Shutdown).await.unwrap();
        h.handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_change_restarts_polling() {
        let h = spawn_core(MemoryStore::with(credentials()), connected_provider());
        h.source.set(Ok(Some(track("Song"))));
        ask(&h.tx, ControlCommand::Enable).await.unwrap();

        // t=3: 15 s -> 5 s. New ticks land at 8, 13, 18, ... and the old
        // schedule (15, 30) must never fire.
        tokio::time::sleep(Duration::from_secs(3)).await;
        let edit = SettingsEdit {
            poll_interval_sec: Some(5.0),
            ..SettingsEdit::default()
        };
        let status = ask(&h.tx, |r| ControlCommand::UpdateSettings(edit, r)).await.unwrap();
        assert_eq!(status.settings.poll_interval_sec, 5);
        assert_eq!(h.source.fetches(), 0);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(h.source.fetches(), 1);

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(h.source.fetches(), 2);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(h.source.fetches(), 5);
        assert_eq!(h.client.bios(), vec!["idle".to_string(), "Song by Artist".to_string()]);

        h.shutdown.cancel();
        h.handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_stops_ticks() {
        let h = spawn_core(MemoryStore::with(credentials()), connected_provider());
        ask(&h.tx, ControlCommand::Enable).await.unwrap();
        let status = ask(&h.tx, ControlCommand::Disable).await.unwrap();
        assert_eq!(status.sync_state, SyncState::Disabled);
        assert!(!h.store.saved().unwrap().enabled);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.source.fetches(), 0);
        assert_eq!(h.client.bios(), vec!["idle".to_string(), "idle".to_string()]);

        h.shutdown.cancel();
        h.handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_persisted_enabled_resumes_on_start() {
        let store = MemoryStore::with(MusicBioSettings {
            enabled: true,
            ..credentials()
        });
        let h = spawn_core(store, connected_provider());
        let status = ask(&h.tx, ControlCommand::Status).await.unwrap();
        assert_eq!(status.sync_state, SyncState::EnabledIdle);
        assert_eq!(h.client.bios(), vec!["idle".to_string()]);

        h.shutdown.cancel();
        h.handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_gates_publishing_until_reconnect() {
        let provider = connected_provider();
        let h = spawn_core(MemoryStore::with(credentials()), provider.clone());
        ask(&h.tx, ControlCommand::Enable).await.unwrap();
        h.source.set(Ok(Some(track("Song"))));

        h.provider.set(None);
        tokio::time::sleep(Duration::from_secs(61)).await;
        let status = ask(&h.tx, ControlCommand::Status).await.unwrap();
        assert!(!status.connected);
        assert_eq!(h.client.bios(), vec!["idle".to_string()]);
        assert_eq!(h.source.fetches(), 0);

        provider.set(Some(connection()));
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(h.source.fetches(), 1);
        assert_eq!(h.client.bios(), vec!["idle".to_string(), "Song by Artist".to_string()]);

        h.shutdown.cancel();
        h.handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_actions() {
        let h = spawn_core(MemoryStore::default(), connected_provider());

        ask(&h.tx, |r| ControlCommand::ApplyBio("  hello  ".into(), r)).await.unwrap();
        assert_eq!(h.client.bios(), vec!["hello".to_string()]);

        let err = ask(&h.tx, |r| ControlCommand::ApplyBio("   ".into(), r)).await.unwrap_err();
        assert!(matches!(err, SyncError::ConfigurationInvalid(_)));

        ask(&h.tx, |r| ControlCommand::OverrideRank(RankTier::Diamond, Division::I, r))
            .await
            .unwrap();
        assert_eq!(*h.client.ranks.lock().unwrap(), vec![(RankTier::Diamond, Division::I)]);

        ask(&h.tx, |r| ControlCommand::SetAvailability(Availability::Dnd, r)).await.unwrap();
        assert_eq!(ask(&h.tx, ControlCommand::GetAvailability).await.unwrap(), Availability::Dnd);

        h.client.fail(true);
        assert!(ask(&h.tx, |r| ControlCommand::ApplyBio("x".into(), r)).await.is_err());

        let msgs: Vec<String> = h.activity.entries().into_iter().map(|e| e.msg).collect();
        assert!(msgs[0].starts_with("Error updating bio:"));
        assert!(msgs.contains(&"Bio updated: \"hello\"".to_string()));
        assert!(msgs.contains(&"Rank override: DIAMOND I".to_string()));

        h.shutdown.cancel();
        h.handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_actions_need_client() {
        let h = spawn_core(MemoryStore::default(), Arc::new(FakeProvider::default()));
        let err = ask(&h.tx, |r| ControlCommand::ApplyBio("hello".into(), r)).await.unwrap_err();
        assert_eq!(err, SyncError::Unreachable);
        let err = ask(&h.tx, ControlCommand::GetAvailability).await.unwrap_err();
        assert_eq!(err, SyncError::Unreachable);
        assert!(h.client.bios().is_empty());

        h.shutdown.cancel();
        h.handle.await.unwrap().unwrap();
    }
}
