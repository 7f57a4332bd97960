//! Music bio sync engine.
//!
//! Owns the persisted [`MusicBioSettings`], the poll timer and the record of
//! what was last written to the profile. Every settings mutation goes through
//! [`SyncScheduler::persist`].
//!
//! All methods run on the core event loop, one at a time, so a tick's fetch
//! and publish always settle before the next event is looked at.

use std::sync::Arc;
use std::time::Duration;

use profile_proto::activity::ActivityLog;
use profile_proto::protocol::{ConnectionInfo, SettingsEdit, SetupReport, SyncState, Track};
use profile_proto::settings::{MusicBioSettings, SettingsStore};
use profile_proto::template::{build_bio_from_template, clamp_poll_interval, normalize_username, truncate_bio};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::DaemonEvent;
use crate::error::SyncError;
use crate::lastfm::TrackSource;
use crate::lcu::GameClient;
use crate::monitor::Transition;
use crate::timer::Ticker;

const MISSING_CREDENTIALS: &str = "Complete account fields first";

pub struct SyncScheduler {
    settings: MusicBioSettings,
    store: Box<dyn SettingsStore>,
    source: Arc<dyn TrackSource>,
    client: Arc<dyn GameClient>,
    activity: ActivityLog,
    state: SyncState,
    /// Exact text of the last successful publish. Cleared when a new client
    /// session appears so the next tick writes again.
    last_published: Option<String>,
    timer: Ticker,
    events: mpsc::Sender<DaemonEvent>,
    call_timeout: Duration,
}

impl SyncScheduler {
    pub fn new(
        store: Box<dyn SettingsStore>,
        source: Arc<dyn TrackSource>,
        client: Arc<dyn GameClient>,
        activity: ActivityLog,
        events: mpsc::Sender<DaemonEvent>,
        call_timeout: Duration,
    ) -> Self {
        let settings = store.load();
        Self {
            settings,
            store,
            source,
            client,
            activity,
            state: SyncState::Disabled,
            last_published: None,
            timer: Ticker::new(),
            events,
            call_timeout,
        }
    }

    pub fn settings(&self) -> &MusicBioSettings {
        &self.settings
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn last_published(&self) -> Option<&str> {
        self.last_published.as_deref()
    }

    pub fn is_polling(&self) -> bool {
        self.timer.is_running()
    }

    pub fn is_current_tick(&self, generation: u64) -> bool {
        self.timer.is_current(generation)
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Re-enter the persisted state at startup. A record saved as enabled
    /// starts polling and publishes the idle bio once if the client is up.
    pub async fn resume(&mut self, conn: Option<&ConnectionInfo>) {
        if !self.settings.enabled {
            return;
        }
        self.state = SyncState::EnabledIdle;
        self.activity.record("Music sync resumed.");
        if let Some(conn) = conn {
            let idle = self.idle_bio();
            let _ = self.publish(conn, idle).await;
        }
        self.start_timer();
    }

    /// User "enable". Publishes the idle bio immediately when the client is
    /// reachable, then starts polling.
    pub async fn enable(&mut self, conn: Option<&ConnectionInfo>) -> Result<SyncState, SyncError> {
        if self.state.is_enabled() {
            return Ok(self.state);
        }
        if !self.settings.has_credentials() {
            return Err(SyncError::ConfigurationInvalid(MISSING_CREDENTIALS.to_string()));
        }

        self.settings.enabled = true;
        if let Err(e) = self.persist() {
            self.settings.enabled = false;
            return Err(e);
        }
        self.state = SyncState::EnabledIdle;
        self.last_published = None;
        self.activity.record("Music sync enabled.");

        if let Some(conn) = conn {
            let idle = self.idle_bio();
            let _ = self.publish(conn, idle).await;
        }
        self.start_timer();
        Ok(self.state)
    }

    /// User "disable". The timer is stopped and `enabled = false` saved
    /// before the courtesy idle publish, so neither a failed publish nor an
    /// exit right after can leave the engine enabled on disk.
    pub async fn disable(&mut self, conn: Option<&ConnectionInfo>) -> Result<(), SyncError> {
        if !self.state.is_enabled() && !self.settings.enabled {
            return Ok(());
        }
        self.timer.stop();
        self.settings.enabled = false;
        self.state = SyncState::Disabled;
        let saved = self.persist();
        self.activity.record("Music sync disabled.");

        if let Some(conn) = conn {
            let idle = self.idle_bio();
            // Best effort; failure is already in the activity log.
            let _ = self.publish(conn, idle).await;
        }
        saved
    }

    /// React to the connection monitor. A new session starts from scratch:
    /// whatever this engine wrote before may not be on the new client.
    pub fn on_connection(&mut self, transition: &Transition) {
        match transition {
            Transition::Connected(_) => self.last_published = None,
            Transition::Disconnected => {
                if self.state.is_enabled() {
                    debug!("[sync] client gone; ticks will skip until it returns");
                }
            }
        }
    }

    /// One poll cycle. Never fails outward: every error is logged and the
    /// next tick retries.
    pub async fn tick(&mut self, conn: Option<&ConnectionInfo>) {
        if !self.state.is_enabled() {
            return;
        }
        let Some(conn) = conn else {
            debug!("[sync] tick skipped, client not reachable");
            return;
        };

        let fetched = self.fetch().await;
        match fetched {
            Err(e) => {
                self.activity.record(format!("Music sync: could not read Last.fm: {}", e));
            }
            Ok(Some(track)) => {
                let bio = build_bio_from_template(&self.settings.bio_template, &track);
                if self.last_published.as_deref() == Some(bio.as_str()) {
                    return;
                }
                if self.publish(conn, bio).await.is_ok() {
                    self.state = SyncState::EnabledActive;
                }
            }
            Ok(None) => {
                let idle = self.idle_bio();
                if self.last_published.as_deref() == Some(idle.as_str()) {
                    self.state = SyncState::EnabledIdle;
                    return;
                }
                if self.publish(conn, idle).await.is_ok() {
                    self.state = SyncState::EnabledIdle;
                }
            }
        }
    }

    // ── Settings ──────────────────────────────────────────────────────────────

    /// Apply a front-end edit through the single mutation path.
    pub async fn update_settings(
        &mut self,
        edit: SettingsEdit,
        conn: Option<&ConnectionInfo>,
    ) -> Result<(), SyncError> {
        let previous_interval = self.settings.poll_interval_sec;

        if let Some(username) = edit.lastfm_username {
            self.settings.lastfm_username = normalize_username(&username);
        }
        if let Some(key) = edit.lastfm_api_key {
            let key = key.trim();
            // The status snapshot only carries the masked key; echoing it
            // back means "unchanged".
            if !(key.contains('*') && key == self.settings.masked().lastfm_api_key) {
                self.settings.lastfm_api_key = key.to_string();
            }
        }
        if let Some(raw) = edit.poll_interval_sec {
            self.settings.poll_interval_sec = clamp_poll_interval(raw);
        }
        if let Some(template) = edit.bio_template {
            self.settings.bio_template = template;
        }
        if let Some(idle) = edit.idle_text {
            self.settings.idle_text = idle;
        }

        if self.state.is_enabled() && !self.settings.has_credentials() {
            self.activity
                .record("Music sync stopped: Last.fm account fields were cleared.");
            return self.disable(conn).await;
        }

        self.persist()?;
        if self.state.is_enabled() && previous_interval != self.settings.poll_interval_sec {
            self.start_timer();
        }
        Ok(())
    }

    /// Explicit "test setup": one credential check, reported distinctly
    /// from "nothing playing". Rejected credentials switch the engine off.
    pub async fn test_setup(&mut self, conn: Option<&ConnectionInfo>) -> Result<SetupReport, SyncError> {
        if !self.settings.has_credentials() {
            return Err(SyncError::ConfigurationInvalid(MISSING_CREDENTIALS.to_string()));
        }

        match self.fetch().await {
            Ok(Some(track)) => {
                let preview = build_bio_from_template(&self.settings.bio_template, &track);
                self.activity.record(format!(
                    "Last.fm check passed: now playing {} by {}",
                    track.title, track.artist
                ));
                Ok(SetupReport::Playing { track, preview })
            }
            Ok(None) => {
                self.activity.record("Last.fm check passed: nothing playing.");
                Ok(SetupReport::NotPlaying)
            }
            Err(e) => {
                self.activity.record(format!("Last.fm check failed: {}", e));
                if matches!(e, SyncError::CredentialInvalid(_)) && self.state.is_enabled() {
                    // The credential error stays the answer; a failed save
                    // only means the next launch starts enabled again.
                    if let Err(save_err) = self.disable(conn).await {
                        warn!("Music sync stopped but the disable was not saved: {}", save_err);
                    }
                }
                Err(e)
            }
        }
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn idle_bio(&self) -> String {
        truncate_bio(&self.settings.idle_text)
    }

    fn start_timer(&mut self) {
        let period = Duration::from_secs(self.settings.poll_interval_sec as u64);
        self.timer
            .start(period, self.events.clone(), |generation| DaemonEvent::SyncTick { generation });
        debug!("[sync] polling every {:?}", period);
    }

    fn persist(&mut self) -> Result<(), SyncError> {
        self.store.save(&self.settings).map_err(|e| {
            self.activity
                .record(format!("Could not save music bio settings: {:#}", e));
            SyncError::Persistence(e.to_string())
        })
    }

    async fn fetch(&self) -> Result<Option<Track>, SyncError> {
        let username = &self.settings.lastfm_username;
        let api_key = &self.settings.lastfm_api_key;
        tokio::time::timeout(
            self.call_timeout,
            self.source.fetch_current_track(username, api_key),
        )
        .await?
    }

    async fn publish(&mut self, conn: &ConnectionInfo, text: String) -> Result<(), SyncError> {
        let result = match tokio::time::timeout(self.call_timeout, self.client.publish_bio(conn, &text)).await {
            Ok(result) => result,
            Err(elapsed) => Err(elapsed.into()),
        };
        match &result {
            Ok(()) => {
                self.activity.record(format!("Bio updated: \"{}\"", text));
                self.last_published = Some(text);
            }
            Err(e) => {
                self.activity.record(format!("Error updating bio: {}", e));
            }
        }
        result
    }
}
