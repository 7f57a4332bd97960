//! Recording fakes for the daemon's I/O seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use profile_proto::protocol::{Availability, ConnectionInfo, Division, RankTier, Track};
use profile_proto::settings::{MusicBioSettings, SettingsStore};

use crate::error::SyncError;
use crate::lastfm::TrackSource;
use crate::lcu::{ConnectionProvider, GameClient};

#[derive(Default)]
pub struct FakeProvider {
    info: Mutex<Option<ConnectionInfo>>,
    hang: AtomicBool,
}

impl FakeProvider {
    pub fn set(&self, info: Option<ConnectionInfo>) {
        *self.info.lock().unwrap() = info;
    }

    pub fn hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionProvider for FakeProvider {
    async fn connection_info(&self) -> anyhow::Result<ConnectionInfo> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.info
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no lockfile found"))
    }
}

pub struct FakeClient {
    pub bios: Mutex<Vec<String>>,
    pub ranks: Mutex<Vec<(RankTier, Division)>>,
    pub availability: Mutex<Availability>,
    fail: AtomicBool,
    hang: AtomicBool,
}

impl Default for FakeClient {
    fn default() -> Self {
        Self {
            bios: Mutex::new(Vec::new()),
            ranks: Mutex::new(Vec::new()),
            availability: Mutex::new(Availability::Chat),
            fail: AtomicBool::new(false),
            hang: AtomicBool::new(false),
        }
    }
}

impl FakeClient {
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    /// Every bio publish attempt, successful or not.
    pub fn bios(&self) -> Vec<String> {
        self.bios.lock().unwrap().clone()
    }

    async fn outcome(&self) -> Result<(), SyncError> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(SyncError::Transient("client returned 500".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl GameClient for FakeClient {
    async fn publish_bio(&self, _info: &ConnectionInfo, text: &str) -> Result<(), SyncError> {
        self.bios.lock().unwrap().push(text.to_string());
        self.outcome().await
    }

    async fn publish_rank(
        &self,
        _info: &ConnectionInfo,
        tier: RankTier,
        division: Division,
    ) -> Result<(), SyncError> {
        self.ranks.lock().unwrap().push((tier, division));
        self.outcome().await
    }

    async fn availability(&self, _info: &ConnectionInfo) -> Result<Availability, SyncError> {
        self.outcome().await?;
        Ok(*self.availability.lock().unwrap())
    }

    async fn set_availability(
        &self,
        _info: &ConnectionInfo,
        availability: Availability,
    ) -> Result<(), SyncError> {
        self.outcome().await?;
        *self.availability.lock().unwrap() = availability;
        Ok(())
    }
}

/// Answers with queued responses first, then repeats `fallback`.
pub struct FakeSource {
    queue: Mutex<VecDeque<Result<Option<Track>, SyncError>>>,
    fallback: Mutex<Result<Option<Track>, SyncError>>,
    fetches: AtomicUsize,
}

impl Default for FakeSource {
    fn default() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(None)),
            fetches: AtomicUsize::new(0),
        }
    }
}

impl FakeSource {
    pub fn set(&self, response: Result<Option<Track>, SyncError>) {
        *self.fallback.lock().unwrap() = response;
    }

    pub fn push(&self, response: Result<Option<Track>, SyncError>) {
        self.queue.lock().unwrap().push_back(response);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrackSource for FakeSource {
    async fn fetch_current_track(
        &self,
        _username: &str,
        _api_key: &str,
    ) -> Result<Option<Track>, SyncError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.queue.lock().unwrap().pop_front() {
            return next;
        }
        self.fallback.lock().unwrap().clone()
    }
}

/// In-memory store; clones share the same record.
#[derive(Clone, Default)]
pub struct MemoryStore {
    record: Arc<Mutex<Option<MusicBioSettings>>>,
    fail: Arc<AtomicBool>,
    saves: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn with(settings: MusicBioSettings) -> Self {
        let store = Self::default();
        *store.record.lock().unwrap() = Some(settings);
        store
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn saved(&self) -> Option<MusicBioSettings> {
        self.record.lock().unwrap().clone()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> MusicBioSettings {
        self.saved().unwrap_or_default().sanitize()
    }

    fn save(&self, settings: &MusicBioSettings) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.record.lock().unwrap() = Some(settings.clone());
        Ok(())
    }
}

pub fn track(title: &str) -> Track {
    Track {
        title: title.to_string(),
        artist: "Artist".to_string(),
        album: "Album".to_string(),
        source_label: "Last.fm".to_string(),
    }
}

pub fn connection() -> ConnectionInfo {
    ConnectionInfo {
        port: "2999".to_string(),
        token: "secret".to_string(),
    }
}

pub fn credentials() -> MusicBioSettings {
    MusicBioSettings {
        lastfm_username: "tester".to_string(),
        lastfm_api_key: "key".to_string(),
        bio_template: "{title} by {artist}".to_string(),
        idle_text: "idle".to_string(),
        ..MusicBioSettings::default()
    }
}
