use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::activity::LogEntry;
use crate::settings::MusicBioSettings;

/// Credentials for one game-client session, read from its lockfile.
/// Always replaced as a pair; a token from one session is never combined
/// with the port of another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub port: String,
    pub token: String,
}

/// The track a listening-history service reports as playing right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub source_label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RankTier {
    Iron,
    Bronze,
    Silver,
    Gold,
    Platinum,
    Emerald,
    Diamond,
    Master,
    Grandmaster,
    Challenger,
}

impl RankTier {
    pub const ALL: [RankTier; 10] = [
        Self::Iron,
        Self::Bronze,
        Self::Silver,
        Self::Gold,
        Self::Platinum,
        Self::Emerald,
        Self::Diamond,
        Self::Master,
        Self::Grandmaster,
        Self::Challenger,
    ];

    /// Wire value expected by the chat endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Iron => "IRON",
            Self::Bronze => "BRONZE",
            Self::Silver => "SILVER",
            Self::Gold => "GOLD",
            Self::Platinum => "PLATINUM",
            Self::Emerald => "EMERALD",
            Self::Diamond => "DIAMOND",
            Self::Master => "MASTER",
            Self::Grandmaster => "GRANDMASTER",
            Self::Challenger => "CHALLENGER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Division {
    I,
    II,
    III,
    IV,
}

impl Division {
    pub const ALL: [Division; 4] = [Self::I, Self::II, Self::III, Self::IV];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::I => "I",
            Self::II => "II",
            Self::III => "III",
            Self::IV => "IV",
        }
    }
}

/// Chat presence shown to friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Chat,
    Away,
    Dnd,
    Mobile,
    Offline,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Away => "away",
            Self::Dnd => "dnd",
            Self::Mobile => "mobile",
            Self::Offline => "offline",
        }
    }
}

/// Sync engine lifecycle.
///
/// Transitions:
///   Disabled -> EnabledIdle (enable) -> EnabledActive (track published)
///   EnabledActive -> EnabledIdle (nothing playing)
///   Enabled* -> Disabled (disable, or credentials rejected/removed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SyncState {
    #[default]
    Disabled,
    EnabledIdle,
    EnabledActive,
}

impl SyncState {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

// ── Control API bodies ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub connected: bool,
    pub sync_state: SyncState,
    /// Settings with the API key masked.
    pub settings: MusicBioSettings,
    pub last_published: Option<String>,
}

/// A partial settings update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsEdit {
    #[serde(default)]
    pub lastfm_username: Option<String>,
    /// Sending back the masked key from a status snapshot leaves the key
    /// unchanged.
    #[serde(default)]
    pub lastfm_api_key: Option<String>,
    /// Raw numeric input; clamped before it is stored.
    #[serde(default)]
    pub poll_interval_sec: Option<f64>,
    #[serde(default)]
    pub bio_template: Option<String>,
    #[serde(default)]
    pub idle_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BioRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankRequest {
    pub tier: RankTier,
    pub division: Division,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityRequest {
    pub availability: Availability,
}

/// Outcome of an explicit credential check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum SetupReport {
    Playing { track: Track, preview: String },
    NotPlaying,
}

/// Exports always land in the configured export directory; the caller may
/// only choose the file name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportReport {
    pub path: PathBuf,
    pub entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsResponse {
    pub entries: Vec<LogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}
