use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::template::{clamp_poll_interval, normalize_username, DEFAULT_POLL_INTERVAL_SEC};

/// Record name inside the settings file. Bump the suffix when the shape
/// changes incompatibly; old records are then ignored rather than misread.
pub const SETTINGS_KEY: &str = "music_bio_settings_v1";

pub const DEFAULT_BIO_TEMPLATE: &str = "Listening to {title} by {artist}";
pub const DEFAULT_IDLE_BIO: &str = "Not listening to anything right now";

/// User-editable music bio configuration. One instance per process, owned by
/// the sync scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicBioSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub lastfm_username: String,
    #[serde(default)]
    pub lastfm_api_key: String,
    #[serde(
        default = "default_poll_interval",
        deserialize_with = "deserialize_poll_interval"
    )]
    pub poll_interval_sec: u32,
    #[serde(default = "default_bio_template")]
    pub bio_template: String,
    #[serde(default = "default_idle_text")]
    pub idle_text: String,
}

fn default_poll_interval() -> u32 {
    DEFAULT_POLL_INTERVAL_SEC
}

fn default_bio_template() -> String {
    DEFAULT_BIO_TEMPLATE.to_string()
}

fn default_idle_text() -> String {
    DEFAULT_IDLE_BIO.to_string()
}

fn deserialize_poll_interval<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw.map(clamp_poll_interval).unwrap_or(DEFAULT_POLL_INTERVAL_SEC))
}

impl Default for MusicBioSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            lastfm_username: String::new(),
            lastfm_api_key: String::new(),
            poll_interval_sec: default_poll_interval(),
            bio_template: default_bio_template(),
            idle_text: default_idle_text(),
        }
    }
}

impl MusicBioSettings {
    pub fn has_credentials(&self) -> bool {
        !self.lastfm_username.trim().is_empty() && !self.lastfm_api_key.trim().is_empty()
    }

    /// Apply the field rules every stored record must satisfy: normalized
    /// username, trimmed key, clamped interval, and never enabled without
    /// credentials.
    pub fn sanitize(mut self) -> Self {
        self.lastfm_username = normalize_username(&self.lastfm_username);
        self.lastfm_api_key = self.lastfm_api_key.trim().to_string();
        self.poll_interval_sec = clamp_poll_interval(self.poll_interval_sec as f64);
        if self.enabled && !self.has_credentials() {
            self.enabled = false;
        }
        self
    }

    /// Copy safe to hand to a UI: the API key keeps only its last four
    /// characters.
    pub fn masked(&self) -> Self {
        let key = &self.lastfm_api_key;
        let visible: String = key
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let hidden = key.chars().count().saturating_sub(4);
        Self {
            lastfm_api_key: format!("{}{}", "*".repeat(hidden), visible),
            ..self.clone()
        }
    }
}

/// Persistence seam for [`MusicBioSettings`].
///
/// `save` must have reached the backing store when it returns, so a disable
/// followed by process exit keeps `enabled = false`.
pub trait SettingsStore: Send + Sync {
    /// Load the stored record, or defaults when there is none or it is
    /// unreadable. The result is already sanitized.
    fn load(&self) -> MusicBioSettings;
    fn save(&self, settings: &MusicBioSettings) -> anyhow::Result<()>;
}

/// JSON file holding a small key/value map; the settings live under
/// [`SETTINGS_KEY`]. Other keys are preserved on save.
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> serde_json::Map<String, serde_json::Value> {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return serde_json::Map::new();
        };
        match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!("Settings file {:?} is not a JSON object; ignoring it", self.path);
                serde_json::Map::new()
            }
        }
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> MusicBioSettings {
        let mut map = self.read_map();
        let Some(record) = map.remove(SETTINGS_KEY) else {
            return MusicBioSettings::default();
        };
        match serde_json::from_value::<MusicBioSettings>(record) {
            Ok(settings) => settings.sanitize(),
            Err(e) => {
                warn!("Stored music bio settings unreadable ({}); using defaults", e);
                MusicBioSettings::default()
            }
        }
    }

    fn save(&self, settings: &MusicBioSettings) -> anyhow::Result<()> {
        let mut map = self.read_map();
        map.insert(SETTINGS_KEY.to_string(), serde_json::to_value(settings)?);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&serde_json::Value::Object(map))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
