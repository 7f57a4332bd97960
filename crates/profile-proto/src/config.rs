use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub lcu: LcuConfig,
    #[serde(default)]
    pub lastfm: LastfmConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Local control API used by the desktop front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Browser origins allowed to call the API. Requests carrying any other
    /// `Origin` header are refused.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

/// Game client discovery and transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LcuConfig {
    /// Explicit lockfile path. When unset the per-OS install locations are
    /// searched.
    #[serde(default)]
    pub lockfile_path: Option<PathBuf>,
    /// Scheme and host of the local API; the port comes from the lockfile.
    #[serde(default = "default_lcu_host")]
    pub host: String,
    #[serde(default = "default_lcu_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_lcu_timeout")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastfmConfig {
    #[serde(default = "default_lastfm_api_base")]
    pub api_base: String,
    /// Substituted for `{source}` in bio templates.
    #[serde(default = "default_source_label")]
    pub source_label: String,
    #[serde(default = "default_lastfm_timeout")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Persisted music-bio settings.
    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,
    /// Where exported activity logs land when no path is given.
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for LcuConfig {
    fn default() -> Self {
        Self {
            lockfile_path: None,
            host: default_lcu_host(),
            poll_interval_secs: default_lcu_poll_interval(),
            request_timeout_ms: default_lcu_timeout(),
        }
    }
}

impl Default for LastfmConfig {
    fn default() -> Self {
        Self {
            api_base: default_lastfm_api_base(),
            source_label: default_source_label(),
            request_timeout_ms: default_lastfm_timeout(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            settings_file: default_settings_file(),
            export_dir: default_export_dir(),
        }
    }
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_allowed_origins() -> Vec<String> {
    // Tauri webview origins (macOS/Linux, then Windows)
    vec![
        "tauri://localhost".to_string(),
        "http://tauri.localhost".to_string(),
    ]
}

fn default_lcu_host() -> String {
    "https://127.0.0.1".to_string()
}

fn default_lcu_poll_interval() -> u64 {
    5
}

fn default_lcu_timeout() -> u64 {
    4000
}

fn default_lastfm_api_base() -> String {
    "https://ws.audioscrobbler.com/2.0/".to_string()
}

fn default_source_label() -> String {
    "Last.fm".to_string()
}

fn default_lastfm_timeout() -> u64 {
    8000
}

fn default_settings_file() -> PathBuf {
    platform::data_dir().join("settings.json")
}

fn default_export_dir() -> PathBuf {
    platform::data_dir().join("exports")
}

impl Config {
    /// Read `config.toml`, writing the defaults out on first run.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path();
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save()?;
                Ok(config)
            }
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, toml::to_string_pretty(self)?)
            .with_context(|| format!("writing {}", path.display()))
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
