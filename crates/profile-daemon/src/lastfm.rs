//! Last.fm client: answers "what is this user playing right now?"

use std::time::Duration;

use async_trait::async_trait;
use profile_proto::config::LastfmConfig;
use profile_proto::protocol::Track;
use serde::Deserialize;
use tracing::debug;

use crate::error::SyncError;

/// Listening-history lookup used by the scheduler.
#[async_trait]
pub trait TrackSource: Send + Sync {
    /// The track currently playing, or `None` when nothing is.
    async fn fetch_current_track(
        &self,
        username: &str,
        api_key: &str,
    ) -> Result<Option<Track>, SyncError>;

    /// One fetch attempt; success means the account is usable whether or
    /// not anything is playing.
    async fn validate_credentials(&self, username: &str, api_key: &str) -> Result<(), SyncError> {
        self.fetch_current_track(username, api_key).await.map(|_| ())
    }
}

// Error codes that mean the account itself is the problem rather than the
// service: invalid parameters (unknown user), auth failed, invalid key,
// login required (private profile), suspended key.
const CREDENTIAL_ERROR_CODES: &[i64] = &[4, 6, 10, 17, 26];

#[derive(Debug, Deserialize)]
struct Envelope {
    recenttracks: Option<RecentTracks>,
    error: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecentTracks {
    #[serde(default)]
    track: OneOrMany<RawTrack>,
}

/// The API returns a bare object instead of an array when there is exactly
/// one track.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(v) => v,
            Self::One(t) => vec![t],
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    #[serde(default)]
    name: String,
    #[serde(default)]
    artist: TextField,
    #[serde(default)]
    album: TextField,
    #[serde(rename = "@attr", default)]
    attr: Option<TrackAttr>,
}

#[derive(Debug, Default, Deserialize)]
struct TextField {
    #[serde(rename = "#text", default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct TrackAttr {
    #[serde(default)]
    nowplaying: Option<String>,
}

impl RawTrack {
    fn is_now_playing(&self) -> bool {
        self.attr
            .as_ref()
            .and_then(|a| a.nowplaying.as_deref())
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

pub struct LastfmClient {
    http: reqwest::Client,
    api_base: String,
    source_label: String,
}

impl LastfmClient {
    pub fn new(config: &LastfmConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("profile-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base.clone(),
            source_label: config.source_label.clone(),
        })
    }

    fn parse(&self, status: reqwest::StatusCode, body: &str) -> Result<Option<Track>, SyncError> {
        let envelope: Envelope = serde_json::from_str(body).map_err(|e| {
            SyncError::Transient(format!("malformed Last.fm response ({}): {}", status, e))
        })?;

        if let Some(code) = envelope.error {
            let message = envelope
                .message
                .unwrap_or_else(|| format!("error {}", code));
            return Err(if CREDENTIAL_ERROR_CODES.contains(&code) {
                SyncError::CredentialInvalid(message)
            } else {
                SyncError::Transient(format!("Last.fm error {}: {}", code, message))
            });
        }

        if !status.is_success() {
            return Err(SyncError::Transient(format!("Last.fm returned {}", status)));
        }

        let recent = envelope.recenttracks.ok_or_else(|| {
            SyncError::Transient("malformed Last.fm response: no recenttracks".to_string())
        })?;

        let track = recent
            .track
            .into_vec()
            .into_iter()
            .find(|t| t.is_now_playing() && !t.name.trim().is_empty())
            .map(|t| Track {
                title: t.name.trim().to_string(),
                artist: t.artist.text.trim().to_string(),
                album: t.album.text.trim().to_string(),
                source_label: self.source_label.clone(),
            });
        Ok(track)
    }
}

#[async_trait]
impl TrackSource for LastfmClient {
    async fn fetch_current_track(
        &self,
        username: &str,
        api_key: &str,
    ) -> Result<Option<Track>, SyncError> {
        if username.trim().is_empty() || api_key.trim().is_empty() {
            return Err(SyncError::ConfigurationInvalid(
                "Complete account fields first".to_string(),
            ));
        }

        let response = self
            .http
            .get(&self.api_base)
            .query(&[
                ("method", "user.getrecenttracks"),
                ("user", username.trim()),
                ("api_key", api_key.trim()),
                ("format", "json"),
                ("limit", "1"),
            ])
            .send()
            .await
            .map_err(SyncError::transient)?;

        let status = response.status();
        let body = response.text().await.map_err(SyncError::transient)?;
        let track = self.parse(status, &body)?;
        debug!("[lastfm] {} now playing: {:?}", username, track);
        Ok(track)
    }
}
