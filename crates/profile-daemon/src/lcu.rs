//! Game client ("LCU") transport.
//!
//! The client exposes a local HTTPS API with a self-signed certificate while
//! it runs. Port and password come from the lockfile it writes at startup;
//! requests authenticate as `riot:<password>`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use profile_proto::config::LcuConfig;
use profile_proto::platform;
use profile_proto::protocol::{Availability, ConnectionInfo, Division, RankTier};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::SyncError;

const CHAT_ME: &str = "/lol-chat/v1/me";
const SOLO_QUEUE: &str = "RANKED_SOLO_5x5";

/// Locates the running client.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Current session credentials. Any error means "not running".
    async fn connection_info(&self) -> anyhow::Result<ConnectionInfo>;
}

/// Writes to the profile of the signed-in player.
#[async_trait]
pub trait GameClient: Send + Sync {
    async fn publish_bio(&self, info: &ConnectionInfo, text: &str) -> Result<(), SyncError>;
    async fn publish_rank(
        &self,
        info: &ConnectionInfo,
        tier: RankTier,
        division: Division,
    ) -> Result<(), SyncError>;
    async fn availability(&self, info: &ConnectionInfo) -> Result<Availability, SyncError>;
    async fn set_availability(
        &self,
        info: &ConnectionInfo,
        availability: Availability,
    ) -> Result<(), SyncError>;
}

/// Parse `name:pid:port:password:protocol`.
pub fn parse_lockfile(content: &str) -> anyhow::Result<ConnectionInfo> {
    let parts: Vec<&str> = content.trim().splitn(5, ':').collect();
    let [_name, _pid, port, token, _protocol] = parts.as_slice() else {
        anyhow::bail!("lockfile has {} fields, expected 5", parts.len());
    };
    port.parse::<u16>()
        .with_context(|| format!("lockfile port {:?} is not a port number", port))?;
    if token.is_empty() {
        anyhow::bail!("lockfile has an empty password");
    }
    Ok(ConnectionInfo {
        port: port.to_string(),
        token: token.to_string(),
    })
}

/// Finds the lockfile, then checks something is listening on its port. A
/// client that crashed or was killed leaves the lockfile behind.
pub struct LockfileProvider {
    candidates: Vec<PathBuf>,
    host: String,
    connect_timeout: Duration,
}

impl LockfileProvider {
    pub fn new(config: &LcuConfig) -> Self {
        let candidates = match &config.lockfile_path {
            Some(path) => vec![path.clone()],
            None => platform::lockfile_candidates(),
        };
        let host = reqwest::Url::parse(&config.host)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "127.0.0.1".to_string());
        Self {
            candidates,
            host,
            connect_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    async fn ensure_listening(&self, info: &ConnectionInfo) -> anyhow::Result<()> {
        let port: u16 = info.port.parse()?;
        let addr = (self.host.as_str(), port);
        tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .with_context(|| format!("connecting to {}:{} timed out", self.host, port))?
            .with_context(|| format!("stale lockfile: nothing listening on {}:{}", self.host, port))?;
        Ok(())
    }
}

#[async_trait]
impl ConnectionProvider for LockfileProvider {
    async fn connection_info(&self) -> anyhow::Result<ConnectionInfo> {
        for path in &self.candidates {
            match tokio::fs::read_to_string(path).await {
                Ok(content) => {
                    let info = parse_lockfile(&content)
                        .with_context(|| format!("reading {}", path.display()))?;
                    self.ensure_listening(&info).await?;
                    return Ok(info);
                }
                Err(e) => debug!("[lcu] lockfile {:?} unavailable: {}", path, e),
            }
        }
        anyhow::bail!("no lockfile found")
    }
}

#[derive(Debug, Deserialize)]
struct ChatMe {
    availability: Availability,
}

pub struct LcuClient {
    http: reqwest::Client,
    host: String,
}

impl LcuClient {
    pub fn new(config: &LcuConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            http,
            host: config.host.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, info: &ConnectionInfo, path: &str) -> String {
        format!("{}:{}{}", self.host, info.port, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, SyncError> {
        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                SyncError::Unreachable
            } else {
                SyncError::transient(e)
            }
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SyncError::Transient(format!(
            "client returned {}: {}",
            status,
            body.trim()
        )))
    }

    async fn put_chat_me(
        &self,
        info: &ConnectionInfo,
        body: serde_json::Value,
    ) -> Result<(), SyncError> {
        let request = self
            .http
            .put(self.url(info, CHAT_ME))
            .basic_auth("riot", Some(&info.token))
            .json(&body);
        self.send(request).await.map(|_| ())
    }
}

#[async_trait]
impl GameClient for LcuClient {
    async fn publish_bio(&self, info: &ConnectionInfo, text: &str) -> Result<(), SyncError> {
        self.put_chat_me(info, json!({ "statusMessage": text })).await
    }

    async fn publish_rank(
        &self,
        info: &ConnectionInfo,
        tier: RankTier,
        division: Division,
    ) -> Result<(), SyncError> {
        self.put_chat_me(
            info,
            json!({
                "lol": {
                    "rankedLeagueTier": tier.as_str(),
                    "rankedLeagueDivision": division.as_str(),
                    "rankedLeagueQueue": SOLO_QUEUE,
                }
            }),
        )
        .await
    }

    async fn availability(&self, info: &ConnectionInfo) -> Result<Availability, SyncError> {
        let request = self
            .http
            .get(self.url(info, CHAT_ME))
            .basic_auth("riot", Some(&info.token));
        let me: ChatMe = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| SyncError::Transient(format!("unexpected chat profile: {}", e)))?;
        Ok(me.availability)
    }

    async fn set_availability(
        &self,
        info: &ConnectionInfo,
        availability: Availability,
    ) -> Result<(), SyncError> {
        self.put_chat_me(info, json!({ "availability": availability.as_str() }))
            .await
    }
}
