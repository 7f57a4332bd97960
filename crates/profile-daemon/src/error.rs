use thiserror::Error;

/// Failure kinds the sync core distinguishes. Timer-driven work only logs
/// these; user-initiated actions hand them back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The game client is not running. Expected, and gates publishing.
    #[error("League client is not running")]
    Unreachable,
    /// The listening-history service rejected the username or API key.
    #[error("Last.fm rejected the account: {0}")]
    CredentialInvalid(String),
    /// A fetch or publish failed or timed out; the next cycle retries.
    #[error("network error: {0}")]
    Transient(String),
    /// The request cannot be honoured with the current settings.
    #[error("{0}")]
    ConfigurationInvalid(String),
    /// Settings or log files could not be written.
    #[error("could not save: {0}")]
    Persistence(String),
}

impl SyncError {
    pub fn transient(err: impl std::fmt::Display) -> Self {
        Self::Transient(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for SyncError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Transient("request timed out".to_string())
    }
}
