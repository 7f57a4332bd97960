//! Game client reachability, edge-triggered.

use std::sync::Arc;
use std::time::Duration;

use profile_proto::activity::ActivityLog;
use profile_proto::protocol::ConnectionInfo;
use tracing::debug;

use crate::lcu::ConnectionProvider;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Reachability {
    Unreachable,
    Reachable(ConnectionInfo),
}

/// Emitted only when reachability actually changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// A client session appeared, or replaced a previous one.
    Connected(ConnectionInfo),
    Disconnected,
}

pub struct ConnectionMonitor {
    provider: Arc<dyn ConnectionProvider>,
    state: Reachability,
    timeout: Duration,
    activity: ActivityLog,
}

impl ConnectionMonitor {
    pub fn new(provider: Arc<dyn ConnectionProvider>, timeout: Duration, activity: ActivityLog) -> Self {
        Self {
            provider,
            state: Reachability::Unreachable,
            timeout,
            activity,
        }
    }

    pub fn current(&self) -> Option<&ConnectionInfo> {
        match &self.state {
            Reachability::Reachable(info) => Some(info),
            Reachability::Unreachable => None,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.current().is_some()
    }

    /// Ask the provider once. Errors and timeouts count as unreachable and
    /// never escape.
    pub async fn poll(&mut self) -> Option<Transition> {
        let observed = match tokio::time::timeout(self.timeout, self.provider.connection_info()).await {
            Ok(Ok(info)) => Some(info),
            Ok(Err(e)) => {
                debug!("[monitor] client not reachable: {:#}", e);
                None
            }
            Err(_) => {
                debug!("[monitor] discovery timed out");
                None
            }
        };
        self.observe(observed)
    }

    fn observe(&mut self, observed: Option<ConnectionInfo>) -> Option<Transition> {
        match observed {
            None => {
                if !self.is_reachable() {
                    return None;
                }
                self.state = Reachability::Unreachable;
                self.activity.record("League of Legends client disconnected.");
                Some(Transition::Disconnected)
            }
            Some(info) => {
                match self.current() {
                    Some(current) if *current == info => return None,
                    Some(_) => self.activity.record("League of Legends client session changed."),
                    None => self.activity.record("League of Legends client detected."),
                }
                self.state = Reachability::Reachable(info.clone());
                Some(Transition::Connected(info))
            }
        }
    }
}
