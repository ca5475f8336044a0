//! Replication with a server over WebSocket.

use super::PeerKind;
use crate::database::Database;
use crate::engine::{EngineDelegate, EngineFactory, EngineRequest, PeerEndpoint, SyncEngine};
use crate::error::{ReplicatorError, ReplicatorResult};
use crate::options::ReplicatorOptions;
use crate::replicator::Session;
use crate::status::{ActivityLevel, StatusFlags};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::info;
use url::Url;

/// Attempts allowed after a transient failure of a one-shot replication.
pub const MAX_ONE_SHOT_RETRIES: u32 = 2;

/// A peer reached over the network.
///
/// After a transient failure the session goes `Offline` instead of
/// `Stopped` and is restarted by [`crate::Replicator::retry`] or when the
/// host becomes reachable again. When to retry is up to the caller; this
/// type keeps no timers.
pub struct RemotePeer {
    url: Url,
    factory: Arc<dyn EngineFactory>,
    attempts: AtomicU32,
}

impl RemotePeer {
    /// Creates a peer for `address`, which must be a `ws:` or `wss:` URL
    /// whose last path segment names the remote database.
    pub fn new(address: &str, factory: Arc<dyn EngineFactory>) -> ReplicatorResult<Self> {
        let invalid = |reason: &str| ReplicatorError::InvalidUrl {
            url: address.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(address).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(invalid("scheme must be ws or wss"));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host"));
        }
        let has_db_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .is_some_and(|name| !name.is_empty());
        if !has_db_name {
            return Err(invalid("missing database name"));
        }

        Ok(Self {
            url,
            factory,
            attempts: AtomicU32::new(0),
        })
    }

    /// Returns the remote database name.
    pub fn database_name(&self) -> &str {
        self.url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
    }

    /// Returns how many consecutive sessions ended in a transient failure.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn restart(&self, session: &mut Session<'_>) {
        session.status_mut().set_flag(StatusFlags::WILL_RETRY, false);
        session.start();
    }
}

impl PeerKind for RemotePeer {
    fn kind_name(&self) -> &'static str {
        "remote"
    }

    fn url(&self) -> String {
        self.url.to_string()
    }

    fn create_engine(
        &self,
        database: Arc<dyn Database>,
        options: ReplicatorOptions,
        delegate: Arc<dyn EngineDelegate>,
    ) -> ReplicatorResult<Arc<dyn SyncEngine>> {
        self.factory.create_engine(EngineRequest {
            database,
            peer: PeerEndpoint::Remote(self.url.clone()),
            options,
            delegate,
        })
    }

    fn retry(&self, session: &mut Session<'_>, reset_count: bool) -> ReplicatorResult<()> {
        let level = session.status().level;
        match level {
            ActivityLevel::Stopped => Err(ReplicatorError::unsupported(
                "Replicator is stopped and can't be retried",
            )),
            // A suspended session stays paused until resumed and retried.
            ActivityLevel::Offline if session.status().has_flag(StatusFlags::SUSPENDED) => {
                Ok(())
            }
            ActivityLevel::Offline if !session.has_engine() => {
                if reset_count {
                    self.attempts.store(0, Ordering::SeqCst);
                }
                info!(url = %self.url, attempt = self.attempts() + 1, "Retrying connection");
                self.restart(session);
                Ok(())
            }
            // Already connecting or connected.
            _ => Ok(()),
        }
    }

    fn set_host_reachable(&self, session: &mut Session<'_>, reachable: bool) {
        if !session
            .status_mut()
            .set_flag(StatusFlags::HOST_REACHABLE, reachable)
        {
            return;
        }
        info!(url = %self.url, reachable, "Host reachability changed");
        let status = session.status();
        if reachable
            && status.level == ActivityLevel::Offline
            && status.has_flag(StatusFlags::WILL_RETRY)
            && !status.has_flag(StatusFlags::SUSPENDED)
        {
            self.restart(session);
        }
    }

    fn handle_connected(&self, session: &mut Session<'_>) {
        self.attempts.store(0, Ordering::SeqCst);
        session.status_mut().set_flag(StatusFlags::WILL_RETRY, false);
    }

    fn handle_stopped(&self, session: &mut Session<'_>) {
        let transient = session
            .status()
            .error
            .as_ref()
            .is_some_and(|err| err.transient);
        if !transient {
            return;
        }
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if session.options().continuous() || attempt <= MAX_ONE_SHOT_RETRIES {
            info!(url = %self.url, attempt, "Transient failure; going offline until retried");
            let status = session.status_mut();
            status.level = ActivityLevel::Offline;
            status.set_flag(StatusFlags::WILL_RETRY, true);
        }
    }
}
