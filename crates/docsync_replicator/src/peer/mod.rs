//! Peer kinds: what differs between replicating with another local
//! database and with a remote server.
//!
//! The state machine in [`crate::Replicator`] is shared; it calls into a
//! [`PeerKind`] only to create engines, to name the peer, and at the hooks
//! below. Hooks run with the replicator's lock held.

mod local;
mod remote;

pub use local::LocalPeer;
pub use remote::RemotePeer;

use crate::database::Database;
use crate::engine::{EngineDelegate, SyncEngine};
use crate::error::{ReplicatorError, ReplicatorResult};
use crate::options::ReplicatorOptions;
use crate::replicator::Session;
use std::sync::Arc;

/// Behavior specific to one kind of peer.
pub trait PeerKind: Send + Sync + 'static {
    /// Short name for log messages.
    fn kind_name(&self) -> &'static str;

    /// Canonical URL of the peer. Checkpoints are keyed by it.
    fn url(&self) -> String;

    /// Creates and configures the engine for a new session.
    fn create_engine(
        &self,
        database: Arc<dyn Database>,
        options: ReplicatorOptions,
        delegate: Arc<dyn EngineDelegate>,
    ) -> ReplicatorResult<Arc<dyn SyncEngine>>;

    /// Reconnects after a failure. Unsupported unless overridden.
    fn retry(&self, _session: &mut Session<'_>, _reset_count: bool) -> ReplicatorResult<()> {
        Err(ReplicatorError::unsupported(
            "Can't retry this type of replication",
        ))
    }

    /// Reacts to a change in the host's reachability. Does nothing unless
    /// overridden.
    fn set_host_reachable(&self, _session: &mut Session<'_>, _reachable: bool) {}

    /// Called once the engine is connected.
    fn handle_connected(&self, _session: &mut Session<'_>) {}

    /// Called when an engine stopped while not suspended, before the
    /// application is notified. May rewrite the status.
    fn handle_stopped(&self, _session: &mut Session<'_>) {}
}
