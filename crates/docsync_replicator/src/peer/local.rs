//! Replication with another database in the same process.

use super::PeerKind;
use crate::database::Database;
use crate::engine::{EngineDelegate, EngineFactory, EngineRequest, PeerEndpoint, SyncEngine};
use crate::error::ReplicatorResult;
use crate::options::ReplicatorOptions;
use std::sync::Arc;

/// A peer that is another local database.
///
/// Local replication has no network to come back, so it keeps the default
/// retry and reachability behavior.
pub struct LocalPeer {
    other: Arc<dyn Database>,
    factory: Arc<dyn EngineFactory>,
}

impl LocalPeer {
    /// Creates a peer for `other`, whose engines come from `factory`.
    pub fn new(other: Arc<dyn Database>, factory: Arc<dyn EngineFactory>) -> Self {
        Self { other, factory }
    }

    /// Returns the peer database.
    pub fn database(&self) -> &Arc<dyn Database> {
        &self.other
    }
}

impl PeerKind for LocalPeer {
    fn kind_name(&self) -> &'static str {
        "local"
    }

    fn url(&self) -> String {
        self.other.location()
    }

    fn create_engine(
        &self,
        database: Arc<dyn Database>,
        options: ReplicatorOptions,
        delegate: Arc<dyn EngineDelegate>,
    ) -> ReplicatorResult<Arc<dyn SyncEngine>> {
        self.factory.create_engine(EngineRequest {
            database,
            peer: PeerEndpoint::Local(Arc::clone(&self.other)),
            options,
            delegate,
        })
    }
}
