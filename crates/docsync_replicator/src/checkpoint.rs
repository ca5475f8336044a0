//! Checkpoints and the read-only checkpointer used to answer
//! pending-document queries without a running session.

use crate::database::{Database, DocumentInfo, Sequence};
use crate::error::{ReplicatorError, ReplicatorResult};
use crate::options::{keys, ReplicatorOptions};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Persisted replication progress between one database and one peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Every local sequence at or below this has been pushed.
    pub local_completed: Sequence,
    /// Pushed sequences above `local_completed`.
    pub completed_above: BTreeSet<Sequence>,
    /// The peer's opaque checkpoint for the pull direction.
    pub remote: Option<String>,
}

impl Checkpoint {
    /// Returns true if nothing has been pushed yet.
    pub fn is_empty(&self) -> bool {
        self.local_completed == 0 && self.completed_above.is_empty()
    }

    /// Returns true if the change at `sequence` has been pushed.
    pub fn is_sequence_completed(&self, sequence: Sequence) -> bool {
        sequence <= self.local_completed || self.completed_above.contains(&sequence)
    }

    /// Records `sequence` as pushed, advancing `local_completed` over any
    /// contiguous run.
    pub fn complete(&mut self, sequence: Sequence) {
        if self.is_sequence_completed(sequence) {
            return;
        }
        self.completed_above.insert(sequence);
        while self.completed_above.remove(&(self.local_completed + 1)) {
            self.local_completed += 1;
        }
    }
}

/// Answers pending-document questions from the last saved checkpoint.
///
/// A checkpointer is transient and read-only: it never opens a connection
/// and never modifies the database.
#[derive(Debug, Clone)]
pub struct Checkpointer {
    options: ReplicatorOptions,
    peer_url: String,
}

impl Checkpointer {
    /// Creates a checkpointer for the given options and peer.
    pub fn new(options: ReplicatorOptions, peer_url: impl Into<String>) -> Self {
        Self {
            options,
            peer_url: peer_url.into(),
        }
    }

    /// Returns the peer URL.
    pub fn peer_url(&self) -> &str {
        &self.peer_url
    }

    /// Computes the ID under which the checkpoint is stored.
    ///
    /// The ID depends on the database, the peer and every property that
    /// changes which documents are replicated.
    pub fn checkpoint_id(&self, db: &dyn Database) -> ReplicatorResult<String> {
        let mut hasher = Sha256::new();
        hasher.update(db.uuid().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.peer_url.as_bytes());
        for key in [keys::DOC_IDS, keys::CHANNELS, keys::FILTER, keys::FILTER_PARAMS] {
            if let Some(value) = self.options.property(key) {
                let mut encoded = Vec::new();
                ciborium::into_writer(value, &mut encoded)
                    .map_err(|e| ReplicatorError::Codec(e.to_string()))?;
                hasher.update([0u8]);
                hasher.update(key.as_bytes());
                hasher.update(&encoded);
            }
        }
        Ok(format!("cp-{}", hex::encode(hasher.finalize())))
    }

    /// Reads the checkpoint, or an empty one if none was saved.
    pub fn read(&self, db: &dyn Database) -> ReplicatorResult<Checkpoint> {
        let id = self.checkpoint_id(db)?;
        Ok(db.read_checkpoint(&id)?.unwrap_or_default())
    }

    /// Visits every document that a push would still send.
    pub fn pending_document_ids(
        &self,
        db: &dyn Database,
        visitor: &mut dyn FnMut(&DocumentInfo),
    ) -> ReplicatorResult<()> {
        let checkpoint = self.read(db)?;
        let skip_deleted = self.skips_deleted(&checkpoint);
        db.changes_since(checkpoint.local_completed, &mut |info| {
            if self.is_pending(&checkpoint, skip_deleted, info) {
                visitor(info);
            }
        })
    }

    /// Returns true if a push would still send `doc_id`.
    ///
    /// A document that doesn't exist is not pending.
    pub fn is_document_pending(&self, db: &dyn Database, doc_id: &str) -> ReplicatorResult<bool> {
        let Some(info) = db.document_info(doc_id)? else {
            return Ok(false);
        };
        let checkpoint = self.read(db)?;
        let skip_deleted = self.skips_deleted(&checkpoint);
        Ok(self.is_pending(&checkpoint, skip_deleted, &info))
    }

    // The first push has no reason to send deletions: the peer never saw
    // those documents.
    fn skips_deleted(&self, checkpoint: &Checkpoint) -> bool {
        self.options.skip_deleted() || checkpoint.is_empty()
    }

    fn is_pending(&self, checkpoint: &Checkpoint, skip_deleted: bool, info: &DocumentInfo) -> bool {
        !checkpoint.is_sequence_completed(info.sequence)
            && !(skip_deleted && info.flags.deleted)
            && self.options.is_doc_allowed(&info.doc_id)
    }
}
