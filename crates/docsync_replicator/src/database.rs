//! The local database, as seen by the replicator.

use crate::checkpoint::Checkpoint;
use crate::error::ReplicatorResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Local sequence number. Every change to a document assigns it a new,
/// higher sequence.
pub type Sequence = u64;

/// Per-document flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentFlags {
    /// The current revision is a deletion.
    pub deleted: bool,
    /// The document has unresolved conflicting revisions.
    pub conflicted: bool,
    /// The current revision references blobs.
    pub has_attachments: bool,
}

/// Metadata of a document's current revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// Document ID.
    pub doc_id: String,
    /// Current revision ID.
    pub rev_id: String,
    /// Sequence of the current revision.
    pub sequence: Sequence,
    /// Flags of the current revision.
    pub flags: DocumentFlags,
}

/// Read access to a local database.
///
/// Implemented by the embedding storage engine; the replicator never writes
/// through this trait.
pub trait Database: Send + Sync {
    /// Returns the database name.
    fn name(&self) -> &str;

    /// Returns the database's public UUID, which namespaces its checkpoints.
    fn uuid(&self) -> Uuid;

    /// Returns a URL identifying this database, e.g. `file:///data/app.db`.
    fn location(&self) -> String;

    /// Visits every document whose current sequence is greater than `since`,
    /// in ascending sequence order. Each document is visited at most once.
    fn changes_since(
        &self,
        since: Sequence,
        visitor: &mut dyn FnMut(&DocumentInfo),
    ) -> ReplicatorResult<()>;

    /// Returns the current revision metadata of a document.
    fn document_info(&self, doc_id: &str) -> ReplicatorResult<Option<DocumentInfo>>;

    /// Reads a stored checkpoint.
    fn read_checkpoint(&self, checkpoint_id: &str) -> ReplicatorResult<Option<Checkpoint>>;
}
