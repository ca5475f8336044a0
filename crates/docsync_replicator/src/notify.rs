//! Application callbacks and the translation of engine reports into them.

use crate::database::{DocumentFlags, Sequence};
use crate::engine::{BlobKey, Direction, EngineBlobProgress, ReplicatedRev};
use crate::error::ErrorInfo;
use crate::options::CallbackContext;
use crate::replicator::Replicator;
use crate::status::ReplicatorStatus;
use parking_lot::RwLock;
use std::sync::Arc;

/// A finished document, as reported to the application.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEnded {
    /// Document ID.
    pub doc_id: String,
    /// Revision ID.
    pub rev_id: String,
    /// Local sequence of the revision.
    pub sequence: Sequence,
    /// Revision flags.
    pub flags: DocumentFlags,
    /// Why the transfer failed, if it did.
    pub error: Option<ErrorInfo>,
    /// Whether the failure may go away on a later attempt.
    pub error_is_transient: bool,
}

impl From<&ReplicatedRev> for DocumentEnded {
    fn from(rev: &ReplicatedRev) -> Self {
        Self {
            doc_id: rev.doc_id.clone(),
            rev_id: rev.rev_id.clone(),
            sequence: rev.sequence,
            flags: rev.flags,
            error: rev.error.clone(),
            error_is_transient: rev.error_is_transient,
        }
    }
}

/// Blob transfer progress, as reported to the application.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobProgress {
    /// True for uploads, false for downloads.
    pub pushing: bool,
    /// Owning document.
    pub doc_id: String,
    /// Dotted path of the property holding the blob reference.
    pub property: String,
    /// Blob key.
    pub blob_key: BlobKey,
    /// Bytes transferred so far.
    pub bytes_completed: u64,
    /// Blob length.
    pub bytes_total: u64,
    /// Transfer failure, if any.
    pub error: Option<ErrorInfo>,
}

impl From<&EngineBlobProgress> for BlobProgress {
    fn from(p: &EngineBlobProgress) -> Self {
        Self {
            pushing: p.direction == Direction::Pushing,
            doc_id: p.doc_id.clone(),
            property: p.property_path.join("."),
            blob_key: p.key.clone(),
            bytes_completed: p.bytes_completed,
            bytes_total: p.bytes_total,
            error: p.error.clone(),
        }
    }
}

/// Called when the replicator's status changes.
pub type StatusChangedFn =
    dyn Fn(&Replicator, &ReplicatorStatus, Option<&CallbackContext>) + Send + Sync;

/// Called with documents that finished in one direction. `pushing` tells
/// the direction; the slice is never empty.
pub type DocumentsEndedFn =
    dyn Fn(&Replicator, bool, &[DocumentEnded], Option<&CallbackContext>) + Send + Sync;

/// Called for each blob progress report.
pub type BlobProgressFn =
    dyn Fn(&Replicator, &BlobProgress, Option<&CallbackContext>) + Send + Sync;

/// The callbacks a replicator is created with. Any may be absent.
#[derive(Clone, Default)]
pub struct ReplicatorCallbacks {
    /// Status callback.
    pub on_status_changed: Option<Arc<StatusChangedFn>>,
    /// Documents-ended callback.
    pub on_documents_ended: Option<Arc<DocumentsEndedFn>>,
    /// Blob progress callback.
    pub on_blob_progress: Option<Arc<BlobProgressFn>>,
}

impl ReplicatorCallbacks {
    /// Creates an empty set of callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status callback.
    pub fn on_status_changed<F>(mut self, f: F) -> Self
    where
        F: Fn(&Replicator, &ReplicatorStatus, Option<&CallbackContext>) + Send + Sync + 'static,
    {
        self.on_status_changed = Some(Arc::new(f));
        self
    }

    /// Sets the documents-ended callback.
    pub fn on_documents_ended<F>(mut self, f: F) -> Self
    where
        F: Fn(&Replicator, bool, &[DocumentEnded], Option<&CallbackContext>)
            + Send
            + Sync
            + 'static,
    {
        self.on_documents_ended = Some(Arc::new(f));
        self
    }

    /// Sets the blob progress callback.
    pub fn on_blob_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(&Replicator, &BlobProgress, Option<&CallbackContext>) + Send + Sync + 'static,
    {
        self.on_blob_progress = Some(Arc::new(f));
        self
    }
}

/// A single replaceable callback.
///
/// The lock only covers loading or storing the slot, never the call, so a
/// delivery that loaded the callback before it was replaced may
/// still run once.
pub(crate) struct CallbackSlot<T: ?Sized> {
    slot: RwLock<Option<Arc<T>>>,
}

impl<T: ?Sized> CallbackSlot<T> {
    pub(crate) fn new(callback: Option<Arc<T>>) -> Self {
        Self {
            slot: RwLock::new(callback),
        }
    }

    pub(crate) fn load(&self) -> Option<Arc<T>> {
        self.slot.read().clone()
    }

    pub(crate) fn store(&self, callback: Option<Arc<T>>) {
        *self.slot.write() = callback;
    }
}

/// Splits a batch into its pulled and pushed parts, in that order, keeping
/// the relative order within each part.
pub(crate) fn partition_by_direction(revs: &[ReplicatedRev]) -> [(bool, Vec<DocumentEnded>); 2] {
    let mut pulled = Vec::new();
    let mut pushed = Vec::new();
    for rev in revs {
        match rev.direction {
            Direction::Pulling => pulled.push(DocumentEnded::from(rev)),
            Direction::Pushing => pushed.push(DocumentEnded::from(rev)),
        }
    }
    [(false, pulled), (true, pushed)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorDomain;

    fn ids(docs: &[DocumentEnded]) -> Vec<&str> {
        docs.iter().map(|d| d.doc_id.as_str()).collect()
    }

    #[test]
    fn partition_keeps_relative_order() {
        let revs = vec![
            ReplicatedRev::new(Direction::Pushing, "A", "1-a"),
            ReplicatedRev::new(Direction::Pulling, "B", "1-b"),
            ReplicatedRev::new(Direction::Pushing, "C", "1-c"),
            ReplicatedRev::new(Direction::Pulling, "D", "1-d"),
        ];
        let [(pulling, pulled), (pushing, pushed)] = partition_by_direction(&revs);
        assert!(!pulling);
        assert!(pushing);
        assert_eq!(ids(&pulled), vec!["B", "D"]);
        assert_eq!(ids(&pushed), vec!["A", "C"]);
    }

    #[test]
    fn document_ended_carries_error() {
        let rev = ReplicatedRev::new(Direction::Pulling, "doc", "2-x")
            .with_error(ErrorInfo::transient(ErrorDomain::WebSocket, 503, "busy"));
        let ended = DocumentEnded::from(&rev);
        assert_eq!(ended.rev_id, "2-x");
        assert!(ended.error_is_transient);
        assert_eq!(ended.error.map(|e| e.code), Some(503));
    }

    #[test]
    fn blob_progress_translation() {
        let engine_progress = EngineBlobProgress {
            direction: Direction::Pushing,
            doc_id: "doc".into(),
            property_path: vec!["photos".into(), "0".into()],
            key: BlobKey("sha1-abc".into()),
            bytes_completed: 10,
            bytes_total: 40,
            error: None,
        };
        let progress = BlobProgress::from(&engine_progress);
        assert!(progress.pushing);
        assert_eq!(progress.property, "photos.0");
        assert_eq!(progress.blob_key.to_string(), "sha1-abc");
        assert_eq!(progress.bytes_total, 40);
    }

    #[test]
    fn slot_store_and_clear() {
        let slot: CallbackSlot<dyn Fn() -> u32 + Send + Sync> =
            CallbackSlot::new(Some(Arc::new(|| 7)));
        assert_eq!(slot.load().map(|f| f()), Some(7));
        slot.store(None);
        assert!(slot.load().is_none());
    }
}
