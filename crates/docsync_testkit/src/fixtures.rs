//! Test fixtures and database helpers.
//!
//! Provides an in-memory database, a callback recorder and a ready-made
//! replicator wired to a [`MockEngineFactory`].

use crate::engine::{MockEngine, MockEngineFactory};
use docsync_replicator::{
    ActivityLevel, BlobProgress, Checkpoint, Checkpointer, Database, DocumentFlags, DocumentInfo,
    Replicator, ReplicatorCallbacks, ReplicatorOptions, ReplicatorResult, ReplicatorStatus,
    Sequence,
};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Installs a tracing subscriber for tests, once per process.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

#[derive(Default)]
struct MemoryState {
    docs: BTreeMap<String, DocumentInfo>,
    last_sequence: Sequence,
    checkpoints: BTreeMap<String, Checkpoint>,
}

/// An in-memory database.
///
/// Every write assigns the document the next sequence, like a real
/// storage engine would.
pub struct MemoryDatabase {
    name: String,
    uuid: Uuid,
    state: RwLock<MemoryState>,
}

impl MemoryDatabase {
    /// Creates an empty database.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: Uuid::new_v4(),
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Creates an empty database behind an `Arc`.
    pub fn shared(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(name))
    }

    /// Creates or updates a document and returns its new sequence.
    pub fn put(&self, doc_id: &str) -> Sequence {
        self.write(doc_id, false)
    }

    /// Deletes a document and returns the sequence of the deletion.
    pub fn delete(&self, doc_id: &str) -> Sequence {
        self.write(doc_id, true)
    }

    /// Returns the latest assigned sequence.
    pub fn last_sequence(&self) -> Sequence {
        self.state.read().last_sequence
    }

    /// Stores a checkpoint under `checkpoint_id`.
    pub fn save_checkpoint(&self, checkpoint_id: impl Into<String>, checkpoint: Checkpoint) {
        self.state
            .write()
            .checkpoints
            .insert(checkpoint_id.into(), checkpoint);
    }

    /// Stores the checkpoint a replication with `options` and `peer_url`
    /// would read.
    pub fn save_checkpoint_for(
        &self,
        options: &ReplicatorOptions,
        peer_url: &str,
        checkpoint: Checkpoint,
    ) -> ReplicatorResult<()> {
        let id = Checkpointer::new(options.clone(), peer_url).checkpoint_id(self)?;
        self.save_checkpoint(id, checkpoint);
        Ok(())
    }

    fn write(&self, doc_id: &str, deleted: bool) -> Sequence {
        let mut state = self.state.write();
        state.last_sequence += 1;
        let sequence = state.last_sequence;
        let generation = state
            .docs
            .get(doc_id)
            .and_then(|info| info.rev_id.split('-').next()?.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        state.docs.insert(
            doc_id.to_string(),
            DocumentInfo {
                doc_id: doc_id.to_string(),
                rev_id: format!("{generation}-{sequence:04x}"),
                sequence,
                flags: DocumentFlags {
                    deleted,
                    ..DocumentFlags::default()
                },
            },
        );
        sequence
    }
}

impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn location(&self) -> String {
        format!("memory:///{}", self.name)
    }

    fn changes_since(
        &self,
        since: Sequence,
        visitor: &mut dyn FnMut(&DocumentInfo),
    ) -> ReplicatorResult<()> {
        let mut changes: Vec<DocumentInfo> = self
            .state
            .read()
            .docs
            .values()
            .filter(|info| info.sequence > since)
            .cloned()
            .collect();
        changes.sort_by_key(|info| info.sequence);
        for info in &changes {
            visitor(info);
        }
        Ok(())
    }

    fn document_info(&self, doc_id: &str) -> ReplicatorResult<Option<DocumentInfo>> {
        Ok(self.state.read().docs.get(doc_id).cloned())
    }

    fn read_checkpoint(&self, checkpoint_id: &str) -> ReplicatorResult<Option<Checkpoint>> {
        Ok(self.state.read().checkpoints.get(checkpoint_id).cloned())
    }
}

/// One documents-ended delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentsEndedCall {
    /// Direction of the batch.
    pub pushing: bool,
    /// Document IDs, in delivery order.
    pub doc_ids: Vec<String>,
}

/// Records every callback a replicator delivers.
///
/// The status callback also reads the replicator's status from inside the
/// callback, so any test using the recorder checks that callbacks may call
/// back into the replicator.
#[derive(Default)]
pub struct CallbackRecorder {
    statuses: Mutex<Vec<ReplicatorStatus>>,
    documents: Mutex<Vec<DocumentsEndedCall>>,
    blobs: Mutex<Vec<BlobProgress>>,
}

impl CallbackRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns callbacks that record into this recorder.
    pub fn callbacks(self: &Arc<Self>) -> ReplicatorCallbacks {
        let statuses = Arc::clone(self);
        let documents = Arc::clone(self);
        let blobs = Arc::clone(self);
        ReplicatorCallbacks::new()
            .on_status_changed(move |replicator, status, _context| {
                let _ = replicator.status();
                statuses.statuses.lock().push(status.clone());
            })
            .on_documents_ended(move |_replicator, pushing, docs, _context| {
                documents.documents.lock().push(DocumentsEndedCall {
                    pushing,
                    doc_ids: docs.iter().map(|d| d.doc_id.clone()).collect(),
                });
            })
            .on_blob_progress(move |_replicator, progress, _context| {
                blobs.blobs.lock().push(progress.clone());
            })
    }

    /// Returns every status notification, oldest first.
    pub fn statuses(&self) -> Vec<ReplicatorStatus> {
        self.statuses.lock().clone()
    }

    /// Returns the levels of every status notification.
    pub fn levels(&self) -> Vec<ActivityLevel> {
        self.statuses.lock().iter().map(|s| s.level).collect()
    }

    /// Returns the most recent status notification.
    pub fn last_status(&self) -> Option<ReplicatorStatus> {
        self.statuses.lock().last().cloned()
    }

    /// Returns every documents-ended delivery.
    pub fn documents_ended(&self) -> Vec<DocumentsEndedCall> {
        self.documents.lock().clone()
    }

    /// Returns every blob progress delivery.
    pub fn blob_progress(&self) -> Vec<BlobProgress> {
        self.blobs.lock().clone()
    }

    /// Returns the number of deliveries of any kind.
    pub fn total_calls(&self) -> usize {
        self.statuses.lock().len() + self.documents.lock().len() + self.blobs.lock().len()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.statuses.lock().clear();
        self.documents.lock().clear();
        self.blobs.lock().clear();
    }
}

/// A replicator wired to a mock engine factory and a callback recorder.
pub struct ReplicatorFixture {
    /// The replicator under test.
    pub replicator: Replicator,
    /// Creates the replicator's engines.
    pub factory: Arc<MockEngineFactory>,
    /// Records the replicator's callbacks.
    pub recorder: Arc<CallbackRecorder>,
    /// The local database.
    pub db: Arc<MemoryDatabase>,
}

/// Remote address used by [`ReplicatorFixture::remote`].
pub const TEST_REMOTE_URL: &str = "wss://sync.example.com:4984/travel";

impl ReplicatorFixture {
    /// Creates a replicator to another in-memory database.
    pub fn local(options: ReplicatorOptions) -> Self {
        init_test_tracing();
        let db = MemoryDatabase::shared("local");
        let other = MemoryDatabase::shared("other");
        let factory = Arc::new(MockEngineFactory::new());
        let recorder = CallbackRecorder::new();
        let replicator = Replicator::local(
            db.clone(),
            other,
            factory.clone(),
            options,
            recorder.callbacks(),
        )
        .expect("Failed to create local replicator");
        Self {
            replicator,
            factory,
            recorder,
            db,
        }
    }

    /// Creates a replicator to [`TEST_REMOTE_URL`].
    pub fn remote(options: ReplicatorOptions) -> Self {
        init_test_tracing();
        let db = MemoryDatabase::shared("local");
        let factory = Arc::new(MockEngineFactory::new());
        let recorder = CallbackRecorder::new();
        let replicator = Replicator::remote(
            db.clone(),
            TEST_REMOTE_URL,
            factory.clone(),
            options,
            recorder.callbacks(),
        )
        .expect("Failed to create remote replicator");
        Self {
            replicator,
            factory,
            recorder,
            db,
        }
    }

    /// Returns the most recently created engine.
    ///
    /// # Panics
    ///
    /// Panics if no engine was created.
    pub fn engine(&self) -> Arc<MockEngine> {
        self.factory.last_engine().expect("No engine was created")
    }

    /// Starts the replicator and returns its engine.
    pub fn start(&self) -> Arc<MockEngine> {
        self.replicator.start();
        self.engine()
    }
}
