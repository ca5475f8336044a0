//! The boundary to the sync engine that runs the replication protocol.
//!
//! The engine is an external collaborator: it owns the connection, the
//! protocol exchange and retry timing. The replicator creates one engine per
//! session through an [`EngineFactory`] and receives its reports through the
//! [`EngineDelegate`] it registers.

use crate::database::{Database, DocumentFlags, DocumentInfo, Sequence};
use crate::error::{ErrorInfo, ReplicatorResult};
use crate::options::ReplicatorOptions;
use crate::status::ReplicatorStatus;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Transfer direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Local to peer.
    Pushing,
    /// Peer to local.
    Pulling,
}

/// HTTP headers of the connection response.
pub type HttpHeaders = BTreeMap<String, String>;

/// Content-addressed identifier of a blob, e.g. `sha1-VVVVoq...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobKey(pub String);

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A revision whose transfer finished, successfully or not.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicatedRev {
    /// Document ID.
    pub doc_id: String,
    /// Revision ID.
    pub rev_id: String,
    /// Local sequence of the revision.
    pub sequence: Sequence,
    /// Revision flags.
    pub flags: DocumentFlags,
    /// Transfer direction.
    pub direction: Direction,
    /// Why the transfer failed, if it did.
    pub error: Option<ErrorInfo>,
    /// Whether the failure may go away on a later attempt.
    pub error_is_transient: bool,
}

impl ReplicatedRev {
    /// Creates a successful revision report.
    pub fn new(direction: Direction, doc_id: impl Into<String>, rev_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            rev_id: rev_id.into(),
            sequence: 0,
            flags: DocumentFlags::default(),
            direction,
            error: None,
            error_is_transient: false,
        }
    }

    /// Returns this report with a failure attached.
    #[must_use]
    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.error_is_transient = error.transient;
        self.error = Some(error);
        self
    }
}

/// Progress of one blob transfer, as reported by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineBlobProgress {
    /// Transfer direction.
    pub direction: Direction,
    /// Owning document.
    pub doc_id: String,
    /// Path of the property holding the blob reference.
    pub property_path: Vec<String>,
    /// Blob key.
    pub key: BlobKey,
    /// Bytes transferred so far.
    pub bytes_completed: u64,
    /// Blob length.
    pub bytes_total: u64,
    /// Transfer failure, if any.
    pub error: Option<ErrorInfo>,
}

/// A sync engine instance, serving exactly one session.
///
/// Methods are called with the replicator's lock held, so an implementation
/// must never call back into its delegate synchronously from them; reports
/// are delivered later from the engine's own execution context.
pub trait SyncEngine: Send + Sync {
    /// Returns a name for log messages.
    fn name(&self) -> String;

    /// Returns the engine's current status. Flags are ignored.
    fn status(&self) -> ReplicatorStatus;

    /// Begins the session.
    fn start(&self);

    /// Requests a cooperative stop; completion is reported as a `Stopped`
    /// status.
    fn stop(&self);

    /// Breaks all references to the delegate. The engine is never used again.
    fn terminate(&self);

    /// Visits documents the engine still has to push.
    fn pending_document_ids(&self, visitor: &mut dyn FnMut(&DocumentInfo)) -> ReplicatorResult<()>;

    /// Returns true if the engine still has to push `doc_id`.
    fn is_document_pending(&self, doc_id: &str) -> ReplicatorResult<bool>;
}

/// Receives an engine's reports.
pub trait EngineDelegate: Send + Sync {
    /// The HTTP response to the connection request arrived.
    fn got_http_response(&self, status: u16, headers: &HttpHeaders);

    /// The engine's status changed.
    fn status_changed(&self, status: &ReplicatorStatus);

    /// Revisions finished transferring. The batch is unordered.
    fn documents_ended(&self, revs: &[ReplicatedRev]);

    /// A blob transfer made progress.
    fn blob_progress(&self, progress: &EngineBlobProgress);
}

/// The other end of a replication.
#[derive(Clone)]
pub enum PeerEndpoint {
    /// Another database in the same process.
    Local(Arc<dyn Database>),
    /// A server reached over WebSocket.
    Remote(Url),
}

impl fmt::Debug for PeerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerEndpoint::Local(db) => f.debug_tuple("Local").field(&db.name()).finish(),
            PeerEndpoint::Remote(url) => f.debug_tuple("Remote").field(&url.as_str()).finish(),
        }
    }
}

/// Everything an engine needs to run one session.
pub struct EngineRequest {
    /// The local database.
    pub database: Arc<dyn Database>,
    /// The peer.
    pub peer: PeerEndpoint,
    /// Options snapshot for this session.
    pub options: ReplicatorOptions,
    /// Where the engine sends its reports.
    pub delegate: Arc<dyn EngineDelegate>,
}

/// Creates engine instances.
pub trait EngineFactory: Send + Sync {
    /// Creates and configures an engine; it must not be started yet.
    fn create_engine(&self, request: EngineRequest) -> ReplicatorResult<Arc<dyn SyncEngine>>;
}

impl<F> EngineFactory for F
where
    F: Fn(EngineRequest) -> ReplicatorResult<Arc<dyn SyncEngine>> + Send + Sync,
{
    fn create_engine(&self, request: EngineRequest) -> ReplicatorResult<Arc<dyn SyncEngine>> {
        self(request)
    }
}
