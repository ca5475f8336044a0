//! A scriptable sync engine.
//!
//! [`MockEngine`] never does anything on its own: tests (or test threads
//! standing in for the engine's execution context) drive its reports
//! explicitly, which makes every interleaving reproducible.

use docsync_replicator::{
    ActivityLevel, DocumentFlags, DocumentInfo, EngineBlobProgress, EngineDelegate, EngineFactory,
    EngineRequest, ErrorInfo, HttpHeaders, PeerEndpoint, ReplicatedRev, ReplicatorError,
    ReplicatorOptions, ReplicatorResult, ReplicatorStatus, SyncEngine,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// An engine whose reports are triggered by the test.
///
/// The delegate is kept even after [`SyncEngine::terminate`], so a test can
/// simulate a report that was already in flight when the engine was
/// discarded.
pub struct MockEngine {
    id: usize,
    peer: PeerEndpoint,
    options: ReplicatorOptions,
    delegate: Arc<dyn EngineDelegate>,
    status: Mutex<ReplicatorStatus>,
    pending: Mutex<Vec<String>>,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    terminated: AtomicBool,
}

impl MockEngine {
    fn new(id: usize, request: EngineRequest) -> Self {
        Self {
            id,
            peer: request.peer,
            options: request.options,
            delegate: request.delegate,
            status: Mutex::new(ReplicatorStatus::new(ActivityLevel::Connecting)),
            pending: Mutex::new(Vec::new()),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            terminated: AtomicBool::new(false),
        }
    }

    /// Returns the creation index of this engine within its factory.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Returns the peer this engine was created for.
    pub fn peer(&self) -> &PeerEndpoint {
        &self.peer
    }

    /// Returns the options snapshot this engine was created with.
    pub fn options(&self) -> &ReplicatorOptions {
        &self.options
    }

    /// Returns how many times `start` was called.
    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// Returns how many times `stop` was called.
    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    /// Returns true once the replicator discarded this engine.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Sets the IDs reported by the live pending-document queries.
    pub fn set_pending<I, S>(&self, doc_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.pending.lock() = doc_ids.into_iter().map(Into::into).collect();
    }

    /// Reports a status to the delegate.
    pub fn report_status(&self, status: ReplicatorStatus) {
        *self.status.lock() = status.clone();
        self.delegate.status_changed(&status);
    }

    /// Reports a bare activity level.
    pub fn report_level(&self, level: ActivityLevel) {
        self.report_status(ReplicatorStatus::new(level));
    }

    /// Reports that the engine stopped cleanly.
    pub fn report_stopped(&self) {
        self.report_level(ActivityLevel::Stopped);
    }

    /// Reports that the engine stopped because of `error`.
    pub fn report_stopped_with_error(&self, error: ErrorInfo) {
        self.report_status(ReplicatorStatus::new(ActivityLevel::Stopped).with_error(error));
    }

    /// Reports the HTTP response to the connection request.
    pub fn report_http_response(&self, status: u16, headers: &HttpHeaders) {
        self.delegate.got_http_response(status, headers);
    }

    /// Reports a batch of finished revisions.
    pub fn report_documents_ended(&self, revs: &[ReplicatedRev]) {
        self.delegate.documents_ended(revs);
    }

    /// Reports blob progress.
    pub fn report_blob_progress(&self, progress: &EngineBlobProgress) {
        self.delegate.blob_progress(progress);
    }
}

impl SyncEngine for MockEngine {
    fn name(&self) -> String {
        format!("mock-engine#{}", self.id)
    }

    fn status(&self) -> ReplicatorStatus {
        self.status.lock().clone()
    }

    fn start(&self) {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    fn pending_document_ids(&self, visitor: &mut dyn FnMut(&DocumentInfo)) -> ReplicatorResult<()> {
        for (index, doc_id) in self.pending.lock().iter().enumerate() {
            visitor(&DocumentInfo {
                doc_id: doc_id.clone(),
                rev_id: "1-mock".into(),
                sequence: index as u64 + 1,
                flags: DocumentFlags::default(),
            });
        }
        Ok(())
    }

    fn is_document_pending(&self, doc_id: &str) -> ReplicatorResult<bool> {
        Ok(self.pending.lock().iter().any(|id| id == doc_id))
    }
}

/// Creates [`MockEngine`]s and remembers every one of them.
#[derive(Default)]
pub struct MockEngineFactory {
    engines: Mutex<Vec<Arc<MockEngine>>>,
    fail_next: Mutex<Option<ReplicatorError>>,
}

impl MockEngineFactory {
    /// Creates a factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `create_engine` call fail with `error`.
    pub fn fail_next(&self, error: ReplicatorError) {
        *self.fail_next.lock() = Some(error);
    }

    /// Returns every engine created so far, oldest first.
    pub fn engines(&self) -> Vec<Arc<MockEngine>> {
        self.engines.lock().clone()
    }

    /// Returns the number of engines created.
    pub fn engine_count(&self) -> usize {
        self.engines.lock().len()
    }

    /// Returns the most recently created engine.
    pub fn last_engine(&self) -> Option<Arc<MockEngine>> {
        self.engines.lock().last().cloned()
    }
}

impl EngineFactory for MockEngineFactory {
    fn create_engine(&self, request: EngineRequest) -> ReplicatorResult<Arc<dyn SyncEngine>> {
        if let Some(error) = self.fail_next.lock().take() {
            return Err(error);
        }
        let mut engines = self.engines.lock();
        let engine = Arc::new(MockEngine::new(engines.len(), request));
        engines.push(Arc::clone(&engine));
        Ok(engine)
    }
}
