//! The replication lifecycle controller.
//!
//! A [`Replicator`] manages one replication between a local database and a
//! peer. It owns at most one [`SyncEngine`] at a time, folds the engine's
//! reports into its own [`ReplicatorStatus`] and forwards them to the
//! application's callbacks.
//!
//! ## Locking
//!
//! All mutable state sits behind one mutex. Every operation computes the
//! next state under the lock, copies out what has to be reported, releases
//! the lock and only then calls the application, which is free to call back
//! into the replicator.
//!
//! ## Lifetime
//!
//! While a session is active the replicator holds a strong reference to its
//! own shared state (the keepalive), so dropping every [`Replicator`] handle
//! mid-session doesn't tear it down. The keepalive is released right after
//! the notification that reports `Stopped`. Engines only see a weak
//! reference through their delegate.

use crate::checkpoint::Checkpointer;
use crate::database::Database;
use crate::engine::{
    EngineBlobProgress, EngineDelegate, EngineFactory, HttpHeaders, ReplicatedRev, SyncEngine,
};
use crate::error::{ReplicatorError, ReplicatorResult};
use crate::notify::{
    partition_by_direction, BlobProgress, BlobProgressFn, CallbackSlot, DocumentsEndedFn,
    ReplicatorCallbacks, StatusChangedFn,
};
use crate::options::{CallbackContext, Properties, ReplicatorOptions};
use crate::peer::{LocalPeer, PeerKind, RemotePeer};
use crate::status::{ActivityLevel, Progress, ReplicatorStatus, StatusFlags};
use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// Handle to a replicator. Clones refer to the same replicator.
#[derive(Clone)]
pub struct Replicator {
    core: Arc<ReplicatorCore>,
}

/// A handle that doesn't keep the replicator alive.
#[derive(Clone)]
pub struct WeakReplicator {
    core: Weak<ReplicatorCore>,
}

impl WeakReplicator {
    /// Returns a strong handle if the replicator still exists.
    pub fn upgrade(&self) -> Option<Replicator> {
        self.core.upgrade().map(|core| Replicator { core })
    }
}

struct ReplicatorCore {
    database: Arc<dyn Database>,
    peer: Box<dyn PeerKind>,
    callback_context: Option<CallbackContext>,
    state: Mutex<State>,
    on_status_changed: CallbackSlot<StatusChangedFn>,
    on_documents_ended: CallbackSlot<DocumentsEndedFn>,
    on_blob_progress: CallbackSlot<BlobProgressFn>,
}

/// State guarded by the replicator's mutex.
pub(crate) struct State {
    options: ReplicatorOptions,
    engine: Option<Arc<dyn SyncEngine>>,
    // Bumped for every engine created; reports carrying an older value are
    // from a discarded engine.
    generation: u64,
    status: ReplicatorStatus,
    // True until the first session starts or the first stop is reported, so
    // stopping a fresh replicator still delivers one `Stopped` status.
    pristine: bool,
    active_when_suspended: bool,
    response_headers: Option<Bytes>,
    keepalive: Option<Arc<ReplicatorCore>>,
}

impl State {
    fn is_current(&self, generation: u64) -> bool {
        self.engine.is_some() && self.generation == generation
    }

    fn release_if_stopped(&mut self) -> Option<Arc<ReplicatorCore>> {
        if self.status.level == ActivityLevel::Stopped {
            self.keepalive.take()
        } else {
            None
        }
    }
}

/// Work left for after the lock is released.
#[derive(Default)]
pub(crate) struct Transition {
    notify: Option<ReplicatorStatus>,
    release: Option<Arc<ReplicatorCore>>,
}

/// Locked view of a replicator, handed to [`PeerKind`] hooks.
///
/// The replicator's lock is held for as long as a `Session` exists, so hooks
/// must not call into the [`Replicator`] itself.
pub struct Session<'a> {
    core: &'a Arc<ReplicatorCore>,
    state: &'a mut State,
    transition: &'a mut Transition,
}

impl Session<'_> {
    /// Returns the current status.
    pub fn status(&self) -> &ReplicatorStatus {
        &self.state.status
    }

    /// Returns the status for modification. Changes are reported by the
    /// notification that follows the hook, if any.
    pub fn status_mut(&mut self) -> &mut ReplicatorStatus {
        &mut self.state.status
    }

    /// Returns the options.
    pub fn options(&self) -> &ReplicatorOptions {
        &self.state.options
    }

    /// Returns true if an engine instance exists.
    pub fn has_engine(&self) -> bool {
        self.state.engine.is_some()
    }

    /// Starts a new session with a fresh engine. Does nothing if an engine
    /// exists.
    pub fn start(&mut self) {
        if self.state.engine.is_none() {
            self.core.start_locked(self.state, self.transition);
        }
    }
}

impl Replicator {
    /// Creates a replicator for `database` and the given peer.
    pub fn new(
        database: Arc<dyn Database>,
        peer: impl PeerKind,
        options: ReplicatorOptions,
        callbacks: ReplicatorCallbacks,
    ) -> ReplicatorResult<Self> {
        if !options.push.is_enabled() && !options.pull.is_enabled() {
            return Err(ReplicatorError::InvalidParameter(
                "either push or pull must be enabled".into(),
            ));
        }

        let mut status = ReplicatorStatus::new(ActivityLevel::Stopped);
        status.set_flag(StatusFlags::HOST_REACHABLE, true);

        let core = ReplicatorCore {
            database,
            peer: Box::new(peer),
            callback_context: options.callback_context.clone(),
            state: Mutex::new(State {
                options,
                engine: None,
                generation: 0,
                status,
                pristine: true,
                active_when_suspended: false,
                response_headers: None,
                keepalive: None,
            }),
            on_status_changed: CallbackSlot::new(callbacks.on_status_changed),
            on_documents_ended: CallbackSlot::new(callbacks.on_documents_ended),
            on_blob_progress: CallbackSlot::new(callbacks.on_blob_progress),
        };
        debug!(peer = core.peer.kind_name(), url = %core.peer.url(), "Created replicator");
        Ok(Self {
            core: Arc::new(core),
        })
    }

    /// Creates a replicator between `database` and another local database.
    pub fn local(
        database: Arc<dyn Database>,
        other: Arc<dyn Database>,
        factory: Arc<dyn EngineFactory>,
        options: ReplicatorOptions,
        callbacks: ReplicatorCallbacks,
    ) -> ReplicatorResult<Self> {
        Self::new(database, LocalPeer::new(other, factory), options, callbacks)
    }

    /// Creates a replicator between `database` and a remote server.
    pub fn remote(
        database: Arc<dyn Database>,
        address: &str,
        factory: Arc<dyn EngineFactory>,
        options: ReplicatorOptions,
        callbacks: ReplicatorCallbacks,
    ) -> ReplicatorResult<Self> {
        let peer = RemotePeer::new(address, factory)?;
        Self::new(database, peer, options, callbacks)
    }

    /// Returns a handle that doesn't keep the replicator alive.
    pub fn downgrade(&self) -> WeakReplicator {
        WeakReplicator {
            core: Arc::downgrade(&self.core),
        }
    }

    /// Returns the peer's URL, which also namespaces checkpoints.
    pub fn url(&self) -> String {
        self.core.peer.url()
    }

    /// Returns the local database.
    pub fn database(&self) -> &Arc<dyn Database> {
        &self.core.database
    }

    /// Starts replicating. Does nothing if a session is already running.
    pub fn start(&self) {
        let mut transition = Transition::default();
        {
            let mut state = self.core.state.lock();
            if state.engine.is_none() {
                self.core.start_locked(&mut state, &mut transition);
            }
        }
        self.core.finish(transition);
    }

    /// Asks the session to stop.
    ///
    /// With a running engine this returns immediately and the `Stopped`
    /// status arrives later. Without one, the replicator becomes `Stopped`
    /// right away; a replicator that was never started reports that once.
    pub fn stop(&self) {
        let mut transition = Transition::default();
        {
            let mut state = self.core.state.lock();
            if let Some(engine) = &state.engine {
                engine.stop();
            } else if state.status.level != ActivityLevel::Stopped || state.pristine {
                state.pristine = false;
                state.status.level = ActivityLevel::Stopped;
                state.status.progress = Progress::default();
                state.status.set_flag(StatusFlags::WILL_RETRY, false);
                transition.notify = Some(state.status.clone());
                transition.release = state.keepalive.take();
            }
        }
        self.core.finish(transition);
    }

    /// Suspends or resumes the replicator.
    ///
    /// Suspending an active session stops its engine and reports `Offline`
    /// rather than `Stopped`. Resuming starts a fresh engine if the session
    /// was active when it was suspended.
    pub fn set_suspended(&self, suspended: bool) {
        let mut transition = Transition::default();
        {
            let mut state = self.core.state.lock();
            if !state.status.set_flag(StatusFlags::SUSPENDED, suspended) {
                return;
            }
            info!("{}", if suspended { "Suspended" } else { "Un-suspended" });
            if suspended {
                state.active_when_suspended = state.status.level >= ActivityLevel::Connecting;
                if state.active_when_suspended {
                    if let Some(engine) = &state.engine {
                        engine.stop();
                    }
                }
            } else if state.status.level == ActivityLevel::Offline
                && state.active_when_suspended
                && state.engine.is_none()
            {
                self.core.start_locked(&mut state, &mut transition);
            }
        }
        self.core.finish(transition);
    }

    /// Reconnects after a failure, if the peer kind supports it.
    pub fn retry(&self, reset_count: bool) -> ReplicatorResult<()> {
        let mut transition = Transition::default();
        let result = {
            let mut state = self.core.state.lock();
            let mut session = Session {
                core: &self.core,
                state: &mut *state,
                transition: &mut transition,
            };
            self.core.peer.retry(&mut session, reset_count)
        };
        self.core.finish(transition);
        result
    }

    /// Tells the replicator whether the peer's host is reachable.
    pub fn set_host_reachable(&self, reachable: bool) {
        let mut transition = Transition::default();
        {
            let mut state = self.core.state.lock();
            let mut session = Session {
                core: &self.core,
                state: &mut *state,
                transition: &mut transition,
            };
            self.core.peer.set_host_reachable(&mut session, reachable);
        }
        self.core.finish(transition);
    }

    /// Returns a snapshot of the status.
    pub fn status(&self) -> ReplicatorStatus {
        self.core.state.lock().status.clone()
    }

    /// Returns the CBOR-encoded headers of the current session's HTTP
    /// response, if one was received.
    pub fn response_headers(&self) -> Option<Bytes> {
        self.core.state.lock().response_headers.clone()
    }

    /// Returns a copy of the options.
    pub fn options(&self) -> ReplicatorOptions {
        self.core.state.lock().options.clone()
    }

    /// Replaces the properties. A running engine keeps the properties it
    /// was created with; the next session uses the new ones.
    pub fn set_properties(&self, properties: Properties) {
        self.core.state.lock().options.properties = properties;
    }

    /// Replaces the status callback.
    pub fn set_status_changed_callback(&self, callback: Option<Arc<StatusChangedFn>>) {
        self.core.on_status_changed.store(callback);
    }

    /// Replaces the documents-ended callback.
    pub fn set_documents_ended_callback(&self, callback: Option<Arc<DocumentsEndedFn>>) {
        self.core.on_documents_ended.store(callback);
    }

    /// Replaces the blob progress callback.
    pub fn set_blob_progress_callback(&self, callback: Option<Arc<BlobProgressFn>>) {
        self.core.on_blob_progress.store(callback);
    }

    /// Clears all callbacks.
    ///
    /// A delivery that was already underway may still complete; nothing
    /// starts after this returns.
    pub fn detach(&self) {
        self.core.on_status_changed.store(None);
        self.core.on_documents_ended.store(None);
        self.core.on_blob_progress.store(None);
    }

    /// Detaches the callbacks and drops this handle. A running session
    /// continues until it stops.
    pub fn release(self) {
        self.detach();
    }

    /// Returns the IDs of documents a push would still send.
    ///
    /// Asks the running engine if there is one, otherwise computes the
    /// answer from the last saved checkpoint.
    pub fn pending_document_ids(&self) -> ReplicatorResult<Vec<String>> {
        let mut ids = Vec::new();
        match self.core.pending_source()? {
            PendingSource::Live(engine) => {
                engine.pending_document_ids(&mut |info| ids.push(info.doc_id.clone()))?
            }
            PendingSource::Checkpoint(checkpointer) => checkpointer
                .pending_document_ids(self.core.database.as_ref(), &mut |info| {
                    ids.push(info.doc_id.clone())
                })?,
        }
        Ok(ids)
    }

    /// Returns true if a push would still send `doc_id`.
    pub fn is_document_pending(&self, doc_id: &str) -> ReplicatorResult<bool> {
        match self.core.pending_source()? {
            PendingSource::Live(engine) => engine.is_document_pending(doc_id),
            PendingSource::Checkpoint(checkpointer) => {
                checkpointer.is_document_pending(self.core.database.as_ref(), doc_id)
            }
        }
    }
}

impl fmt::Debug for Replicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replicator")
            .field("peer", &self.core.peer.kind_name())
            .field("url", &self.core.peer.url())
            .finish_non_exhaustive()
    }
}

enum PendingSource {
    Live(Arc<dyn SyncEngine>),
    Checkpoint(Checkpointer),
}

impl ReplicatorCore {
    fn start_locked(self: &Arc<Self>, state: &mut State, transition: &mut Transition) {
        state.pristine = false;
        state.generation += 1;
        let delegate = Arc::new(SessionDelegate {
            core: Arc::downgrade(self),
            generation: state.generation,
        });

        match self
            .peer
            .create_engine(Arc::clone(&self.database), state.options.clone(), delegate)
        {
            Ok(engine) => {
                info!(engine = %engine.name(), "Starting replicator");
                if state.keepalive.is_none() {
                    state.keepalive = Some(Arc::clone(self));
                }
                state.status.update_from_engine(&engine.status());
                state.response_headers = None;
                state.engine = Some(Arc::clone(&engine));
                engine.start();
            }
            Err(err) => {
                warn!(error = %err, "Couldn't create sync engine");
                state.status.level = ActivityLevel::Stopped;
                state.status.progress = Progress::default();
                state.status.error = Some(err.to_error_info());
                transition.notify = Some(state.status.clone());
                transition.release = state.keepalive.take();
            }
        }
    }

    fn pending_source(&self) -> ReplicatorResult<PendingSource> {
        let state = self.state.lock();
        if !state.options.push.is_enabled() {
            return Err(ReplicatorError::unsupported(
                "pending document IDs are not available for pull-only replication",
            ));
        }
        Ok(match &state.engine {
            Some(engine) => PendingSource::Live(Arc::clone(engine)),
            None => PendingSource::Checkpoint(Checkpointer::new(
                state.options.clone(),
                self.peer.url(),
            )),
        })
    }

    // Must be called with the lock released.
    fn finish(self: &Arc<Self>, transition: Transition) {
        if let Some(status) = transition.notify {
            self.notify_state_changed(&status);
        }
        drop(transition.release);
    }

    // Must be called with the lock released: the callback may call back in.
    fn notify_state_changed(self: &Arc<Self>, status: &ReplicatorStatus) {
        let progress = status.progress.percent();
        match &status.error {
            Some(err) => error!(
                "State: {}, progress={:.2}%, error={}",
                status.level, progress, err
            ),
            None => info!("State: {}, progress={:.2}%", status.level, progress),
        }

        if let Some(callback) = self.on_status_changed.load() {
            let handle = Replicator {
                core: Arc::clone(self),
            };
            callback(&handle, status, self.callback_context.as_ref());
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.lock().is_current(generation)
    }

    fn engine_got_http_response(&self, generation: u64, status: u16, headers: &HttpHeaders) {
        let mut state = self.state.lock();
        if !state.is_current(generation) {
            return;
        }
        debug_assert!(
            state.response_headers.is_none(),
            "second HTTP response from one engine"
        );
        if state.response_headers.is_some() {
            warn!(status, "Ignoring second HTTP response from engine");
            return;
        }
        let mut encoded = Vec::new();
        match ciborium::into_writer(headers, &mut encoded) {
            Ok(()) => state.response_headers = Some(Bytes::from(encoded)),
            Err(err) => warn!(status, error = %err, "Couldn't encode response headers"),
        }
    }

    fn engine_status_changed(self: &Arc<Self>, generation: u64, reported: &ReplicatorStatus) {
        let mut transition = Transition::default();
        {
            let mut state = self.state.lock();
            if !state.is_current(generation) {
                debug!(level = %reported.level, "Ignoring status from a discarded engine");
                return;
            }

            let old_level = state.status.level;
            state.status.update_from_engine(reported);
            {
                let mut session = Session {
                    core: self,
                    state: &mut *state,
                    transition: &mut transition,
                };
                let new_level = session.state.status.level;
                if new_level > ActivityLevel::Connecting && old_level <= ActivityLevel::Connecting {
                    self.peer.handle_connected(&mut session);
                }
                if session.state.status.level == ActivityLevel::Stopped {
                    if let Some(engine) = session.state.engine.take() {
                        engine.terminate();
                    }
                    if session.state.status.has_flag(StatusFlags::SUSPENDED) {
                        session.state.status.level = ActivityLevel::Offline;
                    } else {
                        self.peer.handle_stopped(&mut session);
                    }
                }
            }

            transition.notify = Some(state.status.clone());
            transition.release = state.release_if_stopped();
        }
        self.finish(transition);
    }

    fn engine_documents_ended(self: &Arc<Self>, generation: u64, revs: &[ReplicatedRev]) {
        if !self.is_current(generation) {
            return;
        }
        let Some(callback) = self.on_documents_ended.load() else {
            return;
        };
        let handle = Replicator {
            core: Arc::clone(self),
        };
        for (pushing, docs) in partition_by_direction(revs) {
            if !docs.is_empty() {
                callback(&handle, pushing, &docs, self.callback_context.as_ref());
            }
        }
    }

    fn engine_blob_progress(self: &Arc<Self>, generation: u64, progress: &EngineBlobProgress) {
        if !self.is_current(generation) {
            return;
        }
        if let Some(callback) = self.on_blob_progress.load() {
            let handle = Replicator {
                core: Arc::clone(self),
            };
            callback(
                &handle,
                &BlobProgress::from(progress),
                self.callback_context.as_ref(),
            );
        }
    }
}

impl Drop for ReplicatorCore {
    fn drop(&mut self) {
        info!("Freeing replicator");
        // An engine that was never stopped still references our delegate.
        if let Some(engine) = self.state.get_mut().engine.take() {
            engine.terminate();
        }
    }
}

/// The delegate registered with one engine instance.
struct SessionDelegate {
    core: Weak<ReplicatorCore>,
    generation: u64,
}

impl EngineDelegate for SessionDelegate {
    fn got_http_response(&self, status: u16, headers: &HttpHeaders) {
        if let Some(core) = self.core.upgrade() {
            core.engine_got_http_response(self.generation, status, headers);
        }
    }

    fn status_changed(&self, status: &ReplicatorStatus) {
        if let Some(core) = self.core.upgrade() {
            core.engine_status_changed(self.generation, status);
        }
    }

    fn documents_ended(&self, revs: &[ReplicatedRev]) {
        if let Some(core) = self.core.upgrade() {
            core.engine_documents_ended(self.generation, revs);
        }
    }

    fn blob_progress(&self, progress: &EngineBlobProgress) {
        if let Some(core) = self.core.upgrade() {
            core.engine_blob_progress(self.generation, progress);
        }
    }
}
