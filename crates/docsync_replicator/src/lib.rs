//! # docsync replicator
//!
//! Lifecycle control for one replication session between a local database
//! and a peer.
//!
//! This crate provides:
//! - The [`Replicator`] state machine (start, stop, suspend, resume, retry)
//! - Status aggregation and thread-safe status snapshots
//! - Delivery of status, document and blob callbacks to the application
//! - Pending-document queries, live or from the last checkpoint
//! - Local and remote peer kinds
//!
//! The replication protocol itself runs in a [`SyncEngine`] supplied by an
//! [`EngineFactory`]; this crate only drives it.
//!
//! ## States
//!
//! ```text
//! Stopped ──start──► Connecting ──► Idle ⇄ Busy
//!    ▲                   │            │
//!    └──── engine stops ─┴────────────┘
//!                        │ (suspended, or transient failure of a remote)
//!                        ▼
//!                     Offline ──resume / retry──► Connecting
//! ```
//!
//! ## Key Invariants
//!
//! - Application callbacks never run with the replicator's lock held
//! - Engine-owned fields never overwrite the replicator's flag bits
//! - An engine instance is used for exactly one session
//! - The replicator stays alive while its level is not `Stopped`

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod checkpoint;
mod database;
mod engine;
mod error;
mod notify;
mod options;
mod peer;
mod replicator;
mod status;

pub use checkpoint::{Checkpoint, Checkpointer};
pub use database::{Database, DocumentFlags, DocumentInfo, Sequence};
pub use engine::{
    BlobKey, Direction, EngineBlobProgress, EngineDelegate, EngineFactory, EngineRequest,
    HttpHeaders, PeerEndpoint, ReplicatedRev, SyncEngine,
};
pub use error::{ErrorCode, ErrorDomain, ErrorInfo, ReplicatorError, ReplicatorResult};
pub use notify::{
    BlobProgress, BlobProgressFn, DocumentEnded, DocumentsEndedFn, ReplicatorCallbacks,
    StatusChangedFn,
};
pub use options::{keys, CallbackContext, Properties, ReplicatorMode, ReplicatorOptions};
pub use peer::{LocalPeer, PeerKind, RemotePeer};
pub use replicator::{Replicator, Session, WeakReplicator};
pub use status::{ActivityLevel, Progress, ReplicatorStatus, StatusFlags};

