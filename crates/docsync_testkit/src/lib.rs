//! # docsync Testkit
//!
//! Test utilities for the docsync replicator.
//!
//! This crate provides:
//! - An in-memory [`docsync_replicator::Database`]
//! - A scriptable mock sync engine and its factory
//! - A recorder for application callbacks
//! - Property-based test generators using proptest
//! - Concurrent lifecycle stress helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docsync_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_replicator() {
//!     let fixture = ReplicatorFixture::local(ReplicatorOptions::pushing(ReplicatorMode::OneShot));
//!     fixture.replicator.start();
//!     fixture.factory.last_engine().unwrap().report_level(ActivityLevel::Busy);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::engine::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use docsync_replicator::*;
}

pub use engine::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
