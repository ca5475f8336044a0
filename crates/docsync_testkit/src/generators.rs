//! Property-based test generators using proptest.
//!
//! Provides strategies for engine reports and for database contents paired
//! with checkpoints.

use docsync_replicator::{Checkpoint, Direction, ErrorDomain, ErrorInfo, ReplicatedRev, Sequence};
use proptest::prelude::*;

/// Strategy for document IDs drawn from a small alphabet, so that
/// collisions are common.
pub fn doc_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("doc-[a-f]{1,2}").expect("Invalid regex")
}

/// Strategy for transfer directions.
pub fn direction_strategy() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Pushing), Just(Direction::Pulling)]
}

/// Strategy for a single finished revision, sometimes failed.
pub fn replicated_rev_strategy() -> impl Strategy<Value = ReplicatedRev> {
    (
        direction_strategy(),
        doc_id_strategy(),
        1u64..100,
        prop::option::weighted(0.2, any::<bool>()),
    )
        .prop_map(|(direction, doc_id, sequence, failure)| {
            let mut rev = ReplicatedRev::new(direction, doc_id, format!("1-{sequence:x}"));
            rev.sequence = sequence;
            match failure {
                Some(transient) => rev.with_error(ErrorInfo {
                    domain: ErrorDomain::Network,
                    code: 2,
                    message: "transfer failed".into(),
                    transient,
                }),
                None => rev,
            }
        })
}

/// Strategy for a batch of finished revisions in mixed directions.
pub fn rev_batch_strategy() -> impl Strategy<Value = Vec<ReplicatedRev>> {
    prop::collection::vec(replicated_rev_strategy(), 0..32)
}

/// One write to a test database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentWrite {
    /// Document written.
    pub doc_id: String,
    /// True if the write deletes the document.
    pub delete: bool,
}

/// Strategy for a history of writes.
pub fn write_history_strategy() -> impl Strategy<Value = Vec<DocumentWrite>> {
    prop::collection::vec(
        (doc_id_strategy(), prop::bool::weighted(0.25))
            .prop_map(|(doc_id, delete)| DocumentWrite { doc_id, delete }),
        0..40,
    )
}

/// Strategy for a checkpoint over sequences `1..=max_sequence`.
///
/// The result mixes a contiguous completed prefix with scattered completed
/// sequences above it, and is sometimes empty.
pub fn checkpoint_strategy(max_sequence: Sequence) -> impl Strategy<Value = Checkpoint> {
    (
        0..=max_sequence,
        prop::collection::btree_set(1..=max_sequence.max(1), 0..8),
    )
        .prop_map(|(prefix, scattered)| {
            let mut checkpoint = Checkpoint::default();
            for sequence in 1..=prefix {
                checkpoint.complete(sequence);
            }
            for sequence in scattered {
                checkpoint.complete(sequence);
            }
            checkpoint
        })
}
