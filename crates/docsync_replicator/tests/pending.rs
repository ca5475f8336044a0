//! Integration tests for pending-document queries.

use docsync_replicator::{Checkpoint, Database, ReplicatorError, ReplicatorMode, ReplicatorOptions};
use docsync_testkit::{checkpoint_strategy, write_history_strategy, ReplicatorFixture};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn push_once() -> ReplicatorOptions {
    ReplicatorOptions::pushing(ReplicatorMode::OneShot)
}

fn save_checkpoint(fixture: &ReplicatorFixture, checkpoint: Checkpoint) {
    fixture
        .db
        .save_checkpoint_for(
            &fixture.replicator.options(),
            &fixture.replicator.url(),
            checkpoint,
        )
        .unwrap();
}

fn completed_through(sequence: u64) -> Checkpoint {
    let mut checkpoint = Checkpoint::default();
    for s in 1..=sequence {
        checkpoint.complete(s);
    }
    checkpoint
}

#[test]
fn pull_only_replication_has_no_pending_documents() {
    let fixture = ReplicatorFixture::local(ReplicatorOptions::pulling(ReplicatorMode::Continuous));
    assert!(matches!(
        fixture.replicator.pending_document_ids(),
        Err(ReplicatorError::Unsupported(_))
    ));
    assert!(matches!(
        fixture.replicator.is_document_pending("a"),
        Err(ReplicatorError::Unsupported(_))
    ));
}

#[test]
fn everything_is_pending_before_first_push() {
    let fixture = ReplicatorFixture::local(push_once());
    fixture.db.put("a");
    fixture.db.put("b");
    assert_eq!(fixture.replicator.pending_document_ids().unwrap(), vec!["a", "b"]);
    assert!(fixture.replicator.is_document_pending("a").unwrap());
}

#[test]
fn checkpoint_excludes_pushed_sequences() {
    let fixture = ReplicatorFixture::local(push_once());
    fixture.db.put("a");
    fixture.db.put("b");
    fixture.db.put("c");
    let mut checkpoint = completed_through(1);
    checkpoint.complete(3);
    save_checkpoint(&fixture, checkpoint);

    assert_eq!(fixture.replicator.pending_document_ids().unwrap(), vec!["b"]);
    assert!(!fixture.replicator.is_document_pending("a").unwrap());
    assert!(fixture.replicator.is_document_pending("b").unwrap());
    assert!(!fixture.replicator.is_document_pending("c").unwrap());
}

#[test]
fn updated_document_is_pending_again() {
    let fixture = ReplicatorFixture::local(push_once());
    fixture.db.put("a");
    fixture.db.put("b");
    save_checkpoint(&fixture, completed_through(2));
    fixture.db.put("a");

    assert_eq!(fixture.replicator.pending_document_ids().unwrap(), vec!["a"]);
}

#[test]
fn deletions_are_skipped_on_first_push() {
    let fixture = ReplicatorFixture::local(push_once());
    fixture.db.put("a");
    fixture.db.put("gone");
    fixture.db.delete("gone");

    assert_eq!(fixture.replicator.pending_document_ids().unwrap(), vec!["a"]);
    assert!(!fixture.replicator.is_document_pending("gone").unwrap());

    save_checkpoint(&fixture, completed_through(1));
    assert_eq!(
        fixture.replicator.pending_document_ids().unwrap(),
        vec!["gone"]
    );
}

#[test]
fn skip_deleted_option_always_skips_deletions() {
    let fixture = ReplicatorFixture::local(push_once().with_skip_deleted(true));
    fixture.db.put("a");
    fixture.db.put("gone");
    save_checkpoint(&fixture, completed_through(2));
    fixture.db.delete("gone");

    assert!(fixture.replicator.pending_document_ids().unwrap().is_empty());
    assert!(!fixture.replicator.is_document_pending("gone").unwrap());
}

#[test]
fn doc_id_filter_limits_pending_set() {
    let fixture = ReplicatorFixture::local(push_once().with_doc_ids(["b"]));
    fixture.db.put("a");
    fixture.db.put("b");

    assert_eq!(fixture.replicator.pending_document_ids().unwrap(), vec!["b"]);
    assert!(!fixture.replicator.is_document_pending("a").unwrap());
}

#[test]
fn missing_document_is_not_pending() {
    let fixture = ReplicatorFixture::local(push_once());
    fixture.db.put("a");
    assert!(!fixture.replicator.is_document_pending("nope").unwrap());
}

#[test]
fn running_engine_answers_pending_queries() {
    let fixture = ReplicatorFixture::local(push_once());
    fixture.db.put("a");
    let engine = fixture.start();
    engine.set_pending(["x", "y"]);

    assert_eq!(fixture.replicator.pending_document_ids().unwrap(), vec!["x", "y"]);
    assert!(fixture.replicator.is_document_pending("x").unwrap());
    assert!(!fixture.replicator.is_document_pending("a").unwrap());

    engine.report_stopped();
    assert_eq!(fixture.replicator.pending_document_ids().unwrap(), vec!["a"]);
}

#[test]
fn checkpoints_are_keyed_by_filter() {
    let fixture = ReplicatorFixture::local(push_once());
    fixture.db.put("a");
    // Saved for a different doc-ID filter, so not ours.
    fixture
        .db
        .save_checkpoint_for(
            &push_once().with_doc_ids(["a"]),
            &fixture.replicator.url(),
            completed_through(1),
        )
        .unwrap();
    assert_eq!(fixture.replicator.pending_document_ids().unwrap(), vec!["a"]);
}

proptest! {
    #[test]
    fn bulk_and_single_queries_agree(
        writes in write_history_strategy(),
        checkpoint in checkpoint_strategy(40),
    ) {
        let fixture = ReplicatorFixture::local(push_once());
        let mut doc_ids = BTreeSet::new();
        for write in &writes {
            if write.delete {
                fixture.db.delete(&write.doc_id);
            } else {
                fixture.db.put(&write.doc_id);
            }
            doc_ids.insert(write.doc_id.clone());
        }
        let first_push = checkpoint.is_empty();
        save_checkpoint(&fixture, checkpoint.clone());

        let bulk: BTreeSet<String> = fixture
            .replicator
            .pending_document_ids()
            .unwrap()
            .into_iter()
            .collect();
        for doc_id in &doc_ids {
            let single = fixture.replicator.is_document_pending(doc_id).unwrap();
            prop_assert_eq!(single, bulk.contains(doc_id), "disagreement on {}", doc_id);

            let info = fixture.db.document_info(doc_id).unwrap().unwrap();
            let expected = !checkpoint.is_sequence_completed(info.sequence)
                && !(first_push && info.flags.deleted);
            prop_assert_eq!(single, expected, "wrong answer for {}", doc_id);
        }
        prop_assert!(bulk.is_subset(&doc_ids));
    }
}
