//! Integration tests for retry and reachability handling.

use docsync_replicator::{
    ActivityLevel, ErrorDomain, ErrorInfo, PeerEndpoint, Replicator, ReplicatorCallbacks,
    ReplicatorError, ReplicatorMode, ReplicatorOptions, StatusFlags,
};
use docsync_testkit::{
    init_test_tracing, MemoryDatabase, MockEngineFactory, ReplicatorFixture, TEST_REMOTE_URL,
};
use std::sync::Arc;

fn one_shot() -> ReplicatorOptions {
    ReplicatorOptions::new(ReplicatorMode::OneShot, ReplicatorMode::OneShot)
}

fn continuous() -> ReplicatorOptions {
    ReplicatorOptions::pulling(ReplicatorMode::Continuous)
}

fn connection_lost() -> ErrorInfo {
    ErrorInfo::transient(ErrorDomain::Network, 2, "connection reset")
}

/// Fails the current engine transiently and returns the resulting level.
fn fail_transiently(fixture: &ReplicatorFixture) -> ActivityLevel {
    let engine = fixture.engine();
    engine.report_level(ActivityLevel::Connecting);
    engine.report_stopped_with_error(connection_lost());
    fixture.replicator.status().level
}

#[test]
fn rejects_non_websocket_urls() {
    init_test_tracing();
    let result = Replicator::remote(
        MemoryDatabase::shared("local"),
        "https://sync.example.com/travel",
        Arc::new(MockEngineFactory::new()),
        one_shot(),
        ReplicatorCallbacks::new(),
    );
    assert!(matches!(result, Err(ReplicatorError::InvalidUrl { .. })));
}

#[test]
fn engine_is_created_for_the_remote_url() {
    let fixture = ReplicatorFixture::remote(one_shot());
    assert_eq!(fixture.replicator.url(), TEST_REMOTE_URL);
    let engine = fixture.start();
    match engine.peer() {
        PeerEndpoint::Remote(url) => assert_eq!(url.as_str(), TEST_REMOTE_URL),
        other => panic!("unexpected peer {other:?}"),
    }
}

#[test]
fn local_replication_cannot_retry() {
    let fixture = ReplicatorFixture::local(one_shot());
    assert_eq!(fixture.replicator.url(), "memory:///other");
    assert!(matches!(
        fixture.replicator.retry(false),
        Err(ReplicatorError::Unsupported(_))
    ));
}

#[test]
fn stopped_replicator_cannot_retry() {
    let fixture = ReplicatorFixture::remote(one_shot());
    assert!(matches!(
        fixture.replicator.retry(false),
        Err(ReplicatorError::Unsupported(_))
    ));
}

#[test]
fn retry_while_connected_is_a_no_op() {
    let fixture = ReplicatorFixture::remote(one_shot());
    fixture.start().report_level(ActivityLevel::Idle);
    fixture.replicator.retry(false).unwrap();
    assert_eq!(fixture.factory.engine_count(), 1);
}

#[test]
fn transient_failure_goes_offline_then_gives_up() {
    let fixture = ReplicatorFixture::remote(one_shot());
    fixture.replicator.start();

    assert_eq!(fail_transiently(&fixture), ActivityLevel::Offline);
    let status = fixture.replicator.status();
    assert!(status.has_flag(StatusFlags::WILL_RETRY));
    assert_eq!(status.error, Some(connection_lost()));
    assert!(fixture.engine().is_terminated());

    fixture.replicator.retry(false).unwrap();
    assert_eq!(fixture.factory.engine_count(), 2);
    assert!(!fixture.replicator.status().has_flag(StatusFlags::WILL_RETRY));
    assert_eq!(fail_transiently(&fixture), ActivityLevel::Offline);

    fixture.replicator.retry(false).unwrap();
    assert_eq!(fail_transiently(&fixture), ActivityLevel::Stopped);
    assert!(!fixture.replicator.status().has_flag(StatusFlags::WILL_RETRY));
    assert_eq!(
        fixture.recorder.levels(),
        vec![
            ActivityLevel::Connecting,
            ActivityLevel::Offline,
            ActivityLevel::Connecting,
            ActivityLevel::Offline,
            ActivityLevel::Connecting,
            ActivityLevel::Stopped,
        ]
    );
}

#[test]
fn reset_count_grants_more_attempts() {
    let fixture = ReplicatorFixture::remote(one_shot());
    fixture.replicator.start();
    fail_transiently(&fixture);
    fixture.replicator.retry(false).unwrap();
    fail_transiently(&fixture);

    fixture.replicator.retry(true).unwrap();
    assert_eq!(fail_transiently(&fixture), ActivityLevel::Offline);
}

#[test]
fn successful_connection_resets_attempts() {
    let fixture = ReplicatorFixture::remote(one_shot());
    fixture.replicator.start();
    fail_transiently(&fixture);
    fixture.replicator.retry(false).unwrap();
    fail_transiently(&fixture);
    fixture.replicator.retry(false).unwrap();

    let engine = fixture.engine();
    engine.report_level(ActivityLevel::Busy);
    engine.report_stopped_with_error(connection_lost());
    assert_eq!(fixture.replicator.status().level, ActivityLevel::Offline);
}

#[test]
fn continuous_replication_keeps_retrying() {
    let fixture = ReplicatorFixture::remote(continuous());
    fixture.replicator.start();
    for _ in 0..5 {
        assert_eq!(fail_transiently(&fixture), ActivityLevel::Offline);
        fixture.replicator.retry(false).unwrap();
    }
    assert_eq!(fixture.factory.engine_count(), 6);
}

#[test]
fn permanent_failure_stops() {
    let fixture = ReplicatorFixture::remote(continuous());
    let engine = fixture.start();
    engine.report_stopped_with_error(ErrorInfo::new(ErrorDomain::WebSocket, 401, "unauthorized"));
    let status = fixture.replicator.status();
    assert_eq!(status.level, ActivityLevel::Stopped);
    assert!(!status.has_flag(StatusFlags::WILL_RETRY));
}

#[test]
fn host_becoming_reachable_restarts_offline_session() {
    let fixture = ReplicatorFixture::remote(continuous());
    fixture.replicator.start();
    fixture.replicator.set_host_reachable(false);
    assert!(!fixture
        .replicator
        .status()
        .has_flag(StatusFlags::HOST_REACHABLE));
    fail_transiently(&fixture);

    fixture.replicator.set_host_reachable(true);
    assert_eq!(fixture.factory.engine_count(), 2);
    let status = fixture.replicator.status();
    assert!(status.has_flag(StatusFlags::HOST_REACHABLE));
    assert!(!status.has_flag(StatusFlags::WILL_RETRY));
}

#[test]
fn reachability_does_not_restart_when_suspended() {
    let fixture = ReplicatorFixture::remote(continuous());
    fixture.replicator.start();
    fixture.replicator.set_host_reachable(false);
    fail_transiently(&fixture);
    fixture.replicator.set_suspended(true);

    fixture.replicator.set_host_reachable(true);
    assert_eq!(fixture.factory.engine_count(), 1);
}

#[test]
fn reachability_does_not_restart_stopped_session() {
    let fixture = ReplicatorFixture::remote(continuous());
    fixture.replicator.set_host_reachable(false);
    fixture.replicator.set_host_reachable(true);
    assert_eq!(fixture.factory.engine_count(), 0);
}

#[test]
fn local_replication_ignores_reachability() {
    let fixture = ReplicatorFixture::local(one_shot());
    fixture.replicator.set_host_reachable(false);
    assert!(fixture
        .replicator
        .status()
        .has_flag(StatusFlags::HOST_REACHABLE));
}

#[test]
fn suspended_failure_does_not_schedule_retry() {
    let fixture = ReplicatorFixture::remote(continuous());
    let engine = fixture.start();
    engine.report_level(ActivityLevel::Busy);
    fixture.replicator.set_suspended(true);
    engine.report_stopped_with_error(connection_lost());

    let status = fixture.replicator.status();
    assert_eq!(status.level, ActivityLevel::Offline);
    assert!(!status.has_flag(StatusFlags::WILL_RETRY));

    fixture.replicator.set_suspended(false);
    assert_eq!(fixture.factory.engine_count(), 2);
}

#[test]
fn stopping_while_waiting_to_retry_clears_will_retry() {
    let fixture = ReplicatorFixture::remote(continuous());
    fixture.replicator.start();
    fail_transiently(&fixture);
    assert!(fixture.replicator.status().has_flag(StatusFlags::WILL_RETRY));

    fixture.replicator.stop();
    let status = fixture.replicator.status();
    assert_eq!(status.level, ActivityLevel::Stopped);
    assert!(!status.has_flag(StatusFlags::WILL_RETRY));
    let reported = fixture.recorder.last_status().unwrap();
    assert!(!reported.has_flag(StatusFlags::WILL_RETRY));

    fixture.replicator.start();
    assert!(!fixture.replicator.status().has_flag(StatusFlags::WILL_RETRY));
}

#[test]
fn retry_while_suspended_does_not_reconnect() {
    let fixture = ReplicatorFixture::remote(continuous());
    fixture.replicator.start();
    fail_transiently(&fixture);
    fixture.replicator.set_suspended(true);

    fixture.replicator.retry(false).unwrap();
    assert_eq!(fixture.factory.engine_count(), 1);
    assert_eq!(fixture.replicator.status().level, ActivityLevel::Offline);

    fixture.replicator.set_suspended(false);
    fixture.replicator.retry(false).unwrap();
    assert_eq!(fixture.factory.engine_count(), 2);
}
