mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{device, wall_start, FakeRemote, DEVICE_PATH, MAC, OTHER_MAC};
use net_curfew::{
    ApiClient, DeviceSession, InFlightRegistry, Method, MutationError, MutationState,
    NotificationKind, TokioClock,
};

fn open(remote: &Arc<FakeRemote>, registry: &InFlightRegistry) -> DeviceSession {
    let clock = Arc::new(TokioClock::starting_at(wall_start()));
    DeviceSession::open(
        ApiClient::new(remote.clone()),
        MAC,
        registry.clone(),
        clock,
    )
}

fn remote() -> Arc<FakeRemote> {
    let clock = Arc::new(TokioClock::starting_at(wall_start()));
    FakeRemote::new(
        clock,
        vec![device(MAC, "Kids Tablet", true), device(OTHER_MAC, "Laptop", true)],
    )
}

#[tokio::test(start_paused = true)]
async fn failed_block_leaves_the_snapshot_untouched() {
    let remote = remote();
    remote.fail(Method::Post, "/api/control/block", "iptables: Permission denied");
    let session = open(&remote, &InFlightRegistry::new());
    session.refresh().await;
    let before = session.snapshot();
    let mut notifications = session.coordinator().subscribe_notifications();

    let err = session.coordinator().block().await.unwrap_err();

    assert_eq!(err.to_string(), "iptables: Permission denied");
    assert_eq!(session.snapshot(), before);
    assert_eq!(session.coordinator().state(), MutationState::Idle);
    assert_eq!(remote.count(Method::Get, DEVICE_PATH), 1);
    assert!(!remote.device(MAC).unwrap().blocked);

    let note = notifications.recv().await.unwrap();
    assert_eq!(note.kind, NotificationKind::Error);
    assert_eq!(note.title, "Error");
    assert_eq!(note.message, "iptables: Permission denied");
}

#[tokio::test(start_paused = true)]
async fn successful_block_resyncs_exactly_once() {
    let remote = remote();
    let session = open(&remote, &InFlightRegistry::new());
    session.refresh().await;
    assert_eq!(remote.count(Method::Get, DEVICE_PATH), 1);

    session.coordinator().block().await.unwrap();

    assert_eq!(remote.count(Method::Post, "/api/control/block"), 1);
    assert_eq!(remote.count(Method::Get, DEVICE_PATH), 2);
    let detail = session.snapshot().data.unwrap();
    assert!(detail.device.blocked);
    assert!(!detail.can_set_timer());
}

#[tokio::test(start_paused = true)]
async fn second_submission_while_in_flight_is_rejected() {
    let remote = remote();
    remote.delay(Method::Post, "/api/control/block", Duration::from_secs(2));
    let session = open(&remote, &InFlightRegistry::new());
    let coordinator = session.coordinator();
    let mut states = coordinator.subscribe_state();

    let (first, second) = tokio::join!(coordinator.block(), async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(states.borrow_and_update().is_busy());
        coordinator.block().await
    });

    first.unwrap();
    assert!(matches!(second, Err(MutationError::Busy { .. })));
    assert_eq!(remote.count(Method::Post, "/api/control/block"), 1);
    assert_eq!(coordinator.state(), MutationState::Idle);
}

#[tokio::test(start_paused = true)]
async fn busy_tracking_is_shared_between_sessions_of_one_device() {
    let remote = remote();
    remote.delay(Method::Post, "/api/control/unblock", Duration::from_secs(2));
    let registry = InFlightRegistry::new();
    let first = open(&remote, &registry);
    let second = open(&remote, &registry);

    let (unblock, block) = tokio::join!(first.coordinator().unblock(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        second.coordinator().block().await
    });

    unblock.unwrap();
    assert!(matches!(block, Err(MutationError::Busy { .. })));
    assert_eq!(remote.count(Method::Post, "/api/control/block"), 0);
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropped_mutation_does_not_stay_in_flight() {
    let remote = remote();
    remote.delay(Method::Post, "/api/control/block", Duration::from_secs(30));
    let registry = InFlightRegistry::new();
    let session = open(&remote, &registry);

    let outcome = tokio::time::timeout(Duration::from_secs(1), session.coordinator().block()).await;

    assert!(outcome.is_err());
    assert_eq!(session.coordinator().state(), MutationState::Idle);
    assert!(registry.in_flight(MAC).is_none());
}

#[tokio::test(start_paused = true)]
async fn cancel_timer_clears_locally_without_refetch() {
    let remote = remote();
    let session = open(&remote, &InFlightRegistry::new());
    session.coordinator().set_timer(15).await.unwrap();
    assert!(session.snapshot().data.unwrap().timer.is_some());
    let fetches = remote.count(Method::Get, DEVICE_PATH);

    session.coordinator().cancel_timer().await.unwrap();

    assert!(session.snapshot().data.unwrap().timer.is_none());
    assert_eq!(remote.count(Method::Get, DEVICE_PATH), fetches);
    assert!(!remote.has_timer(MAC));
}

#[tokio::test(start_paused = true)]
async fn rename_notifies_with_the_new_name() {
    let remote = remote();
    let session = open(&remote, &InFlightRegistry::new());
    session.refresh().await;
    let mut notifications = session.coordinator().subscribe_notifications();

    session.begin_rename();
    session.edit_rename("  Homework Tablet ");
    session.submit_rename().await.unwrap();

    let note = notifications.recv().await.unwrap();
    assert_eq!(note.message, "Device renamed to Homework Tablet");
    assert_eq!(
        session.snapshot().data.unwrap().device.name.as_deref(),
        Some("Homework Tablet")
    );
}

const TIMER_PATH: &str = "/api/timers/AA%3ABB%3ACC%3ADD%3AEE%3AFF";

#[tokio::test(start_paused = true)]
async fn failed_set_timer_leaves_the_snapshot_untouched() {
    let remote = remote();
    remote.fail(Method::Post, "/api/timers", "Timer service unavailable");
    let session = open(&remote, &InFlightRegistry::new());
    session.refresh().await;
    let before = session.snapshot();

    let err = session.coordinator().set_timer(30).await.unwrap_err();

    assert_eq!(err.to_string(), "Timer service unavailable");
    assert_eq!(session.snapshot(), before);
    assert!(session.snapshot().data.unwrap().timer.is_none());
    assert!(!remote.has_timer(MAC));
    assert_eq!(session.coordinator().state(), MutationState::Idle);
}

#[tokio::test(start_paused = true)]
async fn failed_cancel_timer_keeps_the_timer() {
    let remote = remote();
    let session = open(&remote, &InFlightRegistry::new());
    session.coordinator().set_timer(30).await.unwrap();
    remote.fail(Method::Delete, TIMER_PATH, "Timer store locked");
    let before = session.snapshot();
    assert!(before.data.as_ref().unwrap().timer.is_some());

    let err = session.coordinator().cancel_timer().await.unwrap_err();

    assert_eq!(err.to_string(), "Timer store locked");
    assert_eq!(session.snapshot(), before);
    assert!(session.snapshot().data.unwrap().timer.is_some());
    assert!(remote.has_timer(MAC));
    assert_eq!(session.coordinator().state(), MutationState::Idle);
}

#[tokio::test(start_paused = true)]
async fn failed_rename_leaves_the_snapshot_untouched() {
    let remote = remote();
    remote.fail(Method::Put, &format!("{}/name", DEVICE_PATH), "Name too long");
    let session = open(&remote, &InFlightRegistry::new());
    session.refresh().await;
    let before = session.snapshot();

    session.begin_rename();
    session.edit_rename("Homework Tablet");
    let err = session.submit_rename().await.unwrap_err();

    assert_eq!(err.to_string(), "Name too long");
    assert_eq!(session.snapshot(), before);
    assert!(session.rename_draft().is_editing());
    assert_eq!(
        remote.device(MAC).unwrap().name.as_deref(),
        Some("Kids Tablet")
    );
}
