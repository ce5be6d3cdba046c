// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::authorize;
use crate::config::{default_seeds, WardConfig};
use crate::events::{ControllerMessage, ServerMessage};
use crate::model::{
    DoorCommand, LockState, Outcome, PhysicalStatus, BUTTON_USER_ID,
};
use crate::state::WardState;

fn test_config() -> WardConfig {
    WardConfig {
        host: "127.0.0.1".into(),
        port: 0,
        allowed_origins: "*".into(),
        api_prefix: "/api".into(),
        ws_endpoint: "/ws".into(),
        devices_config: None,
        max_attempts_per_minute: 100,
        max_failed_attempts: 5,
        lockout_secs: 60,
        cleanup_interval_secs: 3600,
        ping_interval_secs: 10,
        pong_deadline_secs: 30,
        admin_user_id: "admin".into(),
        access_log_retention: 10_000,
    }
}

fn test_state() -> Arc<WardState> {
    Arc::new(WardState::new(test_config(), default_seeds(), CancellationToken::new()))
}

fn test_state_with(config: WardConfig) -> Arc<WardState> {
    Arc::new(WardState::new(config, default_seeds(), CancellationToken::new()))
}

// -- Virtual device rules -----------------------------------------------------

#[tokio::test]
async fn virtual_open_when_unlocked_granted() {
    let state = test_state();
    let decision = authorize(&state, "DOOR-002", "alice", DoorCommand::Open).await;

    assert_eq!(decision.outcome, Outcome::Granted);
    assert_eq!(decision.message, "granted");

    let device = state.store.get_device("DOOR-002").await.expect("seeded");
    assert_eq!(device.physical_status, PhysicalStatus::Open);
    assert_eq!(state.store.event_count().await, 1);
}

#[tokio::test]
async fn virtual_open_when_locked_denied() {
    let state = test_state();
    authorize(&state, "DOOR-002", "admin", DoorCommand::Lock).await;

    let decision = authorize(&state, "DOOR-002", "alice", DoorCommand::Open).await;
    assert_eq!(decision.outcome, Outcome::Denied);
    assert_eq!(decision.message, "door_locked");

    let device = state.store.get_device("DOOR-002").await.expect("seeded");
    assert_eq!(device.physical_status, PhysicalStatus::Closed);
}

#[tokio::test]
async fn admin_opens_through_lock() {
    let state = test_state();
    authorize(&state, "DOOR-002", "admin", DoorCommand::Lock).await;

    let decision = authorize(&state, "DOOR-002", "admin", DoorCommand::Open).await;
    assert_eq!(decision.outcome, Outcome::Granted);

    let device = state.store.get_device("DOOR-002").await.expect("seeded");
    assert_eq!(device.physical_status, PhysicalStatus::Open);
    assert_eq!(device.lock_state, LockState::Locked);
}

#[tokio::test]
async fn close_needs_no_precondition() {
    let state = test_state();
    authorize(&state, "DOOR-002", "alice", DoorCommand::Open).await;

    let decision = authorize(&state, "DOOR-002", "bob", DoorCommand::Close).await;
    assert_eq!(decision.outcome, Outcome::Granted);
    let device = state.store.get_device("DOOR-002").await.expect("seeded");
    assert_eq!(device.physical_status, PhysicalStatus::Closed);
}

// -- No-op edges --------------------------------------------------------------

#[tokio::test]
async fn open_already_open_is_no_op() {
    let state = test_state();
    authorize(&state, "DOOR-002", "alice", DoorCommand::Open).await;
    let before = state.store.event_count().await;

    let decision = authorize(&state, "DOOR-002", "alice", DoorCommand::Open).await;
    assert_eq!(decision.outcome, Outcome::Granted);
    assert_eq!(decision.message, "no_op");
    // No state change, but the attempt is still audited.
    assert_eq!(state.store.event_count().await, before + 1);
}

#[tokio::test]
async fn unlock_already_unlocked_is_no_op() {
    let state = test_state();
    let decision = authorize(&state, "DOOR-002", "admin", DoorCommand::Unlock).await;
    assert_eq!(decision.outcome, Outcome::Granted);
    assert_eq!(decision.message, "no_op");
    let device = state.store.get_device("DOOR-002").await.expect("seeded");
    assert_eq!(device.lock_state, LockState::Unlocked);
}

// -- Role rules ---------------------------------------------------------------

#[tokio::test]
async fn lock_requires_admin() {
    let state = test_state();
    let decision = authorize(&state, "DOOR-002", "alice", DoorCommand::Lock).await;
    assert_eq!(decision.outcome, Outcome::Denied);
    assert_eq!(decision.message, "not_permitted");

    let device = state.store.get_device("DOOR-002").await.expect("seeded");
    assert_eq!(device.lock_state, LockState::Unlocked);
}

#[tokio::test]
async fn unlock_requires_admin() {
    let state = test_state();
    let decision = authorize(&state, "DOOR-001", "bob", DoorCommand::Unlock).await;
    assert_eq!(decision.outcome, Outcome::Denied);
    assert_eq!(decision.message, "not_permitted");
}

#[tokio::test]
async fn lock_applies_to_physical_without_dispatch() {
    let state = test_state();
    // No controller connected; the lock is a server concept.
    authorize(&state, "DOOR-001", "admin", DoorCommand::Unlock).await;
    let device = state.store.get_device("DOOR-001").await.expect("seeded");
    assert_eq!(device.lock_state, LockState::Unlocked);
}

// -- Unknown device -----------------------------------------------------------

#[tokio::test]
async fn unknown_device_denied_and_audited() {
    let state = test_state();
    let decision = authorize(&state, "DOOR-999", "alice", DoorCommand::Open).await;
    assert_eq!(decision.outcome, Outcome::Denied);
    assert_eq!(decision.message, "unknown_device");
    assert!(decision.device.is_none());

    let events = state.store.list_events(1).await;
    assert_eq!(events[0].device_id, "DOOR-999");
    assert_eq!(events[0].status, Outcome::Denied);
}

// -- Physical dispatch --------------------------------------------------------

#[tokio::test]
async fn physical_open_without_controller_is_device_offline() {
    let state = test_state();
    authorize(&state, "DOOR-001", "admin", DoorCommand::Unlock).await;

    let decision = authorize(&state, "DOOR-001", "carol", DoorCommand::Open).await;
    assert_eq!(decision.outcome, Outcome::Denied);
    assert_eq!(decision.message, "device_offline");

    let device = state.store.get_device("DOOR-001").await.expect("seeded");
    assert_eq!(device.physical_status, PhysicalStatus::Closed);
}

#[tokio::test]
async fn physical_open_dispatches_without_changing_status() {
    let state = test_state();
    let (_handle, mut rx) = state.accept_controller("DOOR-001").await.expect("register");
    assert!(matches!(rx.recv().await, Some(ControllerMessage::Handshake)));

    authorize(&state, "DOOR-001", "admin", DoorCommand::Unlock).await;
    let decision = authorize(&state, "DOOR-001", "carol", DoorCommand::Open).await;
    assert_eq!(decision.outcome, Outcome::Granted);

    match rx.recv().await {
        Some(ControllerMessage::Command { command, .. }) => assert_eq!(command, DoorCommand::Open),
        other => panic!("expected dispatched command, got {other:?}"),
    }

    // Status waits for the controller's confirmation.
    let device = state.store.get_device("DOOR-001").await.expect("seeded");
    assert_eq!(device.physical_status, PhysicalStatus::Closed);
}

// -- Physical button path -----------------------------------------------------

#[tokio::test]
async fn button_cannot_lock() {
    let state = test_state();
    let decision = authorize(&state, "DOOR-001", BUTTON_USER_ID, DoorCommand::Lock).await;
    assert_eq!(decision.outcome, Outcome::Denied);
    assert_eq!(decision.message, "not_permitted");
}

#[tokio::test]
async fn button_open_on_locked_door_denied_with_pushback() {
    let state = test_state();
    let (_handle, mut rx) = state.accept_controller("DOOR-001").await.expect("register");
    assert!(matches!(rx.recv().await, Some(ControllerMessage::Handshake)));

    let decision = authorize(&state, "DOOR-001", BUTTON_USER_ID, DoorCommand::Open).await;
    assert_eq!(decision.outcome, Outcome::Denied);
    assert_eq!(decision.message, "door_locked");

    // The controller is told to suppress local actuation.
    match rx.recv().await {
        Some(ControllerMessage::CommandDenied { reason, .. }) => assert_eq!(reason, "door_locked"),
        other => panic!("expected command_denied, got {other:?}"),
    }

    let events = state.store.list_events(1).await;
    assert_eq!(events[0].user_id, BUTTON_USER_ID);
    assert_eq!(events[0].status, Outcome::Denied);
}

#[tokio::test]
async fn button_open_when_unlocked_dispatches() {
    let state = test_state();
    let (_handle, mut rx) = state.accept_controller("DOOR-001").await.expect("register");
    assert!(matches!(rx.recv().await, Some(ControllerMessage::Handshake)));

    authorize(&state, "DOOR-001", "admin", DoorCommand::Unlock).await;
    let decision = authorize(&state, "DOOR-001", BUTTON_USER_ID, DoorCommand::Open).await;
    assert_eq!(decision.outcome, Outcome::Granted);
    assert!(matches!(rx.recv().await, Some(ControllerMessage::Command { .. })));
}

// -- Rate limiting ------------------------------------------------------------

#[tokio::test]
async fn brute_force_lockout_after_repeated_denials() {
    let mut config = test_config();
    config.max_failed_attempts = 3;
    let state = test_state_with(config);

    for _ in 0..3 {
        let decision = authorize(&state, "DOOR-001", "mallory", DoorCommand::Open).await;
        assert_eq!(decision.message, "door_locked");
    }

    let decision = authorize(&state, "DOOR-001", "mallory", DoorCommand::Open).await;
    assert_eq!(decision.outcome, Outcome::Denied);
    assert_eq!(decision.message, "locked_out");
    let remaining = decision.retry_after_secs.expect("lockout carries remaining seconds");
    assert!(remaining >= 1);
    assert!(remaining <= 60);

    // A different user on the same device is unaffected.
    let decision = authorize(&state, "DOOR-001", "admin", DoorCommand::Unlock).await;
    assert_eq!(decision.outcome, Outcome::Granted);
}

#[tokio::test]
async fn pre_check_denials_are_audited() {
    let mut config = test_config();
    config.max_failed_attempts = 1;
    let state = test_state_with(config);

    authorize(&state, "DOOR-001", "mallory", DoorCommand::Open).await;
    authorize(&state, "DOOR-001", "mallory", DoorCommand::Open).await;

    let events = state.store.list_events(2).await;
    assert_eq!(events[0].message, "locked_out");
    assert_eq!(events[1].message, "door_locked");
}

// -- Broadcast ordering -------------------------------------------------------

#[tokio::test]
async fn state_change_broadcast_precedes_access_event() {
    let state = test_state();
    let (_id, mut rx) = state.accept_observer().await;
    assert!(matches!(rx.recv().await, Some(ServerMessage::InitialData { .. })));

    authorize(&state, "DOOR-002", "alice", DoorCommand::Open).await;

    match rx.recv().await {
        Some(ServerMessage::DeviceStateChange { data }) => {
            assert_eq!(data.device_id, "DOOR-002");
            assert_eq!(data.new_state.physical_status, PhysicalStatus::Open);
        }
        other => panic!("expected device_state_change first, got {other:?}"),
    }
    match rx.recv().await {
        Some(ServerMessage::AccessEvent { data }) => {
            assert_eq!(data.device_id, "DOOR-002");
            assert_eq!(data.status, Outcome::Granted);
        }
        other => panic!("expected access_event second, got {other:?}"),
    }
}

#[tokio::test]
async fn no_op_broadcasts_only_the_access_event() {
    let state = test_state();
    let (_id, mut rx) = state.accept_observer().await;
    assert!(matches!(rx.recv().await, Some(ServerMessage::InitialData { .. })));

    authorize(&state, "DOOR-002", "bob", DoorCommand::Close).await;

    assert!(matches!(rx.recv().await, Some(ServerMessage::AccessEvent { .. })));
}
