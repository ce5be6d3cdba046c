// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::ConnectionRegistry;
use crate::events::{ControllerMessage, ServerMessage};

#[tokio::test]
async fn observer_receives_initial_before_broadcast() {
    let registry = ConnectionRegistry::new();
    let (_id, mut rx) = registry.add_observer(ServerMessage::Pong).await;
    registry.broadcast(ServerMessage::Ping).await;

    assert!(matches!(rx.recv().await, Some(ServerMessage::Pong)));
    assert!(matches!(rx.recv().await, Some(ServerMessage::Ping)));
}

#[tokio::test]
async fn broadcast_drops_dead_observers() {
    let registry = ConnectionRegistry::new();
    let (_id, rx) = registry.add_observer(ServerMessage::Ping).await;
    assert_eq!(registry.observer_count().await, 1);

    drop(rx);
    registry.broadcast(ServerMessage::Ping).await;
    assert_eq!(registry.observer_count().await, 0);
}

#[tokio::test]
async fn remove_observer_is_idempotent() {
    let registry = ConnectionRegistry::new();
    let (id, _rx) = registry.add_observer(ServerMessage::Ping).await;
    registry.remove_observer(&id).await;
    registry.remove_observer(&id).await;
    assert_eq!(registry.observer_count().await, 0);
}

#[tokio::test]
async fn new_controller_displaces_prior() {
    let registry = ConnectionRegistry::new();
    let (first, _rx1) = registry.register_controller("DOOR-001").await;
    let (second, _rx2) = registry.register_controller("DOOR-001").await;

    assert!(first.cancel.is_cancelled());
    assert_eq!(first.close_reason(), "replaced");
    assert!(!second.cancel.is_cancelled());

    let current = registry.controller("DOOR-001").await.expect("registered");
    assert_eq!(current.id, second.id);
    assert_eq!(registry.controller_count().await, 1);
}

#[tokio::test]
async fn stale_handle_cannot_remove_replacement() {
    let registry = ConnectionRegistry::new();
    let (first, _rx1) = registry.register_controller("DOOR-001").await;
    let (second, _rx2) = registry.register_controller("DOOR-001").await;

    assert!(!registry.remove_controller(&first).await);
    assert!(registry.controller("DOOR-001").await.is_some());

    assert!(registry.remove_controller(&second).await);
    assert!(registry.controller("DOOR-001").await.is_none());
}

#[tokio::test]
async fn send_to_controller_requires_session() {
    let registry = ConnectionRegistry::new();
    let delivered = registry
        .send_to_controller("DOOR-001", ControllerMessage::Handshake)
        .await;
    assert!(!delivered);

    let (_handle, mut rx) = registry.register_controller("DOOR-001").await;
    let delivered = registry
        .send_to_controller("DOOR-001", ControllerMessage::Handshake)
        .await;
    assert!(delivered);
    assert!(matches!(rx.recv().await, Some(ControllerMessage::Handshake)));
}

#[tokio::test]
async fn touch_resets_idle() {
    let registry = ConnectionRegistry::new();
    let (handle, _rx) = registry.register_controller("DOOR-001").await;

    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    assert!(handle.idle().await >= std::time::Duration::from_millis(20));

    registry.touch_controller("DOOR-001").await;
    assert!(handle.idle().await < std::time::Duration::from_millis(20));
}
