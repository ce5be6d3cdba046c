// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection registry: dashboard observers and per-device controller
//! sessions.
//!
//! Each session gets a dedicated unbounded mpsc sender; the socket task on
//! the other end drains it, so registry sends never suspend. Fan-out
//! snapshots the observer map and iterates without holding the lock during
//! sends. At most one controller per device: a new registration displaces
//! and cancels any prior one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::events::{ControllerMessage, ServerMessage};

/// Handle for one controller session, shared between the socket task, the
/// heartbeat sweeper, and the registry map.
pub struct ControllerHandle {
    /// Registration identity; guards against a stale handle removing its
    /// replacement.
    pub id: Uuid,
    pub device_id: String,
    pub tx: mpsc::UnboundedSender<ControllerMessage>,
    pub cancel: CancellationToken,
    pub last_seen: RwLock<Instant>,
    pub connected_at: Instant,
    close_reason: std::sync::Mutex<&'static str>,
}

impl ControllerHandle {
    pub fn set_close_reason(&self, reason: &'static str) {
        if let Ok(mut guard) = self.close_reason.lock() {
            *guard = reason;
        }
    }

    pub fn close_reason(&self) -> &'static str {
        self.close_reason.lock().map(|guard| *guard).unwrap_or("closed")
    }

    pub async fn touch(&self) {
        *self.last_seen.write().await = Instant::now();
    }

    pub async fn idle(&self) -> Duration {
        self.last_seen.read().await.elapsed()
    }
}

/// Observer and controller session maps.
pub struct ConnectionRegistry {
    observers: RwLock<HashMap<Uuid, mpsc::UnboundedSender<ServerMessage>>>,
    controllers: RwLock<HashMap<String, Arc<ControllerHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self { observers: RwLock::new(HashMap::new()), controllers: RwLock::new(HashMap::new()) }
    }

    // -- Observers ------------------------------------------------------------

    /// Add an observer. `initial` is queued before the sender is published,
    /// so the snapshot always precedes any broadcast on the new channel.
    pub async fn add_observer(
        &self,
        initial: ServerMessage,
    ) -> (Uuid, mpsc::UnboundedReceiver<ServerMessage>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(initial);
        self.observers.write().await.insert(id, tx);
        tracing::debug!(observer = %id, "observer session added");
        (id, rx)
    }

    pub async fn remove_observer(&self, id: &Uuid) {
        if self.observers.write().await.remove(id).is_some() {
            tracing::debug!(observer = %id, "observer session removed");
        }
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }

    /// Best-effort fan-out to every observer; dead observers are dropped.
    pub async fn broadcast(&self, msg: ServerMessage) {
        let snapshot: Vec<(Uuid, mpsc::UnboundedSender<ServerMessage>)> = {
            let observers = self.observers.read().await;
            observers.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        let mut dead = Vec::new();
        for (id, tx) in snapshot {
            if tx.send(msg.clone()).is_err() {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut observers = self.observers.write().await;
            for id in dead {
                observers.remove(&id);
                tracing::debug!(observer = %id, "observer dropped on send failure");
            }
        }
    }

    // -- Controllers ----------------------------------------------------------

    /// Register the sole controller for `device_id`, displacing any prior
    /// session (closed with reason `"replaced"`).
    pub async fn register_controller(
        &self,
        device_id: &str,
    ) -> (Arc<ControllerHandle>, mpsc::UnboundedReceiver<ControllerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Arc::new(ControllerHandle {
            id: Uuid::new_v4(),
            device_id: device_id.to_owned(),
            tx,
            cancel: CancellationToken::new(),
            last_seen: RwLock::new(Instant::now()),
            connected_at: Instant::now(),
            close_reason: std::sync::Mutex::new("closed"),
        });

        let prior =
            self.controllers.write().await.insert(device_id.to_owned(), Arc::clone(&handle));
        if let Some(old) = prior {
            old.set_close_reason("replaced");
            old.cancel.cancel();
            tracing::info!(device_id, "controller session replaced");
        }

        (handle, rx)
    }

    /// Remove a controller only if the map still holds this registration.
    /// Returns false for a stale handle whose slot was already taken over.
    pub async fn remove_controller(&self, handle: &ControllerHandle) -> bool {
        let mut controllers = self.controllers.write().await;
        let current = controllers.get(&handle.device_id).map(|h| h.id);
        if current == Some(handle.id) {
            controllers.remove(&handle.device_id);
            true
        } else {
            false
        }
    }

    pub async fn controller(&self, device_id: &str) -> Option<Arc<ControllerHandle>> {
        self.controllers.read().await.get(device_id).map(Arc::clone)
    }

    pub async fn controllers_snapshot(&self) -> Vec<Arc<ControllerHandle>> {
        self.controllers.read().await.values().map(Arc::clone).collect()
    }

    pub async fn controller_count(&self) -> usize {
        self.controllers.read().await.len()
    }

    /// Queue a message for the device's controller session.
    /// Returns false when no controller is connected.
    pub async fn send_to_controller(&self, device_id: &str, msg: ControllerMessage) -> bool {
        match self.controllers.read().await.get(device_id) {
            Some(handle) => handle.tx.send(msg).is_ok(),
            None => false,
        }
    }

    /// Reset the controller's heartbeat deadline.
    pub async fn touch_controller(&self, device_id: &str) {
        if let Some(handle) = self.controller(device_id).await {
            handle.touch().await;
        }
    }

    /// Time since the controller's last inbound frame, if one is connected.
    pub async fn controller_idle(&self, device_id: &str) -> Option<Duration> {
        match self.controller(device_id).await {
            Some(handle) => Some(handle.idle().await),
            None => None,
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
