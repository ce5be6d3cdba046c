// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared coordinator state and the orchestration operations that cut across
//! the store, the registry, and the broadcaster.

use std::time::Instant;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{DeviceSeed, WardConfig};
use crate::error::WardError;
use crate::events::{
    ControllerMessage, DeviceStateChange, InitialData, ServerMessage,
};
use crate::limiter::RateLimiter;
use crate::model::{now_iso, AccessEvent, ConnectionStatus, Device, DeviceKind, Outcome};
use crate::registry::{ConnectionRegistry, ControllerHandle};
use crate::store::{DevicePatch, StateStore};

/// Shared doorward state.
pub struct WardState {
    pub config: WardConfig,
    pub store: StateStore,
    pub limiter: RateLimiter,
    pub registry: ConnectionRegistry,
    /// Serializes check -> decide -> mutate -> broadcast sequences so that
    /// read-modify-write decisions are race-free and per-device broadcast
    /// order matches mutation order. Helpers below never take it; entry
    /// points do.
    pub gate: Mutex<()>,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl WardState {
    pub fn new(config: WardConfig, seeds: Vec<DeviceSeed>, shutdown: CancellationToken) -> Self {
        let store = StateStore::new(seeds, config.access_log_retention);
        let limiter = RateLimiter::new(
            config.max_attempts_per_minute,
            config.max_failed_attempts,
            config.lockout_duration(),
        );
        Self {
            config,
            store,
            limiter,
            registry: ConnectionRegistry::new(),
            gate: Mutex::new(()),
            shutdown,
            started_at: Instant::now(),
        }
    }

    // -- Broadcast helpers (callers hold the gate where ordering matters) -----

    pub async fn broadcast_state_change(&self, device: &Device) {
        self.registry
            .broadcast(ServerMessage::DeviceStateChange {
                data: DeviceStateChange {
                    device_id: device.device_id.clone(),
                    new_state: device.clone(),
                    timestamp: now_iso(),
                },
            })
            .await;
    }

    /// Append an access event to the audit trail and broadcast it.
    pub async fn record_access(
        &self,
        device_id: &str,
        user_id: &str,
        command: &str,
        status: Outcome,
        message: &str,
    ) {
        let event = AccessEvent {
            timestamp: now_iso(),
            device_id: device_id.to_owned(),
            user_id: user_id.to_owned(),
            command: command.to_owned(),
            status,
            message: message.to_owned(),
        };
        self.store.append_event(event.clone()).await;
        self.registry.broadcast(ServerMessage::AccessEvent { data: event }).await;
    }

    // -- Session orchestration (entry points; take the gate themselves) -------

    /// Accept a dashboard observer: the initial device snapshot is queued
    /// atomically with the registration so no broadcast can precede it.
    pub async fn accept_observer(&self) -> (Uuid, mpsc::UnboundedReceiver<ServerMessage>) {
        let _gate = self.gate.lock().await;
        let devices = self.store.list_devices().await;
        let initial = ServerMessage::InitialData {
            data: InitialData { devices, timestamp: now_iso() },
        };
        self.registry.add_observer(initial).await
    }

    /// Accept the sole controller for a physical device: displace any prior
    /// session, flip the device online, broadcast, and queue a handshake so
    /// the device re-announces its status.
    pub async fn accept_controller(
        &self,
        device_id: &str,
    ) -> Result<(std::sync::Arc<ControllerHandle>, mpsc::UnboundedReceiver<ControllerMessage>), WardError>
    {
        let device = self
            .store
            .get_device(device_id)
            .await
            .ok_or_else(|| WardError::not_found("device not found"))?;
        if device.kind == DeviceKind::Virtual {
            return Err(WardError::bad_request("virtual devices have no controller"));
        }

        let (handle, rx) = self.registry.register_controller(device_id).await;
        let _ = handle.tx.send(ControllerMessage::Handshake);

        let _gate = self.gate.lock().await;
        if let Some(updated) = self
            .store
            .update_device(device_id, DevicePatch::connection(ConnectionStatus::Online))
            .await
        {
            self.broadcast_state_change(&updated).await;
        }
        tracing::info!(device_id, "controller session online");
        Ok((handle, rx))
    }

    /// Drop a controller session. A stale handle (already displaced) is a
    /// no-op; otherwise the device goes offline and the change is broadcast.
    pub async fn drop_controller(&self, handle: &ControllerHandle) {
        handle.cancel.cancel();
        if !self.registry.remove_controller(handle).await {
            return;
        }

        let _gate = self.gate.lock().await;
        if let Some(updated) = self
            .store
            .update_device(&handle.device_id, DevicePatch::connection(ConnectionStatus::Offline))
            .await
        {
            self.broadcast_state_change(&updated).await;
        }
        tracing::info!(device_id = %handle.device_id, "controller session offline");
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
