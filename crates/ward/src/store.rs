// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory state store: device registry and bounded access log.
//!
//! All mutations pass through the single write lock. Read-modify-write
//! sequences that must be atomic against other writers additionally run
//! under the engine's command gate (see `authz`).

use std::collections::VecDeque;

use indexmap::IndexMap;
use tokio::sync::RwLock;

use crate::config::DeviceSeed;
use crate::model::{AccessEvent, ConnectionStatus, Device, LockState, PhysicalStatus};

/// Partial device update. `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevicePatch {
    pub physical_status: Option<PhysicalStatus>,
    pub lock_state: Option<LockState>,
    pub connection_status: Option<ConnectionStatus>,
}

impl DevicePatch {
    pub fn physical(status: PhysicalStatus) -> Self {
        Self { physical_status: Some(status), ..Self::default() }
    }

    pub fn lock(state: LockState) -> Self {
        Self { lock_state: Some(state), ..Self::default() }
    }

    pub fn connection(status: ConnectionStatus) -> Self {
        Self { connection_status: Some(status), ..Self::default() }
    }
}

struct StoreInner {
    devices: IndexMap<String, Device>,
    events: VecDeque<AccessEvent>,
}

/// Single serialization point for device state and the audit trail.
pub struct StateStore {
    inner: RwLock<StoreInner>,
    retention: usize,
}

impl StateStore {
    /// Seed the registry. Duplicate ids keep the first occurrence.
    pub fn new(seeds: Vec<DeviceSeed>, retention: usize) -> Self {
        let mut devices = IndexMap::with_capacity(seeds.len());
        for seed in seeds {
            let device = seed.into_device();
            if devices.contains_key(&device.device_id) {
                tracing::warn!(device_id = %device.device_id, "duplicate device seed ignored");
                continue;
            }
            devices.insert(device.device_id.clone(), device);
        }
        Self { inner: RwLock::new(StoreInner { devices, events: VecDeque::new() }), retention }
    }

    pub async fn get_device(&self, id: &str) -> Option<Device> {
        self.inner.read().await.devices.get(id).cloned()
    }

    /// Devices in seed order.
    pub async fn list_devices(&self) -> Vec<Device> {
        self.inner.read().await.devices.values().cloned().collect()
    }

    pub async fn device_count(&self) -> usize {
        self.inner.read().await.devices.len()
    }

    /// Apply a patch to a device; `None` for an unknown id.
    pub async fn update_device(&self, id: &str, patch: DevicePatch) -> Option<Device> {
        let mut inner = self.inner.write().await;
        let device = inner.devices.get_mut(id)?;
        if let Some(status) = patch.physical_status {
            device.physical_status = status;
        }
        if let Some(state) = patch.lock_state {
            device.lock_state = state;
        }
        if let Some(status) = patch.connection_status {
            device.connection_status = status;
        }
        Some(device.clone())
    }

    /// Append to the audit trail, evicting the oldest entry past retention.
    pub async fn append_event(&self, event: AccessEvent) {
        let mut inner = self.inner.write().await;
        if inner.events.len() >= self.retention {
            inner.events.pop_front();
        }
        inner.events.push_back(event);
    }

    /// Most-recent-first, at most `limit` entries.
    pub async fn list_events(&self, limit: usize) -> Vec<AccessEvent> {
        let inner = self.inner.read().await;
        inner.events.iter().rev().take(limit).cloned().collect()
    }

    pub async fn event_count(&self) -> usize {
        self.inner.read().await.events.len()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
