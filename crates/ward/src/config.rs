// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::Deserialize;

use crate::model::{ConnectionStatus, Device, DeviceKind, LockState, PhysicalStatus};

/// Configuration for the doorward coordinator.
#[derive(Debug, Clone, clap::Parser)]
pub struct WardConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "DOORWARD_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8765, env = "DOORWARD_PORT")]
    pub port: u16,

    /// Comma-separated allowed CORS origins, or `*` for any.
    #[arg(long, default_value = "*", env = "DOORWARD_ALLOWED_ORIGINS")]
    pub allowed_origins: String,

    /// Prefix for the HTTP API routes.
    #[arg(long, default_value = "/api", env = "DOORWARD_API_PREFIX")]
    pub api_prefix: String,

    /// Path of the dashboard WebSocket endpoint.
    #[arg(long, default_value = "/ws", env = "DOORWARD_WS_ENDPOINT")]
    pub ws_endpoint: String,

    /// Path to a JSON file of device seed records. Falls back to the
    /// built-in two-door seed when unset.
    #[arg(long, env = "DOORWARD_DEVICES_CONFIG")]
    pub devices_config: Option<std::path::PathBuf>,

    /// Max attempts per (device, user) in a sliding 60 s window.
    #[arg(long, default_value_t = 10, env = "DOORWARD_MAX_ATTEMPTS_PER_MINUTE")]
    pub max_attempts_per_minute: usize,

    /// Failed attempts within the lockout window before a lockout.
    #[arg(long, default_value_t = 5, env = "DOORWARD_MAX_FAILED_ATTEMPTS")]
    pub max_failed_attempts: usize,

    /// Lockout duration in seconds.
    #[arg(long, default_value_t = 60, env = "DOORWARD_LOCKOUT_SECS")]
    pub lockout_secs: u64,

    /// Rate limiter cleanup sweep interval in seconds.
    #[arg(long, default_value_t = 3600, env = "DOORWARD_CLEANUP_INTERVAL_SECS")]
    pub cleanup_interval_secs: u64,

    /// Heartbeat ping interval in seconds.
    #[arg(long, default_value_t = 10, env = "DOORWARD_PING_INTERVAL_SECS")]
    pub ping_interval_secs: u64,

    /// Seconds without any inbound frame before a controller is declared dead.
    #[arg(long, default_value_t = 30, env = "DOORWARD_PONG_DEADLINE_SECS")]
    pub pong_deadline_secs: u64,

    /// User id granted the administrative role.
    #[arg(long, default_value = "admin", env = "DOORWARD_ADMIN_USER_ID")]
    pub admin_user_id: String,

    /// Most recent access events retained in memory.
    #[arg(long, default_value_t = 10_000, env = "DOORWARD_ACCESS_LOG_RETENTION")]
    pub access_log_retention: usize,
}

impl WardConfig {
    pub fn lockout_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.lockout_secs)
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn ping_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ping_interval_secs)
    }

    pub fn pong_deadline(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.pong_deadline_secs)
    }

    /// Load device seed records from the configured JSON file, or return the
    /// built-in seed when no file is configured.
    pub fn load_device_seeds(&self) -> anyhow::Result<Vec<DeviceSeed>> {
        match self.devices_config {
            Some(ref path) => {
                let contents = std::fs::read_to_string(path)?;
                let seeds: Vec<DeviceSeed> = serde_json::from_str(&contents)?;
                Ok(seeds)
            }
            None => Ok(default_seeds()),
        }
    }
}

/// One device seed record from configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSeed {
    pub id: String,
    pub location: String,
    pub kind: DeviceKind,
    pub initial_physical_status: PhysicalStatus,
    pub initial_lock_state: LockState,
}

impl DeviceSeed {
    /// Materialize the seed into a device. Virtual devices are permanently
    /// online; physical devices start offline until a controller connects.
    pub fn into_device(self) -> Device {
        let connection_status = match self.kind {
            DeviceKind::Virtual => ConnectionStatus::Online,
            DeviceKind::Physical => ConnectionStatus::Offline,
        };
        Device {
            device_id: self.id,
            location: self.location,
            physical_status: self.initial_physical_status,
            lock_state: self.initial_lock_state,
            kind: self.kind,
            connection_status,
        }
    }
}

/// Built-in seed: one physical door, locked, and one virtual door, unlocked.
pub fn default_seeds() -> Vec<DeviceSeed> {
    vec![
        DeviceSeed {
            id: "DOOR-001".to_owned(),
            location: "Main Entrance".to_owned(),
            kind: DeviceKind::Physical,
            initial_physical_status: PhysicalStatus::Closed,
            initial_lock_state: LockState::Locked,
        },
        DeviceSeed {
            id: "DOOR-002".to_owned(),
            location: "Lab Annex".to_owned(),
            kind: DeviceKind::Virtual,
            initial_physical_status: PhysicalStatus::Closed,
            initial_lock_state: LockState::Unlocked,
        },
    ]
}
