// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain types and wire formats: devices, commands, and access events.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// User id literal that denotes a controller-originated (button) attempt.
pub const BUTTON_USER_ID: &str = "physical_button";

/// User id recorded on server-originated audit entries (heartbeat timeouts).
pub const SYSTEM_USER_ID: &str = "system";

/// Whether a device's open/closed state is owned by an external controller
/// session (physical) or by the server itself (virtual).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Physical,
    Virtual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicalStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Locked,
    Unlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Online,
    Offline,
    Unknown,
}

/// A state-changing action requested against a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoorCommand {
    Open,
    Close,
    Lock,
    Unlock,
}

impl DoorCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Lock => "lock",
            Self::Unlock => "unlock",
        }
    }
}

/// A controlled entry point.
///
/// `lock_state` is server-authoritative and never changed by a device report;
/// `physical_status` of a physical device reflects the last confirmed
/// controller report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "door_id")]
    pub device_id: String,
    pub location: String,
    pub physical_status: PhysicalStatus,
    pub lock_state: LockState,
    #[serde(rename = "device_type")]
    pub kind: DeviceKind,
    pub connection_status: ConnectionStatus,
}

/// Outcome of an authorization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Granted,
    Denied,
}

/// Why an attempt was denied. The wire message is the token itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    LockedOut,
    RateLimited,
    UnknownDevice,
    DoorLocked,
    NotPermitted,
    DeviceOffline,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LockedOut => "locked_out",
            Self::RateLimited => "rate_limited",
            Self::UnknownDevice => "unknown_device",
            Self::DoorLocked => "door_locked",
            Self::NotPermitted => "not_permitted",
            Self::DeviceOffline => "device_offline",
        }
    }
}

/// Logged record of an attempt and its outcome.
///
/// `command` is a plain string rather than [`DoorCommand`] so that
/// server-originated entries (e.g. `"heartbeat"`) share the same shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessEvent {
    pub timestamp: String,
    pub device_id: String,
    pub user_id: String,
    pub command: String,
    pub status: Outcome,
    pub message: String,
}

/// Current wallclock as ISO-8601 UTC.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
