// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-format messages for both WebSocket surfaces.
//!
//! Observer (dashboard) messages carry their payload under `data`; controller
//! messages are flat. All use `type` as the discriminant tag so clients can
//! route without peeking into payloads.

use serde::{Deserialize, Serialize};

use crate::model::{AccessEvent, Device, DoorCommand, Outcome, PhysicalStatus};

// -- Server -> observer -------------------------------------------------------

/// Messages fanned out to dashboard observers (plus the per-originator
/// `command_response`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    InitialData { data: InitialData },
    DeviceStateChange { data: DeviceStateChange },
    AccessEvent { data: AccessEvent },
    CommandResponse { data: CommandResponse },
    Ping,
    Pong,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialData {
    pub devices: Vec<Device>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStateChange {
    pub device_id: String,
    pub new_state: Device,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub device_id: String,
    pub command: String,
    pub status: Outcome,
    pub message: String,
}

// -- Observer -> server -------------------------------------------------------

/// Messages accepted from dashboard clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardRequest {
    Command { device_id: String, command: DoorCommand, user_id: String },
    Ping,
    Pong,
}

// -- Server -> controller -----------------------------------------------------

/// Messages serialized down to a device controller session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerMessage {
    /// Authorized actuation.
    Command { command: DoorCommand, timestamp: String },
    /// Refusal of a button request, so the device suppresses local actuation.
    CommandDenied { command: DoorCommand, reason: String, timestamp: String },
    /// Heartbeat probe.
    Ping { timestamp: String },
    /// Ask the device to re-announce its status.
    Handshake,
    /// Receipt acknowledgement.
    Ack { message: String },
}

// -- Controller -> server -----------------------------------------------------

/// Messages accepted from a device controller session.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerReport {
    /// Authoritative physical status of the session's device.
    StatusUpdate {
        data: StatusReport,
        #[serde(default)]
        timestamp: Option<String>,
    },
    /// A local button press asking for authorization.
    ButtonCommandRequest {
        command: DoorCommand,
        #[serde(default)]
        timestamp: Option<String>,
    },
    /// Informational actuation result; logged, not required.
    CommandResponse {
        command: DoorCommand,
        success: bool,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    /// Heartbeat reply.
    Pong {
        #[serde(default)]
        timestamp: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusReport {
    pub physical_status: PhysicalStatus,
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
