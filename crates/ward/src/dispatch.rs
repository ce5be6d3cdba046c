// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command dispatch to physical device controllers.
//!
//! Dispatch is fire-and-forget: the send either reaches the controller's
//! session queue or the device is offline. Confirmation arrives later as a
//! `status_update`, which is what mutates `physical_status`.

use crate::events::ControllerMessage;
use crate::model::{now_iso, DoorCommand};
use crate::state::WardState;

/// Queue an authorized actuation for the device's controller.
/// Returns false when no controller session is connected.
pub async fn dispatch_command(state: &WardState, device_id: &str, command: DoorCommand) -> bool {
    let delivered = state
        .registry
        .send_to_controller(
            device_id,
            ControllerMessage::Command { command, timestamp: now_iso() },
        )
        .await;
    if delivered {
        tracing::debug!(device_id, command = command.as_str(), "command dispatched");
    }
    delivered
}

/// Best-effort refusal of a button request, so the device suppresses local
/// actuation. Delivery failure is ignored.
pub async fn notify_denied(state: &WardState, device_id: &str, command: DoorCommand, reason: &str) {
    let delivered = state
        .registry
        .send_to_controller(
            device_id,
            ControllerMessage::CommandDenied {
                command,
                reason: reason.to_owned(),
                timestamp: now_iso(),
            },
        )
        .await;
    if !delivered {
        tracing::debug!(device_id, reason, "command_denied not delivered (no controller)");
    }
}
