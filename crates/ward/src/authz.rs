// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authorization engine: every access attempt, whatever its ingress path,
//! passes through [`authorize`].
//!
//! The whole check -> decide -> mutate -> broadcast sequence runs under the
//! state gate, so the already-open / already-locked no-op checks are
//! race-free and observers always receive a device's state changes in
//! mutation order, each strictly before its access event.

use crate::dispatch;
use crate::limiter::CheckVerdict;
use crate::model::{
    DenyReason, Device, DeviceKind, DoorCommand, LockState, Outcome, PhysicalStatus,
    BUTTON_USER_ID,
};
use crate::state::WardState;
use crate::store::DevicePatch;

/// Outcome of one authorization pass.
#[derive(Debug, Clone)]
pub struct AccessDecision {
    pub outcome: Outcome,
    pub message: String,
    /// Device snapshot after the attempt, when the device resolved.
    pub device: Option<Device>,
    /// Seconds until a lockout expires; only set on `locked_out` denials.
    pub retry_after_secs: Option<u64>,
}

fn granted(device: Device) -> AccessDecision {
    AccessDecision {
        outcome: Outcome::Granted,
        message: "granted".to_owned(),
        device: Some(device),
        retry_after_secs: None,
    }
}

fn no_op(device: Device) -> AccessDecision {
    AccessDecision {
        outcome: Outcome::Granted,
        message: "no_op".to_owned(),
        device: Some(device),
        retry_after_secs: None,
    }
}

fn denied(reason: DenyReason, device: Option<Device>) -> AccessDecision {
    AccessDecision {
        outcome: Outcome::Denied,
        message: reason.as_str().to_owned(),
        device,
        retry_after_secs: None,
    }
}

/// Authorize and apply one access attempt.
///
/// Command rules:
///
/// | command | role | precondition | virtual | physical |
/// |---|---|---|---|---|
/// | open | any | unlocked, or admin | set open | dispatch |
/// | close | any | — | set closed | dispatch |
/// | lock / unlock | admin | — | set immediately | set immediately |
///
/// The lock is a server concept, so `lock`/`unlock` never dispatch. An
/// attempt that would not change anything is granted as `no_op` without a
/// dispatch or state change. Every decision is recorded in the rate limiter
/// and the audit trail.
pub async fn authorize(
    state: &WardState,
    device_id: &str,
    user_id: &str,
    command: DoorCommand,
) -> AccessDecision {
    let _gate = state.gate.lock().await;

    match state.limiter.check(device_id, user_id, command).await {
        CheckVerdict::Allowed => {}
        CheckVerdict::LockedOut { retry_after_secs } => {
            let mut decision = denied(DenyReason::LockedOut, None);
            decision.retry_after_secs = Some(retry_after_secs);
            return finish(state, device_id, user_id, command, decision).await;
        }
        CheckVerdict::RateLimited => {
            let decision = denied(DenyReason::RateLimited, None);
            return finish(state, device_id, user_id, command, decision).await;
        }
    }

    let Some(device) = state.store.get_device(device_id).await else {
        let decision = denied(DenyReason::UnknownDevice, None);
        return finish(state, device_id, user_id, command, decision).await;
    };

    let is_admin = user_id == state.config.admin_user_id;

    let decision = match command {
        DoorCommand::Open => {
            if device.physical_status == PhysicalStatus::Open {
                no_op(device)
            } else if device.lock_state == LockState::Locked && !is_admin {
                // Buttons never override the lock: `physical_button` is not
                // the admin id, so the exemption cannot apply to them.
                denied(DenyReason::DoorLocked, Some(device))
            } else {
                actuate(state, device, command, PhysicalStatus::Open).await
            }
        }
        DoorCommand::Close => {
            if device.physical_status == PhysicalStatus::Closed {
                no_op(device)
            } else {
                actuate(state, device, command, PhysicalStatus::Closed).await
            }
        }
        DoorCommand::Lock | DoorCommand::Unlock => {
            let target = match command {
                DoorCommand::Lock => LockState::Locked,
                _ => LockState::Unlocked,
            };
            if !is_admin {
                denied(DenyReason::NotPermitted, Some(device))
            } else if device.lock_state == target {
                no_op(device)
            } else {
                set_lock(state, device, target).await
            }
        }
    };

    finish(state, device_id, user_id, command, decision).await
}

/// Apply a granted `open`/`close`. Virtual devices change state immediately;
/// physical devices get a dispatch and keep their reported status until the
/// controller confirms. A dispatch that finds no controller revises the
/// outcome to `device_offline` before anything is logged or broadcast.
async fn actuate(
    state: &WardState,
    device: Device,
    command: DoorCommand,
    target: PhysicalStatus,
) -> AccessDecision {
    match device.kind {
        DeviceKind::Virtual => {
            match state.store.update_device(&device.device_id, DevicePatch::physical(target)).await
            {
                Some(updated) => {
                    state.broadcast_state_change(&updated).await;
                    granted(updated)
                }
                // Devices are never removed after seeding.
                None => denied(DenyReason::UnknownDevice, None),
            }
        }
        DeviceKind::Physical => {
            if dispatch::dispatch_command(state, &device.device_id, command).await {
                granted(device)
            } else {
                denied(DenyReason::DeviceOffline, Some(device))
            }
        }
    }
}

/// Apply a granted `lock`/`unlock`. The lock lives on the server for both
/// device kinds.
async fn set_lock(state: &WardState, device: Device, target: LockState) -> AccessDecision {
    match state.store.update_device(&device.device_id, DevicePatch::lock(target)).await {
        Some(updated) => {
            state.broadcast_state_change(&updated).await;
            granted(updated)
        }
        None => denied(DenyReason::UnknownDevice, None),
    }
}

/// Record the decision in the limiter and the audit trail, and push a
/// refusal to the originating controller for denied button attempts.
async fn finish(
    state: &WardState,
    device_id: &str,
    user_id: &str,
    command: DoorCommand,
    decision: AccessDecision,
) -> AccessDecision {
    let success = decision.outcome == Outcome::Granted;
    state.limiter.record(device_id, user_id, command, success).await;
    state
        .record_access(device_id, user_id, command.as_str(), decision.outcome, &decision.message)
        .await;

    if !success && user_id == BUTTON_USER_ID {
        dispatch::notify_denied(state, device_id, command, &decision.message).await;
    }

    tracing::info!(
        device_id,
        user_id,
        command = command.as_str(),
        outcome = match decision.outcome {
            Outcome::Granted => "granted",
            Outcome::Denied => "denied",
        },
        message = %decision.message,
        "access attempt"
    );
    decision
}

#[cfg(test)]
#[path = "authz_tests.rs"]
mod tests;
