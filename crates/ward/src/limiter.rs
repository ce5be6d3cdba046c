// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sliding-window rate limiter and brute-force guard.
//!
//! Counters are keyed by `(device_id, user_id)`. A lockout is declared when
//! the key accumulates `max_failed_attempts` failures inside the lockout
//! window; it expires by wallclock elapse as the failures age out. The admin
//! user is not exempt — exemptions are a policy choice that belongs to the
//! authorization engine.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;

use crate::model::DoorCommand;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR_BUCKETS: u64 = 60;

/// Verdict of a pre-authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckVerdict {
    Allowed,
    /// Too many recent failures; denied until the window drains.
    LockedOut { retry_after_secs: u64 },
    /// Over the per-minute attempt ceiling.
    RateLimited,
}

/// Per-key status for the security endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct UserStatus {
    pub attempts_last_minute: usize,
    pub failed_attempts_recent: usize,
    pub is_locked_out: bool,
    pub remaining_lockout_seconds: u64,
}

/// Aggregate counters for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct LimiterStats {
    pub window_seconds: u64,
    pub total_attempts: u64,
    pub granted: u64,
    pub denied: u64,
    pub tracked_pairs: usize,
    pub locked_out_pairs: usize,
}

#[derive(Debug, Clone)]
struct AttemptRecord {
    #[allow(dead_code)]
    command: DoorCommand,
    at: Instant,
    success: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    total: u64,
    granted: u64,
    denied: u64,
}

/// Rolling one-hour counters in minute buckets. Per-key attempt records are
/// only retained for the short lockout window, so hourly aggregates are kept
/// separately.
struct HourWindow {
    epoch: Instant,
    buckets: Vec<Bucket>,
    cursor: u64,
}

impl HourWindow {
    fn new(now: Instant) -> Self {
        Self { epoch: now, buckets: vec![Bucket::default(); HOUR_BUCKETS as usize], cursor: 0 }
    }

    fn advance(&mut self, now: Instant) {
        let minute = now.duration_since(self.epoch).as_secs() / 60;
        if minute <= self.cursor {
            return;
        }
        let steps = (minute - self.cursor).min(HOUR_BUCKETS);
        for i in 1..=steps {
            let idx = ((self.cursor + i) % HOUR_BUCKETS) as usize;
            self.buckets[idx] = Bucket::default();
        }
        self.cursor = minute;
    }

    fn add(&mut self, now: Instant, success: bool) {
        self.advance(now);
        let idx = (self.cursor % HOUR_BUCKETS) as usize;
        self.buckets[idx].total += 1;
        if success {
            self.buckets[idx].granted += 1;
        } else {
            self.buckets[idx].denied += 1;
        }
    }

    fn sum(&mut self, now: Instant) -> Bucket {
        self.advance(now);
        self.buckets.iter().fold(Bucket::default(), |acc, b| Bucket {
            total: acc.total + b.total,
            granted: acc.granted + b.granted,
            denied: acc.denied + b.denied,
        })
    }
}

struct LimiterInner {
    attempts: HashMap<(String, String), VecDeque<AttemptRecord>>,
    hour: HourWindow,
}

pub struct RateLimiter {
    max_per_minute: usize,
    max_failed: usize,
    lockout: Duration,
    inner: Mutex<LimiterInner>,
}

impl RateLimiter {
    pub fn new(max_per_minute: usize, max_failed: usize, lockout: Duration) -> Self {
        Self {
            max_per_minute,
            max_failed,
            lockout,
            inner: Mutex::new(LimiterInner {
                attempts: HashMap::new(),
                hour: HourWindow::new(Instant::now()),
            }),
        }
    }

    /// Records are retained at least 60 s; longer when the lockout window is.
    fn retention(&self) -> Duration {
        self.lockout.max(MINUTE)
    }

    fn prune(&self, records: &mut VecDeque<AttemptRecord>, now: Instant) {
        let retention = self.retention();
        while let Some(front) = records.front() {
            if now.duration_since(front.at) > retention {
                records.pop_front();
            } else {
                break;
            }
        }
    }

    /// Remaining lockout, if the key is currently locked out. The lockout
    /// lifts once enough failures age past the window that fewer than
    /// `max_failed` remain.
    fn lockout_remaining(&self, records: &VecDeque<AttemptRecord>, now: Instant) -> Option<Duration> {
        let fails: Vec<Instant> = records
            .iter()
            .filter(|r| !r.success && now.duration_since(r.at) <= self.lockout)
            .map(|r| r.at)
            .collect();
        if fails.len() < self.max_failed {
            return None;
        }
        let pivot = fails[fails.len() - self.max_failed];
        Some(self.lockout.saturating_sub(now.duration_since(pivot)))
    }

    /// Pre-authorization check. Lockout takes precedence over the per-minute
    /// ceiling.
    pub async fn check(&self, device_id: &str, user_id: &str, command: DoorCommand) -> CheckVerdict {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let key = (device_id.to_owned(), user_id.to_owned());
        let records = inner.attempts.entry(key).or_default();
        self.prune(records, now);

        if let Some(remaining) = self.lockout_remaining(records, now) {
            tracing::debug!(
                device_id,
                user_id,
                command = command.as_str(),
                remaining_secs = remaining.as_secs(),
                "attempt denied: locked out"
            );
            return CheckVerdict::LockedOut {
                retry_after_secs: remaining.as_secs_f64().ceil() as u64,
            };
        }

        let last_minute =
            records.iter().filter(|r| now.duration_since(r.at) <= MINUTE).count();
        if last_minute >= self.max_per_minute {
            tracing::debug!(
                device_id,
                user_id,
                command = command.as_str(),
                attempts = last_minute,
                "attempt denied: rate limited"
            );
            return CheckVerdict::RateLimited;
        }

        CheckVerdict::Allowed
    }

    /// Record the outcome of an attempt.
    pub async fn record(&self, device_id: &str, user_id: &str, command: DoorCommand, success: bool) {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.hour.add(now, success);
        let key = (device_id.to_owned(), user_id.to_owned());
        inner.attempts.entry(key).or_default().push_back(AttemptRecord {
            command,
            at: now,
            success,
        });
    }

    pub async fn user_status(&self, device_id: &str, user_id: &str) -> UserStatus {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let key = (device_id.to_owned(), user_id.to_owned());
        let records = inner.attempts.entry(key).or_default();
        self.prune(records, now);

        let attempts_last_minute =
            records.iter().filter(|r| now.duration_since(r.at) <= MINUTE).count();
        let failed_attempts_recent = records
            .iter()
            .filter(|r| !r.success && now.duration_since(r.at) <= self.lockout)
            .count();
        let remaining = self.lockout_remaining(records, now);

        UserStatus {
            attempts_last_minute,
            failed_attempts_recent,
            is_locked_out: remaining.is_some(),
            remaining_lockout_seconds: remaining
                .map(|d| d.as_secs_f64().ceil() as u64)
                .unwrap_or(0),
        }
    }

    pub async fn stats(&self) -> LimiterStats {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let sums = inner.hour.sum(now);
        let tracked_pairs = inner.attempts.iter().filter(|(_, dq)| !dq.is_empty()).count();
        let locked_out_pairs = inner
            .attempts
            .values()
            .filter(|dq| self.lockout_remaining(dq, now).is_some())
            .count();
        LimiterStats {
            window_seconds: 3600,
            total_attempts: sums.total,
            granted: sums.granted,
            denied: sums.denied,
            tracked_pairs,
            locked_out_pairs,
        }
    }

    /// Drop records past retention across all keys; remove empty keys.
    /// Returns the number of records dropped.
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let mut dropped = 0;
        inner.attempts.retain(|_, records| {
            let before = records.len();
            let retention = self.lockout.max(MINUTE);
            while let Some(front) = records.front() {
                if now.duration_since(front.at) > retention {
                    records.pop_front();
                } else {
                    break;
                }
            }
            dropped += before - records.len();
            !records.is_empty()
        });
        dropped
    }

    /// Operational recovery: wipe every attempt record.
    /// Returns the number of records cleared.
    pub async fn clear_all(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let cleared: usize = inner.attempts.values().map(VecDeque::len).sum();
        inner.attempts.clear();
        cleared
    }
}

#[cfg(test)]
#[path = "limiter_tests.rs"]
mod tests;
