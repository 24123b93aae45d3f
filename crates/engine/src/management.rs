//! Restore-time monitoring
//!
//! Exposes when the most recent restore happened in this process instance.
//! Both values are `-1` until a restore has occurred.

use parking_lot::Mutex;
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
struct RestoreRecord {
    at: Instant,
    epoch_ms: i64,
}

/// Tracks the most recent restore
#[derive(Debug, Default)]
pub struct RestoreStats {
    last: Mutex<Option<RestoreRecord>>,
}

/// Point-in-time view of [`RestoreStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RestoreInfo {
    /// Milliseconds since the most recent restore, or -1
    pub uptime_since_restore_ms: i64,
    /// Epoch milliseconds of the most recent restore, or -1
    pub restore_time_ms: i64,
}

impl RestoreStats {
    /// Create stats with no restore recorded
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the process has just been restored
    pub(crate) fn record_restore(&self) {
        *self.last.lock() = Some(RestoreRecord {
            at: Instant::now(),
            epoch_ms: chrono::Utc::now().timestamp_millis(),
        });
    }

    /// Milliseconds since the most recent restore, or -1
    pub fn uptime_since_restore_ms(&self) -> i64 {
        match *self.last.lock() {
            Some(record) => i64::try_from(record.at.elapsed().as_millis()).unwrap_or(i64::MAX),
            None => -1,
        }
    }

    /// Epoch milliseconds when the most recent restore occurred, or -1
    pub fn restore_time_ms(&self) -> i64 {
        self.last.lock().as_ref().map(|r| r.epoch_ms).unwrap_or(-1)
    }

    /// True once any restore has been recorded
    pub fn has_restored(&self) -> bool {
        self.last.lock().is_some()
    }

    /// Both values at once
    pub fn info(&self) -> RestoreInfo {
        RestoreInfo {
            uptime_since_restore_ms: self.uptime_since_restore_ms(),
            restore_time_ms: self.restore_time_ms(),
        }
    }
}
