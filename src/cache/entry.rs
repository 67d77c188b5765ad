//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with expiration and
//! refresh deadline support.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::cache::Value;

// == Expiration ==
/// Expiration requested for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiration {
    /// Use the cache's configured default expiration
    #[default]
    Default,
    /// The entry never expires
    Never,
    /// The entry expires after the given duration. A zero duration is
    /// treated as `Default`.
    After(Duration),
}

impl From<Duration> for Expiration {
    fn from(duration: Duration) -> Self {
        Expiration::After(duration)
    }
}

// == Cache Entry ==
/// A stored value plus its absolute expiration and refresh deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// The stored value
    pub value: Value,
    /// Expiration timestamp (Unix nanoseconds), 0 = never expires
    pub expiration: i64,
    /// Refresh deadline timestamp (Unix nanoseconds), 0 = no deadline
    pub refresh_deadline: i64,
}

impl Entry {
    // == Constructor ==
    /// Creates an entry whose timestamps are relative to now.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `expires_in` - Time until expiration, None = never
    /// * `refresh_in` - Time until the refresh deadline, None = no deadline
    pub fn new(value: Value, expires_in: Option<Duration>, refresh_in: Option<Duration>) -> Self {
        let now = current_timestamp_ns();
        Self {
            value,
            expiration: deadline_from(now, expires_in),
            refresh_deadline: deadline_from(now, refresh_in),
        }
    }

    /// Returns a copy of this entry holding `value`, keeping both timestamps.
    pub fn with_value(&self, value: Value) -> Self {
        Self {
            value,
            expiration: self.expiration,
            refresh_deadline: self.refresh_deadline,
        }
    }

    // == Is Expired ==
    /// Returns true once the expiration timestamp has passed.
    pub fn expired(&self) -> bool {
        self.expired_at(current_timestamp_ns())
    }

    pub(crate) fn expired_at(&self, now: i64) -> bool {
        self.expiration != 0 && now > self.expiration
    }

    // == Refresh Deadline ==
    /// Returns true once the refresh deadline has passed.
    pub fn deadline_reached(&self) -> bool {
        self.refresh_deadline != 0 && current_timestamp_ns() > self.refresh_deadline
    }

    /// Time left until expiration. None if the entry never expires,
    /// `Duration::ZERO` if it already has.
    pub fn time_to_live(&self) -> Option<Duration> {
        if self.expiration == 0 {
            return None;
        }
        let remaining = self.expiration.saturating_sub(current_timestamp_ns());
        Some(Duration::from_nanos(remaining.max(0) as u64))
    }
}

fn deadline_from(now: i64, after: Option<Duration>) -> i64 {
    match after {
        Some(duration) if !duration.is_zero() => {
            let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
            now.saturating_add(nanos)
        }
        _ => 0,
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in nanoseconds.
pub fn current_timestamp_ns() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}
