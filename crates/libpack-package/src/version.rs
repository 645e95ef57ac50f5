//! Watch-mode pseudo-versions
//!
//! Consumers cache installed packages by path and version. Every watch rebuild
//! gets a fresh `0.0.0-watch+<millis>` version so those caches are invalidated.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

const WATCH_PREFIX: &str = "0.0.0-watch+";

/// Format the pseudo-version for a millisecond timestamp
pub fn watch_version(stamp_millis: i64) -> String {
    format!("{}{}", WATCH_PREFIX, stamp_millis)
}

/// Extract the timestamp from a pseudo-version
pub fn parse_watch_stamp(version: &str) -> Option<i64> {
    version.strip_prefix(WATCH_PREFIX)?.parse().ok()
}

/// Source of strictly increasing watch versions
///
/// Stamps follow the wall clock but never repeat or go backwards, even when
/// two rebuilds land in the same millisecond or the clock is adjusted.
#[derive(Debug, Default)]
pub struct WatchVersionClock {
    last: AtomicI64,
}

impl WatchVersionClock {
    pub const fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    /// Next version stamped with the current time
    pub fn next(&self) -> String {
        self.next_at(Utc::now().timestamp_millis())
    }

    /// Next version for a given wall-clock reading
    pub fn next_at(&self, now_millis: i64) -> String {
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now_millis.max(last + 1))
            })
            .unwrap_or(now_millis);
        watch_version(now_millis.max(previous + 1))
    }
}
