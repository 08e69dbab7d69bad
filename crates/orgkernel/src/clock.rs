//! Clock abstraction, ported from the teacher's scheduler clock.
//!
//! Injecting the clock rather than calling `SystemTime::now()` directly is
//! what makes delayed-delivery tests deterministic (spec.md §8 P2/P3/P5).

use std::time::{SystemTime, UNIX_EPOCH};

/// Provides the current wall-clock time as Unix-epoch milliseconds.
pub trait Clock: Send + Sync {
    /// Returns the current time as milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// The default [`Clock`] implementation backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis()
            .try_into()
            .unwrap_or(u64::MAX)
    }
}
