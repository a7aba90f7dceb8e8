//! Server-side timestamp source
//!
//! Every timestamp written by the store comes from one [`MonotonicClock`], so
//! creation times are strictly increasing per store even when the wall clock
//! stalls or steps backwards.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Strictly increasing millisecond clock
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start after `floor`, typically the newest timestamp already on disk
    pub fn starting_after(floor: i64) -> Self {
        Self {
            last: AtomicI64::new(floor),
        }
    }

    /// Next timestamp in milliseconds since the Unix epoch
    pub fn now_millis(&self) -> i64 {
        let wall = Utc::now().timestamp_millis();
        let mut prev = self.last.load(Ordering::Acquire);
        loop {
            let next = if wall > prev { wall } else { prev + 1 };
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}
