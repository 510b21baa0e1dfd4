//! Log throttling utility
//!
//! Limits how often the same warning is recorded so a misbehaving client
//! cannot flood the log.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Log throttler that limits how often the same message is logged
///
/// # Example
///
/// ```rust
/// use room_relay::utils::LogThrottler;
///
/// let throttler = LogThrottler::with_secs(5);
///
/// assert!(throttler.should_log("invalid_message"));
/// assert!(!throttler.should_log("invalid_message"));
/// ```
pub struct LogThrottler {
    /// Map of message key to last log time
    last_logged: Mutex<HashMap<String, Instant>>,
    interval: Duration,
}

impl LogThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_logged: Mutex::new(HashMap::new()),
            interval,
        }
    }

    pub fn with_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Check if a message should be logged (not throttled)
    ///
    /// Returns `true` and records the time when the key was not logged within
    /// the interval.
    pub fn should_log(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut map = self.last_logged.lock();

        if let Some(last) = map.get(key) {
            if now.duration_since(*last) < self.interval {
                return false;
            }
        }
        map.insert(key.to_string(), now);
        true
    }
}

impl Default for LogThrottler {
    /// Create a default log throttler with 5 second interval
    fn default() -> Self {
        Self::with_secs(5)
    }
}
