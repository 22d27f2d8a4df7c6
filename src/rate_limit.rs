//! # Rate Limiting
//!
//! A sliding-window limiter keyed by opaque strings. The action lifecycle
//! keys it by the serialized mounted-action stack (minus submitted data),
//! so repeated attempts at the same interaction share one bucket while
//! distinct interactions do not contend.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How long until a refused attempt may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAfter(pub Duration);

impl RetryAfter {
    /// The wait, rounded up to whole seconds for display.
    pub fn seconds(&self) -> u64 {
        let secs = self.0.as_secs();
        if self.0.subsec_nanos() > 0 { secs + 1 } else { secs }
    }

    /// A user-facing "try again in ..." phrase.
    pub fn humanize(&self) -> String {
        let secs = self.seconds();
        if secs >= 120 {
            format!("{} minutes", secs.div_ceil(60))
        } else if secs > 1 {
            format!("{} seconds", secs)
        } else {
            "1 second".to_string()
        }
    }
}

/// Maximum attempts allowed per key within a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Attempts admitted per window.
    pub max_attempts: u32,
    /// The window duration.
    pub window: Duration,
}

impl RateLimit {
    /// A limit of `max_attempts` per minute.
    pub fn per_minute(max_attempts: u32) -> Self {
        RateLimit {
            max_attempts,
            window: Duration::from_secs(60),
        }
    }
}

/// Sliding-window rate limiter over string keys.
///
/// Timestamps older than a key's window are discarded on each attempt, so
/// idle keys cost nothing after their window passes.
pub struct RateLimiter {
    attempts: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    /// Creates a limiter with no recorded attempts.
    pub fn new() -> Self {
        RateLimiter {
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Records an attempt for a key, refusing it if the window is full.
    ///
    /// Refused attempts are not recorded; a caller backing off does not
    /// extend its own penalty.
    pub fn attempt(&self, key: &str, limit: RateLimit) -> Result<(), RetryAfter> {
        let now = Instant::now();
        let mut attempts = self.attempts.lock().unwrap();
        let bucket = attempts.entry(key.to_string()).or_default();
        bucket.retain(|at| now.duration_since(*at) < limit.window);
        if bucket.len() >= limit.max_attempts as usize {
            let oldest = bucket[0];
            let retry_after = limit.window.saturating_sub(now.duration_since(oldest));
            return Err(RetryAfter(retry_after));
        }
        bucket.push(now);
        Ok(())
    }

    /// Forgets all attempts for a key.
    pub fn clear(&self, key: &str) {
        self.attempts.lock().unwrap().remove(key);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
