use std::time::{Duration, Instant};

use dashmap::DashMap;

const WINDOW_SECS: u64 = 15 * 60;
const MAX_FAILURES: u32 = 5;

/// Per-email login brute force limiter.
pub struct LoginRateLimiter {
    /// email -> (failed_count, window_start)
    entries: DashMap<String, (u32, Instant)>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Check if login attempt is allowed. 5 failures per 15 minutes.
    /// Does not increment the counter; call `record_failure()` on an invalid password.
    pub fn check(&self, email: &str) -> Result<(), u64> {
        let window = Duration::from_secs(WINDOW_SECS);
        let now = Instant::now();

        let entry = self.entries.get(&email.to_lowercase());
        let Some(entry) = entry else {
            return Ok(());
        };

        let (count, start) = entry.value();

        if now.duration_since(*start) > window {
            return Ok(());
        }

        if *count >= MAX_FAILURES {
            let elapsed = now.duration_since(*start).as_secs();
            return Err(WINDOW_SECS.saturating_sub(elapsed));
        }

        Ok(())
    }

    /// Record a failed login attempt. Increments the counter for the given email.
    pub fn record_failure(&self, email: &str) {
        let window = Duration::from_secs(WINDOW_SECS);
        let now = Instant::now();

        let mut entry = self.entries.entry(email.to_lowercase()).or_insert((0, now));
        let (count, start) = entry.value_mut();

        if now.duration_since(*start) > window {
            *count = 1;
            *start = now;
        } else {
            *count += 1;
        }
    }

    /// Forget failures for an email after a successful login.
    pub fn reset(&self, email: &str) {
        self.entries.remove(&email.to_lowercase());
    }

    pub fn cleanup(&self, max_age: Duration) {
        let now = Instant::now();
        self.entries.retain(|_, (_, start)| now.duration_since(*start) < max_age);
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_five_failures() {
        let limiter = LoginRateLimiter::new();
        for _ in 0..MAX_FAILURES {
            assert!(limiter.check("ada@example.com").is_ok());
            limiter.record_failure("ada@example.com");
        }
        let retry_after = limiter.check("ADA@example.com").unwrap_err();
        assert!(retry_after <= WINDOW_SECS);
        assert!(limiter.check("grace@example.com").is_ok());
    }

    #[test]
    fn reset_clears_failures() {
        let limiter = LoginRateLimiter::new();
        for _ in 0..MAX_FAILURES {
            limiter.record_failure("ada@example.com");
        }
        limiter.reset("ada@example.com");
        assert!(limiter.check("ada@example.com").is_ok());
    }
}
