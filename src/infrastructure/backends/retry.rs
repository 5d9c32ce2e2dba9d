#[cfg(test)]
#[path = "retry_test.rs"]
mod tests;

use std::time::Duration;

use crate::config::Config;
use crate::config::ConfigKey;

/// Exponential backoff schedule for connect attempts against a backend.
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        return RetryPolicy {
            attempts: Config::get_u64(ConfigKey::RetryAttempts) as u32,
            base_delay: Duration::from_millis(Config::get_u64(ConfigKey::RetryBaseDelay)),
        };
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> RetryPolicy {
        return RetryPolicy {
            attempts,
            base_delay,
        };
    }

    /// Delay before retrying after the given zero-based attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        return self.base_delay * 2u32.saturating_pow(attempt);
    }
}
