//! Replication timing configuration.

use std::time::Duration;

/// First confirmation window of a ticket.
pub const DEFAULT_INITIAL_WINDOW: Duration = Duration::from_millis(1000);

/// Retries after the first push before a ticket gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Replication timing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationConfig {
    /// Length of the first confirmation window; doubled on every retry.
    pub initial_window: Duration,
    /// Number of retries after the first push.
    pub max_attempts: u32,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            initial_window: DEFAULT_INITIAL_WINDOW,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReplicationConfig {
    /// Config with a custom first window.
    pub fn with_initial_window(mut self, window: Duration) -> Self {
        self.initial_window = window;
        self
    }

    /// Config with a custom retry budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Upper bound on how many times one ticket sends its message.
    pub fn max_sends(&self) -> u32 {
        self.max_attempts.saturating_add(1)
    }
}
