//! Doubling confirmation window.

use std::time::Duration;

use crate::ReplicationConfig;

/// Retry schedule of one ticket.
///
/// Starts at attempt 0 with the configured window. Each
/// [`advance`](Self::advance) doubles the window until `max_attempts` retries
/// have been used, after which it returns `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    attempt: u32,
    window: Duration,
    max_attempts: u32,
}

impl Backoff {
    pub fn new(config: &ReplicationConfig) -> Self {
        Self {
            attempt: 0,
            window: config.initial_window,
            max_attempts: config.max_attempts,
        }
    }

    /// Retries used so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Current window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Times the ticket's message has been sent, the first push included.
    pub fn sends(&self) -> u32 {
        self.attempt.saturating_add(1)
    }

    /// Move to the next retry, returning its window.
    pub fn advance(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        self.attempt += 1;
        self.window = self.window.saturating_mul(2);
        Some(self.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_doubles_until_budget_spent() {
        let mut backoff = Backoff::new(&ReplicationConfig::default());
        assert_eq!(backoff.window(), Duration::from_secs(1));

        let windows: Vec<_> = std::iter::from_fn(|| backoff.advance()).collect();
        assert_eq!(
            windows,
            [2, 4, 8, 16].map(Duration::from_secs).to_vec(),
        );
        assert_eq!(backoff.attempt(), 4);
        assert_eq!(backoff.sends(), 5);
        assert_eq!(backoff.advance(), None);
    }

    #[test]
    fn test_zero_budget() {
        let config = ReplicationConfig::default().with_max_attempts(0);
        let mut backoff = Backoff::new(&config);
        assert_eq!(backoff.advance(), None);
        assert_eq!(backoff.sends(), 1);
    }
}
