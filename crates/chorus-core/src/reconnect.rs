//! Reconnect backoff policy.
//!
//! The client's reconnection loop retries forever; the policy only decides
//! how long to wait between attempts. Kept as a trait so tests can inject a
//! near-zero delay and embedders can swap in something smarter.

use std::time::Duration;

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Decides the delay before a reconnect attempt.
pub trait ReconnectPolicy: Send + Sync {
    /// Delay before attempt `attempt` (zero-based, counted since the
    /// connection was lost).
    fn delay(&self, attempt: u32) -> Duration;
}

/// Fixed delay between attempts, the observed behavior of the original
/// client (5 seconds, forever).
#[derive(Clone, Copy, Debug)]
pub struct FixedDelay(Duration);

impl FixedDelay {
    /// Create a policy with the given delay.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self(delay)
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectPolicy for FixedDelay {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_delay_ignores_attempt_number() {
        let policy = FixedDelay::new(Duration::from_millis(250));
        assert_eq!(policy.delay(0), Duration::from_millis(250));
        assert_eq!(policy.delay(100), Duration::from_millis(250));
    }

    #[test]
    fn default_is_five_seconds() {
        let policy = FixedDelay::default();
        assert_eq!(policy.delay(0), Duration::from_secs(5));
    }

    #[test]
    fn policy_is_object_safe() {
        let policy: Box<dyn ReconnectPolicy> = Box::new(FixedDelay::default());
        assert_eq!(policy.delay(3), DEFAULT_RECONNECT_DELAY);
    }
}
