use std::time::Duration;

use transhift_protocol::{FileInfo, Verification};

/// Default puncher address used when none is configured.
pub const DEFAULT_PUNCHER_ADDR: &str = "127.0.0.1:50977";

/// Client-side settings for talking to the puncher and the peer.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// `host:port` of the puncher.
    pub puncher_addr: String,
    /// Bound on each handshake step that waits for the other side, and on
    /// how long a downloader waits for the uploader to connect.
    pub handshake_timeout: Duration,
    /// Retry policy for the uploader's direct connection.
    pub backoff: BackoffConfig,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            puncher_addr: DEFAULT_PUNCHER_ADDR.into(),
            handshake_timeout: Duration::from_secs(10),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Exponential backoff for connecting to an introduced peer.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
    /// Total connection attempts before giving up.
    pub attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            attempts: 8,
        }
    }
}

impl BackoffConfig {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Outcome of a completed transfer, on either side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub file: FileInfo,
    pub verification: Verification,
}

impl TransferReport {
    /// True when both sides computed the same digest.
    pub fn is_verified(&self) -> bool {
        self.verification.is_good()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_defaults() {
        let config = BackoffConfig::default();
        assert_eq!(config.initial_delay, Duration::from_millis(250));
        assert_eq!(config.max_delay, Duration::from_secs(5));
        assert_eq!(config.attempts, 8);
        assert!((config.backoff_factor - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let config = BackoffConfig::default();
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(250));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(6), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(100), Duration::from_secs(5));
    }
}
