use crate::error::EditFailureReason;
use crate::LastFmError;
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 disables backoff retries)
    pub max_retries: u32,
    /// Base delay for exponential backoff (in seconds)
    pub base_delay: u64,
    /// Maximum delay cap (in seconds)
    pub max_delay: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: 5,
            max_delay: 300, // 5 minutes
        }
    }
}

impl RetryConfig {
    /// Create a config with retries disabled
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Create a config with custom retry count
    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Delay before retry number `retries + 1`.
    ///
    /// Exponential in the attempt number, never shorter than what the backend
    /// asked for, capped at `max_delay`.
    pub fn backoff_delay(&self, retries: u32, retry_after: u64) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2_u64.saturating_pow(retries));
        Duration::from_secs(std::cmp::min(
            std::cmp::max(exponential, retry_after),
            self.max_delay,
        ))
    }
}

/// What the submission loop should do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryAction {
    /// Log in again with the stored credentials, then resubmit once.
    Relogin,
    /// Wait, then resubmit.
    Backoff(Duration),
    /// Stop and report the edit as failed.
    GiveUp(EditFailureReason),
    /// Not a retryable failure; propagate it.
    Propagate,
}

/// Per-submission retry bookkeeping.
///
/// Session expiry earns exactly one silent re-login; rate limits, transport
/// errors and 5xx responses earn backoff retries up to `max_retries`.
#[derive(Debug, Clone)]
pub struct RetryState {
    config: RetryConfig,
    retries: u32,
    backoff_retries: u32,
    relogged: bool,
    total_delay: Duration,
}

impl RetryState {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            retries: 0,
            backoff_retries: 0,
            relogged: false,
            total_delay: Duration::ZERO,
        }
    }

    /// Retries consumed so far (re-login included).
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn total_delay(&self) -> Duration {
        self.total_delay
    }

    pub fn next_action(&mut self, error: &LastFmError) -> RetryAction {
        match error {
            LastFmError::SessionExpired if !self.relogged => {
                self.relogged = true;
                self.retries += 1;
                RetryAction::Relogin
            }
            LastFmError::SessionExpired => {
                RetryAction::GiveUp(EditFailureReason::SessionExpired)
            }
            error if error.is_transient() => {
                if self.backoff_retries >= self.config.max_retries {
                    log::warn!(
                        "Max retries ({}) exceeded, last error: {error}",
                        self.config.max_retries
                    );
                    return RetryAction::GiveUp(EditFailureReason::ExhaustedRetries);
                }
                let retry_after = match error {
                    LastFmError::RateLimit { retry_after } => *retry_after,
                    _ => 0,
                };
                let delay = self.config.backoff_delay(self.backoff_retries, retry_after);
                self.backoff_retries += 1;
                self.retries += 1;
                self.total_delay += delay;
                RetryAction::Backoff(delay)
            }
            _ => RetryAction::Propagate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay: 5,
            max_delay: 60,
        }
    }

    #[test]
    fn backoff_grows_and_respects_retry_after_and_cap() {
        let config = config(5);
        assert_eq!(config.backoff_delay(0, 0), Duration::from_secs(5));
        assert_eq!(config.backoff_delay(2, 0), Duration::from_secs(20));
        assert_eq!(config.backoff_delay(0, 30), Duration::from_secs(30));
        assert_eq!(config.backoff_delay(10, 0), Duration::from_secs(60));
        assert_eq!(config.backoff_delay(40, 0), Duration::from_secs(60));
    }

    #[test]
    fn rate_limits_exhaust_after_max_retries() {
        let mut state = RetryState::new(config(2));
        let error = LastFmError::RateLimit { retry_after: 1 };

        assert!(matches!(state.next_action(&error), RetryAction::Backoff(_)));
        assert!(matches!(state.next_action(&error), RetryAction::Backoff(_)));
        assert_eq!(
            state.next_action(&error),
            RetryAction::GiveUp(EditFailureReason::ExhaustedRetries)
        );
        assert_eq!(state.retries(), 2);
        assert_eq!(state.total_delay(), Duration::from_secs(15));
    }

    #[test]
    fn session_expiry_gets_exactly_one_relogin() {
        let mut state = RetryState::new(config(0));
        assert_eq!(
            state.next_action(&LastFmError::SessionExpired),
            RetryAction::Relogin
        );
        assert_eq!(
            state.next_action(&LastFmError::SessionExpired),
            RetryAction::GiveUp(EditFailureReason::SessionExpired)
        );
        assert_eq!(state.retries(), 1);
    }

    #[test]
    fn final_errors_propagate() {
        let mut state = RetryState::new(config(3));
        assert_eq!(
            state.next_action(&LastFmError::CsrfNotFound),
            RetryAction::Propagate
        );
        assert_eq!(state.retries(), 0);
    }
}
