//! Default recovery strategy for failed LLM calls.

use async_trait::async_trait;
use std::time::Duration;
use toolgate_core::{AgentConfig, ErrorRecoveryStrategy, LlmError, RecoveryAction};

/// Bounded retries with linear backoff.
///
/// Only transient failures (rate limits, timeouts, network errors, 5xx) are
/// retried. A rate limit waits at least as long as the provider asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(
            config.llm_max_retries,
            Duration::from_millis(config.llm_retry_backoff_ms),
        )
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt.max(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

#[async_trait]
impl ErrorRecoveryStrategy for RetryPolicy {
    async fn on_llm_error(&self, error: &LlmError, attempt: u32) -> RecoveryAction {
        if attempt > self.max_retries || !error.is_retryable() {
            return RecoveryAction::Fail;
        }
        let mut delay = self.delay_for(attempt);
        if let LlmError::RateLimited { retry_after_secs } = error {
            delay = delay.max(Duration::from_secs(*retry_after_secs));
        }
        RecoveryAction::Retry { delay }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> LlmError {
        LlmError::Network("connection reset".into())
    }

    #[tokio::test]
    async fn retries_transient_errors_up_to_the_limit() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100));

        assert_eq!(
            policy.on_llm_error(&network(), 1).await,
            RecoveryAction::Retry {
                delay: Duration::from_millis(100)
            }
        );
        assert_eq!(
            policy.on_llm_error(&network(), 2).await,
            RecoveryAction::Retry {
                delay: Duration::from_millis(200)
            }
        );
        assert_eq!(policy.on_llm_error(&network(), 3).await, RecoveryAction::Fail);
    }

    #[tokio::test]
    async fn client_errors_fail_immediately() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10));
        let err = LlmError::ApiError {
            status_code: 400,
            message: "bad request".into(),
        };
        assert_eq!(policy.on_llm_error(&err, 1).await, RecoveryAction::Fail);
    }

    #[tokio::test]
    async fn rate_limit_honours_retry_after() {
        let policy = RetryPolicy::new(1, Duration::from_millis(10));
        let err = LlmError::RateLimited { retry_after_secs: 3 };
        assert_eq!(
            policy.on_llm_error(&err, 1).await,
            RecoveryAction::Retry {
                delay: Duration::from_secs(3)
            }
        );
    }

    #[tokio::test]
    async fn none_never_retries() {
        assert_eq!(RetryPolicy::none().on_llm_error(&network(), 1).await, RecoveryAction::Fail);
    }

    #[test]
    fn built_from_config() {
        let config = AgentConfig {
            llm_max_retries: 4,
            llm_retry_backoff_ms: 50,
            ..AgentConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_retries(), 4);
        assert_eq!(policy.delay_for(3), Duration::from_millis(150));
    }
}
