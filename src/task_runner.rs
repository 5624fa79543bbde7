//! Circuit breaker for the bot loop
//!
//! Tracks consecutive cycle failures and hands out an exponentially growing
//! retry delay. Once the failure budget is spent the breaker opens and the
//! caller gets a `TaskError` instead of another delay.

use std::time::Duration;
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task '{task}' exceeded maximum consecutive failures ({failures}). Last error: {last_error}")]
    CircuitOpen {
        task: String,
        failures: u32,
        last_error: String,
    },
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures tolerated before the breaker opens
    pub max_consecutive_failures: u32,
    /// Delay after the first failure
    pub initial_retry_delay: Duration,
    /// Cap for the exponential backoff
    pub max_retry_delay: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 10,
            initial_retry_delay: Duration::from_secs(5),
            max_retry_delay: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    task_name: String,
    config: CircuitBreakerConfig,
    consecutive_failures: u32,
    current_retry_delay: Duration,
}

impl CircuitBreaker {
    pub fn new(task_name: &str, config: CircuitBreakerConfig) -> Self {
        Self {
            task_name: task_name.to_string(),
            current_retry_delay: config.initial_retry_delay,
            consecutive_failures: 0,
            config,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 {
            warn!(
                "Task '{}' recovered after {} failures",
                self.task_name, self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.current_retry_delay = self.config.initial_retry_delay;
    }

    /// Register a failure and return how long to wait before retrying
    pub fn record_failure(&mut self, reason: &str) -> Result<Duration, TaskError> {
        self.consecutive_failures += 1;
        error!(
            "Task '{}' failed (attempt {}/{}): {}",
            self.task_name, self.consecutive_failures, self.config.max_consecutive_failures, reason
        );

        if self.consecutive_failures >= self.config.max_consecutive_failures {
            return Err(TaskError::CircuitOpen {
                task: self.task_name.clone(),
                failures: self.consecutive_failures,
                last_error: reason.to_string(),
            });
        }

        let delay = self.current_retry_delay;
        self.current_retry_delay =
            std::cmp::min(self.current_retry_delay * 2, self.config.max_retry_delay);
        warn!("Task '{}' will retry in {:?}", self.task_name, delay);
        Ok(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            max_consecutive_failures: 4,
            initial_retry_delay: Duration::from_millis(10),
            max_retry_delay: Duration::from_millis(25),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut breaker = CircuitBreaker::new("test_task", config());
        assert_eq!(breaker.record_failure("boom").unwrap(), Duration::from_millis(10));
        assert_eq!(breaker.record_failure("boom").unwrap(), Duration::from_millis(20));
        assert_eq!(breaker.record_failure("boom").unwrap(), Duration::from_millis(25));
    }

    #[test]
    fn test_circuit_breaker_resets_on_success() {
        let mut breaker = CircuitBreaker::new("test_task", config());
        breaker.record_failure("boom").unwrap();
        breaker.record_failure("boom").unwrap();
        breaker.record_success();
        assert_eq!(breaker.consecutive_failures(), 0);
        assert_eq!(breaker.record_failure("boom").unwrap(), Duration::from_millis(10));
    }

    #[test]
    fn test_circuit_opens_on_max_failures() {
        let mut breaker = CircuitBreaker::new("failing_task", config());
        for _ in 0..3 {
            assert!(breaker.record_failure("always fails").is_ok());
        }
        let err = breaker.record_failure("always fails").unwrap_err();
        assert!(err
            .to_string()
            .contains("exceeded maximum consecutive failures (4)"));
    }
}
