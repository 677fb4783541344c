//! Retry strategies for external calls.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Decides whether, and after how long, a failed call is retried.
pub trait RetryStrategy: Send + Sync {
    /// Delay before the next try, given how many tries have failed so far.
    /// `None` means give up.
    fn next_delay(&self, failures: usize) -> Option<Duration>;
}

/// Single try, no retries.
pub struct NoRetry;

impl RetryStrategy for NoRetry {
    fn next_delay(&self, _failures: usize) -> Option<Duration> {
        None
    }
}

/// Up to `max_attempts` tries with a fixed delay between them.
pub struct FixedRetry {
    max_attempts: usize,
    delay: Duration,
}

impl FixedRetry {
    pub fn new(max_attempts: usize, delay_secs: f64) -> Self {
        Self {
            max_attempts,
            delay: Duration::from_secs_f64(delay_secs.max(0.0)),
        }
    }
}

impl RetryStrategy for FixedRetry {
    fn next_delay(&self, failures: usize) -> Option<Duration> {
        if failures < self.max_attempts {
            Some(self.delay)
        } else {
            None
        }
    }
}

/// Up to `max_attempts` tries, doubling the delay each time.
pub struct ExponentialRetry {
    max_attempts: usize,
    base_delay: f64,
    max_delay: f64,
}

impl ExponentialRetry {
    pub fn new(max_attempts: usize, base_delay: f64, max_delay: Option<f64>) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay: max_delay.unwrap_or(60.0),
        }
    }
}

impl RetryStrategy for ExponentialRetry {
    fn next_delay(&self, failures: usize) -> Option<Duration> {
        if failures < self.max_attempts {
            let exponent = failures.saturating_sub(1).min(30) as i32;
            let delay = self.base_delay * 2.0_f64.powi(exponent);
            Some(Duration::from_secs_f64(delay.min(self.max_delay).max(0.0)))
        } else {
            None
        }
    }
}

/// `[generation.retry]` settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// "none", "fixed" or "exponential".
    pub strategy: String,
    pub max_attempts: usize,
    pub delay: f64,
    pub max_delay: Option<f64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            strategy: "fixed".to_string(),
            max_attempts: 3,
            delay: 2.0,
            max_delay: None,
        }
    }
}

/// Build a retry strategy from settings; unknown names fall back to fixed.
pub fn build_retry_strategy(settings: &RetrySettings) -> Box<dyn RetryStrategy> {
    match settings.strategy.as_str() {
        "none" => Box::new(NoRetry),
        "exponential" => Box::new(ExponentialRetry::new(
            settings.max_attempts,
            settings.delay,
            settings.max_delay,
        )),
        _ => Box::new(FixedRetry::new(settings.max_attempts, settings.delay)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_retry() {
        let retry = FixedRetry::new(3, 2.0);
        assert_eq!(retry.next_delay(1), Some(Duration::from_secs(2)));
        assert_eq!(retry.next_delay(2), Some(Duration::from_secs(2)));
        assert_eq!(retry.next_delay(3), None);
    }

    #[test]
    fn test_exponential_retry_caps() {
        let retry = ExponentialRetry::new(10, 1.0, Some(5.0));
        assert_eq!(retry.next_delay(1), Some(Duration::from_secs(1)));
        assert_eq!(retry.next_delay(3), Some(Duration::from_secs(4)));
        assert_eq!(retry.next_delay(6), Some(Duration::from_secs(5)));
        assert_eq!(retry.next_delay(10), None);
    }

    #[test]
    fn test_build_from_settings() {
        let none = RetrySettings {
            strategy: "none".into(),
            ..RetrySettings::default()
        };
        assert_eq!(build_retry_strategy(&none).next_delay(1), None);
        assert!(build_retry_strategy(&RetrySettings::default()).next_delay(2).is_some());
    }
}
