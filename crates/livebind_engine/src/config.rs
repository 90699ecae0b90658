//! Configuration for the sync engine.

use livebind_core::{ModeStrategy, DEFAULT_INTERVAL, DEFAULT_SELECTOR};
use std::time::Duration;
use url::Url;

/// Signal name that triggers a fetch on `event`-mode targets.
pub const DEFAULT_TRIGGER_SIGNAL: &str = "sync:trigger";

/// Configuration shared by every target of an engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base url relative endpoints are resolved against.
    pub base_url: Option<Url>,
    /// Selector used when discovery is called without one.
    pub selector: String,
    /// Polling interval for elements that do not declare one.
    pub default_interval: Duration,
    /// Timeout for a single HTTP fetch.
    pub request_timeout: Duration,
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// Signal name for manual-trigger targets.
    pub trigger_signal: String,
    /// How `auto` targets pick a transport.
    pub mode_strategy: ModeStrategy,
    /// Reconnect policy for persistent streams.
    pub retry: RetryConfig,
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self {
            base_url: None,
            selector: DEFAULT_SELECTOR.to_owned(),
            default_interval: DEFAULT_INTERVAL,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            trigger_signal: DEFAULT_TRIGGER_SIGNAL.to_owned(),
            mode_strategy: ModeStrategy::EndpointHeuristic,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the base url.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Sets the default discovery selector.
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = selector.into();
        self
    }

    /// Sets the default polling interval.
    pub fn with_default_interval(mut self, interval: Duration) -> Self {
        self.default_interval = interval;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the manual-trigger signal name.
    pub fn with_trigger_signal(mut self, signal: impl Into<String>) -> Self {
        self.trigger_signal = signal.into();
        self
    }

    /// Sets the mode resolution strategy.
    pub fn with_mode_strategy(mut self, strategy: ModeStrategy) -> Self {
        self.mode_strategy = strategy;
        self
    }

    /// Sets the reconnect policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Reconnect policy for persistent streams.
///
/// The delay before retry `n` (0-indexed) is
/// `min(max_delay, initial_delay * backoff_multiplier^n)`. Once `max_attempts`
/// retries have been spent without a successful message in between, the
/// target is abandoned.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of consecutive retries.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Creates a policy with the default delays and `max_attempts` retries.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }

    /// A policy that never reconnects.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Delay before retry `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Returns true once `attempts` retries exhaust the budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn engine_config_builder() {
        let config = EngineConfig::new()
            .with_base_url(Url::parse("http://localhost:3000").unwrap())
            .with_selector(".live")
            .with_default_interval(Duration::from_secs(2))
            .with_request_timeout(Duration::from_secs(5))
            .with_trigger_signal("refresh");

        assert_eq!(config.base_url.unwrap().as_str(), "http://localhost:3000/");
        assert_eq!(config.selector, ".live");
        assert_eq!(config.default_interval, Duration::from_secs(2));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.trigger_signal, "refresh");
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn default_backoff_sequence() {
        let retry = RetryConfig::default();
        let delays: Vec<u128> = (0..10).map(|n| retry.delay_for_attempt(n).as_millis()).collect();
        assert_eq!(
            delays,
            vec![500, 1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000, 30000]
        );
        assert!(!retry.is_exhausted(9));
        assert!(retry.is_exhausted(10));
    }

    #[test]
    fn no_retry_is_exhausted_immediately() {
        assert!(RetryConfig::no_retry().is_exhausted(0));
    }

    #[test]
    fn huge_attempts_stay_capped() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for_attempt(u32::MAX), Duration::from_secs(30));
    }

    proptest! {
        #[test]
        fn delay_matches_closed_form(n in 0u32..64) {
            let expected = 30_000u128.min(500u128 * 2u128.pow(n.min(40)));
            prop_assert_eq!(RetryConfig::default().delay_for_attempt(n).as_millis(), expected);
        }
    }
}
