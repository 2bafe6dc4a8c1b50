//! Harness configuration from environment variables.

use probe_bus::{BrokerIdentity, DEFAULT_BROKER_ADDRESS};
use std::env;
use std::time::Duration;

/// Default deadline for `wait_for_message`.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(20_000);

/// Default observation window for `assert_no_message`.
pub const DEFAULT_ABSENCE_WINDOW: Duration = Duration::from_millis(5_000);

/// Default number of consumer bootstrap attempts.
pub const DEFAULT_BOOTSTRAP_ATTEMPTS: u32 = 10;

/// Default pause between consumer bootstrap attempts.
pub const DEFAULT_BOOTSTRAP_BACKOFF: Duration = Duration::from_millis(500);

/// Bounded, fixed-backoff retry policy for consumer bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Pause after a failed attempt when attempts remain.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_BOOTSTRAP_ATTEMPTS,
            backoff: DEFAULT_BOOTSTRAP_BACKOFF,
        }
    }
}

/// Configuration shared by every harness call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Broker bootstrap addresses.
    pub brokers: Vec<String>,

    /// Prefix for client ids and consumer group ids.
    pub client_prefix: String,

    /// Default deadline for waiting on a message.
    pub wait_timeout: Duration,

    /// Default window for absence assertions.
    pub absence_window: Duration,

    /// Consumer bootstrap retry policy.
    pub retry: RetryPolicy,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            brokers: vec![DEFAULT_BROKER_ADDRESS.to_string()],
            client_prefix: "bus-probe".to_string(),
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            absence_window: DEFAULT_ABSENCE_WINDOW,
            retry: RetryPolicy::default(),
        }
    }
}

impl HarnessConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `KAFKA_BROKERS`: Comma-separated broker list (default: localhost:9092)
    /// - `PROBE_CLIENT_PREFIX`: Client id prefix (default: bus-probe)
    /// - `PROBE_WAIT_TIMEOUT_MS`: Default wait deadline (default: 20000)
    /// - `PROBE_ABSENCE_WINDOW_MS`: Default absence window (default: 5000)
    /// - `PROBE_BOOTSTRAP_ATTEMPTS`: Consumer bootstrap attempts (default: 10)
    /// - `PROBE_BOOTSTRAP_BACKOFF_MS`: Pause between attempts (default: 500)
    ///
    /// Values that fail to parse fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |key: &str, fallback: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map_or(fallback, Duration::from_millis)
        };

        let brokers = lookup("KAFKA_BROKERS")
            .map(|v| parse_broker_list(&v))
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.brokers);

        Self {
            brokers,
            client_prefix: lookup("PROBE_CLIENT_PREFIX")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.client_prefix),
            wait_timeout: millis("PROBE_WAIT_TIMEOUT_MS", defaults.wait_timeout),
            absence_window: millis("PROBE_ABSENCE_WINDOW_MS", defaults.absence_window),
            retry: RetryPolicy {
                attempts: lookup("PROBE_BOOTSTRAP_ATTEMPTS")
                    .and_then(|v| v.trim().parse::<u32>().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(defaults.retry.attempts),
                backoff: millis("PROBE_BOOTSTRAP_BACKOFF_MS", defaults.retry.backoff),
            },
        }
    }

    /// Override the broker list.
    #[must_use]
    pub fn with_brokers(mut self, brokers: Vec<String>) -> Self {
        self.brokers = brokers;
        self
    }

    /// Override the client prefix.
    #[must_use]
    pub fn with_client_prefix(mut self, prefix: &str) -> Self {
        self.client_prefix = prefix.to_string();
        self
    }

    /// Override the default wait deadline.
    #[must_use]
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Override the default absence window.
    #[must_use]
    pub fn with_absence_window(mut self, window: Duration) -> Self {
        self.absence_window = window;
        self
    }

    /// Override the bootstrap retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build a fresh identity for one harness invocation.
    #[must_use]
    pub fn identity(&self, name: &str) -> BrokerIdentity {
        BrokerIdentity::new(
            &format!("{}-{}", self.client_prefix, name),
            self.brokers.clone(),
        )
    }
}

fn parse_broker_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
