//! Shared setup for harness scenarios.

use probe_harness::{BusProbe, HarnessConfig, InMemoryBroker, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;

pub const IDENTITY_TOPIC: &str = "identity-events";

/// A broker plus a probe bound to it with short, test-friendly timings.
pub struct Fixture {
    pub broker: InMemoryBroker,
    pub probe: BusProbe,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(
            HarnessConfig::default()
                .with_wait_timeout(Duration::from_millis(1_000))
                .with_absence_window(Duration::from_millis(500))
                .with_retry(RetryPolicy {
                    attempts: 10,
                    backoff: Duration::from_millis(10),
                }),
        )
    }

    pub fn with_config(config: HarnessConfig) -> Self {
        probe_telemetry::init_test_logging();
        let broker = InMemoryBroker::new();
        let probe = BusProbe::new(Arc::new(broker.clone()), config);
        Self { broker, probe }
    }

    /// Poll until every consumer the harness opened has been disconnected.
    pub async fn consumers_released(&self) -> bool {
        for _ in 0..400 {
            if self.broker.open_consumer_connections() == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
