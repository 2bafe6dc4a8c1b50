//! # Bus Probe
//!
//! Entry point that binds a broker connector to a harness configuration.

use crate::absence::{assert_no_message, AbsenceOptions};
use crate::config::HarnessConfig;
use crate::error::{ProbeError, Result};
use crate::provision::ensure_topic_exists;
use crate::wait::{wait_for_message, WaitOptions};
use probe_bus::{BrokerConnector, BusMessage, TopicCreation};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Harness bound to one broker. Cheap to clone, so triggers can capture
/// a copy to publish with.
#[derive(Clone)]
pub struct BusProbe {
    connector: Arc<dyn BrokerConnector>,
    config: HarnessConfig,
}

impl BusProbe {
    /// Create a probe over `connector`.
    pub fn new(connector: Arc<dyn BrokerConnector>, config: HarnessConfig) -> Self {
        Self { connector, config }
    }

    /// Probe against the Kafka cluster named by the environment.
    #[cfg(feature = "kafka")]
    pub fn kafka_from_env() -> Self {
        Self::new(
            Arc::new(probe_bus::KafkaConnector::new()),
            HarnessConfig::from_env(),
        )
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Idempotently create `topic`.
    pub async fn ensure_topic(&self, topic: &str) -> Result<TopicCreation> {
        let identity = self.config.identity("admin");
        ensure_topic_exists(self.connector.as_ref(), &identity, topic).await
    }

    /// See [`wait_for_message`].
    pub async fn wait_for_message<F, Fut>(
        &self,
        topic: &str,
        options: WaitOptions,
        trigger: F,
    ) -> Result<BusMessage>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        wait_for_message(self.connector.as_ref(), &self.config, topic, options, trigger).await
    }

    /// Wait for the first message whose `type` is `event_type`.
    pub async fn wait_for_type<F, Fut>(
        &self,
        topic: &str,
        event_type: &str,
        trigger: F,
    ) -> Result<BusMessage>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        self.wait_for_message(topic, WaitOptions::of_type(event_type), trigger)
            .await
    }

    /// See [`assert_no_message`].
    pub async fn assert_no_message<F, Fut>(
        &self,
        topic: &str,
        options: AbsenceOptions,
        trigger: F,
    ) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        assert_no_message(self.connector.as_ref(), &self.config, topic, options, trigger).await
    }

    /// Assert no message whose `type` is `event_type` appears.
    pub async fn assert_no_type<F, Fut>(&self, topic: &str, event_type: &str, trigger: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        self.assert_no_message(topic, AbsenceOptions::of_type(event_type), trigger)
            .await
    }

    /// Serialize `payload` as JSON and publish it to `topic`.
    pub async fn publish<T>(&self, topic: &str, payload: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let bytes = serde_json::to_vec(payload)?;
        let identity = self.config.identity("publish");
        let publish_error = |source| ProbeError::Publish {
            topic: topic.to_string(),
            source,
        };

        let mut producer = self
            .connector
            .connect_producer(&identity)
            .await
            .map_err(publish_error)?;

        let sent = producer.send(topic, None, &bytes).await;
        if let Err(e) = producer.disconnect().await {
            debug!(topic = topic, error = %e, "Producer disconnect failed, ignoring");
        }
        sent.map_err(publish_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_bus::InMemoryBroker;
    use serde_json::json;
    use std::time::Duration;

    fn probe(broker: &InMemoryBroker) -> BusProbe {
        BusProbe::new(
            Arc::new(broker.clone()),
            HarnessConfig::default().with_absence_window(Duration::from_millis(50)),
        )
    }

    #[tokio::test]
    async fn test_publish_then_wait_for_type() {
        let broker = InMemoryBroker::new();
        let probe = probe(&broker);
        let publisher = probe.clone();

        let message = probe
            .wait_for_type("identity-events", "USER_LOGIN", || async move {
                publisher
                    .publish(
                        "identity-events",
                        &json!({"type": "USER_LOGIN", "domainId": "realm-a"}),
                    )
                    .await?;
                Ok::<_, anyhow::Error>(())
            })
            .await
            .unwrap();

        assert_eq!(message.domain_id(), Some("realm-a"));
        assert_eq!(broker.open_producer_connections(), 0);
    }

    #[tokio::test]
    async fn test_assert_no_type_uses_configured_window() {
        let broker = InMemoryBroker::new();
        let probe = probe(&broker);
        let started = tokio::time::Instant::now();

        probe
            .assert_no_type("identity-events", "USER_LOGIN", || async { Ok(()) })
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_ensure_topic_twice() {
        let broker = InMemoryBroker::new();
        let probe = probe(&broker);

        assert_eq!(probe.ensure_topic("t").await.unwrap(), TopicCreation::Created);
        assert_eq!(
            probe.ensure_topic("t").await.unwrap(),
            TopicCreation::AlreadyExists
        );
    }

    #[tokio::test]
    async fn test_publish_to_unreachable_broker_fails() {
        let broker = InMemoryBroker::new();
        broker.set_reachable(false);

        let err = probe(&broker)
            .publish("t", &json!({"type": "USER_LOGIN"}))
            .await
            .unwrap_err();

        assert!(matches!(err, ProbeError::Publish { .. }));
    }
}
