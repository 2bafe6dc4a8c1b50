//! # Broker Identity
//!
//! The logical client identity one harness invocation presents to the broker.

use uuid::Uuid;

/// Client identity for a single harness call.
///
/// Built once per call and never mutated. The client id is the caller's
/// prefix plus a random token, so concurrent invocations never collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerIdentity {
    client_id: String,
    brokers: Vec<String>,
}

impl BrokerIdentity {
    /// Create an identity with a fresh client id.
    #[must_use]
    pub fn new(prefix: &str, brokers: Vec<String>) -> Self {
        Self {
            client_id: format!("{}-{}", prefix, Uuid::new_v4()),
            brokers,
        }
    }

    /// Unique client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Ordered broker address list.
    #[must_use]
    pub fn brokers(&self) -> &[String] {
        &self.brokers
    }

    /// Broker addresses joined the way Kafka clients expect them.
    #[must_use]
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }
}
