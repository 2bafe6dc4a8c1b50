//! # Topic Provisioner
//!
//! Makes sure a topic exists before any consumer attaches to it.

use crate::error::{ProbeError, Result};
use probe_bus::{BrokerConnector, BrokerIdentity, TopicCreation, TopicSpec};
use tracing::{debug, info};

/// Create `topic` (one partition, one replica) and wait for its leader.
///
/// An existing topic counts as success. The admin connection is released
/// on every path; a failing release is logged and never replaces the
/// creation outcome. Connection failures are not retried.
pub async fn ensure_topic_exists(
    connector: &dyn BrokerConnector,
    identity: &BrokerIdentity,
    topic: &str,
) -> Result<TopicCreation> {
    let provisioning_error = |source| ProbeError::Provisioning {
        topic: topic.to_string(),
        source,
    };

    let mut admin = connector
        .connect_admin(identity)
        .await
        .map_err(provisioning_error)?;

    let created = admin.create_topic(&TopicSpec::single_partition(topic)).await;

    if let Err(e) = admin.disconnect().await {
        debug!(topic = topic, error = %e, "Admin disconnect failed, ignoring");
    }

    let creation = created.map_err(provisioning_error)?;
    match creation {
        TopicCreation::Created => info!(topic = topic, "Topic created"),
        TopicCreation::AlreadyExists => debug!(topic = topic, "Topic already exists"),
    }
    Ok(creation)
}
