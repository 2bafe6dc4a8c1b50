//! # Broker Ports
//!
//! Traits the harness uses to reach a broker. Every connection type is owned
//! by exactly one caller and released with an explicit `disconnect`.

use crate::identity::BrokerIdentity;
use crate::message::Record;
use crate::{DEFAULT_PARTITIONS, DEFAULT_REPLICATION_FACTOR};
use async_trait::async_trait;
use thiserror::Error;

/// Errors from broker operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// No broker answered at the configured addresses.
    #[error("broker unreachable at {brokers}: {reason}")]
    Unreachable { brokers: String, reason: String },

    /// The topic does not exist on the broker.
    #[error("unknown topic {0}")]
    UnknownTopic(String),

    /// Subscribing to a topic failed.
    #[error("failed to subscribe to topic {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    /// A topic administration request failed.
    #[error("topic administration failed: {0}")]
    Admin(String),

    /// Producing a record failed.
    #[error("publish to topic {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    /// The connection was used after it was closed.
    #[error("connection closed")]
    Closed,

    /// Any other client-side failure.
    #[error("broker client error: {0}")]
    Client(String),
}

/// Topic creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    /// Topic name.
    pub name: String,
    /// Partition count.
    pub partitions: i32,
    /// Replication factor.
    pub replication_factor: i16,
    /// Block until every partition has an elected leader.
    pub wait_for_leaders: bool,
}

impl TopicSpec {
    /// Single partition, single replica, wait for leader election.
    #[must_use]
    pub fn single_partition(name: &str) -> Self {
        Self {
            name: name.to_string(),
            partitions: DEFAULT_PARTITIONS,
            replication_factor: DEFAULT_REPLICATION_FACTOR,
            wait_for_leaders: true,
        }
    }
}

/// Outcome of a topic creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicCreation {
    /// The topic was created by this request.
    Created,
    /// The topic was already present.
    AlreadyExists,
}

/// Factory for broker connections.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Open an administrative connection.
    async fn connect_admin(
        &self,
        identity: &BrokerIdentity,
    ) -> Result<Box<dyn AdminConnection>, BusError>;

    /// Open a consumer connection that joins `group_id`.
    async fn connect_consumer(
        &self,
        identity: &BrokerIdentity,
        group_id: &str,
    ) -> Result<Box<dyn ConsumerConnection>, BusError>;

    /// Open a producer connection.
    async fn connect_producer(
        &self,
        identity: &BrokerIdentity,
    ) -> Result<Box<dyn ProducerConnection>, BusError>;
}

/// Short-lived administrative connection.
#[async_trait]
pub trait AdminConnection: Send {
    /// Request creation of a topic. An existing topic is not an error.
    async fn create_topic(&mut self, spec: &TopicSpec) -> Result<TopicCreation, BusError>;

    /// Release the connection.
    async fn disconnect(self: Box<Self>) -> Result<(), BusError>;
}

/// A consumer bound to one consumer group.
///
/// `next_record` must be cancel-safe: dropping its future before completion
/// must not lose a record.
#[async_trait]
pub trait ConsumerConnection: Send {
    /// The consumer group this connection joined.
    fn group_id(&self) -> &str;

    /// Subscribe to `topic`, optionally replaying from the earliest offset.
    async fn subscribe(&mut self, topic: &str, from_beginning: bool) -> Result<(), BusError>;

    /// Next delivered record. `None` once the broker side is gone.
    async fn next_record(&mut self) -> Option<Result<Record, BusError>>;

    /// Leave the group and release the connection.
    async fn disconnect(self: Box<Self>) -> Result<(), BusError>;
}

/// A producer connection.
#[async_trait]
pub trait ProducerConnection: Send {
    /// Publish one record.
    async fn send(&mut self, topic: &str, key: Option<&str>, payload: &[u8])
        -> Result<(), BusError>;

    /// Flush and release the connection.
    async fn disconnect(self: Box<Self>) -> Result<(), BusError>;
}
