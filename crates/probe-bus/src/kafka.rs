//! # Kafka Adapter
//!
//! Implements the broker ports on top of librdkafka. Only built with the
//! `kafka` feature.
//!
//! Blocking librdkafka calls (metadata fetches, consumer close) run on the
//! blocking pool so they never stall the runtime that drives the harness.

use crate::identity::BrokerIdentity;
use crate::message::Record;
use crate::ports::{
    AdminConnection, BrokerConnector, BusError, ConsumerConnection, ProducerConnection,
    TopicCreation, TopicSpec,
};
use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::metadata::Metadata;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::Message;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout for admin operations and metadata requests.
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// How long topic creation may wait for partition leaders.
const LEADER_WAIT: Duration = Duration::from_secs(10);

/// Poll interval while waiting for partition leaders.
const LEADER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Queue timeout for produced records.
const PRODUCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connector for a real Kafka-compatible cluster.
#[derive(Debug, Clone, Default)]
pub struct KafkaConnector;

impl KafkaConnector {
    /// Create a connector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn base_config(identity: &BrokerIdentity) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", identity.bootstrap_servers())
            .set("client.id", identity.client_id());
        config
    }

    /// Consumer settings for one bootstrap attempt.
    ///
    /// Every attempt joins a fresh group with no committed offsets, so the
    /// reset policy decides where reading starts. `earliest` also covers
    /// records published between `subscribe` and the lazy partition
    /// assignment.
    fn consumer_config(identity: &BrokerIdentity, group_id: &str) -> ClientConfig {
        let mut config = Self::base_config(identity);
        config
            .set("group.id", group_id)
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .set("enable.auto.commit", "true")
            .set("session.timeout.ms", "6000");
        config
    }
}

fn client_error(identity: &BrokerIdentity, err: &KafkaError) -> BusError {
    match err.rdkafka_error_code() {
        Some(RDKafkaErrorCode::BrokerTransportFailure)
        | Some(RDKafkaErrorCode::AllBrokersDown)
        | Some(RDKafkaErrorCode::OperationTimedOut) => BusError::Unreachable {
            brokers: identity.bootstrap_servers(),
            reason: err.to_string(),
        },
        _ => BusError::Client(err.to_string()),
    }
}

async fn fetch_metadata<F>(fetch: F) -> Result<Metadata, BusError>
where
    F: FnOnce() -> Result<Metadata, KafkaError> + Send + 'static,
{
    tokio::task::spawn_blocking(fetch)
        .await
        .map_err(|e| BusError::Client(format!("metadata task failed: {}", e)))?
        .map_err(|e| BusError::Client(e.to_string()))
}

fn leaders_elected(metadata: &Metadata, topic: &str) -> bool {
    metadata
        .topics()
        .iter()
        .find(|t| t.name() == topic)
        .is_some_and(|t| {
            t.error().is_none()
                && !t.partitions().is_empty()
                && t.partitions().iter().all(|p| p.leader() >= 0)
        })
}

#[async_trait]
impl BrokerConnector for KafkaConnector {
    async fn connect_admin(
        &self,
        identity: &BrokerIdentity,
    ) -> Result<Box<dyn AdminConnection>, BusError> {
        let client: AdminClient<DefaultClientContext> = Self::base_config(identity)
            .create()
            .map_err(|e| client_error(identity, &e))?;

        Ok(Box::new(KafkaAdmin {
            identity: identity.clone(),
            client: Arc::new(client),
        }))
    }

    async fn connect_consumer(
        &self,
        identity: &BrokerIdentity,
        group_id: &str,
    ) -> Result<Box<dyn ConsumerConnection>, BusError> {
        let consumer: StreamConsumer = Self::consumer_config(identity, group_id)
            .create()
            .map_err(|e| client_error(identity, &e))?;

        debug!(
            client_id = identity.client_id(),
            group_id = group_id,
            "Kafka consumer created"
        );

        Ok(Box::new(KafkaConsumer {
            identity: identity.clone(),
            group_id: group_id.to_string(),
            consumer: Arc::new(consumer),
        }))
    }

    async fn connect_producer(
        &self,
        identity: &BrokerIdentity,
    ) -> Result<Box<dyn ProducerConnection>, BusError> {
        let producer: FutureProducer = Self::base_config(identity)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| client_error(identity, &e))?;

        Ok(Box::new(KafkaProducer { producer }))
    }
}

struct KafkaAdmin {
    identity: BrokerIdentity,
    client: Arc<AdminClient<DefaultClientContext>>,
}

impl KafkaAdmin {
    async fn wait_for_leaders(&self, topic: &str) -> Result<(), BusError> {
        let deadline = tokio::time::Instant::now() + LEADER_WAIT;

        loop {
            let client = self.client.clone();
            let name = topic.to_string();
            let metadata =
                fetch_metadata(move || client.inner().fetch_metadata(Some(&name), METADATA_TIMEOUT))
                    .await?;

            if leaders_elected(&metadata, topic) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BusError::Admin(format!(
                    "no leader elected for topic {} within {:?}",
                    topic, LEADER_WAIT
                )));
            }
            tokio::time::sleep(LEADER_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl AdminConnection for KafkaAdmin {
    async fn create_topic(&mut self, spec: &TopicSpec) -> Result<TopicCreation, BusError> {
        let new_topic = NewTopic::new(
            &spec.name,
            spec.partitions,
            TopicReplication::Fixed(i32::from(spec.replication_factor)),
        );
        let options = AdminOptions::new().operation_timeout(Some(METADATA_TIMEOUT));

        let results = self
            .client
            .create_topics(&[new_topic], &options)
            .await
            .map_err(|e| client_error(&self.identity, &e))?;

        let mut creation = TopicCreation::Created;
        for result in results {
            match result {
                Ok(_) => {}
                Err((_, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    creation = TopicCreation::AlreadyExists;
                }
                Err((name, code)) => {
                    return Err(BusError::Admin(format!(
                        "failed to create topic {}: {}",
                        name, code
                    )));
                }
            }
        }

        if spec.wait_for_leaders {
            self.wait_for_leaders(&spec.name).await?;
        }
        Ok(creation)
    }

    async fn disconnect(self: Box<Self>) -> Result<(), BusError> {
        let client = self.client;
        tokio::task::spawn_blocking(move || drop(client))
            .await
            .map_err(|e| BusError::Client(format!("admin close failed: {}", e)))
    }
}

struct KafkaConsumer {
    identity: BrokerIdentity,
    group_id: String,
    consumer: Arc<StreamConsumer>,
}

#[async_trait]
impl ConsumerConnection for KafkaConsumer {
    fn group_id(&self) -> &str {
        &self.group_id
    }

    async fn subscribe(&mut self, topic: &str, from_beginning: bool) -> Result<(), BusError> {
        if !from_beginning {
            warn!(
                topic = topic,
                "Kafka consumers always start from the earliest offset"
            );
        }

        let consumer = self.consumer.clone();
        let name = topic.to_string();
        let metadata =
            fetch_metadata(move || consumer.fetch_metadata(Some(&name), METADATA_TIMEOUT))
                .await
                .map_err(|e| match e {
                    BusError::Client(reason) => BusError::Unreachable {
                        brokers: self.identity.bootstrap_servers(),
                        reason,
                    },
                    other => other,
                })?;

        if !leaders_elected(&metadata, topic) {
            return Err(BusError::UnknownTopic(topic.to_string()));
        }

        self.consumer
            .subscribe(&[topic])
            .map_err(|e| BusError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn next_record(&mut self) -> Option<Result<Record, BusError>> {
        let record = match self.consumer.recv().await {
            Ok(message) => Ok(Record {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                key: message.key().map(<[u8]>::to_vec),
                payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            }),
            Err(e) => Err(client_error(&self.identity, &e)),
        };
        Some(record)
    }

    async fn disconnect(self: Box<Self>) -> Result<(), BusError> {
        self.consumer.unsubscribe();
        let consumer = self.consumer;
        // Dropping the last handle closes the consumer and leaves the group.
        tokio::task::spawn_blocking(move || drop(consumer))
            .await
            .map_err(|e| BusError::Client(format!("consumer close failed: {}", e)))
    }
}

struct KafkaProducer {
    producer: FutureProducer,
}

#[async_trait]
impl ProducerConnection for KafkaProducer {
    async fn send(
        &mut self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
    ) -> Result<(), BusError> {
        let record = FutureRecord::<str, [u8]>::to(topic).payload(payload);
        let record = match key {
            Some(key) => record.key(key),
            None => record,
        };

        self.producer
            .send(record, PRODUCE_TIMEOUT)
            .await
            .map(|_| ())
            .map_err(|(e, _)| BusError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn disconnect(self: Box<Self>) -> Result<(), BusError> {
        let producer = self.producer;
        tokio::task::spawn_blocking(move || {
            rdkafka::producer::Producer::flush(&producer, PRODUCE_TIMEOUT)
        })
        .await
        .map_err(|e| BusError::Client(format!("producer flush failed: {}", e)))?
        .map_err(|e| BusError::Client(e.to_string()))
    }
}
