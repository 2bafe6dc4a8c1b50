//! # In-Memory Broker
//!
//! A single-process broker implementing every port in [`crate::ports`].
//!
//! Each topic is an append-only log. Consumers keep their own read position,
//! so subscribing from the beginning replays everything published so far.
//! Connection counts and attempted consumer groups are tracked, and
//! connection failures can be injected, so harness behavior around
//! bootstrap retries and resource release is observable in tests.

use crate::identity::BrokerIdentity;
use crate::message::Record;
use crate::ports::{
    AdminConnection, BrokerConnector, BusError, ConsumerConnection, ProducerConnection,
    TopicCreation, TopicSpec,
};
use crate::subscriber::MemoryConsumer;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Append-only record log for one topic.
pub(crate) struct TopicLog {
    name: String,
    records: RwLock<Vec<Record>>,
    /// Number of records in the log; bumped after every append.
    watermark: watch::Sender<usize>,
}

impl TopicLog {
    fn new(name: &str) -> Self {
        let (watermark, _) = watch::channel(0);
        Self {
            name: name.to_string(),
            records: RwLock::new(Vec::new()),
            watermark,
        }
    }

    fn append(&self, key: Option<Vec<u8>>, payload: Vec<u8>) -> i64 {
        let len = {
            let mut records = self.records.write();
            let offset = records.len() as i64;
            records.push(Record {
                topic: self.name.clone(),
                partition: 0,
                offset,
                key,
                payload,
            });
            records.len()
        };
        self.watermark.send_replace(len);
        (len - 1) as i64
    }

    pub(crate) fn get(&self, position: usize) -> Option<Record> {
        self.records.read().get(position).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.read().len()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<usize> {
        self.watermark.subscribe()
    }
}

/// Decrements an open-connection counter when dropped.
pub(crate) struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    fn open(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter: counter.clone(),
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

struct BrokerState {
    topics: RwLock<HashMap<String, Arc<TopicLog>>>,
    reachable: AtomicBool,
    failing_consumer_connects: AtomicUsize,
    consumer_groups: Mutex<Vec<String>>,
    open_admins: Arc<AtomicUsize>,
    open_consumers: Arc<AtomicUsize>,
    open_producers: Arc<AtomicUsize>,
    records_published: AtomicU64,
}

/// In-memory implementation of the broker ports.
///
/// Cheap to clone; clones share the same topics and counters.
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl InMemoryBroker {
    /// Create an empty, reachable broker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(BrokerState {
                topics: RwLock::new(HashMap::new()),
                reachable: AtomicBool::new(true),
                failing_consumer_connects: AtomicUsize::new(0),
                consumer_groups: Mutex::new(Vec::new()),
                open_admins: Arc::new(AtomicUsize::new(0)),
                open_consumers: Arc::new(AtomicUsize::new(0)),
                open_producers: Arc::new(AtomicUsize::new(0)),
                records_published: AtomicU64::new(0),
            }),
        }
    }

    /// Publish a raw payload, creating the topic if needed.
    ///
    /// Returns the offset the record was stored at.
    pub fn publish_raw(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> i64 {
        let log = self.topic_or_create(topic);
        let offset = log.append(key.map(|k| k.as_bytes().to_vec()), payload.to_vec());
        self.state.records_published.fetch_add(1, Ordering::Relaxed);
        debug!(topic = topic, offset = offset, "Record published");
        offset
    }

    /// Publish a JSON value, creating the topic if needed.
    pub fn publish_json(&self, topic: &str, value: &serde_json::Value) -> i64 {
        self.publish_raw(topic, None, value.to_string().as_bytes())
    }

    /// Make every connection attempt fail (or succeed again).
    pub fn set_reachable(&self, reachable: bool) {
        self.state.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Fail the next `count` consumer connection attempts.
    pub fn fail_next_consumer_connects(&self, count: usize) {
        self.state
            .failing_consumer_connects
            .store(count, Ordering::SeqCst);
    }

    /// Whether `topic` exists.
    #[must_use]
    pub fn topic_exists(&self, topic: &str) -> bool {
        self.state.topics.read().contains_key(topic)
    }

    /// Number of records stored in `topic`.
    #[must_use]
    pub fn record_count(&self, topic: &str) -> usize {
        self.state
            .topics
            .read()
            .get(topic)
            .map_or(0, |log| log.len())
    }

    /// Every consumer group id a connection was attempted with, in order.
    #[must_use]
    pub fn consumer_groups(&self) -> Vec<String> {
        self.state.consumer_groups.lock().clone()
    }

    /// Currently open administrative connections.
    #[must_use]
    pub fn open_admin_connections(&self) -> usize {
        self.state.open_admins.load(Ordering::SeqCst)
    }

    /// Currently open consumer connections.
    #[must_use]
    pub fn open_consumer_connections(&self) -> usize {
        self.state.open_consumers.load(Ordering::SeqCst)
    }

    /// Currently open producer connections.
    #[must_use]
    pub fn open_producer_connections(&self) -> usize {
        self.state.open_producers.load(Ordering::SeqCst)
    }

    /// Total records published.
    #[must_use]
    pub fn records_published(&self) -> u64 {
        self.state.records_published.load(Ordering::Relaxed)
    }

    pub(crate) fn topic(&self, topic: &str) -> Option<Arc<TopicLog>> {
        self.state.topics.read().get(topic).cloned()
    }

    fn topic_or_create(&self, topic: &str) -> Arc<TopicLog> {
        if let Some(log) = self.topic(topic) {
            return log;
        }
        self.state
            .topics
            .write()
            .entry(topic.to_string())
            .or_insert_with(|| Arc::new(TopicLog::new(topic)))
            .clone()
    }

    fn check_reachable(&self, identity: &BrokerIdentity) -> Result<(), BusError> {
        if self.state.reachable.load(Ordering::SeqCst) {
            return Ok(());
        }
        Err(BusError::Unreachable {
            brokers: identity.bootstrap_servers(),
            reason: "connection refused".into(),
        })
    }

    fn take_injected_failure(&self) -> bool {
        self.state
            .failing_consumer_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerConnector for InMemoryBroker {
    async fn connect_admin(
        &self,
        identity: &BrokerIdentity,
    ) -> Result<Box<dyn AdminConnection>, BusError> {
        self.check_reachable(identity)?;
        debug!(client_id = identity.client_id(), "Admin connection opened");
        Ok(Box::new(MemoryAdmin {
            broker: self.clone(),
            _guard: ConnectionGuard::open(&self.state.open_admins),
        }))
    }

    async fn connect_consumer(
        &self,
        identity: &BrokerIdentity,
        group_id: &str,
    ) -> Result<Box<dyn ConsumerConnection>, BusError> {
        self.state.consumer_groups.lock().push(group_id.to_string());
        self.check_reachable(identity)?;

        if self.take_injected_failure() {
            warn!(group_id = group_id, "Injected consumer connection failure");
            return Err(BusError::Unreachable {
                brokers: identity.bootstrap_servers(),
                reason: "broker not ready".into(),
            });
        }

        debug!(
            client_id = identity.client_id(),
            group_id = group_id,
            "Consumer connection opened"
        );
        Ok(Box::new(MemoryConsumer::new(
            self.clone(),
            group_id,
            ConnectionGuard::open(&self.state.open_consumers),
        )))
    }

    async fn connect_producer(
        &self,
        identity: &BrokerIdentity,
    ) -> Result<Box<dyn ProducerConnection>, BusError> {
        self.check_reachable(identity)?;
        Ok(Box::new(MemoryProducer {
            broker: self.clone(),
            _guard: ConnectionGuard::open(&self.state.open_producers),
        }))
    }
}

struct MemoryAdmin {
    broker: InMemoryBroker,
    _guard: ConnectionGuard,
}

#[async_trait]
impl AdminConnection for MemoryAdmin {
    async fn create_topic(&mut self, spec: &TopicSpec) -> Result<TopicCreation, BusError> {
        if spec.partitions != 1 {
            return Err(BusError::Admin(format!(
                "in-memory broker supports a single partition, requested {}",
                spec.partitions
            )));
        }

        let mut topics = self.broker.state.topics.write();
        if topics.contains_key(&spec.name) {
            return Ok(TopicCreation::AlreadyExists);
        }
        topics.insert(spec.name.clone(), Arc::new(TopicLog::new(&spec.name)));
        // Leader election is immediate for an in-process log.
        Ok(TopicCreation::Created)
    }

    async fn disconnect(self: Box<Self>) -> Result<(), BusError> {
        Ok(())
    }
}

struct MemoryProducer {
    broker: InMemoryBroker,
    _guard: ConnectionGuard,
}

#[async_trait]
impl ProducerConnection for MemoryProducer {
    async fn send(
        &mut self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
    ) -> Result<(), BusError> {
        self.broker.publish_raw(topic, key, payload);
        Ok(())
    }

    async fn disconnect(self: Box<Self>) -> Result<(), BusError> {
        Ok(())
    }
}
