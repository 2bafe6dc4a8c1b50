//! # In-Memory Consumer
//!
//! Consumer side of the in-memory broker.

use crate::message::Record;
use crate::ports::{BusError, ConsumerConnection};
use crate::publisher::{ConnectionGuard, InMemoryBroker, TopicLog};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

struct TopicCursor {
    log: Arc<TopicLog>,
    position: usize,
    watermark: watch::Receiver<usize>,
}

/// A consumer connection on the in-memory broker.
///
/// Dropping the consumer releases its connection slot, so a failed
/// bootstrap attempt that never reaches `disconnect` is still accounted for.
pub struct MemoryConsumer {
    broker: InMemoryBroker,
    group_id: String,
    cursor: Option<TopicCursor>,
    _guard: ConnectionGuard,
}

impl MemoryConsumer {
    pub(crate) fn new(broker: InMemoryBroker, group_id: &str, guard: ConnectionGuard) -> Self {
        Self {
            broker,
            group_id: group_id.to_string(),
            cursor: None,
            _guard: guard,
        }
    }
}

#[async_trait]
impl ConsumerConnection for MemoryConsumer {
    fn group_id(&self) -> &str {
        &self.group_id
    }

    async fn subscribe(&mut self, topic: &str, from_beginning: bool) -> Result<(), BusError> {
        let log = self
            .broker
            .topic(topic)
            .ok_or_else(|| BusError::UnknownTopic(topic.to_string()))?;

        let watermark = log.watch();
        let position = if from_beginning { 0 } else { log.len() };

        debug!(
            topic = topic,
            group_id = %self.group_id,
            position = position,
            "Consumer subscribed"
        );

        self.cursor = Some(TopicCursor {
            log,
            position,
            watermark,
        });
        Ok(())
    }

    async fn next_record(&mut self) -> Option<Result<Record, BusError>> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Some(Err(BusError::Closed));
        };

        loop {
            if let Some(record) = cursor.log.get(cursor.position) {
                cursor.position += 1;
                return Some(Ok(record));
            }
            // Wait for the next append; the sender lives as long as the log.
            if cursor.watermark.changed().await.is_err() {
                return None;
            }
        }
    }

    async fn disconnect(self: Box<Self>) -> Result<(), BusError> {
        debug!(group_id = %self.group_id, "Consumer disconnected");
        Ok(())
    }
}
