//! # Probe Bus - Broker Ports for the Bus Probe Harness
//!
//! Defines the boundary between the assertion harness and a Kafka-compatible
//! broker. The harness only ever talks to the traits in [`ports`]; concrete
//! brokers plug in behind them.
//!
//! ## Adapters
//!
//! ```text
//! ┌──────────────────┐        ┌───────────────────┐
//! │  probe-harness   │ ─────→ │ BrokerConnector   │
//! └──────────────────┘        └─────────┬─────────┘
//!                                       │
//!                   ┌───────────────────┴───────────────────┐
//!                   ↓                                       ↓
//!          ┌─────────────────┐                   ┌────────────────────┐
//!          │ InMemoryBroker  │                   │ KafkaConnector     │
//!          │ (always built)  │                   │ (`kafka` feature)  │
//!          └─────────────────┘                   └────────────────────┘
//! ```
//!
//! ## Wire Format
//!
//! Records carry raw bytes. The harness decodes them into [`BusMessage`]
//! (a JSON object with a `type` discriminator and optional correlation
//! fields such as `referenceId` and `domainId`).

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod identity;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod message;
pub mod ports;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use identity::BrokerIdentity;
#[cfg(feature = "kafka")]
pub use kafka::KafkaConnector;
pub use message::{BusMessage, DecodeError, Record};
pub use ports::{
    AdminConnection, BrokerConnector, BusError, ConsumerConnection, ProducerConnection,
    TopicCreation, TopicSpec,
};
pub use publisher::InMemoryBroker;
pub use subscriber::MemoryConsumer;

/// Broker address used when no address list is configured.
pub const DEFAULT_BROKER_ADDRESS: &str = "localhost:9092";

/// Partition count used for every provisioned topic.
pub const DEFAULT_PARTITIONS: i32 = 1;

/// Replication factor used for every provisioned topic.
pub const DEFAULT_REPLICATION_FACTOR: i16 = 1;
