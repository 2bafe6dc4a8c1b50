//! # Probe Harness - Bus-Synchronized Assertions
//!
//! Drives an action under test while listening on a broker topic and
//! answers one of two questions deterministically:
//!
//! - **WaitForEvent**: did a message matching the predicate appear before
//!   the deadline? ([`wait_for_message`])
//! - **AssertAbsence**: did no matching message appear during the window?
//!   ([`assert_no_message`])
//!
//! ## Control Flow
//!
//! ```text
//! HarnessConfig::identity ──→ ensure_topic_exists ──→ start_consumer ──┬──→ wait_for_message
//!                                                                      └──→ assert_no_message
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use probe_harness::{BusProbe, HarnessConfig, WaitOptions};
//!
//! let probe = BusProbe::kafka_from_env();
//! let login = probe
//!     .wait_for_message("identity-events", WaitOptions::of_type("USER_LOGIN"), || async {
//!         browser.submit_login("alice", "secret").await
//!     })
//!     .await?;
//! assert_eq!(login.reference_id(), Some("alice"));
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod absence;
pub mod bootstrap;
pub mod config;
pub mod deadline;
pub mod error;
pub mod probe;
pub mod provision;
pub mod settlement;
pub mod wait;

pub use absence::{assert_no_message, AbsenceOptions};
pub use bootstrap::{start_consumer, ConsumingSession, RecordHandler, SessionState};
pub use config::{HarnessConfig, RetryPolicy};
pub use deadline::DeadlineTimer;
pub use error::{ProbeError, Result};
pub use probe::BusProbe;
pub use provision::ensure_topic_exists;
pub use settlement::{Outcome, Settlement};
pub use wait::{wait_for_message, Predicate, WaitOptions};

// Broker-side types callers need alongside the harness.
pub use probe_bus::{BrokerConnector, BrokerIdentity, BusMessage, InMemoryBroker, TopicCreation};
