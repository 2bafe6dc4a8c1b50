//! Error types for the bus probe harness

use probe_bus::{BusError, BusMessage};
use thiserror::Error;

/// Result alias for harness operations
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Errors a harness call can end with
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Topic could not be provisioned; never retried
    #[error("failed to provision topic {topic}: {source}")]
    Provisioning {
        topic: String,
        #[source]
        source: BusError,
    },

    /// Every consumer bootstrap attempt failed
    #[error(
        "consumer bootstrap on topic {topic} exhausted after {attempts} attempts \
         (last group {last_group_id}): {source}"
    )]
    BootstrapExhausted {
        topic: String,
        attempts: u32,
        last_group_id: String,
        #[source]
        source: BusError,
    },

    /// No matching message before the deadline
    #[error("timed out after {timeout_ms}ms waiting for a matching message on topic {topic}")]
    Timeout { topic: String, timeout_ms: u64 },

    /// The caller-supplied trigger failed
    #[error("trigger failed: {source}")]
    Trigger {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// A forbidden message was observed during an absence window
    #[error("forbidden message observed on topic {topic}: {message}")]
    AssertionViolation { topic: String, message: BusMessage },

    /// Publishing a payload failed
    #[error("failed to publish to topic {topic}: {source}")]
    Publish {
        topic: String,
        #[source]
        source: BusError,
    },

    /// A payload could not be serialized
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ProbeError {
    /// Wrap a trigger failure.
    pub fn trigger(error: anyhow::Error) -> Self {
        Self::Trigger {
            source: error.into(),
        }
    }

    /// True for a deadline expiry.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The offending message of an absence violation.
    #[must_use]
    pub fn violating_message(&self) -> Option<&BusMessage> {
        match self {
            Self::AssertionViolation { message, .. } => Some(message),
            _ => None,
        }
    }
}
