//! # Bus Messages
//!
//! Raw records as delivered by the broker, and the decoded JSON payload the
//! harness evaluates predicates against.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Field carrying the event discriminator.
pub const TYPE_FIELD: &str = "type";

/// Field carrying the correlation id of the entity the event is about.
pub const REFERENCE_ID_FIELD: &str = "referenceId";

/// Field carrying the tenant/realm the event belongs to.
pub const DOMAIN_ID_FIELD: &str = "domainId";

/// A record exactly as the broker delivered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Topic the record was read from.
    pub topic: String,
    /// Partition within the topic.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Optional record key.
    pub key: Option<Vec<u8>>,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

impl Record {
    /// Decode the payload as a [`BusMessage`].
    pub fn decode(&self) -> Result<BusMessage, DecodeError> {
        BusMessage::decode(&self.payload)
    }
}

/// Errors from payload decoding.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload was not valid UTF-8 JSON.
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload was JSON but not an object.
    #[error("payload is a JSON {0}, expected an object")]
    NotAnObject(&'static str),
}

/// A decoded event payload.
///
/// Wraps the JSON object unchanged; unknown fields pass through and are
/// reachable with [`BusMessage::get`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusMessage(Map<String, Value>);

impl BusMessage {
    /// Decode a payload. Only JSON objects are accepted.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        match serde_json::from_slice::<Value>(payload)? {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(DecodeError::NotAnObject(json_kind(&other))),
        }
    }

    /// The `type` discriminator, if present and a string.
    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        self.get_str(TYPE_FIELD)
    }

    /// The `referenceId` correlation field.
    #[must_use]
    pub fn reference_id(&self) -> Option<&str> {
        self.get_str(REFERENCE_ID_FIELD)
    }

    /// The `domainId` correlation field.
    #[must_use]
    pub fn domain_id(&self) -> Option<&str> {
        self.get_str(DOMAIN_ID_FIELD)
    }

    /// True when the `type` discriminator equals `event_type`.
    #[must_use]
    pub fn matches_type(&self, event_type: &str) -> bool {
        self.event_type() == Some(event_type)
    }

    /// Look up any field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Look up a string field.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// All fields.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume the message and return the underlying JSON object.
    #[must_use]
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for BusMessage {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl fmt::Display for BusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{:?}", self.0),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
