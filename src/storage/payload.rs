//! Payload values attached to vectors.
//!
//! A payload is an ordered string-keyed map whose values come from a closed
//! set of variants. On disk a payload is a single bincode image; decoding
//! stops after exactly one image, so payloads can sit back to back with
//! vector data in the same file.

use std::collections::BTreeMap;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::VdbError;
use crate::storage::error::{StorageError, StorageResult};

/// Largest payload image accepted by the codec (16 MiB).
const PAYLOAD_LIMIT: usize = 16 * 1024 * 1024;

/// Payload map, ordered by key so encoding is stable.
pub type Payload = BTreeMap<String, PayloadValue>;

/// A single payload value.
#[derive(Debug, Clone, PartialEq, Encode, Decode, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Array(Vec<PayloadValue>),
    Map(BTreeMap<String, PayloadValue>),
}

impl PayloadValue {
    /// Human readable variant name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
            Self::Array(_) => "array",
            Self::Map(_) => "object",
        }
    }

    /// Numeric view of integer and float values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Boolean(_) | Self::Text(_) | Self::Array(_) | Self::Map(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for PayloadValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for PayloadValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for PayloadValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for PayloadValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl TryFrom<serde_json::Value> for PayloadValue {
    type Error = VdbError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value;
        match value {
            Value::Null => Err(VdbError::UnsupportedPayloadValue("null".to_string())),
            Value::Bool(b) => Ok(Self::Boolean(b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Self::Float(f))
                } else {
                    Err(VdbError::UnsupportedPayloadValue(format!(
                        "number {n} does not fit a 64-bit integer or float"
                    )))
                }
            }
            Value::String(s) => Ok(Self::Text(s)),
            Value::Array(items) => items
                .into_iter()
                .map(PayloadValue::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Array),
            Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| PayloadValue::try_from(v).map(|v| (k, v)))
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(Self::Map),
        }
    }
}

impl From<PayloadValue> for serde_json::Value {
    fn from(value: PayloadValue) -> Self {
        use serde_json::Value;
        match value {
            PayloadValue::Boolean(b) => Value::Bool(b),
            PayloadValue::Integer(i) => Value::from(i),
            PayloadValue::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            PayloadValue::Text(s) => Value::String(s),
            PayloadValue::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            PayloadValue::Map(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// Converts a JSON object into a payload, rejecting values outside the
/// supported set.
pub fn payload_from_json(value: serde_json::Value) -> Result<Payload, VdbError> {
    match PayloadValue::try_from(value)? {
        PayloadValue::Map(map) => Ok(map),
        other => Err(VdbError::UnsupportedPayloadValue(format!(
            "payload must be an object, got {}",
            other.type_name()
        ))),
    }
}

fn codec_config() -> impl bincode::config::Config {
    bincode::config::standard().with_limit::<PAYLOAD_LIMIT>()
}

/// Encodes one payload image.
pub fn encode_payload(payload: &Payload) -> StorageResult<Vec<u8>> {
    bincode::encode_to_vec(payload, codec_config())
        .map_err(|e| StorageError::PayloadEncode(e.to_string()))
}

/// Decodes exactly one payload image from the start of `bytes`.
///
/// Returns the payload and the number of bytes it occupied. `offset` is only
/// used for error reporting.
pub fn decode_payload(bytes: &[u8], offset: u64) -> StorageResult<(Payload, usize)> {
    bincode::decode_from_slice::<Payload, _>(bytes, codec_config()).map_err(|e| {
        StorageError::PayloadDecode {
            offset,
            reason: e.to_string(),
        }
    })
}
