//! Cache Value Module
//!
//! Tagged value type and the single encode/decode boundary between
//! callers and the text stored in the backend.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

// == Cache Value ==
/// A value as seen by callers of the store adapter.
///
/// `Scalar` is text. `Structured` is any other JSON value: objects, arrays,
/// numbers, booleans and null. A `Structured` holding a JSON string is the
/// same value as the equivalent `Scalar` and reads back as one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CacheValue {
    Scalar(String),
    Structured(Value),
}

impl CacheValue {
    /// Builds a value from any serializable type.
    pub fn from_serialize<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        serde_json::to_value(value).map(Self::from)
    }

    /// Canonical text written to the store.
    ///
    /// Every value is written as JSON, scalars as JSON strings, so the
    /// variant survives the trip through the store.
    pub fn encode(&self) -> String {
        match self {
            CacheValue::Scalar(text) => Value::String(text.clone()).to_string(),
            CacheValue::Structured(value) => value.to_string(),
        }
    }

    /// Reads stored text back.
    ///
    /// A JSON string decodes to `Scalar` and any other JSON value to
    /// `Structured`; counters written by `hincr` therefore read back as
    /// numbers. Text that is not JSON at all was written by something
    /// other than this adapter and is returned raw as a `Scalar`.
    pub fn decode(raw: String) -> Self {
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::String(text)) => CacheValue::Scalar(text),
            Ok(value) => CacheValue::Structured(value),
            Err(err) => {
                debug!(error = %err, "Stored value is not valid JSON, returning raw text");
                CacheValue::Scalar(raw)
            }
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CacheValue::Scalar(text) => Some(text),
            CacheValue::Structured(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            CacheValue::Structured(value) => Some(value),
            CacheValue::Scalar(_) => None,
        }
    }

    /// Deserializes into `T`; scalars are tried as JSON text first, then
    /// as a JSON string.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Option<T> {
        match self {
            CacheValue::Structured(value) => serde_json::from_value(value.clone()).ok(),
            CacheValue::Scalar(text) => serde_json::from_str(text)
                .or_else(|_| serde_json::from_value(Value::String(text.clone())))
                .ok(),
        }
    }

    /// JSON view of the value, used by the HTTP surface.
    pub fn to_json(&self) -> Value {
        match self {
            CacheValue::Scalar(text) => Value::String(text.clone()),
            CacheValue::Structured(value) => value.clone(),
        }
    }
}

impl From<String> for CacheValue {
    fn from(text: String) -> Self {
        CacheValue::Scalar(text)
    }
}

impl From<&str> for CacheValue {
    fn from(text: &str) -> Self {
        CacheValue::Scalar(text.to_string())
    }
}

impl From<Value> for CacheValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => CacheValue::Scalar(text),
            other => CacheValue::Structured(other),
        }
    }
}
