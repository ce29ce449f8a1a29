// crates/pipeline-ledger-core/src/core/payload.rs
// ============================================================================
// Module: Pipeline Ledger Payloads
// Description: Opaque structured payloads stored alongside tasks and operations.
// Purpose: Keep stage payload semantics out of the store while offering typed access.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! `request_body`, `input_data`, and `output_data` are free-form JSON owned by
//! the stages that produce them. The store persists a [`Payload`] as JSON text
//! and never inspects it beyond extracting an error summary for failed
//! operations. Callers that know the shape an executor emits use
//! [`Payload::decode`] and [`Payload::from_typed`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Payload encoding and decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// Payload could not be serialized.
    #[error("payload encode error: {0}")]
    Encode(String),
    /// Payload could not be parsed or did not match the requested shape.
    #[error("payload decode error: {0}")]
    Decode(String),
}

// ============================================================================
// SECTION: Payload
// ============================================================================

/// Opaque structured payload.
///
/// # Invariants
/// - Encoding then decoding yields a value deep-equal to the original.
/// - The neutral value is an empty JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Value);

impl Payload {
    /// Wraps a JSON value.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    /// Returns the neutral payload (an empty object).
    #[must_use]
    pub fn empty() -> Self {
        Self(Value::Object(Map::new()))
    }

    /// Returns true when the payload carries no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Serializes a typed value into a payload.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Encode`] when the value cannot be represented
    /// as JSON.
    pub fn from_typed<T: Serialize>(value: &T) -> Result<Self, PayloadError> {
        serde_json::to_value(value).map(Self).map_err(|err| PayloadError::Encode(err.to_string()))
    }

    /// Deserializes the payload into a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Decode`] when the payload does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        T::deserialize(&self.0).map_err(|err| PayloadError::Decode(err.to_string()))
    }

    /// Parses a payload from stored JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Decode`] when the text is not valid JSON.
    pub fn from_json_str(text: &str) -> Result<Self, PayloadError> {
        serde_json::from_str(text).map(Self).map_err(|err| PayloadError::Decode(err.to_string()))
    }

    /// Encodes the payload as JSON text for storage.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Encode`] when serialization fails.
    pub fn to_json_string(&self) -> Result<String, PayloadError> {
        serde_json::to_string(&self.0).map_err(|err| PayloadError::Encode(err.to_string()))
    }

    /// Returns a top-level field when the payload is an object.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the underlying JSON value.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consumes the payload and returns the underlying JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde::Serialize;
    use serde_json::json;

    use super::Payload;
    use super::PayloadError;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct ScoringOutput {
        score: u32,
        product_id: String,
    }

    #[test]
    fn empty_payload_is_empty_object() {
        let payload = Payload::empty();
        assert!(payload.is_empty());
        assert_eq!(payload.to_json_string(), Ok("{}".to_string()));
    }

    #[test]
    fn typed_accessors_follow_executor_shape() {
        let output = ScoringOutput { score: 82, product_id: "prod-1".to_string() };
        let payload = Payload::from_typed(&output).unwrap_or_default();
        assert!(!payload.is_empty());
        assert_eq!(payload.decode::<ScoringOutput>(), Ok(output));
    }

    #[test]
    fn decode_reports_shape_mismatch() {
        let payload = Payload::new(json!({"score": "high"}));
        assert!(matches!(payload.decode::<ScoringOutput>(), Err(PayloadError::Decode(_))));
    }

    #[test]
    fn from_json_str_rejects_garbage() {
        assert!(Payload::from_json_str("{not json").is_err());
        assert_eq!(Payload::from_json_str("[1,2]"), Ok(Payload::new(json!([1, 2]))));
    }
}
