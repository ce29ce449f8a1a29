// crates/pipeline-ledger-store-sqlite/src/codec.rs
// ============================================================================
// Module: Column Codec
// Description: JSON text columns and integer columns to domain values.
// Purpose: Decode leniently on read and encode strictly on write.
// Dependencies: pipeline-ledger-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! Reads never fail on a malformed payload column: the field degrades to a
//! neutral value and a warning names the row and column. Writes go through
//! [`encode_payload`], which cannot produce text that later fails to decode.

// ============================================================================
// SECTION: Imports
// ============================================================================

use pipeline_ledger_core::Payload;
use pipeline_ledger_core::TaskMessage;
use tracing::warn;

use crate::store::SqliteStoreError;

// ============================================================================
// SECTION: Decoding
// ============================================================================

/// Decodes a payload column, degrading to an empty payload.
pub(crate) fn decode_payload(row_id: &str, column: &str, text: Option<&str>) -> Payload {
    let Some(text) = text.filter(|text| !text.trim().is_empty()) else {
        return Payload::empty();
    };
    Payload::from_json_str(text).unwrap_or_else(|err| {
        warn!(row_id, column, error = %err, "undecodable payload column; using empty value");
        Payload::empty()
    })
}

/// Decodes the task messages column, degrading to an empty list.
pub(crate) fn decode_messages(task_id: &str, text: Option<&str>) -> Vec<TaskMessage> {
    let Some(text) = text.filter(|text| !text.trim().is_empty()) else {
        return Vec::new();
    };
    serde_json::from_str(text).unwrap_or_else(|err| {
        warn!(task_id, error = %err, "undecodable messages column; using empty list");
        Vec::new()
    })
}

/// Converts a stored index into `u32`, degrading out-of-range values to 0.
pub(crate) fn decode_index(row_id: &str, column: &str, value: i64) -> u32 {
    u32::try_from(value).unwrap_or_else(|_| {
        warn!(row_id, column, value, "index column out of range; using 0");
        0
    })
}

// ============================================================================
// SECTION: Encoding
// ============================================================================

/// Encodes a payload for storage.
pub(crate) fn encode_payload(payload: &Payload) -> Result<String, SqliteStoreError> {
    payload.to_json_string().map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Encodes task messages for storage.
pub(crate) fn encode_messages(messages: &[TaskMessage]) -> Result<String, SqliteStoreError> {
    serde_json::to_string(messages).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::decode_index;
    use super::decode_messages;
    use super::decode_payload;

    #[test]
    fn malformed_columns_degrade_to_neutral_values() {
        assert!(decode_payload("op-1", "output_data", Some("{not json")).is_empty());
        assert!(decode_payload("op-1", "output_data", None).is_empty());
        assert!(decode_messages("t-1", Some("[{\"message\": 1}]")).is_empty());
        assert_eq!(decode_index("op-1", "chain_index", -4), 0);
    }

    #[test]
    fn valid_payload_decodes_exactly() {
        let payload = decode_payload("op-1", "input_data", Some("{\"a\":[1,2,{\"b\":null}]}"));
        assert_eq!(payload.as_value(), &json!({"a": [1, 2, {"b": null}]}));
    }
}
