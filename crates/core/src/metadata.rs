//! Payload encoding and partial metadata merges.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ModelError, Result};

/// Apply a partial update to a metadata document.
///
/// Objects merge key by key, recursively. Any other patch value replaces the
/// target. `null` in the patch leaves the target untouched.
pub fn merge_metadata(target: &mut Value, patch: Value) {
    match patch {
        Value::Null => {}
        Value::Object(patch) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            if let Value::Object(target) = target {
                for (key, value) in patch {
                    match target.get_mut(&key) {
                        Some(existing) => merge_metadata(existing, value),
                        None if !value.is_null() => {
                            target.insert(key, value);
                        }
                        None => {}
                    }
                }
            }
        }
        other => *target = other,
    }
}

/// Decode a payload. A missing (`null`) payload decodes as an empty object.
pub fn decode_payload<T: DeserializeOwned>(value: &Value, field: &'static str) -> Result<T> {
    let value = if value.is_null() {
        Value::Object(Map::new())
    } else {
        value.clone()
    };
    serde_json::from_value(value).map_err(|source| ModelError::Payload { field, source })
}

/// Encode a payload into its wire form.
pub fn encode_payload<T: Serialize>(value: &T, field: &'static str) -> Result<Value> {
    serde_json::to_value(value).map_err(|source| ModelError::Payload { field, source })
}
