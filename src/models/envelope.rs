//! Uniform result envelope returned by every tool invocation.

use crate::error::DbError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// `{success, data}` on success, `{success, error, error_kind, suggestion}` on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error taxonomy tag: connection, validation, query, not_found, timeout, internal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl OperationResult {
    pub fn ok(data: JsonValue) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
            suggestion: None,
        }
    }

    pub fn failure(err: &DbError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind().to_string()),
            suggestion: err.suggestion().map(str::to_string),
        }
    }

    pub fn to_value(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({ "success": false, "error": format!("Failed to serialize result: {e}") })
        })
    }
}

impl From<Result<JsonValue, DbError>> for OperationResult {
    fn from(result: Result<JsonValue, DbError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::failure(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_shape() {
        let value = OperationResult::ok(json!({"affected_rows": 1})).to_value();
        assert_eq!(value, json!({"success": true, "data": {"affected_rows": 1}}));
    }

    #[test]
    fn test_failure_shape() {
        let value = OperationResult::failure(&DbError::validation("table is required")).to_value();
        assert_eq!(value["success"], false);
        assert_eq!(value["error_kind"], "validation");
        assert!(value["error"].as_str().unwrap().contains("table is required"));
        assert!(value.get("data").is_none());
    }
}
