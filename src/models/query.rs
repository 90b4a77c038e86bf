//! Query-related data models.
//!
//! This module defines bound parameter values and the result-set shape
//! returned by every statement.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default row limit for `query_table` pages.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Rows sampled into a table resource.
pub const RESOURCE_SAMPLE_ROWS: u32 = 5;

/// A single result row, keyed by column name.
pub type Row = serde_json::Map<String, JsonValue>;

/// A parameter value for parameterized statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value, bound as BIT
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value, bound as NVARCHAR
    String(String),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }
}

/// Arrays and objects have no SQL Server scalar equivalent and are bound as
/// their JSON text, which suits `OPENJSON`/`JSON_VALUE` consumers.
impl From<&JsonValue> for QueryParam {
    fn from(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Self::String(s.clone()),
            other => Self::String(other.to_string()),
        }
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// One result set produced by a statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Column names in select-list order
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    /// Build a result set from rows, taking column order from the first row.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let columns = rows
            .first()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default();
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep at most `limit` rows. Returns true if rows were dropped.
    pub fn truncate(&mut self, limit: usize) -> bool {
        if self.rows.len() > limit {
            self.rows.truncate(limit);
            true
        } else {
            false
        }
    }
}

/// Look up a string cell, treating SQL NULL and missing columns alike.
pub fn cell_str(row: &Row, column: &str) -> Option<String> {
    match row.get(column) {
        Some(JsonValue::String(s)) => Some(s.clone()),
        Some(JsonValue::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}

/// Look up an integer cell. Decimal cells arrive as strings and are parsed.
pub fn cell_i64(row: &Row, column: &str) -> Option<i64> {
    match row.get(column) {
        Some(JsonValue::Number(n)) => n.as_i64(),
        Some(JsonValue::String(s)) => s.parse().ok(),
        _ => None,
    }
}

/// Look up a BIT cell.
pub fn cell_bool(row: &Row, column: &str) -> bool {
    match row.get(column) {
        Some(JsonValue::Bool(b)) => *b,
        Some(JsonValue::Number(n)) => n.as_i64() == Some(1),
        Some(JsonValue::String(s)) => s.eq_ignore_ascii_case("yes") || s == "1",
        _ => false,
    }
}
