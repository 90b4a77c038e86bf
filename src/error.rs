//! Error types for the SSMS MCP Server.
//!
//! Every failure inside the server is a [`DbError`]. The protocol front-end
//! turns these into the `{success: false, error}` envelope, so each variant
//! carries a message an assistant can act on and, where useful, a suggestion.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Query failed: {message}")]
    Query {
        message: String,
        /// SQL Server error number, e.g. 208 for an invalid object name
        code: Option<u32>,
        suggestion: String,
    },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Timeout: {operation} exceeded {limit:?}")]
    Timeout { operation: String, limit: Duration },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a validation error for rejected arguments or statements.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a query error with an optional server error number.
    pub fn query(
        message: impl Into<String>,
        code: Option<u32>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Query {
            message: message.into(),
            code,
            suggestion: suggestion.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn timeout(operation: impl Into<String>, limit: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            limit,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Query { suggestion, .. } => Some(suggestion),
            Self::Timeout { .. } => {
                Some("Narrow the statement or raise QUERY_TIMEOUT for long-running work")
            }
            _ => None,
        }
    }

    /// Stable tag for the error taxonomy, surfaced in the result envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Validation { .. } => "validation",
            Self::Query { .. } => "query",
            Self::NotFound { .. } => "not_found",
            Self::Timeout { .. } => "timeout",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Convert driver errors to DbError.
///
/// Server-reported errors (syntax, constraint, conversion) become `Query`;
/// transport-level failures become `Connection`.
impl From<tiberius::error::Error> for DbError {
    fn from(err: tiberius::error::Error) -> Self {
        use tiberius::error::Error as TdsError;

        match err {
            TdsError::Server(token) => DbError::query(
                token.message().to_string(),
                Some(token.code()),
                "Check the SQL syntax, referenced objects, and supplied values",
            ),
            TdsError::Io { kind, message } => DbError::connection(
                format!("I/O error ({kind:?}): {message}"),
                "Check network connectivity and SQL Server status",
            ),
            TdsError::Tls(msg) => DbError::connection(
                format!("TLS error: {msg}"),
                "Verify DB_ENCRYPT and DB_TRUST_SERVER_CERTIFICATE",
            ),
            TdsError::Routing { host, port } => DbError::connection(
                format!("Server requested routing to {host}:{port}"),
                "Connect to the routed host directly",
            ),
            other => DbError::query(
                other.to_string(),
                None,
                "Check that parameter values match the column types",
            ),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Build suggestion data as JSON value.
fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert DbError to MCP ErrorData for failures raised outside the envelope
/// (resource reads).
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        let data = suggestion_data(err.suggestion());
        match &err {
            DbError::Validation { .. } => rmcp::ErrorData::invalid_params(err.to_string(), data),
            DbError::NotFound { .. } => {
                rmcp::ErrorData::resource_not_found(err.to_string(), data)
            }
            DbError::Query { message, code, .. } => {
                let msg = match code {
                    Some(code) => format!("{} (SQL Server error {})", message, code),
                    None => message.clone(),
                };
                rmcp::ErrorData::internal_error(msg, data)
            }
            DbError::Connection { .. } | DbError::Timeout { .. } | DbError::Internal { .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), data)
            }
        }
    }
}
