//! Data models for the SSMS MCP Server.
//!
//! This module re-exports all model types used throughout the application.

pub mod envelope;
pub mod query;
pub mod schema;
pub mod target;

// Re-export commonly used types
pub use envelope::OperationResult;
pub use query::{
    DEFAULT_PAGE_SIZE, QueryParam, RESOURCE_SAMPLE_ROWS, ResultSet, Row, cell_bool, cell_i64,
    cell_str,
};
pub use schema::{
    ColumnDescriptor, DEFAULT_SCHEMA, DatabaseInfo, ForeignKey, IndexInfo, ObjectKind,
    PrimaryKeyColumn, ProcedureParameter, RoutineDescriptor, TableDescriptor, TableDetails,
    TriggerDescriptor,
};
pub use target::DatabaseTarget;
