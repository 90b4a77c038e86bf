//! Database access layer.
//!
//! This module provides:
//! - The `SqlExecutor` seam and its pooled SQL Server implementation
//! - Named-parameter rewriting and driver type mapping
//! - Catalog introspection, generated CRUD statements and procedure calls
//! - A scripted executor for tests (`test-util` feature)

pub mod crud;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod params;
pub mod pool;
pub mod procedure;
pub mod provider;
pub mod schema;
pub mod types;

pub use crud::{CrudOperations, InsertOutcome, QueryPage};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{CallKind, MockExecutor, MockReply, RecordedCall};
pub use pool::ConnectionManager;
pub use procedure::{ProcedureInfo, ProcedureOutcome, ProcedureRunner};
pub use provider::{SqlExecutor, SqlStatement};
pub use schema::SchemaIntrospector;
