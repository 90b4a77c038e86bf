//! MCP tool implementations.
//!
//! This module contains all database tool handlers:
//! - `query`: execute_query and query_table
//! - `write`: insert_data, update_data and delete_data
//! - `schema`: get_schema, get_tables, get_table_schema and the object listings
//! - `procedure`: execute_procedure and get_procedure_info
//! - `registry`: the tool catalog and argument validation
//! - `sql_validator`: statement gate, WHERE guard and identifier checks

pub mod procedure;
pub mod query;
pub mod registry;
pub mod schema;
pub mod sql_validator;
pub mod write;

pub use procedure::{
    ExecuteProcedureInput, ExecuteProcedureOutput, GetProcedureInfoInput, ProcedureToolHandler,
};
pub use query::{
    ExecuteQueryInput, ExecuteQueryOutput, QueryParams, QueryTableInput, QueryToolHandler,
};
pub use registry::{OperationRequest, TOOLS, ToolSpec};
pub use schema::{
    GetSchemaInput, GetTableSchemaInput, ListObjectsInput, SchemaObjectType, SchemaOverview,
    SchemaToolHandler, TableSchemaOutput, TargetInput,
};
pub use write::{AffectedRows, DeleteDataInput, InsertDataInput, UpdateDataInput, WriteToolHandler};
