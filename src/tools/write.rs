//! Write operation tools.
//!
//! This module implements `insert_data`, `update_data` and `delete_data`.
//! Statements are generated from the arguments; only the WHERE text is
//! caller-written and it goes through the where guard first.

use crate::db::{CrudOperations, InsertOutcome, SqlExecutor};
use crate::error::{DbError, DbResult};
use crate::models::DatabaseTarget;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

/// Input for the insert_data tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct InsertDataInput {
    /// Database to insert into: "master" or "datamgmt"
    #[serde(alias = "database")]
    pub target: DatabaseTarget,
    /// Table name
    #[serde(alias = "table_name")]
    pub table: String,
    /// Schema name. Default: dbo
    #[serde(default, alias = "schema_name")]
    pub schema: Option<String>,
    /// Column values for the new row
    pub data: Map<String, JsonValue>,
    /// Return SCOPE_IDENTITY() of the insert as inserted_id
    #[serde(default)]
    pub return_id: bool,
}

/// Input for the update_data tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdateDataInput {
    /// Database to update: "master" or "datamgmt"
    #[serde(alias = "database")]
    pub target: DatabaseTarget,
    /// Table name
    #[serde(alias = "table_name")]
    pub table: String,
    /// Schema name. Default: dbo
    #[serde(default, alias = "schema_name")]
    pub schema: Option<String>,
    /// Column values to set
    pub data: Map<String, JsonValue>,
    /// Condition without the WHERE keyword, e.g. "Id = @id"
    pub where_clause: String,
    /// Values for @name placeholders in where_clause; names must differ from the data columns
    #[serde(default, alias = "where_parameters")]
    pub where_params: Map<String, JsonValue>,
}

/// Input for the delete_data tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeleteDataInput {
    /// Database to delete from: "master" or "datamgmt"
    #[serde(alias = "database")]
    pub target: DatabaseTarget,
    /// Table name
    #[serde(alias = "table_name")]
    pub table: String,
    /// Schema name. Default: dbo
    #[serde(default, alias = "schema_name")]
    pub schema: Option<String>,
    /// Condition without the WHERE keyword, e.g. "Id = @id"
    pub where_clause: String,
    /// Values for @name placeholders in where_clause
    #[serde(default, alias = "where_parameters")]
    pub where_params: Map<String, JsonValue>,
    /// Must be true for the delete to run
    #[serde(default)]
    pub confirm_delete: bool,
}

/// Output from update_data and delete_data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AffectedRows {
    /// Driver-reported number of rows affected
    pub affected_rows: u64,
}

pub struct WriteToolHandler {
    crud: CrudOperations,
}

impl WriteToolHandler {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self {
            crud: CrudOperations::new(executor),
        }
    }

    pub async fn insert_data(&self, input: InsertDataInput) -> DbResult<InsertOutcome> {
        self.crud
            .insert(
                input.target,
                &input.table,
                input.schema.as_deref(),
                &input.data,
                input.return_id,
            )
            .await
    }

    pub async fn update_data(&self, input: UpdateDataInput) -> DbResult<AffectedRows> {
        let affected_rows = self
            .crud
            .update(
                input.target,
                &input.table,
                input.schema.as_deref(),
                &input.data,
                &input.where_clause,
                &input.where_params,
            )
            .await?;
        Ok(AffectedRows { affected_rows })
    }

    pub async fn delete_data(&self, input: DeleteDataInput) -> DbResult<AffectedRows> {
        if !input.confirm_delete {
            return Err(DbError::validation(
                "delete_data requires confirm_delete: true",
            ));
        }
        let affected_rows = self
            .crud
            .delete(
                input.target,
                &input.table,
                input.schema.as_deref(),
                &input.where_clause,
                &input.where_params,
            )
            .await?;
        Ok(AffectedRows { affected_rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockExecutor;
    use serde_json::json;

    fn handler() -> (Arc<MockExecutor>, WriteToolHandler) {
        let mock = Arc::new(MockExecutor::new());
        (mock.clone(), WriteToolHandler::new(mock))
    }

    #[tokio::test]
    async fn test_insert_accepts_legacy_argument_names() {
        let (mock, handler) = handler();
        mock.affected("INSERT INTO [dbo].[File_Detail]", 1);
        let input: InsertDataInput = serde_json::from_value(json!({
            "database": "datamgmt",
            "table_name": "File_Detail",
            "data": {"FileName": "a.pdf", "FileSize": 100}
        }))
        .unwrap();
        let outcome = handler.insert_data(input).await.unwrap();
        assert_eq!(outcome.affected_rows, 1);
        assert!(outcome.inserted_id.is_none());
    }

    #[tokio::test]
    async fn test_delete_requires_confirmation() {
        let (mock, handler) = handler();
        let input: DeleteDataInput = serde_json::from_value(json!({
            "target": "master",
            "table": "Users",
            "where_clause": "Id = @id",
            "where_params": {"id": 1}
        }))
        .unwrap();
        let err = handler.delete_data(input).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_update_reports_true_count() {
        let (mock, handler) = handler();
        mock.affected("UPDATE [dbo].[Users]", 5);
        let input: UpdateDataInput = serde_json::from_value(json!({
            "target": "master",
            "table": "Users",
            "data": {"Active": false},
            "where_clause": "Region = @region",
            "where_parameters": {"region": "EU"}
        }))
        .unwrap();
        assert_eq!(handler.update_data(input).await.unwrap().affected_rows, 5);
    }
}
