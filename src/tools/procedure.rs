//! Stored procedure tools: `execute_procedure` and `get_procedure_info`.

use crate::db::{ProcedureInfo, ProcedureRunner, SqlExecutor};
use crate::error::DbResult;
use crate::models::{DatabaseTarget, Row};
use crate::tools::query::truncate_sets;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

/// Input for the execute_procedure tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteProcedureInput {
    /// Database to run against: "master" or "datamgmt"
    #[serde(alias = "database")]
    pub target: DatabaseTarget,
    /// Procedure name without schema
    pub procedure_name: String,
    /// Schema name. Default: dbo
    #[serde(default, alias = "schema_name")]
    pub schema: Option<String>,
    /// Input values keyed by parameter name (leading @ optional)
    #[serde(default)]
    pub parameters: Map<String, JsonValue>,
    /// Names of OUTPUT parameters whose final values should be returned
    #[serde(default)]
    pub output_parameters: Vec<String>,
}

/// Input for the get_procedure_info tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetProcedureInfoInput {
    /// Database to inspect: "master" or "datamgmt"
    #[serde(alias = "database")]
    pub target: DatabaseTarget,
    /// Procedure name without schema
    pub procedure_name: String,
    /// Schema name. Default: dbo
    #[serde(default, alias = "schema_name")]
    pub schema: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecuteProcedureOutput {
    pub result_sets: Vec<Vec<Row>>,
    /// Rows across all result sets
    pub row_count: usize,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_parameters: Option<Row>,
}

pub struct ProcedureToolHandler {
    runner: ProcedureRunner,
    max_rows: u32,
}

impl ProcedureToolHandler {
    pub fn new(executor: Arc<dyn SqlExecutor>, max_rows: u32) -> Self {
        Self {
            runner: ProcedureRunner::new(executor),
            max_rows,
        }
    }

    pub async fn execute_procedure(
        &self,
        input: ExecuteProcedureInput,
    ) -> DbResult<ExecuteProcedureOutput> {
        let outcome = self
            .runner
            .execute(
                input.target,
                &input.procedure_name,
                input.schema.as_deref(),
                &input.parameters,
                &input.output_parameters,
            )
            .await?;
        let (result_sets, truncated) =
            truncate_sets(outcome.result_sets, self.max_rows.max(1) as usize);
        Ok(ExecuteProcedureOutput {
            row_count: result_sets.iter().map(Vec::len).sum(),
            result_sets,
            truncated,
            output_parameters: outcome.output_parameters,
        })
    }

    pub async fn get_procedure_info(&self, input: GetProcedureInfoInput) -> DbResult<ProcedureInfo> {
        self.runner
            .info(input.target, &input.procedure_name, input.schema.as_deref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MockExecutor, MockReply};
    use crate::db::mock::rows_from_json;
    use crate::models::ResultSet;
    use serde_json::json;

    #[tokio::test]
    async fn test_result_sets_capped_by_max_rows() {
        let mock = Arc::new(MockExecutor::new());
        mock.on(
            "EXEC [dbo].[usp_All]",
            MockReply::Sets(vec![ResultSet::from_rows(rows_from_json(vec![
                json!({"Id": 1}),
                json!({"Id": 2}),
                json!({"Id": 3}),
            ]))]),
        );
        let handler = ProcedureToolHandler::new(mock, 2);
        let out = handler
            .execute_procedure(
                serde_json::from_value(json!({"target": "master", "procedure_name": "usp_All"})).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(out.row_count, 2);
        assert!(out.truncated);
        assert!(out.output_parameters.is_none());
    }

    #[tokio::test]
    async fn test_procedure_info_for_missing_procedure() {
        let mock = Arc::new(MockExecutor::new());
        let handler = ProcedureToolHandler::new(mock, 100);
        let info = handler
            .get_procedure_info(
                serde_json::from_value(json!({"database": "datamgmt", "procedure_name": "usp_Gone"})).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(info.schema, "dbo");
        assert!(info.parameters.is_empty());
        assert_eq!(info.definition, "");
    }
}
