//! Query execution tools.
//!
//! This module implements `execute_query` (free-form SQL behind the
//! statement gate) and `query_table` (paged reads of one table).

use crate::db::params::{positional, rewrite_named};
use crate::db::{CrudOperations, QueryPage, SqlExecutor, SqlStatement};
use crate::error::{DbError, DbResult};
use crate::models::{DEFAULT_PAGE_SIZE, DatabaseTarget, ResultSet, Row};
use crate::tools::sql_validator::{StatementKind, validate_query};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Bound values for a statement.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum QueryParams {
    /// Values for `@name` placeholders, keyed by name
    Named(Map<String, JsonValue>),
    /// Values for `@P1`, `@P2`, ... in order
    Positional(Vec<JsonValue>),
}

/// Input for the execute_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteQueryInput {
    /// Database to run against: "master" or "datamgmt"
    #[serde(alias = "database")]
    pub target: DatabaseTarget,
    /// SQL starting with SELECT, INSERT, UPDATE, DELETE, EXEC or EXECUTE
    #[serde(alias = "query")]
    pub sql: String,
    /// Named values for @name placeholders, or an array for @P1..@Pn
    #[serde(default, alias = "parameters")]
    pub params: Option<QueryParams>,
    /// Maximum rows to return (capped by the server's MAX_ROWS)
    #[serde(default, alias = "max_rows")]
    pub limit: Option<u32>,
}

/// Result of execute_query; the shape depends on the statement kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExecuteQueryOutput {
    Rows {
        rows: Vec<Row>,
        row_count: usize,
        truncated: bool,
    },
    ResultSets {
        result_sets: Vec<Vec<Row>>,
        /// Rows across all result sets
        row_count: usize,
        truncated: bool,
    },
    Affected {
        affected_rows: u64,
    },
}

/// Input for the query_table tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryTableInput {
    /// Database to read from: "master" or "datamgmt"
    #[serde(alias = "database")]
    pub target: DatabaseTarget,
    /// Table name
    #[serde(alias = "table_name")]
    pub table: String,
    /// Schema name. Default: dbo
    #[serde(default, alias = "schema_name")]
    pub schema: Option<String>,
    /// Page size. Default: 100
    #[serde(default)]
    pub limit: Option<u32>,
    /// Rows to skip. Default: 0
    #[serde(default)]
    pub offset: Option<u64>,
}

/// Bind `params` to `sql`, rewriting `@name` placeholders when named.
pub fn bind_statement(sql: &str, params: Option<&QueryParams>) -> DbResult<SqlStatement> {
    match params {
        None => Ok(SqlStatement::new(sql)),
        Some(QueryParams::Named(values)) => {
            let rewritten = rewrite_named(sql, values, 1)?;
            Ok(SqlStatement::with_params(rewritten.sql, rewritten.params))
        }
        Some(QueryParams::Positional(values)) => {
            Ok(SqlStatement::with_params(sql, positional(values)))
        }
    }
}

/// Handler for query execution.
pub struct QueryToolHandler {
    executor: Arc<dyn SqlExecutor>,
    crud: CrudOperations,
    max_rows: u32,
}

impl QueryToolHandler {
    pub fn new(executor: Arc<dyn SqlExecutor>, max_rows: u32) -> Self {
        Self {
            crud: CrudOperations::new(executor.clone()),
            executor,
            max_rows,
        }
    }

    fn effective_limit(&self, requested: Option<u32>) -> usize {
        requested.unwrap_or(self.max_rows).min(self.max_rows).max(1) as usize
    }

    /// Handle the execute_query tool call.
    ///
    /// The statement gate runs before anything touches the connection.
    pub async fn execute_query(&self, input: ExecuteQueryInput) -> DbResult<ExecuteQueryOutput> {
        let kind = validate_query(&input.sql)?;
        let stmt = bind_statement(&input.sql, input.params.as_ref())?;
        let limit = self.effective_limit(input.limit);
        let start = Instant::now();

        let output = match kind {
            StatementKind::Select => {
                let mut set = self.executor.query_first(input.target, &stmt).await?;
                let truncated = set.truncate(limit);
                ExecuteQueryOutput::Rows {
                    row_count: set.row_count(),
                    rows: set.rows,
                    truncated,
                }
            }
            StatementKind::Exec => {
                let sets = self.executor.query(input.target, &stmt).await?;
                let (result_sets, truncated) = truncate_sets(sets, limit);
                ExecuteQueryOutput::ResultSets {
                    row_count: result_sets.iter().map(Vec::len).sum(),
                    result_sets,
                    truncated,
                }
            }
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete => {
                ExecuteQueryOutput::Affected {
                    affected_rows: self.executor.execute(input.target, &stmt).await?,
                }
            }
        };

        info!(
            database = %input.target,
            statement = ?kind,
            execution_time_ms = start.elapsed().as_millis() as u64,
            "Query executed"
        );
        Ok(output)
    }

    /// Handle the query_table tool call.
    pub async fn query_table(&self, input: QueryTableInput) -> DbResult<QueryPage> {
        let limit = input.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if limit == 0 {
            return Err(DbError::validation("limit must be at least 1"));
        }
        let limit = limit.min(self.max_rows).max(1);
        self.crud
            .query_page(
                input.target,
                &input.table,
                input.schema.as_deref(),
                limit,
                input.offset.unwrap_or(0),
            )
            .await
    }
}

/// Cap each result set at `limit` rows. Returns the rows and whether anything was cut.
pub fn truncate_sets(sets: Vec<ResultSet>, limit: usize) -> (Vec<Vec<Row>>, bool) {
    let mut truncated = false;
    let rows = sets
        .into_iter()
        .map(|mut set| {
            truncated |= set.truncate(limit);
            set.rows
        })
        .collect();
    (rows, truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockExecutor;
    use crate::models::QueryParam;
    use serde_json::json;

    fn handler(max_rows: u32) -> (Arc<MockExecutor>, QueryToolHandler) {
        let mock = Arc::new(MockExecutor::new());
        (mock.clone(), QueryToolHandler::new(mock, max_rows))
    }

    fn input(value: JsonValue) -> ExecuteQueryInput {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_select_is_truncated_to_limit() {
        let (mock, handler) = handler(1000);
        mock.rows("FROM Users", vec![json!({"Id": 1}), json!({"Id": 2}), json!({"Id": 3})]);
        let out = handler
            .execute_query(input(json!({"target": "master", "sql": "SELECT Id FROM Users", "limit": 2})))
            .await
            .unwrap();
        match out {
            ExecuteQueryOutput::Rows { row_count, truncated, .. } => {
                assert_eq!(row_count, 2);
                assert!(truncated);
            }
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_limit_capped_by_max_rows() {
        let (mock, handler) = handler(1);
        mock.rows("FROM Users", vec![json!({"Id": 1}), json!({"Id": 2})]);
        let out = handler
            .execute_query(input(json!({"target": "master", "sql": "SELECT Id FROM Users", "limit": 50})))
            .await
            .unwrap();
        assert!(matches!(out, ExecuteQueryOutput::Rows { row_count: 1, truncated: true, .. }));
    }

    #[tokio::test]
    async fn test_rejected_statement_never_reaches_database() {
        let (mock, handler) = handler(1000);
        let err = handler
            .execute_query(input(json!({"target": "master", "sql": "DROP TABLE Users"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_named_params_are_rewritten() {
        let (mock, handler) = handler(1000);
        handler
            .execute_query(input(json!({
                "database": "datamgmt",
                "query": "SELECT FileName FROM File_Detail WHERE FileName = @name",
                "parameters": {"name": "a.pdf"}
            })))
            .await
            .unwrap();
        let call = mock.last_call_matching("File_Detail").unwrap();
        assert_eq!(call.target, DatabaseTarget::DataMgmt);
        assert!(call.statement.sql.ends_with("FileName = @P1"));
        assert_eq!(call.statement.params, vec![QueryParam::from("a.pdf")]);
    }

    #[tokio::test]
    async fn test_dml_reports_affected_rows() {
        let (mock, handler) = handler(1000);
        mock.affected("UPDATE Users", 3);
        let out = handler
            .execute_query(input(json!({"target": "master", "sql": "UPDATE Users SET Active = 0 WHERE Region = @P1", "params": ["EU"]})))
            .await
            .unwrap();
        assert_eq!(out, ExecuteQueryOutput::Affected { affected_rows: 3 });
    }

    #[tokio::test]
    async fn test_exec_returns_all_result_sets() {
        let (mock, handler) = handler(1000);
        mock.on(
            "EXEC usp_Report",
            crate::db::MockReply::Sets(vec![
                ResultSet::from_rows(crate::db::mock::rows_from_json(vec![json!({"a": 1})])),
                ResultSet::default(),
            ]),
        );
        let out = handler
            .execute_query(input(json!({"target": "master", "sql": "EXEC usp_Report"})))
            .await
            .unwrap();
        match out {
            ExecuteQueryOutput::ResultSets { result_sets, row_count, .. } => {
                assert_eq!(result_sets.len(), 2);
                assert_eq!(row_count, 1);
            }
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_query_table_page() {
        let (mock, handler) = handler(1000);
        mock.rows("FROM [Sales].[Orders]", vec![json!({"Id": 1})]);
        let page = handler
            .query_table(serde_json::from_value(json!({"target": "master", "table": "Orders", "schema": "Sales", "offset": 10})).unwrap())
            .await
            .unwrap();
        assert_eq!(page.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(page.offset, 10);
        assert!(!page.has_more);
    }
}
