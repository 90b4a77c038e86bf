//! Generated INSERT/UPDATE/DELETE/SELECT statements.
//!
//! Identifiers are validated and bracket-quoted; every value is bound.
//! Caller-written WHERE clauses are appended verbatim after passing the
//! where guard, with their `@name` placeholders renumbered after the SET
//! values.

use crate::db::params::{normalize_name, rewrite_named_strict};
use crate::db::provider::{SqlExecutor, SqlStatement};
use crate::error::{DbError, DbResult};
use crate::models::{DEFAULT_SCHEMA, DatabaseTarget, QueryParam, Row, cell_i64};
use crate::tools::sql_validator::{qualified_name, quote_identifier, validate_where_clause};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertOutcome {
    pub affected_rows: u64,
    /// `SCOPE_IDENTITY()` of the insert; absent when not requested, null
    /// when the table has no identity column
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inserted_id: Option<JsonValue>,
}

/// One page of a table scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPage {
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub limit: u32,
    pub offset: u64,
    /// True when at least one more row exists past this page
    pub has_more: bool,
}

fn table_name(table: &str, schema: Option<&str>) -> DbResult<String> {
    let schema = match schema.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => DEFAULT_SCHEMA,
    };
    qualified_name(schema, table.trim(), "table")
}

pub(crate) fn build_insert(
    table: &str,
    schema: Option<&str>,
    row: &Map<String, JsonValue>,
    return_id: bool,
) -> DbResult<SqlStatement> {
    if row.is_empty() {
        return Err(DbError::validation("data must contain at least one column"));
    }

    let mut columns = Vec::with_capacity(row.len());
    let mut placeholders = Vec::with_capacity(row.len());
    let mut params = Vec::with_capacity(row.len());
    for (i, (column, value)) in row.iter().enumerate() {
        columns.push(quote_identifier(column, "column")?);
        placeholders.push(format!("@P{}", i + 1));
        params.push(QueryParam::from(value));
    }

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table_name(table, schema)?,
        columns.join(", "),
        placeholders.join(", ")
    );
    if return_id {
        sql.push_str(
            "; SELECT @@ROWCOUNT AS affected_rows, CAST(SCOPE_IDENTITY() AS BIGINT) AS inserted_id",
        );
    }
    Ok(SqlStatement::with_params(sql, params))
}

pub(crate) fn build_update(
    table: &str,
    schema: Option<&str>,
    row: &Map<String, JsonValue>,
    where_clause: &str,
    where_params: &Map<String, JsonValue>,
) -> DbResult<SqlStatement> {
    if row.is_empty() {
        return Err(DbError::validation("data must contain at least one column"));
    }
    validate_where_clause(where_clause)?;

    // SET values and where values share one parameter namespace
    for name in where_params.keys() {
        let key = normalize_name(name);
        if row.keys().any(|c| c.to_lowercase() == key) {
            return Err(DbError::validation(format!(
                "where_params name '{name}' collides with a column in data; rename the placeholder"
            )));
        }
    }

    let mut assignments = Vec::with_capacity(row.len());
    let mut params = Vec::with_capacity(row.len() + where_params.len());
    for (i, (column, value)) in row.iter().enumerate() {
        assignments.push(format!("{} = @P{}", quote_identifier(column, "column")?, i + 1));
        params.push(QueryParam::from(value));
    }

    let filter = rewrite_named_strict(where_clause, where_params, params.len() + 1)?;
    params.extend(filter.params);

    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        table_name(table, schema)?,
        assignments.join(", "),
        filter.sql
    );
    Ok(SqlStatement::with_params(sql, params))
}

pub(crate) fn build_delete(
    table: &str,
    schema: Option<&str>,
    where_clause: &str,
    where_params: &Map<String, JsonValue>,
) -> DbResult<SqlStatement> {
    validate_where_clause(where_clause)?;
    let filter = rewrite_named_strict(where_clause, where_params, 1)?;
    let sql = format!("DELETE FROM {} WHERE {}", table_name(table, schema)?, filter.sql);
    Ok(SqlStatement::with_params(sql, filter.params))
}

/// `ORDER BY (SELECT NULL)` satisfies OFFSET/FETCH without imposing a sort:
/// pages are stable enough to walk, not semantically ordered.
pub(crate) fn build_page(
    table: &str,
    schema: Option<&str>,
    limit: u32,
    offset: u64,
) -> DbResult<SqlStatement> {
    let sql = format!(
        "SELECT * FROM {} ORDER BY (SELECT NULL) OFFSET @P1 ROWS FETCH NEXT @P2 ROWS ONLY",
        table_name(table, schema)?
    );
    let offset = i64::try_from(offset)
        .map_err(|_| DbError::validation("offset is too large"))?;
    // One extra row tells us whether another page exists
    Ok(SqlStatement::new(sql)
        .bind(offset)
        .bind(i64::from(limit) + 1))
}

#[derive(Clone)]
pub struct CrudOperations {
    executor: Arc<dyn SqlExecutor>,
}

impl CrudOperations {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self { executor }
    }

    pub async fn insert(
        &self,
        target: DatabaseTarget,
        table: &str,
        schema: Option<&str>,
        row: &Map<String, JsonValue>,
        return_id: bool,
    ) -> DbResult<InsertOutcome> {
        let stmt = build_insert(table, schema, row, return_id)?;

        let outcome = if return_id {
            let sets = self.executor.query(target, &stmt).await?;
            let ids = sets.last().and_then(|s| s.rows.first());
            InsertOutcome {
                affected_rows: ids
                    .and_then(|r| cell_i64(r, "affected_rows"))
                    .and_then(|n| u64::try_from(n).ok())
                    .unwrap_or_default(),
                inserted_id: Some(
                    ids.and_then(|r| r.get("inserted_id").cloned())
                        .unwrap_or(JsonValue::Null),
                ),
            }
        } else {
            InsertOutcome {
                affected_rows: self.executor.execute(target, &stmt).await?,
                inserted_id: None,
            }
        };

        info!(database = %target, table, rows_affected = outcome.affected_rows, "Inserted row");
        Ok(outcome)
    }

    pub async fn update(
        &self,
        target: DatabaseTarget,
        table: &str,
        schema: Option<&str>,
        row: &Map<String, JsonValue>,
        where_clause: &str,
        where_params: &Map<String, JsonValue>,
    ) -> DbResult<u64> {
        let stmt = build_update(table, schema, row, where_clause, where_params)?;
        let affected = self.executor.execute(target, &stmt).await?;
        info!(database = %target, table, rows_affected = affected, "Updated rows");
        Ok(affected)
    }

    pub async fn delete(
        &self,
        target: DatabaseTarget,
        table: &str,
        schema: Option<&str>,
        where_clause: &str,
        where_params: &Map<String, JsonValue>,
    ) -> DbResult<u64> {
        let stmt = build_delete(table, schema, where_clause, where_params)?;
        let affected = self.executor.execute(target, &stmt).await?;
        info!(database = %target, table, rows_affected = affected, "Deleted rows");
        Ok(affected)
    }

    /// Read `limit` rows starting at `offset`, in no guaranteed order.
    pub async fn query_page(
        &self,
        target: DatabaseTarget,
        table: &str,
        schema: Option<&str>,
        limit: u32,
        offset: u64,
    ) -> DbResult<QueryPage> {
        let stmt = build_page(table, schema, limit, offset)?;
        let mut set = self.executor.query_first(target, &stmt).await?;
        let has_more = set.truncate(limit as usize);
        Ok(QueryPage {
            row_count: set.row_count(),
            rows: set.rows,
            limit,
            offset,
            has_more,
        })
    }
}
