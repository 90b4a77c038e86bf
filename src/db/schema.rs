//! Schema introspection module.
//!
//! Fixed catalog queries against `INFORMATION_SCHEMA` and the `sys` views.
//! Object names are always bound as parameters here, never interpolated.
//!
//! Lookups of objects that do not exist are not errors: listings and column
//! lookups come back empty and definition lookups return an empty string.

use crate::db::provider::{SqlExecutor, SqlStatement};
use crate::error::{DbError, DbResult};
use crate::models::{
    ColumnDescriptor, DEFAULT_SCHEMA, DatabaseInfo, DatabaseTarget, ForeignKey, IndexInfo,
    ObjectKind, PrimaryKeyColumn, ProcedureParameter, QueryParam, RoutineDescriptor, Row,
    TableDescriptor, TableDetails, TriggerDescriptor, cell_bool, cell_i64, cell_str,
};
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// SQL Query Templates
// =============================================================================
//
// Table-scoped queries bind @P1 = table (or object) name and @P2 = schema.

mod queries {
    pub const LIST_TABLES: &str = r#"
        SELECT TABLE_SCHEMA AS [schema], TABLE_NAME AS name
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_TYPE = 'BASE TABLE'
        ORDER BY TABLE_SCHEMA, TABLE_NAME
        "#;

    pub const LIST_VIEWS: &str = r#"
        SELECT TABLE_SCHEMA AS [schema], TABLE_NAME AS name
        FROM INFORMATION_SCHEMA.VIEWS
        ORDER BY TABLE_SCHEMA, TABLE_NAME
        "#;

    pub const LIST_VIEWS_WITH_DEFINITION: &str = r#"
        SELECT TABLE_SCHEMA AS [schema], TABLE_NAME AS name,
            OBJECT_DEFINITION(OBJECT_ID(QUOTENAME(TABLE_SCHEMA) + N'.' + QUOTENAME(TABLE_NAME))) AS definition
        FROM INFORMATION_SCHEMA.VIEWS
        ORDER BY TABLE_SCHEMA, TABLE_NAME
        "#;

    pub const LIST_PROCEDURES: &str = r#"
        SELECT ROUTINE_SCHEMA AS [schema], ROUTINE_NAME AS name
        FROM INFORMATION_SCHEMA.ROUTINES
        WHERE ROUTINE_TYPE = 'PROCEDURE'
        ORDER BY ROUTINE_SCHEMA, ROUTINE_NAME
        "#;

    pub const LIST_PROCEDURES_WITH_DEFINITION: &str = r#"
        SELECT ROUTINE_SCHEMA AS [schema], ROUTINE_NAME AS name,
            OBJECT_DEFINITION(OBJECT_ID(QUOTENAME(ROUTINE_SCHEMA) + N'.' + QUOTENAME(ROUTINE_NAME))) AS definition
        FROM INFORMATION_SCHEMA.ROUTINES
        WHERE ROUTINE_TYPE = 'PROCEDURE'
        ORDER BY ROUTINE_SCHEMA, ROUTINE_NAME
        "#;

    pub const LIST_TRIGGERS: &str = r#"
        SELECT t.name AS name,
            OBJECT_NAME(t.parent_id) AS [table],
            OBJECT_SCHEMA_NAME(t.parent_id) AS [schema],
            t.is_disabled AS is_disabled
        FROM sys.triggers t
        WHERE t.parent_class = 1
        ORDER BY OBJECT_SCHEMA_NAME(t.parent_id), t.name
        "#;

    pub const LIST_TRIGGERS_WITH_DEFINITION: &str = r#"
        SELECT t.name AS name,
            OBJECT_NAME(t.parent_id) AS [table],
            OBJECT_SCHEMA_NAME(t.parent_id) AS [schema],
            t.is_disabled AS is_disabled,
            OBJECT_DEFINITION(t.object_id) AS definition
        FROM sys.triggers t
        WHERE t.parent_class = 1
        ORDER BY OBJECT_SCHEMA_NAME(t.parent_id), t.name
        "#;

    pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT COLUMN_NAME AS name,
            DATA_TYPE AS data_type,
            IS_NULLABLE AS is_nullable,
            COLUMN_DEFAULT AS default_value,
            CHARACTER_MAXIMUM_LENGTH AS max_length,
            NUMERIC_PRECISION AS numeric_precision,
            NUMERIC_SCALE AS numeric_scale,
            ORDINAL_POSITION AS ordinal_position
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_NAME = @P1 AND TABLE_SCHEMA = @P2
        ORDER BY ORDINAL_POSITION
        "#;

    pub const PRIMARY_KEYS: &str = r#"
        SELECT kcu.COLUMN_NAME AS column_name,
            tc.CONSTRAINT_NAME AS constraint_name,
            kcu.ORDINAL_POSITION AS ordinal_position
        FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
        JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
            ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
            AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA
            AND tc.TABLE_NAME = kcu.TABLE_NAME
        WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
            AND tc.TABLE_NAME = @P1 AND tc.TABLE_SCHEMA = @P2
        ORDER BY kcu.ORDINAL_POSITION
        "#;

    pub const FOREIGN_KEYS_SELECT: &str = r#"
        SELECT fk.name AS constraint_name,
            OBJECT_SCHEMA_NAME(fk.parent_object_id) AS [schema],
            OBJECT_NAME(fk.parent_object_id) AS [table],
            pc.name AS column_name,
            OBJECT_SCHEMA_NAME(fk.referenced_object_id) AS referenced_schema,
            OBJECT_NAME(fk.referenced_object_id) AS referenced_table,
            rc.name AS referenced_column,
            fk.delete_referential_action_desc AS on_delete,
            fk.update_referential_action_desc AS on_update
        FROM sys.foreign_keys fk
        JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id
        JOIN sys.columns pc
            ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id
        JOIN sys.columns rc
            ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id
        "#;

    pub const FOREIGN_KEYS_FOR_TABLE: &str =
        "WHERE fk.parent_object_id = OBJECT_ID(QUOTENAME(@P2) + N'.' + QUOTENAME(@P1))";

    pub const FOREIGN_KEYS_ORDER: &str =
        "ORDER BY [schema], [table], fk.name, fkc.constraint_column_id";

    pub const INDEXES: &str = r#"
        SELECT i.name AS index_name,
            i.type_desc AS index_type,
            i.is_unique AS is_unique,
            i.is_primary_key AS is_primary_key,
            STRING_AGG(c.name, N',') WITHIN GROUP (ORDER BY ic.key_ordinal) AS columns
        FROM sys.indexes i
        JOIN sys.index_columns ic
            ON ic.object_id = i.object_id AND ic.index_id = i.index_id AND ic.is_included_column = 0
        JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
        WHERE i.object_id = OBJECT_ID(QUOTENAME(@P2) + N'.' + QUOTENAME(@P1))
            AND i.name IS NOT NULL
        GROUP BY i.name, i.type_desc, i.is_unique, i.is_primary_key
        ORDER BY i.name
        "#;

    pub const ROW_COUNT: &str = r#"
        SELECT SUM(p.rows) AS row_count
        FROM sys.partitions p
        WHERE p.object_id = OBJECT_ID(QUOTENAME(@P2) + N'.' + QUOTENAME(@P1))
            AND p.index_id IN (0, 1)
        "#;

    pub const OBJECT_DEFINITION: &str =
        "SELECT OBJECT_DEFINITION(OBJECT_ID(QUOTENAME(@P2) + N'.' + QUOTENAME(@P1))) AS definition";

    pub const TRIGGER_DEFINITION: &str = r#"
        SELECT TOP (1) OBJECT_DEFINITION(t.object_id) AS definition
        FROM sys.triggers t
        WHERE t.name = @P1
            AND (@P2 IS NULL OR OBJECT_SCHEMA_NAME(t.parent_id) = @P2)
        ORDER BY OBJECT_SCHEMA_NAME(t.parent_id)
        "#;

    pub const PROCEDURE_PARAMETERS: &str = r#"
        SELECT PARAMETER_NAME AS name,
            DATA_TYPE AS data_type,
            PARAMETER_MODE AS mode,
            CHARACTER_MAXIMUM_LENGTH AS max_length,
            NUMERIC_PRECISION AS numeric_precision,
            NUMERIC_SCALE AS numeric_scale,
            ORDINAL_POSITION AS ordinal_position
        FROM INFORMATION_SCHEMA.PARAMETERS
        WHERE SPECIFIC_NAME = @P1 AND SPECIFIC_SCHEMA = @P2 AND ORDINAL_POSITION > 0
        ORDER BY ORDINAL_POSITION
        "#;

    pub const DATABASE_INFO: &str = r#"
        SELECT DB_NAME() AS database_name,
            @@VERSION AS version,
            CAST(SERVERPROPERTY('ProductVersion') AS NVARCHAR(128)) AS product_version,
            CAST(SERVERPROPERTY('Edition') AS NVARCHAR(128)) AS edition
        "#;
}

/// Read a column that the catalog query always selects.
fn required(row: &Row, column: &str) -> DbResult<String> {
    cell_str(row, column)
        .ok_or_else(|| DbError::internal(format!("catalog row is missing '{column}'")))
}

fn table_from_row(row: &Row) -> DbResult<TableDescriptor> {
    Ok(TableDescriptor::new(required(row, "schema")?, required(row, "name")?))
}

fn routine_from_row(row: &Row) -> DbResult<RoutineDescriptor> {
    Ok(RoutineDescriptor {
        schema: required(row, "schema")?,
        name: required(row, "name")?,
        definition: None,
    })
}

fn trigger_from_row(row: &Row) -> DbResult<TriggerDescriptor> {
    Ok(TriggerDescriptor {
        name: required(row, "name")?,
        table: required(row, "table")?,
        schema: required(row, "schema")?,
        is_disabled: cell_bool(row, "is_disabled"),
        definition: None,
    })
}

fn column_from_row(row: &Row) -> DbResult<ColumnDescriptor> {
    Ok(ColumnDescriptor {
        name: required(row, "name")?,
        data_type: required(row, "data_type")?,
        is_nullable: cell_bool(row, "is_nullable"),
        default_value: cell_str(row, "default_value"),
        max_length: cell_i64(row, "max_length"),
        numeric_precision: cell_i64(row, "numeric_precision"),
        numeric_scale: cell_i64(row, "numeric_scale"),
        ordinal_position: cell_i64(row, "ordinal_position").unwrap_or_default(),
    })
}

fn primary_key_from_row(row: &Row) -> DbResult<PrimaryKeyColumn> {
    Ok(PrimaryKeyColumn {
        column_name: required(row, "column_name")?,
        constraint_name: required(row, "constraint_name")?,
        ordinal_position: cell_i64(row, "ordinal_position").unwrap_or_default(),
    })
}

fn foreign_key_from_row(row: &Row) -> DbResult<ForeignKey> {
    Ok(ForeignKey {
        constraint_name: required(row, "constraint_name")?,
        schema: required(row, "schema")?,
        table: required(row, "table")?,
        column_name: required(row, "column_name")?,
        referenced_schema: required(row, "referenced_schema")?,
        referenced_table: required(row, "referenced_table")?,
        referenced_column: required(row, "referenced_column")?,
        on_delete: cell_str(row, "on_delete").unwrap_or_else(|| "NO_ACTION".to_string()),
        on_update: cell_str(row, "on_update").unwrap_or_else(|| "NO_ACTION".to_string()),
    })
}

fn index_from_row(row: &Row) -> DbResult<IndexInfo> {
    let columns = cell_str(row, "columns")
        .map(|s| s.split(',').map(str::to_string).collect())
        .unwrap_or_default();
    Ok(IndexInfo {
        index_name: required(row, "index_name")?,
        index_type: required(row, "index_type")?,
        is_unique: cell_bool(row, "is_unique"),
        is_primary_key: cell_bool(row, "is_primary_key"),
        columns,
    })
}

fn parameter_from_row(row: &Row) -> DbResult<ProcedureParameter> {
    let name = required(row, "name")?;
    Ok(ProcedureParameter {
        name: name.trim_start_matches('@').to_string(),
        data_type: required(row, "data_type")?,
        mode: cell_str(row, "mode").unwrap_or_else(|| "IN".to_string()),
        max_length: cell_i64(row, "max_length"),
        numeric_precision: cell_i64(row, "numeric_precision"),
        numeric_scale: cell_i64(row, "numeric_scale"),
        ordinal_position: cell_i64(row, "ordinal_position").unwrap_or_default(),
    })
}

fn schema_or_default(schema: Option<&str>) -> &str {
    match schema.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => DEFAULT_SCHEMA,
    }
}

/// Catalog reader shared by the schema tools and resources.
#[derive(Clone)]
pub struct SchemaIntrospector {
    executor: Arc<dyn SqlExecutor>,
}

impl SchemaIntrospector {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self { executor }
    }

    async fn rows(&self, target: DatabaseTarget, stmt: SqlStatement) -> DbResult<Vec<Row>> {
        Ok(self.executor.query_first(target, &stmt).await?.rows)
    }

    async fn table_rows(
        &self,
        target: DatabaseTarget,
        sql: &str,
        table: &str,
        schema: &str,
    ) -> DbResult<Vec<Row>> {
        self.rows(target, SqlStatement::new(sql).bind(table).bind(schema))
            .await
    }

    /// User tables, sorted by (schema, name).
    pub async fn list_tables(&self, target: DatabaseTarget) -> DbResult<Vec<TableDescriptor>> {
        let rows = self.rows(target, SqlStatement::new(queries::LIST_TABLES)).await?;
        let mut tables = rows
            .iter()
            .map(table_from_row)
            .collect::<DbResult<Vec<_>>>()?;
        tables.sort();
        debug!(database = %target, count = tables.len(), "Listed tables");
        Ok(tables)
    }

    pub async fn list_views(
        &self,
        target: DatabaseTarget,
        include_definition: bool,
    ) -> DbResult<Vec<RoutineDescriptor>> {
        let sql = if include_definition {
            queries::LIST_VIEWS_WITH_DEFINITION
        } else {
            queries::LIST_VIEWS
        };
        self.list_routines(target, sql, include_definition).await
    }

    pub async fn list_procedures(
        &self,
        target: DatabaseTarget,
        include_definition: bool,
    ) -> DbResult<Vec<RoutineDescriptor>> {
        let sql = if include_definition {
            queries::LIST_PROCEDURES_WITH_DEFINITION
        } else {
            queries::LIST_PROCEDURES
        };
        self.list_routines(target, sql, include_definition).await
    }

    async fn list_routines(
        &self,
        target: DatabaseTarget,
        sql: &str,
        include_definition: bool,
    ) -> DbResult<Vec<RoutineDescriptor>> {
        let rows = self.rows(target, SqlStatement::new(sql)).await?;
        let mut routines = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut routine = routine_from_row(row)?;
            if include_definition {
                routine.definition = Some(cell_str(row, "definition").unwrap_or_default());
            }
            routines.push(routine);
        }
        routines.sort_by(|a, b| (&a.schema, &a.name).cmp(&(&b.schema, &b.name)));
        Ok(routines)
    }

    /// DML triggers with their owning table, sorted by (schema, name).
    pub async fn list_triggers(
        &self,
        target: DatabaseTarget,
        include_definition: bool,
    ) -> DbResult<Vec<TriggerDescriptor>> {
        let sql = if include_definition {
            queries::LIST_TRIGGERS_WITH_DEFINITION
        } else {
            queries::LIST_TRIGGERS
        };
        let rows = self.rows(target, SqlStatement::new(sql)).await?;
        let mut triggers = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut trigger = trigger_from_row(row)?;
            if include_definition {
                trigger.definition = Some(cell_str(row, "definition").unwrap_or_default());
            }
            triggers.push(trigger);
        }
        triggers.sort_by(|a, b| (&a.schema, &a.name).cmp(&(&b.schema, &b.name)));
        Ok(triggers)
    }

    /// Columns of a table in ordinal order. Empty when the table does not exist.
    pub async fn get_table_schema(
        &self,
        target: DatabaseTarget,
        table: &str,
        schema: Option<&str>,
    ) -> DbResult<Vec<ColumnDescriptor>> {
        let schema = schema_or_default(schema);
        let rows = self
            .table_rows(target, queries::DESCRIBE_COLUMNS, table, schema)
            .await?;
        let mut columns = rows
            .iter()
            .map(column_from_row)
            .collect::<DbResult<Vec<_>>>()?;
        columns.sort_by_key(|c| c.ordinal_position);
        Ok(columns)
    }

    /// Columns plus keys, indexes and an approximate row count.
    pub async fn get_table_details(
        &self,
        target: DatabaseTarget,
        table: &str,
        schema: Option<&str>,
    ) -> DbResult<TableDetails> {
        let schema = schema_or_default(schema);
        let columns = self.get_table_schema(target, table, Some(schema)).await?;

        let primary_keys = self
            .table_rows(target, queries::PRIMARY_KEYS, table, schema)
            .await?
            .iter()
            .map(primary_key_from_row)
            .collect::<DbResult<Vec<_>>>()?;

        let fk_sql = format!(
            "{} {} {}",
            queries::FOREIGN_KEYS_SELECT,
            queries::FOREIGN_KEYS_FOR_TABLE,
            queries::FOREIGN_KEYS_ORDER
        );
        let foreign_keys = self
            .table_rows(target, &fk_sql, table, schema)
            .await?
            .iter()
            .map(foreign_key_from_row)
            .collect::<DbResult<Vec<_>>>()?;

        let indexes = self
            .table_rows(target, queries::INDEXES, table, schema)
            .await?
            .iter()
            .map(index_from_row)
            .collect::<DbResult<Vec<_>>>()?;

        let row_count = self
            .table_rows(target, queries::ROW_COUNT, table, schema)
            .await?
            .first()
            .and_then(|r| cell_i64(r, "row_count"));

        Ok(TableDetails {
            schema: schema.to_string(),
            table: table.to_string(),
            columns,
            primary_keys,
            foreign_keys,
            indexes,
            row_count,
        })
    }

    /// Every foreign key in the database.
    pub async fn list_relationships(&self, target: DatabaseTarget) -> DbResult<Vec<ForeignKey>> {
        let sql = format!("{} {}", queries::FOREIGN_KEYS_SELECT, queries::FOREIGN_KEYS_ORDER);
        self.rows(target, SqlStatement::new(sql))
            .await?
            .iter()
            .map(foreign_key_from_row)
            .collect()
    }

    /// Creation text of a view, procedure or trigger.
    ///
    /// Returns an empty string when the object does not exist or its
    /// definition is unavailable (encrypted or system objects). Triggers are
    /// looked up by name; `schema` then filters on the owning table's schema
    /// only when given.
    pub async fn get_definition(
        &self,
        target: DatabaseTarget,
        kind: ObjectKind,
        name: &str,
        schema: Option<&str>,
    ) -> DbResult<String> {
        let stmt = match kind {
            ObjectKind::Triggers => {
                let schema = schema
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map_or(QueryParam::Null, QueryParam::from);
                SqlStatement::new(queries::TRIGGER_DEFINITION)
                    .bind(name)
                    .bind(schema)
            }
            ObjectKind::Views | ObjectKind::Procedures => {
                SqlStatement::new(queries::OBJECT_DEFINITION)
                    .bind(name)
                    .bind(schema_or_default(schema))
            }
            ObjectKind::Tables => {
                return Err(DbError::validation(
                    "Tables have no stored definition; use get_table_schema",
                ));
            }
        };

        let definition = self
            .rows(target, stmt)
            .await?
            .first()
            .and_then(|r| cell_str(r, "definition"))
            .unwrap_or_default();
        debug!(database = %target, kind = kind.singular(), object = name, found = !definition.is_empty(), "Fetched definition");
        Ok(definition)
    }

    /// Declared parameters of a stored procedure, in ordinal order.
    pub async fn get_procedure_parameters(
        &self,
        target: DatabaseTarget,
        procedure: &str,
        schema: Option<&str>,
    ) -> DbResult<Vec<ProcedureParameter>> {
        let schema = schema_or_default(schema);
        let mut params = self
            .table_rows(target, queries::PROCEDURE_PARAMETERS, procedure, schema)
            .await?
            .iter()
            .map(parameter_from_row)
            .collect::<DbResult<Vec<_>>>()?;
        params.sort_by_key(|p| p.ordinal_position);
        Ok(params)
    }

    pub async fn database_info(&self, target: DatabaseTarget) -> DbResult<DatabaseInfo> {
        let rows = self.rows(target, SqlStatement::new(queries::DATABASE_INFO)).await?;
        let row = rows
            .first()
            .ok_or_else(|| DbError::internal("database info query returned no rows"))?;
        Ok(DatabaseInfo {
            database_name: required(row, "database_name")?,
            version: cell_str(row, "version").unwrap_or_default(),
            product_version: cell_str(row, "product_version"),
            edition: cell_str(row, "edition"),
        })
    }
}
