//! Schema introspection tools.
//!
//! This module implements `get_schema`, `get_tables`, `get_table_schema`,
//! `get_stored_procedures`, `get_views` and `get_triggers`.

use crate::db::{SchemaIntrospector, SqlExecutor};
use crate::error::DbResult;
use crate::models::{
    ColumnDescriptor, DatabaseInfo, DatabaseTarget, ForeignKey, RoutineDescriptor,
    TableDescriptor, TableDetails, TriggerDescriptor,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Which part of the catalog get_schema reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SchemaObjectType {
    Tables,
    Procedures,
    Triggers,
    Views,
    /// Every foreign key in the database
    Relationships,
    #[default]
    All,
}

/// Input for the get_schema tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetSchemaInput {
    /// Database to inspect: "master" or "datamgmt"
    #[serde(alias = "database")]
    pub target: DatabaseTarget,
    /// tables, procedures, triggers, views, relationships or all. Default: all
    #[serde(default, alias = "schema_type")]
    pub object_type: SchemaObjectType,
}

/// Input for tools that only need a target (get_tables).
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TargetInput {
    /// Database to inspect: "master" or "datamgmt"
    #[serde(alias = "database")]
    pub target: DatabaseTarget,
}

/// Input for get_stored_procedures, get_views and get_triggers.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListObjectsInput {
    /// Database to inspect: "master" or "datamgmt"
    #[serde(alias = "database")]
    pub target: DatabaseTarget,
    /// Include each object's creation text. Default: false
    #[serde(default)]
    pub include_definition: bool,
}

/// Input for the get_table_schema tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetTableSchemaInput {
    /// Database to inspect: "master" or "datamgmt"
    #[serde(alias = "database")]
    pub target: DatabaseTarget,
    /// Table name
    #[serde(alias = "table_name")]
    pub table: String,
    /// Schema name. Default: dbo
    #[serde(default, alias = "schema_name")]
    pub schema: Option<String>,
    /// Also return primary keys, foreign keys, indexes and row count. Default: false
    #[serde(default)]
    pub include_details: bool,
}

/// Grouped catalog metadata. Only the requested groups are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaOverview {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<TableDescriptor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub views: Option<Vec<RoutineDescriptor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub procedures: Option<Vec<RoutineDescriptor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggers: Option<Vec<TriggerDescriptor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Vec<ForeignKey>>,
}

/// Output of get_table_schema: bare columns, or the full details object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TableSchemaOutput {
    Columns(Vec<ColumnDescriptor>),
    Details(TableDetails),
}

/// Handler for schema tools.
pub struct SchemaToolHandler {
    schema: SchemaIntrospector,
}

impl SchemaToolHandler {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self {
            schema: SchemaIntrospector::new(executor),
        }
    }

    pub async fn get_schema(&self, input: GetSchemaInput) -> DbResult<SchemaOverview> {
        let target = input.target;
        let mut overview = SchemaOverview::default();
        match input.object_type {
            SchemaObjectType::Tables => {
                overview.tables = Some(self.schema.list_tables(target).await?);
            }
            SchemaObjectType::Procedures => {
                overview.procedures = Some(self.schema.list_procedures(target, false).await?);
            }
            SchemaObjectType::Triggers => {
                overview.triggers = Some(self.schema.list_triggers(target, false).await?);
            }
            SchemaObjectType::Views => {
                overview.views = Some(self.schema.list_views(target, false).await?);
            }
            SchemaObjectType::Relationships => {
                overview.relationships = Some(self.schema.list_relationships(target).await?);
            }
            SchemaObjectType::All => {
                overview.database = Some(self.schema.database_info(target).await?);
                overview.tables = Some(self.schema.list_tables(target).await?);
                overview.views = Some(self.schema.list_views(target, false).await?);
                overview.procedures = Some(self.schema.list_procedures(target, false).await?);
                overview.triggers = Some(self.schema.list_triggers(target, false).await?);
            }
        }
        info!(database = %target, object_type = ?input.object_type, "Schema retrieved");
        Ok(overview)
    }

    pub async fn get_tables(&self, input: TargetInput) -> DbResult<Vec<TableDescriptor>> {
        self.schema.list_tables(input.target).await
    }

    pub async fn get_table_schema(
        &self,
        input: GetTableSchemaInput,
    ) -> DbResult<TableSchemaOutput> {
        let schema = input.schema.as_deref();
        if input.include_details {
            let details = self
                .schema
                .get_table_details(input.target, &input.table, schema)
                .await?;
            Ok(TableSchemaOutput::Details(details))
        } else {
            let columns = self
                .schema
                .get_table_schema(input.target, &input.table, schema)
                .await?;
            Ok(TableSchemaOutput::Columns(columns))
        }
    }

    pub async fn get_stored_procedures(
        &self,
        input: ListObjectsInput,
    ) -> DbResult<Vec<RoutineDescriptor>> {
        self.schema
            .list_procedures(input.target, input.include_definition)
            .await
    }

    pub async fn get_views(&self, input: ListObjectsInput) -> DbResult<Vec<RoutineDescriptor>> {
        self.schema
            .list_views(input.target, input.include_definition)
            .await
    }

    pub async fn get_triggers(&self, input: ListObjectsInput) -> DbResult<Vec<TriggerDescriptor>> {
        self.schema
            .list_triggers(input.target, input.include_definition)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockExecutor;
    use serde_json::json;

    fn handler() -> (Arc<MockExecutor>, SchemaToolHandler) {
        let mock = Arc::new(MockExecutor::new());
        (mock.clone(), SchemaToolHandler::new(mock))
    }

    #[test]
    fn test_object_type_defaults_to_all() {
        let input: GetSchemaInput = serde_json::from_value(json!({"target": "master"})).unwrap();
        assert_eq!(input.object_type, SchemaObjectType::All);
        let input: GetSchemaInput =
            serde_json::from_value(json!({"database": "datamgmt", "schema_type": "views"})).unwrap();
        assert_eq!(input.object_type, SchemaObjectType::Views);
    }

    #[tokio::test]
    async fn test_get_schema_single_group() {
        let (mock, handler) = handler();
        mock.rows(
            "INFORMATION_SCHEMA.TABLES",
            vec![json!({"schema": "App", "name": "User"}), json!({"schema": "App", "name": "Client"})],
        );
        let overview = handler
            .get_schema(serde_json::from_value(json!({"target": "master", "object_type": "tables"})).unwrap())
            .await
            .unwrap();
        let value = serde_json::to_value(&overview).unwrap();
        assert_eq!(value, json!({"tables": [
            {"schema": "App", "name": "Client"},
            {"schema": "App", "name": "User"}
        ]}));
    }

    #[tokio::test]
    async fn test_get_table_schema_shapes() {
        let (mock, handler) = handler();
        mock.rows(
            "INFORMATION_SCHEMA.COLUMNS",
            vec![json!({"name": "Id", "data_type": "int", "is_nullable": "NO", "ordinal_position": 1})],
        );
        let plain = handler
            .get_table_schema(serde_json::from_value(json!({"target": "master", "table": "Users"})).unwrap())
            .await
            .unwrap();
        assert!(matches!(plain, TableSchemaOutput::Columns(ref c) if c.len() == 1));

        let detailed = handler
            .get_table_schema(
                serde_json::from_value(json!({"target": "master", "table": "Users", "include_details": true}))
                    .unwrap(),
            )
            .await
            .unwrap();
        match detailed {
            TableSchemaOutput::Details(details) => {
                assert_eq!(details.schema, "dbo");
                assert_eq!(details.columns.len(), 1);
            }
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_catalog_lists_are_empty() {
        let (_mock, handler) = handler();
        let input: ListObjectsInput = serde_json::from_value(json!({"target": "datamgmt"})).unwrap();
        assert!(handler.get_triggers(input.clone()).await.unwrap().is_empty());
        assert!(handler.get_views(input.clone()).await.unwrap().is_empty());
        assert!(handler.get_stored_procedures(input).await.unwrap().is_empty());
    }
}
