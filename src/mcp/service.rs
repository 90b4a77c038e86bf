//! MCP service implementation using rmcp.
//!
//! This module defines the SsmsService struct, which exposes the database
//! tools and catalog resources over the MCP protocol. Tool calls are
//! validated against the catalog in [`crate::tools::registry`] and always
//! answer with the `{success, data | error}` envelope, including when the
//! arguments themselves are rejected.

use crate::db::SqlExecutor;
use crate::error::{DbError, DbResult};
use crate::mcp::resources::{ResourceBody, ResourceEntry, ResourceRegistry};
use crate::models::OperationResult;
use crate::tools::procedure::ProcedureToolHandler;
use crate::tools::query::QueryToolHandler;
use crate::tools::registry::{JsonObject, OperationRequest, TOOLS};
use crate::tools::schema::SchemaToolHandler;
use crate::tools::write::WriteToolHandler;
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    model::{
        AnnotateAble, CallToolRequestParam, CallToolResult, Implementation, ListResourcesResult,
        ListToolsResult, PaginatedRequestParam, ProtocolVersion, RawResource,
        ReadResourceRequestParam, ReadResourceResult, ResourceContents, ServerCapabilities,
        ServerInfo, Tool,
    },
    service::RequestContext,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct SsmsService {
    /// Statement runner shared by every tool handler
    executor: Arc<dyn SqlExecutor>,
    /// Server-wide cap on returned rows
    max_rows: u32,
    resources: ResourceRegistry,
}

fn to_json<T: Serialize>(value: T) -> DbResult<JsonValue> {
    serde_json::to_value(value)
        .map_err(|e| DbError::internal(format!("Failed to encode result: {e}")))
}

impl SsmsService {
    /// Create a new SsmsService instance.
    ///
    /// # Arguments
    ///
    /// * `executor` - Runs statements against the configured targets
    /// * `max_rows` - Upper bound on rows returned by any tool
    pub fn new(executor: Arc<dyn SqlExecutor>, max_rows: u32) -> Self {
        Self {
            resources: ResourceRegistry::new(executor.clone()),
            executor,
            max_rows,
        }
    }

    /// Invoke a tool by name and wrap the outcome in the result envelope.
    pub async fn call(&self, name: &str, args: Option<JsonObject>) -> OperationResult {
        let start = Instant::now();
        let result = match OperationRequest::parse(name, args) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => Err(e),
        };
        match &result {
            Ok(_) => info!(
                tool = name,
                execution_time_ms = start.elapsed().as_millis() as u64,
                "Tool call succeeded"
            ),
            Err(e) => warn!(
                tool = name,
                error_kind = e.kind(),
                error = %e,
                "Tool call failed"
            ),
        }
        OperationResult::from(result)
    }

    async fn dispatch(&self, request: OperationRequest) -> DbResult<JsonValue> {
        let executor = self.executor.clone();
        match request {
            OperationRequest::ExecuteQuery(input) => {
                to_json(QueryToolHandler::new(executor, self.max_rows).execute_query(input).await?)
            }
            OperationRequest::QueryTable(input) => {
                to_json(QueryToolHandler::new(executor, self.max_rows).query_table(input).await?)
            }
            OperationRequest::InsertData(input) => {
                to_json(WriteToolHandler::new(executor).insert_data(input).await?)
            }
            OperationRequest::UpdateData(input) => {
                to_json(WriteToolHandler::new(executor).update_data(input).await?)
            }
            OperationRequest::DeleteData(input) => {
                to_json(WriteToolHandler::new(executor).delete_data(input).await?)
            }
            OperationRequest::GetSchema(input) => {
                to_json(SchemaToolHandler::new(executor).get_schema(input).await?)
            }
            OperationRequest::GetTables(input) => {
                to_json(SchemaToolHandler::new(executor).get_tables(input).await?)
            }
            OperationRequest::GetTableSchema(input) => {
                to_json(SchemaToolHandler::new(executor).get_table_schema(input).await?)
            }
            OperationRequest::GetStoredProcedures(input) => {
                to_json(SchemaToolHandler::new(executor).get_stored_procedures(input).await?)
            }
            OperationRequest::GetTriggers(input) => {
                to_json(SchemaToolHandler::new(executor).get_triggers(input).await?)
            }
            OperationRequest::GetViews(input) => {
                to_json(SchemaToolHandler::new(executor).get_views(input).await?)
            }
            OperationRequest::ExecuteProcedure(input) => to_json(
                ProcedureToolHandler::new(executor, self.max_rows)
                    .execute_procedure(input)
                    .await?,
            ),
            OperationRequest::GetProcedureInfo(input) => to_json(
                ProcedureToolHandler::new(executor, self.max_rows)
                    .get_procedure_info(input)
                    .await?,
            ),
        }
    }

    /// Tool definitions as advertised to clients.
    pub fn tools(&self) -> Vec<Tool> {
        TOOLS
            .iter()
            .map(|spec| Tool::new(spec.name, spec.description, spec.input_schema()))
            .collect()
    }

    pub async fn resource_entries(&self) -> Vec<ResourceEntry> {
        self.resources.list().await
    }

    pub async fn read_resource_body(&self, uri: &str) -> DbResult<ResourceBody> {
        self.resources.read(uri).await
    }
}

impl ServerHandler for SsmsService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                title: Some("SQL Server MCP Server".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "SQL Server tools for two databases, selected with target: \"master\" or \"datamgmt\".\n\
                 Start with get_tables or get_schema to discover objects, then get_table_schema for columns.\n\
                 Use execute_query for SELECT/DML/EXEC with @name placeholders and a params object.\n\
                 insert_data, update_data and delete_data build statements from structured arguments; delete_data needs confirm_delete: true.\n\
                 Every result is {success, data} or {success: false, error}. Catalog objects are also readable as ssms:// resources."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let result = self.call(&request.name, request.arguments).await;
        let success = result.success;
        let value = result.to_value();
        Ok(if success {
            CallToolResult::structured(value)
        } else {
            CallToolResult::structured_error(value)
        })
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let resources = self
            .resource_entries()
            .await
            .into_iter()
            .map(|entry| {
                let mut raw = RawResource::new(entry.uri, entry.name);
                raw.description = Some(entry.description);
                raw.mime_type = Some(entry.mime_type);
                raw.no_annotation()
            })
            .collect::<Vec<_>>();
        debug!(count = resources.len(), "Listing resources");
        Ok(ListResourcesResult::with_all_items(resources))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let body = self
            .read_resource_body(&request.uri)
            .await
            .map_err(McpError::from)?;
        let mut contents = ResourceContents::text(body.text, body.uri);
        if let ResourceContents::TextResourceContents { mime_type, .. } = &mut contents {
            *mime_type = Some(body.mime_type.to_string());
        }
        Ok(ReadResourceResult {
            contents: vec![contents],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockExecutor;
    use serde_json::json;

    fn service() -> (Arc<MockExecutor>, SsmsService) {
        let mock = Arc::new(MockExecutor::new());
        (mock.clone(), SsmsService::new(mock, 1000))
    }

    fn args(v: JsonValue) -> Option<JsonObject> {
        v.as_object().cloned()
    }

    #[test]
    fn test_service_info() {
        let (_mock, service) = service();
        let info = service.get_info();
        assert!(info.capabilities.tools.is_some());
        assert!(info.capabilities.resources.is_some());
        assert!(info.instructions.is_some());
    }

    #[test]
    fn test_all_tools_listed() {
        let (_mock, service) = service();
        let tools = service.tools();
        assert_eq!(tools.len(), 13);
        let names: Vec<_> = tools.iter().map(|t| t.name.to_string()).collect();
        assert!(names.contains(&"execute_query".to_string()));
        assert!(names.contains(&"get_procedure_info".to_string()));
        for tool in &tools {
            assert_eq!(tool.input_schema.get("type"), Some(&json!("object")), "{}", tool.name);
        }
    }

    #[tokio::test]
    async fn test_validation_failure_is_an_envelope() {
        let (mock, service) = service();
        let result = service
            .call("execute_query", args(json!({"target": "master", "sql": "DROP TABLE Users"})))
            .await;
        assert!(!result.success);
        assert_eq!(result.error_kind.as_deref(), Some("validation"));
        assert!(result.data.is_none());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_found() {
        let (_mock, service) = service();
        let result = service.call("shutdown_server", None).await;
        assert!(!result.success);
        assert_eq!(result.error_kind.as_deref(), Some("not_found"));
    }

    #[tokio::test]
    async fn test_success_envelope_carries_data() {
        let (mock, service) = service();
        mock.rows(
            "INFORMATION_SCHEMA.TABLES",
            vec![json!({"schema": "App", "name": "User"}), json!({"schema": "App", "name": "Client"})],
        );
        let result = service.call("get_tables", args(json!({"target": "master"}))).await;
        assert!(result.success);
        assert_eq!(
            result.to_value(),
            json!({"success": true, "data": [
                {"schema": "App", "name": "Client"},
                {"schema": "App", "name": "User"}
            ]})
        );
    }

    #[tokio::test]
    async fn test_driver_failure_is_query_error() {
        let (mock, service) = service();
        mock.fail("FROM Missing", "Invalid object name 'Missing'.");
        let result = service
            .call("execute_query", args(json!({"target": "datamgmt", "sql": "SELECT * FROM Missing"})))
            .await;
        assert!(!result.success);
        assert_eq!(result.error_kind.as_deref(), Some("query"));
        assert!(result.error.unwrap().contains("Invalid object name"));
    }
}
