//! End-to-end tool tests through the service envelope.
//!
//! Every call goes through argument validation, the tool handlers and the
//! statement builders, against a scripted executor.

use serde_json::{Map, Value, json};
use ssms_mcp_server::SsmsService;
use ssms_mcp_server::db::{CallKind, MockExecutor, MockReply};
use ssms_mcp_server::models::{DatabaseTarget, QueryParam, ResultSet};
use std::sync::Arc;

fn setup(max_rows: u32) -> (Arc<MockExecutor>, SsmsService) {
    let mock = Arc::new(MockExecutor::new());
    (mock.clone(), SsmsService::new(mock, max_rows))
}

fn args(v: Value) -> Option<Map<String, Value>> {
    v.as_object().cloned()
}

#[tokio::test]
async fn test_get_tables_sorted_by_schema_then_name() {
    let (mock, service) = setup(1000);
    mock.rows(
        "INFORMATION_SCHEMA.TABLES",
        vec![
            json!({"schema": "App", "name": "User"}),
            json!({"schema": "App", "name": "Client"}),
        ],
    );

    let result = service.call("get_tables", args(json!({"target": "master"}))).await;

    assert!(result.success);
    assert_eq!(
        result.data.unwrap(),
        json!([
            {"schema": "App", "name": "Client"},
            {"schema": "App", "name": "User"}
        ])
    );
}

#[tokio::test]
async fn test_insert_then_query_file_detail() {
    let (mock, service) = setup(1000);
    mock.affected("INSERT INTO [dbo].[File_Detail]", 1);

    let inserted = service
        .call(
            "insert_data",
            args(json!({
                "target": "datamgmt",
                "table": "File_Detail",
                "data": {"FileName": "report.pdf", "FileSize": 2048}
            })),
        )
        .await;
    assert!(inserted.success, "{inserted:?}");
    assert_eq!(inserted.data.unwrap(), json!({"affected_rows": 1}));

    let insert = mock.last_call_matching("INSERT INTO").unwrap();
    assert_eq!(insert.kind, CallKind::Execute);
    assert_eq!(insert.target, DatabaseTarget::DataMgmt);
    assert_eq!(
        insert.statement.sql,
        "INSERT INTO [dbo].[File_Detail] ([FileName], [FileSize]) VALUES (@P1, @P2)"
    );
    assert_eq!(
        insert.statement.params,
        vec![QueryParam::from("report.pdf"), QueryParam::Int(2048)]
    );

    mock.rows(
        "FROM File_Detail",
        vec![json!({"FileName": "report.pdf", "FileSize": 2048})],
    );
    let queried = service
        .call(
            "execute_query",
            args(json!({
                "target": "datamgmt",
                "sql": "SELECT FileName, FileSize FROM File_Detail WHERE FileName = @name",
                "params": {"name": "report.pdf"}
            })),
        )
        .await;
    assert!(queried.success);
    assert_eq!(
        queried.data.unwrap(),
        json!({
            "rows": [{"FileName": "report.pdf", "FileSize": 2048}],
            "row_count": 1,
            "truncated": false
        })
    );
}

#[tokio::test]
async fn test_drop_is_rejected_without_round_trip() {
    let (mock, service) = setup(1000);

    for sql in [
        "DROP TABLE Users",
        "SELECT 1; DROP TABLE Users",
        "  -- comment\n TRUNCATE TABLE Users",
        "EXEC xp_cmdshell 'dir'",
        "EXEC ('DROP TABLE Users')",
        "WITH x AS (SELECT 1 AS a) SELECT a FROM x",
    ] {
        let result = service
            .call("execute_query", args(json!({"target": "master", "sql": sql})))
            .await;
        assert!(!result.success, "{sql} should be rejected");
        assert_eq!(result.error_kind.as_deref(), Some("validation"), "{sql}");
    }
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_empty_catalog_lists() {
    let (_mock, service) = setup(1000);
    for tool in ["get_tables", "get_views", "get_stored_procedures", "get_triggers"] {
        let result = service.call(tool, args(json!({"target": "datamgmt"}))).await;
        assert!(result.success, "{tool}");
        assert_eq!(result.data.unwrap(), json!([]), "{tool}");
    }
}

#[tokio::test]
async fn test_unconfigured_style_failure_surfaces_in_envelope() {
    let (mock, service) = setup(1000);
    mock.on_target(
        DatabaseTarget::Master,
        "INFORMATION_SCHEMA.TABLES",
        MockReply::Error("Login failed for user 'app'.".into()),
    );

    let failed = service.call("get_tables", args(json!({"target": "master"}))).await;
    assert!(!failed.success);
    assert!(failed.error.unwrap().contains("Login failed"));

    let other = service.call("get_tables", args(json!({"target": "datamgmt"}))).await;
    assert!(other.success);
}

#[tokio::test]
async fn test_update_where_params_cannot_shadow_columns() {
    let (mock, service) = setup(1000);
    let result = service
        .call(
            "update_data",
            args(json!({
                "target": "master",
                "table": "Users",
                "data": {"Name": "Ann"},
                "where_clause": "Name = @name",
                "where_params": {"name": "Bob"}
            })),
        )
        .await;
    assert!(!result.success);
    assert_eq!(result.error_kind.as_deref(), Some("validation"));
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_update_builds_parameterized_statement() {
    let (mock, service) = setup(1000);
    mock.affected("UPDATE [dbo].[Users]", 2);
    let result = service
        .call(
            "update_data",
            args(json!({
                "database": "master",
                "table_name": "Users",
                "data": {"Active": false},
                "where_clause": "Region = @region",
                "where_parameters": {"region": "EU"}
            })),
        )
        .await;
    assert_eq!(result.data.unwrap(), json!({"affected_rows": 2}));

    let call = mock.last_call_matching("UPDATE").unwrap();
    assert_eq!(
        call.statement.sql,
        "UPDATE [dbo].[Users] SET [Active] = @P1 WHERE Region = @P2"
    );
    assert_eq!(
        call.statement.params,
        vec![QueryParam::Bool(false), QueryParam::from("EU")]
    );
}

#[tokio::test]
async fn test_delete_requires_confirmation_and_safe_where() {
    let (mock, service) = setup(1000);

    let unconfirmed = service
        .call(
            "delete_data",
            args(json!({"target": "master", "table": "Users", "where_clause": "Id = @id", "where_params": {"id": 4}})),
        )
        .await;
    assert_eq!(unconfirmed.error_kind.as_deref(), Some("validation"));

    let stacked = service
        .call(
            "delete_data",
            args(json!({"target": "master", "table": "Users", "where_clause": "1=1; DROP TABLE Users", "confirm_delete": true})),
        )
        .await;
    assert_eq!(stacked.error_kind.as_deref(), Some("validation"));
    assert_eq!(mock.call_count(), 0);

    mock.affected("DELETE FROM [dbo].[Users]", 1);
    let deleted = service
        .call(
            "delete_data",
            args(json!({"target": "master", "table": "Users", "where_clause": "Id = @id", "where_params": {"id": 4}, "confirm_delete": true})),
        )
        .await;
    assert_eq!(deleted.data.unwrap(), json!({"affected_rows": 1}));
}

#[tokio::test]
async fn test_execute_procedure_with_output_parameter() {
    let (mock, service) = setup(1000);
    mock.rows(
        "INFORMATION_SCHEMA.PARAMETERS",
        vec![
            json!({"name": "@Region", "data_type": "varchar", "mode": "IN", "max_length": 10, "ordinal_position": 1}),
            json!({"name": "@Total", "data_type": "int", "mode": "INOUT", "ordinal_position": 2}),
        ],
    )
    .on(
        "EXEC [dbo].[usp_CountUsers]",
        MockReply::Sets(vec![
            ResultSet::from_rows(ssms_mcp_server::db::mock::rows_from_json(vec![
                json!({"Id": 1}),
                json!({"Id": 2}),
            ])),
            ResultSet::from_rows(ssms_mcp_server::db::mock::rows_from_json(vec![
                json!({"Total": 2}),
            ])),
        ]),
    );

    let result = service
        .call(
            "execute_procedure",
            args(json!({
                "target": "master",
                "procedure_name": "usp_CountUsers",
                "parameters": {"Region": "EU"},
                "output_parameters": ["Total"]
            })),
        )
        .await;
    assert!(result.success, "{result:?}");
    let data = result.data.unwrap();
    assert_eq!(data["output_parameters"], json!({"Total": 2}));
    assert_eq!(data["row_count"], 2);
    assert_eq!(data["result_sets"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_get_schema_all_includes_database_info() {
    let (mock, service) = setup(1000);
    mock.rows(
        "SERVERPROPERTY",
        vec![json!({"database_name": "DataMgmt", "version": "Microsoft SQL Server 2022"})],
    );
    let result = service.call("get_schema", args(json!({"target": "datamgmt"}))).await;
    assert!(result.success, "{result:?}");
    let data = result.data.unwrap();
    assert_eq!(data["database"]["database_name"], "DataMgmt");
    assert_eq!(data["tables"], json!([]));
    assert!(data.get("relationships").is_none());
}

#[tokio::test]
async fn test_rows_truncated_at_server_cap() {
    let (mock, service) = setup(2);
    mock.rows(
        "FROM Users",
        vec![json!({"Id": 1}), json!({"Id": 2}), json!({"Id": 3})],
    );
    let result = service
        .call("execute_query", args(json!({"target": "master", "sql": "SELECT Id FROM Users"})))
        .await;
    let data = result.data.unwrap();
    assert_eq!(data["row_count"], 2);
    assert_eq!(data["truncated"], true);
}
