//! Tool catalog and argument validation.
//!
//! Every tool is described once in [`TOOLS`]: its name, description and
//! argument specs. Incoming arguments are checked against the spec before
//! they reach a handler. Legacy argument names are mapped to their canonical
//! name and enum-valued strings are lowercased, so the typed input structs
//! only ever see one spelling.

use crate::error::{DbError, DbResult};
use crate::tools::procedure::{ExecuteProcedureInput, GetProcedureInfoInput};
use crate::tools::query::{ExecuteQueryInput, QueryTableInput};
use crate::tools::schema::{GetSchemaInput, GetTableSchemaInput, ListObjectsInput, TargetInput};
use crate::tools::write::{DeleteDataInput, InsertDataInput, UpdateDataInput};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

pub type JsonObject = Map<String, JsonValue>;

/// JSON type an argument must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    String,
    /// Non-negative integer
    Integer,
    Boolean,
    Object,
    Array,
    /// Named parameters as an object, or positional ones as an array
    ObjectOrArray,
}

impl ArgKind {
    fn accepts(&self, value: &JsonValue) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::ObjectOrArray => value.is_object() || value.is_array(),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Integer => "a non-negative integer",
            Self::Boolean => "a boolean",
            Self::Object => "an object",
            Self::Array => "an array",
            Self::ObjectOrArray => "an object or an array",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    pub name: &'static str,
    /// Older spellings accepted in place of `name`
    pub aliases: &'static [&'static str],
    pub kind: ArgKind,
    pub required: bool,
    /// Allowed values for enum-like strings, lowercase. Empty when free-form.
    pub allowed: &'static [&'static str],
}

const fn arg(name: &'static str, kind: ArgKind) -> ArgSpec {
    ArgSpec {
        name,
        aliases: &[],
        kind,
        required: false,
        allowed: &[],
    }
}

impl ArgSpec {
    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    const fn aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    const fn allowed(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = allowed;
        self
    }

    fn matches(&self, key: &str) -> bool {
        self.name.eq_ignore_ascii_case(key) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(key))
    }
}

const TARGET: ArgSpec = arg("target", ArgKind::String)
    .required()
    .aliases(&["database"])
    .allowed(&["master", "datamgmt"]);
const TABLE: ArgSpec = arg("table", ArgKind::String).required().aliases(&["table_name"]);
const SCHEMA: ArgSpec = arg("schema", ArgKind::String).aliases(&["schema_name"]);
const PROCEDURE_NAME: ArgSpec = arg("procedure_name", ArgKind::String).required();
const WHERE_CLAUSE: ArgSpec = arg("where_clause", ArgKind::String).required();
const WHERE_PARAMS: ArgSpec = arg("where_params", ArgKind::Object).aliases(&["where_parameters"]);
const INCLUDE_DEFINITION: ArgSpec = arg("include_definition", ArgKind::Boolean);

/// Static description of one tool.
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub args: &'static [ArgSpec],
    schema: fn() -> Arc<JsonObject>,
}

impl ToolSpec {
    /// JSON Schema of the tool's input, generated from its typed input struct.
    pub fn input_schema(&self) -> Arc<JsonObject> {
        (self.schema)()
    }

    /// Check `args` against this tool's specs and return them under canonical names.
    ///
    /// Unknown keys pass through untouched. Explicit nulls count as absent.
    pub fn normalize(&self, args: JsonObject) -> DbResult<JsonObject> {
        let mut out = JsonObject::new();
        for (key, value) in args {
            let Some(spec) = self.args.iter().find(|s| s.matches(&key)) else {
                out.insert(key, value);
                continue;
            };
            if value.is_null() {
                continue;
            }
            if out.contains_key(spec.name) {
                return Err(DbError::validation(format!(
                    "{}: argument '{}' was given more than once (via '{key}')",
                    self.name, spec.name
                )));
            }
            if !spec.kind.accepts(&value) {
                return Err(DbError::validation(format!(
                    "{}: argument '{}' must be {}",
                    self.name,
                    spec.name,
                    spec.kind.describe()
                )));
            }
            let value = match value {
                JsonValue::String(s) if !spec.allowed.is_empty() => {
                    let lowered = s.trim().to_ascii_lowercase();
                    if !spec.allowed.contains(&lowered.as_str()) {
                        return Err(DbError::validation(format!(
                            "{}: argument '{}' must be one of {}, got '{s}'",
                            self.name,
                            spec.name,
                            spec.allowed.join(", ")
                        )));
                    }
                    JsonValue::String(lowered)
                }
                other => other,
            };
            out.insert(spec.name.to_string(), value);
        }

        if let Some(missing) = self
            .args
            .iter()
            .find(|s| s.required && !out.contains_key(s.name))
        {
            return Err(DbError::validation(format!(
                "{}: missing required argument '{}'",
                self.name, missing.name
            )));
        }
        Ok(out)
    }
}

fn schema_of<T: JsonSchema>() -> Arc<JsonObject> {
    match serde_json::to_value(schemars::schema_for!(T)) {
        Ok(JsonValue::Object(map)) => Arc::new(map),
        _ => Arc::new(JsonObject::new()),
    }
}

/// Every tool the server exposes, in listing order.
pub static TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "execute_query",
        description: "Run a SQL statement against master or datamgmt.\nOnly SELECT, INSERT, UPDATE, DELETE and EXEC/EXECUTE are accepted; DDL and server-level commands are rejected.\nUse @name placeholders with a params object, or @P1..@Pn with a params array.\nSELECT returns rows (capped at limit/MAX_ROWS, with truncated flag); EXEC returns result_sets; DML returns affected_rows.",
        args: &[
            TARGET,
            arg("sql", ArgKind::String).required().aliases(&["query"]),
            arg("params", ArgKind::ObjectOrArray).aliases(&["parameters"]),
            arg("limit", ArgKind::Integer).aliases(&["max_rows"]),
        ],
        schema: schema_of::<ExecuteQueryInput>,
    },
    ToolSpec {
        name: "query_table",
        description: "Read one page of rows from a table.\nDefaults: schema dbo, limit 100, offset 0. The result reports has_more when another page exists.",
        args: &[
            TARGET,
            TABLE,
            SCHEMA,
            arg("limit", ArgKind::Integer),
            arg("offset", ArgKind::Integer),
        ],
        schema: schema_of::<QueryTableInput>,
    },
    ToolSpec {
        name: "insert_data",
        description: "Insert one row. data maps column names to values.\nSet return_id to get the new identity value as inserted_id.",
        args: &[
            TARGET,
            TABLE,
            SCHEMA,
            arg("data", ArgKind::Object).required(),
            arg("return_id", ArgKind::Boolean),
        ],
        schema: schema_of::<InsertDataInput>,
    },
    ToolSpec {
        name: "update_data",
        description: "Update rows matching where_clause with the column values in data.\nwhere_clause may use @name placeholders bound from where_params; names must not repeat a data column.",
        args: &[
            TARGET,
            TABLE,
            SCHEMA,
            arg("data", ArgKind::Object).required(),
            WHERE_CLAUSE,
            WHERE_PARAMS,
        ],
        schema: schema_of::<UpdateDataInput>,
    },
    ToolSpec {
        name: "delete_data",
        description: "Delete rows matching where_clause. Requires confirm_delete: true.\nwhere_clause may use @name placeholders bound from where_params.",
        args: &[
            TARGET,
            TABLE,
            SCHEMA,
            WHERE_CLAUSE,
            WHERE_PARAMS,
            arg("confirm_delete", ArgKind::Boolean),
        ],
        schema: schema_of::<DeleteDataInput>,
    },
    ToolSpec {
        name: "get_schema",
        description: "Summarize the catalog of a database.\nobject_type: tables, procedures, triggers, views, relationships (foreign keys) or all (default, also reports database name and version).",
        args: &[
            TARGET,
            arg("object_type", ArgKind::String)
                .aliases(&["schema_type"])
                .allowed(&["tables", "procedures", "triggers", "views", "relationships", "all"]),
        ],
        schema: schema_of::<GetSchemaInput>,
    },
    ToolSpec {
        name: "get_tables",
        description: "List user tables as {schema, name}, sorted by schema then name.",
        args: &[TARGET],
        schema: schema_of::<TargetInput>,
    },
    ToolSpec {
        name: "get_table_schema",
        description: "List a table's columns in ordinal order.\nWith include_details, also returns primary keys, foreign keys, indexes and an approximate row count.",
        args: &[
            TARGET,
            TABLE,
            SCHEMA,
            arg("include_details", ArgKind::Boolean),
        ],
        schema: schema_of::<GetTableSchemaInput>,
    },
    ToolSpec {
        name: "get_stored_procedures",
        description: "List stored procedures as {schema, name}. include_definition adds each procedure's source.",
        args: &[TARGET, INCLUDE_DEFINITION],
        schema: schema_of::<ListObjectsInput>,
    },
    ToolSpec {
        name: "get_triggers",
        description: "List DML triggers as {name, table, schema, is_disabled}. include_definition adds each trigger's source.",
        args: &[TARGET, INCLUDE_DEFINITION],
        schema: schema_of::<ListObjectsInput>,
    },
    ToolSpec {
        name: "get_views",
        description: "List views as {schema, name}. include_definition adds each view's source.",
        args: &[TARGET, INCLUDE_DEFINITION],
        schema: schema_of::<ListObjectsInput>,
    },
    ToolSpec {
        name: "execute_procedure",
        description: "Execute a stored procedure and return all of its result sets.\nparameters maps parameter names to input values. output_parameters names OUTPUT parameters whose final values are returned.",
        args: &[
            TARGET,
            PROCEDURE_NAME,
            SCHEMA,
            arg("parameters", ArgKind::Object),
            arg("output_parameters", ArgKind::Array),
        ],
        schema: schema_of::<ExecuteProcedureInput>,
    },
    ToolSpec {
        name: "get_procedure_info",
        description: "Describe a stored procedure: its parameters (name, type, mode, position) and its definition.",
        args: &[TARGET, PROCEDURE_NAME, SCHEMA],
        schema: schema_of::<GetProcedureInfoInput>,
    },
];

/// Look up a tool by name.
pub fn find(name: &str) -> DbResult<&'static ToolSpec> {
    TOOLS
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| DbError::not_found(format!("tool '{name}'")))
}

/// A validated, typed tool invocation.
#[derive(Debug, Clone)]
pub enum OperationRequest {
    ExecuteQuery(ExecuteQueryInput),
    QueryTable(QueryTableInput),
    InsertData(InsertDataInput),
    UpdateData(UpdateDataInput),
    DeleteData(DeleteDataInput),
    GetSchema(GetSchemaInput),
    GetTables(TargetInput),
    GetTableSchema(GetTableSchemaInput),
    GetStoredProcedures(ListObjectsInput),
    GetTriggers(ListObjectsInput),
    GetViews(ListObjectsInput),
    ExecuteProcedure(ExecuteProcedureInput),
    GetProcedureInfo(GetProcedureInfoInput),
}

fn typed<T: DeserializeOwned>(tool: &str, args: JsonObject) -> DbResult<T> {
    serde_json::from_value(JsonValue::Object(args))
        .map_err(|e| DbError::validation(format!("{tool}: invalid arguments: {e}")))
}

impl OperationRequest {
    /// Validate `args` for tool `name` and decode them.
    pub fn parse(name: &str, args: Option<JsonObject>) -> DbResult<Self> {
        let spec = find(name)?;
        let args = spec.normalize(args.unwrap_or_default())?;
        let tool = spec.name;
        Ok(match tool {
            "execute_query" => Self::ExecuteQuery(typed(tool, args)?),
            "query_table" => Self::QueryTable(typed(tool, args)?),
            "insert_data" => Self::InsertData(typed(tool, args)?),
            "update_data" => Self::UpdateData(typed(tool, args)?),
            "delete_data" => Self::DeleteData(typed(tool, args)?),
            "get_schema" => Self::GetSchema(typed(tool, args)?),
            "get_tables" => Self::GetTables(typed(tool, args)?),
            "get_table_schema" => Self::GetTableSchema(typed(tool, args)?),
            "get_stored_procedures" => Self::GetStoredProcedures(typed(tool, args)?),
            "get_triggers" => Self::GetTriggers(typed(tool, args)?),
            "get_views" => Self::GetViews(typed(tool, args)?),
            "execute_procedure" => Self::ExecuteProcedure(typed(tool, args)?),
            "get_procedure_info" => Self::GetProcedureInfo(typed(tool, args)?),
            other => return Err(DbError::not_found(format!("tool '{other}'"))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatabaseTarget;
    use serde_json::json;

    fn obj(v: JsonValue) -> JsonObject {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_tool_names_are_unique() {
        let mut names: Vec<_> = TOOLS.iter().map(|t| t.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), TOOLS.len());
        assert_eq!(TOOLS.len(), 13);
    }

    #[test]
    fn test_required_args_match_input_schemas() {
        for tool in TOOLS {
            let schema = tool.input_schema();
            let mut from_schema: Vec<String> = schema
                .get("required")
                .and_then(JsonValue::as_array)
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            from_schema.sort();
            let mut from_spec: Vec<String> = tool
                .args
                .iter()
                .filter(|a| a.required)
                .map(|a| a.name.to_string())
                .collect();
            from_spec.sort();
            assert_eq!(from_schema, from_spec, "required args differ for {}", tool.name);
        }
    }

    #[test]
    fn test_unknown_tool_is_not_found() {
        let err = OperationRequest::parse("drop_everything", None).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_missing_required_argument() {
        let err = OperationRequest::parse("get_tables", None).unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("'target'"));
    }

    #[test]
    fn test_aliases_and_case_are_normalized() {
        let request = OperationRequest::parse(
            "get_schema",
            Some(obj(json!({"database": "MASTER", "schema_type": "Views"}))),
        )
        .unwrap();
        match request {
            OperationRequest::GetSchema(input) => {
                assert_eq!(input.target, DatabaseTarget::Master);
                assert_eq!(input.object_type, crate::tools::schema::SchemaObjectType::Views);
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn test_bad_target_is_validation_error() {
        let err = OperationRequest::parse("get_tables", Some(obj(json!({"target": "reporting"}))))
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let err = OperationRequest::parse(
            "execute_query",
            Some(obj(json!({"target": "master", "sql": "SELECT 1", "limit": "ten"}))),
        )
        .unwrap_err();
        assert!(err.to_string().contains("non-negative integer"));
    }

    #[test]
    fn test_duplicate_via_alias_is_rejected() {
        let err = OperationRequest::parse(
            "execute_query",
            Some(obj(json!({"target": "master", "sql": "SELECT 1", "query": "SELECT 2"}))),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_null_optional_is_absent() {
        let request = OperationRequest::parse(
            "get_table_schema",
            Some(obj(json!({"target": "datamgmt", "table_name": "File_Detail", "schema": null}))),
        )
        .unwrap();
        match request {
            OperationRequest::GetTableSchema(input) => {
                assert_eq!(input.table, "File_Detail");
                assert!(input.schema.is_none());
            }
            other => panic!("unexpected request {other:?}"),
        }
    }
}
