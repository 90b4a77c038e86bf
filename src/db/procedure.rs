//! Stored procedure execution.
//!
//! Input parameters are passed by name (`EXEC p @a = @P1`). Output
//! parameters need a variable to receive them, so when any are requested
//! their types are read from the catalog and the call becomes a batch:
//!
//! ```text
//! DECLARE @__out_total int;
//! EXEC [dbo].[usp_Count] @region = @P1, @total = @__out_total OUTPUT;
//! SELECT @__out_total AS [total];
//! ```
//!
//! The trailing SELECT is the last result set and carries the output values.

use crate::db::params::normalize_name;
use crate::db::provider::{SqlExecutor, SqlStatement};
use crate::db::schema::SchemaIntrospector;
use crate::error::{DbError, DbResult};
use crate::models::{
    DEFAULT_SCHEMA, DatabaseTarget, ObjectKind, ProcedureParameter, QueryParam, ResultSet, Row,
};
use crate::tools::sql_validator::{qualified_name, validate_identifier};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::info;

const OUTPUT_VAR_PREFIX: &str = "@__out_";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcedureOutcome {
    pub result_sets: Vec<ResultSet>,
    /// Final values of the requested OUTPUT parameters, keyed by name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_parameters: Option<Row>,
}

/// Signature and source of a stored procedure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcedureInfo {
    pub schema: String,
    pub name: String,
    pub parameters: Vec<ProcedureParameter>,
    pub definition: String,
}

fn schema_or_default(schema: Option<&str>) -> &str {
    match schema.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => DEFAULT_SCHEMA,
    }
}

/// Build the EXEC statement (or DECLARE/EXEC/SELECT batch when `outputs` is non-empty).
pub(crate) fn build_exec(
    procedure: &str,
    schema: Option<&str>,
    inputs: &Map<String, JsonValue>,
    outputs: &[&ProcedureParameter],
) -> DbResult<SqlStatement> {
    let name = qualified_name(schema_or_default(schema), procedure.trim(), "procedure")?;

    let mut params: Vec<QueryParam> = Vec::with_capacity(inputs.len());
    let mut arguments: Vec<String> = Vec::with_capacity(inputs.len() + outputs.len());
    let mut declarations: Vec<String> = Vec::with_capacity(outputs.len());
    let mut selects: Vec<String> = Vec::with_capacity(outputs.len());

    for (raw, value) in inputs {
        let key = normalize_name(raw);
        let arg = raw.trim().trim_start_matches('@');
        validate_identifier(arg, "parameter")?;
        // INOUT parameters are seeded through their DECLARE below
        if outputs.iter().any(|o| o.name.to_lowercase() == key) {
            continue;
        }
        params.push(QueryParam::from(value));
        arguments.push(format!("@{arg} = @P{}", params.len()));
    }

    for output in outputs {
        validate_identifier(&output.name, "output parameter")?;
        let var = format!("{OUTPUT_VAR_PREFIX}{}", output.name);
        let seed = inputs
            .iter()
            .find(|(k, _)| normalize_name(k) == output.name.to_lowercase());
        match seed {
            Some((_, value)) => {
                params.push(QueryParam::from(value));
                declarations.push(format!(
                    "DECLARE {var} {} = @P{};",
                    output.declared_type(),
                    params.len()
                ));
            }
            None => declarations.push(format!("DECLARE {var} {};", output.declared_type())),
        }
        arguments.push(format!("@{} = {var} OUTPUT", output.name));
        selects.push(format!("{var} AS [{}]", output.name));
    }

    let mut exec = format!("EXEC {name}");
    if !arguments.is_empty() {
        exec.push(' ');
        exec.push_str(&arguments.join(", "));
    }

    let sql = if outputs.is_empty() {
        exec
    } else {
        format!(
            "{}\n{exec};\nSELECT {};",
            declarations.join("\n"),
            selects.join(", ")
        )
    };
    Ok(SqlStatement::with_params(sql, params))
}

#[derive(Clone)]
pub struct ProcedureRunner {
    executor: Arc<dyn SqlExecutor>,
    schema: SchemaIntrospector,
}

impl ProcedureRunner {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self {
            schema: SchemaIntrospector::new(executor.clone()),
            executor,
        }
    }

    /// Execute a stored procedure and collect its result sets.
    ///
    /// `output_names` lists parameters to return; each must be declared
    /// OUTPUT on the procedure.
    pub async fn execute(
        &self,
        target: DatabaseTarget,
        procedure: &str,
        schema: Option<&str>,
        inputs: &Map<String, JsonValue>,
        output_names: &[String],
    ) -> DbResult<ProcedureOutcome> {
        let declared = if output_names.is_empty() {
            Vec::new()
        } else {
            self.schema
                .get_procedure_parameters(target, procedure, schema)
                .await?
        };
        let outputs = resolve_outputs(procedure, &declared, output_names)?;

        let stmt = build_exec(procedure, schema, inputs, &outputs)?;
        let mut result_sets = self.executor.query(target, &stmt).await?;

        let output_parameters = if outputs.is_empty() {
            None
        } else {
            Some(
                result_sets
                    .pop()
                    .and_then(|set| set.rows.into_iter().next())
                    .unwrap_or_default(),
            )
        };

        info!(
            database = %target,
            procedure,
            result_sets = result_sets.len(),
            outputs = outputs.len(),
            "Executed stored procedure"
        );
        Ok(ProcedureOutcome {
            result_sets,
            output_parameters,
        })
    }

    /// Parameters and definition of a stored procedure.
    pub async fn info(
        &self,
        target: DatabaseTarget,
        procedure: &str,
        schema: Option<&str>,
    ) -> DbResult<ProcedureInfo> {
        let schema = schema_or_default(schema);
        let parameters = self
            .schema
            .get_procedure_parameters(target, procedure, Some(schema))
            .await?;
        let definition = self
            .schema
            .get_definition(target, ObjectKind::Procedures, procedure, Some(schema))
            .await?;
        Ok(ProcedureInfo {
            schema: schema.to_string(),
            name: procedure.to_string(),
            parameters,
            definition,
        })
    }
}

fn resolve_outputs<'a>(
    procedure: &str,
    declared: &'a [ProcedureParameter],
    output_names: &[String],
) -> DbResult<Vec<&'a ProcedureParameter>> {
    let mut outputs: Vec<&ProcedureParameter> = Vec::with_capacity(output_names.len());
    for requested in output_names {
        let key = normalize_name(requested);
        let param = declared
            .iter()
            .find(|p| p.name.to_lowercase() == key)
            .ok_or_else(|| {
                DbError::validation(format!("Procedure '{procedure}' has no parameter @{key}"))
            })?;
        if !param.is_output() {
            return Err(DbError::validation(format!(
                "Parameter @{} of '{procedure}' is not declared OUTPUT",
                param.name
            )));
        }
        if !outputs.iter().any(|o| o.name == param.name) {
            outputs.push(param);
        }
    }
    Ok(outputs)
}
