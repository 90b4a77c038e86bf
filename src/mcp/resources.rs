//! Catalog objects exposed as MCP resources.
//!
//! URIs have the form `ssms://<target>/<kind>/<schema>/<name>`, where kind
//! is one of `tables`, `views`, `procedures` or `triggers`. When reading,
//! the object may also be written `<schema>.<name>` or as a bare `<name>`
//! in the `dbo` schema.

use crate::db::{CrudOperations, SchemaIntrospector, SqlExecutor};
use crate::error::{DbError, DbResult};
use crate::models::{DEFAULT_SCHEMA, DatabaseTarget, ObjectKind, RESOURCE_SAMPLE_ROWS};
use crate::tools::sql_validator::validate_identifier;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, warn};

pub const URI_SCHEME: &str = "ssms://";

const JSON_MIME: &str = "application/json";
const TEXT_MIME: &str = "text/plain";

/// A parsed resource URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub target: DatabaseTarget,
    pub kind: ObjectKind,
    /// `None` only for a bare trigger name, which matches triggers in any schema
    pub schema: Option<String>,
    pub name: String,
}

impl ResourceRef {
    pub fn new(
        target: DatabaseTarget,
        kind: ObjectKind,
        schema: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            target,
            kind,
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Schema used for display and for kinds that always need one.
    pub fn schema_name(&self) -> &str {
        self.schema.as_deref().unwrap_or(DEFAULT_SCHEMA)
    }

    pub fn uri(&self) -> String {
        match &self.schema {
            Some(schema) => format!(
                "{URI_SCHEME}{}/{}/{}/{}",
                self.target,
                self.kind.as_str(),
                schema,
                self.name
            ),
            None => format!("{URI_SCHEME}{}/{}/{}", self.target, self.kind.as_str(), self.name),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self.kind {
            ObjectKind::Tables => JSON_MIME,
            _ => TEXT_MIME,
        }
    }

    /// Parse `ssms://target/kind/...`.
    pub fn parse(uri: &str) -> DbResult<Self> {
        let malformed = || DbError::not_found(format!("resource '{uri}'"));

        let rest = uri
            .get(..URI_SCHEME.len())
            .filter(|scheme| scheme.eq_ignore_ascii_case(URI_SCHEME))
            .map(|_| &uri[URI_SCHEME.len()..])
            .ok_or_else(malformed)?;

        let mut segments = rest.splitn(3, '/');
        let target: DatabaseTarget = segments.next().ok_or_else(malformed)?.parse()?;
        let kind_segment = segments.next().ok_or_else(malformed)?;
        let kind = ObjectKind::parse(kind_segment)
            .ok_or_else(|| DbError::not_found(format!("resource kind '{kind_segment}'")))?;
        let object = segments.next().ok_or_else(malformed)?;

        let (schema, name) = match object.split_once('/') {
            Some((schema, name)) => (Some(schema), name),
            None => match object.split_once('.') {
                Some((schema, name)) => (Some(schema), name),
                // Triggers are found by name alone; other kinds live in dbo
                None if kind == ObjectKind::Triggers => (None, object),
                None => (Some(DEFAULT_SCHEMA), object),
            },
        };
        if schema.is_some_and(str::is_empty) || name.is_empty() || name.contains('/') {
            return Err(malformed());
        }
        if let Some(schema) = schema {
            validate_identifier(schema, "schema")?;
        }
        validate_identifier(name, kind.singular())?;

        Ok(Self {
            target,
            kind,
            schema: schema.map(str::to_string),
            name: name.to_string(),
        })
    }
}

/// One entry of the resource listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceEntry {
    pub uri: String,
    /// `schema.name`
    pub name: String,
    pub description: String,
    pub mime_type: String,
}

impl ResourceEntry {
    fn from_ref(r: &ResourceRef, description: String) -> Self {
        Self {
            uri: r.uri(),
            name: format!("{}.{}", r.schema_name(), r.name),
            description,
            mime_type: r.mime_type().to_string(),
        }
    }
}

/// Contents of a read resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceBody {
    pub uri: String,
    pub mime_type: &'static str,
    pub text: String,
}

#[derive(Clone)]
pub struct ResourceRegistry {
    schema: SchemaIntrospector,
    crud: CrudOperations,
}

impl ResourceRegistry {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self {
            schema: SchemaIntrospector::new(executor.clone()),
            crud: CrudOperations::new(executor),
        }
    }

    /// Every table, view, procedure and trigger of both targets.
    ///
    /// A target that cannot be listed is skipped with a warning.
    pub async fn list(&self) -> Vec<ResourceEntry> {
        let mut entries = Vec::new();
        for target in DatabaseTarget::ALL {
            match self.list_target(target).await {
                Ok(found) => entries.extend(found),
                Err(e) => warn!(
                    database = %target,
                    error = %e,
                    "Skipping database in resource listing"
                ),
            }
        }
        entries
    }

    async fn list_target(&self, target: DatabaseTarget) -> DbResult<Vec<ResourceEntry>> {
        let mut entries = Vec::new();

        for table in self.schema.list_tables(target).await? {
            let r = ResourceRef::new(target, ObjectKind::Tables, table.schema, table.name);
            let description = format!("Columns, keys, indexes and sample rows of table {}.{} in {target}", r.schema_name(), r.name);
            entries.push(ResourceEntry::from_ref(&r, description));
        }
        for view in self.schema.list_views(target, false).await? {
            let r = ResourceRef::new(target, ObjectKind::Views, view.schema, view.name);
            let description = format!("Definition of view {}.{} in {target}", r.schema_name(), r.name);
            entries.push(ResourceEntry::from_ref(&r, description));
        }
        for procedure in self.schema.list_procedures(target, false).await? {
            let r = ResourceRef::new(target, ObjectKind::Procedures, procedure.schema, procedure.name);
            let description = format!("Definition of stored procedure {}.{} in {target}", r.schema_name(), r.name);
            entries.push(ResourceEntry::from_ref(&r, description));
        }
        for trigger in self.schema.list_triggers(target, false).await? {
            let description = format!(
                "Definition of trigger {} on {}.{} in {target}",
                trigger.name, trigger.schema, trigger.table
            );
            let r = ResourceRef::new(target, ObjectKind::Triggers, trigger.schema, trigger.name);
            entries.push(ResourceEntry::from_ref(&r, description));
        }

        debug!(database = %target, count = entries.len(), "Listed resources");
        Ok(entries)
    }

    /// Read one resource by URI.
    pub async fn read(&self, uri: &str) -> DbResult<ResourceBody> {
        let r = ResourceRef::parse(uri)?;
        let text = match r.kind {
            ObjectKind::Tables => self.table_document(&r).await?,
            kind => {
                self.schema
                    .get_definition(r.target, kind, &r.name, r.schema.as_deref())
                    .await?
            }
        };
        Ok(ResourceBody {
            uri: uri.to_string(),
            mime_type: r.mime_type(),
            text,
        })
    }

    async fn table_document(&self, r: &ResourceRef) -> DbResult<String> {
        let details = self
            .schema
            .get_table_details(r.target, &r.name, Some(r.schema_name()))
            .await?;
        if details.columns.is_empty() {
            return Err(DbError::not_found(format!(
                "table {}.{} in {}",
                r.schema_name(),
                r.name,
                r.target
            )));
        }
        let sample = self
            .crud
            .query_page(r.target, &r.name, Some(r.schema_name()), RESOURCE_SAMPLE_ROWS, 0)
            .await?;

        let mut document = serde_json::to_value(&details)
            .map_err(|e| DbError::internal(format!("Failed to encode table details: {e}")))?;
        if let JsonValue::Object(map) = &mut document {
            map.insert(
                "sample_rows".to_string(),
                JsonValue::Array(sample.rows.into_iter().map(JsonValue::Object).collect()),
            );
        }
        serde_json::to_string_pretty(&document)
            .map_err(|e| DbError::internal(format!("Failed to encode table details: {e}")))
    }
}
