//! Schema-related data models.
//!
//! Descriptors returned by catalog introspection. All of them serialize to
//! the flat shapes exposed by the schema tools and resources.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Default schema when a caller omits one.
pub const DEFAULT_SCHEMA: &str = "dbo";

/// A relational table or view, keyed by (schema, name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub schema: String,
    pub name: String,
}

impl TableDescriptor {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// `schema.name` display form.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

impl Ord for TableDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.schema, &self.name).cmp(&(&other.schema, &other.name))
    }
}

impl PartialOrd for TableDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One column of a table, ordered by ordinal position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// -1 for MAX types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_precision: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_scale: Option<i64>,
    pub ordinal_position: i64,
}

/// A stored procedure or view. The definition is fetched only on request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineDescriptor {
    pub schema: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

/// A DML trigger and the table it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDescriptor {
    pub name: String,
    pub table: String,
    pub schema: String,
    pub is_disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryKeyColumn {
    pub column_name: String,
    pub constraint_name: String,
    pub ordinal_position: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub constraint_name: String,
    pub schema: String,
    pub table: String,
    pub column_name: String,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_column: String,
    /// e.g. NO_ACTION, CASCADE
    pub on_delete: String,
    pub on_update: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub index_name: String,
    /// CLUSTERED, NONCLUSTERED, ...
    pub index_type: String,
    pub is_unique: bool,
    pub is_primary_key: bool,
    pub columns: Vec<String>,
}

/// Full description of one table: columns plus keys, indexes and size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDetails {
    pub schema: String,
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
    pub primary_keys: Vec<PrimaryKeyColumn>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<IndexInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<i64>,
}

/// One parameter of a stored procedure, as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureParameter {
    /// Name without the leading `@`
    pub name: String,
    pub data_type: String,
    /// IN, OUT or INOUT
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_precision: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_scale: Option<i64>,
    pub ordinal_position: i64,
}

impl ProcedureParameter {
    pub fn is_output(&self) -> bool {
        self.mode.eq_ignore_ascii_case("OUT") || self.mode.eq_ignore_ascii_case("INOUT")
    }

    /// Type text usable in a `DECLARE`, e.g. `nvarchar(50)` or `decimal(10,2)`.
    pub fn declared_type(&self) -> String {
        let base = self.data_type.to_ascii_lowercase();
        match base.as_str() {
            "char" | "varchar" | "nchar" | "nvarchar" | "binary" | "varbinary" => {
                match self.max_length {
                    Some(-1) => format!("{base}(max)"),
                    Some(len) if len > 0 => format!("{base}({len})"),
                    _ => base,
                }
            }
            "decimal" | "numeric" => match (self.numeric_precision, self.numeric_scale) {
                (Some(p), Some(s)) => format!("{base}({p},{s})"),
                _ => base,
            },
            _ => base,
        }
    }
}

/// Database-level facts reported by `get_schema` with `object_type = all`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub database_name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edition: Option<String>,
}

/// Catalog object kinds addressable by resources and definition lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Tables,
    Views,
    Procedures,
    Triggers,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 4] = [
        ObjectKind::Tables,
        ObjectKind::Views,
        ObjectKind::Procedures,
        ObjectKind::Triggers,
    ];

    /// Plural URI segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tables => "tables",
            Self::Views => "views",
            Self::Procedures => "procedures",
            Self::Triggers => "triggers",
        }
    }

    pub fn singular(&self) -> &'static str {
        match self {
            Self::Tables => "table",
            Self::Views => "view",
            Self::Procedures => "procedure",
            Self::Triggers => "trigger",
        }
    }

    pub fn parse(segment: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(segment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(data_type: &str, len: Option<i64>, p: Option<i64>, s: Option<i64>) -> ProcedureParameter {
        ProcedureParameter {
            name: "x".into(),
            data_type: data_type.into(),
            mode: "OUT".into(),
            max_length: len,
            numeric_precision: p,
            numeric_scale: s,
            ordinal_position: 1,
        }
    }

    #[test]
    fn test_table_descriptor_ordering() {
        let mut tables = vec![
            TableDescriptor::new("App", "User"),
            TableDescriptor::new("App", "Client"),
            TableDescriptor::new("Admin", "Zone"),
        ];
        tables.sort();
        let names: Vec<_> = tables.iter().map(|t| t.qualified_name()).collect();
        assert_eq!(names, ["Admin.Zone", "App.Client", "App.User"]);
    }

    #[test]
    fn test_declared_type() {
        assert_eq!(param("nvarchar", Some(50), None, None).declared_type(), "nvarchar(50)");
        assert_eq!(param("VARCHAR", Some(-1), None, None).declared_type(), "varchar(max)");
        assert_eq!(param("decimal", None, Some(10), Some(2)).declared_type(), "decimal(10,2)");
        assert_eq!(param("int", None, Some(10), Some(0)).declared_type(), "int");
    }

    #[test]
    fn test_parameter_mode() {
        assert!(param("int", None, None, None).is_output());
        let mut p = param("int", None, None, None);
        p.mode = "IN".into();
        assert!(!p.is_output());
    }

    #[test]
    fn test_object_kind_parse() {
        assert_eq!(ObjectKind::parse("Views"), Some(ObjectKind::Views));
        assert_eq!(ObjectKind::parse("functions"), None);
        assert_eq!(ObjectKind::Procedures.singular(), "procedure");
    }
}
