//! Declarative table and API entity types. The catalog in `catalog.rs` is written in these.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Column types the catalog uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Uuid,
    Text,
    Integer,
    BigInt,
    Double,
    Boolean,
    Jsonb,
    Timestamptz,
}

impl ColumnType {
    /// PostgreSQL type name, usable both in DDL and in `$n::type` casts.
    pub fn sql(self) -> &'static str {
        match self {
            ColumnType::Uuid => "uuid",
            ColumnType::Text => "text",
            ColumnType::Integer => "integer",
            ColumnType::BigInt => "bigint",
            ColumnType::Double => "double precision",
            ColumnType::Boolean => "boolean",
            ColumnType::Jsonb => "jsonb",
            ColumnType::Timestamptz => "timestamptz",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::BigInt | ColumnType::Double)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ColumnDefault {
    /// Quoted as a SQL string literal.
    Literal(String),
    /// Emitted as-is (e.g. `NOW()`, `gen_random_uuid()`, `'{}'::jsonb`).
    Expression(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferentialAction {
    Cascade,
    SetNull,
    Restrict,
    NoAction,
}

impl ReferentialAction {
    pub fn sql(self) -> &'static str {
        match self {
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::NoAction => "NO ACTION",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub on_delete: ReferentialAction,
    /// Include name on this table's rows for the referenced row (to-one).
    pub include_as: String,
    /// Include name on the referenced table's rows for rows of this table (to-many).
    pub inverse_as: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ColumnType,
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<ColumnDefault>,
    #[serde(default)]
    pub references: Option<ForeignKey>,
    #[serde(default)]
    pub unique: bool,
}

impl ColumnConfig {
    pub fn new(name: &str, type_: ColumnType) -> Self {
        ColumnConfig {
            name: name.to_string(),
            type_,
            nullable: true,
            default: None,
            references: None,
            unique: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_expr(mut self, expression: &str) -> Self {
        self.default = Some(ColumnDefault::Expression(expression.to_string()));
        self
    }

    pub fn default_literal(mut self, literal: &str) -> Self {
        self.default = Some(ColumnDefault::Literal(literal.to_string()));
        self
    }

    pub fn references(
        mut self,
        table: &str,
        on_delete: ReferentialAction,
        include_as: &str,
        inverse_as: &str,
    ) -> Self {
        self.references = Some(ForeignKey {
            table: table.to_string(),
            column: "id".to_string(),
            on_delete,
            include_as: include_as.to_string(),
            inverse_as: inverse_as.to_string(),
        });
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableCheck {
    pub name: String,
    pub expression: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexConfig {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    pub primary_key: String,
    pub columns: Vec<ColumnConfig>,
    #[serde(default)]
    pub unique: Vec<Vec<String>>,
    #[serde(default)]
    pub check: Vec<TableCheck>,
    #[serde(default)]
    pub indexes: Vec<IndexConfig>,
}

/// Expected JSON shape for a jsonb column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonShape {
    Object,
    Array,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub json: Option<JsonShape>,
}

impl ValidationRule {
    pub fn format(format: &str) -> Self {
        ValidationRule {
            format: Some(format.to_string()),
            ..Default::default()
        }
    }

    pub fn length(min: u32, max: u32) -> Self {
        ValidationRule {
            min_length: Some(min),
            max_length: Some(max),
            ..Default::default()
        }
    }

    pub fn max_length(max: u32) -> Self {
        ValidationRule {
            max_length: Some(max),
            ..Default::default()
        }
    }

    pub fn range(minimum: f64, maximum: f64) -> Self {
        ValidationRule {
            minimum: Some(minimum),
            maximum: Some(maximum),
            ..Default::default()
        }
    }

    pub fn one_of(values: &[&str]) -> Self {
        ValidationRule {
            allowed: Some(values.iter().map(|v| serde_json::Value::String((*v).to_string())).collect()),
            ..Default::default()
        }
    }

    pub fn json(shape: JsonShape) -> Self {
        ValidationRule {
            json: Some(shape),
            ..Default::default()
        }
    }

    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [Operation::Create, Operation::Read, Operation::Update, Operation::Delete];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// How rows of an entity are scoped to tenants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    /// Rows belong to the realm whose id is in the named column.
    Realm(String),
    /// Not tenant-scoped; only reachable through the admin API or domain services.
    Unscoped,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiEntityConfig {
    pub table: String,
    pub path_segment: String,
    pub operations: Vec<Operation>,
    pub scope: Scope,
    /// Column names that must never be exposed in API responses or written by clients.
    #[serde(default)]
    pub sensitive_columns: Vec<String>,
    /// Columns maintained by the server; clients may read but not write them.
    #[serde(default)]
    pub read_only_columns: Vec<String>,
    /// Columns matched by the `q` search parameter.
    #[serde(default)]
    pub search_columns: Vec<String>,
    pub order_by: (String, SortDirection),
    #[serde(default)]
    pub validation: HashMap<String, ValidationRule>,
}

/// All tables and API entities of the service.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// PostgreSQL schema that holds every table.
    pub schema: String,
    pub tables: Vec<TableConfig>,
    pub api_entities: Vec<ApiEntityConfig>,
}
