//! Resolved entity model: catalog validated and flattened for runtime use.

use crate::model::{ColumnType, Operation, Scope, SortDirection, ValidationRule};
use std::collections::{HashMap, HashSet};

/// Direction of a related-include: to_one (we have FK to them) or to_many (they have FK to us).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IncludeDirection {
    ToOne,
    ToMany,
}

/// Spec for including a related entity in list/read responses (`?include=name1,name2`).
#[derive(Clone, Debug)]
pub struct IncludeSpec {
    pub name: String,
    pub direction: IncludeDirection,
    /// Path segment of the related entity (for lookup in model).
    pub related_path_segment: String,
    /// Our column used in the join (our FK for to_one; our PK for to_many).
    pub our_key_column: String,
    /// Their column used in the join (their PK for to_one; their FK for to_many).
    pub their_key_column: String,
}

/// Primary key kind for parsing path ids and generating new ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkType {
    /// Database-generated UUID.
    Uuid,
    /// Application-generated ULID stored as text.
    Ulid,
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: ColumnType,
    pub pk_type: Option<PkType>,
    pub nullable: bool,
    /// Whether the column has a DB default (e.g. gen_random_uuid(), NOW()).
    pub has_default: bool,
    /// Path segment of the referenced entity, for foreign keys.
    pub references: Option<String>,
}

impl ColumnInfo {
    /// PostgreSQL type name for `$n::type` casts.
    pub fn pg_type(&self) -> &'static str {
        self.column_type.sql()
    }

    /// Maintained by the database on every write.
    pub fn is_timestamp_bookkeeping(&self) -> bool {
        self.name == "created_at" || self.name == "updated_at"
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub schema_name: String,
    pub table_name: String,
    pub path_segment: String,
    pub pk_column: String,
    pub pk_type: PkType,
    pub columns: Vec<ColumnInfo>,
    pub operations: Vec<Operation>,
    pub scope: Scope,
    /// Column names to strip from all API responses (sensitive data).
    pub sensitive_columns: HashSet<String>,
    pub read_only_columns: HashSet<String>,
    pub search_columns: Vec<String>,
    pub order_by: (String, SortDirection),
    /// Available includes (related entities). Built from foreign keys.
    pub includes: Vec<IncludeSpec>,
    pub validation: HashMap<String, ValidationRule>,
}

impl ResolvedEntity {
    pub fn allows(&self, op: Operation) -> bool {
        self.operations.contains(&op)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Column holding the owning realm id, when the entity is tenant-scoped.
    pub fn scope_column(&self) -> Option<&str> {
        match &self.scope {
            Scope::Realm(col) => Some(col.as_str()),
            Scope::Unscoped => None,
        }
    }

    /// Columns a client may set in a request body.
    pub fn writable_columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter().filter(move |c| {
            c.pk_type.is_none()
                && !c.is_timestamp_bookkeeping()
                && !self.sensitive_columns.contains(&c.name)
                && !self.read_only_columns.contains(&c.name)
        })
    }

    pub fn include(&self, name: &str) -> Option<&IncludeSpec> {
        self.includes.iter().find(|i| i.name == name)
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedModel {
    pub schema_name: String,
    pub entities: Vec<ResolvedEntity>,
    entity_by_path: HashMap<String, usize>,
}

impl ResolvedModel {
    pub fn new(schema_name: String, entities: Vec<ResolvedEntity>) -> Self {
        let entity_by_path = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.path_segment.clone(), i))
            .collect();
        ResolvedModel {
            schema_name,
            entities,
            entity_by_path,
        }
    }

    pub fn entity_by_path(&self, path: &str) -> Option<&ResolvedEntity> {
        self.entity_by_path.get(path).map(|&i| &self.entities[i])
    }

    /// Schema-qualified, quoted table name.
    pub fn table(&self, table: &str) -> String {
        crate::sql::qualified_table(&self.schema_name, table)
    }
}
