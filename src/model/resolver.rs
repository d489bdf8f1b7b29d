//! Build the resolved model from the catalog.

use crate::error::CatalogError;
use crate::model::resolved::{ColumnInfo, IncludeDirection, IncludeSpec, PkType, ResolvedEntity, ResolvedModel};
use crate::model::types::*;
use crate::model::validate;
use std::collections::{HashMap, HashSet};

/// Build resolved model from the catalog (validates first).
pub fn resolve(catalog: &Catalog) -> Result<ResolvedModel, CatalogError> {
    validate(catalog)?;

    let tables_by_name: HashMap<&str, &TableConfig> =
        catalog.tables.iter().map(|t| (t.name.as_str(), t)).collect();
    let table_to_path: HashMap<&str, &str> = catalog
        .api_entities
        .iter()
        .map(|api| (api.table.as_str(), api.path_segment.as_str()))
        .collect();

    let mut entities = Vec::with_capacity(catalog.api_entities.len());
    for api in &catalog.api_entities {
        let table = tables_by_name
            .get(api.table.as_str())
            .ok_or_else(|| CatalogError::MissingReference {
                kind: "table",
                id: api.table.clone(),
            })?;
        let pk_col = table
            .columns
            .iter()
            .find(|c| c.name == table.primary_key)
            .ok_or_else(|| CatalogError::InvalidPrimaryKey {
                table: table.name.clone(),
                column: table.primary_key.clone(),
            })?;
        let pk_type = infer_pk_type(pk_col);

        let mut columns: Vec<ColumnInfo> = table
            .columns
            .iter()
            .map(|c| ColumnInfo {
                name: c.name.clone(),
                column_type: c.type_,
                pk_type: if c.name == table.primary_key { Some(pk_type) } else { None },
                nullable: c.nullable,
                has_default: c.default.is_some(),
                references: c
                    .references
                    .as_ref()
                    .and_then(|fk| table_to_path.get(fk.table.as_str()))
                    .map(|p| (*p).to_string()),
            })
            .collect();

        let declared: HashSet<String> = columns.iter().map(|c| c.name.clone()).collect();
        for name in ["created_at", "updated_at"] {
            if !declared.contains(name) {
                columns.push(ColumnInfo {
                    name: name.to_string(),
                    column_type: ColumnType::Timestamptz,
                    pk_type: None,
                    nullable: false,
                    has_default: true,
                    references: None,
                });
            }
        }

        let includes = build_includes_for_table(table, &catalog.tables, &table_to_path);
        entities.push(ResolvedEntity {
            schema_name: catalog.schema.clone(),
            table_name: table.name.clone(),
            path_segment: api.path_segment.clone(),
            pk_column: table.primary_key.clone(),
            pk_type,
            columns,
            operations: api.operations.clone(),
            scope: api.scope.clone(),
            sensitive_columns: api.sensitive_columns.iter().cloned().collect(),
            read_only_columns: api.read_only_columns.iter().cloned().collect(),
            search_columns: api.search_columns.clone(),
            order_by: api.order_by.clone(),
            includes,
            validation: api.validation.clone(),
        });
    }

    Ok(ResolvedModel::new(catalog.schema.clone(), entities))
}

/// To-one includes from our foreign keys, to-many includes from foreign keys pointing at us.
fn build_includes_for_table(
    ours: &TableConfig,
    tables: &[TableConfig],
    table_to_path: &HashMap<&str, &str>,
) -> Vec<IncludeSpec> {
    let mut includes = Vec::new();
    for col in &ours.columns {
        let Some(fk) = &col.references else { continue };
        let Some(related_path) = table_to_path.get(fk.table.as_str()) else { continue };
        includes.push(IncludeSpec {
            name: fk.include_as.clone(),
            direction: IncludeDirection::ToOne,
            related_path_segment: (*related_path).to_string(),
            our_key_column: col.name.clone(),
            their_key_column: fk.column.clone(),
        });
    }
    for other in tables {
        let Some(related_path) = table_to_path.get(other.name.as_str()) else { continue };
        for col in &other.columns {
            let Some(fk) = &col.references else { continue };
            if fk.table != ours.name {
                continue;
            }
            includes.push(IncludeSpec {
                name: fk.inverse_as.clone(),
                direction: IncludeDirection::ToMany,
                related_path_segment: (*related_path).to_string(),
                our_key_column: fk.column.clone(),
                their_key_column: col.name.clone(),
            });
        }
    }
    includes
}

fn infer_pk_type(col: &ColumnConfig) -> PkType {
    match col.type_ {
        ColumnType::Uuid => PkType::Uuid,
        _ => PkType::Ulid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::catalog;

    #[test]
    fn resolves_every_api_entity() {
        let model = resolve(&catalog("autonomy")).unwrap();
        for path in ["users", "realms", "realm_members", "signals", "clusters", "cluster_signals", "syntheses"] {
            assert!(model.entity_by_path(path).is_some(), "missing {}", path);
        }
        assert!(model.entity_by_path("nope").is_none());
    }

    #[test]
    fn pk_types_follow_column_type() {
        let model = resolve(&catalog("autonomy")).unwrap();
        assert_eq!(model.entity_by_path("users").unwrap().pk_type, PkType::Uuid);
        assert_eq!(model.entity_by_path("signals").unwrap().pk_type, PkType::Ulid);
    }

    #[test]
    fn bookkeeping_timestamps_are_added() {
        let model = resolve(&catalog("autonomy")).unwrap();
        let signals = model.entity_by_path("signals").unwrap();
        let created = signals.column("created_at").unwrap();
        assert!(created.has_default);
        assert!(!created.nullable);
        assert!(signals.writable_columns().all(|c| !c.is_timestamp_bookkeeping()));
    }

    #[test]
    fn self_reference_yields_parent_and_children() {
        let model = resolve(&catalog("autonomy")).unwrap();
        let clusters = model.entity_by_path("clusters").unwrap();
        let parent = clusters.include("parent").unwrap();
        assert_eq!(parent.direction, IncludeDirection::ToOne);
        assert_eq!(parent.our_key_column, "parent_cluster_id");
        let children = clusters.include("children").unwrap();
        assert_eq!(children.direction, IncludeDirection::ToMany);
        assert_eq!(children.their_key_column, "parent_cluster_id");
        assert_eq!(children.related_path_segment, "clusters");
    }

    #[test]
    fn sensitive_and_read_only_columns_are_not_writable() {
        let model = resolve(&catalog("autonomy")).unwrap();
        let users = model.entity_by_path("users").unwrap();
        assert!(users.writable_columns().all(|c| c.name != "password_hash"));
        let syntheses = model.entity_by_path("syntheses").unwrap();
        let writable: Vec<&str> = syntheses.writable_columns().map(|c| c.name.as_str()).collect();
        assert!(!writable.contains(&"history"));
        assert!(writable.contains(&"content"));
    }
}
