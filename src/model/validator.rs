//! Catalog validation: referential integrity and API consistency.

use crate::error::CatalogError;
use crate::model::Catalog;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Lowercase SQL identifier; everything the SQL builder quotes comes from names that pass this.
pub fn is_identifier(s: &str) -> bool {
    Regex::new(r"^[a-z_][a-z0-9_]{0,62}$")
        .map(|re| re.is_match(s))
        .unwrap_or(false)
}

pub fn validate(catalog: &Catalog) -> Result<(), CatalogError> {
    if !is_identifier(&catalog.schema) {
        return Err(CatalogError::InvalidIdentifier(catalog.schema.clone()));
    }

    let columns_by_table: HashMap<&str, HashSet<&str>> = catalog
        .tables
        .iter()
        .map(|t| (t.name.as_str(), t.columns.iter().map(|c| c.name.as_str()).collect()))
        .collect();

    for t in &catalog.tables {
        if !is_identifier(&t.name) {
            return Err(CatalogError::InvalidIdentifier(t.name.clone()));
        }
        let own = &columns_by_table[t.name.as_str()];
        if !own.contains(t.primary_key.as_str()) {
            return Err(CatalogError::InvalidPrimaryKey {
                table: t.name.clone(),
                column: t.primary_key.clone(),
            });
        }
        for c in &t.columns {
            if !is_identifier(&c.name) {
                return Err(CatalogError::InvalidIdentifier(c.name.clone()));
            }
            if let Some(fk) = &c.references {
                let target = columns_by_table.get(fk.table.as_str()).ok_or_else(|| {
                    CatalogError::MissingReference {
                        kind: "table",
                        id: fk.table.clone(),
                    }
                })?;
                if !target.contains(fk.column.as_str()) {
                    return Err(CatalogError::MissingReference {
                        kind: "column",
                        id: format!("{}.{}", fk.table, fk.column),
                    });
                }
            }
        }
        for group in &t.unique {
            for col in group {
                if !own.contains(col.as_str()) {
                    return Err(CatalogError::MissingReference {
                        kind: "unique column",
                        id: format!("{}.{}", t.name, col),
                    });
                }
            }
        }
        for idx in &t.indexes {
            for col in &idx.columns {
                if !own.contains(col.as_str()) {
                    return Err(CatalogError::MissingReference {
                        kind: "index column",
                        id: format!("{}.{}", t.name, col),
                    });
                }
            }
        }
    }

    let mut path_segments = HashSet::new();
    for api in &catalog.api_entities {
        let cols = columns_by_table.get(api.table.as_str()).ok_or_else(|| CatalogError::MissingReference {
            kind: "table",
            id: api.table.clone(),
        })?;
        if !path_segments.insert(api.path_segment.as_str()) {
            return Err(CatalogError::DuplicatePathSegment(api.path_segment.clone()));
        }
        let known = |name: &str| cols.contains(name) || name == "created_at" || name == "updated_at";
        let named = api
            .validation
            .keys()
            .map(String::as_str)
            .chain(api.sensitive_columns.iter().map(String::as_str))
            .chain(api.read_only_columns.iter().map(String::as_str))
            .chain(api.search_columns.iter().map(String::as_str))
            .chain(std::iter::once(api.order_by.0.as_str()));
        for col in named {
            if !known(col) {
                return Err(CatalogError::UnknownRuleColumn {
                    entity: api.path_segment.clone(),
                    column: col.to_string(),
                });
            }
        }
        if let crate::model::Scope::Realm(col) = &api.scope {
            if !cols.contains(col.as_str()) {
                return Err(CatalogError::UnknownRuleColumn {
                    entity: api.path_segment.clone(),
                    column: col.clone(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{catalog, ValidationRule};

    #[test]
    fn builtin_catalog_is_valid() {
        validate(&catalog("autonomy")).unwrap();
    }

    #[test]
    fn rejects_bad_schema_name() {
        let err = validate(&catalog("Robert'); DROP")).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidIdentifier(_)));
    }

    #[test]
    fn rejects_dangling_foreign_key() {
        let mut c = catalog("autonomy");
        c.tables.retain(|t| t.name != "users");
        let err = validate(&c).unwrap_err();
        assert!(matches!(err, CatalogError::MissingReference { kind: "table", .. }));
    }

    #[test]
    fn rejects_duplicate_path_segment() {
        let mut c = catalog("autonomy");
        let dup = c.api_entities[0].clone();
        c.api_entities.push(dup);
        assert!(matches!(validate(&c).unwrap_err(), CatalogError::DuplicatePathSegment(_)));
    }

    #[test]
    fn rejects_rule_for_unknown_column() {
        let mut c = catalog("autonomy");
        c.api_entities[0]
            .validation
            .insert("nickname".into(), ValidationRule::max_length(10));
        assert!(matches!(validate(&c).unwrap_err(), CatalogError::UnknownRuleColumn { .. }));
    }
}
