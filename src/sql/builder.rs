//! Builds parameterized INSERT, SELECT, UPDATE, DELETE from resolved entity.

use crate::model::{ColumnInfo, IncludeDirection, ResolvedEntity};
use crate::sql::PgBindValue;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Maximum page size for list queries.
pub const MAX_LIMIT: u32 = 1000;
pub const DEFAULT_LIMIT: u32 = 50;

/// Describes one include for a single-query select: name, direction, related entity, our key column, their key column.
pub struct IncludeSelect<'a> {
    pub name: &'a str,
    pub direction: IncludeDirection,
    pub related: &'a ResolvedEntity,
    pub our_key: &'a str,
    pub their_key: &'a str,
}

/// Quote identifier for PostgreSQL (safe: only from the catalog).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: PgBindValue) -> usize {
        self.params.push(v);
        self.params.len()
    }

    /// Push a value for a column and return its cast placeholder, e.g. `$3::timestamptz`.
    fn push_for_column(&mut self, col: &ColumnInfo, v: &Value) -> String {
        let n = self.push_param(PgBindValue::for_column(v, col.column_type));
        format!("${}::{}", n, col.pg_type())
    }
}

/// Filters, realm scope, search and paging for list queries.
#[derive(Clone, Debug, Default)]
pub struct ListQuery {
    /// Exact-match filters; columns not on the entity are ignored.
    pub filters: Vec<(String, Value)>,
    /// Inclusive ranges `(column, min, max)`.
    pub ranges: Vec<(String, Value, Value)>,
    /// Columns that must be non-null.
    pub not_null: Vec<String>,
    /// Restrict rows to these realms through the entity's scope column. `None` means unscoped.
    pub realm_scope: Option<Vec<Uuid>>,
    /// Case-insensitive substring over the entity's search columns.
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListQuery {
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

/// SELECT list of every column, optionally prefixed with a table alias. Sensitive columns are stripped on output.
fn select_column_list(entity: &ResolvedEntity, alias: Option<&str>) -> String {
    entity
        .columns
        .iter()
        .map(|c| match alias {
            Some(a) => format!("{}.{} AS {}", a, quoted(&c.name), quoted(&c.name)),
            None => quoted(&c.name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Columns safe to expose from a related row inside an include.
fn public_column_list(entity: &ResolvedEntity) -> String {
    entity
        .columns
        .iter()
        .filter(|c| !entity.sensitive_columns.contains(&c.name))
        .map(|c| quoted(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_ref(alias: Option<&str>, col: &str) -> String {
    match alias {
        Some(a) => format!("{}.{}", a, quoted(col)),
        None => quoted(col),
    }
}

/// `"realm_id" IN ($1::uuid, ...)`; an empty scope matches nothing.
fn scope_condition(
    entity: &ResolvedEntity,
    scope: Option<&[Uuid]>,
    alias: Option<&str>,
    q: &mut QueryBuf,
) -> Option<String> {
    let realms = scope?;
    let Some(col) = entity.scope_column() else {
        return Some("1 = 0".to_string());
    };
    if realms.is_empty() {
        return Some("1 = 0".to_string());
    }
    let placeholders: Vec<String> = realms
        .iter()
        .map(|r| format!("${}::uuid", q.push_param(PgBindValue::Uuid(*r))))
        .collect();
    Some(format!("{} IN ({})", column_ref(alias, col), placeholders.join(", ")))
}

/// Escape LIKE metacharacters and wrap for substring match.
fn like_pattern(term: &str) -> String {
    let escaped = term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{}%", escaped)
}

fn where_parts(entity: &ResolvedEntity, query: &ListQuery, alias: Option<&str>, q: &mut QueryBuf) -> Vec<String> {
    let mut parts = Vec::new();
    if let Some(cond) = scope_condition(entity, query.realm_scope.as_deref(), alias, q) {
        parts.push(cond);
    }
    for (col, val) in &query.filters {
        let Some(c) = entity.column(col) else { continue };
        if val.is_null() {
            parts.push(format!("{} IS NULL", column_ref(alias, col)));
        } else {
            let ph = q.push_for_column(c, val);
            parts.push(format!("{} = {}", column_ref(alias, col), ph));
        }
    }
    for (col, min, max) in &query.ranges {
        let Some(c) = entity.column(col) else { continue };
        let lo = q.push_for_column(c, min);
        let hi = q.push_for_column(c, max);
        parts.push(format!("{} BETWEEN {} AND {}", column_ref(alias, col), lo, hi));
    }
    for col in &query.not_null {
        if entity.has_column(col) {
            parts.push(format!("{} IS NOT NULL", column_ref(alias, col)));
        }
    }
    if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        if !entity.search_columns.is_empty() {
            let n = q.push_param(PgBindValue::String(like_pattern(term)));
            let ors: Vec<String> = entity
                .search_columns
                .iter()
                .map(|c| format!("{} ILIKE ${}", column_ref(alias, c), n))
                .collect();
            parts.push(format!("({})", ors.join(" OR ")));
        }
    }
    parts
}

fn where_clause(parts: &[String]) -> String {
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn order_clause(entity: &ResolvedEntity, alias: Option<&str>) -> String {
    let (col, dir) = &entity.order_by;
    format!(
        " ORDER BY {} {}, {} {}",
        column_ref(alias, col),
        dir.sql(),
        column_ref(alias, &entity.pk_column),
        dir.sql()
    )
}

fn paging_clause(query: &ListQuery) -> String {
    format!(" LIMIT {} OFFSET {}", query.effective_limit(), query.effective_offset())
}

/// SELECT list with filters, scope and search; ORDER BY the entity's default ordering then pk; LIMIT/OFFSET.
pub fn select_list(entity: &ResolvedEntity, query: &ListQuery) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&entity.schema_name, &entity.table_name);
    let parts = where_parts(entity, query, None, &mut q);
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}",
        select_column_list(entity, None),
        table,
        where_clause(&parts),
        order_clause(entity, None),
        paging_clause(query)
    );
    q
}

/// SELECT COUNT(*) with the same WHERE as `select_list`.
pub fn count_list(entity: &ResolvedEntity, query: &ListQuery) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&entity.schema_name, &entity.table_name);
    let parts = where_parts(entity, query, None, &mut q);
    q.sql = format!("SELECT COUNT(*) AS total FROM {}{}", table, where_clause(&parts));
    q
}

const MAIN_ALIAS: &str = "main";

fn include_subquery(inc: &IncludeSelect<'_>) -> String {
    let rel_table = qualified_table(&inc.related.schema_name, &inc.related.table_name);
    let rel_cols = public_column_list(inc.related);
    let sub_from = format!(
        "{} WHERE {} = {}.{}",
        rel_table,
        quoted(inc.their_key),
        MAIN_ALIAS,
        quoted(inc.our_key)
    );
    match inc.direction {
        IncludeDirection::ToOne => format!(
            "(SELECT row_to_json(sub) FROM (SELECT {} FROM {} LIMIT 1) sub)",
            rel_cols, sub_from
        ),
        IncludeDirection::ToMany => format!(
            "(SELECT COALESCE(json_agg(row_to_json(sub)), '[]'::json) FROM (SELECT {} FROM {}{}) sub)",
            rel_cols,
            sub_from,
            order_clause(inc.related, None)
        ),
    }
}

fn select_parts_with_includes(entity: &ResolvedEntity, includes: &[IncludeSelect<'_>]) -> String {
    let mut parts = vec![select_column_list(entity, Some(MAIN_ALIAS))];
    for inc in includes {
        parts.push(format!("{} AS {}", include_subquery(inc), quoted(inc.name)));
    }
    parts.join(", ")
}

/// SELECT list with includes in a single query: main table aliased as "main", each include as a scalar subquery
/// (json_agg for to_many, row_to_json for to_one).
pub fn select_list_with_includes(entity: &ResolvedEntity, query: &ListQuery, includes: &[IncludeSelect<'_>]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&entity.schema_name, &entity.table_name);
    let parts = where_parts(entity, query, Some(MAIN_ALIAS), &mut q);
    q.sql = format!(
        "SELECT {} FROM {} {}{}{}{}",
        select_parts_with_includes(entity, includes),
        table,
        MAIN_ALIAS,
        where_clause(&parts),
        order_clause(entity, Some(MAIN_ALIAS)),
        paging_clause(query)
    );
    q
}

fn id_condition(entity: &ResolvedEntity, id: &Value, alias: Option<&str>, q: &mut QueryBuf) -> String {
    let ph = match entity.column(&entity.pk_column) {
        Some(c) => q.push_for_column(c, id),
        None => format!("${}", q.push_param(PgBindValue::from_json(id))),
    };
    format!("{} = {}", column_ref(alias, &entity.pk_column), ph)
}

/// SELECT one row by primary key, optionally restricted to realms.
pub fn select_by_id(entity: &ResolvedEntity, id: &Value, scope: Option<&[Uuid]>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&entity.schema_name, &entity.table_name);
    let mut parts = vec![id_condition(entity, id, None, &mut q)];
    parts.extend(scope_condition(entity, scope, None, &mut q));
    q.sql = format!(
        "SELECT {} FROM {}{}",
        select_column_list(entity, None),
        table,
        where_clause(&parts)
    );
    q
}

/// SELECT one row by primary key with includes.
pub fn select_by_id_with_includes(
    entity: &ResolvedEntity,
    id: &Value,
    scope: Option<&[Uuid]>,
    includes: &[IncludeSelect<'_>],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&entity.schema_name, &entity.table_name);
    let mut parts = vec![id_condition(entity, id, Some(MAIN_ALIAS), &mut q)];
    parts.extend(scope_condition(entity, scope, Some(MAIN_ALIAS), &mut q));
    q.sql = format!(
        "SELECT {} FROM {} {}{}",
        select_parts_with_includes(entity, includes),
        table,
        MAIN_ALIAS,
        where_clause(&parts)
    );
    q
}

/// SELECT rows where `column` IN (values), in the entity's default order. Used for batch-loading related rows.
pub fn select_by_column_in(entity: &ResolvedEntity, column: &str, values: &[Value], scope: Option<&[Uuid]>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&entity.schema_name, &entity.table_name);
    let mut parts = Vec::new();
    match entity.column(column) {
        Some(c) if !values.is_empty() => {
            let placeholders: Vec<String> = values.iter().map(|v| q.push_for_column(c, v)).collect();
            parts.push(format!("{} IN ({})", quoted(column), placeholders.join(", ")));
        }
        _ => parts.push("1 = 0".to_string()),
    }
    parts.extend(scope_condition(entity, scope, None, &mut q));
    q.sql = format!(
        "SELECT {} FROM {}{}{}",
        select_column_list(entity, None),
        table,
        where_clause(&parts),
        order_clause(entity, None)
    );
    q
}

/// INSERT: columns and placeholders from entity; values from body.
/// Omits columns with DB default when body does not provide a value (so DB uses default).
pub fn insert(entity: &ResolvedEntity, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&entity.schema_name, &entity.table_name);
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &entity.columns {
        let val = match body.get(&c.name) {
            Some(v) => v,
            None if c.has_default || c.nullable => continue,
            None => &Value::Null,
        };
        placeholders.push(q.push_for_column(c, val));
        cols.push(quoted(&c.name));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        table,
        cols.join(", "),
        placeholders.join(", "),
        select_column_list(entity, None)
    );
    q
}

/// UPDATE by id: SET only columns present in body (and on the entity), always bumping updated_at.
pub fn update(entity: &ResolvedEntity, id: &Value, body: &Map<String, Value>, scope: Option<&[Uuid]>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&entity.schema_name, &entity.table_name);
    let mut sets = Vec::new();
    for c in &entity.columns {
        if c.pk_type.is_some() || c.is_timestamp_bookkeeping() {
            continue;
        }
        let Some(v) = body.get(&c.name) else { continue };
        let rhs = q.push_for_column(c, v);
        sets.push(format!("{} = {}", quoted(&c.name), rhs));
    }
    sets.push(format!("{} = NOW()", quoted("updated_at")));
    let mut parts = vec![id_condition(entity, id, None, &mut q)];
    parts.extend(scope_condition(entity, scope, None, &mut q));
    q.sql = format!(
        "UPDATE {} SET {}{} RETURNING {}",
        table,
        sets.join(", "),
        where_clause(&parts),
        select_column_list(entity, None)
    );
    q
}

/// DELETE by id, optionally restricted to realms.
pub fn delete(entity: &ResolvedEntity, id: &Value, scope: Option<&[Uuid]>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&entity.schema_name, &entity.table_name);
    let mut parts = vec![id_condition(entity, id, None, &mut q)];
    parts.extend(scope_condition(entity, scope, None, &mut q));
    q.sql = format!(
        "DELETE FROM {}{} RETURNING {}",
        table,
        where_clause(&parts),
        select_column_list(entity, None)
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{catalog, resolve, ResolvedModel};
    use serde_json::json;

    fn model() -> ResolvedModel {
        resolve(&catalog("autonomy")).unwrap()
    }

    #[test]
    fn scoped_list_restricts_to_realms_and_pages() {
        let m = model();
        let signals = m.entity_by_path("signals").unwrap();
        let query = ListQuery {
            realm_scope: Some(vec![Uuid::nil(), Uuid::new_v4()]),
            limit: Some(5000),
            ..Default::default()
        };
        let q = select_list(signals, &query);
        assert!(q.sql.contains(r#""realm_id" IN ($1::uuid, $2::uuid)"#), "{}", q.sql);
        assert!(q.sql.contains(r#"ORDER BY "occurred_at" DESC, "id" DESC"#));
        assert!(q.sql.ends_with("LIMIT 1000 OFFSET 0"));
        assert_eq!(q.params.len(), 2);
    }

    #[test]
    fn empty_scope_matches_nothing() {
        let m = model();
        let signals = m.entity_by_path("signals").unwrap();
        let query = ListQuery {
            realm_scope: Some(Vec::new()),
            ..Default::default()
        };
        assert!(count_list(signals, &query).sql.contains("WHERE 1 = 0"));
    }

    #[test]
    fn search_reuses_one_escaped_parameter() {
        let m = model();
        let clusters = m.entity_by_path("clusters").unwrap();
        let query = ListQuery {
            search: Some("50%_off".into()),
            ..Default::default()
        };
        let q = select_list(clusters, &query);
        assert!(q.sql.contains(r#"("name" ILIKE $1 OR "description" ILIKE $1)"#), "{}", q.sql);
        assert_eq!(q.params, vec![PgBindValue::String(r"%50\%\_off%".into())]);
    }

    #[test]
    fn filters_ignore_unknown_columns_and_cast_known_ones() {
        let m = model();
        let signals = m.entity_by_path("signals").unwrap();
        let query = ListQuery {
            filters: vec![
                ("signal_type".into(), json!("note")),
                ("bogus".into(), json!("x")),
                ("title".into(), Value::Null),
            ],
            ..Default::default()
        };
        let q = select_list(signals, &query);
        assert!(q.sql.contains(r#""signal_type" = $1::text"#));
        assert!(q.sql.contains(r#""title" IS NULL"#));
        assert!(!q.sql.contains("bogus"));
    }

    #[test]
    fn insert_skips_defaulted_columns_not_in_body() {
        let m = model();
        let signals = m.entity_by_path("signals").unwrap();
        let body: Map<String, Value> = json!({
            "id": "01HZX3J5Q8T9M2N4P6R8S0V2W4",
            "realm_id": "9b2b6c8e-54d4-4b7a-9a55-0d0d1f3c7a11",
            "signal_type": "note",
            "payload": { "text": "hi" }
        })
        .as_object()
        .cloned()
        .unwrap();
        let q = insert(signals, &body);
        assert!(q.sql.starts_with(r#"INSERT INTO "autonomy"."signals" ("id", "realm_id", "signal_type", "payload")"#), "{}", q.sql);
        assert!(q.sql.contains("VALUES ($1::text, $2::uuid, $3::text, $4::jsonb)"), "{}", q.sql);
    }

    #[test]
    fn update_bumps_updated_at_and_scopes() {
        let m = model();
        let clusters = m.entity_by_path("clusters").unwrap();
        let body: Map<String, Value> = json!({ "name": "Trips", "created_at": "2020-01-01T00:00:00Z" })
            .as_object()
            .cloned()
            .unwrap();
        let realm = Uuid::new_v4();
        let q = update(clusters, &json!("01HZX3J5Q8T9M2N4P6R8S0V2W4"), &body, Some(&[realm]));
        assert!(q.sql.contains(r#"SET "name" = $1::text, "updated_at" = NOW()"#), "{}", q.sql);
        assert!(q.sql.contains(r#"WHERE "id" = $2::text AND "realm_id" IN ($3::uuid)"#), "{}", q.sql);
        assert!(!q.sql.contains(r#""created_at" = "#));
    }

    #[test]
    fn column_in_casts_each_value() {
        let m = model();
        let signals = m.entity_by_path("signals").unwrap();
        let q = select_by_column_in(signals, "id", &[json!("a"), json!("b")], None);
        assert!(q.sql.contains(r#"WHERE "id" IN ($1::text, $2::text)"#), "{}", q.sql);
        let empty = select_by_column_in(signals, "id", &[], None);
        assert!(empty.sql.contains("WHERE 1 = 0"));
    }

    #[test]
    fn includes_hide_sensitive_related_columns() {
        let m = model();
        let realms = m.entity_by_path("realms").unwrap();
        let users = m.entity_by_path("users").unwrap();
        let owner = realms.include("owner").unwrap();
        let inc = IncludeSelect {
            name: &owner.name,
            direction: owner.direction,
            related: users,
            our_key: &owner.our_key_column,
            their_key: &owner.their_key_column,
        };
        let q = select_by_id_with_includes(realms, &json!(Uuid::nil().to_string()), None, &[inc]);
        assert!(q.sql.contains("row_to_json(sub)"));
        assert!(!q.sql.contains("password_hash"), "{}", q.sql);
        assert!(q.sql.contains(r#"AS "owner""#));
    }
}
