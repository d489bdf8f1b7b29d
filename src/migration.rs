//! Apply the catalog to the database: DDL for the schema, tables, indexes, and foreign keys.
//! Every statement is idempotent, so this runs on each startup.

use crate::error::AppError;
use crate::model::{validate, Catalog, ColumnConfig, ColumnDefault, IndexConfig, TableConfig};
use crate::sql::{qualified_table, quoted};
use sqlx::PgPool;
use std::collections::HashSet;

fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn column_def(c: &ColumnConfig) -> String {
    let mut def = format!("{} {}", quoted(&c.name), c.type_.sql());
    if !c.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(d) = &c.default {
        def.push_str(" DEFAULT ");
        match d {
            ColumnDefault::Literal(s) => def.push_str(&literal(s)),
            ColumnDefault::Expression(e) => def.push_str(e),
        }
    }
    if c.unique {
        def.push_str(" UNIQUE");
    }
    def
}

/// CREATE TABLE IF NOT EXISTS with columns, bookkeeping timestamps, primary key, unique and check constraints.
/// Foreign keys are added separately so tables can be created in any order.
pub fn table_ddl(schema: &str, t: &TableConfig) -> String {
    let mut defs: Vec<String> = t.columns.iter().map(column_def).collect();

    let declared: HashSet<&str> = t.columns.iter().map(|c| c.name.as_str()).collect();
    for name in ["created_at", "updated_at"] {
        if !declared.contains(name) {
            defs.push(format!("{} TIMESTAMPTZ NOT NULL DEFAULT NOW()", quoted(name)));
        }
    }

    defs.push(format!("PRIMARY KEY ({})", quoted(&t.primary_key)));
    for u in &t.unique {
        let cols: Vec<String> = u.iter().map(|s| quoted(s)).collect();
        defs.push(format!("UNIQUE ({})", cols.join(", ")));
    }
    for ch in &t.check {
        defs.push(format!("CONSTRAINT {} CHECK ({})", quoted(&ch.name), ch.expression));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        qualified_table(schema, &t.name),
        defs.join(",\n  ")
    )
}

pub fn index_ddl(schema: &str, table: &str, idx: &IndexConfig) -> String {
    let cols: Vec<String> = idx.columns.iter().map(|c| quoted(c)).collect();
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        if idx.unique { "UNIQUE " } else { "" },
        quoted(&idx.name),
        qualified_table(schema, table),
        cols.join(", ")
    )
}

/// A foreign key constraint: its name and the ALTER TABLE that adds it.
pub struct ForeignKeyDdl {
    pub name: String,
    pub table: String,
    pub sql: String,
}

pub fn foreign_key_ddls(schema: &str, t: &TableConfig) -> Vec<ForeignKeyDdl> {
    t.columns
        .iter()
        .filter_map(|c| {
            let fk = c.references.as_ref()?;
            let name = format!("{}_{}_fkey", t.name, c.name);
            let sql = format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
                qualified_table(schema, &t.name),
                quoted(&name),
                quoted(&c.name),
                qualified_table(schema, &fk.table),
                quoted(&fk.column),
                fk.on_delete.sql()
            );
            Some(ForeignKeyDdl {
                name,
                table: t.name.clone(),
                sql,
            })
        })
        .collect()
}

/// Apply the catalog: CREATE SCHEMA, the pgcrypto extension (for gen_random_uuid on older servers),
/// CREATE TABLE, CREATE INDEX, then any foreign key not yet present.
pub async fn apply_migrations(pool: &PgPool, catalog: &Catalog) -> Result<(), AppError> {
    validate(catalog)?;
    let schema = catalog.schema.as_str();

    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema)))
        .execute(pool)
        .await?;
    if let Err(e) = sqlx::query("CREATE EXTENSION IF NOT EXISTS pgcrypto").execute(pool).await {
        tracing::warn!(error = %e, "could not create pgcrypto extension; relying on built-in gen_random_uuid");
    }

    for t in &catalog.tables {
        let sql = table_ddl(schema, t);
        tracing::debug!(sql = %sql, "migration");
        sqlx::query(&sql).execute(pool).await?;
    }

    for t in &catalog.tables {
        for idx in &t.indexes {
            sqlx::query(&index_ddl(schema, &t.name, idx)).execute(pool).await?;
        }
    }

    for t in &catalog.tables {
        for fk in foreign_key_ddls(schema, t) {
            let exists: (bool,) = sqlx::query_as(
                "SELECT EXISTS(SELECT 1 FROM pg_constraint c \
                 JOIN pg_class r ON r.oid = c.conrelid \
                 JOIN pg_namespace n ON n.oid = r.relnamespace \
                 WHERE c.conname = $1 AND r.relname = $2 AND n.nspname = $3)",
            )
            .bind(&fk.name)
            .bind(&fk.table)
            .bind(schema)
            .fetch_one(pool)
            .await?;
            if !exists.0 {
                tracing::debug!(sql = %fk.sql, "migration");
                sqlx::query(&fk.sql).execute(pool).await?;
            }
        }
    }

    tracing::info!(schema = %schema, tables = catalog.tables.len(), "migrations applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::catalog;

    fn table<'a>(c: &'a Catalog, name: &str) -> &'a TableConfig {
        c.tables.iter().find(|t| t.name == name).unwrap()
    }

    #[test]
    fn signals_table_ddl() {
        let c = catalog("autonomy");
        let sql = table_ddl("autonomy", table(&c, "signals"));
        assert!(sql.starts_with(r#"CREATE TABLE IF NOT EXISTS "autonomy"."signals" ("#));
        assert!(sql.contains(r#""visibility" text NOT NULL DEFAULT 'private'"#));
        assert!(sql.contains(r#""payload" jsonb NOT NULL DEFAULT '{}'::jsonb"#));
        assert!(sql.contains(r#""created_at" TIMESTAMPTZ NOT NULL DEFAULT NOW()"#));
        assert!(sql.contains(r#"PRIMARY KEY ("id")"#));
        assert!(sql.contains(r#"CONSTRAINT "signals_location_pair" CHECK ((latitude IS NULL) = (longitude IS NULL))"#));
        assert!(!sql.contains("REFERENCES"));
    }

    #[test]
    fn unique_constraints_and_columns() {
        let c = catalog("autonomy");
        assert!(table_ddl("autonomy", table(&c, "users")).contains(r#""email" text NOT NULL UNIQUE"#));
        assert!(table_ddl("autonomy", table(&c, "realm_members")).contains(r#"UNIQUE ("realm_id", "user_id")"#));
    }

    #[test]
    fn self_referencing_foreign_key() {
        let c = catalog("autonomy");
        let fks = foreign_key_ddls("autonomy", table(&c, "clusters"));
        let parent = fks.iter().find(|f| f.name == "clusters_parent_cluster_id_fkey").unwrap();
        assert_eq!(
            parent.sql,
            r#"ALTER TABLE "autonomy"."clusters" ADD CONSTRAINT "clusters_parent_cluster_id_fkey" FOREIGN KEY ("parent_cluster_id") REFERENCES "autonomy"."clusters" ("id") ON DELETE CASCADE"#
        );
        assert_eq!(fks.len(), 2);
    }

    #[test]
    fn index_statement() {
        let c = catalog("autonomy");
        let t = table(&c, "syntheses");
        assert_eq!(
            index_ddl("autonomy", &t.name, &t.indexes[0]),
            r#"CREATE INDEX IF NOT EXISTS "syntheses_target_idx" ON "autonomy"."syntheses" ("polymorphic_type", "polymorphic_id")"#
        );
    }
}
