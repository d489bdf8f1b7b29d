//! Generic CRUD execution against PostgreSQL.

use crate::error::AppError;
use crate::ids::new_ulid;
use crate::model::{PkType, ResolvedEntity, ResolvedModel};
use crate::sql::{
    count_list, delete, insert, select_by_column_in, select_by_id, select_by_id_with_includes, select_list,
    select_list_with_includes, update, IncludeSelect, ListQuery, QueryBuf,
};
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgExecutor, Postgres};
use uuid::Uuid;

pub struct CrudService;

impl CrudService {
    /// List rows matching the query (filters, realm scope, search, paging).
    pub async fn list<'c, E: PgExecutor<'c>>(
        exec: E,
        entity: &ResolvedEntity,
        query: &ListQuery,
    ) -> Result<Vec<Value>, AppError> {
        Self::fetch_all(exec, &select_list(entity, query)).await
    }

    /// Total rows matching the query, ignoring paging.
    pub async fn count<'c, E: PgExecutor<'c>>(
        exec: E,
        entity: &ResolvedEntity,
        query: &ListQuery,
    ) -> Result<u64, AppError> {
        let q = count_list(entity, query);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = bind_all(&q).fetch_one(exec).await?;
        let total: i64 = sqlx::Row::try_get(&row, 0)?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    /// List rows with includes in a single query (scalar subqueries with json_agg/row_to_json).
    pub async fn list_with_includes<'c, E: PgExecutor<'c>>(
        exec: E,
        entity: &ResolvedEntity,
        query: &ListQuery,
        includes: &[IncludeSelect<'_>],
    ) -> Result<Vec<Value>, AppError> {
        if includes.is_empty() {
            return Self::list(exec, entity, query).await;
        }
        Self::fetch_all(exec, &select_list_with_includes(entity, query, includes)).await
    }

    /// Fetch one row by primary key, within `scope` when given.
    pub async fn read<'c, E: PgExecutor<'c>>(
        exec: E,
        entity: &ResolvedEntity,
        id: &Value,
        scope: Option<&[Uuid]>,
    ) -> Result<Option<Value>, AppError> {
        Self::fetch_optional(exec, &select_by_id(entity, id, scope)).await
    }

    pub async fn read_with_includes<'c, E: PgExecutor<'c>>(
        exec: E,
        entity: &ResolvedEntity,
        id: &Value,
        scope: Option<&[Uuid]>,
        includes: &[IncludeSelect<'_>],
    ) -> Result<Option<Value>, AppError> {
        if includes.is_empty() {
            return Self::read(exec, entity, id, scope).await;
        }
        Self::fetch_optional(exec, &select_by_id_with_includes(entity, id, scope, includes)).await
    }

    /// Fetch rows from entity where column IN (values). Used for batch-loading related rows.
    pub async fn fetch_where_column_in<'c, E: PgExecutor<'c>>(
        exec: E,
        entity: &ResolvedEntity,
        column: &str,
        values: &[Value],
        scope: Option<&[Uuid]>,
    ) -> Result<Vec<Value>, AppError> {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        Self::fetch_all(exec, &select_by_column_in(entity, column, values, scope)).await
    }

    /// Insert one row and return it. ULID primary keys are generated here when the body has none.
    pub async fn create<'c, E: PgExecutor<'c>>(
        exec: E,
        entity: &ResolvedEntity,
        body: &Map<String, Value>,
    ) -> Result<Value, AppError> {
        let mut body = body.clone();
        if entity.pk_type == PkType::Ulid && !body.contains_key(&entity.pk_column) {
            body.insert(entity.pk_column.clone(), Value::String(new_ulid()));
        }
        Self::fetch_optional(exec, &insert(entity, &body))
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))
    }

    /// Update one row by id. None when the row does not exist or is outside `scope`.
    pub async fn update<'c, E: PgExecutor<'c>>(
        exec: E,
        entity: &ResolvedEntity,
        id: &Value,
        body: &Map<String, Value>,
        scope: Option<&[Uuid]>,
    ) -> Result<Option<Value>, AppError> {
        Self::fetch_optional(exec, &update(entity, id, body, scope)).await
    }

    /// Delete one row by id. Returns the deleted row.
    pub async fn delete<'c, E: PgExecutor<'c>>(
        exec: E,
        entity: &ResolvedEntity,
        id: &Value,
        scope: Option<&[Uuid]>,
    ) -> Result<Option<Value>, AppError> {
        Self::fetch_optional(exec, &delete(entity, id, scope)).await
    }

    async fn fetch_all<'c, E: PgExecutor<'c>>(exec: E, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let rows = bind_all(q).fetch_all(exec).await?;
        rows.iter().map(row_to_json).collect()
    }

    async fn fetch_optional<'c, E: PgExecutor<'c>>(exec: E, q: &QueryBuf) -> Result<Option<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = bind_all(q).fetch_optional(exec).await?;
        row.as_ref().map(row_to_json).transpose()
    }
}

fn bind_all(q: &QueryBuf) -> Query<'_, Postgres, PgArguments> {
    q.params.iter().cloned().fold(sqlx::query(&q.sql), |acc, p| acc.bind(p))
}

/// Look up includes named in `?include=` on the entity. Unknown names are a 400.
pub fn resolve_includes<'a>(
    model: &'a ResolvedModel,
    entity: &'a ResolvedEntity,
    names: &'a [String],
) -> Result<Vec<IncludeSelect<'a>>, AppError> {
    names
        .iter()
        .map(|name| {
            let spec = entity
                .include(name)
                .ok_or_else(|| AppError::invalid("include", format!("unknown include '{}'", name)))?;
            let related = model.entity_by_path(&spec.related_path_segment).ok_or_else(|| {
                AppError::invalid("include", format!("include '{}' is not available", name))
            })?;
            Ok(IncludeSelect {
                name: &spec.name,
                direction: spec.direction,
                related,
                our_key: &spec.our_key_column,
                their_key: &spec.their_key_column,
            })
        })
        .collect()
}

/// Convert a row to a JSON object, dispatching on the column's PostgreSQL type.
pub(crate) fn row_to_json(row: &PgRow) -> Result<Value, AppError> {
    use sqlx::{Column, Row, TypeInfo};
    let mut map = Map::new();
    for (i, col) in row.columns().iter().enumerate() {
        let v = match col.type_info().name() {
            "INT2" => row.try_get::<Option<i16>, _>(i)?.map(Value::from),
            "INT4" => row.try_get::<Option<i32>, _>(i)?.map(Value::from),
            "INT8" => row.try_get::<Option<i64>, _>(i)?.map(Value::from),
            "FLOAT4" => row.try_get::<Option<f32>, _>(i)?.map(|n| Value::from(f64::from(n))),
            "FLOAT8" => row.try_get::<Option<f64>, _>(i)?.map(Value::from),
            "BOOL" => row.try_get::<Option<bool>, _>(i)?.map(Value::Bool),
            "UUID" => row.try_get::<Option<Uuid>, _>(i)?.map(|u| Value::String(u.to_string())),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i)?
                .map(|d| Value::String(d.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(i)?
                .map(|d| Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(i)?
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
            "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(i)?,
            _ => row.try_get::<Option<String>, _>(i)?.map(Value::String),
        };
        map.insert(col.name().to_string(), v.unwrap_or(Value::Null));
    }
    Ok(Value::Object(map))
}
