//! Synthesis error log and lookup by target.

use crate::error::AppError;
use crate::model::ResolvedModel;
use crate::service::crud::row_to_json;
use crate::service::CrudService;
use serde_json::Value;
use sqlx::PgExecutor;
use std::collections::HashMap;
use uuid::Uuid;

/// Append `{message, at}` to a synthesis's `errors` array. None when the synthesis does not exist.
pub async fn append_error<'c, E: PgExecutor<'c>>(
    exec: E,
    model: &ResolvedModel,
    synthesis_id: &str,
    message: &str,
) -> Result<Option<Value>, AppError> {
    let sql = format!(
        "UPDATE {} SET errors = errors || jsonb_build_array(jsonb_build_object('message', $1::text, 'at', NOW())), \
         updated_at = NOW() WHERE id = $2 RETURNING *",
        model.table("syntheses")
    );
    tracing::debug!(sql = %sql, synthesis_id, "query");
    let row = sqlx::query(&sql)
        .bind(message)
        .bind(synthesis_id)
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(row_to_json).transpose()
}

/// Syntheses pointing at any of `ids` of the given target kind, grouped by target id.
pub async fn for_targets<'c, E: PgExecutor<'c>>(
    exec: E,
    model: &ResolvedModel,
    kind: &str,
    ids: &[Value],
    scope: Option<&[Uuid]>,
) -> Result<HashMap<String, Vec<Value>>, AppError> {
    let entity = model
        .entity_by_path("syntheses")
        .ok_or_else(|| AppError::NotFound("syntheses".into()))?;
    let rows = CrudService::fetch_where_column_in(exec, entity, "polymorphic_id", ids, scope).await?;
    let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
    for row in rows {
        if row.get("polymorphic_type").and_then(Value::as_str) != Some(kind) {
            continue;
        }
        if let Some(id) = row.get("polymorphic_id").and_then(Value::as_str) {
            grouped.entry(id.to_string()).or_default().push(row);
        }
    }
    Ok(grouped)
}
