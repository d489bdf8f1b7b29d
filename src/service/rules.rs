//! Domain rules applied to every write, whether from the tenant API or the admin API:
//! location pairs, cluster tree shape, synthesis targets and history, link realms, cascades.

use crate::domain::SynthesisTarget;
use crate::error::{AppError, FieldIssue};
use crate::geo::GeoPoint;
use crate::ids::ulid_at;
use crate::model::{ResolvedEntity, ResolvedModel};
use crate::service::{clusters, CrudService};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

fn field<'a>(body: &'a Map<String, Value>, existing: Option<&'a Value>, name: &str) -> Option<&'a Value> {
    match body.get(name) {
        Some(v) => Some(v),
        None => existing.and_then(|row| row.get(name)),
    }
}

fn str_field<'a>(body: &'a Map<String, Value>, existing: Option<&'a Value>, name: &str) -> Option<&'a str> {
    field(body, existing, name).and_then(Value::as_str)
}

fn issues(list: Vec<FieldIssue>) -> Result<(), AppError> {
    if list.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(list))
    }
}

/// Latitude and longitude are set together or not at all, and in range.
pub fn check_location(body: &Map<String, Value>, existing: Option<&Value>) -> Result<Option<GeoPoint>, FieldIssue> {
    let lat = field(body, existing, "latitude").filter(|v| !v.is_null());
    let lon = field(body, existing, "longitude").filter(|v| !v.is_null());
    match (lat.and_then(Value::as_f64), lon.and_then(Value::as_f64)) {
        (Some(lat), Some(lon)) => GeoPoint::new(lat, lon).map(Some),
        (None, None) if lat.is_none() && lon.is_none() => Ok(None),
        (Some(_), None) => Err(FieldIssue::new("longitude", "is required when latitude is set")),
        (None, Some(_)) => Err(FieldIssue::new("latitude", "is required when longitude is set")),
        (None, None) => Err(FieldIssue::new("latitude", "must be a number")),
    }
}

/// Realm of a row in a ULID-keyed realm table, or None when missing.
async fn realm_of<'c, E: PgExecutor<'c>>(
    exec: E,
    model: &ResolvedModel,
    table: &str,
    id: &str,
) -> Result<Option<Uuid>, AppError> {
    let sql = format!("SELECT realm_id FROM {} WHERE id = $1", model.table(table));
    Ok(sqlx::query_scalar::<_, Uuid>(&sql).bind(id).fetch_optional(exec).await?)
}

/// `cluster_id` and the ids of every cluster below it.
pub async fn cluster_subtree<'c, E: PgExecutor<'c>>(
    exec: E,
    model: &ResolvedModel,
    cluster_id: &str,
) -> Result<Vec<String>, AppError> {
    let clusters = model.table("clusters");
    let sql = format!(
        "WITH RECURSIVE subtree AS ( \
           SELECT id FROM {clusters} WHERE id = $1 \
           UNION \
           SELECT c.id FROM {clusters} c JOIN subtree s ON c.parent_cluster_id = s.id \
         ) SELECT id FROM subtree"
    );
    Ok(sqlx::query_scalar::<_, String>(&sql).bind(cluster_id).fetch_all(exec).await?)
}

fn realm_id(body: &Map<String, Value>, existing: Option<&Value>) -> Option<Uuid> {
    str_field(body, existing, "realm_id").and_then(|s| Uuid::parse_str(s).ok())
}

async fn check_cluster_parent(
    conn: &mut PgConnection,
    model: &ResolvedModel,
    body: &Map<String, Value>,
    existing: Option<&Value>,
) -> Result<(), AppError> {
    let Some(parent) = body.get("parent_cluster_id").and_then(Value::as_str) else {
        return Ok(());
    };
    let own_realm = realm_id(body, existing);
    match realm_of(&mut *conn, model, "clusters", parent).await? {
        None => return Err(AppError::invalid("parent_cluster_id", "does not exist")),
        Some(r) if Some(r) != own_realm => {
            return Err(AppError::invalid("parent_cluster_id", "must be in the same realm"))
        }
        Some(_) => {}
    }
    if let Some(own_id) = existing.and_then(|row| row.get("id")).and_then(Value::as_str) {
        let subtree = cluster_subtree(&mut *conn, model, own_id).await?;
        if subtree.iter().any(|id| id == parent) {
            return Err(AppError::invalid(
                "parent_cluster_id",
                "cannot be the cluster itself or one of its descendants",
            ));
        }
    }
    Ok(())
}

async fn check_synthesis_target(
    conn: &mut PgConnection,
    model: &ResolvedModel,
    body: &Map<String, Value>,
    existing: Option<&Value>,
) -> Result<(), AppError> {
    if existing.is_some() && !body.contains_key("polymorphic_type") && !body.contains_key("polymorphic_id") {
        return Ok(());
    }
    let kind = str_field(body, existing, "polymorphic_type").unwrap_or_default();
    let id = str_field(body, existing, "polymorphic_id").unwrap_or_default();
    let target = SynthesisTarget::from_parts(kind, id)
        .ok_or_else(|| AppError::invalid("polymorphic_type", "must be signal or cluster"))?;
    let target_realm = realm_of(&mut *conn, model, target.table(), target.id()).await?;
    if target_realm.is_none() || target_realm != realm_id(body, existing) {
        return Err(AppError::invalid(
            "polymorphic_id",
            format!("{} does not exist in this realm", target),
        ));
    }
    Ok(())
}

async fn check_link_realms(
    conn: &mut PgConnection,
    model: &ResolvedModel,
    body: &Map<String, Value>,
    existing: Option<&Value>,
) -> Result<(), AppError> {
    let cluster_id = str_field(body, existing, "cluster_id").unwrap_or_default();
    let signal_id = str_field(body, existing, "signal_id").unwrap_or_default();
    let cluster_realm = realm_of(&mut *conn, model, "clusters", cluster_id).await?;
    let signal_realm = realm_of(&mut *conn, model, "signals", signal_id).await?;
    let mut found = Vec::new();
    if cluster_realm.is_none() {
        found.push(FieldIssue::new("cluster_id", "does not exist"));
    }
    if signal_realm.is_none() {
        found.push(FieldIssue::new("signal_id", "does not exist"));
    }
    issues(found)?;
    if cluster_realm != signal_realm {
        return Err(AppError::invalid("signal_id", "must be in the cluster's realm"));
    }
    Ok(())
}

/// True when the body names a realm other than the row's. Ids compare as UUIDs, so case and hyphens don't matter.
fn realm_changed(body: &Map<String, Value>, row: &Value) -> bool {
    let Some(requested) = body.get("realm_id") else {
        return false;
    };
    let parse = |v: Option<&Value>| v.and_then(Value::as_str).and_then(|s| Uuid::parse_str(s).ok());
    match (parse(Some(requested)), parse(row.get("realm_id"))) {
        (Some(a), Some(b)) => a != b,
        _ => Some(requested) != row.get("realm_id"),
    }
}

/// A new signal with a backdated `occurred_at` gets a ULID carrying that time, so ids sort by occurrence.
pub fn seed_signal_id(body: &mut Map<String, Value>) {
    if body.contains_key("id") {
        return;
    }
    let seeded = body
        .get("occurred_at")
        .and_then(Value::as_str)
        .and_then(|at| DateTime::parse_from_rfc3339(at).ok())
        .and_then(|at| ulid_at(at.with_timezone(&Utc)));
    if let Some(id) = seeded {
        body.insert("id".into(), Value::String(id));
    }
}

/// Entry appended to `history` when a synthesis's content is replaced.
pub fn history_entry(previous: &Value, replaced_at: chrono::DateTime<Utc>) -> Value {
    json!({
        "content": previous,
        "replaced_at": replaced_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    })
}

async fn before_write(
    conn: &mut PgConnection,
    model: &ResolvedModel,
    entity: &ResolvedEntity,
    body: &mut Map<String, Value>,
    existing: Option<&Value>,
) -> Result<(), AppError> {
    if let Some(row) = existing {
        if entity.scope_column() == Some("realm_id") && realm_changed(body, row) {
            return Err(AppError::invalid("realm_id", "cannot be changed"));
        }
    }
    match entity.table_name.as_str() {
        "signals" => {
            check_location(body, existing).map_err(|i| AppError::Validation(vec![i]))?;
            if existing.is_none() {
                seed_signal_id(body);
            }
        }
        "clusters" => check_cluster_parent(conn, model, body, existing).await?,
        "cluster_signals" => {
            check_link_realms(conn, model, body, existing).await?;
            if existing.is_none() && body.get("position").map_or(true, Value::is_null) {
                let cluster_id = str_field(body, None, "cluster_id").unwrap_or_default().to_string();
                let position = clusters::next_position(&mut *conn, model, &cluster_id).await?;
                body.insert("position".into(), json!(position));
            }
        }
        "syntheses" => {
            check_synthesis_target(conn, model, body, existing).await?;
            if let (Some(row), Some(content)) = (existing, body.get("content")) {
                let previous = row.get("content").cloned().unwrap_or(Value::Null);
                if &previous != content {
                    let mut history = row
                        .get("history")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default();
                    history.push(history_entry(&previous, Utc::now()));
                    body.insert("history".into(), Value::Array(history));
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Apply the rules for `entity` and insert. The body must already be validated.
pub async fn create(
    conn: &mut PgConnection,
    model: &ResolvedModel,
    entity: &ResolvedEntity,
    mut body: Map<String, Value>,
) -> Result<Value, AppError> {
    before_write(conn, model, entity, &mut body, None).await?;
    CrudService::create(&mut *conn, entity, &body).await
}

/// Apply the rules against the current row and update. None when the row vanished or is out of scope.
pub async fn update(
    conn: &mut PgConnection,
    model: &ResolvedModel,
    entity: &ResolvedEntity,
    existing: &Value,
    mut body: Map<String, Value>,
    scope: Option<&[Uuid]>,
) -> Result<Option<Value>, AppError> {
    let id = existing
        .get(&entity.pk_column)
        .cloned()
        .ok_or_else(|| AppError::NotFound(entity.path_segment.clone()))?;
    before_write(conn, model, entity, &mut body, Some(existing)).await?;
    CrudService::update(&mut *conn, entity, &id, &body, scope).await
}

/// Delete a row, first removing syntheses that point at it (or, for a cluster, at it or any descendant).
pub async fn delete(
    conn: &mut PgConnection,
    model: &ResolvedModel,
    entity: &ResolvedEntity,
    id: &Value,
    scope: Option<&[Uuid]>,
) -> Result<Option<Value>, AppError> {
    if CrudService::read(&mut *conn, entity, id, scope).await?.is_none() {
        return Ok(None);
    }
    let target_ids = match (entity.table_name.as_str(), id.as_str()) {
        ("signals", Some(sid)) => Some(("signal", vec![sid.to_string()])),
        ("clusters", Some(cid)) => Some(("cluster", cluster_subtree(&mut *conn, model, cid).await?)),
        _ => None,
    };
    if let Some((kind, ids)) = target_ids {
        let sql = format!(
            "DELETE FROM {} WHERE polymorphic_type = $1 AND polymorphic_id = ANY($2)",
            model.table("syntheses")
        );
        let done = sqlx::query(&sql).bind(kind).bind(&ids).execute(&mut *conn).await?;
        if done.rows_affected() > 0 {
            tracing::debug!(kind, removed = done.rows_affected(), "removed syntheses of deleted target");
        }
    }
    CrudService::delete(&mut *conn, entity, id, scope).await
}
