//! Cluster CRUD, the cluster tree, ordered signal membership, and statistics.

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::handlers::params::{body_to_map, parse_id};
use crate::handlers::scoped::{entity, find_visible, require_write, scope_of, scoped_crud};
use crate::response::{present, present_all, success_many, success_one, success_one_ok};
use crate::service::{clusters, CrudService, RequestValidator};
use crate::sql::{ListQuery, MAX_LIMIT};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

scoped_crud!("clusters");

fn id_str(id: &Value) -> &str {
    id.as_str().unwrap_or_default()
}

/// GET /api/clusters/:id/children: direct child clusters.
pub async fn children(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let entity = entity(&state, "clusters")?;
    let id = parse_id(entity, &raw_id)?;
    let scope = scope_of(&state, &user).await?;
    let mut conn = state.pool.acquire().await?;
    find_visible(&mut conn, entity, &id, &scope).await?;
    let query = ListQuery {
        filters: vec![("parent_cluster_id".into(), id)],
        realm_scope: Some(scope),
        limit: Some(MAX_LIMIT),
        ..ListQuery::default()
    };
    let rows = CrudService::list(&mut *conn, entity, &query).await?;
    Ok(success_many(present_all(entity, rows)).into_response())
}

/// GET /api/clusters/:id/signals: linked signals in position order.
pub async fn list_signals(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let clusters_entity = entity(&state, "clusters")?;
    let signals = entity(&state, "signals")?;
    let id = parse_id(clusters_entity, &raw_id)?;
    let scope = scope_of(&state, &user).await?;
    let mut conn = state.pool.acquire().await?;
    find_visible(&mut conn, clusters_entity, &id, &scope).await?;
    let rows = clusters::list_signals(&mut *conn, &state.model, id_str(&id)).await?;
    Ok(success_many(present_all(signals, rows)).into_response())
}

/// POST /api/clusters/:id/signals with `{signalId, position?}`. The signal must live in the cluster's realm.
pub async fn add_signal(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(raw_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let clusters_entity = entity(&state, "clusters")?;
    let links = entity(&state, "cluster_signals")?;
    let signals = entity(&state, "signals")?;
    let id = parse_id(clusters_entity, &raw_id)?;

    let mut body = body_to_map(body)?;
    body.insert("cluster_id".into(), id.clone());
    RequestValidator::validate(&body, links)?;
    let signal_id = body
        .get("signal_id")
        .and_then(Value::as_str)
        .map(str::to_ascii_uppercase)
        .ok_or_else(|| AppError::invalid("signal_id", "is required"))?;
    let position = match body.get("position") {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_i64()
                .and_then(|p| i32::try_from(p).ok())
                .ok_or_else(|| AppError::invalid("position", "must be a non-negative integer"))?,
        ),
    };

    let scope = scope_of(&state, &user).await?;
    let mut tx = state.pool.begin().await?;
    let cluster = find_visible(&mut tx, clusters_entity, &id, &scope).await?;
    let realm_id = require_write(&mut tx, &state, &user, clusters_entity, &cluster).await?;
    if CrudService::read(&mut *tx, signals, &Value::String(signal_id.clone()), Some(std::slice::from_ref(&realm_id)))
        .await?
        .is_none()
    {
        return Err(AppError::invalid("signal_id", "must be a signal in the cluster's realm"));
    }
    let row = clusters::add_signal(&mut *tx, &state.model, id_str(&id), &signal_id, position).await?;
    tx.commit().await?;
    Ok(success_one(present(links, row)).into_response())
}

/// DELETE /api/clusters/:id/signals/:signal_id
pub async fn remove_signal(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((raw_id, raw_signal)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let clusters_entity = entity(&state, "clusters")?;
    let id = parse_id(clusters_entity, &raw_id)?;
    let signal_id = parse_id(entity(&state, "signals")?, &raw_signal)?;
    let scope = scope_of(&state, &user).await?;

    let mut tx = state.pool.begin().await?;
    let cluster = find_visible(&mut tx, clusters_entity, &id, &scope).await?;
    require_write(&mut tx, &state, &user, clusters_entity, &cluster).await?;
    if !clusters::remove_signal(&mut *tx, &state.model, id_str(&id), id_str(&signal_id)).await? {
        return Err(AppError::NotFound(format!("signal {} in cluster {}", raw_signal, raw_id)));
    }
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// GET /api/clusters/:id/stats
pub async fn stats(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let entity = entity(&state, "clusters")?;
    let id = parse_id(entity, &raw_id)?;
    let scope = scope_of(&state, &user).await?;
    let mut conn = state.pool.acquire().await?;
    find_visible(&mut conn, entity, &id, &scope).await?;
    let rows = clusters::list_signals(&mut *conn, &state.model, id_str(&id)).await?;
    Ok(success_one_ok(clusters::ClusterStats::from_signals(&rows)).into_response())
}
