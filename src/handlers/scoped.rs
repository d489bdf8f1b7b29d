//! Tenant CRUD shared by the realm-scoped resources. Rows outside the caller's realms behave as missing.

use crate::auth::Claims;
use crate::error::AppError;
use crate::handlers::params::{body_to_map, parse_id, parse_include, parse_list_params};
use crate::model::ResolvedEntity;
use crate::response::{present, present_all, success_one, success_one_ok, success_page};
use crate::service::realms::{self, RealmAccess};
use crate::service::{resolve_includes, rules, syntheses, CrudService, RequestValidator};
use crate::state::AppState;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{json, Map, Value};
use sqlx::PgConnection;
use std::collections::HashMap;
use uuid::Uuid;

pub(crate) fn entity<'a>(state: &'a AppState, path: &str) -> Result<&'a ResolvedEntity, AppError> {
    state
        .model
        .entity_by_path(path)
        .ok_or_else(|| AppError::NotFound(path.to_string()))
}

pub(crate) fn not_found(entity: &ResolvedEntity, id: &str) -> AppError {
    AppError::NotFound(format!("{} {}", entity.path_segment, id))
}

pub(crate) async fn scope_of(state: &AppState, user: &Claims) -> Result<Vec<Uuid>, AppError> {
    realms::accessible_realm_ids(&state.pool, &state.model, user.user_id).await
}

/// Read one row the caller can see, or 404.
pub(crate) async fn find_visible(
    conn: &mut PgConnection,
    entity: &ResolvedEntity,
    id: &Value,
    scope: &[Uuid],
) -> Result<Value, AppError> {
    CrudService::read(conn, entity, id, Some(scope))
        .await?
        .ok_or_else(|| not_found(entity, id.as_str().unwrap_or_default()))
}

fn row_realm(entity: &ResolvedEntity, row: &Value) -> Result<Uuid, AppError> {
    let column = entity.scope_column().unwrap_or("realm_id");
    row.get(column)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| AppError::NotFound(entity.path_segment.clone()))
}

/// Writes to a realm itself need ownership; writes to rows inside a realm need editor rights.
pub(crate) async fn require_write(
    conn: &mut PgConnection,
    state: &AppState,
    user: &Claims,
    entity: &ResolvedEntity,
    row: &Value,
) -> Result<Uuid, AppError> {
    let allowed = if entity.table_name == "realms" {
        RealmAccess::is_owner as fn(RealmAccess) -> bool
    } else {
        RealmAccess::can_write
    };
    let realm_id = row_realm(entity, row)?;
    realms::require(conn, &state.model, user.user_id, realm_id, allowed).await?;
    Ok(realm_id)
}

/// `include=syntheses` on signals and clusters. The polymorphic pair has no foreign key, so this
/// include is loaded separately; returns the target kind when it was requested.
fn take_syntheses_include(entity: &ResolvedEntity, names: &mut Vec<String>) -> Option<&'static str> {
    let kind = match entity.table_name.as_str() {
        "signals" => "signal",
        "clusters" => "cluster",
        _ => return None,
    };
    let before = names.len();
    names.retain(|n| n != "syntheses");
    (names.len() != before).then_some(kind)
}

async fn attach_syntheses(
    state: &AppState,
    kind: &str,
    rows: &mut [Value],
    scope: Option<&[Uuid]>,
) -> Result<(), AppError> {
    let synth = entity(state, "syntheses")?;
    let ids: Vec<Value> = rows.iter().filter_map(|r| r.get("id").cloned()).collect();
    let mut grouped = syntheses::for_targets(&state.pool, &state.model, kind, &ids, scope).await?;
    for row in rows.iter_mut() {
        let attached = row
            .get("id")
            .and_then(Value::as_str)
            .and_then(|id| grouped.remove(id))
            .unwrap_or_default();
        if let Value::Object(map) = row {
            map.insert("syntheses".into(), Value::Array(present_all(synth, attached)));
        }
    }
    Ok(())
}

pub async fn list(
    state: &AppState,
    user: &Claims,
    path: &str,
    params: &HashMap<String, String>,
) -> Result<Response, AppError> {
    let entity = entity(state, path)?;
    let mut p = parse_list_params(entity, params)?;
    let with_syntheses = take_syntheses_include(entity, &mut p.include);
    let includes = resolve_includes(&state.model, entity, &p.include)?;
    p.query.realm_scope = Some(scope_of(state, user).await?);
    let rows = CrudService::list_with_includes(&state.pool, entity, &p.query, &includes).await?;
    let total = CrudService::count(&state.pool, entity, &p.query).await?;
    let mut data = present_all(entity, rows);
    if let Some(kind) = with_syntheses {
        attach_syntheses(state, kind, &mut data, p.query.realm_scope.as_deref()).await?;
    }
    Ok(success_page(
        data,
        total,
        p.query.effective_limit(),
        p.query.effective_offset(),
    )
    .into_response())
}

pub async fn read(
    state: &AppState,
    user: &Claims,
    path: &str,
    raw_id: &str,
    params: &HashMap<String, String>,
) -> Result<Response, AppError> {
    let entity = entity(state, path)?;
    let id = parse_id(entity, raw_id)?;
    let mut names = params.get("include").map(|s| parse_include(s)).unwrap_or_default();
    let with_syntheses = take_syntheses_include(entity, &mut names);
    let includes = resolve_includes(&state.model, entity, &names)?;
    let scope = scope_of(state, user).await?;
    let row = CrudService::read_with_includes(&state.pool, entity, &id, Some(&scope), &includes)
        .await?
        .ok_or_else(|| not_found(entity, raw_id))?;
    let mut data = [present(entity, row)];
    if let Some(kind) = with_syntheses {
        attach_syntheses(state, kind, &mut data, Some(&scope)).await?;
    }
    let [row] = data;
    Ok(success_one_ok(row).into_response())
}

/// A realm's owner is always the caller on the tenant API; ownership moves only through the admin API.
fn reject_foreign_owner(body: &Map<String, Value>, user: &Claims) -> Result<(), AppError> {
    match body.get("owner_id") {
        None => Ok(()),
        Some(v) if v.as_str().and_then(|s| Uuid::parse_str(s).ok()) == Some(user.user_id) => Ok(()),
        Some(_) => Err(AppError::invalid("owner_id", "is set by the server")),
    }
}

pub async fn create(state: &AppState, user: &Claims, path: &str, body: Value) -> Result<Response, AppError> {
    let entity = entity(state, path)?;
    let mut body = body_to_map(body)?;
    let owner = json!(user.user_id.to_string());

    if entity.table_name == "realms" {
        reject_foreign_owner(&body, user)?;
        body.insert("owner_id".into(), owner);
    } else if entity.has_column("realm_id") && !body.contains_key("realm_id") {
        if let Some(realm) = realms::default_realm(&state.pool, &state.model, user.user_id).await? {
            body.insert("realm_id".into(), json!(realm.to_string()));
        }
    }
    RequestValidator::validate(&body, entity)?;

    let mut tx = state.pool.begin().await?;
    if entity.table_name != "realms" {
        let realm_id = row_realm(entity, &Value::Object(body.clone()))?;
        realms::require(&mut *tx, &state.model, user.user_id, realm_id, RealmAccess::can_write).await?;
    }
    let row = rules::create(&mut tx, &state.model, entity, body).await?;
    tx.commit().await?;
    tracing::debug!(entity = %entity.path_segment, user_id = %user.user_id, "created");
    Ok(success_one(present(entity, row)).into_response())
}

pub async fn update(
    state: &AppState,
    user: &Claims,
    path: &str,
    raw_id: &str,
    body: Value,
) -> Result<Response, AppError> {
    let entity = entity(state, path)?;
    let id = parse_id(entity, raw_id)?;
    let body = body_to_map(body)?;
    if entity.table_name == "realms" {
        reject_foreign_owner(&body, user)?;
    }
    RequestValidator::validate_partial(&body, entity)?;
    let scope = scope_of(state, user).await?;

    let mut tx = state.pool.begin().await?;
    let existing = find_visible(&mut tx, entity, &id, &scope).await?;
    require_write(&mut tx, state, user, entity, &existing).await?;
    let row = rules::update(&mut tx, &state.model, entity, &existing, body, Some(&scope))
        .await?
        .ok_or_else(|| not_found(entity, raw_id))?;
    tx.commit().await?;
    Ok(success_one_ok(present(entity, row)).into_response())
}

pub async fn delete(state: &AppState, user: &Claims, path: &str, raw_id: &str) -> Result<Response, AppError> {
    let entity = entity(state, path)?;
    let id = parse_id(entity, raw_id)?;
    let scope = scope_of(state, user).await?;

    let mut tx = state.pool.begin().await?;
    let existing = find_visible(&mut tx, entity, &id, &scope).await?;
    require_write(&mut tx, state, user, entity, &existing).await?;
    rules::delete(&mut tx, &state.model, entity, &id, Some(&scope))
        .await?
        .ok_or_else(|| not_found(entity, raw_id))?;
    tx.commit().await?;
    tracing::debug!(entity = %entity.path_segment, id = %raw_id, user_id = %user.user_id, "deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Generates the five CRUD handlers of one realm-scoped resource.
macro_rules! scoped_crud {
    ($path:expr) => {
        pub async fn list(
            axum::extract::State(state): axum::extract::State<crate::state::AppState>,
            crate::auth::AuthUser(user): crate::auth::AuthUser,
            axum::extract::Query(params): axum::extract::Query<std::collections::HashMap<String, String>>,
        ) -> Result<axum::response::Response, crate::error::AppError> {
            crate::handlers::scoped::list(&state, &user, $path, &params).await
        }

        pub async fn create(
            axum::extract::State(state): axum::extract::State<crate::state::AppState>,
            crate::auth::AuthUser(user): crate::auth::AuthUser,
            axum::Json(body): axum::Json<serde_json::Value>,
        ) -> Result<axum::response::Response, crate::error::AppError> {
            crate::handlers::scoped::create(&state, &user, $path, body).await
        }

        pub async fn read(
            axum::extract::State(state): axum::extract::State<crate::state::AppState>,
            crate::auth::AuthUser(user): crate::auth::AuthUser,
            axum::extract::Path(id): axum::extract::Path<String>,
            axum::extract::Query(params): axum::extract::Query<std::collections::HashMap<String, String>>,
        ) -> Result<axum::response::Response, crate::error::AppError> {
            crate::handlers::scoped::read(&state, &user, $path, &id, &params).await
        }

        pub async fn update(
            axum::extract::State(state): axum::extract::State<crate::state::AppState>,
            crate::auth::AuthUser(user): crate::auth::AuthUser,
            axum::extract::Path(id): axum::extract::Path<String>,
            axum::Json(body): axum::Json<serde_json::Value>,
        ) -> Result<axum::response::Response, crate::error::AppError> {
            crate::handlers::scoped::update(&state, &user, $path, &id, body).await
        }

        pub async fn delete(
            axum::extract::State(state): axum::extract::State<crate::state::AppState>,
            crate::auth::AuthUser(user): crate::auth::AuthUser,
            axum::extract::Path(id): axum::extract::Path<String>,
        ) -> Result<axum::response::Response, crate::error::AppError> {
            crate::handlers::scoped::delete(&state, &user, $path, &id).await
        }
    };
}

pub(crate) use scoped_crud;
