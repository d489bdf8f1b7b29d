//! Admin CRUD over every catalog entity, without realm scoping. User bodies may carry a plain `password`.

use crate::auth::AdminUser;
use crate::error::AppError;
use crate::handlers::params::{body_to_map, parse_id, parse_include, parse_list_params};
use crate::handlers::scoped::{entity, not_found};
use crate::model::{Operation, ResolvedEntity};
use crate::response::{present, present_all, success_one, success_one_ok, success_page};
use crate::service::{resolve_includes, rules, users, CrudService, RequestValidator};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{Map, Value};
use std::collections::HashMap;

fn ensure_allowed(entity: &ResolvedEntity, op: Operation) -> Result<(), AppError> {
    if entity.allows(op) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("{:?} not allowed on {}", op, entity.path_segment)))
    }
}

fn take_password(
    entity_table: &str,
    body: &mut Map<String, Value>,
    creating: bool,
) -> Result<Option<String>, AppError> {
    if entity_table != "users" {
        return Ok(None);
    }
    users::take_password(body, creating).map_err(|i| AppError::Validation(vec![i]))
}

pub async fn list(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(path_segment): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let entity = entity(&state, &path_segment)?;
    ensure_allowed(entity, Operation::Read)?;
    let p = parse_list_params(entity, &params)?;
    let includes = resolve_includes(&state.model, entity, &p.include)?;
    let rows = CrudService::list_with_includes(&state.pool, entity, &p.query, &includes).await?;
    let total = CrudService::count(&state.pool, entity, &p.query).await?;
    Ok(success_page(
        present_all(entity, rows),
        total,
        p.query.effective_limit(),
        p.query.effective_offset(),
    )
    .into_response())
}

pub async fn create(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(path_segment): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let entity = entity(&state, &path_segment)?;
    ensure_allowed(entity, Operation::Create)?;
    let mut body = body_to_map(body)?;
    let password = take_password(&entity.table_name, &mut body, true)?;
    RequestValidator::validate(&body, entity)?;
    users::apply_password(&mut body, password)?;

    let mut tx = state.pool.begin().await?;
    let row = rules::create(&mut tx, &state.model, entity, body).await?;
    tx.commit().await?;
    tracing::info!(entity = %path_segment, admin_id = %admin.user_id, "admin create");
    Ok(success_one(present(entity, row)).into_response())
}

pub async fn read(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path((path_segment, raw_id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let entity = entity(&state, &path_segment)?;
    ensure_allowed(entity, Operation::Read)?;
    let id = parse_id(entity, &raw_id)?;
    let names = params.get("include").map(|s| parse_include(s)).unwrap_or_default();
    let includes = resolve_includes(&state.model, entity, &names)?;
    let row = CrudService::read_with_includes(&state.pool, entity, &id, None, &includes)
        .await?
        .ok_or_else(|| not_found(entity, &raw_id))?;
    Ok(success_one_ok(present(entity, row)).into_response())
}

pub async fn update(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path((path_segment, raw_id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let entity = entity(&state, &path_segment)?;
    ensure_allowed(entity, Operation::Update)?;
    let id = parse_id(entity, &raw_id)?;
    let mut body = body_to_map(body)?;
    let password = take_password(&entity.table_name, &mut body, false)?;
    if password.is_none() || !body.is_empty() {
        RequestValidator::validate_partial(&body, entity)?;
    }
    users::apply_password(&mut body, password)?;

    let mut tx = state.pool.begin().await?;
    let existing = CrudService::read(&mut *tx, entity, &id, None)
        .await?
        .ok_or_else(|| not_found(entity, &raw_id))?;
    let row = rules::update(&mut tx, &state.model, entity, &existing, body, None)
        .await?
        .ok_or_else(|| not_found(entity, &raw_id))?;
    tx.commit().await?;
    tracing::info!(entity = %path_segment, id = %raw_id, admin_id = %admin.user_id, "admin update");
    Ok(success_one_ok(present(entity, row)).into_response())
}

pub async fn delete(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path((path_segment, raw_id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let entity = entity(&state, &path_segment)?;
    ensure_allowed(entity, Operation::Delete)?;
    let id = parse_id(entity, &raw_id)?;
    let mut tx = state.pool.begin().await?;
    rules::delete(&mut tx, &state.model, entity, &id, None)
        .await?
        .ok_or_else(|| not_found(entity, &raw_id))?;
    tx.commit().await?;
    tracing::info!(entity = %path_segment, id = %raw_id, admin_id = %admin.user_id, "admin delete");
    Ok(StatusCode::NO_CONTENT.into_response())
}
