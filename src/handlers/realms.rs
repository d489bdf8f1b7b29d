//! Realm CRUD and membership management.

use crate::auth::AuthUser;
use crate::domain::MemberRole;
use crate::error::AppError;
use crate::handlers::params::{body_to_map, parse_uuid};
use crate::handlers::scoped::{entity, scoped_crud};
use crate::response::{present, present_all, success_many, success_one};
use crate::service::realms::{self, RealmAccess};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

scoped_crud!("realms");

/// GET /api/realms/:id/members. Any member may see the roster.
pub async fn list_members(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let realm_id = parse_uuid("id", &id)?;
    realms::require(&state.pool, &state.model, user.user_id, realm_id, |_| true).await?;
    let members = realms::list_members(&state.pool, &state.model, realm_id).await?;
    let entity = entity(&state, "realm_members")?;
    Ok(success_many(present_all(entity, members)).into_response())
}

/// POST /api/realms/:id/members with `{userId, role}`. Owner only; re-adding a user changes their role.
pub async fn add_member(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let realm_id = parse_uuid("id", &id)?;
    let body = body_to_map(body)?;
    let member_id = match body.get("user_id") {
        Some(Value::String(s)) => parse_uuid("user_id", s)?,
        Some(_) => return Err(AppError::invalid("user_id", "must be a uuid")),
        None => return Err(AppError::invalid("user_id", "is required")),
    };
    let role = match body.get("role") {
        None | Some(Value::Null) => MemberRole::Member,
        Some(Value::String(s)) => s
            .parse()
            .map_err(|_| AppError::invalid("role", "must be one of: member, editor"))?,
        Some(_) => return Err(AppError::invalid("role", "must be a string")),
    };

    let mut tx = state.pool.begin().await?;
    realms::require(&mut *tx, &state.model, user.user_id, realm_id, RealmAccess::is_owner).await?;
    if realms::is_owner(&mut *tx, &state.model, member_id, realm_id).await? {
        return Err(AppError::invalid("user_id", "already owns this realm"));
    }
    let row = realms::add_member(&mut *tx, &state.model, realm_id, member_id, role).await?;
    tx.commit().await?;
    tracing::info!(%realm_id, %member_id, role = role.as_str(), "realm member set");
    let entity = entity(&state, "realm_members")?;
    Ok(success_one(present(entity, row)).into_response())
}

/// DELETE /api/realms/:id/members/:user_id. Owner only.
pub async fn remove_member(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, member)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let realm_id = parse_uuid("id", &id)?;
    let member_id = parse_uuid("user_id", &member)?;
    let mut tx = state.pool.begin().await?;
    realms::require(&mut *tx, &state.model, user.user_id, realm_id, RealmAccess::is_owner).await?;
    if !realms::remove_member(&mut *tx, &state.model, realm_id, member_id).await? {
        return Err(AppError::NotFound(format!("member {}", member_id)));
    }
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
