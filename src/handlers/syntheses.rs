//! Synthesis CRUD and the error log.

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::handlers::params::{body_to_map, parse_id};
use crate::handlers::scoped::{entity, find_visible, not_found, require_write, scope_of, scoped_crud};
use crate::response::{present, success_one_ok};
use crate::service::syntheses;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

const MAX_ERROR_MESSAGE_LEN: usize = 2000;

scoped_crud!("syntheses");

/// POST /api/syntheses/:id/errors with `{message}`. Returns the updated synthesis.
pub async fn append_error(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(raw_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let entity = entity(&state, "syntheses")?;
    let id = parse_id(entity, &raw_id)?;
    let body = body_to_map(body)?;
    let message = match body.get("message") {
        Some(Value::String(m)) if !m.trim().is_empty() => m.trim(),
        Some(Value::String(_)) | None => return Err(AppError::invalid("message", "is required")),
        Some(_) => return Err(AppError::invalid("message", "must be a string")),
    };
    if message.chars().count() > MAX_ERROR_MESSAGE_LEN {
        return Err(AppError::invalid(
            "message",
            format!("must be at most {} characters", MAX_ERROR_MESSAGE_LEN),
        ));
    }
    let scope = scope_of(&state, &user).await?;

    let mut tx = state.pool.begin().await?;
    let existing = find_visible(&mut tx, entity, &id, &scope).await?;
    require_write(&mut tx, &state, &user, entity, &existing).await?;
    let row = syntheses::append_error(&mut *tx, &state.model, id.as_str().unwrap_or_default(), message)
        .await?
        .ok_or_else(|| not_found(entity, &raw_id))?;
    tx.commit().await?;
    tracing::info!(synthesis_id = %raw_id, "synthesis error recorded");
    Ok(success_one_ok(present(entity, row)).into_response())
}
