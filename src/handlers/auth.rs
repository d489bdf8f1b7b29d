//! Registration, login, logout, and the current user. Sessions travel in an HTTP-only cookie.

use crate::auth::{clear_cookie, session_cookie, AuthUser};
use crate::domain::Role;
use crate::error::{AppError, AuthError, FieldIssue};
use crate::handlers::params::body_to_map;
use crate::handlers::scoped::entity;
use crate::response::{present, success_one, success_one_ok};
use crate::service::{users, RequestValidator};
use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{Map, Value};
use uuid::Uuid;

fn required_str<'a>(body: &'a Map<String, Value>, field: &str) -> Result<&'a str, FieldIssue> {
    match body.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
        Some(Value::String(_)) | None | Some(Value::Null) => Err(FieldIssue::new(field, "is required")),
        Some(_) => Err(FieldIssue::new(field, "must be a string")),
    }
}

fn issue_for_row(state: &AppState, row: &Value) -> Result<String, AppError> {
    let user_id = row
        .get("id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or(AuthError::InvalidToken("user row without id"))?;
    let email = row.get("email").and_then(Value::as_str).unwrap_or_default();
    let role = row
        .get("role")
        .and_then(Value::as_str)
        .and_then(|r| r.parse::<Role>().ok())
        .unwrap_or(Role::User);
    Ok(state.jwt.issue(user_id, email, role)?)
}

fn with_session(state: &AppState, token: &str, status: StatusCode, data: Value) -> Response {
    let cookie = session_cookie(token, state.jwt.ttl_secs(), state.cookie_secure);
    let (_, json) = success_one(data);
    (status, [(header::SET_COOKIE, cookie)], json).into_response()
}

/// POST /api/auth/register with `{email, password, name?}`.
pub async fn register(State(state): State<AppState>, Json(body): Json<Value>) -> Result<Response, AppError> {
    let entity = entity(&state, "users")?;
    let mut body = body_to_map(body)?;
    let mut issues = Vec::new();
    let password = match users::take_password(&mut body, true) {
        Ok(p) => p,
        Err(i) => {
            issues.push(i);
            None
        }
    };
    if let Err(i) = required_str(&body, "email") {
        issues.push(i);
    }
    if body.contains_key("role") {
        issues.push(FieldIssue::new("role", "is set by the server"));
    }
    if !issues.is_empty() {
        return Err(AppError::Validation(issues));
    }
    RequestValidator::validate_partial(&body, entity)?;

    let email = required_str(&body, "email").map_err(|i| AppError::Validation(vec![i]))?;
    let name = body.get("name").and_then(Value::as_str);
    let password = password.unwrap_or_default();
    let user = users::register(&state.pool, &state.model, email, &password, name, None).await?;
    let token = issue_for_row(&state, &user)?;
    Ok(with_session(&state, &token, StatusCode::CREATED, present(entity, user)))
}

/// POST /api/auth/login with `{email, password}`.
pub async fn login(State(state): State<AppState>, Json(body): Json<Value>) -> Result<Response, AppError> {
    let entity = entity(&state, "users")?;
    let body = body_to_map(body)?;
    let (email, password) = match (required_str(&body, "email"), required_str(&body, "password")) {
        (Ok(e), Ok(p)) => (e, p),
        (e, p) => {
            let issues = [e.err(), p.err()].into_iter().flatten().collect();
            return Err(AppError::Validation(issues));
        }
    };

    let user = users::authenticate(&state.pool, &state.model, email, password).await?;
    let row = users::find_row(&state.pool, &state.model, user.id)
        .await?
        .ok_or(AuthError::BadCredentials)?;
    let token = state.jwt.issue(user.id, &user.email, user.role)?;
    tracing::info!(user_id = %user.id, "login");
    Ok(with_session(&state, &token, StatusCode::OK, present(entity, row)))
}

/// POST /api/auth/logout. Always succeeds.
pub async fn logout(State(state): State<AppState>) -> Response {
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, clear_cookie(state.cookie_secure))],
    )
        .into_response()
}

/// GET /api/auth/me
pub async fn me(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<Response, AppError> {
    let entity = entity(&state, "users")?;
    let row = users::find_row(&state.pool, &state.model, user.user_id)
        .await?
        .ok_or(AuthError::InvalidToken("user no longer exists"))?;
    Ok(success_one_ok(present(entity, row)).into_response())
}
