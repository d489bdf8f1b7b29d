//! Admin metadata: form configs and the entity list.

use crate::auth::AdminUser;
use crate::error::AppError;
use crate::forms::{form_for, FormMode};
use crate::handlers::scoped::entity;
use crate::model::Operation;
use crate::response::{success_many, success_one_ok};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::HashMap;

/// GET /api/admin/forms/:entity?mode=create|update (default create).
pub async fn form(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(path_segment): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let entity = entity(&state, &path_segment)?;
    let mode = match params.get("mode").map(String::as_str) {
        None | Some("create") => FormMode::Create,
        Some("update") => FormMode::Update,
        Some(other) => return Err(AppError::invalid("mode", format!("must be create or update, got {}", other))),
    };
    Ok(success_one_ok(form_for(entity, mode)).into_response())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntitySummary<'a> {
    path_segment: &'a str,
    table: &'a str,
    operations: &'a [Operation],
    realm_scoped: bool,
    includes: Vec<&'a str>,
}

/// GET /api/admin/entities
pub async fn entities(State(state): State<AppState>, AdminUser(_admin): AdminUser) -> Response {
    let data: Vec<EntitySummary<'_>> = state
        .model
        .entities
        .iter()
        .map(|e| EntitySummary {
            path_segment: &e.path_segment,
            table: &e.table_name,
            operations: &e.operations,
            realm_scoped: e.scope_column().is_some(),
            includes: e.includes.iter().map(|i| i.name.as_str()).collect(),
        })
        .collect();
    success_many(data).into_response()
}
