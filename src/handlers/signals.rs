//! Signal CRUD plus geographic and embedding lookups.

use crate::auth::AuthUser;
use crate::embedding::{self, cosine_similarity};
use crate::error::{AppError, FieldIssue};
use crate::geo::{bounding_box, haversine_km, GeoPoint};
use crate::handlers::params::{parse_id, query_f64, query_u32};
use crate::handlers::scoped::{entity, find_visible, scope_of, scoped_crud};
use crate::model::ResolvedEntity;
use crate::response::{present, success_many};
use crate::service::CrudService;
use crate::sql::{ListQuery, MAX_LIMIT};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};
use sqlx::PgConnection;
use std::collections::HashMap;

/// Half the Earth's circumference: any larger radius covers the globe.
const MAX_RADIUS_KM: f64 = 20_038.0;
const DEFAULT_RADIUS_KM: f64 = 10.0;
const DEFAULT_NEARBY_LIMIT: u32 = 50;
const DEFAULT_SIMILAR_LIMIT: u32 = 10;
const MAX_SIMILAR_LIMIT: u32 = 100;

scoped_crud!("signals");

fn row_point(row: &Value) -> Option<GeoPoint> {
    let lat = row.get("latitude")?.as_f64()?;
    let lon = row.get("longitude")?.as_f64()?;
    GeoPoint::new(lat, lon).ok()
}

fn rename_issue(issue: FieldIssue) -> AppError {
    let field = match issue.field.as_str() {
        "latitude" => "lat",
        "longitude" => "lon",
        other => other,
    };
    AppError::Validation(vec![FieldIssue::new(field, issue.message)])
}

fn with_score(mut row: Value, key: &str, score: f64) -> Value {
    if let Value::Object(ref mut map) = row {
        map.insert(key.into(), json!(score));
    }
    row
}

/// Keep the `limit` lowest-keyed rows.
fn keep_best(ranked: &mut Vec<(f64, Value)>, limit: usize) {
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
    ranked.truncate(limit);
}

/// Walk every row matching `query`, one page at a time in the entity's stable order, and keep the
/// `limit` rows with the lowest `key`. Rows for which `key` is None are skipped.
async fn rank_all<F>(
    conn: &mut PgConnection,
    entity: &ResolvedEntity,
    mut query: ListQuery,
    limit: usize,
    key: F,
) -> Result<Vec<(f64, Value)>, AppError>
where
    F: Fn(&Value) -> Option<f64>,
{
    let mut best = Vec::with_capacity(limit);
    let mut offset = 0u32;
    loop {
        query.limit = Some(MAX_LIMIT);
        query.offset = Some(offset);
        let page = CrudService::list(&mut *conn, entity, &query).await?;
        let fetched = page.len();
        best.extend(page.into_iter().filter_map(|row| key(&row).map(|k| (k, row))));
        keep_best(&mut best, limit);
        if fetched < MAX_LIMIT as usize {
            return Ok(best);
        }
        offset = offset.saturating_add(MAX_LIMIT);
    }
}

/// GET /api/signals/nearby?lat=&lon=&radius_km=&limit=
///
/// Candidates come from a bounding-box query over located signals; the exact great-circle
/// distance then filters and orders them, nearest first. Each row gains `distanceKm`.
pub async fn nearby(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let lat = query_f64(&params, "lat")?.ok_or_else(|| AppError::invalid("lat", "is required"))?;
    let lon = query_f64(&params, "lon")?.ok_or_else(|| AppError::invalid("lon", "is required"))?;
    let radius = query_f64(&params, "radius_km")?.unwrap_or(DEFAULT_RADIUS_KM);
    if radius <= 0.0 || radius > MAX_RADIUS_KM {
        return Err(AppError::invalid(
            "radius_km",
            format!("must be greater than 0 and at most {}", MAX_RADIUS_KM),
        ));
    }
    let limit = query_u32(&params, "limit")?
        .unwrap_or(DEFAULT_NEARBY_LIMIT)
        .clamp(1, MAX_LIMIT) as usize;
    let center = GeoPoint::new(lat, lon).map_err(rename_issue)?;

    let signals = entity(&state, "signals")?;
    let (min_lat, max_lat, min_lon, max_lon) = bounding_box(center, radius);
    let query = ListQuery {
        ranges: vec![
            ("latitude".into(), json!(min_lat), json!(max_lat)),
            ("longitude".into(), json!(min_lon), json!(max_lon)),
        ],
        not_null: vec!["latitude".into(), "longitude".into()],
        realm_scope: Some(scope_of(&state, &user).await?),
        ..ListQuery::default()
    };
    let mut conn = state.pool.acquire().await?;
    let hits = rank_all(&mut conn, signals, query, limit, |row| {
        let d = haversine_km(center, row_point(row)?);
        (d <= radius).then_some(d)
    })
    .await?;

    let data = hits
        .into_iter()
        .map(|(d, row)| with_score(present(signals, row), "distanceKm", d))
        .collect();
    Ok(success_many(data).into_response())
}

/// GET /api/signals/:id/similar?limit=
///
/// Ranks other visible signals with an embedding of the same dimension by cosine similarity.
/// Each row gains `similarity`.
pub async fn similar(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(raw_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let signals = entity(&state, "signals")?;
    let id = parse_id(signals, &raw_id)?;
    let limit = query_u32(&params, "limit")?
        .unwrap_or(DEFAULT_SIMILAR_LIMIT)
        .clamp(1, MAX_SIMILAR_LIMIT) as usize;
    let scope = scope_of(&state, &user).await?;

    let mut conn = state.pool.acquire().await?;
    let target = find_visible(&mut conn, signals, &id, &scope).await?;
    let target = target
        .get("embedding")
        .and_then(embedding::from_json)
        .ok_or_else(|| AppError::invalid("embedding", "signal has no embedding"))?;

    let query = ListQuery {
        not_null: vec!["embedding".into()],
        realm_scope: Some(scope),
        ..ListQuery::default()
    };
    // Ranked by negated similarity so the most similar sorts first.
    let scored = rank_all(&mut conn, signals, query, limit, |row| {
        if row.get("id") == Some(&id) {
            return None;
        }
        let v = row.get("embedding").and_then(embedding::from_json)?;
        (v.len() == target.len()).then(|| -f64::from(cosine_similarity(&target, &v)))
    })
    .await?;

    let data = scored
        .into_iter()
        .map(|(key, row)| with_score(present(signals, row), "similarity", -key))
        .collect();
    Ok(success_many(data).into_response())
}
