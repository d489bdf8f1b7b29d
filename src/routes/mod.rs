//! Router assembly.

mod admin;
mod api;
mod auth;
mod common;

pub use admin::admin_routes;
pub use api::api_routes;
pub use auth::auth_routes;
pub use common::common_routes;

use crate::state::AppState;
use axum::Router;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// The full application: common routes, /api/auth, /api/admin, and the tenant /api.
pub fn build_router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .merge(common_routes())
        .nest("/api/auth", auth_routes())
        .nest("/api/admin", admin_routes())
        .nest("/api", api_routes())
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
