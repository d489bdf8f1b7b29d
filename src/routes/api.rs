//! Tenant routes under /api. Every handler requires a signed-in user and sees only the caller's realms.

use crate::handlers::{clusters, realms, signals, syntheses};
use crate::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/realms", get(realms::list).post(realms::create))
        .route(
            "/realms/:id",
            get(realms::read).patch(realms::update).delete(realms::delete),
        )
        .route(
            "/realms/:id/members",
            get(realms::list_members).post(realms::add_member),
        )
        .route("/realms/:id/members/:user_id", delete(realms::remove_member))
        .route("/signals", get(signals::list).post(signals::create))
        .route("/signals/nearby", get(signals::nearby))
        .route(
            "/signals/:id",
            get(signals::read).patch(signals::update).delete(signals::delete),
        )
        .route("/signals/:id/similar", get(signals::similar))
        .route("/clusters", get(clusters::list).post(clusters::create))
        .route(
            "/clusters/:id",
            get(clusters::read).patch(clusters::update).delete(clusters::delete),
        )
        .route("/clusters/:id/children", get(clusters::children))
        .route(
            "/clusters/:id/signals",
            get(clusters::list_signals).post(clusters::add_signal),
        )
        .route("/clusters/:id/signals/:signal_id", delete(clusters::remove_signal))
        .route("/clusters/:id/stats", get(clusters::stats))
        .route("/syntheses", get(syntheses::list).post(syntheses::create))
        .route(
            "/syntheses/:id",
            get(syntheses::read).patch(syntheses::update).delete(syntheses::delete),
        )
        .route("/syntheses/:id/errors", post(syntheses::append_error))
}
