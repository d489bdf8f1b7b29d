//! Admin routes under /api/admin: unscoped CRUD over every catalog entity, plus form metadata.
//! Uses parameterized paths; handlers resolve the entity by path segment.

use crate::handlers::entity::{create, delete as delete_handler, list, read, update};
use crate::handlers::forms::{entities, form};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/entities", get(entities))
        .route("/forms/:path_segment", get(form))
        .route("/:path_segment", get(list).post(create))
        .route(
            "/:path_segment/:id",
            get(read).patch(update).delete(delete_handler),
        )
}
