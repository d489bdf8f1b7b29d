//! Shared application state for all routes.

use crate::auth::JwtKeys;
use crate::model::ResolvedModel;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub model: Arc<ResolvedModel>,
    pub jwt: JwtKeys,
    /// Add `Secure` to the session cookie.
    pub cookie_secure: bool,
}
