//! Autonomy: multi-tenant REST backend for signals, clusters and syntheses on PostgreSQL.

pub mod auth;
pub mod case;
pub mod db;
pub mod domain;
pub mod embedding;
pub mod error;
pub mod forms;
pub mod geo;
pub mod handlers;
pub mod ids;
pub mod migration;
pub mod model;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;

pub use db::ensure_database_exists;
pub use error::{AppError, AuthError, CatalogError, SettingsError};
pub use migration::apply_migrations;
pub use model::{catalog, resolve, ResolvedEntity, ResolvedModel};
pub use routes::build_router;
pub use settings::Settings;
pub use state::AppState;
