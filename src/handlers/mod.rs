//! HTTP handlers: auth, realm-scoped resources, and the admin API.

pub mod auth;
pub mod clusters;
pub mod entity;
pub mod forms;
pub mod params;
pub mod realms;
pub(crate) mod scoped;
pub mod signals;
pub mod syntheses;
