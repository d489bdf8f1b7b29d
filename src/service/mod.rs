//! Data access: generic CRUD over the resolved model, plus the domain services.

pub mod clusters;
pub(crate) mod crud;
pub mod realms;
pub mod rules;
pub mod syntheses;
pub mod users;
mod validation;
pub use crud::{resolve_includes, CrudService};
pub use validation::{is_required, RequestValidator};
