//! Roles: uniquely named permission sets.

pub mod models;
pub mod service;

pub use models::{CreateRoleCommand, Role, UpdateRoleCommand};
pub use service::RoleService;
