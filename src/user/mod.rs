//! Users, their role membership and the permission set derived from it.

pub mod avatar;
pub mod models;
pub mod password;
pub mod service;

pub use models::{CreateUserCommand, UpdateUserCommand, User, UserRoleCommand, UserView};
pub use service::UserService;
