//! Authentication flows: password login, signup, token refresh, logout and
//! external provider sign-in.

pub mod oauth;
pub mod service;

pub use oauth::{GoogleProvider, OAuthClientConfig, OAuthProvider, OAuthRegistry, ProviderProfile};
pub use service::{AuthService, DEFAULT_ROLE_NAME};
