//! # Custodia (identity, session and permission backend)
//!
//! `custodia` issues and verifies credentials and answers the question "may
//! this principal do that?" for every protected operation.
//!
//! ## Credentials
//!
//! A successful login yields an HS256 access token (`{sub, exp, authorized}`)
//! and an opaque 24-character refresh token. Each user holds at most one
//! session; logging in again replaces it and refreshing rotates both tokens.
//! Only the SHA-256 of the refresh token is stored.
//!
//! ## Authorization
//!
//! Roles carry `(domain, action)` permissions and users carry role ids. The
//! effective set is the union over all assigned roles. A literal `*` in
//! either slot matches any value there, so the seeded `admin` role with
//! `(*, *)` may do anything. Self-service reads and writes are allowed where
//! the target is the caller.
//!
//! ## Recovery and abuse control
//!
//! Password reset runs over a six digit emailed code valid for three
//! minutes. Signups are throttled per client address by a short-lived
//! `(ip, method, path)` deny list.
//!
//! ## Storage
//!
//! Every collection sits behind an async repository trait with a Postgres
//! implementation (`sqlx`) and an in-memory one used for tests and
//! `DB_CONNECTION_TYPE=MEMORY`.

pub mod api;
pub mod auth;
pub mod blocker;
pub mod cli;
pub mod clock;
pub mod error;
pub mod feedback;
pub mod mailer;
pub mod permission;
pub mod reset_password;
pub mod role;
pub mod services;
pub mod session;
pub mod stats;
pub mod store;
pub mod token;
pub mod user;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
