use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::auth::OAuthClientConfig;

pub const ARG_GOOGLE_CLIENT_ID: &str = "google-client-id";
pub const ARG_GOOGLE_CLIENT_SECRET: &str = "google-client-secret";
pub const ARG_GOOGLE_REDIRECT_URI: &str = "google-redirect-uri";

#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Present only when both client id and secret are configured.
    pub google: Option<OAuthClientConfig>,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let google = match (
            get_non_empty(ARG_GOOGLE_CLIENT_ID),
            get_non_empty(ARG_GOOGLE_CLIENT_SECRET),
        ) {
            (Some(client_id), Some(secret)) => Some(OAuthClientConfig {
                client_id,
                client_secret: SecretString::from(secret),
                redirect_uri: get_non_empty(ARG_GOOGLE_REDIRECT_URI),
            }),
            _ => None,
        };

        Self { google }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_ID)
                .long(ARG_GOOGLE_CLIENT_ID)
                .help("Google OAuth client id")
                .env("GOOGLE_CLIENT_ID"),
        )
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_SECRET)
                .long(ARG_GOOGLE_CLIENT_SECRET)
                .help("Google OAuth client secret")
                .env("GOOGLE_CLIENT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_GOOGLE_REDIRECT_URI)
                .long(ARG_GOOGLE_REDIRECT_URI)
                .help("Google OAuth redirect URI")
                .env("GOOGLE_REDIRECT_URI"),
        )
}
