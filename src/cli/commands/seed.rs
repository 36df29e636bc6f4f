use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_DEFAULT_ROLE_NAME: &str = "default-role-name";
pub const ARG_DEFAULT_ROLE_TAG: &str = "default-role-tag";
pub const ARG_DEFAULT_ROLE_INFO: &str = "default-role-info";
pub const ARG_DEFAULT_USER_USERNAME: &str = "default-user-username";
pub const ARG_DEFAULT_USER_PASSWORD: &str = "default-user-password";

#[derive(Debug, Clone)]
pub struct Options {
    pub role_name: String,
    pub role_tag: String,
    pub role_info: String,
    pub username: String,
    /// No default user is seeded without one.
    pub password: Option<SecretString>,
}

impl Options {
    /// # Errors
    /// Returns an error if the default role name is blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let Some(role_name) = get_non_empty(ARG_DEFAULT_ROLE_NAME) else {
            anyhow::bail!("missing required argument: --{ARG_DEFAULT_ROLE_NAME}");
        };

        Ok(Self {
            role_name,
            role_tag: get_non_empty(ARG_DEFAULT_ROLE_TAG).unwrap_or_else(|| "default".to_string()),
            role_info: get_non_empty(ARG_DEFAULT_ROLE_INFO)
                .unwrap_or_else(|| "Default role".to_string()),
            username: get_non_empty(ARG_DEFAULT_USER_USERNAME)
                .unwrap_or_else(|| "admin".to_string()),
            password: get_non_empty(ARG_DEFAULT_USER_PASSWORD).map(SecretString::from),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DEFAULT_ROLE_NAME)
                .long(ARG_DEFAULT_ROLE_NAME)
                .help("Role assigned to self-registered accounts")
                .env("DEFAULT_ROLE_NAME")
                .default_value("user"),
        )
        .arg(
            Arg::new(ARG_DEFAULT_ROLE_TAG)
                .long(ARG_DEFAULT_ROLE_TAG)
                .help("Tag stored on the default role")
                .env("DEFAULT_ROLE_TAG")
                .default_value("default"),
        )
        .arg(
            Arg::new(ARG_DEFAULT_ROLE_INFO)
                .long(ARG_DEFAULT_ROLE_INFO)
                .help("Description stored on the default role")
                .env("DEFAULT_ROLE_INFO")
                .default_value("Default role"),
        )
        .arg(
            Arg::new(ARG_DEFAULT_USER_USERNAME)
                .long(ARG_DEFAULT_USER_USERNAME)
                .help("Username of the seeded administrator")
                .env("DEFAULT_USER_USERNAME")
                .default_value("admin"),
        )
        .arg(
            Arg::new(ARG_DEFAULT_USER_PASSWORD)
                .long(ARG_DEFAULT_USER_PASSWORD)
                .help("Password of the seeded administrator; seeding is skipped when unset")
                .env("DEFAULT_USER_PASSWORD")
                .hide_env_values(true),
        )
}
