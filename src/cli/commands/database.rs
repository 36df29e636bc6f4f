use anyhow::{Context, anyhow};
use clap::{Arg, ArgMatches, Command, builder::PossibleValuesParser};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

pub const ARG_DB_CONNECTION_TYPE: &str = "db-connection-type";
pub const ARG_DB_URI: &str = "db-uri";
pub const ARG_DB_HOST: &str = "db-host";
pub const ARG_DB_PORT: &str = "db-port";
pub const ARG_DB_USER: &str = "db-user";
pub const ARG_DB_PASSWORD: &str = "db-password";
pub const ARG_DB_NAME: &str = "db-name";

/// How the store is reached.
#[derive(Debug, Clone)]
pub enum Connection {
    /// Full DSN from `--db-uri`.
    Remote(SecretString),
    /// DSN assembled from host, port, user, password and database name.
    Container(SecretString),
    /// In-process maps, nothing persisted.
    Memory,
}

impl Connection {
    /// Postgres DSN, `None` for the in-memory store.
    #[must_use]
    pub fn dsn(&self) -> Option<&SecretString> {
        match self {
            Self::Remote(dsn) | Self::Container(dsn) => Some(dsn),
            Self::Memory => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Options {
    pub connection: Connection,
}

impl Options {
    /// # Errors
    /// Returns an error if the arguments required by the connection type are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let kind = get_non_empty(ARG_DB_CONNECTION_TYPE).unwrap_or_else(|| "REMOTE".to_string());
        let connection = match kind.to_ascii_uppercase().as_str() {
            "REMOTE" => {
                let uri = get_non_empty(ARG_DB_URI)
                    .ok_or_else(|| anyhow!("missing required argument: --{ARG_DB_URI}"))?;
                Connection::Remote(SecretString::from(uri))
            }
            "CONTAINER" => {
                let host = get_non_empty(ARG_DB_HOST).unwrap_or_else(|| "localhost".to_string());
                let port = matches.get_one::<u16>(ARG_DB_PORT).copied().unwrap_or(5432);
                let user = get_non_empty(ARG_DB_USER).unwrap_or_else(|| "postgres".to_string());
                let password = get_non_empty(ARG_DB_PASSWORD).map(SecretString::from);
                let name = get_non_empty(ARG_DB_NAME).unwrap_or_else(|| "custodia".to_string());
                Connection::Container(container_dsn(&host, port, &user, password.as_ref(), &name)?)
            }
            "MEMORY" => Connection::Memory,
            other => anyhow::bail!("unknown --{ARG_DB_CONNECTION_TYPE}: {other}"),
        };

        Ok(Self { connection })
    }
}

fn container_dsn(
    host: &str,
    port: u16,
    user: &str,
    password: Option<&SecretString>,
    name: &str,
) -> anyhow::Result<SecretString> {
    let mut dsn = Url::parse(&format!("postgres://{host}:{port}/{name}"))
        .with_context(|| format!("invalid database host: {host}"))?;
    dsn.set_username(user)
        .map_err(|()| anyhow!("Error setting username"))?;
    if let Some(password) = password {
        dsn.set_password(Some(password.expose_secret()))
            .map_err(|()| anyhow!("Error setting password"))?;
    }
    Ok(SecretString::from(dsn.to_string()))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DB_CONNECTION_TYPE)
                .long(ARG_DB_CONNECTION_TYPE)
                .help("Store backend: REMOTE, CONTAINER or MEMORY")
                .env("DB_CONNECTION_TYPE")
                .default_value("REMOTE")
                .ignore_case(true)
                .value_parser(PossibleValuesParser::new(["REMOTE", "CONTAINER", "MEMORY"])),
        )
        .arg(
            Arg::new(ARG_DB_URI)
                .long(ARG_DB_URI)
                .help("Database connection string, used with REMOTE")
                .env("DB_URI")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_DB_HOST)
                .long(ARG_DB_HOST)
                .help("Database host, used with CONTAINER")
                .env("DB_HOST")
                .default_value("localhost"),
        )
        .arg(
            Arg::new(ARG_DB_PORT)
                .long(ARG_DB_PORT)
                .help("Database port, used with CONTAINER")
                .env("DB_PORT")
                .default_value("5432")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DB_USER)
                .long(ARG_DB_USER)
                .help("Database user, used with CONTAINER")
                .env("DB_USER")
                .default_value("postgres"),
        )
        .arg(
            Arg::new(ARG_DB_PASSWORD)
                .long(ARG_DB_PASSWORD)
                .help("Database password, used with CONTAINER")
                .env("DB_PASSWORD")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_DB_NAME)
                .long(ARG_DB_NAME)
                .help("Database name")
                .env("DB_NAME")
                .default_value("custodia"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    const DB_VARS: [&str; 7] = [
        "DB_CONNECTION_TYPE",
        "DB_URI",
        "DB_HOST",
        "DB_PORT",
        "DB_USER",
        "DB_PASSWORD",
        "DB_NAME",
    ];

    fn parse(args: &[&str]) -> anyhow::Result<Options> {
        let cleared = DB_VARS.map(|name| (name, None::<&str>));
        temp_env::with_vars(cleared, || {
            let mut argv = vec!["test"];
            argv.extend_from_slice(args);
            let matches = with_args(Command::new("test")).try_get_matches_from(argv)?;
            Options::parse(&matches)
        })
    }

    #[test]
    fn remote_requires_uri() {
        let result = parse(&[]);
        assert!(
            result
                .err()
                .is_some_and(|err| err.to_string().contains("--db-uri"))
        );
    }

    #[test]
    fn remote_uses_uri() -> anyhow::Result<()> {
        let options = parse(&["--db-uri", "postgres://u:p@db:5432/app"])?;
        let dsn = options.connection.dsn().map(|dsn| dsn.expose_secret().to_string());
        assert_eq!(dsn.as_deref(), Some("postgres://u:p@db:5432/app"));
        Ok(())
    }

    #[test]
    fn container_builds_dsn() -> anyhow::Result<()> {
        let options = parse(&[
            "--db-connection-type",
            "container",
            "--db-host",
            "pg",
            "--db-port",
            "5433",
            "--db-password",
            "p@ss",
        ])?;
        assert!(matches!(options.connection, Connection::Container(_)));
        let dsn = options.connection.dsn().map(|dsn| dsn.expose_secret().to_string());
        assert_eq!(dsn.as_deref(), Some("postgres://postgres:p%40ss@pg:5433/custodia"));
        Ok(())
    }

    #[test]
    fn memory_needs_nothing() -> anyhow::Result<()> {
        let options = parse(&["--db-connection-type", "MEMORY"])?;
        assert!(options.connection.dsn().is_none());
        Ok(())
    }
}
