use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_JWT_EXPIRES_IN_HOUR: &str = "jwt-expires-in-hour";
pub const ARG_JWT_REFRESH_EXPIRES_IN_HOUR: &str = "jwt-refresh-expires-in-hour";

#[derive(Debug, Clone)]
pub struct Options {
    pub secret: SecretString,
    pub access_ttl_hours: i64,
    pub refresh_ttl_hours: i64,
}

impl Options {
    /// # Errors
    /// Returns an error if the secret is missing or empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let secret = match matches.get_one::<String>(ARG_JWT_SECRET) {
            Some(value) if !value.trim().is_empty() => SecretString::from(value.clone()),
            _ => anyhow::bail!("missing required argument: --{ARG_JWT_SECRET}"),
        };

        Ok(Self {
            secret,
            access_ttl_hours: matches
                .get_one::<i64>(ARG_JWT_EXPIRES_IN_HOUR)
                .copied()
                .unwrap_or(1),
            refresh_ttl_hours: matches
                .get_one::<i64>(ARG_JWT_REFRESH_EXPIRES_IN_HOUR)
                .copied()
                .unwrap_or(168),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HMAC key used to sign access tokens")
                .env("JWT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_JWT_EXPIRES_IN_HOUR)
                .long(ARG_JWT_EXPIRES_IN_HOUR)
                .help("Access token lifetime in hours")
                .env("JWT_EXPIRES_IN_HOUR")
                .default_value("1")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_JWT_REFRESH_EXPIRES_IN_HOUR)
                .long(ARG_JWT_REFRESH_EXPIRES_IN_HOUR)
                .help("Refresh token lifetime in hours")
                .env("JWT_REFRESH_EXPIRES_IN_HOUR")
                .default_value("168")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn secret_required() {
        temp_env::with_vars([("JWT_SECRET", Some(" "))], || {
            let matches = with_args(Command::new("test")).get_matches_from(vec!["test"]);
            let result = Options::parse(&matches);
            assert!(
                result
                    .err()
                    .is_some_and(|err| err.to_string().contains("--jwt-secret"))
            );
        });
    }

    #[test]
    fn ttls_from_env() -> Result<(), Box<dyn std::error::Error>> {
        temp_env::with_vars(
            [
                ("JWT_SECRET", Some("s3cret")),
                ("JWT_EXPIRES_IN_HOUR", Some("2")),
                ("JWT_REFRESH_EXPIRES_IN_HOUR", None),
            ],
            || {
                let matches = with_args(Command::new("test")).try_get_matches_from(vec!["test"])?;
                let options = Options::parse(&matches)?;
                assert_eq!(options.secret.expose_secret(), "s3cret");
                assert_eq!(options.access_ttl_hours, 2);
                assert_eq!(options.refresh_ttl_hours, 168);
                Ok(())
            },
        )
    }

    #[test]
    fn zero_ttl_rejected() {
        let result = with_args(Command::new("test")).try_get_matches_from(vec![
            "test",
            "--jwt-expires-in-hour",
            "0",
        ]);
        assert!(result.is_err());
    }
}
