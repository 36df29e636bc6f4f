//! Maps validated CLI matches to the action the binary runs.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_PORT, database, email, jwt, oauth, seed, sweep};
use anyhow::Result;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);

    let jwt = jwt::Options::parse(matches)?;
    let database = database::Options::parse(matches)?;
    let seed = seed::Options::parse(matches)?;
    let email = email::Options::parse(matches);
    let oauth = oauth::Options::parse(matches);
    let sweep = sweep::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        jwt,
        database,
        seed,
        email,
        oauth,
        sweep,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::database::Connection;

    #[test]
    fn jwt_secret_required() {
        temp_env::with_vars(
            [
                ("JWT_SECRET", None::<&str>),
                ("DB_CONNECTION_TYPE", Some("MEMORY")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["custodia"]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(
                        err.to_string()
                            .contains("missing required argument: --jwt-secret")
                    );
                }
            },
        );
    }

    #[test]
    fn memory_server_action() -> Result<(), Box<dyn std::error::Error>> {
        temp_env::with_vars(
            [
                ("JWT_SECRET", Some("secret")),
                ("DB_CONNECTION_TYPE", Some("memory")),
                ("CUSTODIA_PORT", Some("8181")),
                ("DEFAULT_USER_PASSWORD", None),
            ],
            || {
                let matches = crate::cli::commands::new().try_get_matches_from(vec!["custodia"])?;
                let Action::Server(args) = handler(&matches)?;
                assert_eq!(args.port, 8181);
                assert!(matches!(args.database.connection, Connection::Memory));
                assert!(args.seed.password.is_none());
                assert_eq!(args.sweep.blocker_interval.as_secs(), 30);
                Ok(())
            },
        )
    }
}
