pub mod database;
pub mod email;
pub mod jwt;
pub mod logging;
pub mod oauth;
pub mod seed;
pub mod sweep;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const ARG_PORT: &str = "port";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("custodia")
        .about("Identity, session and permission backend")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("CUSTODIA_PORT")
                .value_parser(clap::value_parser!(u16)),
        );

    let command = jwt::with_args(command);
    let command = database::with_args(command);
    let command = seed::with_args(command);
    let command = email::with_args(command);
    let command = oauth::with_args(command);
    let command = sweep::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "custodia");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Identity, session and permission backend".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_check_port_and_jwt() {
        temp_env::with_vars(
            [("CUSTODIA_PORT", None::<&str>), ("JWT_SECRET", None)],
            || {
                let matches = new().get_matches_from(vec![
                    "custodia",
                    "--port",
                    "9090",
                    "--jwt-secret",
                    "secret",
                    "--db-connection-type",
                    "MEMORY",
                ]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(9090));
                assert_eq!(
                    matches.get_one::<String>(jwt::ARG_JWT_SECRET).cloned(),
                    Some("secret".to_string())
                );
            },
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("CUSTODIA_PORT", Some("443")),
                ("JWT_SECRET", Some("secret")),
                ("DB_CONNECTION_TYPE", Some("MEMORY")),
                ("CUSTODIA_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["custodia"]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(443));
                assert_eq!(
                    matches
                        .get_one::<String>(database::ARG_DB_CONNECTION_TYPE)
                        .cloned(),
                    Some("MEMORY".to_string())
                );
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(2)
                );
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars([("CUSTODIA_LOG_LEVEL", Some(level))], || {
                let matches = new().get_matches_from(vec!["custodia"]);
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        for index in 0..5 {
            temp_env::with_vars([("CUSTODIA_LOG_LEVEL", None::<String>)], || {
                let mut args = vec!["custodia".to_string()];
                if index > 0 {
                    args.push(format!("-{}", "v".repeat(index)));
                }

                let matches = new().get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_unknown_connection_type_fails() {
        temp_env::with_vars([("DB_CONNECTION_TYPE", None::<&str>)], || {
            let result = new().try_get_matches_from(vec![
                "custodia",
                "--db-connection-type",
                "MONGO",
            ]);
            assert_eq!(
                result.map_err(|e| e.kind()).err(),
                Some(clap::error::ErrorKind::InvalidValue)
            );
        });
    }
}
