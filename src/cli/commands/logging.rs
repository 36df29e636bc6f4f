use clap::{Arg, ArgMatches, Command, builder::ValueParser};

use crate::cli::telemetry::LogFormat;

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_LOG_FORMAT: &str = "log-format";

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>()
            && parsed <= 5
        {
            return Ok(parsed);
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

/// Log format chosen on the command line, pretty when absent.
#[must_use]
pub fn log_format(matches: &ArgMatches) -> LogFormat {
    matches
        .get_one::<LogFormat>(ARG_LOG_FORMAT)
        .copied()
        .unwrap_or_default()
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("CUSTODIA_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
        .arg(
            Arg::new(ARG_LOG_FORMAT)
                .long(ARG_LOG_FORMAT)
                .help("Log output format: pretty or json")
                .env("CUSTODIA_LOG_FORMAT")
                .global(true)
                .default_value("pretty")
                .value_parser(|value: &str| value.parse::<LogFormat>()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_from_env() {
        temp_env::with_vars([("CUSTODIA_LOG_FORMAT", Some("json"))], || {
            let matches = with_args(Command::new("test")).get_matches_from(vec!["test"]);
            assert_eq!(log_format(&matches), LogFormat::Json);
        });
    }

    #[test]
    fn log_format_rejects_unknown() {
        temp_env::with_vars([("CUSTODIA_LOG_FORMAT", None::<&str>)], || {
            let result = with_args(Command::new("test")).try_get_matches_from(vec![
                "test",
                "--log-format",
                "xml",
            ]);
            assert_eq!(
                result.map_err(|e| e.kind()).err(),
                Some(clap::error::ErrorKind::ValueValidation)
            );
        });
    }
}
