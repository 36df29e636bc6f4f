use clap::{Arg, ArgMatches, Command};

pub const ARG_FEEDBACK_EMAIL_DESTINATION: &str = "feedback-email-destination";
pub const ARG_MAIL_QUEUE_CAPACITY: &str = "mail-queue-capacity";
pub const ARG_MAIL_MAX_ATTEMPTS: &str = "mail-max-attempts";

/// Mail accounts themselves come from `EMAIL_TYPE_<KIND>_*` variables.
#[derive(Debug, Clone)]
pub struct Options {
    pub feedback_destination: Option<String>,
    pub queue_capacity: usize,
    pub max_attempts: u32,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            feedback_destination: matches
                .get_one::<String>(ARG_FEEDBACK_EMAIL_DESTINATION)
                .cloned()
                .filter(|v| !v.trim().is_empty()),
            queue_capacity: matches
                .get_one::<usize>(ARG_MAIL_QUEUE_CAPACITY)
                .copied()
                .unwrap_or(256),
            max_attempts: matches
                .get_one::<u32>(ARG_MAIL_MAX_ATTEMPTS)
                .copied()
                .unwrap_or(5),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FEEDBACK_EMAIL_DESTINATION)
                .long(ARG_FEEDBACK_EMAIL_DESTINATION)
                .help("Address notified of every feedback submission")
                .env("FEEDBACK_EMAIL_DESTINATION"),
        )
        .arg(
            Arg::new(ARG_MAIL_QUEUE_CAPACITY)
                .long(ARG_MAIL_QUEUE_CAPACITY)
                .help("Outgoing mail queue capacity")
                .env("CUSTODIA_MAIL_QUEUE_CAPACITY")
                .default_value("256")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_MAIL_MAX_ATTEMPTS)
                .long(ARG_MAIL_MAX_ATTEMPTS)
                .help("Delivery attempts per message before it is dropped")
                .env("CUSTODIA_MAIL_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_destination_is_none() {
        temp_env::with_vars(
            [
                ("FEEDBACK_EMAIL_DESTINATION", Some("  ")),
                ("CUSTODIA_MAIL_QUEUE_CAPACITY", Some("8")),
                ("CUSTODIA_MAIL_MAX_ATTEMPTS", None),
            ],
            || {
                let matches = with_args(Command::new("test")).get_matches_from(vec!["test"]);
                let options = Options::parse(&matches);
                assert!(options.feedback_destination.is_none());
                assert_eq!(options.queue_capacity, 8);
                assert_eq!(options.max_attempts, 5);
            },
        );
    }
}
