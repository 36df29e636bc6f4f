use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

pub const ARG_BLOCKER_SWEEP_SECONDS: &str = "blocker-sweep-seconds";
pub const ARG_RESET_SWEEP_SECONDS: &str = "reset-sweep-seconds";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    pub blocker_interval: Duration,
    pub reset_interval: Duration,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let seconds = |id: &str, default: u64| {
            Duration::from_secs(matches.get_one::<u64>(id).copied().unwrap_or(default))
        };
        Self {
            blocker_interval: seconds(ARG_BLOCKER_SWEEP_SECONDS, 30),
            reset_interval: seconds(ARG_RESET_SWEEP_SECONDS, 600),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_BLOCKER_SWEEP_SECONDS)
                .long(ARG_BLOCKER_SWEEP_SECONDS)
                .help("Interval between sweeps of expired IP blocks")
                .env("CUSTODIA_BLOCKER_SWEEP_SECONDS")
                .default_value("30")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_RESET_SWEEP_SECONDS)
                .long(ARG_RESET_SWEEP_SECONDS)
                .help("Interval between sweeps of expired reset codes")
                .env("CUSTODIA_RESET_SWEEP_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
