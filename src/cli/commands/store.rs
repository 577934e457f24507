use anyhow::{Result, bail};
use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

pub const ARG_PROFILE_STORE: &str = "profile-store";
pub const ARG_RATE_LIMIT_BACKEND: &str = "rate-limit-backend";
pub const ARG_RATE_LIMIT_MAX: &str = "rate-limit-max";
pub const ARG_RATE_LIMIT_WINDOW_SECONDS: &str = "rate-limit-window-seconds";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileBackend {
    Rest,
    Postgres,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackend {
    Memory,
    Postgres,
    None,
}

#[derive(Debug)]
pub struct Options {
    pub profiles: ProfileBackend,
    pub rate_limit: RateLimitBackend,
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
}

impl Options {
    /// Parse storage backends.
    ///
    /// # Errors
    /// Returns an error if a Postgres backend is selected without a DSN.
    pub fn parse(matches: &ArgMatches, dsn: Option<&str>) -> Result<Self> {
        let profiles = match matches.get_one::<String>(ARG_PROFILE_STORE).map(String::as_str) {
            Some("postgres") => ProfileBackend::Postgres,
            _ => ProfileBackend::Rest,
        };
        let rate_limit = match matches
            .get_one::<String>(ARG_RATE_LIMIT_BACKEND)
            .map(String::as_str)
        {
            Some("postgres") => RateLimitBackend::Postgres,
            Some("none") => RateLimitBackend::None,
            _ => RateLimitBackend::Memory,
        };

        if dsn.is_none() {
            if profiles == ProfileBackend::Postgres {
                bail!(
                    "missing required argument: --dsn (required by --{ARG_PROFILE_STORE} postgres)"
                );
            }
            if rate_limit == RateLimitBackend::Postgres {
                bail!(
                    "missing required argument: --dsn (required by --{ARG_RATE_LIMIT_BACKEND} postgres)"
                );
            }
        }

        Ok(Self {
            profiles,
            rate_limit,
            rate_limit_max: matches
                .get_one::<u32>(ARG_RATE_LIMIT_MAX)
                .copied()
                .unwrap_or(10),
            rate_limit_window: Duration::from_secs(
                matches
                    .get_one::<u64>(ARG_RATE_LIMIT_WINDOW_SECONDS)
                    .copied()
                    .unwrap_or(60),
            ),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PROFILE_STORE)
                .long(ARG_PROFILE_STORE)
                .help("Where user roles are read from")
                .env("PORTICO_PROFILE_STORE")
                .default_value("rest")
                .value_parser(["rest", "postgres"]),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_BACKEND)
                .long(ARG_RATE_LIMIT_BACKEND)
                .help("Registration rate limiter backend")
                .env("PORTICO_RATE_LIMIT_BACKEND")
                .default_value("memory")
                .value_parser(["memory", "postgres", "none"]),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_MAX)
                .long(ARG_RATE_LIMIT_MAX)
                .help("Registrations allowed per client within one window")
                .env("PORTICO_RATE_LIMIT_MAX")
                .default_value("10")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_WINDOW_SECONDS)
                .long(ARG_RATE_LIMIT_WINDOW_SECONDS)
                .help("Length of a rate limit window in seconds")
                .env("PORTICO_RATE_LIMIT_WINDOW_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
