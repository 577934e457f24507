use crate::auth::SessionStrategy;
use anyhow::{Context, Result, anyhow};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

pub const ARG_AUTH_URL: &str = "auth-url";
pub const ARG_AUTH_ANON_KEY: &str = "auth-anon-key";
pub const ARG_AUTH_SERVICE_ROLE_KEY: &str = "auth-service-role-key";
pub const ARG_AUTH_TIMEOUT_MS: &str = "auth-timeout-ms";
pub const ARG_SESSION_STRATEGY: &str = "session-strategy";
pub const ARG_ENVIRONMENT: &str = "environment";

#[derive(Debug)]
pub struct Options {
    pub url: Url,
    pub anon_key: SecretString,
    pub service_role_key: Option<SecretString>,
    pub timeout: Duration,
    pub strategy: SessionStrategy,
    pub secure_cookies: bool,
}

impl Options {
    /// Parse auth service arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the URL or a key is missing or invalid.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let url = non_empty(ARG_AUTH_URL)
            .with_context(|| format!("missing required argument: --{ARG_AUTH_URL}"))?;
        let url = Url::parse(&url).with_context(|| format!("invalid --{ARG_AUTH_URL}: {url}"))?;

        let anon_key = non_empty(ARG_AUTH_ANON_KEY)
            .map(SecretString::from)
            .with_context(|| format!("missing required argument: --{ARG_AUTH_ANON_KEY}"))?;

        let strategy = matches
            .get_one::<String>(ARG_SESSION_STRATEGY)
            .map_or(Ok(SessionStrategy::default()), |value| value.parse())
            .map_err(|err| anyhow!("invalid --{ARG_SESSION_STRATEGY}: {err}"))?;

        let timeout_ms = matches
            .get_one::<u64>(ARG_AUTH_TIMEOUT_MS)
            .copied()
            .unwrap_or(3000);

        let secure_cookies = matches
            .get_one::<String>(ARG_ENVIRONMENT)
            .is_some_and(|env| env.eq_ignore_ascii_case("production"));

        Ok(Self {
            url,
            anon_key,
            service_role_key: non_empty(ARG_AUTH_SERVICE_ROLE_KEY).map(SecretString::from),
            timeout: Duration::from_millis(timeout_ms),
            strategy,
            secure_cookies,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_AUTH_URL)
                .long(ARG_AUTH_URL)
                .help("Base URL of the auth service, e.g. https://project.supabase.co")
                .env("PORTICO_AUTH_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_AUTH_ANON_KEY)
                .long(ARG_AUTH_ANON_KEY)
                .help("Public (anon) API key of the auth service")
                .env("PORTICO_AUTH_ANON_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_AUTH_SERVICE_ROLE_KEY)
                .long(ARG_AUTH_SERVICE_ROLE_KEY)
                .help("Service role key, used for account creation and profile lookups")
                .env("PORTICO_AUTH_SERVICE_ROLE_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_AUTH_TIMEOUT_MS)
                .long(ARG_AUTH_TIMEOUT_MS)
                .help("Timeout for calls to the auth service, in milliseconds")
                .env("PORTICO_AUTH_TIMEOUT_MS")
                .default_value("3000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_SESSION_STRATEGY)
                .long(ARG_SESSION_STRATEGY)
                .help("How access tokens are checked")
                .env("PORTICO_SESSION_STRATEGY")
                .default_value("verified")
                .value_parser(["verified", "decode"]),
        )
        .arg(
            Arg::new(ARG_ENVIRONMENT)
                .long(ARG_ENVIRONMENT)
                .help("Deployment environment, production marks cookies Secure")
                .env("PORTICO_ENV")
                .default_value("development")
                .value_parser(["development", "production"]),
        )
}
