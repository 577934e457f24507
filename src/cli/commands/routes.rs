use crate::guard::classify::RoutePrefixes;
use anyhow::{Context, Result, bail};
use clap::{Arg, ArgMatches, Command};
use url::Url;

pub const ARG_ADMIN_PREFIX: &str = "admin-prefix";
pub const ARG_CLIENT_PREFIX: &str = "client-prefix";
pub const ARG_SIGN_IN_PATH: &str = "sign-in-path";
pub const ARG_UPSTREAM_URL: &str = "upstream-url";

#[derive(Debug)]
pub struct Options {
    pub prefixes: RoutePrefixes,
    pub upstream: Option<Url>,
}

fn segment<'a>(matches: &'a ArgMatches, id: &str) -> Result<&'a str> {
    let value = matches
        .get_one::<String>(id)
        .map(|value| value.trim().trim_matches('/'))
        .unwrap_or_default();
    if value.is_empty() || value.contains('/') {
        bail!("--{id} must be a single path segment, got '{value}'");
    }
    Ok(value)
}

impl Options {
    /// Parse route prefixes and the optional upstream.
    ///
    /// # Errors
    /// Returns an error if a prefix is not a single segment, the prefixes
    /// collide, or the upstream URL is invalid.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let admin = segment(matches, ARG_ADMIN_PREFIX)?;
        let client = segment(matches, ARG_CLIENT_PREFIX)?;
        let sign_in = segment(matches, ARG_SIGN_IN_PATH)?;
        if admin == client || admin == sign_in || client == sign_in {
            bail!(
                "--{ARG_ADMIN_PREFIX}, --{ARG_CLIENT_PREFIX} and --{ARG_SIGN_IN_PATH} must differ"
            );
        }

        let upstream = matches
            .get_one::<String>(ARG_UPSTREAM_URL)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(|value| {
                Url::parse(value).with_context(|| format!("invalid --{ARG_UPSTREAM_URL}: {value}"))
            })
            .transpose()?;

        Ok(Self {
            prefixes: RoutePrefixes::new(admin, client, sign_in),
            upstream,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ADMIN_PREFIX)
                .long(ARG_ADMIN_PREFIX)
                .help("Path segment of the admin area")
                .env("PORTICO_ADMIN_PREFIX")
                .default_value("dashboard"),
        )
        .arg(
            Arg::new(ARG_CLIENT_PREFIX)
                .long(ARG_CLIENT_PREFIX)
                .help("Path segment of the client area")
                .env("PORTICO_CLIENT_PREFIX")
                .default_value("profile"),
        )
        .arg(
            Arg::new(ARG_SIGN_IN_PATH)
                .long(ARG_SIGN_IN_PATH)
                .help("Path segment of the sign-in page")
                .env("PORTICO_SIGN_IN_PATH")
                .default_value("sign-in"),
        )
        .arg(
            Arg::new(ARG_UPSTREAM_URL)
                .long(ARG_UPSTREAM_URL)
                .help("Front-end that receives requests the guard lets through")
                .long_help(
                    "Front-end that receives requests the guard lets through. Without it, pages answer with a JSON descriptor.",
                )
                .env("PORTICO_UPSTREAM_URL"),
        )
}
