//! Map validated command-line arguments to the action to run.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_DSN, ARG_PORT, auth, locale, routes, store};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .map(|dsn| dsn.trim().to_string())
        .filter(|dsn| !dsn.is_empty());

    let auth = auth::Options::parse(matches)?;
    let locales = locale::parse(matches)?;
    let routes = routes::Options::parse(matches)?;
    let store = store::Options::parse(matches, dsn.as_deref())?;

    Ok(Action::Server(Args {
        port,
        dsn,
        auth_url: auth.url,
        auth_anon_key: auth.anon_key,
        auth_service_role_key: auth.service_role_key,
        auth_timeout: auth.timeout,
        session_strategy: auth.strategy,
        secure_cookies: auth.secure_cookies,
        locales,
        prefixes: routes.prefixes,
        upstream: routes.upstream,
        profile_store: store.profiles,
        rate_limit: store.rate_limit,
        rate_limit_max: store.rate_limit_max,
        rate_limit_window: store.rate_limit_window,
    }))
}
