use crate::{
    api,
    auth::{
        AuthConfig, AuthState, ProfileStore, SessionStrategy,
        pg::PgProfileStore,
        supabase::{RestProfileStore, SupabaseAuth},
    },
    cli::commands::store::{ProfileBackend, RateLimitBackend},
    guard::{classify::RoutePrefixes, locale::LocaleSet},
    rate_limit::{FixedWindowRateLimiter, NoopRateLimiter, PgRateLimiter, RateLimiter},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{fmt::Write as _, sync::Arc, time::Duration};
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub auth_url: Url,
    pub auth_anon_key: SecretString,
    pub auth_service_role_key: Option<SecretString>,
    pub auth_timeout: Duration,
    pub session_strategy: SessionStrategy,
    pub secure_cookies: bool,
    pub locales: LocaleSet,
    pub prefixes: RoutePrefixes,
    pub upstream: Option<Url>,
    pub profile_store: ProfileBackend,
    pub rate_limit: RateLimitBackend,
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
}

/// Execute the server action.
/// # Errors
/// Returns an error if a backend cannot be initialized or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let pool = match &args.dsn {
        Some(dsn)
            if args.profile_store == ProfileBackend::Postgres
                || args.rate_limit == RateLimitBackend::Postgres =>
        {
            Some(connect(dsn).await?)
        }
        _ => None,
    };

    let auth = SupabaseAuth::new(
        args.auth_url.clone(),
        args.auth_anon_key.clone(),
        args.auth_service_role_key.clone(),
    )?;

    let profiles: Arc<dyn ProfileStore> = match (args.profile_store, &pool) {
        (ProfileBackend::Postgres, Some(pool)) => Arc::new(PgProfileStore::new(pool.clone())),
        _ => {
            // Without the service key the profiles table must be readable with the anon key.
            let key = args
                .auth_service_role_key
                .clone()
                .unwrap_or_else(|| args.auth_anon_key.clone());
            Arc::new(RestProfileStore::new(args.auth_url.clone(), key)?)
        }
    };

    let rate_limiter: Arc<dyn RateLimiter> = match (args.rate_limit, &pool) {
        (RateLimitBackend::Postgres, Some(pool)) => Arc::new(PgRateLimiter::new(
            pool.clone(),
            args.rate_limit_max,
            args.rate_limit_window,
        )),
        (RateLimitBackend::None, _) => Arc::new(NoopRateLimiter),
        _ => Arc::new(FixedWindowRateLimiter::new(
            args.rate_limit_max,
            args.rate_limit_window,
        )),
    };

    let config = AuthConfig::new(args.locales)
        .with_prefixes(args.prefixes)
        .with_strategy(args.session_strategy)
        .with_timeout(args.auth_timeout)
        .with_secure_cookies(args.secure_cookies)
        .with_upstream(args.upstream);

    let state = AuthState::new(config, Arc::new(auth), profiles, rate_limiter)?;

    api::new(args.port, Arc::new(state)).await
}

async fn connect(dsn: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .with_context(|| format!("Failed to connect to database {}", redact_dsn(dsn)))
}

fn log_startup_args(args: &Args) {
    let rate_limit_backend = format!("{:?}", args.rate_limit).to_lowercase();
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("auth_url", args.auth_url.to_string()),
        (
            "service_role_key_set",
            args.auth_service_role_key.is_some().to_string(),
        ),
        ("auth_timeout_ms", args.auth_timeout.as_millis().to_string()),
        ("session_strategy", args.session_strategy.as_str().to_string()),
        ("secure_cookies", args.secure_cookies.to_string()),
        ("locales", args.locales.supported().join(",")),
        ("default_locale", args.locales.default_locale().to_string()),
        (
            "routes",
            format!(
                "/{} /{} /{}",
                args.prefixes.admin(),
                args.prefixes.client(),
                args.prefixes.sign_in()
            ),
        ),
        (
            "upstream",
            args.upstream
                .as_ref()
                .map_or_else(|| "none (json)".to_string(), ToString::to_string),
        ),
        (
            "dsn",
            args.dsn
                .as_deref()
                .map_or_else(|| "none".to_string(), redact_dsn),
        ),
        ("profile_store", format!("{:?}", args.profile_store).to_lowercase()),
        (
            "rate_limit",
            format!(
                "{rate_limit_backend} ({} per {}s)",
                args.rate_limit_max,
                args.rate_limit_window.as_secs()
            ),
        ),
    ];

    let width = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} ({})\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let _ = write!(message, "\n  {key:<width$} {value}");
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let hash = hash.trim();
    hash.get(..7).unwrap_or(hash)
}
