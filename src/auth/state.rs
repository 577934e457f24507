//! Gateway configuration and shared request state.

use anyhow::{Context, Result};
use reqwest::Client;
use std::{sync::Arc, time::Duration};
use url::Url;

use super::{
    AuthService, ProfileStore,
    cookies::CookieSettings,
    role::RoleResolver,
    session::{SessionResolver, SessionStrategy},
};
use crate::{
    guard::{classify::RoutePrefixes, locale::LocaleSet},
    rate_limit::RateLimiter,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

#[derive(Clone, Debug)]
pub struct AuthConfig {
    locales: LocaleSet,
    prefixes: RoutePrefixes,
    strategy: SessionStrategy,
    timeout: Duration,
    cookies: CookieSettings,
    upstream: Option<Url>,
}

impl AuthConfig {
    #[must_use]
    pub fn new(locales: LocaleSet) -> Self {
        Self {
            locales,
            prefixes: RoutePrefixes::default(),
            strategy: SessionStrategy::default(),
            timeout: DEFAULT_TIMEOUT,
            cookies: CookieSettings::default(),
            upstream: None,
        }
    }

    #[must_use]
    pub fn with_prefixes(mut self, prefixes: RoutePrefixes) -> Self {
        self.prefixes = prefixes;
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: SessionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `Secure` is added to every session cookie when set (production).
    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.cookies = CookieSettings::new(secure);
        self
    }

    #[must_use]
    pub fn with_upstream(mut self, upstream: Option<Url>) -> Self {
        self.upstream = upstream;
        self
    }

    #[must_use]
    pub fn locales(&self) -> &LocaleSet {
        &self.locales
    }

    #[must_use]
    pub fn prefixes(&self) -> &RoutePrefixes {
        &self.prefixes
    }

    #[must_use]
    pub fn strategy(&self) -> SessionStrategy {
        self.strategy
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn cookies(&self) -> CookieSettings {
        self.cookies
    }

    #[must_use]
    pub fn upstream(&self) -> Option<&Url> {
        self.upstream.as_ref()
    }
}

/// Everything a request needs, shared behind an `Arc`.
pub struct AuthState {
    config: AuthConfig,
    auth: Arc<dyn AuthService>,
    sessions: SessionResolver,
    roles: RoleResolver,
    rate_limiter: Arc<dyn RateLimiter>,
    upstream_client: Client,
}

impl AuthState {
    /// # Errors
    /// Returns an error if the upstream HTTP client cannot be built.
    pub fn new(
        config: AuthConfig,
        auth: Arc<dyn AuthService>,
        profiles: Arc<dyn ProfileStore>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self> {
        let sessions = SessionResolver::new(
            auth.clone(),
            config.strategy(),
            config.timeout(),
            config.cookies(),
        );
        let roles = RoleResolver::new(profiles, config.timeout());

        // Redirects from the front-end go back to the browser untouched.
        let upstream_client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build upstream HTTP client")?;

        Ok(Self {
            config,
            auth,
            sessions,
            roles,
            rate_limiter,
            upstream_client,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn auth(&self) -> &dyn AuthService {
        self.auth.as_ref()
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionResolver {
        &self.sessions
    }

    #[must_use]
    pub fn roles(&self) -> &RoleResolver {
        &self.roles
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    pub(crate) fn upstream_client(&self) -> &Client {
        &self.upstream_client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{AuthError, BoxFuture, IssuedSession, NewAccount, UserIdentity},
        rate_limit::NoopRateLimiter,
    };

    struct NoAuth;

    impl AuthService for NoAuth {
        fn get_user<'a>(
            &'a self,
            _access_token: &'a str,
        ) -> BoxFuture<'a, Result<UserIdentity, AuthError>> {
            Box::pin(async { Err(AuthError::Unauthorized) })
        }

        fn refresh_session<'a>(
            &'a self,
            _refresh_token: &'a str,
        ) -> BoxFuture<'a, Result<IssuedSession, AuthError>> {
            Box::pin(async { Err(AuthError::Unauthorized) })
        }

        fn exchange_code<'a>(
            &'a self,
            _code: &'a str,
            _code_verifier: Option<&'a str>,
        ) -> BoxFuture<'a, Result<IssuedSession, AuthError>> {
            Box::pin(async { Err(AuthError::Unauthorized) })
        }

        fn create_user<'a>(
            &'a self,
            _account: &'a NewAccount,
        ) -> BoxFuture<'a, Result<UserIdentity, AuthError>> {
            Box::pin(async { Err(AuthError::NotConfigured("tests")) })
        }

        fn health(&self) -> BoxFuture<'_, Result<(), AuthError>> {
            Box::pin(async { Ok(()) })
        }
    }

    struct NoProfiles;

    impl ProfileStore for NoProfiles {
        fn role_for<'a>(
            &'a self,
            _user_id: &'a str,
        ) -> BoxFuture<'a, anyhow::Result<Option<String>>> {
            Box::pin(async { Ok(None) })
        }
    }

    fn locales() -> LocaleSet {
        LocaleSet::new(["en", "pt", "es"], "en").expect("valid locales")
    }

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new(locales());
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(config.strategy(), SessionStrategy::Verified);
        assert!(!config.cookies().secure());
        assert_eq!(config.prefixes(), &RoutePrefixes::default());
        assert!(config.upstream().is_none());

        let upstream = Url::parse("http://localhost:3000").expect("valid url");
        let config = config
            .with_timeout(Duration::from_millis(250))
            .with_strategy(SessionStrategy::Decode)
            .with_secure_cookies(true)
            .with_prefixes(RoutePrefixes::new("admin", "account", "login"))
            .with_upstream(Some(upstream.clone()));

        assert_eq!(config.timeout(), Duration::from_millis(250));
        assert_eq!(config.strategy(), SessionStrategy::Decode);
        assert!(config.cookies().secure());
        assert_eq!(config.prefixes().admin(), "admin");
        assert_eq!(config.upstream(), Some(&upstream));
    }

    #[test]
    fn auth_state_wires_resolvers_from_config() {
        let config = AuthConfig::new(locales()).with_strategy(SessionStrategy::Decode);
        let state = AuthState::new(
            config,
            Arc::new(NoAuth),
            Arc::new(NoProfiles),
            Arc::new(NoopRateLimiter),
        )
        .expect("state");
        assert_eq!(state.sessions().strategy(), SessionStrategy::Decode);
        assert_eq!(state.config().locales().default_locale(), "en");
    }
}
