//! Session resolution from the session cookie pair.
//!
//! Flow Overview:
//! 1) Read `sb-access-token` / `sb-refresh-token` from the `Cookie` header.
//! 2) Validate the access token (auth service call, or unverified decode for the
//!    `decode` strategy).
//! 3) If the token is expired or rejected and a refresh token is present, trade it
//!    for a new pair and emit `Set-Cookie` values for it.
//! 4) Malformed or definitively rejected tokens clear both cookies.
//!
//! Nothing here fails: every error path resolves to `Unauthenticated`.

use axum::http::HeaderValue;
use std::{fmt, str::FromStr, sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::{Instrument, debug, info_span, warn};

use super::{
    AuthError, AuthService, IssuedSession, UserIdentity,
    cookies::{CookieSettings, SessionCookies},
    token::decode_unverified,
};

/// How access tokens are validated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionStrategy {
    /// Ask the auth service to verify the token and return the user.
    #[default]
    Verified,
    /// Decode the subject locally without signature verification. The subject
    /// is only used as a key into the profile store.
    Decode,
}

impl SessionStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Decode => "decode",
        }
    }
}

impl FromStr for SessionStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "verified" => Ok(Self::Verified),
            "decode" => Ok(Self::Decode),
            other => Err(format!("unknown session strategy: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated(UserIdentity),
}

/// Outcome of a resolution plus the `Set-Cookie` values it produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub state: SessionState,
    pub cookies: Vec<HeaderValue>,
}

impl Resolution {
    fn unauthenticated() -> Self {
        Self {
            state: SessionState::Unauthenticated,
            cookies: Vec::new(),
        }
    }

    #[must_use]
    pub fn user(&self) -> Option<&UserIdentity> {
        match &self.state {
            SessionState::Authenticated(user) => Some(user),
            SessionState::Unauthenticated => None,
        }
    }
}

enum TokenCheck {
    Valid(UserIdentity),
    /// Expired or rejected: a refresh may recover it.
    Stale,
    /// Not a usable token at all.
    Malformed,
    /// Could not reach a verdict.
    Unavailable,
}

#[derive(Clone)]
pub struct SessionResolver {
    auth: Arc<dyn AuthService>,
    strategy: SessionStrategy,
    timeout: Duration,
    cookies: CookieSettings,
}

impl SessionResolver {
    #[must_use]
    pub fn new(
        auth: Arc<dyn AuthService>,
        strategy: SessionStrategy,
        timeout: Duration,
        cookies: CookieSettings,
    ) -> Self {
        Self {
            auth,
            strategy,
            timeout,
            cookies,
        }
    }

    #[must_use]
    pub fn strategy(&self) -> SessionStrategy {
        self.strategy
    }

    /// Resolve the caller from a raw `Cookie` header.
    pub async fn resolve(&self, cookie_header: Option<&str>) -> Resolution {
        let presented = SessionCookies::from_header(cookie_header);

        let Some(access_token) = presented.access_token else {
            return match presented.refresh_token {
                Some(refresh_token) => self.refresh(&refresh_token).await,
                None => Resolution::unauthenticated(),
            };
        };

        match self.check_token(&access_token).await {
            TokenCheck::Valid(user) => Resolution {
                state: SessionState::Authenticated(user),
                cookies: Vec::new(),
            },
            TokenCheck::Stale => match presented.refresh_token {
                Some(refresh_token) => self.refresh(&refresh_token).await,
                None => self.cleared(),
            },
            TokenCheck::Malformed => self.cleared(),
            TokenCheck::Unavailable => Resolution::unauthenticated(),
        }
    }

    /// Resolve a single access token without touching cookies.
    pub async fn resolve_token(&self, access_token: &str) -> Option<UserIdentity> {
        match self.check_token(access_token).await {
            TokenCheck::Valid(user) => Some(user),
            TokenCheck::Stale | TokenCheck::Malformed | TokenCheck::Unavailable => None,
        }
    }

    async fn check_token(&self, access_token: &str) -> TokenCheck {
        match self.strategy {
            SessionStrategy::Verified => self.verify(access_token).await,
            SessionStrategy::Decode => match decode_unverified(access_token) {
                Ok(claims) if claims.is_expired() => {
                    debug!("Access token expired");
                    TokenCheck::Stale
                }
                Ok(claims) => TokenCheck::Valid(UserIdentity {
                    id: claims.sub,
                    email: claims.email,
                    name: None,
                }),
                Err(err) => {
                    debug!("Discarding access token: {err}");
                    TokenCheck::Malformed
                }
            },
        }
    }

    async fn verify(&self, access_token: &str) -> TokenCheck {
        let span = info_span!("auth.get_user");
        let result = timeout(self.timeout, self.auth.get_user(access_token))
            .instrument(span)
            .await
            .unwrap_or(Err(AuthError::Timeout));

        match result {
            Ok(user) => TokenCheck::Valid(user),
            Err(AuthError::Unauthorized) => {
                debug!("Access token rejected by auth service");
                TokenCheck::Stale
            }
            Err(err) => {
                warn!("Failed to validate access token: {err}");
                TokenCheck::Unavailable
            }
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Resolution {
        let span = info_span!("auth.refresh_session");
        let result = timeout(self.timeout, self.auth.refresh_session(refresh_token))
            .instrument(span)
            .await
            .unwrap_or(Err(AuthError::Timeout));

        let session = match result {
            Ok(session) => session,
            Err(AuthError::Unauthorized) => {
                debug!("Refresh token rejected, clearing session cookies");
                return self.cleared();
            }
            Err(err) => {
                warn!("Failed to refresh session: {err}");
                return Resolution::unauthenticated();
            }
        };

        let cookies = match self.cookies.session_cookies(&session) {
            Ok(cookies) => cookies,
            Err(err) => {
                warn!("Refreshed token cannot be stored as a cookie: {err}");
                return self.cleared();
            }
        };

        match self.user_for(&session).await {
            Some(user) => Resolution {
                state: SessionState::Authenticated(user),
                cookies,
            },
            // Keep the new pair even if the user could not be loaded right now.
            None => Resolution {
                state: SessionState::Unauthenticated,
                cookies,
            },
        }
    }

    async fn user_for(&self, session: &IssuedSession) -> Option<UserIdentity> {
        if let Some(user) = &session.user {
            return Some(user.clone());
        }
        match self.check_token(&session.access_token).await {
            TokenCheck::Valid(user) => Some(user),
            TokenCheck::Stale | TokenCheck::Malformed | TokenCheck::Unavailable => None,
        }
    }

    fn cleared(&self) -> Resolution {
        Resolution {
            state: SessionState::Unauthenticated,
            cookies: self.cookies.cleared_session_cookies(),
        }
    }
}

impl fmt::Debug for SessionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionResolver")
            .field("strategy", &self.strategy)
            .field("timeout", &self.timeout)
            .field("cookies", &self.cookies)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{BoxFuture, NewAccount, token::unsigned_token};
    use serde_json::json;
    use std::sync::Mutex;

    /// Auth service double keyed by token value.
    #[derive(Default)]
    struct FakeAuth {
        users: Vec<(String, UserIdentity)>,
        refreshes: Vec<(String, IssuedSession)>,
        unavailable: bool,
        slow: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeAuth {
        fn record(&self, call: String) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call);
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }
    }

    impl AuthService for FakeAuth {
        fn get_user<'a>(
            &'a self,
            access_token: &'a str,
        ) -> BoxFuture<'a, Result<UserIdentity, AuthError>> {
            Box::pin(async move {
                self.record(format!("get_user:{access_token}"));
                if self.slow {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                if self.unavailable {
                    return Err(AuthError::Transport("connection refused".to_string()));
                }
                self.users
                    .iter()
                    .find(|(token, _)| token == access_token)
                    .map(|(_, user)| user.clone())
                    .ok_or(AuthError::Unauthorized)
            })
        }

        fn refresh_session<'a>(
            &'a self,
            refresh_token: &'a str,
        ) -> BoxFuture<'a, Result<IssuedSession, AuthError>> {
            Box::pin(async move {
                self.record(format!("refresh:{refresh_token}"));
                if self.unavailable {
                    return Err(AuthError::Transport("connection refused".to_string()));
                }
                self.refreshes
                    .iter()
                    .find(|(token, _)| token == refresh_token)
                    .map(|(_, session)| session.clone())
                    .ok_or(AuthError::Unauthorized)
            })
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

    fn user(id: &str) -> UserIdentity {
        UserIdentity {
            id: id.to_string(),
            email: None,
            name: None,
        }
    }

    fn resolver(auth: FakeAuth, strategy: SessionStrategy) -> (SessionResolver, Arc<FakeAuth>) {
        let auth = Arc::new(auth);
        let resolver = SessionResolver::new(
            auth.clone(),
            strategy,
            Duration::from_millis(100),
            CookieSettings::new(false),
        );
        (resolver, auth)
    }

    fn cookie_strings(resolution: &Resolution) -> Vec<String> {
        resolution
            .cookies
            .iter()
            .filter_map(|value| value.to_str().ok().map(str::to_string))
            .collect()
    }

    #[test]
    fn strategy_parses_from_str() {
        assert_eq!("verified".parse(), Ok(SessionStrategy::Verified));
        assert_eq!(" Decode ".parse(), Ok(SessionStrategy::Decode));
        assert!("jwt".parse::<SessionStrategy>().is_err());
        assert_eq!(SessionStrategy::default(), SessionStrategy::Verified);
    }

    #[tokio::test]
    async fn no_cookies_is_unauthenticated_without_calls() {
        let (resolver, auth) = resolver(FakeAuth::default(), SessionStrategy::Verified);
        let resolution = resolver.resolve(None).await;
        assert_eq!(resolution.state, SessionState::Unauthenticated);
        assert!(resolution.cookies.is_empty());
        assert!(auth.calls().is_empty());

        let resolution = resolver.resolve(Some("theme=dark")).await;
        assert_eq!(resolution.state, SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn verified_token_resolves_user() {
        let fake = FakeAuth {
            users: vec![("good".to_string(), user("u1"))],
            ..FakeAuth::default()
        };
        let (resolver, _) = resolver(fake, SessionStrategy::Verified);
        let resolution = resolver.resolve(Some("sb-access-token=good")).await;
        assert_eq!(resolution.user(), Some(&user("u1")));
        assert!(resolution.cookies.is_empty());
    }

    #[tokio::test]
    async fn rejected_token_refreshes_and_sets_cookies() {
        let fake = FakeAuth {
            refreshes: vec![(
                "r1".to_string(),
                IssuedSession {
                    access_token: "new-access".to_string(),
                    refresh_token: Some("r2".to_string()),
                    user: Some(user("u1")),
                },
            )],
            ..FakeAuth::default()
        };
        let (resolver, auth) = resolver(fake, SessionStrategy::Verified);
        let resolution = resolver
            .resolve(Some("sb-access-token=old; sb-refresh-token=r1"))
            .await;

        assert_eq!(resolution.user(), Some(&user("u1")));
        assert_eq!(
            cookie_strings(&resolution),
            vec![
                "sb-access-token=new-access; Path=/; HttpOnly; SameSite=Lax; Max-Age=604800",
                "sb-refresh-token=r2; Path=/; HttpOnly; SameSite=Lax; Max-Age=2592000",
            ]
        );
        assert_eq!(auth.calls(), vec!["get_user:old", "refresh:r1"]);
    }

    #[tokio::test]
    async fn refresh_only_cookie_is_refreshed() {
        let fake = FakeAuth {
            users: vec![("fresh".to_string(), user("u2"))],
            refreshes: vec![(
                "r1".to_string(),
                IssuedSession {
                    access_token: "fresh".to_string(),
                    refresh_token: None,
                    user: None,
                },
            )],
            ..FakeAuth::default()
        };
        let (resolver, auth) = resolver(fake, SessionStrategy::Verified);
        let resolution = resolver.resolve(Some("sb-refresh-token=r1")).await;
        assert_eq!(resolution.user(), Some(&user("u2")));
        assert_eq!(resolution.cookies.len(), 1);
        assert_eq!(auth.calls(), vec!["refresh:r1", "get_user:fresh"]);
    }

    #[tokio::test]
    async fn rejected_token_without_refresh_clears_cookies() {
        let (resolver, _) = resolver(FakeAuth::default(), SessionStrategy::Verified);
        let resolution = resolver.resolve(Some("sb-access-token=bad")).await;
        assert_eq!(resolution.state, SessionState::Unauthenticated);
        assert_eq!(
            cookie_strings(&resolution),
            vec![
                "sb-access-token=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
                "sb-refresh-token=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
            ]
        );
    }

    #[tokio::test]
    async fn rejected_refresh_clears_cookies() {
        let (resolver, _) = resolver(FakeAuth::default(), SessionStrategy::Verified);
        let resolution = resolver
            .resolve(Some("sb-access-token=bad; sb-refresh-token=revoked"))
            .await;
        assert_eq!(resolution.state, SessionState::Unauthenticated);
        assert_eq!(resolution.cookies.len(), 2);
    }

    #[tokio::test]
    async fn transport_failure_keeps_cookies() {
        let fake = FakeAuth {
            unavailable: true,
            ..FakeAuth::default()
        };
        let (resolver, _) = resolver(fake, SessionStrategy::Verified);
        let resolution = resolver
            .resolve(Some("sb-access-token=good; sb-refresh-token=r1"))
            .await;
        assert_eq!(resolution, Resolution::unauthenticated());
    }

    #[tokio::test]
    async fn slow_auth_service_times_out() {
        let fake = FakeAuth {
            users: vec![("good".to_string(), user("u1"))],
            slow: true,
            ..FakeAuth::default()
        };
        let (resolver, _) = resolver(fake, SessionStrategy::Verified);
        let resolution = resolver.resolve(Some("sb-access-token=good")).await;
        assert_eq!(resolution, Resolution::unauthenticated());
    }

    #[tokio::test]
    async fn decode_strategy_reads_subject_without_calls() {
        let token = unsigned_token(&json!({"sub": "u9", "email": "u9@example.com"}));
        let (resolver, auth) = resolver(FakeAuth::default(), SessionStrategy::Decode);
        let resolution = resolver
            .resolve(Some(&format!("sb-access-token={token}")))
            .await;
        assert_eq!(
            resolution.user().map(|u| (u.id.as_str(), u.email.as_deref())),
            Some(("u9", Some("u9@example.com")))
        );
        assert!(auth.calls().is_empty());
    }

    #[tokio::test]
    async fn decode_strategy_clears_malformed_token() {
        let (resolver, _) = resolver(FakeAuth::default(), SessionStrategy::Decode);
        let resolution = resolver.resolve(Some("sb-access-token=garbage")).await;
        assert_eq!(resolution.state, SessionState::Unauthenticated);
        assert_eq!(resolution.cookies.len(), 2);
    }

    #[tokio::test]
    async fn decode_strategy_refreshes_expired_token() {
        let expired = unsigned_token(&json!({"sub": "u1", "exp": 1}));
        let fake = FakeAuth {
            refreshes: vec![(
                "r1".to_string(),
                IssuedSession {
                    access_token: unsigned_token(&json!({"sub": "u1"})),
                    refresh_token: Some("r2".to_string()),
                    user: None,
                },
            )],
            ..FakeAuth::default()
        };
        let (resolver, auth) = resolver(fake, SessionStrategy::Decode);
        let resolution = resolver
            .resolve(Some(&format!(
                "sb-access-token={expired}; sb-refresh-token=r1"
            )))
            .await;
        assert_eq!(resolution.user().map(|u| u.id.as_str()), Some("u1"));
        assert_eq!(resolution.cookies.len(), 2);
        assert_eq!(auth.calls(), vec!["refresh:r1"]);
    }

    #[tokio::test]
    async fn resolve_token_never_mutates() {
        let fake = FakeAuth {
            users: vec![("good".to_string(), user("u1"))],
            ..FakeAuth::default()
        };
        let (resolver, _) = resolver(fake, SessionStrategy::Verified);
        assert_eq!(resolver.resolve_token("good").await, Some(user("u1")));
        assert_eq!(resolver.resolve_token("bad").await, None);
    }
}
