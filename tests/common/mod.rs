//! In-memory auth service and profile store shared by the router tests.

#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Request, Response, header::SET_COOKIE},
};
use portico::{
    auth::{
        AuthConfig, AuthError, AuthService, AuthState, BoxFuture, IssuedSession, NewAccount,
        ProfileStore, UserIdentity,
    },
    guard::locale::LocaleSet,
    rate_limit::{FixedWindowRateLimiter, RateLimiter},
};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tower::ServiceExt;

pub const ADMIN_TOKEN: &str = "admin-token";
pub const CLIENT_TOKEN: &str = "client-token";
pub const NO_ROLE_TOKEN: &str = "norole-token";
pub const EXPIRED_TOKEN: &str = "expired-token";

pub const GOOD_REFRESH: &str = "good-refresh";
pub const ROTATED_REFRESH: &str = "rotated-refresh";
pub const BAD_REFRESH: &str = "bad-refresh";

pub const GOOD_CODE: &str = "good-code";
pub const TAKEN_EMAIL: &str = "taken@example.com";

fn user(id: &str) -> UserIdentity {
    UserIdentity {
        id: id.to_string(),
        email: Some(format!("{id}@example.com")),
        name: None,
    }
}

/// Auth service keyed by fixed tokens.
#[derive(Default)]
pub struct FakeAuth {
    pub down: AtomicBool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeAuth {
    fn record(&self, call: String) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AuthService for FakeAuth {
    fn get_user<'a>(
        &'a self,
        access_token: &'a str,
    ) -> BoxFuture<'a, Result<UserIdentity, AuthError>> {
        Box::pin(async move {
            self.record(format!("get_user:{access_token}"));
            match access_token {
                ADMIN_TOKEN => Ok(user("admin-1")),
                CLIENT_TOKEN => Ok(user("client-1")),
                NO_ROLE_TOKEN => Ok(user("norole-1")),
                _ => Err(AuthError::Unauthorized),
            }
        })
    }

    fn refresh_session<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<IssuedSession, AuthError>> {
        Box::pin(async move {
            self.record(format!("refresh:{refresh_token}"));
            if refresh_token == GOOD_REFRESH {
                Ok(IssuedSession {
                    access_token: CLIENT_TOKEN.to_string(),
                    refresh_token: Some(ROTATED_REFRESH.to_string()),
                    user: None,
                })
            } else {
                Err(AuthError::Unauthorized)
            }
        })
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        code_verifier: Option<&'a str>,
    ) -> BoxFuture<'a, Result<IssuedSession, AuthError>> {
        Box::pin(async move {
            self.record(format!(
                "exchange:{code}:{}",
                code_verifier.unwrap_or("none")
            ));
            if code == GOOD_CODE {
                Ok(IssuedSession {
                    access_token: ADMIN_TOKEN.to_string(),
                    refresh_token: Some(GOOD_REFRESH.to_string()),
                    user: Some(user("admin-1")),
                })
            } else {
                Err(AuthError::Upstream {
                    status: 400,
                    message: "invalid flow state".to_string(),
                })
            }
        })
    }

    fn create_user<'a>(
        &'a self,
        account: &'a NewAccount,
    ) -> BoxFuture<'a, Result<UserIdentity, AuthError>> {
        Box::pin(async move {
            self.record(format!("create_user:{}", account.email));
            if account.email == TAKEN_EMAIL {
                return Err(AuthError::Upstream {
                    status: 422,
                    message: "User already registered".to_string(),
                });
            }
            Ok(UserIdentity {
                id: "new-1".to_string(),
                email: Some(account.email.clone()),
                name: account.name.clone(),
            })
        })
    }

    fn health(&self) -> BoxFuture<'_, Result<(), AuthError>> {
        Box::pin(async move {
            if self.down.load(Ordering::SeqCst) {
                Err(AuthError::Transport("connection refused".to_string()))
            } else {
                Ok(())
            }
        })
    }
}

/// Profile rows: `admin-1` is an admin, `client-1` a client, everyone else has no row.
pub struct FakeProfiles {
    roles: Mutex<HashMap<String, String>>,
}

impl Default for FakeProfiles {
    fn default() -> Self {
        let roles = HashMap::from([
            ("admin-1".to_string(), "admin".to_string()),
            ("client-1".to_string(), "client".to_string()),
        ]);
        Self {
            roles: Mutex::new(roles),
        }
    }
}

impl FakeProfiles {
    pub fn set_role(&self, user_id: &str, role: &str) {
        self.roles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.to_string(), role.to_string());
    }
}

impl ProfileStore for FakeProfiles {
    fn role_for<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            Ok(self
                .roles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(user_id)
                .cloned())
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub auth: Arc<FakeAuth>,
    pub profiles: Arc<FakeProfiles>,
}

impl TestApp {
    pub fn new() -> Result<Self> {
        Self::with_config(|config| config)
    }

    pub fn with_config(configure: impl FnOnce(AuthConfig) -> AuthConfig) -> Result<Self> {
        let locales = LocaleSet::new(["en", "pt", "es"], "en")?;
        let config = configure(AuthConfig::new(locales));
        let auth = Arc::new(FakeAuth::default());
        let profiles = Arc::new(FakeProfiles::default());
        let limiter: Arc<dyn RateLimiter> =
            Arc::new(FixedWindowRateLimiter::new(10, Duration::from_secs(60)));
        let state = AuthState::new(config, auth.clone(), profiles.clone(), limiter)?;
        Ok(Self {
            router: portico::api::app(Arc::new(state)),
            auth,
            profiles,
        })
    }

    pub async fn send(&self, request: Request<Body>) -> Result<Response<Body>> {
        Ok(self.router.clone().oneshot(request).await?)
    }
}

pub fn get(uri: &str) -> Request<Body> {
    request("GET", uri, &[])
}

pub fn request(method: &str, uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder
        .body(Body::empty())
        .unwrap_or_else(|err| panic!("invalid test request {uri}: {err}"))
}

pub fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|err| panic!("invalid test request {uri}: {err}"))
}

pub fn location(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get("location")
        .and_then(|value| value.to_str().ok())
}

pub fn set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok().map(str::to_string))
        .collect()
}

pub async fn json_body(response: Response<Body>) -> Result<serde_json::Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    serde_json::from_slice(&bytes).context("response body is not JSON")
}

pub fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}
