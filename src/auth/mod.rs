//! Session and role resolution against the external auth service.
//!
//! The auth service (token issuance, session exchange, user lookup) and the
//! profile store (user id to role) are external collaborators reached through
//! the [`AuthService`] and [`ProfileStore`] traits. Everything here is
//! read-only apart from the cookie mutations handed back to the caller.

pub mod cookies;
pub mod pg;
pub mod role;
pub mod session;
pub mod state;
pub mod supabase;
pub mod token;

pub use role::{Role, RoleResolver};
pub use session::{Resolution, SessionResolver, SessionState, SessionStrategy};
pub use state::{AuthConfig, AuthState};

use serde::{Deserialize, Serialize};
use std::{future::Future, pin::Pin};
use utoipa::ToSchema;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Identity resolved from a session token. Never persisted.
#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Token pair returned by sign-in, refresh or code exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: Option<UserIdentity>,
}

#[derive(Clone, Debug)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

/// Authenticated caller attached to guarded requests that were let through.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub user: UserIdentity,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Token rejected by auth service")]
    Unauthorized,
    #[error("Auth service returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("Auth service request failed: {0}")]
    Transport(String),
    #[error("Auth service call timed out")]
    Timeout,
    #[error("Malformed auth service response: {0}")]
    Malformed(String),
    #[error("Auth service is not configured for {0}")]
    NotConfigured(&'static str),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// External identity provider.
pub trait AuthService: Send + Sync {
    /// Validate an access token and return its user.
    fn get_user<'a>(&'a self, access_token: &'a str)
    -> BoxFuture<'a, Result<UserIdentity, AuthError>>;

    /// Trade a refresh token for a new token pair.
    fn refresh_session<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<IssuedSession, AuthError>>;

    /// Trade an OAuth authorization code for a session.
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        code_verifier: Option<&'a str>,
    ) -> BoxFuture<'a, Result<IssuedSession, AuthError>>;

    fn create_user<'a>(
        &'a self,
        account: &'a NewAccount,
    ) -> BoxFuture<'a, Result<UserIdentity, AuthError>>;

    /// Reachability probe used by `/health`.
    fn health(&self) -> BoxFuture<'_, Result<(), AuthError>>;
}

/// Persisted profile rows keyed by user id.
pub trait ProfileStore: Send + Sync {
    /// Stored role string for `user_id`, `Ok(None)` when there is no row or no role.
    fn role_for<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, anyhow::Result<Option<String>>>;
}
