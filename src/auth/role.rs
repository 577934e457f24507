//! Role lookup for resolved users.

use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::{Instrument, debug, info_span, warn};
use utoipa::ToSchema;

use super::ProfileStore;

/// Authorization tier stored per user in the profile store.
#[derive(ToSchema, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
}

impl Role {
    /// Parse a stored role. Values outside the closed set yield `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "admin" => Some(Self::Admin),
            "client" => Some(Self::Client),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a user id to its role with a single bounded lookup per call.
#[derive(Clone)]
pub struct RoleResolver {
    store: Arc<dyn ProfileStore>,
    timeout: Duration,
}

impl RoleResolver {
    #[must_use]
    pub fn new(store: Arc<dyn ProfileStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Resolve the role for `user_id`.
    ///
    /// Lookup failures, timeouts, missing rows and unknown role values all
    /// resolve to `None`.
    pub async fn resolve(&self, user_id: &str) -> Option<Role> {
        let span = info_span!("role.resolve", user_id = %user_id);
        let lookup = timeout(self.timeout, self.store.role_for(user_id))
            .instrument(span)
            .await;

        match lookup {
            Ok(Ok(Some(value))) => {
                let role = Role::parse(&value);
                if role.is_none() {
                    warn!("Ignoring unknown role {value:?} for user {user_id}");
                }
                role
            }
            Ok(Ok(None)) => {
                debug!("No role stored for user {user_id}");
                None
            }
            Ok(Err(err)) => {
                warn!("Failed to look up role: {err}");
                None
            }
            Err(_) => {
                warn!(
                    "Role lookup timed out after {}ms",
                    self.timeout.as_millis()
                );
                None
            }
        }
    }
}

impl fmt::Debug for RoleResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleResolver")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
