//! OAuth return leg: trade the authorization code for a session.

use axum::{
    extract::{Extension, Query},
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::{
    auth::{
        AuthError, AuthState, Role,
        cookies::{CODE_VERIFIER_COOKIE, cookie_header, read_cookie},
    },
    guard::{attach_cookies, found},
};

#[derive(Deserialize, Debug, Default)]
pub struct CallbackQuery {
    #[serde(default)]
    code: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/auth/callback",
    params(("code" = Option<String>, Query, description = "OAuth authorization code")),
    responses(
        (status = 302, description = "Redirect to the landing page for the resolved role, or to sign-in")
    ),
    tag = "session"
)]
#[instrument(skip_all)]
pub async fn callback(
    Extension(state): Extension<Arc<AuthState>>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Response {
    let prefixes = state.config().prefixes();
    let sign_in = format!("/{}", prefixes.sign_in());

    let Some(code) = query.code.filter(|code| !code.trim().is_empty()) else {
        debug!("OAuth callback without code");
        return found(&sign_in);
    };
    let verifier = cookie_header(&headers).and_then(|raw| read_cookie(raw, CODE_VERIFIER_COOKIE));

    let result = timeout(
        state.config().timeout(),
        state.auth().exchange_code(&code, verifier.as_deref()),
    )
    .await
    .unwrap_or(Err(AuthError::Timeout));

    let session = match result {
        Ok(session) => session,
        Err(err) => {
            warn!("OAuth code exchange failed: {err}");
            return found(&sign_in);
        }
    };

    let cookie_settings = state.config().cookies();
    let mut cookies = match cookie_settings.session_cookies(&session) {
        Ok(cookies) => cookies,
        Err(err) => {
            warn!("Exchanged token cannot be stored as a cookie: {err}");
            return found(&sign_in);
        }
    };
    if verifier.is_some() {
        if let Ok(expired) = cookie_settings.expired_cookie(CODE_VERIFIER_COOKIE) {
            cookies.push(expired);
        }
    }

    let user = match session.user {
        Some(user) => Some(user),
        None => state.sessions().resolve_token(&session.access_token).await,
    };
    let role = match &user {
        Some(user) => state.roles().resolve(&user.id).await,
        None => None,
    };

    // The guard adds the locale prefix on the next hop.
    let landing = match role {
        Some(Role::Admin) => prefixes.admin(),
        Some(Role::Client) | None => prefixes.client(),
    };
    let mut response = found(&format!("/{landing}"));
    attach_cookies(&mut response, cookies);
    response
}
