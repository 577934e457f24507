//! Session persistence: mirror client-side tokens into `HttpOnly` cookies.

use axum::{
    Json,
    extract::{Extension, Query, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, instrument};
use utoipa::ToSchema;

use super::{ErrorResponse, LangQuery, error_response, request_locale};
use crate::{
    auth::{AuthState, IssuedSession, Role, cookies::is_cookie_safe},
    guard::attach_cookies,
    i18n,
};

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct SessionRequest {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct SessionCreated {
    ok: bool,
    role: Option<Role>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct SessionCleared {
    ok: bool,
}

#[utoipa::path(
    post,
    path = "/api/auth/session",
    params(("lang" = Option<String>, Query, description = "Locale for error messages")),
    request_body = SessionRequest,
    responses(
        (status = 200, description = "Session cookies set", body = SessionCreated),
        (status = 400, description = "Missing or unusable access token", body = ErrorResponse)
    ),
    tag = "session"
)]
#[instrument(skip_all)]
pub async fn create_session(
    Extension(state): Extension<Arc<AuthState>>,
    Query(query): Query<LangQuery>,
    headers: HeaderMap,
    payload: Result<Json<SessionRequest>, JsonRejection>,
) -> Response {
    let locale = request_locale(state.config().locales(), query.lang.as_deref(), &headers);
    let messages = i18n::messages(locale);

    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!("Rejected session payload: {rejection}");
            SessionRequest::default()
        }
    };

    let Some(access_token) = request
        .access_token
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
    else {
        return error_response(StatusCode::BAD_REQUEST, messages.missing_access_token);
    };
    let refresh_token = request
        .refresh_token
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());

    if !is_cookie_safe(&access_token)
        || refresh_token
            .as_deref()
            .is_some_and(|token| !is_cookie_safe(token))
    {
        return error_response(StatusCode::BAD_REQUEST, messages.invalid_access_token);
    }

    let session = IssuedSession {
        access_token,
        refresh_token,
        user: None,
    };
    let cookies = match state.config().cookies().session_cookies(&session) {
        Ok(cookies) => cookies,
        Err(err) => {
            error!("Failed to build session cookies: {err}");
            return error_response(StatusCode::BAD_REQUEST, messages.invalid_access_token);
        }
    };

    let role = match state.sessions().resolve_token(&session.access_token).await {
        Some(user) => state.roles().resolve(&user.id).await,
        None => None,
    };

    let mut response = Json(SessionCreated { ok: true, role }).into_response();
    attach_cookies(&mut response, cookies);
    response
}

#[utoipa::path(
    delete,
    path = "/api/auth/session",
    responses(
        (status = 200, description = "Session cookies cleared", body = SessionCleared)
    ),
    tag = "session"
)]
pub async fn delete_session(Extension(state): Extension<Arc<AuthState>>) -> Response {
    let mut response = Json(SessionCleared { ok: true }).into_response();
    attach_cookies(&mut response, state.config().cookies().cleared_session_cookies());
    response
}
