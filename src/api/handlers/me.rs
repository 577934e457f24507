use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::{
    auth::{
        AuthState, Role,
        cookies::{SessionCookies, cookie_header},
    },
    guard::attach_cookies,
};

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct MeResponse {
    role: Option<Role>,
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Role of the current session, null when unresolved", body = MeResponse),
        (status = 401, description = "No access token cookie", body = MeResponse)
    ),
    tag = "session"
)]
// axum handler for the caller's role
pub async fn me(Extension(state): Extension<Arc<AuthState>>, headers: HeaderMap) -> Response {
    let raw_cookies = cookie_header(&headers);
    if SessionCookies::from_header(raw_cookies).access_token.is_none() {
        return (StatusCode::UNAUTHORIZED, Json(MeResponse { role: None })).into_response();
    }

    let resolution = state.sessions().resolve(raw_cookies).await;
    let role = match resolution.user() {
        Some(user) => state.roles().resolve(&user.id).await,
        None => None,
    };

    let mut response = Json(MeResponse { role }).into_response();
    attach_cookies(&mut response, resolution.cookies);
    response
}
