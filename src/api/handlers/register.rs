use axum::{
    Json,
    extract::{Extension, Query, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, error, instrument, warn};
use utoipa::ToSchema;

use super::{
    ErrorResponse, LangQuery, error_response, extract_client_ip, request_locale, valid_email,
};
use crate::{
    auth::{AuthError, AuthState, NewAccount, UserIdentity},
    i18n,
    rate_limit::RateLimitDecision,
};

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct RegisterRequest {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterResponse {
    user: UserIdentity,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    params(("lang" = Option<String>, Query, description = "Locale for error messages")),
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created", body = RegisterResponse),
        (status = 400, description = "Missing fields or invalid email", body = ErrorResponse),
        (status = 429, description = "Too many registrations from this IP", body = ErrorResponse),
        (status = 500, description = "Account creation failed", body = ErrorResponse)
    ),
    tag = "register"
)]
#[instrument(skip_all)]
pub async fn register(
    Extension(state): Extension<Arc<AuthState>>,
    Query(query): Query<LangQuery>,
    headers: HeaderMap,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Response {
    let locale = request_locale(state.config().locales(), query.lang.as_deref(), &headers);
    let messages = i18n::messages(locale);

    let ip = extract_client_ip(&headers);
    if state.rate_limiter().check(&format!("register:{ip}")).await == RateLimitDecision::Limited {
        warn!("Registration rate limit hit for {ip}");
        return error_response(StatusCode::TOO_MANY_REQUESTS, messages.too_many_requests);
    }

    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!("Rejected registration payload: {rejection}");
            RegisterRequest::default()
        }
    };

    let (Some(email), Some(password)) = (non_empty(request.email), non_empty(request.password))
    else {
        return error_response(StatusCode::BAD_REQUEST, messages.missing_email_or_password);
    };

    let email = email.trim().to_lowercase();
    if !valid_email(&email) {
        return error_response(StatusCode::BAD_REQUEST, messages.invalid_email);
    }

    let account = NewAccount {
        email,
        password,
        name: non_empty(request.name).map(|name| name.trim().to_string()),
    };

    let result = timeout(state.config().timeout(), state.auth().create_user(&account))
        .await
        .unwrap_or(Err(AuthError::Timeout));

    match result {
        Ok(user) => Json(RegisterResponse { user }).into_response(),
        Err(AuthError::Upstream { status, message }) => {
            // The provider's own message is shown to the user.
            let status = StatusCode::from_u16(status)
                .ok()
                .filter(|status| status.is_client_error() || status.is_server_error())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let message = if message.trim().is_empty() {
                messages.server_error
            } else {
                message.as_str()
            };
            error_response(status, message)
        }
        Err(err) => {
            error!("Failed to create account: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, messages.server_error)
        }
    }
}
