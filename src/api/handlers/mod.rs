//! API handlers and shared request helpers.

pub mod callback;
pub mod health;
pub mod me;
pub mod pages;
pub mod register;
pub mod session;

use axum::{
    Json,
    http::{HeaderMap, StatusCode, header::ACCEPT_LANGUAGE},
    response::{IntoResponse, Response},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::guard::locale::LocaleSet;

/// `{error}` body returned by every failing API call.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
}

pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// `?lang=` selector for localized messages.
#[derive(Deserialize, Debug, Default)]
pub struct LangQuery {
    #[serde(default)]
    pub lang: Option<String>,
}

/// Locale for API messages: `lang` when it names a supported locale, otherwise
/// the negotiated `Accept-Language`.
pub(crate) fn request_locale<'a>(
    locales: &'a LocaleSet,
    lang: Option<&str>,
    headers: &HeaderMap,
) -> &'a str {
    if let Some(locale) = lang.and_then(|lang| locales.get(lang.trim())) {
        return locale;
    }
    let accept_language = headers
        .get(ACCEPT_LANGUAGE)
        .and_then(|value| value.to_str().ok());
    locales.negotiate(accept_language)
}

/// Caller IP from proxy headers: first `X-Forwarded-For` entry, then `X-Real-IP`.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| "unknown".to_string(), str::to_string)
}

/// Lightweight email sanity check before calling the auth service.
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}
