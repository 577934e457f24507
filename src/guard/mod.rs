//! Locale and role guard for page requests.
//!
//! Flow Overview:
//! 1) Redirect non-canonical paths (dot or empty segments) to their canonical form.
//! 2) Skip excluded paths (framework assets, `/api`, static files).
//! 3) Classify the path. Unlocalized paths are redirected to the negotiated locale.
//! 4) Public pages pass straight through.
//! 5) Otherwise resolve the session, then the role, and apply [`decide`].
//! 6) Cookie mutations from session resolution ride on whatever response goes out.

pub mod classify;
pub mod locale;

use axum::{
    extract::{Request, State},
    http::{
        HeaderValue, StatusCode,
        header::{ACCEPT_LANGUAGE, COOKIE, LOCATION, SET_COOKIE},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error};

use crate::auth::{
    AuthState, Principal, Role,
    cookies::{apply_set_cookies, cookie_header},
};
use classify::{RouteClass, RoutePrefixes, canonical_path, classify, is_excluded};

/// What the guard does with a classified request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    PassThrough,
    /// Prefix the path with the negotiated locale.
    Localize,
    /// Send the caller to another localized page.
    Redirect(String),
}

/// The single authorization decision for a classified page request.
///
/// | class            | admin            | client           | none / unauthenticated |
/// |------------------|------------------|------------------|------------------------|
/// | needs-locale     | localize         | localize         | localize               |
/// | locale-root      | `/{l}/{admin}`   | `/{l}/{client}`  | pass                   |
/// | admin-protected  | pass             | `/{l}/{client}`  | `/{l}/{sign-in}`       |
/// | client-protected | `/{l}/{admin}`   | pass             | `/{l}/{sign-in}`       |
/// | public           | pass             | pass             | pass                   |
#[must_use]
pub fn decide(class: &RouteClass, role: Option<Role>, prefixes: &RoutePrefixes) -> Decision {
    let landing = |locale: &str, role: Role| {
        let prefix = match role {
            Role::Admin => prefixes.admin(),
            Role::Client => prefixes.client(),
        };
        Decision::Redirect(format!("/{locale}/{prefix}"))
    };

    match (class, role) {
        (RouteClass::NeedsLocale, _) => Decision::Localize,
        (RouteClass::Public { .. }, _)
        | (RouteClass::LocaleRoot { .. }, None)
        | (RouteClass::AdminProtected { .. }, Some(Role::Admin))
        | (RouteClass::ClientProtected { .. }, Some(Role::Client)) => Decision::PassThrough,
        (RouteClass::LocaleRoot { locale }, Some(role))
        | (RouteClass::AdminProtected { locale }, Some(role))
        | (RouteClass::ClientProtected { locale }, Some(role)) => landing(locale, role),
        (RouteClass::AdminProtected { locale } | RouteClass::ClientProtected { locale }, None) => {
            Decision::Redirect(format!("/{locale}/{}", prefixes.sign_in()))
        }
    }
}

/// Prefix `path` with `locale`, keeping the query string. `/` becomes `/{locale}`.
#[must_use]
pub fn localize(locale: &str, path: &str, query: Option<&str>) -> String {
    let location = if path == "/" || path.is_empty() {
        format!("/{locale}")
    } else {
        format!("/{locale}{path}")
    };
    with_query(location, query)
}

fn with_query(mut location: String, query: Option<&str>) -> String {
    if let Some(query) = query.filter(|query| !query.is_empty()) {
        location.push('?');
        location.push_str(query);
    }
    location
}

/// `302 Found` to `location`.
pub fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(LOCATION, value)]).into_response(),
        Err(err) => {
            error!("Invalid redirect location {location:?}: {err}");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

/// Append `Set-Cookie` values to an outgoing response.
pub fn attach_cookies(response: &mut Response, cookies: Vec<HeaderValue>) {
    let headers = response.headers_mut();
    for cookie in cookies {
        headers.append(SET_COOKIE, cookie);
    }
}

/// Rewrite the request `Cookie` header with the cookies the response will set.
fn forward_cookies(request: &mut Request, cookies: &[HeaderValue]) {
    let rewritten = apply_set_cookies(cookie_header(request.headers()), cookies);
    let headers = request.headers_mut();
    match HeaderValue::from_str(&rewritten) {
        Ok(value) if !rewritten.is_empty() => {
            headers.insert(COOKIE, value);
        }
        _ => {
            headers.remove(COOKIE);
        }
    }
}

/// axum middleware guarding every page route.
pub async fn guard(
    State(state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let canonical = canonical_path(&path);
    if canonical != path {
        debug!("Redirecting non-canonical path {path} to {canonical}");
        return found(&with_query(canonical, request.uri().query()));
    }
    if is_excluded(&path) {
        return next.run(request).await;
    }

    let config = state.config();
    let class = classify(&path, config.locales(), config.prefixes());

    let mut cookies = Vec::new();
    let mut principal = None;
    if class.needs_role() {
        let resolution = state
            .sessions()
            .resolve(cookie_header(request.headers()))
            .await;
        cookies = resolution.cookies.clone();
        if let Some(user) = resolution.user() {
            if let Some(role) = state.roles().resolve(&user.id).await {
                principal = Some(Principal {
                    user: user.clone(),
                    role,
                });
            }
        }
    }

    let role = principal.as_ref().map(|principal| principal.role);
    let decision = decide(&class, role, config.prefixes());
    debug!("Guard decision for {path}: {decision:?} (role: {role:?})");

    let mut response = match decision {
        Decision::Localize => {
            let accept_language = request
                .headers()
                .get(ACCEPT_LANGUAGE)
                .and_then(|value| value.to_str().ok());
            let locale = config.locales().negotiate(accept_language);
            found(&localize(locale, &path, request.uri().query()))
        }
        Decision::Redirect(location) => found(&location),
        Decision::PassThrough => {
            if !cookies.is_empty() {
                forward_cookies(&mut request, &cookies);
            }
            if let Some(principal) = principal {
                request.extensions_mut().insert(principal);
            }
            next.run(request).await
        }
    };

    attach_cookies(&mut response, cookies);
    response
}
