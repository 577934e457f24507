//! Pass-through target for requests the guard lets in.
//!
//! With an upstream configured the request is proxied to the front-end, with
//! the principal carried in `x-portico-user-id` / `x-portico-role`. Without one
//! a small JSON page descriptor is returned.

use axum::{
    Json,
    body::{Body, to_bytes},
    extract::{Extension, Request},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{Instrument, error, info_span, warn};
use url::Url;

use crate::auth::{AuthState, Principal, Role};

pub const USER_ID_HEADER: &str = "x-portico-user-id";
pub const ROLE_HEADER: &str = "x-portico-role";

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct PageResponse {
    pub path: String,
    pub role: Option<Role>,
}

/// Copy headers that may cross the proxy, dropping hop-by-hop ones.
fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    for name in HOP_BY_HOP {
        forwarded.remove(name);
    }
    forwarded.remove(header::HOST);
    forwarded.remove(header::CONTENT_LENGTH);
    forwarded
}

/// Request headers for the upstream. Principal headers are only ever set here.
fn upstream_headers(headers: &HeaderMap, principal: Option<&Principal>) -> HeaderMap {
    let mut forwarded = forwardable(headers);
    forwarded.remove(USER_ID_HEADER);
    forwarded.remove(ROLE_HEADER);
    if let Some(principal) = principal {
        if let Ok(user_id) = HeaderValue::from_str(&principal.user.id) {
            forwarded.insert(USER_ID_HEADER, user_id);
        }
        forwarded.insert(ROLE_HEADER, HeaderValue::from_static(principal.role.as_str()));
    }
    forwarded
}

/// Upstream URL for `path` under the base path. `None` when the URL parser
/// would rewrite the path, so the upstream never serves a page other than
/// the one the guard classified.
fn upstream_url(base: &Url, path: &str, query: Option<&str>) -> Option<Url> {
    let expected = format!("{}{path}", base.path().trim_end_matches('/'));
    let mut url = base.clone();
    url.set_path(&expected);
    url.set_query(query);
    (url.path() == expected).then_some(url)
}

// axum fallback handler for guarded pages
pub async fn page(Extension(state): Extension<Arc<AuthState>>, request: Request) -> Response {
    let principal = request.extensions().get::<Principal>().cloned();

    let Some(upstream) = state.config().upstream() else {
        return Json(PageResponse {
            path: request.uri().path().to_string(),
            role: principal.map(|principal| principal.role),
        })
        .into_response();
    };

    let Some(url) = upstream_url(upstream, request.uri().path(), request.uri().query()) else {
        warn!("Refusing to proxy non-canonical path {}", request.uri().path());
        return StatusCode::BAD_REQUEST.into_response();
    };

    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(err) => {
            error!("Failed to read request body: {err}");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let span = info_span!("upstream.request", http.method = %parts.method, url = %url);
    let upstream_response = state
        .upstream_client()
        .request(parts.method.clone(), url)
        .headers(upstream_headers(&parts.headers, principal.as_ref()))
        .body(body)
        .send()
        .instrument(span)
        .await;

    let upstream_response = match upstream_response {
        Ok(response) => response,
        Err(err) => {
            error!("Upstream request failed: {err}");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let status = upstream_response.status();
    let headers = forwardable(upstream_response.headers());
    let bytes = match upstream_response.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!("Failed to read upstream response: {err}");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
