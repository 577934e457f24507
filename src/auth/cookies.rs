//! Session cookie contract shared by the session endpoint, the OAuth callback
//! and the session resolver.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, InvalidHeaderValue},
};

use super::IssuedSession;

pub const ACCESS_TOKEN_COOKIE: &str = "sb-access-token";
pub const REFRESH_TOKEN_COOKIE: &str = "sb-refresh-token";
/// PKCE verifier left by the client-side OAuth flow.
pub const CODE_VERIFIER_COOKIE: &str = "sb-code-verifier";

pub const ACCESS_TOKEN_MAX_AGE_SECONDS: i64 = 60 * 60 * 24 * 7;
pub const REFRESH_TOKEN_MAX_AGE_SECONDS: i64 = 60 * 60 * 24 * 30;

/// Attributes applied to every session cookie.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CookieSettings {
    secure: bool,
}

impl CookieSettings {
    #[must_use]
    pub const fn new(secure: bool) -> Self {
        Self { secure }
    }

    #[must_use]
    pub const fn secure(self) -> bool {
        self.secure
    }

    fn build(
        self,
        name: &str,
        value: &str,
        max_age: i64,
    ) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie =
            format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }

    /// `Set-Cookie` value for the access token.
    ///
    /// # Errors
    /// Returns an error if the token cannot be carried in a header.
    pub fn access_cookie(self, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        self.build(ACCESS_TOKEN_COOKIE, token, ACCESS_TOKEN_MAX_AGE_SECONDS)
    }

    /// `Set-Cookie` value for the refresh token.
    ///
    /// # Errors
    /// Returns an error if the token cannot be carried in a header.
    pub fn refresh_cookie(self, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        self.build(REFRESH_TOKEN_COOKIE, token, REFRESH_TOKEN_MAX_AGE_SECONDS)
    }

    /// Expire a cookie immediately.
    ///
    /// # Errors
    /// Returns an error if `name` cannot be carried in a header.
    pub fn expired_cookie(self, name: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        self.build(name, "", 0)
    }

    /// Cookies for a freshly issued token pair. The refresh cookie is only
    /// written when the session carries one.
    ///
    /// # Errors
    /// Returns an error if a token cannot be carried in a header.
    pub fn session_cookies(
        self,
        session: &IssuedSession,
    ) -> Result<Vec<HeaderValue>, InvalidHeaderValue> {
        let mut cookies = vec![self.access_cookie(&session.access_token)?];
        if let Some(refresh) = session.refresh_token.as_deref().filter(|t| !t.is_empty()) {
            cookies.push(self.refresh_cookie(refresh)?);
        }
        Ok(cookies)
    }

    /// Cookies that clear both halves of the session pair.
    #[must_use]
    pub fn cleared_session_cookies(self) -> Vec<HeaderValue> {
        [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE]
            .iter()
            .filter_map(|name| self.expired_cookie(name).ok())
            .collect()
    }
}

/// Whether `value` can be stored as a cookie value without encoding
/// (RFC 6265 `cookie-octet`).
#[must_use]
pub fn is_cookie_safe(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_graphic() && !matches!(b, b'"' | b',' | b';' | b'\\'))
}

/// Find a cookie value in a raw `Cookie` header.
#[must_use]
pub fn read_cookie(cookie_header: &str, name: &str) -> Option<String> {
    cookie_header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        if key.trim() == name {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        } else {
            None
        }
    })
}

/// Raw `Cookie` header, if it is valid text.
#[must_use]
pub fn cookie_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(COOKIE).and_then(|value| value.to_str().ok())
}

/// Apply `Set-Cookie` values to a request `Cookie` header, so whatever handles
/// the request next sees the same cookies the browser will hold. Expired
/// cookies are dropped and the rest replace or extend existing pairs.
#[must_use]
pub fn apply_set_cookies(cookie_header: Option<&str>, set_cookies: &[HeaderValue]) -> String {
    let mut pairs: Vec<(String, String)> = cookie_header
        .unwrap_or_default()
        .split(';')
        .filter_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect();

    for set_cookie in set_cookies {
        let Ok(set_cookie) = set_cookie.to_str() else {
            continue;
        };
        let mut attributes = set_cookie.split(';');
        let Some((name, value)) = attributes.next().and_then(|pair| pair.split_once('=')) else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());
        let expired = attributes.any(|attribute| {
            attribute
                .trim()
                .split_once('=')
                .is_some_and(|(key, age)| key.eq_ignore_ascii_case("max-age") && age == "0")
        });

        pairs.retain(|(key, _)| key != name);
        if !expired && !value.is_empty() {
            pairs.push((name.to_string(), value.to_string()));
        }
    }

    pairs
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Session token pair as presented by the client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionCookies {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl SessionCookies {
    #[must_use]
    pub fn from_header(cookie_header: Option<&str>) -> Self {
        let Some(header) = cookie_header else {
            return Self::default();
        };
        Self {
            access_token: read_cookie(header, ACCESS_TOKEN_COOKIE),
            refresh_token: read_cookie(header, REFRESH_TOKEN_COOKIE),
        }
    }
}
