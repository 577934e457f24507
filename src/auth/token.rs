//! Unverified JWT payload decoding.
//!
//! The signature is NOT checked. Claims read here are only used as a lookup key
//! into the profile store and must never authorize anything on their own.

use base64ct::{Base64UrlUnpadded, Encoding};
use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Token is not a three part JWT")]
    Structure,
    #[error("Token payload is not base64url")]
    Encoding,
    #[error("Token payload is not a JSON object")]
    Payload,
    #[error("Token has no subject")]
    MissingSubject,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UnverifiedClaims {
    pub sub: String,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize)]
struct RawClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    email: Option<String>,
}

impl UnverifiedClaims {
    /// True when `exp` is present and not after `now` (unix seconds).
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp.is_some_and(|exp| exp <= now)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX));
        self.is_expired_at(now)
    }
}

/// Decode the payload segment of a JWT without verifying it.
///
/// # Errors
/// Returns a [`TokenError`] when the token is not a JWT with a `sub` claim.
pub fn decode_unverified(token: &str) -> Result<UnverifiedClaims, TokenError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Structure);
    };

    // Some issuers keep base64 padding on the payload.
    let payload = payload.trim_end_matches('=');
    let bytes = Base64UrlUnpadded::decode_vec(payload).map_err(|_| TokenError::Encoding)?;
    let raw: RawClaims = serde_json::from_slice(&bytes).map_err(|_| TokenError::Payload)?;

    let sub = raw
        .sub
        .filter(|sub| !sub.trim().is_empty())
        .ok_or(TokenError::MissingSubject)?;

    Ok(UnverifiedClaims {
        sub,
        exp: raw.exp,
        email: raw.email,
    })
}

#[cfg(test)]
pub(crate) fn unsigned_token(payload: &serde_json::Value) -> String {
    let header = Base64UrlUnpadded::encode_string(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = Base64UrlUnpadded::encode_string(payload.to_string().as_bytes());
    format!("{header}.{body}.signature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_subject_and_expiry() {
        let token = unsigned_token(&json!({
            "sub": "user-1",
            "exp": 1_700_000_000,
            "email": "a@b.co"
        }));
        let claims = decode_unverified(&token);
        assert_eq!(
            claims,
            Ok(UnverifiedClaims {
                sub: "user-1".to_string(),
                exp: Some(1_700_000_000),
                email: Some("a@b.co".to_string()),
            })
        );
    }

    #[test]
    fn expiry_is_checked_against_now() {
        let claims = UnverifiedClaims {
            sub: "u".to_string(),
            exp: Some(100),
            email: None,
        };
        assert!(claims.is_expired_at(100));
        assert!(!claims.is_expired_at(99));
        assert!(claims.is_expired());

        let no_exp = UnverifiedClaims {
            exp: None,
            ..claims
        };
        assert!(!no_exp.is_expired());
    }

    #[test]
    fn rejects_non_jwt() {
        assert_eq!(decode_unverified("opaque"), Err(TokenError::Structure));
        assert_eq!(decode_unverified("a.b.c.d"), Err(TokenError::Structure));
        assert_eq!(decode_unverified("a.!!!.c"), Err(TokenError::Encoding));
    }

    #[test]
    fn rejects_payload_without_subject() {
        let token = unsigned_token(&json!({"exp": 1}));
        assert_eq!(decode_unverified(&token), Err(TokenError::MissingSubject));

        let token = unsigned_token(&json!({"sub": "  "}));
        assert_eq!(decode_unverified(&token), Err(TokenError::MissingSubject));
    }

    #[test]
    fn rejects_non_json_payload() {
        let body = Base64UrlUnpadded::encode_string(b"not json");
        let token = format!("h.{body}.s");
        assert_eq!(decode_unverified(&token), Err(TokenError::Payload));
    }

    #[test]
    fn accepts_padded_payload() {
        // {"sub":"x"} is 11 bytes, so standard encoding pads it
        let token = "h.eyJzdWIiOiJ4In0=.s";
        assert_eq!(
            decode_unverified(token).map(|claims| claims.sub),
            Ok("x".to_string())
        );
    }
}
