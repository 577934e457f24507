//! # Portico (locale and role aware gateway)
//!
//! `portico` sits in front of a localized web front-end whose accounts live in an
//! external auth-as-a-service provider. Every page request goes through a single
//! guard that:
//!
//! 1. Enforces a locale prefix (`/{locale}/...`), negotiating one from
//!    `Accept-Language` when the path has none.
//! 2. Resolves the caller's session from the `sb-access-token` /
//!    `sb-refresh-token` cookie pair and looks up the stored role.
//! 3. Redirects the caller to sign-in, to their own landing area, or lets the
//!    request through to the upstream front-end.
//!
//! ## Sessions
//!
//! Tokens are issued by the auth service and only mirrored here as `HttpOnly`
//! cookies. Validation is delegated to the auth service by default. The optional
//! `decode` strategy reads the token subject without verifying the signature and
//! only ever uses it as a key into the trusted profile store.
//!
//! ## Roles
//!
//! Roles (`admin`, `client`) are read from the profile store on every guarded
//! request. Nothing is cached, so a role change applies on the next request.

pub mod api;
pub mod auth;
pub mod cli;
pub mod guard;
pub mod i18n;
pub mod rate_limit;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
