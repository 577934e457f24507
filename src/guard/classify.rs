//! Route classification for the guard.

use super::locale::LocaleSet;

const EXCLUDED_FIRST_SEGMENTS: [&str; 3] = ["_next", "api", "favicon.ico"];
const STATIC_EXTENSIONS: [&str; 11] = [
    "ico", "png", "svg", "jpg", "jpeg", "gif", "webp", "woff", "woff2", "ttf", "eot",
];

/// Path segments (without slashes) of the guarded route trees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutePrefixes {
    admin: String,
    client: String,
    sign_in: String,
}

impl Default for RoutePrefixes {
    fn default() -> Self {
        Self {
            admin: "dashboard".to_string(),
            client: "profile".to_string(),
            sign_in: "sign-in".to_string(),
        }
    }
}

impl RoutePrefixes {
    #[must_use]
    pub fn new(admin: &str, client: &str, sign_in: &str) -> Self {
        Self {
            admin: trim_slashes(admin).to_string(),
            client: trim_slashes(client).to_string(),
            sign_in: trim_slashes(sign_in).to_string(),
        }
    }

    #[must_use]
    pub fn admin(&self) -> &str {
        &self.admin
    }

    #[must_use]
    pub fn client(&self) -> &str {
        &self.client
    }

    #[must_use]
    pub fn sign_in(&self) -> &str {
        &self.sign_in
    }
}

fn trim_slashes(value: &str) -> &str {
    value.trim().trim_matches('/')
}

/// Category of a request path, in priority order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteClass {
    /// First segment is not a supported locale.
    NeedsLocale,
    /// Exactly `/{locale}`.
    LocaleRoot { locale: String },
    /// `/{locale}/{admin}` subtree.
    AdminProtected { locale: String },
    /// `/{locale}/{client}` subtree.
    ClientProtected { locale: String },
    Public { locale: String },
}

impl RouteClass {
    /// Locale of an already-localized path.
    #[must_use]
    pub fn locale(&self) -> Option<&str> {
        match self {
            Self::NeedsLocale => None,
            Self::LocaleRoot { locale }
            | Self::AdminProtected { locale }
            | Self::ClientProtected { locale }
            | Self::Public { locale } => Some(locale),
        }
    }

    /// Whether deciding this class needs the caller's role.
    #[must_use]
    pub const fn needs_role(&self) -> bool {
        matches!(
            self,
            Self::LocaleRoot { .. } | Self::AdminProtected { .. } | Self::ClientProtected { .. }
        )
    }
}

/// Classify `path` against the locale set and the guarded prefixes.
#[must_use]
pub fn classify(path: &str, locales: &LocaleSet, prefixes: &RoutePrefixes) -> RouteClass {
    let rest = path.strip_prefix('/').unwrap_or(path);
    let (first, tail) = match rest.split_once('/') {
        Some((first, tail)) => (first, Some(tail)),
        None => (rest, None),
    };

    let Some(locale) = locales.get(first) else {
        return RouteClass::NeedsLocale;
    };
    let locale = locale.to_string();

    let tail = match tail {
        None | Some("") => return RouteClass::LocaleRoot { locale },
        Some(tail) => tail,
    };

    if under_prefix(tail, &prefixes.admin) {
        RouteClass::AdminProtected { locale }
    } else if under_prefix(tail, &prefixes.client) {
        RouteClass::ClientProtected { locale }
    } else {
        RouteClass::Public { locale }
    }
}

fn under_prefix(tail: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return false;
    }
    match tail.strip_prefix(prefix) {
        Some(remaining) => remaining.is_empty() || remaining.starts_with('/'),
        None => false,
    }
}

/// Resolve `.` and `..` segments (plain or percent-encoded) and collapse
/// empty ones. A trailing slash is kept. `..` never climbs above the root.
#[must_use]
pub fn canonical_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match dot_segment(segment) {
            Some(DotSegment::Current) => {}
            Some(DotSegment::Parent) => {
                segments.pop();
            }
            None if segment.is_empty() => {}
            None => segments.push(segment),
        }
    }

    let mut canonical = format!("/{}", segments.join("/"));
    if !segments.is_empty() && path.ends_with('/') {
        canonical.push('/');
    }
    canonical
}

enum DotSegment {
    Current,
    Parent,
}

fn dot_segment(segment: &str) -> Option<DotSegment> {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    match decoded.as_str() {
        "." => Some(DotSegment::Current),
        ".." => Some(DotSegment::Parent),
        _ => None,
    }
}

/// Paths the guard never touches: framework assets, the API prefix, the
/// favicon, and anything that looks like a static file.
#[must_use]
pub fn is_excluded(path: &str) -> bool {
    let rest = path.strip_prefix('/').unwrap_or(path);
    let first = rest.split('/').next().unwrap_or_default();
    if EXCLUDED_FIRST_SEGMENTS.contains(&first) {
        return true;
    }

    rest.split('/').any(|segment| {
        segment.rsplit_once('.').is_some_and(|(stem, extension)| {
            !stem.is_empty()
                && STATIC_EXTENSIONS
                    .iter()
                    .any(|known| extension.eq_ignore_ascii_case(known))
        })
    })
}
