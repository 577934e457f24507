//! Supported locales and `Accept-Language` negotiation.

use anyhow::{Result, anyhow};

/// Fixed set of supported locales plus the default, built once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocaleSet {
    supported: Vec<String>,
    default: String,
}

impl LocaleSet {
    /// Build a locale set.
    ///
    /// # Errors
    /// Returns an error if the list is empty, a tag is not a valid path segment,
    /// or the default is not one of the supported locales.
    pub fn new<I, S>(supported: I, default: &str) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tags: Vec<String> = Vec::new();
        for tag in supported {
            let tag = tag.as_ref().trim();
            if tag.is_empty() {
                continue;
            }
            if !tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
            {
                return Err(anyhow!("Invalid locale tag: {tag}"));
            }
            if !tags.iter().any(|existing| existing == tag) {
                tags.push(tag.to_string());
            }
        }

        if tags.is_empty() {
            return Err(anyhow!("At least one locale is required"));
        }

        let default = default.trim();
        if !tags.iter().any(|tag| tag == default) {
            return Err(anyhow!(
                "Default locale {default} is not one of the supported locales: {}",
                tags.join(",")
            ));
        }

        Ok(Self {
            supported: tags,
            default: default.to_string(),
        })
    }

    #[must_use]
    pub fn default_locale(&self) -> &str {
        &self.default
    }

    #[must_use]
    pub fn supported(&self) -> &[String] {
        &self.supported
    }

    /// Return the supported locale equal to `segment`, if any.
    ///
    /// Path segments are matched exactly: `/EN/...` is not a localized path.
    #[must_use]
    pub fn get(&self, segment: &str) -> Option<&str> {
        self.supported
            .iter()
            .find(|tag| tag.as_str() == segment)
            .map(String::as_str)
    }

    /// Pick a supported locale from an `Accept-Language` header value.
    ///
    /// Never fails: falls back to the default locale.
    #[must_use]
    pub fn negotiate(&self, accept_language: Option<&str>) -> &str {
        let Some(header) = accept_language else {
            return &self.default;
        };

        for tag in parse_accept_language(header) {
            if let Some(locale) = self.best_match(&tag) {
                return locale;
            }
        }

        &self.default
    }

    fn best_match(&self, requested: &str) -> Option<&str> {
        if let Some(exact) = self
            .supported
            .iter()
            .find(|tag| tag.eq_ignore_ascii_case(requested))
        {
            return Some(exact.as_str());
        }

        let language = primary_subtag(requested);
        self.supported
            .iter()
            .find(|tag| primary_subtag(tag).eq_ignore_ascii_case(language))
            .map(String::as_str)
    }
}

fn primary_subtag(tag: &str) -> &str {
    tag.split(['-', '_']).next().unwrap_or(tag)
}

/// Parse an `Accept-Language` value into tags ordered by descending weight.
///
/// Entries with `q=0`, wildcards and malformed weights are dropped; equal
/// weights keep header order.
#[must_use]
pub fn parse_accept_language(header: &str) -> Vec<String> {
    let mut entries: Vec<(String, f32)> = header
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let tag = parts.next()?.trim();
            if tag.is_empty() || tag == "*" {
                return None;
            }

            let mut weight = 1.0_f32;
            for param in parts {
                let param = param.trim();
                if let Some(value) = param
                    .strip_prefix("q=")
                    .or_else(|| param.strip_prefix("Q="))
                {
                    weight = value.trim().parse::<f32>().ok()?;
                }
            }

            if !(weight > 0.0 && weight <= 1.0) {
                return None;
            }

            Some((tag.to_string(), weight))
        })
        .collect();

    // sort_by is stable, ties keep header order
    entries.sort_by(|a, b| b.1.total_cmp(&a.1));
    entries.into_iter().map(|(tag, _)| tag).collect()
}
