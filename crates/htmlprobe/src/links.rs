//! URL helpers: resolving link targets and splitting URLs into components.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::result::{ProbeError, ProbeResult};

fn invalid(url: &str, err: impl std::fmt::Display) -> ProbeError {
    ProbeError::InvalidUrl {
        url: url.to_string(),
        message: err.to_string(),
    }
}

/// Resolve `target` against the page at `current`, the way a browser
/// resolves an `href` or form `action`.
///
/// A relative `current` is placed under `base` for the join. The result is
/// made relative again when it stays on `base`'s origin, so a session that
/// requests `/login` keeps seeing paths like `/account` rather than full
/// URLs.
///
/// # Errors
///
/// [`ProbeError::InvalidUrl`] if `base`, `current` or `target` can't be
/// parsed or joined.
pub fn absolutize(current: &str, target: &str, base: &str) -> ProbeResult<String> {
    let base_url = Url::parse(base).map_err(|e| invalid(base, e))?;
    let current_is_relative = Url::parse(current).is_err();
    let page = base_url.join(current).map_err(|e| invalid(current, e))?;
    let joined = page.join(target).map_err(|e| invalid(target, e))?;

    if current_is_relative && joined.origin() == base_url.origin() {
        let mut relative = joined.path().to_string();
        if let Some(query) = joined.query() {
            relative.push('?');
            relative.push_str(query);
        }
        if let Some(fragment) = joined.fragment() {
            relative.push('#');
            relative.push_str(fragment);
        }
        Ok(relative)
    } else {
        Ok(joined.to_string())
    }
}

/// A URL split into its six components.
///
/// Works on relative references as well as absolute URLs; missing parts are
/// empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedUrl {
    /// Scheme, lowercased
    pub scheme: String,
    /// Authority: `user:pass@host:port`
    pub netloc: String,
    /// Path
    pub path: String,
    /// Parameters of the last path segment, after `;`
    pub params: String,
    /// Raw query string without `?`
    pub query: String,
    /// Fragment without `#`
    pub fragment: String,
}

fn split_scheme(url: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = url.split_once(':')?;
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some((scheme, rest))
}

impl ParsedUrl {
    /// Split a URL
    #[must_use]
    pub fn parse(url: &str) -> Self {
        let mut parsed = Self::default();
        let mut rest = url.trim();

        if let Some((scheme, after)) = split_scheme(rest) {
            parsed.scheme = scheme.to_ascii_lowercase();
            rest = after;
        }

        if let Some(after) = rest.strip_prefix("//") {
            let end = after.find(['/', '?', '#']).unwrap_or(after.len());
            parsed.netloc = after[..end].to_string();
            rest = &after[end..];
        }

        if let Some((before, fragment)) = rest.split_once('#') {
            parsed.fragment = fragment.to_string();
            rest = before;
        }

        if let Some((before, query)) = rest.split_once('?') {
            parsed.query = query.to_string();
            rest = before;
        }

        let last_segment = rest.rfind('/').map_or(0, |i| i + 1);
        match rest[last_segment..].find(';') {
            Some(i) => {
                parsed.path = rest[..last_segment + i].to_string();
                parsed.params = rest[last_segment + i + 1..].to_string();
            }
            None => parsed.path = rest.to_string(),
        }

        parsed
    }

    /// Query as ordered key/value pairs. Blank values are kept and `+`
    /// decodes to a space.
    #[must_use]
    pub fn query_list(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(self.query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }
}

/// Expected URL components. Unset components are not checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlExpectation {
    /// Expected scheme
    pub scheme: Option<String>,
    /// Expected authority
    pub netloc: Option<String>,
    /// Expected path
    pub path: Option<String>,
    /// Expected path parameters
    pub params: Option<String>,
    /// Expected raw query
    pub query: Option<String>,
    /// Expected decoded query pairs, in order
    pub query_list: Option<Vec<(String, String)>>,
    /// Expected fragment
    pub fragment: Option<String>,
}

impl UrlExpectation {
    /// Create an expectation that checks nothing
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect a scheme
    #[must_use]
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    /// Expect an authority
    #[must_use]
    pub fn with_netloc(mut self, netloc: impl Into<String>) -> Self {
        self.netloc = Some(netloc.into());
        self
    }

    /// Expect a path
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Expect path parameters
    #[must_use]
    pub fn with_params(mut self, params: impl Into<String>) -> Self {
        self.params = Some(params.into());
        self
    }

    /// Expect a raw query
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Expect decoded query pairs
    #[must_use]
    pub fn with_query_list<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query_list = Some(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Expect a fragment
    #[must_use]
    pub fn with_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = Some(fragment.into());
        self
    }

    /// Describe every component of `url` that differs from the expectation
    #[must_use]
    pub fn mismatches(&self, url: &str) -> Vec<String> {
        let parsed = ParsedUrl::parse(url);
        let mut out = Vec::new();
        let mut check = |component: &str, expected: &Option<String>, actual: &str| {
            if let Some(expected) = expected {
                if expected != actual {
                    out.push(format!("{component}: expected {expected:?}, got {actual:?}"));
                }
            }
        };
        check("scheme", &self.scheme, &parsed.scheme);
        check("netloc", &self.netloc, &parsed.netloc);
        check("path", &self.path, &parsed.path);
        check("params", &self.params, &parsed.params);
        check("query", &self.query, &parsed.query);
        check("fragment", &self.fragment, &parsed.fragment);

        if let Some(expected) = &self.query_list {
            let actual = parsed.query_list();
            if *expected != actual {
                out.push(format!("query_list: expected {expected:?}, got {actual:?}"));
            }
        }
        out
    }
}
