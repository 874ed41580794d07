//! The test client seam.
//!
//! htmlprobe doesn't dispatch requests itself. It drives anything that
//! implements [`TestClient`]: an in-process app harness, a recorded fixture,
//! or the bundled [`MockClient`](crate::MockClient).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::result::{ProbeError, ProbeResult};

/// Request methods a session can issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// GET request
    Get,
    /// POST request
    Post,
}

impl Method {
    /// Parse a method name, case-insensitively
    pub fn parse(s: &str) -> ProbeResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            _ => Err(ProbeError::UnsupportedMethod {
                method: s.to_string(),
            }),
        }
    }

    /// Convert to string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request parameter: one value or a repeated key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Single value
    Single(String),
    /// Repeated key, one entry per value
    Multi(Vec<String>),
}

impl ParamValue {
    /// All values in submission order
    #[must_use]
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(v) => vec![v.as_str()],
            Self::Multi(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multi(values)
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(values: Vec<&str>) -> Self {
        Self::Multi(values.into_iter().map(str::to_string).collect())
    }
}

/// Request parameters, keyed by field name
pub type Params = BTreeMap<String, ParamValue>;

/// Build [`Params`] from key/value pairs
pub fn params<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Params
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Encode parameters as `application/x-www-form-urlencoded`
#[must_use]
pub fn encode_params(params: &Params) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        for v in value.values() {
            serializer.append_pair(key, v);
        }
    }
    serializer.finish()
}

/// One hop of a followed redirect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectHop {
    /// Target the client was redirected to
    pub url: String,
    /// Status code of the redirecting response
    pub status: u16,
}

impl RedirectHop {
    /// Create a new hop
    #[must_use]
    pub fn new(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status,
        }
    }
}

/// A response as returned by a [`TestClient`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// Response body
    pub body: Vec<u8>,
    /// Redirects followed to reach this response, in order
    pub redirect_chain: Vec<RedirectHop>,
}

impl ClientResponse {
    /// Create a response with a status and body
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            ..Self::default()
        }
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    /// Set the redirect chain
    #[must_use]
    pub fn with_redirects(mut self, chain: Vec<RedirectHop>) -> Self {
        self.redirect_chain = chain;
        self
    }

    /// Get body as string
    #[must_use]
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Header lookup, case-insensitive on the name
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// URL of the last redirect hop, if any redirect was followed
    #[must_use]
    pub fn final_redirect(&self) -> Option<&str> {
        self.redirect_chain.last().map(|hop| hop.url.as_str())
    }
}

/// An HTTP test client a [`Session`](crate::Session) can drive.
///
/// Implementations dispatch the request, optionally follow redirects, and
/// record every hop in [`ClientResponse::redirect_chain`]. Transport failures
/// are reported as errors and reach the caller unchanged.
pub trait TestClient {
    /// Issue a GET request
    fn get(&mut self, url: &str, params: &Params, follow: bool) -> ProbeResult<ClientResponse>;

    /// Issue a POST request
    fn post(&mut self, url: &str, params: &Params, follow: bool) -> ProbeResult<ClientResponse>;
}

impl<T: TestClient + ?Sized> TestClient for &mut T {
    fn get(&mut self, url: &str, params: &Params, follow: bool) -> ProbeResult<ClientResponse> {
        (**self).get(url, params, follow)
    }

    fn post(&mut self, url: &str, params: &Params, follow: bool) -> ProbeResult<ClientResponse> {
        (**self).post(url, params, follow)
    }
}

impl<T: TestClient + ?Sized> TestClient for Box<T> {
    fn get(&mut self, url: &str, params: &Params, follow: bool) -> ProbeResult<ClientResponse> {
        (**self).get(url, params, follow)
    }

    fn post(&mut self, url: &str, params: &Params, follow: bool) -> ProbeResult<ClientResponse> {
        (**self).post(url, params, follow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod method_tests {
        use super::*;

        #[test]
        fn test_parse() {
            assert_eq!(Method::parse("GET").unwrap(), Method::Get);
            assert_eq!(Method::parse("post").unwrap(), Method::Post);
            assert_eq!(Method::parse(" Get ").unwrap(), Method::Get);
        }

        #[test]
        fn test_parse_rejects_other_methods() {
            for m in ["PUT", "DELETE", "dialog", ""] {
                let err = Method::parse(m).unwrap_err();
                assert!(matches!(err, ProbeError::UnsupportedMethod { .. }), "{m}");
            }
        }

        #[test]
        fn test_display() {
            assert_eq!(Method::Get.to_string(), "GET");
            assert_eq!(Method::Post.as_str(), "POST");
        }
    }

    mod params_tests {
        use super::*;

        #[test]
        fn test_params_builder() {
            let p = params([("q", "rust"), ("page", "2")]);
            assert_eq!(p.get("q"), Some(&ParamValue::Single("rust".to_string())));
            assert_eq!(p.len(), 2);
        }

        #[test]
        fn test_encode_repeats_multi_values() {
            let mut p = Params::new();
            p.insert("color".to_string(), vec!["red", "blue"].into());
            p.insert("q".to_string(), "a b&c".into());
            assert_eq!(encode_params(&p), "color=red&color=blue&q=a+b%26c");
        }

        #[test]
        fn test_encode_empty() {
            assert_eq!(encode_params(&Params::new()), "");
        }

        #[test]
        fn test_param_value_serde_untagged() {
            let single: ParamValue = serde_json::from_str("\"x\"").unwrap();
            assert_eq!(single, ParamValue::Single("x".to_string()));
            let multi: ParamValue = serde_json::from_str("[\"a\",\"b\"]").unwrap();
            assert_eq!(multi.values(), vec!["a", "b"]);
        }
    }

    mod response_tests {
        use super::*;

        #[test]
        fn test_final_redirect() {
            let response = ClientResponse::new(200, "ok").with_redirects(vec![
                RedirectHop::new("/a", 302),
                RedirectHop::new("/b", 301),
            ]);
            assert_eq!(response.final_redirect(), Some("/b"));
            assert_eq!(ClientResponse::new(200, "").final_redirect(), None);
        }

        #[test]
        fn test_header_case_insensitive() {
            let response = ClientResponse::new(200, "").with_header("Content-Type", "text/html");
            assert_eq!(response.header("content-type"), Some("text/html"));
            assert_eq!(response.header("location"), None);
        }

        #[test]
        fn test_body_string_lossy() {
            let response = ClientResponse::new(200, vec![b'h', b'i', 0xff]);
            assert!(response.body_string().starts_with("hi"));
        }
    }
}
