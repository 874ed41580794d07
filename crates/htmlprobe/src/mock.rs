//! In-memory test client.
//!
//! [`MockClient`] serves canned or computed responses from a route table,
//! follows redirects the way an app test client does, and records every
//! request it sees so tests can assert on traffic.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::client::{ClientResponse, Method, ParamValue, Params, RedirectHop, TestClient};
use crate::config::DEFAULT_BASE_URL;
use crate::links::absolutize;
use crate::result::{ProbeError, ProbeResult};

/// Default number of redirects followed before giving up
pub const DEFAULT_MAX_REDIRECTS: usize = 20;

/// A canned HTTP response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// Response body
    pub body: Vec<u8>,
    /// Content type
    pub content_type: String,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body: Vec::new(),
            content_type: "text/html; charset=utf-8".to_string(),
        }
    }
}

impl MockResponse {
    /// Create a new empty 200 response
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an HTML response
    #[must_use]
    pub fn html(content: &str) -> Self {
        Self {
            body: content.as_bytes().to_vec(),
            ..Self::default()
        }
    }

    /// Create a text response
    #[must_use]
    pub fn text(content: &str) -> Self {
        Self {
            body: content.as_bytes().to_vec(),
            content_type: "text/plain".to_string(),
            ..Self::default()
        }
    }

    /// Create a JSON response
    pub fn json<T: Serialize>(data: &T) -> ProbeResult<Self> {
        Ok(Self {
            body: serde_json::to_vec(data)?,
            content_type: "application/json".to_string(),
            ..Self::default()
        })
    }

    /// Create a 302 redirect
    #[must_use]
    pub fn redirect(location: &str) -> Self {
        Self::redirect_with_status(302, location)
    }

    /// Create a redirect with a specific 3xx status
    #[must_use]
    pub fn redirect_with_status(status: u16, location: &str) -> Self {
        Self::new()
            .with_status(status)
            .with_header("Location", location)
    }

    /// Create an error response
    #[must_use]
    pub fn error(status: u16, message: &str) -> Self {
        Self::text(message).with_status(status)
    }

    /// Set status code
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set body
    #[must_use]
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    /// Set content type
    #[must_use]
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_string();
        self
    }

    /// The `Location` header of a 3xx response
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        if !(300..400).contains(&self.status) {
            return None;
        }
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("location"))
            .map(|(_, v)| v.as_str())
    }

    /// Get body as string
    #[must_use]
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    fn into_client_response(self, redirect_chain: Vec<RedirectHop>) -> ClientResponse {
        let mut headers = self.headers;
        headers
            .entry("Content-Type".to_string())
            .or_insert(self.content_type);
        ClientResponse {
            status: self.status,
            headers,
            body: self.body,
            redirect_chain,
        }
    }
}

/// Pattern for matching request paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UrlPattern {
    /// Exact path match
    Exact(String),
    /// Prefix match
    Prefix(String),
    /// Regex match
    Regex(String),
    /// Match any path
    Any,
}

impl UrlPattern {
    /// Check if a path matches this pattern
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(pattern) => path == pattern,
            Self::Prefix(pattern) => path.starts_with(pattern.as_str()),
            Self::Regex(pattern) => regex::Regex::new(pattern)
                .map(|re| re.is_match(path))
                .unwrap_or(false),
            Self::Any => true,
        }
    }
}

/// A request seen by the mock client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedRequest {
    /// Request method
    pub method: Method,
    /// URL as requested
    pub url: String,
    /// Path component of the URL
    pub path: String,
    /// Parameters, including any from the URL's query string
    pub params: Params,
}

impl CapturedRequest {
    /// First value of a parameter
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .and_then(|v| v.values().first().copied())
    }
}

type Handler = Box<dyn Fn(&CapturedRequest) -> MockResponse>;

/// How a route produces its response
pub enum Responder {
    /// Always the same response
    Static(MockResponse),
    /// Computed from the request
    Handler(Handler),
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(response) => f.debug_tuple("Static").field(response).finish(),
            Self::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

/// A route definition
#[derive(Debug)]
pub struct Route {
    /// Path pattern to match
    pub pattern: UrlPattern,
    /// Method to match, `None` for any
    pub method: Option<Method>,
    /// Response source
    pub responder: Responder,
    /// Number of times this route has been matched
    pub match_count: usize,
}

impl Route {
    /// Create a route with a static response
    #[must_use]
    pub fn new(pattern: UrlPattern, method: Option<Method>, response: MockResponse) -> Self {
        Self {
            pattern,
            method,
            responder: Responder::Static(response),
            match_count: 0,
        }
    }

    /// Create a route that computes its response
    pub fn handler<F>(pattern: UrlPattern, method: Option<Method>, handler: F) -> Self
    where
        F: Fn(&CapturedRequest) -> MockResponse + 'static,
    {
        Self {
            pattern,
            method,
            responder: Responder::Handler(Box::new(handler)),
            match_count: 0,
        }
    }

    /// Check if this route matches a request
    #[must_use]
    pub fn matches(&self, path: &str, method: Method) -> bool {
        self.method.map_or(true, |m| m == method) && self.pattern.matches(path)
    }

    fn respond(&mut self, request: &CapturedRequest) -> MockResponse {
        self.match_count += 1;
        match &self.responder {
            Responder::Static(response) => response.clone(),
            Responder::Handler(handler) => handler(request),
        }
    }
}

/// In-memory [`TestClient`] backed by a route table
#[derive(Debug)]
pub struct MockClient {
    routes: Vec<Route>,
    captured: Vec<CapturedRequest>,
    max_redirects: usize,
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClient {
    /// Create a client with no routes
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            captured: Vec::new(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    /// Set the redirect hop limit
    #[must_use]
    pub const fn with_max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// Add a route
    pub fn route(&mut self, route: Route) -> &mut Self {
        self.routes.push(route);
        self
    }

    /// Serve `response` for GET requests to `path`
    pub fn on_get(&mut self, path: &str, response: MockResponse) -> &mut Self {
        self.route(Route::new(
            UrlPattern::Exact(path.to_string()),
            Some(Method::Get),
            response,
        ))
    }

    /// Serve `response` for POST requests to `path`
    pub fn on_post(&mut self, path: &str, response: MockResponse) -> &mut Self {
        self.route(Route::new(
            UrlPattern::Exact(path.to_string()),
            Some(Method::Post),
            response,
        ))
    }

    /// Serve `response` for any method to `path`
    pub fn on_any(&mut self, path: &str, response: MockResponse) -> &mut Self {
        self.route(Route::new(UrlPattern::Exact(path.to_string()), None, response))
    }

    /// Compute responses for `path` with a handler
    pub fn on_fn<F>(&mut self, method: Option<Method>, path: &str, handler: F) -> &mut Self
    where
        F: Fn(&CapturedRequest) -> MockResponse + 'static,
    {
        self.route(Route::handler(
            UrlPattern::Exact(path.to_string()),
            method,
            handler,
        ))
    }

    /// Redirect any request for `from` to `to` with a 302
    pub fn redirect(&mut self, from: &str, to: &str) -> &mut Self {
        self.on_any(from, MockResponse::redirect(to))
    }

    /// Get route count
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// All requests seen so far, including redirect hops
    #[must_use]
    pub fn captured_requests(&self) -> &[CapturedRequest] {
        &self.captured
    }

    /// Most recent request
    #[must_use]
    pub fn last_request(&self) -> Option<&CapturedRequest> {
        self.captured.last()
    }

    /// Captured requests by method
    #[must_use]
    pub fn requests_by_method(&self, method: Method) -> Vec<&CapturedRequest> {
        self.captured.iter().filter(|r| r.method == method).collect()
    }

    /// Captured requests whose path matches a pattern
    #[must_use]
    pub fn requests_matching(&self, pattern: &UrlPattern) -> Vec<&CapturedRequest> {
        self.captured
            .iter()
            .filter(|r| pattern.matches(&r.path))
            .collect()
    }

    /// Assert a request was made N times
    pub fn assert_requested_times(&self, pattern: &UrlPattern, times: usize) -> ProbeResult<()> {
        let found = self.requests_matching(pattern).len();
        if found != times {
            return Err(ProbeError::AssertionFailed {
                message: format!(
                    "Expected {} requests matching {:?}, but found {}",
                    times, pattern, found
                ),
            });
        }
        Ok(())
    }

    /// Assert no requests were made matching a pattern
    pub fn assert_not_requested(&self, pattern: &UrlPattern) -> ProbeResult<()> {
        self.assert_requested_times(pattern, 0)
    }

    /// Clear captured requests
    pub fn clear_captured(&mut self) {
        self.captured.clear();
    }

    fn capture(method: Method, url: &str, params: &Params) -> ProbeResult<CapturedRequest> {
        let parsed = url::Url::parse(DEFAULT_BASE_URL)
            .and_then(|base| base.join(url))
            .map_err(|e| ProbeError::InvalidUrl {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let mut merged = Params::new();
        for (key, value) in parsed.query_pairs() {
            match merged.remove(key.as_ref()) {
                Some(ParamValue::Single(prev)) => {
                    merged.insert(key.to_string(), ParamValue::Multi(vec![prev, value.to_string()]));
                }
                Some(ParamValue::Multi(mut prev)) => {
                    prev.push(value.to_string());
                    merged.insert(key.to_string(), ParamValue::Multi(prev));
                }
                None => {
                    merged.insert(key.to_string(), ParamValue::Single(value.to_string()));
                }
            }
        }
        merged.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(CapturedRequest {
            method,
            url: url.to_string(),
            path: parsed.path().to_string(),
            params: merged,
        })
    }

    fn respond_once(&mut self, method: Method, url: &str, params: &Params) -> ProbeResult<MockResponse> {
        let request = Self::capture(method, url, params)?;
        let response = self
            .routes
            .iter_mut()
            .find(|route| route.matches(&request.path, method))
            .map_or_else(
                || MockResponse::error(404, "Not Found"),
                |route| route.respond(&request),
            );
        tracing::trace!(
            method = %method,
            url,
            status = response.status,
            "mock client served request"
        );
        self.captured.push(request);
        Ok(response)
    }

    fn dispatch(
        &mut self,
        method: Method,
        url: &str,
        params: &Params,
        follow: bool,
    ) -> ProbeResult<ClientResponse> {
        let mut method = method;
        let mut target = url.to_string();
        let mut params = params.clone();
        let mut chain = Vec::new();

        loop {
            let response = self.respond_once(method, &target, &params)?;
            let location = match response.location() {
                Some(location) if follow => location.to_string(),
                _ => return Ok(response.into_client_response(chain)),
            };

            if chain.len() >= self.max_redirects {
                return Err(ProbeError::RedirectLoop {
                    url: url.to_string(),
                    hops: chain.len(),
                });
            }

            let next = absolutize(&target, &location, DEFAULT_BASE_URL)?;
            chain.push(RedirectHop::new(next.clone(), response.status));
            if !matches!(response.status, 307 | 308) {
                method = Method::Get;
                params.clear();
            }
            target = next;
        }
    }
}

impl TestClient for MockClient {
    fn get(&mut self, url: &str, params: &Params, follow: bool) -> ProbeResult<ClientResponse> {
        self.dispatch(Method::Get, url, params, follow)
    }

    fn post(&mut self, url: &str, params: &Params, follow: bool) -> ProbeResult<ClientResponse> {
        self.dispatch(Method::Post, url, params, follow)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::client::params;

    mod mock_response_tests {
        use super::*;

        #[test]
        fn test_default() {
            let response = MockResponse::default();
            assert_eq!(response.status, 200);
            assert!(response.content_type.starts_with("text/html"));
        }

        #[test]
        fn test_json() {
            let data = serde_json::json!({"name": "test"});
            let response = MockResponse::json(&data).unwrap();
            assert_eq!(response.content_type, "application/json");
            assert!(response.body_string().contains("test"));
        }

        #[test]
        fn test_redirect_location() {
            let response = MockResponse::redirect("/next");
            assert_eq!(response.status, 302);
            assert_eq!(response.location(), Some("/next"));
        }

        #[test]
        fn test_location_ignored_outside_3xx() {
            let response = MockResponse::html("ok").with_header("Location", "/x");
            assert_eq!(response.location(), None);
        }

        #[test]
        fn test_content_type_reaches_client_response() {
            let response = MockResponse::text("a,b\n")
                .with_content_type("text/csv")
                .into_client_response(Vec::new());
            assert_eq!(response.header("content-type"), Some("text/csv"));
        }
    }

    mod url_pattern_tests {
        use super::*;

        #[test]
        fn test_patterns() {
            assert!(UrlPattern::Exact("/a".into()).matches("/a"));
            assert!(!UrlPattern::Exact("/a".into()).matches("/a/b"));
            assert!(UrlPattern::Prefix("/api".into()).matches("/api/users"));
            assert!(UrlPattern::Regex(r"^/items/\d+$".into()).matches("/items/42"));
            assert!(!UrlPattern::Regex("(".into()).matches("/"));
            assert!(UrlPattern::Any.matches("/anything"));
        }
    }

    mod dispatch_tests {
        use super::*;

        #[test]
        fn test_unmatched_is_404() {
            let mut client = MockClient::new();
            let response = client.get("/nope", &Params::new(), true).unwrap();
            assert_eq!(response.status, 404);
            assert!(response.redirect_chain.is_empty());
        }

        #[test]
        fn test_method_filter() {
            let mut client = MockClient::new();
            client.on_post("/form", MockResponse::html("posted"));
            assert_eq!(client.get("/form", &Params::new(), true).unwrap().status, 404);
            let response = client.post("/form", &Params::new(), true).unwrap();
            assert_eq!(response.body_string(), "posted");
        }

        #[test]
        fn test_follows_redirects() {
            let mut client = MockClient::new();
            client
                .redirect("/old", "/middle")
                .redirect("/middle", "/new")
                .on_get("/new", MockResponse::html("arrived"));

            let response = client.get("/old", &Params::new(), true).unwrap();
            assert_eq!(response.body_string(), "arrived");
            assert_eq!(
                response.redirect_chain,
                vec![RedirectHop::new("/middle", 302), RedirectHop::new("/new", 302)]
            );
            assert_eq!(client.captured_requests().len(), 3);
        }

        #[test]
        fn test_no_follow_returns_redirect() {
            let mut client = MockClient::new();
            client.redirect("/old", "/new");
            let response = client.get("/old", &Params::new(), false).unwrap();
            assert_eq!(response.status, 302);
            assert!(response.redirect_chain.is_empty());
            assert_eq!(response.header("location"), Some("/new"));
        }

        #[test]
        fn test_post_redirect_becomes_get() {
            let mut client = MockClient::new();
            client
                .on_post("/save", MockResponse::redirect("/done"))
                .on_get("/done", MockResponse::html("saved"));

            let response = client
                .post("/save", &params([("title", "x")]), true)
                .unwrap();
            assert_eq!(response.body_string(), "saved");
            let last = client.last_request().unwrap();
            assert_eq!(last.method, Method::Get);
            assert!(last.params.is_empty());
        }

        #[test]
        fn test_307_preserves_method_and_params() {
            let mut client = MockClient::new();
            client
                .on_post("/a", MockResponse::redirect_with_status(307, "/b"))
                .on_post("/b", MockResponse::html("b"));

            client.post("/a", &params([("k", "v")]), true).unwrap();
            let last = client.last_request().unwrap();
            assert_eq!(last.method, Method::Post);
            assert_eq!(last.param("k"), Some("v"));
        }

        #[test]
        fn test_redirect_loop() {
            let mut client = MockClient::new().with_max_redirects(3);
            client.redirect("/a", "/b").redirect("/b", "/a");
            let err = client.get("/a", &Params::new(), true).unwrap_err();
            assert!(matches!(err, ProbeError::RedirectLoop { hops: 3, .. }));
        }

        #[test]
        fn test_relative_location_resolves_against_previous_hop() {
            let mut client = MockClient::new();
            client
                .redirect("/a/b", "c")
                .redirect("/a/c", "../d?x=1")
                .on_get("/d", MockResponse::html("d"));
            assert_eq!(client.route_count(), 3);

            let response = client.get("/a/b", &Params::new(), true).unwrap();
            assert_eq!(response.body_string(), "d");
            assert_eq!(
                response.redirect_chain,
                vec![RedirectHop::new("/a/c", 302), RedirectHop::new("/d?x=1", 302)]
            );
            assert_eq!(client.last_request().unwrap().param("x"), Some("1"));
        }

        #[test]
        fn test_query_string_merged_into_params() {
            let mut client = MockClient::new();
            client.on_get("/search", MockResponse::html(""));
            client
                .get("/search?q=rust&tag=a&tag=b", &params([("page", "2")]), true)
                .unwrap();

            let request = client.last_request().unwrap();
            assert_eq!(request.path, "/search");
            assert_eq!(request.param("q"), Some("rust"));
            assert_eq!(request.param("page"), Some("2"));
            assert_eq!(request.params.get("tag").unwrap().values(), vec!["a", "b"]);
        }

        #[test]
        fn test_absolute_urls_route_by_path() {
            let mut client = MockClient::new();
            client.on_get("/abs", MockResponse::html("abs"));
            let response = client
                .get("http://testserver/abs", &Params::new(), true)
                .unwrap();
            assert_eq!(response.body_string(), "abs");
        }

        #[test]
        fn test_handler_sees_params() {
            let mut client = MockClient::new();
            client.on_fn(Some(Method::Post), "/echo", |req| {
                MockResponse::text(req.param("name").unwrap_or("nobody"))
            });
            let response = client
                .post("/echo", &params([("name", "ferris")]), true)
                .unwrap();
            assert_eq!(response.body_string(), "ferris");
        }

        #[test]
        fn test_request_assertions() {
            let mut client = MockClient::new();
            client.on_get("/x", MockResponse::html(""));
            client.get("/x", &Params::new(), true).unwrap();
            client.get("/x", &Params::new(), true).unwrap();

            let pattern = UrlPattern::Exact("/x".into());
            assert!(client.assert_requested_times(&pattern, 2).is_ok());
            assert!(client.assert_requested_times(&pattern, 1).is_err());
            assert!(client
                .assert_not_requested(&UrlPattern::Exact("/y".into()))
                .is_ok());

            client.clear_captured();
            assert!(client.captured_requests().is_empty());
            assert_eq!(client.requests_by_method(Method::Get).len(), 0);
        }

        #[test]
        fn test_content_type_header_added() {
            let mut client = MockClient::new();
            client.on_get("/", MockResponse::text("hi"));
            let response = client.get("/", &Params::new(), true).unwrap();
            assert_eq!(response.header("content-type"), Some("text/plain"));
        }
    }
}
