//! Assertions for test validation.
//!
//! Every assertion returns an [`AssertionResult`]. Call
//! [`AssertionResult::assert`] to panic on failure inside a `#[test]`, or
//! [`AssertionResult::into_result`] to propagate it with `?`.

use regex::Regex;
use scraper::ElementRef;
use std::fmt::Debug;

use crate::client::TestClient;
use crate::dom::{attr, tag_name, text_content};
use crate::links::UrlExpectation;
use crate::result::{ProbeError, ProbeResult};
use crate::session::Session;

/// Result of an assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionResult {
    /// Whether the assertion passed
    pub passed: bool,
    /// Human-readable message
    pub message: String,
}

impl AssertionResult {
    /// Create a passing assertion result
    #[must_use]
    pub const fn pass() -> Self {
        Self {
            passed: true,
            message: String::new(),
        }
    }

    /// Create a failing assertion result
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }

    /// Combine results, keeping every failure message
    #[must_use]
    pub fn all(results: impl IntoIterator<Item = Self>) -> Self {
        let failures: Vec<String> = results
            .into_iter()
            .filter(|r| !r.passed)
            .map(|r| r.message)
            .collect();
        if failures.is_empty() {
            Self::pass()
        } else {
            Self::fail(failures.join("; "))
        }
    }

    /// Convert into a `Result`
    ///
    /// # Errors
    ///
    /// [`ProbeError::AssertionFailed`] carrying the message.
    pub fn into_result(self) -> ProbeResult<()> {
        if self.passed {
            Ok(())
        } else {
            Err(ProbeError::AssertionFailed {
                message: self.message,
            })
        }
    }

    /// Panic with the message if the assertion failed
    ///
    /// # Panics
    ///
    /// When the assertion failed.
    #[track_caller]
    pub fn assert(self) {
        assert!(self.passed, "{}", self.message);
    }
}

/// Assertion helpers for testing
#[derive(Debug)]
pub struct Assertion;

impl Assertion {
    /// Assert two values are equal
    #[must_use]
    pub fn equals<T: PartialEq + Debug + ?Sized>(expected: &T, actual: &T) -> AssertionResult {
        if expected == actual {
            AssertionResult::pass()
        } else {
            AssertionResult::fail(format!("expected {expected:?}, got {actual:?}"))
        }
    }

    /// Assert a string contains a substring
    #[must_use]
    pub fn contains(haystack: &str, needle: &str) -> AssertionResult {
        if haystack.contains(needle) {
            AssertionResult::pass()
        } else {
            AssertionResult::fail(format!("expected response to contain {needle:?}"))
        }
    }

    /// Assert a string does not contain a substring
    #[must_use]
    pub fn not_contains(haystack: &str, needle: &str) -> AssertionResult {
        if haystack.contains(needle) {
            AssertionResult::fail(format!("expected response not to contain {needle:?}"))
        } else {
            AssertionResult::pass()
        }
    }

    /// Assert a regex matches somewhere in a string. An invalid pattern fails.
    #[must_use]
    pub fn matches_regex(haystack: &str, pattern: &str) -> AssertionResult {
        match Regex::new(pattern) {
            Ok(re) if re.is_match(haystack) => AssertionResult::pass(),
            Ok(_) => AssertionResult::fail(format!("expected response to match /{pattern}/")),
            Err(e) => AssertionResult::fail(ProbeError::from(e).to_string()),
        }
    }

    /// Assert a regex matches nowhere in a string. An invalid pattern fails.
    #[must_use]
    pub fn not_matches_regex(haystack: &str, pattern: &str) -> AssertionResult {
        match Regex::new(pattern) {
            Ok(re) if re.is_match(haystack) => {
                AssertionResult::fail(format!("expected response not to match /{pattern}/"))
            }
            Ok(_) => AssertionResult::pass(),
            Err(e) => AssertionResult::fail(ProbeError::from(e).to_string()),
        }
    }

    /// Assert URL components match an expectation
    #[must_use]
    pub fn url_matches(url: &str, expected: &UrlExpectation) -> AssertionResult {
        let problems = expected.mismatches(url);
        if problems.is_empty() {
            AssertionResult::pass()
        } else {
            AssertionResult::fail(format!("{url}: {}", problems.join(", ")))
        }
    }
}

fn direct_options(select: ElementRef<'_>) -> Vec<(String, String)> {
    select
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| tag_name(*el) == "option")
        .map(|option| {
            (
                attr(option, "value").unwrap_or_default().to_string(),
                text_content(option),
            )
        })
        .collect()
}

/// Session-level assertions
impl<C: TestClient> Session<C> {
    fn with_body(&self, check: impl FnOnce(&str) -> AssertionResult) -> AssertionResult {
        match self.body() {
            Ok(body) => check(&body),
            Err(e) => AssertionResult::fail(e.to_string()),
        }
    }

    /// Body contains every string
    #[must_use]
    pub fn assert_contains(&self, needles: &[&str]) -> AssertionResult {
        self.with_body(|body| {
            AssertionResult::all(needles.iter().map(|n| Assertion::contains(body, n)))
        })
    }

    /// Body contains none of the strings
    #[must_use]
    pub fn assert_not_contains(&self, needles: &[&str]) -> AssertionResult {
        self.with_body(|body| {
            AssertionResult::all(needles.iter().map(|n| Assertion::not_contains(body, n)))
        })
    }

    /// Body matches every regex
    #[must_use]
    pub fn assert_contains_regex(&self, patterns: &[&str]) -> AssertionResult {
        self.with_body(|body| {
            AssertionResult::all(patterns.iter().map(|p| Assertion::matches_regex(body, p)))
        })
    }

    /// Body matches none of the regexes
    #[must_use]
    pub fn assert_not_contains_regex(&self, patterns: &[&str]) -> AssertionResult {
        self.with_body(|body| {
            AssertionResult::all(patterns.iter().map(|p| Assertion::not_matches_regex(body, p)))
        })
    }

    /// Status code of the last response
    #[must_use]
    pub fn assert_status(&self, expected: u16) -> AssertionResult {
        match self.status() {
            Ok(status) => Assertion::equals(&expected, &status),
            Err(e) => AssertionResult::fail(e.to_string()),
        }
    }

    /// Current URL equals `expected`
    #[must_use]
    pub fn assert_current_url(&self, expected: &str) -> AssertionResult {
        match self.current_url() {
            Some(current) => Assertion::equals(expected, current),
            None => AssertionResult::fail(ProbeError::NoResponse.to_string()),
        }
    }

    /// Components of the current URL match `expected`
    #[must_use]
    pub fn assert_current_url_parsed(&self, expected: &UrlExpectation) -> AssertionResult {
        match self.current_url() {
            Some(current) => Assertion::url_matches(current, expected),
            None => AssertionResult::fail(ProbeError::NoResponse.to_string()),
        }
    }

    /// Components of any URL match `expected`
    #[must_use]
    pub fn assert_parsed_url_matches(&self, url: &str, expected: &UrlExpectation) -> AssertionResult {
        Assertion::url_matches(url, expected)
    }

    /// Selector resolves to at least one element
    #[must_use]
    pub fn assert_element_exists(&self, selector: &str) -> AssertionResult {
        match self.resolve(selector) {
            Ok(_) => AssertionResult::pass(),
            Err(e) => AssertionResult::fail(format!("Element {selector} doesn't exist: {e}")),
        }
    }

    /// Selector resolves to nothing
    #[must_use]
    pub fn assert_element_not_exists(&self, selector: &str) -> AssertionResult {
        match self.resolve(selector) {
            Ok(found) => AssertionResult::fail(format!(
                "Element {selector} does exist ({} matches)",
                found.len()
            )),
            Err(e) if e.is_not_found() => AssertionResult::pass(),
            Err(e) => AssertionResult::fail(e.to_string()),
        }
    }

    /// The one element `selector` resolves to has `attribute == expected`
    #[must_use]
    pub fn assert_attribute_value(
        &self,
        selector: &str,
        attribute: &str,
        expected: &str,
    ) -> AssertionResult {
        match self.attribute_value(selector, attribute) {
            Ok(actual) => Assertion::equals(expected, actual.as_str()),
            Err(e) => AssertionResult::fail(e.to_string()),
        }
    }

    /// The `<select>` a selector resolves to has exactly these direct
    /// `(value, label)` options, in order
    #[must_use]
    pub fn assert_select_options(&self, selector: &str, expected: &[(&str, &str)]) -> AssertionResult {
        let found = match self.resolve(selector) {
            Ok(found) => found,
            Err(e) => return AssertionResult::fail(e.to_string()),
        };
        let Some(&element) = found.first() else {
            return AssertionResult::fail(ProbeError::not_found(selector).to_string());
        };
        if tag_name(element) != "select" {
            return AssertionResult::fail(format!(
                "{selector} is a <{}>, not a <select>",
                tag_name(element)
            ));
        }
        let expected: Vec<(String, String)> = expected
            .iter()
            .map(|(v, l)| ((*v).to_string(), (*l).to_string()))
            .collect();
        Assertion::equals(&expected, &direct_options(element))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Params;
    use crate::mock::{MockClient, MockResponse};

    const PAGE: &str = r#"<html><body>
<h1>Order #1234 confirmed</h1>
<a id="invoice" href="/orders/1234/invoice" class="btn">Invoice</a>
<select id="size" name="size">
  <option value="s">Small</option>
  <option value="m" selected>Medium</option>
  <optgroup label="Big"><option value="l">Large</option></optgroup>
</select>
<p class="price">Price</p><p class="price">Tax</p>
</body></html>"#;

    fn session() -> Session<MockClient> {
        let mut client = MockClient::new();
        client.on_get("/orders/1234", MockResponse::html(PAGE));
        client.redirect("/checkout", "/orders/1234?from=checkout&note=");
        let mut s = Session::new(client);
        s.get("/orders/1234", &Params::new()).unwrap();
        s
    }

    mod result_tests {
        use super::*;

        #[test]
        fn test_into_result() {
            assert!(AssertionResult::pass().into_result().is_ok());
            let err = AssertionResult::fail("nope").into_result().unwrap_err();
            assert_eq!(err.to_string(), "Assertion failed: nope");
        }

        #[test]
        #[should_panic(expected = "boom")]
        fn test_assert_panics() {
            AssertionResult::fail("boom").assert();
        }

        #[test]
        fn test_all_joins_failures() {
            let r = AssertionResult::all([
                AssertionResult::pass(),
                AssertionResult::fail("a"),
                AssertionResult::fail("b"),
            ]);
            assert!(!r.passed);
            assert_eq!(r.message, "a; b");
            assert!(AssertionResult::all([]).passed);
        }

        #[test]
        fn test_invalid_regex_fails() {
            let r = Assertion::matches_regex("abc", "(");
            assert!(!r.passed);
            assert!(r.message.starts_with("Regex error"));
            assert!(!Assertion::not_matches_regex("abc", "(").passed);
        }
    }

    mod body_tests {
        use super::*;

        #[test]
        fn test_contains() {
            let s = session();
            s.assert_contains(&["Order #1234", "confirmed"]).assert();
            assert!(!s.assert_contains(&["Order", "cancelled"]).passed);
            s.assert_not_contains(&["cancelled", "refund"]).assert();
            assert!(!s.assert_not_contains(&["confirmed"]).passed);
        }

        #[test]
        fn test_regex() {
            let s = session();
            s.assert_contains_regex(&[r"Order #\d+", "(?i)CONFIRMED"]).assert();
            s.assert_not_contains_regex(&[r"Order #[a-z]+"]).assert();
            assert!(!s.assert_not_contains_regex(&[r"\d{4}"]).passed);
        }

        #[test]
        fn test_status() {
            let s = session();
            s.assert_status(200).assert();
            assert!(!s.assert_status(404).passed);
        }

        #[test]
        fn test_without_response() {
            let s = Session::new(MockClient::new());
            let r = s.assert_contains(&["x"]);
            assert!(!r.passed);
            assert!(r.message.contains("No response"));
            assert!(!s.assert_current_url("/").passed);
        }
    }

    mod url_tests {
        use super::*;

        #[test]
        fn test_current_url() {
            let s = session();
            s.assert_current_url("/orders/1234").assert();
            assert!(!s.assert_current_url("/orders").passed);
        }

        #[test]
        fn test_current_url_parsed_after_redirect() {
            let mut s = session();
            s.get("/checkout", &Params::new()).unwrap();
            let expected = UrlExpectation::new()
                .with_path("/orders/1234")
                .with_query_list([("from", "checkout"), ("note", "")]);
            s.assert_current_url_parsed(&expected).assert();
            let wrong = UrlExpectation::new().with_query("from=cart");
            assert!(!s.assert_current_url_parsed(&wrong).passed);
        }

        #[test]
        fn test_parsed_url_matches() {
            let s = session();
            let expected = UrlExpectation::new()
                .with_scheme("https")
                .with_netloc("shop.test")
                .with_query_list([("foo", "bar"), ("baz", "boo boo")]);
            s.assert_parsed_url_matches("https://shop.test/?foo=bar&baz=boo+boo", &expected)
                .assert();
        }
    }

    mod element_tests {
        use super::*;

        #[test]
        fn test_exists() {
            let s = session();
            s.assert_element_exists("invoice").assert();
            s.assert_element_exists("//h1").assert();
            s.assert_element_exists("p.price").assert();
            s.assert_element_not_exists("#refund").assert();
            assert!(!s.assert_element_exists("Refund issued").passed);
            assert!(!s.assert_element_not_exists("Invoice").passed);
        }

        #[test]
        fn test_attribute_value() {
            let s = session();
            s.assert_attribute_value("invoice", "href", "/orders/1234/invoice")
                .assert();
            assert!(!s.assert_attribute_value("invoice", "class", "link").passed);
            assert!(!s.assert_attribute_value("invoice", "title", "x").passed);
            // two matches
            assert!(!s.assert_attribute_value("p.price", "class", "price").passed);
            // no match
            assert!(!s.assert_attribute_value("#missing", "class", "x").passed);
        }

        #[test]
        fn test_select_options_are_direct_children() {
            let s = session();
            s.assert_select_options("size", &[("s", "Small"), ("m", "Medium")])
                .assert();
            assert!(!s
                .assert_select_options("size", &[("m", "Medium"), ("s", "Small")])
                .passed);
        }

        #[test]
        fn test_select_options_on_non_select() {
            let s = session();
            let r = s.assert_select_options("invoice", &[]);
            assert!(!r.passed);
            assert!(r.message.contains("not a <select>"));
        }
    }
}
