//! Result and error types for htmlprobe.

use thiserror::Error;

use crate::xpath::XPathError;

/// Result type for htmlprobe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors that can occur while driving a session
#[derive(Debug, Error)]
pub enum ProbeError {
    /// No strategy of the selector resolver matched anything
    #[error("Element not found: {selector}")]
    ElementNotFound {
        /// Selector that was resolved
        selector: String,
    },

    /// A link selector did not resolve to exactly one `<a>` element
    #[error("Expected exactly one link for {selector}, found {count}")]
    AmbiguousLink {
        /// Selector that was resolved
        selector: String,
        /// Number of anchors found
        count: usize,
    },

    /// A form selector resolved to nothing, or to something that is not a form
    #[error("No form found for {selector}")]
    AmbiguousOrMissingForm {
        /// Selector that was resolved
        selector: String,
    },

    /// A single-element helper matched more than one element
    #[error("Expected one element for {selector}, found {count}")]
    MultipleElements {
        /// Selector that was resolved
        selector: String,
        /// Number of elements found
        count: usize,
    },

    /// CSS selector failed to parse
    #[error("Invalid CSS selector {selector}: {message}")]
    InvalidCss {
        /// Selector as given
        selector: String,
        /// Parser message
        message: String,
    },

    /// A form control tag that cannot be read or submitted
    #[error("Unsupported field type <{tag}> for field {name}")]
    UnsupportedFieldType {
        /// Tag name of the control
        tag: String,
        /// Field name
        name: String,
    },

    /// A value was supplied for a field the form does not have
    #[error("Form has no field named {name}")]
    UnknownField {
        /// Field name
        name: String,
    },

    /// Request method other than GET or POST
    #[error("Unsupported method: {method}")]
    UnsupportedMethod {
        /// Method as given
        method: String,
    },

    /// Body or DOM was read before any request was made
    #[error("No response yet, issue a request first")]
    NoResponse,

    /// Element is missing a required attribute
    #[error("Element {selector} has no attribute {attribute}")]
    MissingAttribute {
        /// Selector that was resolved
        selector: String,
        /// Attribute name
        attribute: String,
    },

    /// URL could not be parsed or joined
    #[error("Invalid URL {url}: {message}")]
    InvalidUrl {
        /// Offending URL
        url: String,
        /// Error message
        message: String,
    },

    /// Transport failure reported by a test client
    #[error("Client error: {message}")]
    Client {
        /// Error message
        message: String,
    },

    /// Redirects did not settle within the client's hop limit
    #[error("Redirect loop starting at {url} ({hops} hops)")]
    RedirectLoop {
        /// URL of the first request
        url: String,
        /// Number of hops followed
        hops: usize,
    },

    /// Assertion failed
    #[error("Assertion failed: {message}")]
    AssertionFailed {
        /// Error message
        message: String,
    },

    /// Invalid configuration
    #[error("Config error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// XPath syntax or evaluation error
    #[error("XPath error: {0}")]
    XPath(#[from] XPathError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Regex error
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl ProbeError {
    /// Shorthand for [`ProbeError::ElementNotFound`]
    #[must_use]
    pub fn not_found(selector: &str) -> Self {
        Self::ElementNotFound {
            selector: selector.to_string(),
        }
    }

    /// Whether this error means the selector matched nothing
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ElementNotFound { .. })
    }
}
