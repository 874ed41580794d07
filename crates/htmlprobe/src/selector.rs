//! Selector resolution.
//!
//! A selector is a plain string that may name an element by id, be an XPath
//! expression, a CSS selector, a `name` attribute, or a piece of text the
//! element contains. Each interpretation is tried in that order and the
//! first one that matches anything wins.
//!
//! ```
//! use htmlprobe::{resolve, Document, Strategy};
//!
//! let doc = Document::parse(r#"<p id="p">Hello</p><a name="p">link</a>"#);
//! let (strategy, found) = htmlprobe::selector::resolve_with_strategy(&doc, "p").unwrap();
//! assert_eq!(strategy, Strategy::Id);
//! assert_eq!(found.len(), 1);
//! assert!(resolve(&doc, "Hello").is_ok());
//! ```

use scraper::ElementRef;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dom::{attr, text_content, Document};
use crate::result::{ProbeError, ProbeResult};

/// One interpretation of a selector string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// `id` attribute equals the selector
    Id,
    /// Selector is an XPath expression
    XPath,
    /// Selector is a CSS selector
    Css,
    /// `name` attribute equals the selector
    Name,
    /// Element text contains the selector
    Text,
}

impl Strategy {
    /// Get strategy name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::XPath => "xpath",
            Self::Css => "css",
            Self::Name => "name",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type StrategyFn = for<'a> fn(&'a Document, &str) -> Vec<ElementRef<'a>>;

/// Strategies in resolution order
const STRATEGIES: [(Strategy, StrategyFn); 5] = [
    (Strategy::Id, by_id),
    (Strategy::XPath, by_xpath),
    (Strategy::Css, by_css),
    (Strategy::Name, by_name),
    (Strategy::Text, by_text),
];

/// Elements whose `id` attribute equals `selector`
#[must_use]
pub fn by_id<'a>(doc: &'a Document, selector: &str) -> Vec<ElementRef<'a>> {
    doc.elements()
        .filter(|el| attr(*el, "id") == Some(selector))
        .collect()
}

/// Elements selected by `selector` as XPath. Syntax errors match nothing.
#[must_use]
pub fn by_xpath<'a>(doc: &'a Document, selector: &str) -> Vec<ElementRef<'a>> {
    doc.xpath(selector).unwrap_or_else(|e| {
        tracing::trace!(selector, error = %e, "not usable as xpath");
        Vec::new()
    })
}

/// Elements matching `selector` as CSS. Syntax errors match nothing.
#[must_use]
pub fn by_css<'a>(doc: &'a Document, selector: &str) -> Vec<ElementRef<'a>> {
    doc.css(selector).unwrap_or_else(|e| {
        tracing::trace!(selector, error = %e, "not usable as css");
        Vec::new()
    })
}

/// Elements whose `name` attribute equals `selector`
#[must_use]
pub fn by_name<'a>(doc: &'a Document, selector: &str) -> Vec<ElementRef<'a>> {
    doc.elements()
        .filter(|el| attr(*el, "name") == Some(selector))
        .collect()
}

/// Elements whose text contains `selector`, outermost first
#[must_use]
pub fn by_text<'a>(doc: &'a Document, selector: &str) -> Vec<ElementRef<'a>> {
    doc.elements()
        .filter(|el| text_content(*el).contains(selector))
        .collect()
}

/// Resolve a selector, reporting which strategy matched
pub fn resolve_with_strategy<'a>(
    doc: &'a Document,
    selector: &str,
) -> ProbeResult<(Strategy, Vec<ElementRef<'a>>)> {
    for (strategy, find) in STRATEGIES {
        let found = find(doc, selector);
        if found.is_empty() {
            tracing::trace!(selector, %strategy, "no match");
            continue;
        }
        tracing::debug!(selector, %strategy, count = found.len(), "selector resolved");
        return Ok((strategy, found));
    }
    Err(ProbeError::not_found(selector))
}

/// Resolve a selector to the elements of the first matching strategy.
///
/// # Errors
///
/// [`ProbeError::ElementNotFound`] when no strategy matches.
pub fn resolve<'a>(doc: &'a Document, selector: &str) -> ProbeResult<Vec<ElementRef<'a>>> {
    resolve_with_strategy(doc, selector).map(|(_, found)| found)
}
