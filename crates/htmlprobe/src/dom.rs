//! Parsed response documents.

use scraper::{ElementRef, Html, Selector};

use crate::result::{ProbeError, ProbeResult};
use crate::xpath::XPath;

/// An HTML document parsed from a response body
#[derive(Debug)]
pub struct Document {
    html: Html,
}

impl Document {
    /// Parse a document. HTML parsing is lenient and never fails.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        Self {
            html: Html::parse_document(body),
        }
    }

    /// The underlying scraper tree
    #[must_use]
    pub const fn html(&self) -> &Html {
        &self.html
    }

    /// The `<html>` element
    #[must_use]
    pub fn root_element(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    /// Every element, in document order
    pub fn elements(&self) -> impl Iterator<Item = ElementRef<'_>> {
        self.html.tree.root().descendants().filter_map(ElementRef::wrap)
    }

    /// Elements matching a CSS selector
    pub fn css(&self, selector: &str) -> ProbeResult<Vec<ElementRef<'_>>> {
        let parsed = Selector::parse(selector).map_err(|e| ProbeError::InvalidCss {
            selector: selector.to_string(),
            message: e.to_string(),
        })?;
        Ok(self.html.select(&parsed).collect())
    }

    /// Elements selected by an XPath expression
    ///
    /// # Errors
    ///
    /// [`ProbeError::XPath`] when the expression doesn't compile or doesn't
    /// produce a node-set.
    pub fn xpath(&self, expression: &str) -> ProbeResult<Vec<ElementRef<'_>>> {
        Ok(XPath::compile(expression)?.select(&self.html)?)
    }

    /// Text content of the whole document
    #[must_use]
    pub fn text(&self) -> String {
        text_content(self.root_element())
    }
}

/// Concatenated text of an element and its descendants
#[must_use]
pub fn text_content(element: ElementRef<'_>) -> String {
    element.text().collect()
}

/// Attribute value of an element
#[must_use]
pub fn attr<'a>(element: ElementRef<'a>, name: &str) -> Option<&'a str> {
    element.value().attr(name)
}

/// Lowercase tag name of an element
#[must_use]
pub fn tag_name<'a>(element: ElementRef<'a>) -> &'a str {
    element.value().name()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xpath::XPathError;

    const PAGE: &str = r#"<html><head><title>T</title></head>
<body><div id="a" class="box"><p>one <b>two</b></p></div><p>three</p></body></html>"#;

    #[test]
    fn test_elements_in_document_order() {
        let doc = Document::parse(PAGE);
        let names: Vec<&str> = doc.elements().map(tag_name).collect();
        assert_eq!(names, vec!["html", "head", "title", "body", "div", "p", "b", "p"]);
    }

    #[test]
    fn test_css() {
        let doc = Document::parse(PAGE);
        assert_eq!(doc.css("div.box p").unwrap().len(), 1);
        assert_eq!(doc.css("p").unwrap().len(), 2);
        assert!(doc.css("section").unwrap().is_empty());
    }

    #[test]
    fn test_css_invalid() {
        let doc = Document::parse(PAGE);
        let err = doc.css("div[").unwrap_err();
        assert!(matches!(err, ProbeError::InvalidCss { .. }));
    }

    #[test]
    fn test_xpath() {
        let doc = Document::parse(PAGE);
        let found = doc.xpath("//div[@id='a']//b").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(text_content(found[0]), "two");
    }

    #[test]
    fn test_xpath_errors() {
        let doc = Document::parse(PAGE);
        assert!(matches!(
            doc.xpath("//div[").unwrap_err(),
            ProbeError::XPath(XPathError::UnexpectedEnd | XPathError::Syntax { .. })
        ));
        assert!(matches!(
            doc.xpath("count(//p)").unwrap_err(),
            ProbeError::XPath(XPathError::NotANodeSet)
        ));
    }

    #[test]
    fn test_text_and_attr() {
        let doc = Document::parse(PAGE);
        assert!(doc.text().contains("one two"));
        let div = doc.css("#a").unwrap()[0];
        assert_eq!(attr(div, "class"), Some("box"));
        assert_eq!(attr(div, "title"), None);
    }
}
