//! The browsing session: one simulated browser tab.
//!
//! A [`Session`] issues requests through a [`TestClient`], remembers the
//! last response and the URL it came from, and parses the body into a
//! [`Document`] the first time something reads the DOM. Every new request
//! drops the parsed document.

use scraper::ElementRef;
use serde::de::DeserializeOwned;
use std::cell::OnceCell;

use crate::client::{ClientResponse, Method, Params, TestClient};
use crate::config::SessionConfig;
use crate::dom::{attr, tag_name, Document};
use crate::form::{Form, FormValues};
use crate::links::absolutize;
use crate::result::{ProbeError, ProbeResult};
use crate::selector::resolve;

/// A browser-like session over a test client
#[derive(Debug)]
pub struct Session<C: TestClient> {
    client: C,
    config: SessionConfig,
    response: Option<ClientResponse>,
    current_url: Option<String>,
    dom: OnceCell<Document>,
}

impl<C: TestClient> Session<C> {
    /// Create a session with the default config
    #[must_use]
    pub fn new(client: C) -> Self {
        Self::with_config(client, SessionConfig::default())
    }

    /// Create a session with a config
    #[must_use]
    pub fn with_config(client: C, config: SessionConfig) -> Self {
        Self {
            client,
            config,
            response: None,
            current_url: None,
            dom: OnceCell::new(),
        }
    }

    /// Session config
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The underlying client
    #[must_use]
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// The underlying client, mutably
    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    /// Consume the session, returning its client
    pub fn into_client(self) -> C {
        self.client
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Issue a request by method name (`GET` or `POST`, any case).
    ///
    /// # Errors
    ///
    /// [`ProbeError::UnsupportedMethod`] for other methods; client errors
    /// are passed through.
    pub fn request(&mut self, method: &str, url: &str, params: &Params) -> ProbeResult<()> {
        let method = Method::parse(method)?;
        self.send(method, url, params)
    }

    /// Issue a request
    ///
    /// # Errors
    ///
    /// Client errors are passed through unchanged. Session state is left
    /// as it was when the client fails.
    pub fn send(&mut self, method: Method, url: &str, params: &Params) -> ProbeResult<()> {
        let follow = self.config.follow_redirects;
        tracing::debug!(%method, url, params = params.len(), follow, "request");

        let response = match method {
            Method::Get => self.client.get(url, params, follow)?,
            Method::Post => self.client.post(url, params, follow)?,
        };

        let current = response.final_redirect().unwrap_or(url).to_string();
        tracing::debug!(
            status = response.status,
            redirects = response.redirect_chain.len(),
            current_url = %current,
            "response"
        );

        self.current_url = Some(current);
        self.response = Some(response);
        self.dom = OnceCell::new();
        Ok(())
    }

    /// GET `url`
    ///
    /// # Errors
    ///
    /// See [`Session::send`].
    pub fn get(&mut self, url: &str, params: &Params) -> ProbeResult<()> {
        self.send(Method::Get, url, params)
    }

    /// POST to `url`
    ///
    /// # Errors
    ///
    /// See [`Session::send`].
    pub fn post(&mut self, url: &str, params: &Params) -> ProbeResult<()> {
        self.send(Method::Post, url, params)
    }

    // ========================================================================
    // Response state
    // ========================================================================

    /// Last response
    ///
    /// # Errors
    ///
    /// [`ProbeError::NoResponse`] before the first request.
    pub fn response(&self) -> ProbeResult<&ClientResponse> {
        self.response.as_ref().ok_or(ProbeError::NoResponse)
    }

    /// Status code of the last response
    ///
    /// # Errors
    ///
    /// [`ProbeError::NoResponse`] before the first request.
    pub fn status(&self) -> ProbeResult<u16> {
        Ok(self.response()?.status)
    }

    /// URL of the last response after redirects
    #[must_use]
    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    /// Body of the last response as text
    ///
    /// # Errors
    ///
    /// [`ProbeError::NoResponse`] before the first request.
    pub fn body(&self) -> ProbeResult<String> {
        Ok(self.response()?.body_string())
    }

    /// Parsed body of the last response, parsed on first use
    ///
    /// # Errors
    ///
    /// [`ProbeError::NoResponse`] before the first request.
    pub fn document(&self) -> ProbeResult<&Document> {
        let response = self.response()?;
        Ok(self.dom.get_or_init(|| {
            tracing::trace!(bytes = response.body.len(), "parsing response body");
            Document::parse(&response.body_string())
        }))
    }

    /// Body parsed as CSV rows. Every row is returned, including the first.
    ///
    /// # Errors
    ///
    /// [`ProbeError::NoResponse`] or [`ProbeError::Csv`].
    pub fn csv(&self) -> ProbeResult<Vec<Vec<String>>> {
        let response = self.response()?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(response.body.as_slice());
        reader
            .records()
            .map(|record| -> ProbeResult<Vec<String>> {
                Ok(record?.iter().map(str::to_string).collect())
            })
            .collect()
    }

    /// Body deserialized from JSON
    ///
    /// # Errors
    ///
    /// [`ProbeError::NoResponse`] or [`ProbeError::Json`].
    pub fn json<T: DeserializeOwned>(&self) -> ProbeResult<T> {
        Ok(serde_json::from_slice(&self.response()?.body)?)
    }

    // ========================================================================
    // DOM queries
    // ========================================================================

    /// Elements a selector resolves to.
    ///
    /// # Errors
    ///
    /// [`ProbeError::ElementNotFound`] when nothing matches, or
    /// [`ProbeError::NoResponse`].
    pub fn resolve(&self, selector: &str) -> ProbeResult<Vec<ElementRef<'_>>> {
        resolve(self.document()?, selector)
    }

    /// Whether a selector resolves to anything
    #[must_use]
    pub fn element_exists(&self, selector: &str) -> bool {
        self.resolve(selector).is_ok()
    }

    /// The single element a selector resolves to
    ///
    /// # Errors
    ///
    /// [`ProbeError::MultipleElements`] when more than one element matches,
    /// plus the errors of [`Session::resolve`].
    pub fn single_element(&self, selector: &str) -> ProbeResult<ElementRef<'_>> {
        let found = self.resolve(selector)?;
        match found.as_slice() {
            [one] => Ok(*one),
            _ => Err(ProbeError::MultipleElements {
                selector: selector.to_string(),
                count: found.len(),
            }),
        }
    }

    /// Attribute of the single element a selector resolves to
    ///
    /// # Errors
    ///
    /// [`ProbeError::MissingAttribute`] when the element lacks it, plus the
    /// errors of [`Session::single_element`].
    pub fn attribute_value(&self, selector: &str, attribute: &str) -> ProbeResult<String> {
        let element = self.single_element(selector)?;
        attr(element, attribute)
            .map(str::to_string)
            .ok_or_else(|| ProbeError::MissingAttribute {
                selector: selector.to_string(),
                attribute: attribute.to_string(),
            })
    }

    /// Resolve a link or form target against the current URL
    fn target_url(&self, target: &str) -> ProbeResult<String> {
        match (&self.current_url, self.config.absolute_links) {
            (Some(current), true) => absolutize(current, target, &self.config.base_url),
            _ => Ok(target.to_string()),
        }
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Follow the one link a selector resolves to
    ///
    /// # Errors
    ///
    /// [`ProbeError::AmbiguousLink`] unless exactly one `<a>` matches,
    /// [`ProbeError::MissingAttribute`] for a link without `href`.
    pub fn follow_link(&mut self, selector: &str) -> ProbeResult<()> {
        let href = {
            let links: Vec<ElementRef<'_>> = match self.resolve(selector) {
                Ok(found) => found.into_iter().filter(|el| tag_name(*el) == "a").collect(),
                Err(ProbeError::ElementNotFound { .. }) => Vec::new(),
                Err(e) => return Err(e),
            };
            let [link] = links.as_slice() else {
                return Err(ProbeError::AmbiguousLink {
                    selector: selector.to_string(),
                    count: links.len(),
                });
            };
            let href = attr(*link, "href").ok_or_else(|| ProbeError::MissingAttribute {
                selector: selector.to_string(),
                attribute: "href".to_string(),
            })?;
            self.target_url(href)?
        };
        tracing::debug!(selector, href = %href, "following link");
        self.get(&href, &Params::new())
    }

    /// The form a selector resolves to
    ///
    /// # Errors
    ///
    /// [`ProbeError::AmbiguousOrMissingForm`] when nothing matches or the
    /// first match isn't a `<form>`.
    pub fn form(&self, selector: &str) -> ProbeResult<Form> {
        let found = match self.resolve(selector) {
            Ok(found) => found,
            Err(ProbeError::ElementNotFound { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };
        match found.first() {
            Some(el) if tag_name(*el) == "form" => Form::from_element(*el),
            _ => Err(ProbeError::AmbiguousOrMissingForm {
                selector: selector.to_string(),
            }),
        }
    }

    /// Current values of the form a selector resolves to
    ///
    /// # Errors
    ///
    /// See [`Session::form`].
    pub fn form_values(&self, selector: &str) -> ProbeResult<FormValues> {
        Ok(self.form(selector)?.snapshot())
    }

    /// Submit a form the way a browser would, with `overrides` replacing
    /// current field values
    ///
    /// # Errors
    ///
    /// Errors of [`Session::form`], [`ProbeError::UnknownField`] for
    /// overrides the form lacks, [`ProbeError::UnsupportedMethod`] for a
    /// `method` other than GET or POST.
    pub fn submit_form(&mut self, selector: &str, overrides: FormValues) -> ProbeResult<()> {
        let (method, action, params) = {
            let form = self.form(selector)?;
            let method = Method::parse(&form.method)?;
            let params = form.submission(overrides)?;
            let action = match form.action.as_deref().filter(|a| !a.trim().is_empty()) {
                Some(action) => self.target_url(action)?,
                None => self.current_url.clone().unwrap_or_default(),
            };
            (method, action, params)
        };
        tracing::debug!(selector, %method, action = %action, "submitting form");
        self.send(method, &action, &params)
    }
}
