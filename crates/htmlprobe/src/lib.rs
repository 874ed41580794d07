//! htmlprobe: browser-style assertions for web application tests
//!
//! Drives an application's test client the way a person drives a browser:
//! request a page, look for elements, follow a link, fill in and submit a
//! form, then check where you ended up. No browser is involved; responses
//! are parsed with `scraper` and queried through a forgiving selector
//! resolver.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  get/post   ┌────────────┐   ClientResponse  ┌───────────┐
//! │ Test (Rust)  │────────────►│  Session   │◄──────────────────│TestClient │
//! │              │◄────────────│ current_url│──────────────────►│ (app/mock)│
//! └──────────────┘ assertions  │ OnceCell<  │                   └───────────┘
//!                              │  Document> │
//!                              └─────┬──────┘
//!                                    │ resolve(selector)
//!                     id ─► XPath ─► CSS ─► name ─► text
//! ```
//!
//! # Example
//!
//! ```
//! use htmlprobe::{form_values, MockClient, MockResponse, Params, Session};
//!
//! let mut client = MockClient::new();
//! client.on_get(
//!     "/login",
//!     MockResponse::html(
//!         r#"<form id="login" method="post" action="/session">
//!              <input name="user"><input type="submit" value="Go"></form>"#,
//!     ),
//! );
//! client.on_post("/session", MockResponse::redirect("/home"));
//! client.on_get("/home", MockResponse::html("<h1>Welcome back</h1>"));
//!
//! let mut session = Session::new(client);
//! session.get("/login", &Params::new())?;
//! session.submit_form("login", form_values([("user", "alice")]))?;
//!
//! session.assert_current_url("/home").assert();
//! session.assert_element_exists("Welcome back").assert();
//! # Ok::<(), htmlprobe::ProbeError>(())
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod assertion;
mod client;
mod config;
mod dom;
mod form;
mod links;
mod result;
mod session;

/// In-memory test client with a route table
///
/// Serves canned or computed responses, records every request and follows
/// redirects like a real test client would.
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod mock;

/// Selector resolution strategies
pub mod selector;

/// XPath 1.0 over scraper documents
#[allow(
    clippy::cast_precision_loss,
    clippy::float_cmp,
    clippy::unused_self,
    clippy::too_many_lines
)]
pub mod xpath;

pub use assertion::{Assertion, AssertionResult};
pub use client::{
    encode_params, params, ClientResponse, Method, ParamValue, Params, RedirectHop, TestClient,
};
pub use config::{SessionConfig, DEFAULT_BASE_URL};
pub use dom::{text_content, Document};
pub use form::{form_values, Form, FormField, FormValue, FormValues, Submitter};
pub use links::{absolutize, ParsedUrl, UrlExpectation};
pub use mock::{CapturedRequest, MockClient, MockResponse, Route, UrlPattern};
pub use result::{ProbeError, ProbeResult};
pub use selector::{resolve, Strategy};
pub use session::Session;
pub use xpath::{XPath, XPathError};
