//! Session configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::result::{ProbeError, ProbeResult};

/// Origin test clients conventionally serve from
pub const DEFAULT_BASE_URL: &str = "http://testserver";

/// Configuration for a [`Session`](crate::Session)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Ask the client to follow redirects
    pub follow_redirects: bool,
    /// Resolve link and form targets against the current URL
    pub absolute_links: bool,
    /// Origin used when the current URL is relative
    pub base_url: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            follow_redirects: true,
            absolute_links: true,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl SessionConfig {
    /// Create new config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set redirect following
    #[must_use]
    pub const fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    /// Set link absolutisation
    #[must_use]
    pub const fn absolute_links(mut self, enabled: bool) -> Self {
        self.absolute_links = enabled;
        self
    }

    /// Set the base URL
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Parse a config from YAML. Missing keys keep their defaults.
    pub fn from_yaml(yaml: &str) -> ProbeResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml).map_err(|e| ProbeError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ProbeResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> ProbeResult<String> {
        serde_yaml_ng::to_string(self).map_err(|e| ProbeError::Config {
            message: e.to_string(),
        })
    }

    /// Check that `base_url` is an absolute URL
    pub fn validate(&self) -> ProbeResult<()> {
        let parsed = url::Url::parse(&self.base_url).map_err(|e| ProbeError::Config {
            message: format!("base_url {}: {e}", self.base_url),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ProbeError::Config {
                message: format!("base_url {} cannot be a base", self.base_url),
            });
        }
        Ok(())
    }
}
