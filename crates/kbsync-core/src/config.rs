//! Configuration types for kbsync
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::model::{DesiredState, ResourceKind};

/// Default request timeout towards Kibana
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Main kbsync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbsyncConfig {
    /// Kibana connection settings
    pub kibana: KibanaConfig,

    /// Where bound identities are kept
    #[serde(default)]
    pub state_store: StateStoreConfig,

    /// Resources to manage, in apply order
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

impl KbsyncConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.kibana.validate()?;
        self.state_store.validate()?;

        let mut seen = HashSet::new();
        for resource in &self.resources {
            resource.validate()?;
            if !seen.insert(resource.address.as_str()) {
                return Err(crate::Error::config(format!(
                    "Duplicate resource address: {}",
                    resource.address
                )));
            }
        }

        Ok(())
    }
}

/// Kibana connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct KibanaConfig {
    /// Base URL, e.g. `https://kibana.example.com:5601`
    pub url: String,

    /// Basic auth user
    #[serde(default)]
    pub username: Option<String>,

    /// Basic auth password
    #[serde(default)]
    pub password: Option<String>,

    /// API key (alternative to basic auth)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Accept invalid TLS certificates
    #[serde(default)]
    pub insecure: bool,

    /// Request timeout (in seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

// Custom Debug implementation that hides credentials
impl std::fmt::Debug for KibanaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KibanaConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<REDACTED>"))
            .field("insecure", &self.insecure)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl KibanaConfig {
    /// Connection settings without credentials
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            api_key: None,
            insecure: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Use basic auth
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Use an API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Validate the connection settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.url.is_empty() {
            return Err(crate::Error::config("Kibana URL cannot be empty"));
        }
        if !self.url.starts_with("https://") && !self.url.starts_with("http://") {
            return Err(crate::Error::config(format!(
                "Kibana URL must use HTTP or HTTPS scheme. Got: {}",
                self.url
            )));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(crate::Error::config(
                "Kibana username and password must be set together",
            ));
        }
        if self.username.is_some() && self.api_key.is_some() {
            return Err(crate::Error::config(
                "Use either basic auth or an API key, not both",
            ));
        }
        if self.timeout_secs == 0 {
            return Err(crate::Error::config("Kibana timeout must be > 0"));
        }
        Ok(())
    }
}

/// State store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based state store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory state store (not persistent)
    #[default]
    Memory,
}

impl StateStoreConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StateStoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("State file path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// One managed resource in a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Caller-chosen label the identity is tracked under
    pub address: String,

    /// Resource kind
    pub kind: ResourceKind,

    /// Space the resource lives in
    #[serde(default = "default_space")]
    pub space: String,

    /// Resource name (title, saved-object id, or unused)
    #[serde(default)]
    pub name: String,

    /// Body: either a JSON string or an inline JSON value
    #[serde(default = "default_body")]
    pub body: serde_json::Value,
}

impl ResourceConfig {
    /// Create a new resource configuration
    pub fn new(address: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            address: address.into(),
            kind,
            space: default_space(),
            name: String::new(),
            body: default_body(),
        }
    }

    /// Set the space
    pub fn with_space(mut self, space: impl Into<String>) -> Self {
        self.space = space.into();
        self
    }

    /// Set the name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.address.is_empty() {
            return Err(crate::Error::config("Resource address cannot be empty"));
        }
        if self.space.is_empty() {
            return Err(crate::Error::config(format!(
                "Resource {} has an empty space",
                self.address
            )));
        }
        Ok(())
    }

    /// Desired state for this resource.
    ///
    /// A string body is passed through verbatim, so malformed JSON surfaces
    /// as a validation error from the reconciler.
    pub fn to_desired(&self) -> DesiredState {
        let body = match &self.body {
            serde_json::Value::String(raw) => raw.clone(),
            other => other.to_string(),
        };
        DesiredState::new(self.kind, self.space.clone(), self.name.clone(), body)
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_space() -> String {
    "default".to_string()
}

fn default_body() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}
