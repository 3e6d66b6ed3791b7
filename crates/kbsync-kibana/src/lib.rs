// # Kibana REST Client
//
// This crate provides the `RemoteClient` implementation kbsync uses to talk
// to a real Kibana.
//
// ## Behavior
//
// - One HTTP request per call, no retries, no caching
// - `kbn-xsrf: true` on every request (Kibana rejects writes without it)
// - Basic auth or `Authorization: ApiKey ...`
// - Any status >= 300 becomes `Error::Api` with the status code preserved,
//   so the core can classify 404 itself
// - Request timeout configurable (30 seconds by default)
//
// ## Security Requirements
//
// - Passwords and API keys NEVER appear in logs or Debug output
// - Construction fails with a configuration error, it never panics
//
// ## API Reference
//
// - Index patterns: `/s/:space/api/index_patterns/index_pattern[/:id]`
// - Saved objects: `/s/:space/api/saved_objects/:type/:id`
// - Log sources: `/s/:space/api/infra/log_source_configurations/default`

use async_trait::async_trait;
use kbsync_core::config::KibanaConfig;
use kbsync_core::traits::{HttpMethod, RemoteClient};
use kbsync_core::{Error, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::time::Duration;

/// Header Kibana requires on every state-changing request
const XSRF_HEADER: &str = "kbn-xsrf";

/// How the client authenticates
#[derive(Clone)]
enum Auth {
    None,
    Basic { username: String, password: String },
    ApiKey(String),
}

/// Kibana client
///
/// Stateless apart from its connection pool: every `request` is a single
/// round trip and its outcome is returned to the caller untouched.
pub struct KibanaClient {
    /// Base URL without a trailing slash
    base_url: String,

    /// Credentials
    /// ⚠️ NEVER log these
    auth: Auth,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides credentials
impl std::fmt::Debug for KibanaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let auth = match &self.auth {
            Auth::None => "none",
            Auth::Basic { .. } => "basic <REDACTED>",
            Auth::ApiKey(_) => "api-key <REDACTED>",
        };
        f.debug_struct("KibanaClient")
            .field("base_url", &self.base_url)
            .field("auth", &auth)
            .finish()
    }
}

impl KibanaClient {
    /// Create a new Kibana client
    ///
    /// # Errors
    ///
    /// `Error::Config` when the settings do not validate, the URL does not
    /// parse, or the HTTP client cannot be built.
    pub fn new(config: &KibanaConfig) -> Result<Self> {
        config.validate()?;

        reqwest::Url::parse(&config.url)
            .map_err(|e| Error::config(format!("Invalid Kibana URL {}: {}", config.url, e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(XSRF_HEADER),
            HeaderValue::from_static("true"),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        if config.insecure {
            tracing::warn!("TLS certificate verification is disabled for {}", config.url);
        }

        let auth = match (&config.username, &config.password, &config.api_key) {
            (Some(username), Some(password), _) => Auth::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            (_, _, Some(key)) => Auth::ApiKey(key.clone()),
            _ => Auth::None,
        };

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            auth,
            client,
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        Ok(match &self.auth {
            Auth::None => builder,
            Auth::Basic { username, password } => builder.basic_auth(username, Some(password)),
            Auth::ApiKey(key) => {
                let mut value = HeaderValue::from_str(&format!("ApiKey {}", key))
                    .map_err(|_| Error::config("API key contains invalid header characters"))?;
                value.set_sensitive(true);
                builder.header(AUTHORIZATION, value)
            }
        })
    }
}

fn to_reqwest(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl RemoteClient for KibanaClient {
    async fn request(&self, method: HttpMethod, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = self.url(path);
        tracing::debug!("{} {}", method, url);

        let mut builder = self.client.request(to_reqwest(method), &url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let builder = self.authorize(builder)?;

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::transport(format!("{} {} timed out: {}", method, path, e))
            } else {
                Error::transport(format!("{} {} failed: {}", method, path, e))
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::transport(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            let message = if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("Unknown status").to_string()
            } else {
                text
            };

            // Status is kept intact; classification belongs to the core
            match status.as_u16() {
                401 | 403 => tracing::warn!(
                    "Kibana rejected credentials for {} {}: {}",
                    method,
                    path,
                    status
                ),
                404 => tracing::debug!("{} {} returned 404", method, path),
                _ => tracing::debug!("{} {} returned {}", method, path, status),
            }

            return Err(Error::api(status.as_u16(), message));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text)
            .map_err(|e| Error::decode(format!("{} {} returned invalid JSON: {}", method, path, e)))
    }

    fn client_name(&self) -> &'static str {
        "kibana"
    }
}
