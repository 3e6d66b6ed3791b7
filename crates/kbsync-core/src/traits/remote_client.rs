// # Remote Client Trait
//
// Defines the transport boundary between the reconciler and the remote store.
//
// ## Implementations
//
// - Kibana REST API: `kbsync-kibana` crate
// - In-memory fakes in the contract tests
//
// ## Usage
//
// ```rust,ignore
// use kbsync_core::traits::{HttpMethod, RemoteClient};
//
// let body = client
//     .request(HttpMethod::Get, "/s/default/api/index_patterns/index_pattern/abc123", None)
//     .await?;
// ```

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// HTTP verbs used by the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether this verb changes remote state
    pub fn is_write(&self) -> bool {
        !matches!(self, HttpMethod::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for remote store clients
///
/// A client performs exactly one HTTP exchange per call and knows nothing
/// about resource kinds, identities or drift.
///
/// # Contract
///
/// - `path` is absolute (starts with `/`) and may carry a query string
/// - status >= 300 → [`crate::Error::Api`] with the status code; the body is
///   never parsed as success
/// - no response at all → [`crate::Error::Transport`]
/// - 2xx with an empty body → `Ok(Value::Null)`
/// - 2xx with an unparsable body → [`crate::Error::Decode`]
///
/// # Forbidden
///
/// - Retrying or backing off (resilience belongs to whoever invokes the
///   reconciler)
/// - Caching responses across calls
/// - Mapping 404 to success (classification belongs to the reconciler)
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Send one request and return the decoded JSON body
    async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, crate::Error>;

    /// Client name (for logging/debugging)
    fn client_name(&self) -> &'static str;
}
