//! Identity binding
//!
//! Maps desired states and identities to request paths, and decides where an
//! object's key comes from:
//!
//! | Kind | Strategy | Key |
//! |---|---|---|
//! | index pattern | server-assigned | `index_pattern.id` from the create response |
//! | free-form object | caller-assigned | the desired `name` |
//! | log pattern set | singleton | locally generated token |

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{DesiredState, Identity, ResourceKind};

/// Saved-object type tag used for free-form objects
pub const SAVED_OBJECT_TYPE: &str = "index-pattern";

/// Where an object's identity key comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityStrategy {
    /// The remote store generates the key on create
    ServerAssigned,
    /// The caller's name is the key
    CallerAssigned,
    /// One object per space; the key is a local tracking token
    Singleton,
}

impl ResourceKind {
    pub fn identity_strategy(&self) -> IdentityStrategy {
        match self {
            ResourceKind::IndexPattern => IdentityStrategy::ServerAssigned,
            ResourceKind::FreeformObject => IdentityStrategy::CallerAssigned,
            ResourceKind::LogPatternSet => IdentityStrategy::Singleton,
        }
    }
}

/// Resolves request paths and binds identities for one resource kind
#[derive(Debug, Clone, Copy)]
pub struct IdentityBinder {
    kind: ResourceKind,
}

impl IdentityBinder {
    pub fn new(kind: ResourceKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Path the create call is issued against.
    ///
    /// Singletons have no create call; their path is the one the delegated
    /// update writes to.
    pub fn resolve_create_address(&self, desired: &DesiredState) -> String {
        match self.kind {
            ResourceKind::IndexPattern => index_pattern_collection(&desired.space),
            ResourceKind::FreeformObject => saved_object_path(&desired.space, &desired.name),
            ResourceKind::LogPatternSet => log_source_path(&desired.space),
        }
    }

    /// Bind the identity of a freshly created object.
    ///
    /// `response` is the create call's body. It is only consulted for
    /// server-assigned kinds; a missing id there is a decode error.
    pub fn bind_identity_after_create(
        &self,
        desired: &DesiredState,
        response: &Value,
    ) -> Result<Identity> {
        let key = match self.kind.identity_strategy() {
            IdentityStrategy::ServerAssigned => response
                .get("index_pattern")
                .and_then(|p| p.get("id"))
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| {
                    Error::decode("create response has no index_pattern.id")
                })?
                .to_string(),
            IdentityStrategy::CallerAssigned => desired.name.clone(),
            IdentityStrategy::Singleton => unique_token(),
        };

        let identity = Identity::new(desired.space.clone(), key);
        debug!("Bound {} identity {}", self.kind, identity);
        Ok(identity)
    }

    /// Path addressing an existing object
    pub fn resolve_address(&self, identity: &Identity) -> String {
        match self.kind {
            ResourceKind::IndexPattern => {
                format!("{}/{}", index_pattern_collection(&identity.space), identity.key)
            }
            ResourceKind::FreeformObject => saved_object_path(&identity.space, &identity.key),
            // The token only tracks the object locally; the space is the address.
            ResourceKind::LogPatternSet => log_source_path(&identity.space),
        }
    }
}

fn index_pattern_collection(space: &str) -> String {
    format!("/s/{}/api/index_patterns/index_pattern", space)
}

fn saved_object_path(space: &str, id: &str) -> String {
    format!("/s/{}/api/saved_objects/{}/{}", space, SAVED_OBJECT_TYPE, id)
}

fn log_source_path(space: &str) -> String {
    format!("/s/{}/api/infra/log_source_configurations/default", space)
}

fn unique_token() -> String {
    format!("kbsync-{}", uuid::Uuid::new_v4().simple())
}
