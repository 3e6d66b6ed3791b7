// # State Store Trait
//
// Defines the interface for tracking which remote objects kbsync manages.
//
// ## Purpose
//
// The identity bound at creation is the only handle to a remote object, so
// it has to survive between runs. Alongside it the store keeps the last
// remote document read, which is what the next update compares against.
//
// ## Implementations
//
// - File-based: JSON file with atomic writes
// - In-memory: for tests and one-shot runs
//
// ## Usage
//
// ```rust,ignore
// use kbsync_core::StateStore;
//
// let tracked = store.get("logs-pattern").await?;
// store.put("logs-pattern", &record).await?;
// ```

use async_trait::async_trait;

use crate::model::{Identity, RemoteState, ResourceKind};

/// What kbsync remembers about one managed object
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrackedResource {
    /// Kind of the tracked object
    pub kind: ResourceKind,
    /// Identity bound when the object was created
    pub identity: Identity,
    /// Last document read from the remote store
    #[serde(default)]
    pub last_known: Option<serde_json::Value>,
    /// Timestamp of the last successful reconciliation
    pub last_synced: chrono::DateTime<chrono::Utc>,
}

impl TrackedResource {
    /// Start tracking a freshly created object
    pub fn new(kind: ResourceKind, identity: Identity) -> Self {
        Self {
            kind,
            identity,
            last_known: None,
            last_synced: chrono::Utc::now(),
        }
    }

    /// Record a fresh read of the remote object
    pub fn with_remote(mut self, remote: &RemoteState) -> Self {
        self.last_known = Some(remote.document.clone());
        self.last_synced = chrono::Utc::now();
        self
    }

    /// Last known remote state, if a read has been recorded
    pub fn remote_state(&self) -> Option<RemoteState> {
        self.last_known
            .as_ref()
            .map(|doc| RemoteState::new(self.kind, doc.clone()))
    }
}

/// Trait for state store implementations
///
/// Records are keyed by the caller-chosen resource address from the
/// manifest, not by identity.
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
///
/// ## Forbidden Capabilities
/// - ❌ Calling the remote store (owned by the reconciler)
/// - ❌ Deciding whether an object needs changes (owned by the reconciler)
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get the tracked record for an address
    ///
    /// - `Ok(Some(record))`: tracked
    /// - `Ok(None)`: not tracked
    async fn get(&self, address: &str) -> Result<Option<TrackedResource>, crate::Error>;

    /// Create or replace the tracked record for an address
    async fn put(&self, address: &str, record: &TrackedResource) -> Result<(), crate::Error>;

    /// Stop tracking an address (no error if it was not tracked)
    async fn remove(&self, address: &str) -> Result<(), crate::Error>;

    /// List all tracked addresses
    async fn list(&self) -> Result<Vec<String>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tracked_resource_records_last_read() {
        let identity = Identity::new("default", "abc123");
        let tracked = TrackedResource::new(ResourceKind::IndexPattern, identity.clone());
        assert_eq!(tracked.remote_state(), None);

        let remote = RemoteState::new(
            ResourceKind::IndexPattern,
            json!({"id": "abc123", "title": "logs-*"}),
        );
        let synced = tracked.clone().with_remote(&remote);

        assert_eq!(synced.identity, identity);
        assert!(synced.last_synced >= tracked.last_synced);
        assert_eq!(synced.remote_state(), Some(remote));
    }

    #[test]
    fn test_tracked_resource_without_last_known_deserializes() {
        let raw = json!({
            "kind": "index_pattern",
            "identity": {"space": "default", "key": "abc123"},
            "last_synced": "2024-01-01T00:00:00Z"
        });

        let tracked: TrackedResource = serde_json::from_value(raw).unwrap();
        assert_eq!(tracked.last_known, None);
    }
}
