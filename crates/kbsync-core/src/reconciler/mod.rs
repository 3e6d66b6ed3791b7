//! Resource reconciler
//!
//! One driver for all resource kinds. Each operation is a single remote call
//! (or none), and kind-specific behavior is a `match` on [`ResourceKind`]:
//!
//! ```text
//!            create / read(found)
//!   Absent ───────────────────────▶ Present ──┐ update
//!     ▲                                │  ◀───┘
//!     └────── delete / read(404) ──────┘
//! ```
//!
//! ## Error policy
//!
//! - Invalid desired state → [`Error::Validation`] before any remote call
//! - 404 on read or delete → `Absent`, never an error
//! - Anything else → returned unchanged, no retry

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::compare::NormalizingComparator;
use crate::error::{Classification, Error, Result};
use crate::identity::IdentityBinder;
use crate::model::{DesiredState, Identity, Payload, RemoteState, ResourceKind, ResourceState};
use crate::model::join_patterns;
use crate::traits::{HttpMethod, RemoteClient};

/// Result of a read
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// The object exists
    Present(RemoteState),
    /// The object is gone (deleted out of band, or never existed)
    Absent,
}

impl ReadOutcome {
    pub fn state(&self) -> ResourceState {
        match self {
            ReadOutcome::Present(_) => ResourceState::Present,
            ReadOutcome::Absent => ResourceState::Absent,
        }
    }

    pub fn into_remote(self) -> Option<RemoteState> {
        match self {
            ReadOutcome::Present(remote) => Some(remote),
            ReadOutcome::Absent => None,
        }
    }
}

/// Result of an update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A write was issued
    Applied,
    /// Desired and last known state already match; nothing was sent
    Unchanged,
}

/// Result of a delete. Every variant leaves the object `Absent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The remote object was deleted
    Deleted,
    /// The remote object was already gone
    AlreadyAbsent,
    /// Only local tracking was dropped; the space owns the remote object
    Released,
}

/// CRUD state machine for one resource kind
///
/// # Example
///
/// ```rust,ignore
/// let reconciler = ResourceReconciler::new(ResourceKind::IndexPattern, client);
/// let identity = reconciler.create(&desired).await?;
/// match reconciler.read(&identity).await? {
///     ReadOutcome::Present(remote) => { /* track remote */ }
///     ReadOutcome::Absent => { /* drop tracking */ }
/// }
/// ```
pub struct ResourceReconciler {
    kind: ResourceKind,
    binder: IdentityBinder,
    client: Arc<dyn RemoteClient>,
}

impl std::fmt::Debug for ResourceReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceReconciler")
            .field("kind", &self.kind)
            .field("client", &self.client.client_name())
            .finish()
    }
}

impl ResourceReconciler {
    pub fn new(kind: ResourceKind, client: Arc<dyn RemoteClient>) -> Self {
        Self {
            kind,
            binder: IdentityBinder::new(kind),
            client,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Create the object and bind its identity.
    ///
    /// On error no identity exists; creating again is safe.
    pub async fn create(&self, desired: &DesiredState) -> Result<Identity> {
        let payload = self.validate(desired)?;

        let identity = match payload {
            Payload::IndexPattern {
                title,
                time_field_name,
            } => {
                let path = self.binder.resolve_create_address(desired);
                let mut index_pattern = json!({ "title": title });
                if let Some(field) = time_field_name {
                    index_pattern["timeFieldName"] = Value::String(field);
                }
                let response = self
                    .send(HttpMethod::Post, &path, Some(&json!({ "index_pattern": index_pattern })))
                    .await?;
                self.binder.bind_identity_after_create(desired, &response)?
            }
            Payload::FreeformObject(body) => {
                let path = format!("{}?overwrite=true", self.binder.resolve_create_address(desired));
                let response = self.send(HttpMethod::Post, &path, Some(&body)).await?;
                debug!("Create response: {}", response);
                self.binder.bind_identity_after_create(desired, &response)?
            }
            Payload::LogPatternSet(_) => {
                // No create endpoint: the first update doubles as the create.
                let identity = self.binder.bind_identity_after_create(desired, &Value::Null)?;
                self.update(&identity, desired, None).await?;
                identity
            }
        };

        info!("Created {} {} successfully", self.kind, identity);
        Ok(identity)
    }

    /// Fetch the object. A 404 is reported as [`ReadOutcome::Absent`].
    pub async fn read(&self, identity: &Identity) -> Result<ReadOutcome> {
        let path = self.binder.resolve_address(identity);

        let response = match self.send(HttpMethod::Get, &path, None).await {
            Ok(response) => response,
            Err(e) if e.classify() == Classification::NotFound => {
                warn!(
                    "{} {} not found - removing from state",
                    self.kind, identity
                );
                return Ok(ReadOutcome::Absent);
            }
            Err(e) => return Err(e),
        };

        let document = match self.kind {
            ResourceKind::IndexPattern => match response.get("index_pattern") {
                Some(inner) if inner.is_object() => inner.clone(),
                _ => return Err(Error::decode("index pattern response has no index_pattern object")),
            },
            ResourceKind::FreeformObject => {
                if !response.is_object() {
                    return Err(Error::decode("saved object response is not a JSON object"));
                }
                response
            }
            ResourceKind::LogPatternSet => {
                let alias = response
                    .pointer("/data/configuration/logAlias")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::decode("log source response has no data.configuration.logAlias")
                    })?;
                json!({ "logAlias": alias })
            }
        };

        info!("Read {} {} successfully", self.kind, identity);
        Ok(ReadOutcome::Present(RemoteState::new(self.kind, document)))
    }

    /// Converge the object towards `desired`.
    ///
    /// `last_known` is the most recent read. When it already matches the
    /// desired state nothing is sent. `None` always writes.
    ///
    /// The object is always addressed through `identity`; a different space
    /// or name in `desired` is ignored here (those fields force a new object
    /// one level up).
    pub async fn update(
        &self,
        identity: &Identity,
        desired: &DesiredState,
        last_known: Option<&RemoteState>,
    ) -> Result<UpdateOutcome> {
        let payload = self.validate(desired)?;
        let path = self.binder.resolve_address(identity);

        if identity.space != desired.space {
            debug!(
                "Desired space '{}' differs from bound space '{}'; keeping identity",
                desired.space, identity.space
            );
        }

        let (method, body) = match payload {
            Payload::IndexPattern { title, .. } => {
                if last_known.and_then(RemoteState::title) == Some(title.as_str()) {
                    return Ok(self.unchanged(identity));
                }
                (HttpMethod::Post, json!({ "index_pattern": { "title": title } }))
            }
            Payload::FreeformObject(body) => {
                let comparator = NormalizingComparator::for_kind(self.kind).unwrap_or_default();
                if last_known.is_some_and(|remote| comparator.equal_values(&remote.document, &body)) {
                    return Ok(self.unchanged(identity));
                }
                (HttpMethod::Put, body)
            }
            Payload::LogPatternSet(patterns) => {
                if last_known.and_then(RemoteState::patterns).as_ref() == Some(&patterns) {
                    return Ok(self.unchanged(identity));
                }
                let body = json!({
                    "data": {
                        "logAlias": join_patterns(&patterns),
                        "fields": {},
                    }
                });
                (HttpMethod::Patch, body)
            }
        };

        let response = self.send(method, &path, Some(&body)).await?;
        debug!("Update response: {}", response);

        info!("Updated {} {} successfully", self.kind, identity);
        Ok(UpdateOutcome::Applied)
    }

    /// Delete the object. A 404 counts as success.
    pub async fn delete(&self, identity: &Identity) -> Result<DeleteOutcome> {
        if self.kind == ResourceKind::LogPatternSet {
            info!(
                "{} {} is deleted automatically with its space; releasing it",
                self.kind, identity
            );
            return Ok(DeleteOutcome::Released);
        }

        let path = self.binder.resolve_address(identity);
        match self.send(HttpMethod::Delete, &path, None).await {
            Ok(_) => {
                info!("Deleted {} {} successfully", self.kind, identity);
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) if e.classify() == Classification::NotFound => {
                warn!(
                    "{} {} not found - removing from state",
                    self.kind, identity
                );
                Ok(DeleteOutcome::AlreadyAbsent)
            }
            Err(e) => Err(e),
        }
    }

    fn validate(&self, desired: &DesiredState) -> Result<Payload> {
        if desired.kind != self.kind {
            return Err(Error::validation(format!(
                "{} reconciler cannot handle a {} desired state",
                self.kind, desired.kind
            )));
        }
        desired.payload()
    }

    fn unchanged(&self, identity: &Identity) -> UpdateOutcome {
        debug!("{} {} already up to date, skipping write", self.kind, identity);
        UpdateOutcome::Unchanged
    }

    async fn send(&self, method: HttpMethod, path: &str, body: Option<&Value>) -> Result<Value> {
        debug!("{} {} via {}", method, path, self.client.client_name());
        self.client.request(method, path, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays canned responses and records every request
    struct ScriptedClient {
        responses: Mutex<Vec<Result<Value>>>,
        requests: Mutex<Vec<(HttpMethod, String, Option<Value>)>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<Value>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().rev().collect()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<(HttpMethod, String, Option<Value>)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteClient for ScriptedClient {
        async fn request(
            &self,
            method: HttpMethod,
            path: &str,
            body: Option<&Value>,
        ) -> Result<Value> {
            self.requests
                .lock()
                .unwrap()
                .push((method, path.to_string(), body.cloned()));
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(Error::transport("no scripted response")))
        }

        fn client_name(&self) -> &'static str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_index_pattern_create_sends_envelope() {
        let client = ScriptedClient::new(vec![Ok(json!({
            "index_pattern": {"id": "abc123", "title": "logs-*", "timeFieldName": "@timestamp"}
        }))]);
        let reconciler = ResourceReconciler::new(ResourceKind::IndexPattern, client.clone());

        let desired = DesiredState::new(
            ResourceKind::IndexPattern,
            "default",
            "logs-*",
            r#"{"timeFieldName":"@timestamp"}"#,
        );
        let identity = reconciler.create(&desired).await.unwrap();

        assert_eq!(identity, Identity::new("default", "abc123"));
        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, HttpMethod::Post);
        assert_eq!(requests[0].1, "/s/default/api/index_patterns/index_pattern");
        assert_eq!(
            requests[0].2,
            Some(json!({"index_pattern": {"title": "logs-*", "timeFieldName": "@timestamp"}}))
        );
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_request() {
        let client = ScriptedClient::new(vec![]);
        let reconciler = ResourceReconciler::new(ResourceKind::FreeformObject, client.clone());

        let desired = DesiredState::new(ResourceKind::FreeformObject, "default", "obj", "{oops");
        let err = reconciler.create(&desired).await.unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_validation_error() {
        let client = ScriptedClient::new(vec![]);
        let reconciler = ResourceReconciler::new(ResourceKind::IndexPattern, client.clone());

        let desired = DesiredState::new(ResourceKind::LogPatternSet, "default", "", "[]");
        assert!(matches!(
            reconciler.create(&desired).await,
            Err(Error::Validation(_))
        ));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_create_failure_propagates_unchanged() {
        let client = ScriptedClient::new(vec![Err(Error::api(500, "internal"))]);
        let reconciler = ResourceReconciler::new(ResourceKind::IndexPattern, client);

        let desired = DesiredState::new(ResourceKind::IndexPattern, "default", "logs-*", "{}");
        let err = reconciler.create(&desired).await.unwrap_err();
        assert_eq!(err.status_code(), Some(500));
    }

    #[tokio::test]
    async fn test_freeform_create_uses_overwrite() {
        let client = ScriptedClient::new(vec![Ok(json!({"id": "obj", "type": "index-pattern"}))]);
        let reconciler = ResourceReconciler::new(ResourceKind::FreeformObject, client.clone());

        let desired = DesiredState::new(
            ResourceKind::FreeformObject,
            "default",
            "obj",
            r#"{"attributes":{"title":"x"}}"#,
        );
        let identity = reconciler.create(&desired).await.unwrap();

        assert_eq!(identity, Identity::new("default", "obj"));
        assert_eq!(
            client.requests()[0].1,
            "/s/default/api/saved_objects/index-pattern/obj?overwrite=true"
        );
    }

    #[tokio::test]
    async fn test_index_pattern_update_sends_only_title() {
        let client = ScriptedClient::new(vec![Ok(json!({"index_pattern": {"id": "abc"}}))]);
        let reconciler = ResourceReconciler::new(ResourceKind::IndexPattern, client.clone());

        let identity = Identity::new("default", "abc");
        let last_known = RemoteState::new(
            ResourceKind::IndexPattern,
            json!({"id": "abc", "title": "old-*", "timeFieldName": "@timestamp"}),
        );
        let desired = DesiredState::new(
            ResourceKind::IndexPattern,
            "default",
            "new-*",
            r#"{"timeFieldName":"other"}"#,
        );

        let outcome = reconciler
            .update(&identity, &desired, Some(&last_known))
            .await
            .unwrap();

        assert_eq!(outcome, UpdateOutcome::Applied);
        let requests = client.requests();
        assert_eq!(requests[0].0, HttpMethod::Post);
        assert_eq!(requests[0].1, "/s/default/api/index_patterns/index_pattern/abc");
        assert_eq!(requests[0].2, Some(json!({"index_pattern": {"title": "new-*"}})));
    }

    #[tokio::test]
    async fn test_update_keeps_bound_identity_when_desired_moves() {
        let client = ScriptedClient::new(vec![Ok(json!({}))]);
        let reconciler = ResourceReconciler::new(ResourceKind::FreeformObject, client.clone());

        let identity = Identity::new("default", "obj");
        let desired = DesiredState::new(
            ResourceKind::FreeformObject,
            "elsewhere",
            "renamed",
            r#"{"attributes":{"title":"x"}}"#,
        );
        reconciler.update(&identity, &desired, None).await.unwrap();

        assert_eq!(
            client.requests()[0].1,
            "/s/default/api/saved_objects/index-pattern/obj"
        );
    }

    #[tokio::test]
    async fn test_delete_classifies_404_as_absent() {
        let client = ScriptedClient::new(vec![Err(Error::api(404, "Not Found"))]);
        let reconciler = ResourceReconciler::new(ResourceKind::IndexPattern, client);

        let outcome = reconciler
            .delete(&Identity::new("default", "gone"))
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::AlreadyAbsent);
    }

    #[tokio::test]
    async fn test_delete_other_failures_are_fatal() {
        let client = ScriptedClient::new(vec![Err(Error::api(403, "Forbidden"))]);
        let reconciler = ResourceReconciler::new(ResourceKind::FreeformObject, client);

        let err = reconciler
            .delete(&Identity::new("default", "obj"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(403));
    }

    #[tokio::test]
    async fn test_log_pattern_delete_is_local() {
        let client = ScriptedClient::new(vec![]);
        let reconciler = ResourceReconciler::new(ResourceKind::LogPatternSet, client.clone());

        let outcome = reconciler
            .delete(&Identity::new("default", "kbsync-token"))
            .await
            .unwrap();

        assert_eq!(outcome, DeleteOutcome::Released);
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_read_decode_failure_is_fatal() {
        let client = ScriptedClient::new(vec![Ok(json!({"unexpected": true}))]);
        let reconciler = ResourceReconciler::new(ResourceKind::LogPatternSet, client);

        let err = reconciler
            .read(&Identity::new("default", "t"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(err.classify(), Classification::Fatal);
    }
}
