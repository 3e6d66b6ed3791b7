//! Apply driver
//!
//! The Applier walks a manifest once, in order, and converges each resource
//! through its [`ResourceReconciler`]. It is the only component that touches
//! the [`StateStore`].
//!
//! ## Flow per resource
//!
//! ```text
//! tracked? ──no──▶ create ─▶ read ─▶ track                      (Created)
//!    │
//!   yes ── space/key changed? ──yes──▶ delete ─▶ create ─▶ read (Recreated)
//!    │
//!    ▼
//!  read ──absent──▶ untrack ─▶ create ─▶ read ─▶ track          (Created)
//!    │
//! present ─▶ update ──unchanged──▶ track                         (Unchanged)
//!               │
//!            applied ─▶ read ─▶ track                            (Updated)
//! ```
//!
//! Tracked addresses that are no longer in the manifest are deleted.
//! Objects that already exist remotely can be adopted with
//! [`Applier::import`] before the first apply.
//!
//! A failure on one resource is recorded and the pass moves on; the failed
//! resource's tracked state is left untouched. Nothing is retried.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::ResourceConfig;
use crate::error::{Error, Result};
use crate::model::{DesiredState, Identity, ResourceKind};
use crate::reconciler::{DeleteOutcome, ReadOutcome, ResourceReconciler, UpdateOutcome};
use crate::traits::{RemoteClient, StateStore, TrackedResource};

/// What happened to one resource during a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyAction {
    /// Created (first time, or after out-of-band deletion)
    Created,
    /// A write was issued
    Updated,
    /// Already converged
    Unchanged,
    /// Deleted and created again because a force-new field changed
    Recreated,
    /// Deleted (pruned or destroyed)
    Deleted,
    /// An existing remote object was adopted
    Imported,
    /// The step failed; tracked state is unchanged
    Failed(String),
}

impl fmt::Display for ApplyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyAction::Created => f.write_str("created"),
            ApplyAction::Updated => f.write_str("updated"),
            ApplyAction::Unchanged => f.write_str("unchanged"),
            ApplyAction::Recreated => f.write_str("recreated"),
            ApplyAction::Deleted => f.write_str("deleted"),
            ApplyAction::Imported => f.write_str("imported"),
            ApplyAction::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Outcome of a full pass, in processing order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub entries: Vec<(String, ApplyAction)>,
}

impl ApplyReport {
    fn record(&mut self, address: &str, action: ApplyAction) {
        match &action {
            ApplyAction::Failed(reason) => error!("{}: {}", address, reason),
            other => info!("{}: {}", address, other),
        }
        self.entries.push((address.to_string(), action));
    }

    /// Action recorded for an address
    pub fn action(&self, address: &str) -> Option<&ApplyAction> {
        self.entries
            .iter()
            .find(|(a, _)| a == address)
            .map(|(_, action)| action)
    }

    /// Addresses whose step failed
    pub fn failures(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, action)| matches!(action, ApplyAction::Failed(_)))
            .map(|(address, _)| address.as_str())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failures().is_empty()
    }
}

/// Sequential manifest driver
pub struct Applier {
    client: Arc<dyn RemoteClient>,
    state_store: Box<dyn StateStore>,
}

impl Applier {
    pub fn new(client: Arc<dyn RemoteClient>, state_store: Box<dyn StateStore>) -> Self {
        Self {
            client,
            state_store,
        }
    }

    /// Reconciler for one kind, sharing this applier's client
    pub fn reconciler(&self, kind: ResourceKind) -> ResourceReconciler {
        ResourceReconciler::new(kind, Arc::clone(&self.client))
    }

    /// Tracking store
    pub fn state_store(&self) -> &dyn StateStore {
        self.state_store.as_ref()
    }

    /// Converge every resource in `resources`, then delete tracked resources
    /// that are no longer listed.
    ///
    /// Per-resource failures end up in the report; only state store flush
    /// failures abort the pass.
    pub async fn apply(&self, resources: &[ResourceConfig]) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();

        for resource in resources {
            match self.apply_one(resource).await {
                Ok(action) => report.record(&resource.address, action),
                Err(e) => report.record(&resource.address, ApplyAction::Failed(e.to_string())),
            }
        }

        let wanted: HashSet<&str> = resources.iter().map(|r| r.address.as_str()).collect();
        for address in self.state_store.list().await? {
            if wanted.contains(address.as_str()) {
                continue;
            }
            debug!("{} is no longer in the manifest, pruning", address);
            report.record(&address, self.destroy_address(&address).await);
        }

        self.state_store.flush().await?;
        Ok(report)
    }

    /// Delete every tracked resource and stop tracking it
    pub async fn destroy(&self) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();

        for address in self.state_store.list().await? {
            report.record(&address, self.destroy_address(&address).await);
        }

        self.state_store.flush().await?;
        Ok(report)
    }

    /// Start tracking an object that already exists remotely.
    ///
    /// The object is read once through `identity`; it must be present. The
    /// next [`apply`](Self::apply) then converges it like any other tracked
    /// resource instead of creating a duplicate.
    pub async fn import(
        &self,
        address: &str,
        kind: ResourceKind,
        identity: Identity,
    ) -> Result<ApplyAction> {
        if let Some(tracked) = self.state_store.get(address).await? {
            return Err(Error::validation(format!(
                "{} already tracks {} {}",
                address, tracked.kind, tracked.identity
            )));
        }

        let remote = match self.reconciler(kind).read(&identity).await? {
            ReadOutcome::Present(remote) => remote,
            ReadOutcome::Absent => {
                return Err(Error::Other(format!(
                    "cannot import {} {}: it does not exist",
                    kind, identity
                )));
            }
        };

        let record = TrackedResource::new(kind, identity).with_remote(&remote);
        self.state_store.put(address, &record).await?;
        self.state_store.flush().await?;

        info!("{}: imported {} {}", address, kind, record.identity);
        Ok(ApplyAction::Imported)
    }

    async fn apply_one(&self, resource: &ResourceConfig) -> Result<ApplyAction> {
        let desired = resource.to_desired();
        let reconciler = self.reconciler(resource.kind);

        let Some(tracked) = self.state_store.get(&resource.address).await? else {
            self.create_and_track(&reconciler, &resource.address, &desired)
                .await?;
            return Ok(ApplyAction::Created);
        };

        if requires_replacement(&tracked, &desired) {
            info!(
                "{}: {} {} must be replaced",
                resource.address, tracked.kind, tracked.identity
            );
            // Validate before destroying anything
            desired.payload()?;
            self.destroy_tracked(&resource.address, &tracked).await?;
            self.create_and_track(&reconciler, &resource.address, &desired)
                .await?;
            return Ok(ApplyAction::Recreated);
        }

        let remote = match reconciler.read(&tracked.identity).await? {
            ReadOutcome::Present(remote) => remote,
            ReadOutcome::Absent => {
                warn!(
                    "{}: {} disappeared outside kbsync, creating it again",
                    resource.address, tracked.identity
                );
                self.state_store.remove(&resource.address).await?;
                self.create_and_track(&reconciler, &resource.address, &desired)
                    .await?;
                return Ok(ApplyAction::Created);
            }
        };

        match reconciler
            .update(&tracked.identity, &desired, Some(&remote))
            .await?
        {
            UpdateOutcome::Unchanged => {
                self.state_store
                    .put(&resource.address, &tracked.with_remote(&remote))
                    .await?;
                Ok(ApplyAction::Unchanged)
            }
            UpdateOutcome::Applied => {
                match reconciler.read(&tracked.identity).await? {
                    ReadOutcome::Present(fresh) => {
                        self.state_store
                            .put(&resource.address, &tracked.with_remote(&fresh))
                            .await?;
                    }
                    ReadOutcome::Absent => {
                        self.state_store.remove(&resource.address).await?;
                        return Err(Error::Other(format!(
                            "{} disappeared right after being updated",
                            tracked.identity
                        )));
                    }
                }
                Ok(ApplyAction::Updated)
            }
        }
    }

    async fn create_and_track(
        &self,
        reconciler: &ResourceReconciler,
        address: &str,
        desired: &DesiredState,
    ) -> Result<()> {
        let identity = reconciler.create(desired).await?;

        // Track the identity before reading so a failed read cannot orphan it
        let record = TrackedResource::new(reconciler.kind(), identity.clone());
        self.state_store.put(address, &record).await?;

        match reconciler.read(&identity).await? {
            ReadOutcome::Present(remote) => {
                self.state_store
                    .put(address, &record.with_remote(&remote))
                    .await?;
            }
            ReadOutcome::Absent => {
                warn!("{}: {} not readable right after create", address, identity);
            }
        }
        Ok(())
    }

    async fn destroy_address(&self, address: &str) -> ApplyAction {
        let tracked = match self.state_store.get(address).await {
            Ok(Some(tracked)) => tracked,
            Ok(None) => return ApplyAction::Deleted,
            Err(e) => return ApplyAction::Failed(e.to_string()),
        };

        match self.destroy_tracked(address, &tracked).await {
            Ok(_) => ApplyAction::Deleted,
            Err(e) => ApplyAction::Failed(e.to_string()),
        }
    }

    async fn destroy_tracked(
        &self,
        address: &str,
        tracked: &TrackedResource,
    ) -> Result<DeleteOutcome> {
        let outcome = self
            .reconciler(tracked.kind)
            .delete(&tracked.identity)
            .await?;
        self.state_store.remove(address).await?;
        Ok(outcome)
    }
}

/// Whether a force-new field differs between what is tracked and what is
/// desired. Space is force-new everywhere; the name is force-new only where
/// it is the key.
fn requires_replacement(tracked: &TrackedResource, desired: &DesiredState) -> bool {
    if tracked.kind != desired.kind || tracked.identity.space != desired.space {
        return true;
    }
    desired.kind == ResourceKind::FreeformObject && tracked.identity.key != desired.name
}
