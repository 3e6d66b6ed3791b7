// # kbsync-core
//
// Reconciliation core for declaratively managed Kibana objects.
//
// ## Architecture Overview
//
// - **RemoteClient**: Trait for sending one request to the remote store
// - **NormalizingComparator**: Equality that ignores server-owned fields
// - **IdentityBinder**: Request paths, and where each kind's key comes from
// - **ResourceReconciler**: Create/Read/Update/Delete state machine, one per kind
// - **StateStore**: Trait for remembering bound identities between runs
// - **Applier**: Walks a manifest and drives the reconcilers
//
// ## Design Principles
//
// 1. **Single-shot**: every reconciler operation is at most one remote call
// 2. **No retries**: resilience belongs to whoever invokes the reconciler
// 3. **404 is a state**: a missing object is `Absent`, not a failure
// 4. **Library-First**: the binary only wires configuration to this crate

pub mod apply;
pub mod compare;
pub mod config;
pub mod error;
pub mod identity;
pub mod model;
pub mod reconciler;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use apply::{ApplyAction, ApplyReport, Applier};
pub use compare::{NormalizingComparator, is_valid_json};
pub use config::{KbsyncConfig, KibanaConfig, ResourceConfig, StateStoreConfig};
pub use error::{Classification, Error, Result};
pub use identity::{IdentityBinder, IdentityStrategy};
pub use model::{DesiredState, Identity, RemoteState, ResourceKind, ResourceState};
pub use reconciler::{DeleteOutcome, ReadOutcome, ResourceReconciler, UpdateOutcome};
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{HttpMethod, RemoteClient, StateStore, TrackedResource};
