//! Core traits for kbsync
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`RemoteClient`]: Send one request to the remote store
//! - [`StateStore`]: Remember bound identities between runs

pub mod remote_client;
pub mod state_store;

pub use remote_client::{HttpMethod, RemoteClient};
pub use state_store::{StateStore, TrackedResource};
