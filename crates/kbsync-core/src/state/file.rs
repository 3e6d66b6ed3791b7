// # File State Store
//
// File-based implementation of StateStore with crash recovery.
//
// ## Purpose
//
// Keeps bound identities across runs. Losing this file means losing the only
// handle to server-assigned objects, so writes are atomic and a backup of the
// previous state is kept.
//
// ## Crash Recovery
//
// - Atomic writes: write to `.tmp`, then rename
// - Backup: the previous file is copied to `.backup` before each rename
// - Recovery: if the main file does not parse, the backup is loaded
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "resources": {
//     "logs": {
//       "kind": "index_pattern",
//       "identity": { "space": "default", "key": "abc123" },
//       "last_known": { "id": "abc123", "title": "logs-*" },
//       "last_synced": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::state_store::{StateStore, TrackedResource};

/// State file format version
const STATE_FILE_VERSION: &str = "1.0";

/// File-based state store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use kbsync_core::state::FileStateStore;
/// use kbsync_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("/var/lib/kbsync/state.json").await?;
///     for address in store.list().await? {
///         println!("tracking {}", address);
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    state: Arc<RwLock<FileState>>,
}

#[derive(Debug)]
struct FileState {
    resources: BTreeMap<String, TrackedResource>,
    dirty: bool,
}

/// Serializable state file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    resources: BTreeMap<String, TrackedResource>,
}

/// Why loading a state file failed
enum LoadError {
    /// The file exists but does not parse
    Corrupted(String),
    /// The file could not be read at all
    Unreadable(Error),
}

impl FileStateStore {
    /// Create or load a file state store
    ///
    /// 1. Create parent directories if needed
    /// 2. Load the existing state file, if any
    /// 3. If it is corrupted, load the backup instead
    /// 4. If the backup is missing or corrupted too, fail: starting empty
    ///    would orphan every server-assigned object
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create state directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let resources = Self::load_state_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(FileState {
                resources,
                dirty: false,
            })),
        })
    }

    async fn load_state_with_recovery(
        path: &Path,
    ) -> Result<BTreeMap<String, TrackedResource>, Error> {
        match Self::load_state(path).await {
            Ok(resources) => {
                tracing::debug!("Loaded state from file: {} resources", resources.len());
                Ok(resources)
            }
            Err(LoadError::Unreadable(e)) => Err(e),
            Err(LoadError::Corrupted(reason)) => {
                tracing::warn!(
                    "State file appears corrupted: {}. Attempting recovery from backup.",
                    reason
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    return Err(Error::state_store(format!(
                        "State file {} is corrupted and no backup exists: {}",
                        path.display(),
                        reason
                    )));
                }

                match Self::load_state(&backup_path).await {
                    Ok(resources) => {
                        tracing::info!("Recovered state from backup: {} resources", resources.len());
                        if let Err(e) = fs::copy(&backup_path, path).await {
                            tracing::error!("Failed to restore state file from backup: {}", e);
                        }
                        Ok(resources)
                    }
                    Err(LoadError::Corrupted(backup_reason)) => Err(Error::state_store(format!(
                        "State file and backup are both corrupted: {}; {}",
                        reason, backup_reason
                    ))),
                    Err(LoadError::Unreadable(e)) => Err(e),
                }
            }
        }
    }

    async fn load_state(path: &Path) -> Result<BTreeMap<String, TrackedResource>, LoadError> {
        if !path.exists() {
            tracing::debug!("State file does not exist: {}", path.display());
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            LoadError::Unreadable(Error::state_store(format!(
                "Failed to read state file {}: {}",
                path.display(),
                e
            )))
        })?;

        let state_file: StateFileFormat = serde_json::from_str(&content)
            .map_err(|e| LoadError::Corrupted(format!("{}: {}", path.display(), e)))?;

        if state_file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STATE_FILE_VERSION,
                state_file.version
            );
        }

        Ok(state_file.resources)
    }

    /// Write state to file atomically
    async fn write_state(&self) -> Result<(), Error> {
        let mut state_guard = self.state.write().await;

        let state_file = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            resources: state_guard.resources.clone(),
        };

        let json = serde_json::to_string_pretty(&state_file)
            .map_err(|e| Error::state_store(format!("Failed to serialize state: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await?;
            file.flush().await?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        state_guard.dirty = false;
        tracing::trace!("State written to file: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, address: &str) -> Result<Option<TrackedResource>, Error> {
        let state_guard = self.state.read().await;
        Ok(state_guard.resources.get(address).cloned())
    }

    async fn put(&self, address: &str, record: &TrackedResource) -> Result<(), Error> {
        {
            let mut state_guard = self.state.write().await;
            state_guard
                .resources
                .insert(address.to_string(), record.clone());
            state_guard.dirty = true;
        }

        // Immediate write for durability
        self.write_state().await
    }

    async fn remove(&self, address: &str) -> Result<(), Error> {
        {
            let mut state_guard = self.state.write().await;
            if state_guard.resources.remove(address).is_none() {
                return Ok(());
            }
            state_guard.dirty = true;
        }

        self.write_state().await
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        let state_guard = self.state.read().await;
        Ok(state_guard.resources.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        let dirty = self.state.read().await.dirty;
        if dirty {
            self.write_state().await
        } else {
            Ok(())
        }
    }
}
