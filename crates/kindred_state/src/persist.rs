//! # Persistence
//!
//! Last-known snapshot and vector, kept across restarts in an opaque
//! key-value store.
//!
//! Restored data is demoted to the indexer tier: the snapshot comes back as
//! an indexer snapshot, the vector only contributes its id as the last-known
//! id, and the authoritative slot stays empty until a fresh read validates.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use alloy_primitives::{Address, U256};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::entity::EntitySnapshot;
use crate::error::PersistError;
use crate::status::StatusVector;
use crate::store::LocalStateStore;

/// Blob format version.
const BLOB_VERSION: u32 = 1;

/// Opaque byte storage keyed by string.
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError>;

    /// Writes a value.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), PersistError>;

    /// Deletes a value. Missing keys are not an error.
    fn remove(&self, key: &str) -> Result<(), PersistError>;
}

/// In-process storage.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKv {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), PersistError> {
        self.entries.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// One file per key under a directory.
pub struct FileKv {
    dir: PathBuf,
}

impl FileKv {
    /// Opens (and creates if needed) the storage directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, PersistError> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(file)
    }
}

impl KeyValueStore for FileKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), PersistError> {
        let path = self.path_for(key);
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        match fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedState {
    version: u32,
    snapshot: Option<EntitySnapshot>,
    status: Option<StatusVector>,
    last_known_id: Option<U256>,
}

fn storage_key(owner: &Address) -> String {
    format!("kindred.state.{owner}")
}

impl LocalStateStore {
    /// Writes the current snapshot and vector for the connected wallet.
    ///
    /// Returns `false` when no wallet is connected.
    pub fn persist(&self, kv: &dyn KeyValueStore) -> Result<bool, PersistError> {
        let Some((owner, blob)) = self.read_inner(|inner| {
            inner.wallet.map(|owner| {
                (
                    owner,
                    PersistedState {
                        version: BLOB_VERSION,
                        snapshot: inner.snapshot.clone().filter(|s| !s.is_provisional()),
                        status: inner.status,
                        last_known_id: inner.last_known_id,
                    },
                )
            })
        }) else {
            return Ok(false);
        };

        kv.put(&storage_key(&owner), &serde_json::to_vec(&blob)?)?;
        tracing::debug!(%owner, "persisted state");
        Ok(true)
    }

    /// Restores persisted data for the connected wallet at indexer trust.
    ///
    /// Returns `false` when nothing usable was found.
    pub fn restore(&self, kv: &dyn KeyValueStore) -> Result<bool, PersistError> {
        let Some(owner) = self.wallet() else {
            return Ok(false);
        };
        let Some(bytes) = kv.get(&storage_key(&owner))? else {
            return Ok(false);
        };
        let blob: PersistedState = serde_json::from_slice(&bytes)?;
        if blob.version != BLOB_VERSION {
            tracing::warn!(version = blob.version, "discarding persisted state of unknown version");
            return Ok(false);
        }

        let restored = self.with_inner(|inner| {
            if inner.wallet != Some(owner) {
                return false;
            }
            let snapshot = blob.snapshot.filter(|s| s.owner == owner);
            let last_known = blob
                .status
                .filter(|s| s.owner == owner)
                .map(|s| s.entity_id)
                .or(blob.last_known_id)
                .filter(|id| !id.is_zero());

            if inner.snapshot.is_none() {
                inner.snapshot = snapshot;
            }
            if inner.last_known_id.is_none() {
                inner.last_known_id = last_known;
            }
            inner.snapshot.is_some() || inner.last_known_id.is_some()
        });

        if restored {
            tracing::info!(%owner, "restored persisted state, awaiting validation");
        }
        Ok(restored)
    }
}
