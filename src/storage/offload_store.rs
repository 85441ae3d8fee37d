//! # Disk-Offload Attribute Store
//!
//! A record-like object whose field writes are persisted immediately to a
//! per-instance directory and cleared from memory. Reads go back to disk every
//! time; nothing read is cached back into the instance.
//!
//! Per field the state machine is `Absent -> OnDisk` when offloading is enabled
//! and `Absent -> InMemory` when it is disabled. There is no resting
//! in-memory state for an offloaded field.
//!
//! The bookkeeping fields (`offload_enabled`, `storage_path`, `offloaded`) are
//! never offloaded and are always answered from memory.
//!
//! ```rust,no_run
//! use turntable::storage::OffloadStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = OffloadStore::new("./tmp", "TrackRecord");
//! store.set("waveform", &vec![0.1_f32; 44_100])?;
//!
//! let waveform: Vec<f32> = store.get("waveform")?;
//! assert_eq!(waveform.len(), 44_100);
//!
//! store.clean_disk()?;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::constants::bookkeeping;
use crate::constants::paths::DEFAULT_STORE_ROOT;
use crate::logging::log_storage_operation;
use crate::storage::codec::{pickle_path, validate_file_stem, Codec, CodecError, InvalidFileName};

#[derive(Debug, Error)]
pub enum StorageAccessError {
    #[error("Attribute '{name}' has never been set")]
    Missing { name: String },

    #[error("Failed to read offloaded attribute '{name}' from '{path}': {source}")]
    Read {
        name: String,
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("Failed to write attribute '{name}' to '{path}': {source}")]
    Write {
        name: String,
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("In-memory attribute '{name}' could not be converted: {source}")]
    Memory {
        name: String,
        #[source]
        source: CodecError,
    },

    #[error("Attribute name rejected: {0}")]
    InvalidName(#[from] InvalidFileName),

    #[error("Bookkeeping field '{name}' rejected the value: {reason}")]
    Bookkeeping { name: String, reason: String },

    #[error("Failed to remove '{path}' from the store: {source}")]
    Clean {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where a field's value currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Absent,
    InMemory,
    OnDisk,
}

#[derive(Debug, Clone)]
enum Slot {
    /// Encoded value kept in memory (offloading disabled)
    InMemory(Vec<u8>),
    /// Disk-reference marker; the value lives in `<storage_path>/<name>.pkl`
    OnDisk,
}

#[derive(Debug)]
pub struct OffloadStore {
    offload_enabled: bool,
    storage_path: PathBuf,
    offloaded: BTreeSet<String>,
    slots: HashMap<String, Slot>,
    codec: Codec,
}

impl OffloadStore {
    /// Create an offloading store under `<root>/<type_name>/`.
    pub fn new<P: AsRef<Path>>(root: P, type_name: &str) -> Self {
        Self::with_options(root, type_name, true, Codec::default())
    }

    /// Create a store that keeps every value in memory
    pub fn in_memory(type_name: &str) -> Self {
        Self::with_options(DEFAULT_STORE_ROOT, type_name, false, Codec::default())
    }

    pub fn from_config(config: &StoreConfig, codec: Codec, type_name: &str) -> Self {
        Self::with_options(&config.root, type_name, config.offload_enabled, codec)
    }

    /// Create a store for `T`, named after the last segment of its type path.
    pub fn for_type<T: ?Sized, P: AsRef<Path>>(root: P) -> Self {
        let full_name = std::any::type_name::<T>();
        let short_name = full_name
            .split('<')
            .next()
            .and_then(|path| path.rsplit("::").next())
            .unwrap_or(full_name);
        Self::new(root, short_name)
    }

    pub fn with_options<P: AsRef<Path>>(
        root: P,
        type_name: &str,
        offload_enabled: bool,
        codec: Codec,
    ) -> Self {
        let storage_path = root.as_ref().join(type_name);
        debug!(
            storage_path = %storage_path.display(),
            offload_enabled,
            "Offload store created"
        );

        Self {
            offload_enabled,
            storage_path,
            offloaded: BTreeSet::new(),
            slots: HashMap::new(),
            codec,
        }
    }

    pub fn is_offload_enabled(&self) -> bool {
        self.offload_enabled
    }

    /// Toggle offloading for subsequent writes. Fields already on disk stay there.
    pub fn set_offload_enabled(&mut self, enabled: bool) {
        self.offload_enabled = enabled;
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    /// Names of every field that has been written to disk
    pub fn offloaded_names(&self) -> impl Iterator<Item = &str> {
        self.offloaded.iter().map(String::as_str)
    }

    pub fn slot_state(&self, name: &str) -> SlotState {
        match self.slots.get(name) {
            None => SlotState::Absent,
            Some(Slot::InMemory(_)) => SlotState::InMemory,
            Some(Slot::OnDisk) => SlotState::OnDisk,
        }
    }

    /// Store `value` under `name`.
    ///
    /// With offloading enabled the value is written to disk (overwriting any
    /// previous copy) and only a disk-reference marker stays in memory.
    pub fn set<V: Serialize + ?Sized>(
        &mut self,
        name: &str,
        value: &V,
    ) -> Result<(), StorageAccessError> {
        if bookkeeping::is_bookkeeping(name) {
            return self.set_bookkeeping(name, value);
        }

        validate_file_stem(name)?;

        if !self.offload_enabled {
            let bytes = self
                .codec
                .encode(value)
                .map_err(|source| StorageAccessError::Memory {
                    name: name.to_string(),
                    source,
                })?;
            self.slots.insert(name.to_string(), Slot::InMemory(bytes));
            self.forget_disk_copy(name)?;
            return Ok(());
        }

        let path = pickle_path(&self.storage_path, name);
        self.codec
            .write_file(&path, value)
            .map_err(|source| StorageAccessError::Write {
                name: name.to_string(),
                path: path.clone(),
                source,
            })?;

        self.slots.insert(name.to_string(), Slot::OnDisk);
        self.offloaded.insert(name.to_string());
        debug!(name, path = %path.display(), "Attribute offloaded to disk");
        Ok(())
    }

    /// Read the value stored under `name`, reloading it from disk if offloaded.
    pub fn get<V: DeserializeOwned>(&self, name: &str) -> Result<V, StorageAccessError> {
        if bookkeeping::is_bookkeeping(name) {
            return self.get_bookkeeping(name);
        }

        validate_file_stem(name)?;

        match self.slots.get(name) {
            None => Err(StorageAccessError::Missing {
                name: name.to_string(),
            }),
            Some(Slot::InMemory(bytes)) => {
                self.codec
                    .decode(bytes)
                    .map_err(|source| StorageAccessError::Memory {
                        name: name.to_string(),
                        source,
                    })
            }
            Some(Slot::OnDisk) => {
                let path = pickle_path(&self.storage_path, name);
                self.codec
                    .read_file(&path)
                    .map_err(|source| StorageAccessError::Read {
                        name: name.to_string(),
                        path,
                        source,
                    })
            }
        }
    }

    /// Drop the disk copy of `name` once its current value lives in memory,
    /// so no later reset can resurrect the older offloaded value.
    fn forget_disk_copy(&mut self, name: &str) -> Result<(), StorageAccessError> {
        if !self.offloaded.remove(name) {
            return Ok(());
        }

        let path = pickle_path(&self.storage_path, name);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(StorageAccessError::Clean { path, source }),
        }
        log_storage_operation("forget", &path.display().to_string(), 1, "removed");
        Ok(())
    }

    /// Reset every offloaded field's in-memory slot to the disk marker.
    ///
    /// Only names whose latest value was written to disk are tracked as
    /// offloaded, so the reset never replaces a newer in-memory value.
    /// Calling it repeatedly is a no-op.
    pub fn clean_memory(&mut self) {
        for name in &self.offloaded {
            self.slots.insert(name.clone(), Slot::OnDisk);
        }
    }

    /// Recursively remove the store directory.
    ///
    /// Every previously offloaded field becomes unreadable afterwards.
    pub fn clean_disk(&mut self) -> Result<(), StorageAccessError> {
        match fs::remove_dir_all(&self.storage_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(StorageAccessError::Clean {
                    path: self.storage_path.clone(),
                    source,
                })
            }
        }

        log_storage_operation(
            "clean_disk",
            &self.storage_path.display().to_string(),
            self.offloaded.len(),
            "removed",
        );
        info!(
            storage_path = %self.storage_path.display(),
            fields = self.offloaded.len(),
            "Offload store directory removed"
        );
        Ok(())
    }

    fn set_bookkeeping<V: Serialize + ?Sized>(
        &mut self,
        name: &str,
        value: &V,
    ) -> Result<(), StorageAccessError> {
        let rejected = |reason: String| StorageAccessError::Bookkeeping {
            name: name.to_string(),
            reason,
        };
        let json = serde_json::to_value(value).map_err(|e| rejected(e.to_string()))?;

        match name {
            bookkeeping::OFFLOAD_ENABLED => {
                self.offload_enabled =
                    serde_json::from_value(json).map_err(|e| rejected(e.to_string()))?;
            }
            bookkeeping::STORAGE_PATH => {
                self.storage_path =
                    serde_json::from_value(json).map_err(|e| rejected(e.to_string()))?;
            }
            _ => {
                return Err(rejected(
                    "the offloaded set is maintained by the store".to_string(),
                ))
            }
        }
        Ok(())
    }

    fn get_bookkeeping<V: DeserializeOwned>(&self, name: &str) -> Result<V, StorageAccessError> {
        let json = match name {
            bookkeeping::OFFLOAD_ENABLED => serde_json::json!(self.offload_enabled),
            bookkeeping::STORAGE_PATH => serde_json::json!(self.storage_path),
            _ => serde_json::json!(self.offloaded),
        };

        serde_json::from_value(json).map_err(|e| StorageAccessError::Bookkeeping {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }
}
