//! Shared-State Distributor
//!
//! Large read-only arguments are encoded once into a per-run scratch
//! directory instead of travelling with every task. Workers receive only a
//! [`SharedStateManifest`] and decode a private copy before calling the user
//! function.
//!
//! ```text
//! <scratch root>/run-<uuid>/<name>.pkl
//! ```
//!
//! The run directory is removed once the pool has joined, whatever the task
//! outcomes were. Removal is best effort.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::constants::paths::{DEFAULT_SCRATCH_ROOT, SCRATCH_RUN_PREFIX};
use crate::constants::DEFAULT_MAX_PROCESSES;
use crate::error::TurntableError;
use crate::execution::partition::resolve_processes;
use crate::execution::task::{run_isolated, FailureKind, TaskFailure, TaskResult};
use crate::execution::worker_pool::{map_on_pool, WorkerPool};
use crate::logging::{log_storage_operation, log_task_failure};
use crate::storage::codec::{
    pickle_path, read_bytes, validate_file_stem, write_bytes, Codec, CodecError, InvalidFileName,
};

#[derive(Debug, Error)]
pub enum ScratchError {
    #[error("Invalid shared state name: {0}")]
    InvalidName(#[from] InvalidFileName),

    #[error("Shared state '{name}' was already added to this bundle")]
    DuplicateName { name: String },

    #[error("Failed to encode shared state '{name}': {source}")]
    Encode {
        name: String,
        #[source]
        source: CodecError,
    },

    #[error("Failed to create scratch directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write shared state '{name}': {source}")]
    Write {
        name: String,
        #[source]
        source: CodecError,
    },

    #[error("Failed to load shared state '{name}': {source}")]
    Load {
        name: String,
        #[source]
        source: CodecError,
    },

    #[error("Shared state '{name}' is not part of this run")]
    UnknownName { name: String },
}

/// Named objects to distribute to every worker of one dispatch call
#[derive(Debug, Clone, Default)]
pub struct SharedStateBundle {
    codec: Codec,
    entries: BTreeMap<String, Vec<u8>>,
}

impl SharedStateBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codec(codec: Codec) -> Self {
        Self {
            codec,
            entries: BTreeMap::new(),
        }
    }

    /// Encode `value` under `name`. Names must be unique and usable as a file stem.
    pub fn insert<V: Serialize + ?Sized>(
        &mut self,
        name: &str,
        value: &V,
    ) -> Result<(), ScratchError> {
        validate_file_stem(name)?;
        if self.entries.contains_key(name) {
            return Err(ScratchError::DuplicateName {
                name: name.to_string(),
            });
        }

        let bytes = self.codec.encode(value).map_err(|source| ScratchError::Encode {
            name: name.to_string(),
            source,
        })?;
        self.entries.insert(name.to_string(), bytes);
        Ok(())
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with<V: Serialize + ?Sized>(mut self, name: &str, value: &V) -> Result<Self, ScratchError> {
        self.insert(name, value)?;
        Ok(self)
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total encoded size in bytes
    pub fn encoded_size(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

/// One run's scratch directory. Removed on [`cleanup`](Self::cleanup) or drop.
#[derive(Debug)]
pub struct ScratchSpace {
    run_dir: PathBuf,
    /// Root created by this run, removed with it when left empty
    created_root: Option<PathBuf>,
    removed: bool,
}

impl ScratchSpace {
    /// Create a fresh `run-<uuid>` directory under `root`.
    pub fn create(root: &Path) -> Result<Self, ScratchError> {
        let created_root = (!root.exists()).then(|| root.to_path_buf());
        let run_dir = root.join(format!("{SCRATCH_RUN_PREFIX}{}", Uuid::new_v4()));
        fs::create_dir_all(&run_dir).map_err(|source| ScratchError::CreateDir {
            path: run_dir.clone(),
            source,
        })?;
        debug!(path = %run_dir.display(), "Scratch directory created");

        Ok(Self {
            run_dir,
            created_root,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.run_dir
    }

    /// Write every bundle entry to `<run dir>/<name>.pkl` and describe the result.
    pub fn write_bundle(&self, bundle: &SharedStateBundle) -> Result<SharedStateManifest, ScratchError> {
        for (name, bytes) in &bundle.entries {
            write_bytes(&pickle_path(&self.run_dir, name), bytes).map_err(|source| {
                ScratchError::Write {
                    name: name.clone(),
                    source,
                }
            })?;
        }

        log_storage_operation(
            "write_bundle",
            &self.run_dir.display().to_string(),
            bundle.len(),
            "ok",
        );

        Ok(SharedStateManifest {
            dir: self.run_dir.clone(),
            codec: bundle.codec,
            names: bundle.entries.keys().cloned().collect(),
        })
    }

    /// Remove the run directory, and the scratch root if this run created it
    /// and no other run is using it. Failures are logged, never returned.
    pub fn cleanup(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;

        match fs::remove_dir_all(&self.run_dir) {
            Ok(()) => log_storage_operation(
                "remove_scratch",
                &self.run_dir.display().to_string(),
                0,
                "ok",
            ),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => warn!(
                path = %self.run_dir.display(),
                error = %error,
                "Failed to remove scratch directory"
            ),
        }

        // remove_dir only succeeds on an empty directory, so a root still
        // holding another run's directory stays in place.
        if let Some(root) = &self.created_root {
            match fs::remove_dir(root) {
                Ok(()) => debug!(path = %root.display(), "Scratch root removed"),
                Err(error) => debug!(
                    path = %root.display(),
                    error = %error,
                    "Scratch root kept"
                ),
            }
        }
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        self.remove();
    }
}

/// What a worker needs to rebuild the shared state of its run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedStateManifest {
    dir: PathBuf,
    codec: Codec,
    names: Vec<String>,
}

impl SharedStateManifest {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Read every named file. Called inside the worker before the user function.
    pub fn load(&self) -> Result<SharedState, ScratchError> {
        let mut values = HashMap::with_capacity(self.names.len());
        for name in &self.names {
            let bytes = read_bytes(&pickle_path(&self.dir, name)).map_err(|source| {
                ScratchError::Load {
                    name: name.clone(),
                    source,
                }
            })?;
            values.insert(name.clone(), bytes);
        }

        Ok(SharedState {
            codec: self.codec,
            values,
        })
    }
}

/// Shared state as loaded inside one worker invocation
#[derive(Debug, Clone)]
pub struct SharedState {
    codec: Codec,
    values: HashMap<String, Vec<u8>>,
}

impl SharedState {
    /// Decode a private copy of the value stored under `name`.
    pub fn get<V: DeserializeOwned>(&self, name: &str) -> Result<V, ScratchError> {
        let bytes = self.values.get(name).ok_or_else(|| ScratchError::UnknownName {
            name: name.to_string(),
        })?;
        self.codec.decode(bytes).map_err(|source| ScratchError::Load {
            name: name.to_string(),
            source,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct DumpOptions {
    /// Worker count, resolved from cores when `None`
    pub processes: Option<usize>,
    pub max_processes: usize,
    pub scratch_root: PathBuf,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            processes: None,
            max_processes: DEFAULT_MAX_PROCESSES,
            scratch_root: PathBuf::from(DEFAULT_SCRATCH_ROOT),
        }
    }
}

/// Stage `bundle` on disk, returning the guard and the worker-side manifest.
pub(crate) fn stage_bundle(
    scratch_root: &Path,
    bundle: &SharedStateBundle,
) -> Result<(ScratchSpace, Arc<SharedStateManifest>), ScratchError> {
    let scratch = ScratchSpace::create(scratch_root)?;
    let manifest = scratch.write_bundle(bundle)?;
    info!(
        path = %scratch.path().display(),
        entries = bundle.len(),
        bytes = bundle.encoded_size(),
        "Shared state staged"
    );
    Ok((scratch, Arc::new(manifest)))
}

/// Task-level failure for a worker that could not load its shared state
pub(crate) fn shared_state_failure(index: usize, error: &ScratchError) -> TaskFailure {
    TaskFailure::new(index, FailureKind::SharedState, error.to_string())
}

/// Apply `f(item, &shared)` to every item on a worker pool, with `bundle`
/// handed to each worker through the scratch directory.
///
/// ```rust,no_run
/// use turntable::execution::distributor::{process_dump, DumpOptions, SharedStateBundle};
///
/// let bundle = SharedStateBundle::new().with("offset", &100_u64).unwrap();
/// let results = process_dump(
///     (0..4_u64).collect(),
///     &bundle,
///     |x, shared| shared.get::<u64>("offset").map(|offset| x + offset),
///     &DumpOptions::default(),
/// )
/// .unwrap();
/// assert_eq!(results.len(), 4);
/// ```
pub fn process_dump<T, R, E, F>(
    items: Vec<T>,
    bundle: &SharedStateBundle,
    f: F,
    options: &DumpOptions,
) -> Result<Vec<TaskResult<R>>, TurntableError>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Display + 'static,
    F: Fn(T, &SharedState) -> Result<R, E> + Send + Sync + 'static,
{
    let processes = resolve_processes(options.processes, Some(items.len()), options.max_processes)?;
    let (scratch, manifest) = stage_bundle(&options.scratch_root, bundle)?;

    let pool = WorkerPool::new(processes)?;
    let outcomes = map_on_pool(&pool, items, move |index, item| match manifest.load() {
        Ok(shared) => run_isolated(index, item, &|item| f(item, &shared)),
        Err(error) => TaskResult::Failed(shared_state_failure(index, &error)),
    })?;
    drop(pool);
    scratch.cleanup();

    Ok(outcomes
        .into_iter()
        .map(|outcome| {
            let result = outcome.unwrap_or_else(TaskResult::Failed);
            if let Some(failure) = result.failure() {
                log_task_failure(failure);
            }
            result
        })
        .collect())
}
