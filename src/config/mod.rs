//! # Turntable Configuration System
//!
//! YAML-based configuration with environment-specific sections and
//! `TURNTABLE__SECTION__KEY` environment variable overrides.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use turntable::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration (environment auto-detected)
//! let manager = ConfigManager::load()?;
//!
//! let max_processes = manager.config().execution.max_processes;
//! let scratch_root = &manager.config().scratch.root;
//! # Ok(())
//! # }
//! ```
//!
//! ## File layout
//!
//! ```yaml
//! execution:
//!   processes: auto
//!   max_processes: 20
//! scratch:
//!   root: temp_pickle
//! store:
//!   root: tmp
//!   offload_enabled: true
//! codec: bincode
//! logging:
//!   level: info
//!   format: pretty
//!
//! test:
//!   execution:
//!     processes: 2
//! ```

pub mod error;
pub mod loader;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::paths::{DEFAULT_SCRATCH_ROOT, DEFAULT_STORE_ROOT};
use crate::constants::{BATCH_PROGRESS_PRINTS, DEFAULT_MAX_PROCESSES, SERIES_PROGRESS_PRINTS};
use crate::storage::codec::Codec;
use crate::utils::serde::{deserialize_optional_count, deserialize_worker_count};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring turntable-config.yaml
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TurntableConfig {
    /// Dispatch defaults
    pub execution: ExecutionConfig,

    /// Shared-state scratch storage
    pub scratch: ScratchConfig,

    /// Disk-offload attribute store
    pub store: StoreConfig,

    /// Serialization format for scratch and store files
    pub codec: Codec,

    pub logging: LoggingConfig,
}

/// Dispatch settings
///
/// `None` counts are resolved per call: `processes` from the host's cores
/// (capped by `max_processes` and the item count), `batch_size` as
/// `items / processes`, `threads` from the host's cores.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    #[serde(deserialize_with = "deserialize_worker_count")]
    pub processes: Option<usize>,

    pub max_processes: usize,

    #[serde(deserialize_with = "deserialize_optional_count")]
    pub batch_size: Option<usize>,

    #[serde(deserialize_with = "deserialize_worker_count")]
    pub threads: Option<usize>,

    /// Demote run summaries to debug level
    pub quiet: bool,

    /// Per-item progress lines in series mode
    pub verbose: bool,

    pub progress_prints: usize,

    pub batch_progress_prints: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            processes: None,
            max_processes: DEFAULT_MAX_PROCESSES,
            batch_size: None,
            threads: None,
            quiet: false,
            verbose: true,
            progress_prints: SERIES_PROGRESS_PRINTS,
            batch_progress_prints: BATCH_PROGRESS_PRINTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScratchConfig {
    /// Directory under which per-run `run-<uuid>` directories are created
    pub root: PathBuf,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_SCRATCH_ROOT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Stores live in `<root>/<type name>/`
    pub root: PathBuf,
    pub offload_enabled: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_STORE_ROOT),
            offload_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub level: String,
    pub format: LogFormat,
    pub with_thread_names: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            with_thread_names: true,
        }
    }
}

impl TurntableConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.execution.processes == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "execution.processes",
                "0",
                "worker count must be greater than 0",
            ));
        }

        if self.execution.max_processes == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.max_processes",
                "0",
                "worker cap must be greater than 0",
            ));
        }

        if self.execution.batch_size == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "execution.batch_size",
                "0",
                "batch size must be greater than 0",
            ));
        }

        if self.execution.threads == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "execution.threads",
                "0",
                "thread count must be greater than 0",
            ));
        }

        if self.scratch.root.as_os_str().is_empty() {
            return Err(ConfigurationError::validation_error(
                "scratch.root cannot be empty",
            ));
        }

        if self.store.root.as_os_str().is_empty() {
            return Err(ConfigurationError::validation_error(
                "store.root cannot be empty",
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigurationError::validation_error(
                "logging.level cannot be empty",
            ));
        }

        Ok(())
    }
}
