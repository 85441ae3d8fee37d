//! # System Constants
//!
//! Defaults and fixed names that define the operational boundaries of the
//! execution engine and the offload store.

/// Upper bound applied to the automatic worker count.
pub const DEFAULT_MAX_PROCESSES: usize = 20;

/// Number of progress lines emitted by a standalone series run.
pub const SERIES_PROGRESS_PRINTS: usize = 15;

/// Number of progress lines emitted by the series body of one batch.
pub const BATCH_PROGRESS_PRINTS: usize = 10;

/// Extension used for every serialized file written by the crate.
pub const PICKLE_EXTENSION: &str = "pkl";

/// Filesystem layout defaults
pub mod paths {
    /// Root under which shared-state run directories are created.
    pub const DEFAULT_SCRATCH_ROOT: &str = "temp_pickle";

    /// Prefix of each per-run scratch directory.
    pub const SCRATCH_RUN_PREFIX: &str = "run-";

    /// Root under which offload stores create their per-type directory.
    pub const DEFAULT_STORE_ROOT: &str = "tmp";

    /// Configuration file names looked up in the configuration directory.
    pub const CONFIG_FILE_NAMES: [&str; 2] = ["turntable-config.yaml", "turntable-config.yml"];

    /// Default configuration directory.
    pub const DEFAULT_CONFIG_DIR: &str = "config";
}

/// Field names the offload store always keeps in memory.
pub mod bookkeeping {
    pub const OFFLOAD_ENABLED: &str = "offload_enabled";
    pub const STORAGE_PATH: &str = "storage_path";
    pub const OFFLOADED: &str = "offloaded";

    pub const ALL: [&str; 3] = [OFFLOAD_ENABLED, STORAGE_PATH, OFFLOADED];

    /// Whether `name` is one of the store's own bookkeeping fields
    pub fn is_bookkeeping(name: &str) -> bool {
        ALL.contains(&name)
    }
}

/// Environment variables consulted at runtime
pub mod env {
    /// Selects the configuration environment section.
    pub const TURNTABLE_ENV: &str = "TURNTABLE_ENV";
    pub const APP_ENV: &str = "APP_ENV";

    /// Prefix for `TURNTABLE__SECTION__KEY` configuration overrides.
    pub const CONFIG_OVERRIDE_PREFIX: &str = "TURNTABLE";
    pub const CONFIG_OVERRIDE_SEPARATOR: &str = "__";

    pub const DEFAULT_ENVIRONMENT: &str = "development";
    pub const KNOWN_ENVIRONMENTS: [&str; 3] = ["development", "test", "production"];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bookkeeping_names() {
        assert!(bookkeeping::is_bookkeeping("offload_enabled"));
        assert!(bookkeeping::is_bookkeeping("storage_path"));
        assert!(bookkeeping::is_bookkeeping("offloaded"));
        assert!(!bookkeeping::is_bookkeeping("offloaded_rows"));
        assert!(!bookkeeping::is_bookkeeping("series"));
    }
}
