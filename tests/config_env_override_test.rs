//! `TURNTABLE__SECTION__KEY` variables layered over the configuration file.
//!
//! Kept in its own test binary: the variables are process-wide and would
//! leak into concurrently running configuration tests.

use std::fs;

use tempfile::TempDir;
use turntable::config::ConfigManager;

#[test]
fn test_environment_variables_override_file_values() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("turntable-config.yaml"),
        "execution:\n  processes: 6\n  batch_size: 50\n",
    )
    .unwrap();

    std::env::set_var("TURNTABLE__EXECUTION__BATCH_SIZE", "25");
    std::env::set_var("TURNTABLE__STORE__OFFLOAD_ENABLED", "false");
    let result =
        ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "development");
    std::env::remove_var("TURNTABLE__EXECUTION__BATCH_SIZE");
    std::env::remove_var("TURNTABLE__STORE__OFFLOAD_ENABLED");

    let manager = result.unwrap();
    let config = manager.config();
    assert_eq!(config.execution.batch_size, Some(25));
    assert_eq!(config.execution.processes, Some(6));
    assert!(!config.store.offload_enabled);
}
