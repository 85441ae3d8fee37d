//! Shared fixtures for the integration tests: quiet dispatchers rooted in a
//! temporary scratch directory and a few small work functions.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use turntable::execution::Dispatcher;

/// Dispatcher with logging silenced and scratch files under `scratch`
pub fn quiet_dispatcher(processes: usize, scratch: &TempDir) -> Dispatcher {
    Dispatcher::new()
        .processes(processes)
        .quiet(true)
        .scratch_root(scratch.path())
}

pub fn square(x: u64) -> Result<u64, String> {
    Ok(x * x)
}

/// `1 / x`, failing on zero
pub fn reciprocal(x: i64) -> Result<f64, String> {
    if x == 0 {
        return Err("division by zero".to_string());
    }
    Ok(1.0 / x as f64)
}

/// Number of entries directly under `dir`, zero when it does not exist
pub fn entry_count(dir: &Path) -> usize {
    fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}
