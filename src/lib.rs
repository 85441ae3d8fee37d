#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Turntable
//!
//! Batch-parallel processing of large collections, with disk-distributed
//! shared state and a disk-offloading attribute store.
//!
//! ## Overview
//!
//! A user function is applied to every item of a collection, either in the
//! calling thread, on scoped threads, or on a bounded pool of owned worker
//! threads. Items can be grouped into contiguous batches so each worker runs
//! a whole batch in series. Large read-only arguments can be written to a
//! scratch directory once per run and reloaded inside each worker instead of
//! travelling with every task.
//!
//! Every mode returns one [`TaskResult`] per item, in input order: a failing
//! or panicking item becomes a failed slot and never aborts its siblings.
//!
//! ## Module Organization
//!
//! - [`execution`] - Partitioner, execution modes, shared-state distributor, dispatcher
//! - [`storage`] - Serialization codec and the disk-offload attribute store
//! - [`record`] - Row-oriented record collections
//! - [`config`] - YAML configuration with environment overrides
//! - [`logging`] - Structured logging setup and helpers
//! - [`error`] - Run-level error types
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use turntable::config::ConfigManager;
//! use turntable::execution::Dispatcher;
//! use turntable::logging::init_structured_logging;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! init_structured_logging(&manager.config().logging);
//!
//! let dispatcher = Dispatcher::from_config(manager.config());
//! let bundle = dispatcher.shared_bundle().with("offset", &2_i64)?;
//!
//! let results = dispatcher.batch_with_shared((0..100_i64).collect(), &bundle, |x, shared| {
//!     shared.get::<i64>("offset").map(|offset| x + offset)
//! })?;
//!
//! let values: Vec<Option<i64>> = turntable::execution::into_values(results);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # All tests, including property tests
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod execution;
pub mod logging;
pub mod record;
pub mod storage;
pub mod utils;

pub use config::{ConfigManager, ExecutionConfig, TurntableConfig};
pub use error::{Result, TurntableError};
pub use execution::{
    Dispatcher, FailureKind, SharedState, SharedStateBundle, TaskFailure, TaskResult,
};
pub use record::{Record, Row};
pub use storage::{Codec, OffloadStore, StorageAccessError};
