//! # Execution Engine
//!
//! Applies a user function to every item of a collection, in series, on
//! threads, or on a pool of owned workers, with optional batching and
//! disk-distributed shared state.
//!
//! Layers, leaves first:
//!
//! - [`partition`]: contiguous batches with the remainder folded into the last one
//! - [`task`]: per-item outcome types and failure isolation
//! - [`progress`]: loop progress with ETA
//! - [`series`], [`thread_map`], [`worker_pool`]: the execution modes
//! - [`distributor`]: shared state through scratch files
//! - [`dispatcher`]: the configured entry point composing all of the above

pub mod dispatcher;
pub mod distributor;
pub mod partition;
pub mod progress;
pub mod series;
pub mod task;
pub mod thread_map;
pub mod worker_pool;

pub use dispatcher::Dispatcher;
pub use distributor::{
    process_dump, DumpOptions, ScratchError, ScratchSpace, SharedState, SharedStateBundle,
    SharedStateManifest,
};
pub use partition::{partition, resolve_batch_size, resolve_processes, PartitionError};
pub use progress::{ProgressSnapshot, ProgressTimer, TimeUnit};
pub use series::{series, SeriesOptions};
pub use task::{failure_count, into_values, FailureKind, TaskFailure, TaskResult};
pub use thread_map::{thread_map, ThreadOptions, ThreadSubmissionFailure};
pub use worker_pool::{parallel, PoolError, TaskHandle, WorkerPool, WorkerPoolConfig, WorkerPoolStats};
