//! Worker Pool for Isolated Task Execution
//!
//! A fixed-size rayon thread pool owned by one dispatch call. Jobs move their
//! inputs into the worker (`'static` bounds on [`WorkerPool::submit`]), so
//! nothing is shared with the caller except through what the job carries.
//! Ordered maps over the pool go through rayon's indexed parallel iterators.

use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver};
use parking_lot::{Condvar, Mutex};
use rayon::prelude::*;
use tracing::{debug, error, info};

use crate::execution::task::{panic_message, run_isolated, FailureKind, TaskFailure, TaskResult};
use crate::logging::log_task_failure;

/// Fixed-size pool of worker threads
///
/// Submission is asynchronous: [`WorkerPool::submit`] returns a [`TaskHandle`]
/// whose [`get`](TaskHandle::get) blocks until that job resolves. A panicking
/// job only fails its own handle. The pool is closed and drained when dropped.
///
/// # Examples
///
/// ```rust
/// use turntable::execution::worker_pool::WorkerPool;
///
/// let pool = WorkerPool::new(4).unwrap();
/// let handles: Vec<_> = (0..8_u64)
///     .map(|i| pool.submit(move || i * i).unwrap())
///     .collect();
///
/// let squares: Vec<u64> = handles.into_iter().map(|h| h.get().unwrap()).collect();
/// assert_eq!(squares, vec![0, 1, 4, 9, 16, 25, 36, 49]);
/// ```
pub struct WorkerPool {
    pool: rayon::ThreadPool,

    /// Pool configuration
    pub config: WorkerPoolConfig,

    closed: bool,
    counters: Arc<PoolCounters>,
    in_flight: Arc<InFlight>,
}

impl WorkerPool {
    /// Create a pool with `size` workers and default configuration
    pub fn new(size: usize) -> Result<Self, PoolError> {
        Self::with_config(WorkerPoolConfig {
            size,
            ..WorkerPoolConfig::default()
        })
    }

    /// Create a pool with custom configuration
    pub fn with_config(config: WorkerPoolConfig) -> Result<Self, PoolError> {
        Self::validate_config(&config)?;

        let prefix = config.thread_name_prefix.clone();
        let mut builder = rayon::ThreadPoolBuilder::new()
            .num_threads(config.size)
            .thread_name(move |worker_index| format!("{prefix}-{worker_index}"));
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let pool = builder.build().map_err(|source| {
            error!(
                workers = config.size,
                error = %source,
                "Failed to start worker pool"
            );
            PoolError::SpawnFailed { source }
        })?;

        info!(
            workers = config.size,
            prefix = %config.thread_name_prefix,
            "Worker pool started"
        );
        Ok(Self {
            pool,
            config,
            closed: false,
            counters: Arc::new(PoolCounters::default()),
            in_flight: Arc::new(InFlight::default()),
        })
    }

    /// Queue `job` for execution on the next free worker.
    pub fn submit<R, F>(&self, job: F) -> Result<TaskHandle<R>, PoolError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.closed {
            return Err(PoolError::Closed);
        }
        let index = self.counters.submitted.fetch_add(1, Ordering::AcqRel);
        let (result_tx, result_rx) = channel::bounded(1);
        let counters = Arc::clone(&self.counters);
        let in_flight = Arc::clone(&self.in_flight);

        in_flight.begin();
        self.pool.spawn(move || {
            let outcome = counters.record(catch_unwind(AssertUnwindSafe(job)));
            let outcome = outcome.map_err(|payload| panic_message(payload.as_ref()));
            // The caller may have dropped its handle; nothing to report then.
            let _ = result_tx.send(outcome);
            in_flight.end();
        });

        Ok(TaskHandle {
            index,
            receiver: result_rx,
        })
    }

    /// Stop accepting jobs. Queued jobs still run.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            debug!("Worker pool closed to new submissions");
        }
    }

    /// Close the pool and wait until every submitted job has finished.
    pub fn join(&mut self) {
        self.close();
        self.in_flight.wait_idle();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn size(&self) -> usize {
        self.config.size
    }

    /// Get pool statistics
    pub fn get_stats(&self) -> WorkerPoolStats {
        let submitted = self.counters.submitted.load(Ordering::Acquire);
        let completed = self.counters.completed.load(Ordering::Acquire);
        let panicked = self.counters.panicked.load(Ordering::Acquire);

        WorkerPoolStats {
            workers: self.config.size,
            submitted,
            completed,
            panicked,
            pending: submitted.saturating_sub(completed + panicked),
        }
    }

    /// Validate pool configuration
    fn validate_config(config: &WorkerPoolConfig) -> Result<(), PoolError> {
        if config.size == 0 {
            return Err(PoolError::InvalidConfig {
                reason: "Pool size must be greater than 0".to_string(),
            });
        }

        if config.thread_name_prefix.is_empty() {
            return Err(PoolError::InvalidConfig {
                reason: "Thread name prefix cannot be empty".to_string(),
            });
        }

        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.join();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .field("stats", &self.get_stats())
            .finish()
    }
}

/// Pending result of one submitted job
#[derive(Debug)]
pub struct TaskHandle<R> {
    index: usize,
    receiver: Receiver<Result<R, String>>,
}

impl<R> TaskHandle<R> {
    /// Submission order of this job within its pool
    pub fn index(&self) -> usize {
        self.index
    }

    /// Block until the job resolves.
    pub fn get(self) -> Result<R, TaskFailure> {
        match self.receiver.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(TaskFailure::new(self.index, FailureKind::Panic, message)),
            Err(_) => Err(TaskFailure::lost(self.index)),
        }
    }
}

#[derive(Debug, Default)]
struct PoolCounters {
    submitted: AtomicUsize,
    completed: AtomicUsize,
    panicked: AtomicUsize,
}

impl PoolCounters {
    fn record<T, P>(&self, outcome: Result<T, P>) -> Result<T, P> {
        match &outcome {
            Ok(_) => self.completed.fetch_add(1, Ordering::AcqRel),
            Err(_) => self.panicked.fetch_add(1, Ordering::AcqRel),
        };
        outcome
    }
}

/// Count of spawned jobs that have not finished yet
#[derive(Debug, Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn begin(&self) {
        *self.count.lock() += 1;
    }

    fn end(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads
    pub size: usize,

    /// Worker threads are named `<prefix>-<index>`
    pub thread_name_prefix: String,

    /// Stack size per worker, platform default when `None`
    pub stack_size: Option<usize>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            size: crate::execution::partition::available_cores()
                .min(crate::constants::DEFAULT_MAX_PROCESSES),
            thread_name_prefix: "turntable-worker".to_string(),
            stack_size: None,
        }
    }
}

/// Worker pool statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolStats {
    pub workers: usize,
    pub submitted: usize,
    pub completed: usize,
    pub panicked: usize,
    pub pending: usize,
}

/// Worker pool errors
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Invalid pool configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Failed to start worker threads: {source}")]
    SpawnFailed {
        #[source]
        source: rayon::ThreadPoolBuildError,
    },

    #[error("Worker pool is closed")]
    Closed,
}

/// Run `job_fn(index, job)` for every job on `pool`, results in job order.
///
/// A job that panics resolves to a [`TaskFailure`] carrying its position in
/// `jobs`; its siblings keep running.
pub(crate) fn map_on_pool<J, O, G>(
    pool: &WorkerPool,
    jobs: Vec<J>,
    job_fn: G,
) -> Result<Vec<Result<O, TaskFailure>>, PoolError>
where
    J: Send,
    O: Send,
    G: Fn(usize, J) -> O + Sync,
{
    if pool.closed {
        return Err(PoolError::Closed);
    }
    pool.counters.submitted.fetch_add(jobs.len(), Ordering::AcqRel);

    let counters = &pool.counters;
    Ok(pool.pool.install(|| {
        jobs.into_par_iter()
            .enumerate()
            .map(|(index, job)| {
                counters
                    .record(catch_unwind(AssertUnwindSafe(|| job_fn(index, job))))
                    .map_err(|payload| {
                        TaskFailure::new(index, FailureKind::Panic, panic_message(payload.as_ref()))
                    })
            })
            .collect()
    }))
}

/// Parallel mode: every item is its own pool task.
///
/// The pool is created for this call and released before returning.
pub fn parallel<T, R, E, F>(
    items: Vec<T>,
    f: F,
    processes: usize,
) -> Result<Vec<TaskResult<R>>, PoolError>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Display + 'static,
    F: Fn(T) -> Result<R, E> + Send + Sync + 'static,
{
    let pool = WorkerPool::new(processes)?;
    let outcomes = map_on_pool(&pool, items, |index, item| run_isolated(index, item, &f))?;
    drop(pool);

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
