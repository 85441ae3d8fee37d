//! Thread mode: map a sequence over a per-call rayon thread pool.
//!
//! Unlike the owned [`WorkerPool`](crate::execution::worker_pool::WorkerPool),
//! work runs inside [`rayon::ThreadPool::install`], so `f` may borrow the
//! caller's state. Items are handed out only once the pool has been built, so
//! a build failure leaves the input untouched and the series fallback runs
//! each item exactly once.

use std::fmt::Display;
use std::io;

use rayon::prelude::*;
use rayon::{ThreadBuilder, ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::constants::SERIES_PROGRESS_PRINTS;
use crate::execution::partition::available_cores;
use crate::execution::progress::ProgressTimer;
use crate::execution::series::run_series;
use crate::execution::task::{run_isolated, TaskResult};
use crate::logging::log_task_failure;

/// The worker threads could not be started; recovered by running in series.
#[derive(Debug, Error)]
#[error("Failed to start {threads} worker threads: {source}")]
pub struct ThreadSubmissionFailure {
    pub threads: usize,
    #[source]
    pub source: ThreadPoolBuildError,
}

#[derive(Debug, Clone)]
pub struct ThreadOptions {
    /// Worker threads, available cores when `None`
    pub threads: Option<usize>,
    /// Skip the threads and run in the calling thread
    pub run_series: bool,
    pub verbose: bool,
}

impl Default for ThreadOptions {
    fn default() -> Self {
        Self {
            threads: None,
            run_series: false,
            verbose: true,
        }
    }
}

/// Called before each worker spawn; an `Err` is treated as a spawn failure.
pub(crate) type SpawnHook = fn(usize) -> io::Result<()>;

fn no_hook(_: usize) -> io::Result<()> {
    Ok(())
}

/// Apply `f` to every item on worker threads, results in input order.
///
/// ```rust
/// use turntable::execution::thread_map::{thread_map, ThreadOptions};
///
/// let offset = 10;
/// let results = thread_map(vec![1, 2, 3], |x| Ok::<_, String>(x + offset), &ThreadOptions::default());
/// let values: Vec<i32> = results.into_iter().filter_map(|r| r.ok()).collect();
/// assert_eq!(values, vec![11, 12, 13]);
/// ```
pub fn thread_map<T, R, E, F>(items: Vec<T>, f: F, options: &ThreadOptions) -> Vec<TaskResult<R>>
where
    T: Send,
    R: Send,
    E: Display,
    F: Fn(T) -> Result<R, E> + Sync,
{
    map_threaded_with(items, &f, options, no_hook)
}

pub(crate) fn map_threaded_with<T, R, E, F>(
    items: Vec<T>,
    f: &F,
    options: &ThreadOptions,
    spawn_hook: SpawnHook,
) -> Vec<TaskResult<R>>
where
    T: Send,
    R: Send,
    E: Display,
    F: Fn(T) -> Result<R, E> + Sync + ?Sized,
{
    if options.run_series || items.is_empty() {
        return run_in_series(items, f, options.verbose);
    }

    let threads = options
        .threads
        .unwrap_or_else(available_cores)
        .clamp(1, items.len());

    match build_thread_pool(threads, spawn_hook) {
        Ok(pool) => run_on_pool(&pool, items, f, threads),
        Err(source) => {
            let failure = ThreadSubmissionFailure { threads, source };
            warn!(
                error = %failure,
                items = items.len(),
                "⚠️ Thread submission failed, running in series (degraded mode)"
            );
            run_in_series(items, f, options.verbose)
        }
    }
}

fn run_in_series<T, R, E, F>(items: Vec<T>, f: &F, verbose: bool) -> Vec<TaskResult<R>>
where
    E: Display,
    F: Fn(T) -> Result<R, E> + ?Sized,
{
    let mut timer = ProgressTimer::new(items.len(), SERIES_PROGRESS_PRINTS, verbose);
    let results = run_series(items, 0, f, &mut timer);
    timer.finish();
    results
}

/// Build a pool whose threads are started through `spawn_hook`.
///
/// If any thread fails to start, rayon stops the ones already running and
/// the build returns the error.
fn build_thread_pool(threads: usize, spawn_hook: SpawnHook) -> Result<ThreadPool, ThreadPoolBuildError> {
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .spawn_handler(move |thread: ThreadBuilder| {
            spawn_hook(thread.index())?;
            let mut builder =
                std::thread::Builder::new().name(format!("turntable-thread-{}", thread.index()));
            if let Some(stack_size) = thread.stack_size() {
                builder = builder.stack_size(stack_size);
            }
            builder.spawn(move || thread.run())?;
            Ok(())
        })
        .build()
}

fn run_on_pool<T, R, E, F>(pool: &ThreadPool, items: Vec<T>, f: &F, threads: usize) -> Vec<TaskResult<R>>
where
    T: Send,
    R: Send,
    E: Display,
    F: Fn(T) -> Result<R, E> + Sync + ?Sized,
{
    let total = items.len();
    debug!(threads, items = total, "Thread workers started");

    let results: Vec<TaskResult<R>> = pool.install(|| {
        items
            .into_par_iter()
            .enumerate()
            .map(|(index, item)| run_isolated(index, item, f))
            .collect()
    });

    for failure in results.iter().filter_map(TaskResult::failure) {
        log_task_failure(failure);
    }
    info!(threads, items = total, "Thread map finished");
    results
}
