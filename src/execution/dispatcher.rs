//! # Batch Dispatcher
//!
//! Entry point for every execution mode. A [`Dispatcher`] carries the
//! resolved [`ExecutionConfig`] plus scratch settings and exposes:
//!
//! | mode | workers | shared state |
//! |------|---------|--------------|
//! | [`series`](Dispatcher::series) | calling thread | captured |
//! | [`thread`](Dispatcher::thread) | scoped threads | borrowed |
//! | [`parallel`](Dispatcher::parallel) | owned pool, one task per item | moved / `Arc` |
//! | [`batch`](Dispatcher::batch) | owned pool, one task per batch | moved / `Arc` |
//! | [`parallel_with_shared`](Dispatcher::parallel_with_shared) | owned pool, one task per item | scratch files |
//! | [`batch_with_shared`](Dispatcher::batch_with_shared) | owned pool, one task per batch | scratch files |
//!
//! Every mode returns one [`TaskResult`] per input item, in input order.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info};

use crate::config::{ExecutionConfig, TurntableConfig};
use crate::error::TurntableError;
use crate::execution::distributor::{
    process_dump, shared_state_failure, stage_bundle, DumpOptions, SharedState, SharedStateBundle,
};
use crate::execution::partition::{partition, resolve_batch_size, resolve_processes};
use crate::execution::progress::ProgressTimer;
use crate::execution::series::{run_series, SeriesOptions};
use crate::execution::task::{TaskFailure, TaskResult};
use crate::execution::thread_map::{thread_map, ThreadOptions};
use crate::execution::worker_pool::{self, map_on_pool, WorkerPool};
use crate::logging::{log_dispatch_operation, log_task_failure};
use crate::storage::codec::Codec;

type DispatchResult<R> = Result<Vec<TaskResult<R>>, TurntableError>;

/// Configured front door to the execution modes
///
/// ```rust
/// use turntable::execution::Dispatcher;
///
/// let dispatcher = Dispatcher::new().processes(4).quiet(true);
/// let results = dispatcher
///     .batch((0..16_u64).collect(), |x| Ok::<_, String>(x * x))
///     .unwrap();
/// let total: u64 = results.into_iter().filter_map(|r| r.ok()).sum();
/// assert_eq!(total, 1240);
/// ```
#[derive(Debug, Clone)]
pub struct Dispatcher {
    execution: ExecutionConfig,
    scratch_root: PathBuf,
    codec: Codec,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::from_config(&TurntableConfig::default())
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &TurntableConfig) -> Self {
        Self {
            execution: config.execution.clone(),
            scratch_root: config.scratch.root.clone(),
            codec: config.codec,
        }
    }

    pub fn processes(mut self, processes: usize) -> Self {
        self.execution.processes = Some(processes);
        self
    }

    pub fn max_processes(mut self, max_processes: usize) -> Self {
        self.execution.max_processes = max_processes;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.execution.batch_size = Some(batch_size);
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.execution.threads = Some(threads);
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.execution.quiet = quiet;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.execution.verbose = verbose;
        self
    }

    pub fn scratch_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.scratch_root = root.into();
        self
    }

    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn execution_config(&self) -> &ExecutionConfig {
        &self.execution
    }

    pub fn scratch_root_path(&self) -> &Path {
        &self.scratch_root
    }

    /// Empty bundle using this dispatcher's codec
    pub fn shared_bundle(&self) -> SharedStateBundle {
        SharedStateBundle::with_codec(self.codec)
    }

    fn worker_count(&self, items: usize) -> Result<usize, TurntableError> {
        Ok(resolve_processes(
            self.execution.processes,
            Some(items),
            self.execution.max_processes,
        )?)
    }

    fn report(&self, mode: &str, items: usize, processes: usize, batches: Option<usize>, started: Instant) {
        let elapsed = started.elapsed();
        if self.execution.quiet {
            debug!(mode, items, elapsed_secs = elapsed.as_secs_f64(), "Dispatch finished");
        } else {
            log_dispatch_operation(
                mode,
                items,
                processes,
                batches,
                "completed",
                Some(elapsed.as_millis()),
            );
            info!(
                "Elapsed time: {:.3}s on {} {}",
                elapsed.as_secs_f64(),
                processes,
                if mode == "thread" { "threads" } else { "processes" }
            );
        }
    }

    /// Series mode in the calling thread
    pub fn series<T, R, E, F>(&self, items: Vec<T>, f: F) -> Vec<TaskResult<R>>
    where
        F: Fn(T) -> Result<R, E>,
        E: Display,
    {
        let options = SeriesOptions {
            prints: self.execution.progress_prints,
            verbose: self.execution.verbose && !self.execution.quiet,
        };
        crate::execution::series::series(items, f, &options)
    }

    /// Thread mode; falls back to series if worker threads cannot be spawned
    pub fn thread<T, R, E, F>(&self, items: Vec<T>, f: F) -> Vec<TaskResult<R>>
    where
        T: Send,
        R: Send,
        E: Display,
        F: Fn(T) -> Result<R, E> + Sync,
    {
        self.thread_with(items, f, false)
    }

    /// Thread mode with the option to skip threading altogether
    pub fn thread_with<T, R, E, F>(&self, items: Vec<T>, f: F, run_series: bool) -> Vec<TaskResult<R>>
    where
        T: Send,
        R: Send,
        E: Display,
        F: Fn(T) -> Result<R, E> + Sync,
    {
        let started = Instant::now();
        let total = items.len();
        let options = ThreadOptions {
            threads: self.execution.threads,
            run_series,
            verbose: self.execution.verbose && !self.execution.quiet,
        };
        let threads = options
            .threads
            .unwrap_or_else(crate::execution::partition::available_cores);

        let results = thread_map(items, f, &options);
        self.report("thread", total, threads, None, started);
        results
    }

    /// Parallel mode: one pool task per item
    pub fn parallel<T, R, E, F>(&self, items: Vec<T>, f: F) -> DispatchResult<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        E: Display + 'static,
        F: Fn(T) -> Result<R, E> + Send + Sync + 'static,
    {
        let started = Instant::now();
        let total = items.len();
        let processes = self.worker_count(total)?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let results = worker_pool::parallel(items, f, processes)?;
        self.report("parallel", total, processes, None, started);
        Ok(results)
    }

    /// Parallel mode with `bundle` delivered through the scratch directory
    pub fn parallel_with_shared<T, R, E, F>(
        &self,
        items: Vec<T>,
        bundle: &SharedStateBundle,
        f: F,
    ) -> DispatchResult<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        E: Display + 'static,
        F: Fn(T, &SharedState) -> Result<R, E> + Send + Sync + 'static,
    {
        let started = Instant::now();
        let total = items.len();
        let processes = self.worker_count(total)?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let options = DumpOptions {
            processes: Some(processes),
            max_processes: self.execution.max_processes,
            scratch_root: self.scratch_root.clone(),
        };
        let results = process_dump(items, bundle, f, &options)?;
        self.report("parallel_with_shared", total, processes, None, started);
        Ok(results)
    }

    /// Batch mode: partition, one pool task per batch, flatten in order
    pub fn batch<T, R, E, F>(&self, items: Vec<T>, f: F) -> DispatchResult<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        E: Display + 'static,
        F: Fn(T) -> Result<R, E> + Send + Sync + 'static,
    {
        let started = Instant::now();
        let total = items.len();
        let processes = self.worker_count(total)?;
        let batches = self.plan_batches(items, processes)?;
        if batches.is_empty() {
            return Ok(Vec::new());
        }
        let batch_count = batches.len();

        let prints = self.execution.batch_progress_prints;
        let results = self.run_batches(batches, processes, move |offset, batch| {
            let mut timer = ProgressTimer::new(batch.len(), prints, false);
            let results = run_series(batch, offset, &f, &mut timer);
            timer.finish();
            results
        })?;

        self.report("batch", total, processes, Some(batch_count), started);
        Ok(results)
    }

    /// Batch mode with `bundle` loaded once per batch from the scratch directory
    pub fn batch_with_shared<T, R, E, F>(
        &self,
        items: Vec<T>,
        bundle: &SharedStateBundle,
        f: F,
    ) -> DispatchResult<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        E: Display + 'static,
        F: Fn(T, &SharedState) -> Result<R, E> + Send + Sync + 'static,
    {
        let started = Instant::now();
        let total = items.len();
        let processes = self.worker_count(total)?;
        let batches = self.plan_batches(items, processes)?;
        if batches.is_empty() {
            return Ok(Vec::new());
        }
        let batch_count = batches.len();

        let (scratch, manifest) = stage_bundle(&self.scratch_root, bundle)?;
        let prints = self.execution.batch_progress_prints;
        let results = self.run_batches(batches, processes, move |offset, batch| {
            let shared = match manifest.load() {
                Ok(shared) => shared,
                Err(error) => {
                    return (offset..offset + batch.len())
                        .map(|index| {
                            let failure = shared_state_failure(index, &error);
                            log_task_failure(&failure);
                            TaskResult::Failed(failure)
                        })
                        .collect();
                }
            };

            let mut timer = ProgressTimer::new(batch.len(), prints, false);
            let results = run_series(batch, offset, &|item| f(item, &shared), &mut timer);
            timer.finish();
            results
        });
        scratch.cleanup();
        let results = results?;

        self.report("batch_with_shared", total, processes, Some(batch_count), started);
        Ok(results)
    }

    fn plan_batches<T>(&self, items: Vec<T>, processes: usize) -> Result<Vec<Vec<T>>, TurntableError> {
        let batch_size = resolve_batch_size(self.execution.batch_size, items.len(), processes)?;
        let batches = partition(items, processes, Some(batch_size))?;

        if self.execution.quiet {
            debug!(batch_size, batches = batches.len(), "Batches planned");
        } else {
            info!("size of each batch = {}", batch_size);
            info!("number of batches = {}", batches.len());
        }
        Ok(batches)
    }

    /// Submit one pool task per batch and flatten the per-batch result vectors.
    ///
    /// A batch whose task was lost or panicked outside item isolation yields a
    /// failed slot for each of its items.
    fn run_batches<T, R, G>(
        &self,
        batches: Vec<Vec<T>>,
        processes: usize,
        body: G,
    ) -> DispatchResult<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        G: Fn(usize, Vec<T>) -> Vec<TaskResult<R>> + Send + Sync + 'static,
    {
        let mut spans = Vec::with_capacity(batches.len());
        let mut jobs = Vec::with_capacity(batches.len());
        let mut offset = 0;
        for batch in batches {
            spans.push((offset, batch.len()));
            jobs.push((offset, batch));
            offset += spans[spans.len() - 1].1;
        }

        let pool = WorkerPool::new(processes.min(jobs.len()).max(1))?;
        let outcomes = map_on_pool(&pool, jobs, move |batch_index, (start, batch)| {
            let worker = std::thread::current().name().unwrap_or("worker").to_string();
            debug!(worker = %worker, batch_index, items = batch.len(), "Batch starts");
            body(start, batch)
        });
        drop(pool);
        let outcomes = outcomes?;

        let mut results = Vec::with_capacity(offset);
        for ((start, len), outcome) in spans.into_iter().zip(outcomes) {
            match outcome {
                Ok(batch_results) => results.extend(batch_results),
                Err(batch_failure) => {
                    results.extend((start..start + len).map(|index| {
                        let failure =
                            TaskFailure::new(index, batch_failure.kind, batch_failure.message.clone());
                        log_task_failure(&failure);
                        TaskResult::Failed(failure)
                    }));
                }
            }
        }
        Ok(results)
    }
}
