//! Sequential execution in the calling thread.
//!
//! Used as a standalone mode, as the thread-mode fallback and as the body each
//! worker runs over one batch.

use std::fmt::Display;

use crate::constants::SERIES_PROGRESS_PRINTS;
use crate::execution::progress::ProgressTimer;
use crate::execution::task::{run_isolated, TaskResult};
use crate::logging::log_task_failure;

#[derive(Debug, Clone)]
pub struct SeriesOptions {
    /// Number of progress lines over the whole run
    pub prints: usize,
    /// Emit per-item progress lines
    pub verbose: bool,
}

impl Default for SeriesOptions {
    fn default() -> Self {
        Self {
            prints: SERIES_PROGRESS_PRINTS,
            verbose: true,
        }
    }
}

impl SeriesOptions {
    pub fn quiet() -> Self {
        Self {
            verbose: false,
            ..Self::default()
        }
    }
}

/// Apply `f` to every item, strictly in order.
///
/// ```rust
/// use std::convert::Infallible;
/// use turntable::execution::{series, SeriesOptions};
///
/// let results = series(0..100_u64, |x| Ok::<_, Infallible>(x * x), &SeriesOptions::quiet());
/// let total: u64 = results.into_iter().filter_map(|r| r.ok()).sum();
/// assert_eq!(total, 328_350);
/// ```
pub fn series<T, R, E, F, I>(items: I, f: F, options: &SeriesOptions) -> Vec<TaskResult<R>>
where
    I: IntoIterator<Item = T>,
    F: Fn(T) -> Result<R, E>,
    E: Display,
{
    let items: Vec<T> = items.into_iter().collect();
    let mut timer = ProgressTimer::new(items.len(), options.prints, options.verbose);
    let results = run_series(items, 0, &f, &mut timer);
    timer.finish();
    results
}

/// Series body shared by every mode. `offset` is the global index of the
/// first item, so failures report their position in the caller's input.
pub(crate) fn run_series<T, R, E, F>(
    items: Vec<T>,
    offset: usize,
    f: &F,
    timer: &mut ProgressTimer,
) -> Vec<TaskResult<R>>
where
    F: Fn(T) -> Result<R, E> + ?Sized,
    E: Display,
{
    let mut results = Vec::with_capacity(items.len());
    for (position, item) in items.into_iter().enumerate() {
        let result = run_isolated(offset + position, item, f);
        if let Some(failure) = result.failure() {
            log_task_failure(failure);
        }
        results.push(result);
        timer.tick();
    }
    results
}
