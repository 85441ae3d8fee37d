//! Per-task outcome types.
//!
//! Every mode returns one [`TaskResult`] per input item, so a caller can tell
//! "this item failed" apart from "the run could not start" (a
//! [`TurntableError`](crate::error::TurntableError)).

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a single task did not produce a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The user function returned an error
    Error,
    /// The user function panicked
    Panic,
    /// Shared state could not be loaded before the call
    SharedState,
    /// The worker went away before reporting a result
    Lost,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Error => "error",
            FailureKind::Panic => "panic",
            FailureKind::SharedState => "shared_state",
            FailureKind::Lost => "lost",
        };
        f.write_str(label)
    }
}

/// Failure marker for one item, with the originating error text
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Task {index} failed ({kind}): {message}")]
pub struct TaskFailure {
    pub index: usize,
    pub kind: FailureKind,
    pub message: String,
}

impl TaskFailure {
    pub fn new(index: usize, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            index,
            kind,
            message: message.into(),
        }
    }

    pub fn lost(index: usize) -> Self {
        Self::new(index, FailureKind::Lost, "worker stopped before reporting a result")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskResult<R> {
    Completed(R),
    Failed(TaskFailure),
}

impl<R> TaskResult<R> {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskResult::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        !self.is_completed()
    }

    /// The value, or `None` for a failed slot
    pub fn ok(self) -> Option<R> {
        match self {
            TaskResult::Completed(value) => Some(value),
            TaskResult::Failed(_) => None,
        }
    }

    pub fn as_ref(&self) -> TaskResult<&R> {
        match self {
            TaskResult::Completed(value) => TaskResult::Completed(value),
            TaskResult::Failed(failure) => TaskResult::Failed(failure.clone()),
        }
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        match self {
            TaskResult::Completed(_) => None,
            TaskResult::Failed(failure) => Some(failure),
        }
    }

    pub fn into_result(self) -> Result<R, TaskFailure> {
        match self {
            TaskResult::Completed(value) => Ok(value),
            TaskResult::Failed(failure) => Err(failure),
        }
    }
}

/// Collapse results to the `Option` view: failed slots become `None`.
pub fn into_values<R>(results: Vec<TaskResult<R>>) -> Vec<Option<R>> {
    results.into_iter().map(TaskResult::ok).collect()
}

/// Count failed slots
pub fn failure_count<R>(results: &[TaskResult<R>]) -> usize {
    results.iter().filter(|r| r.is_failed()).count()
}

/// Run `f(item)`, turning an `Err` or a panic into a [`TaskFailure`].
pub fn run_isolated<T, R, E, F>(index: usize, item: T, f: &F) -> TaskResult<R>
where
    F: Fn(T) -> Result<R, E> + ?Sized,
    E: fmt::Display,
{
    match catch_unwind(AssertUnwindSafe(|| f(item))) {
        Ok(Ok(value)) => TaskResult::Completed(value),
        Ok(Err(error)) => TaskResult::Failed(TaskFailure::new(
            index,
            FailureKind::Error,
            error.to_string(),
        )),
        Err(payload) => TaskResult::Failed(TaskFailure::new(
            index,
            FailureKind::Panic,
            panic_message(payload.as_ref()),
        )),
    }
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reciprocal(x: i32) -> Result<f64, String> {
        if x == 0 {
            Err("division by zero".to_string())
        } else {
            Ok(1.0 / f64::from(x))
        }
    }

    #[test]
    fn test_run_isolated_success_and_error() {
        assert_eq!(run_isolated(0, 4, &reciprocal), TaskResult::Completed(0.25));

        let failed = run_isolated(3, 0, &reciprocal);
        let failure = failed.failure().unwrap();
        assert_eq!(failure.index, 3);
        assert_eq!(failure.kind, FailureKind::Error);
        assert_eq!(failure.message, "division by zero");
    }

    #[test]
    fn test_run_isolated_catches_panics() {
        let explode = |x: u8| -> Result<u8, String> {
            if x > 1 {
                panic!("too big: {x}");
            }
            Ok(x)
        };

        let result = run_isolated(7, 2, &explode);
        let failure = result.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Panic);
        assert_eq!(failure.message, "too big: 2");
    }

    #[test]
    fn test_option_view() {
        let results = vec![
            TaskResult::Completed(1),
            TaskResult::Failed(TaskFailure::lost(1)),
            TaskResult::Completed(3),
        ];
        assert_eq!(failure_count(&results), 1);
        assert_eq!(into_values(results), vec![Some(1), None, Some(3)]);
    }

    #[test]
    fn test_failure_display() {
        let failure = TaskFailure::new(2, FailureKind::SharedState, "lookup.pkl missing");
        assert_eq!(
            failure.to_string(),
            "Task 2 failed (shared_state): lookup.pkl missing"
        );
    }
}
