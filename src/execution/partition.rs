//! Sequence partitioning into contiguous batches.
//!
//! The first `n - n % p` items are chunked by the batch size; the `n % p`
//! trailing items are folded into the last batch. Concatenating the batches
//! always gives back the input, in order.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartitionError {
    #[error("Worker count must be greater than 0")]
    ZeroWorkers,

    #[error("Batch size must be greater than 0")]
    ZeroBatchSize,
}

/// Number of cores the host reports, 1 if it cannot tell.
pub fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Resolve the effective worker count.
///
/// An explicit request is returned as is (zero is rejected). Otherwise the
/// count is `min(cores, cap, item_count)` when the item count is known, floored
/// at 1.
pub fn resolve_processes(
    requested: Option<usize>,
    item_count: Option<usize>,
    cap: usize,
) -> Result<usize, PartitionError> {
    match requested {
        Some(0) => Err(PartitionError::ZeroWorkers),
        Some(processes) => Ok(processes),
        None => {
            let mut processes = available_cores().min(cap);
            if let Some(n) = item_count {
                processes = processes.min(n);
            }
            Ok(processes.max(1))
        }
    }
}

/// Resolve the effective batch size: explicit, or `max(n / p, 1)`.
pub fn resolve_batch_size(
    requested: Option<usize>,
    item_count: usize,
    processes: usize,
) -> Result<usize, PartitionError> {
    if processes == 0 {
        return Err(PartitionError::ZeroWorkers);
    }
    match requested {
        Some(0) => Err(PartitionError::ZeroBatchSize),
        Some(batch_size) => Ok(batch_size),
        None => Ok((item_count / processes).max(1)),
    }
}

/// Split `items` into ordered, contiguous batches.
pub fn partition<T>(
    items: Vec<T>,
    processes: usize,
    batch_size: Option<usize>,
) -> Result<Vec<Vec<T>>, PartitionError> {
    let n = items.len();
    let batch_size = resolve_batch_size(batch_size, n, processes)?;
    if n == 0 {
        return Ok(Vec::new());
    }

    let remainder = n % processes;
    let head_len = n - remainder;

    let mut batches: Vec<Vec<T>> = Vec::with_capacity(head_len / batch_size + 1);
    let mut items = items.into_iter();

    let mut taken = 0;
    while taken < head_len {
        let len = batch_size.min(head_len - taken);
        batches.push(items.by_ref().take(len).collect());
        taken += len;
    }

    let tail: Vec<T> = items.collect();
    if !tail.is_empty() {
        match batches.last_mut() {
            Some(last) => last.extend(tail),
            None => batches.push(tail),
        }
    }

    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remainder_folds_into_last_batch() {
        let batches = partition((0..10).collect(), 3, None).unwrap();
        assert_eq!(batches, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6, 7, 8, 9]]);
    }

    #[test]
    fn test_even_split() {
        let batches = partition((0..16).collect(), 4, None).unwrap();
        assert_eq!(batches.len(), 4);
        assert!(batches.iter().all(|b| b.len() == 4));
    }

    #[test]
    fn test_explicit_batch_size_never_duplicates() {
        // 10 items, 3 workers, batch size 4: head is 9 items -> [4, 4, 1] + tail of 1
        let batches = partition((0..10).collect::<Vec<_>>(), 3, Some(4)).unwrap();
        assert_eq!(batches, vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9]]);
    }

    #[test]
    fn test_more_workers_than_items() {
        let batches = partition(vec!['a', 'b'], 5, None).unwrap();
        assert_eq!(batches, vec![vec!['a', 'b']]);
    }

    #[test]
    fn test_empty_input() {
        let batches = partition(Vec::<u8>::new(), 4, None).unwrap();
        assert!(batches.is_empty());
    }

    #[test]
    fn test_invalid_arguments() {
        assert_eq!(
            partition(vec![1, 2, 3], 0, None),
            Err(PartitionError::ZeroWorkers)
        );
        assert_eq!(
            partition(vec![1, 2, 3], 2, Some(0)),
            Err(PartitionError::ZeroBatchSize)
        );
        assert_eq!(
            resolve_processes(Some(0), Some(10), 20),
            Err(PartitionError::ZeroWorkers)
        );
    }

    #[test]
    fn test_resolve_processes_defaults() {
        let cores = available_cores();
        assert_eq!(resolve_processes(None, None, 20).unwrap(), cores.min(20));
        assert_eq!(resolve_processes(None, Some(1), 20).unwrap(), 1);
        assert_eq!(resolve_processes(None, Some(0), 20).unwrap(), 1);
        assert_eq!(resolve_processes(None, Some(100), 2).unwrap(), cores.min(2));
        assert_eq!(resolve_processes(Some(7), Some(3), 20).unwrap(), 7);
    }

    #[test]
    fn test_resolve_batch_size() {
        assert_eq!(resolve_batch_size(None, 100, 8).unwrap(), 12);
        assert_eq!(resolve_batch_size(None, 3, 8).unwrap(), 1);
        assert_eq!(resolve_batch_size(Some(5), 100, 8).unwrap(), 5);
    }
}
