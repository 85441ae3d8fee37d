//! Property-based tests for partitioning and mode equivalence.

mod common;

use common::strategies::*;
use proptest::prelude::*;
use turntable::execution::{
    into_values, partition, series, Dispatcher, SeriesOptions, SharedStateBundle,
};

fn double(x: i64) -> Result<i64, String> {
    Ok(x * 2)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_partition_concatenation_restores_input((items, processes) in items_with_processes_strategy()) {
        let batches = partition(items.clone(), processes, None).unwrap();

        prop_assert!(batches.iter().all(|batch| !batch.is_empty()));
        let flattened: Vec<i64> = batches.into_iter().flatten().collect();
        prop_assert_eq!(flattened, items);
    }

    #[test]
    fn test_partition_with_explicit_batch_size(
        (items, processes) in items_with_processes_strategy(),
        batch_size in 1usize..40,
    ) {
        let n = items.len();
        let batches = partition(items.clone(), processes, Some(batch_size)).unwrap();

        // Every batch but the last is exactly `batch_size` long
        if let Some((_, head)) = batches.split_last() {
            prop_assert!(head.iter().all(|batch| batch.len() == batch_size));
        }
        prop_assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), n);
        prop_assert_eq!(batches.into_iter().flatten().collect::<Vec<_>>(), items);
    }

    #[test]
    fn test_every_mode_matches_a_plain_map(items in items_strategy(), processes in 1usize..6) {
        let expected: Vec<Option<i64>> = items.iter().map(|x| Some(x * 2)).collect();
        let dispatcher = Dispatcher::new().processes(processes).quiet(true);

        let in_series = into_values(series(items.clone(), double, &SeriesOptions::quiet()));
        let threaded = into_values(dispatcher.thread(items.clone(), double));
        let batched = into_values(dispatcher.batch(items.clone(), double).unwrap());

        prop_assert_eq!(&in_series, &expected);
        prop_assert_eq!(&threaded, &expected);
        prop_assert_eq!(&batched, &expected);
    }

    #[test]
    fn test_bundle_accepts_distinct_names(names in prop::collection::btree_set(entry_name_strategy(), 1..8)) {
        let mut bundle = SharedStateBundle::new();
        for name in &names {
            bundle.insert(name, &name.len()).unwrap();
        }

        prop_assert_eq!(bundle.len(), names.len());
        let first = names.iter().next().unwrap();
        prop_assert!(bundle.insert(first, &0_usize).is_err());
    }
}
