//! End-to-end dispatch tests across every execution mode.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::*;
use tempfile::TempDir;
use turntable::execution::{
    into_values, process_dump, thread_map, DumpOptions, FailureKind, SharedStateBundle,
    ThreadOptions,
};
use turntable::TurntableError;

#[test]
fn test_series_sum_of_squares() {
    let scratch = TempDir::new().unwrap();
    let dispatcher = quiet_dispatcher(1, &scratch);

    let results = dispatcher.series((0..100).collect(), square);
    let total: u64 = into_values(results).into_iter().flatten().sum();
    assert_eq!(total, 328_350);
}

#[test]
fn test_parallel_and_batch_agree_on_squares() {
    let scratch = TempDir::new().unwrap();
    let dispatcher = quiet_dispatcher(4, &scratch);

    let parallel: Vec<Option<u64>> =
        into_values(dispatcher.parallel((0..16).collect(), square).unwrap());
    let batch: Vec<Option<u64>> = into_values(dispatcher.batch((0..16).collect(), square).unwrap());

    assert_eq!(parallel.iter().flatten().sum::<u64>(), 1240);
    assert_eq!(parallel, batch);
    assert_eq!(batch[15], Some(225));
}

#[test]
fn test_thread_mode_matches_series() {
    let scratch = TempDir::new().unwrap();
    let dispatcher = quiet_dispatcher(1, &scratch).threads(3);

    let threaded = into_values(dispatcher.thread((0..100).collect(), square));
    let sequential = into_values(dispatcher.series((0..100).collect(), square));
    assert_eq!(threaded, sequential);
}

#[test]
fn test_failing_item_yields_empty_slot_in_every_mode() {
    let scratch = TempDir::new().unwrap();
    let dispatcher = quiet_dispatcher(3, &scratch).batch_size(2);
    let items: Vec<i64> = (-3..=3).collect();
    let zero_at = 3;

    let all = [
        dispatcher.series(items.clone(), reciprocal),
        dispatcher.thread(items.clone(), reciprocal),
        dispatcher.parallel(items.clone(), reciprocal).unwrap(),
        dispatcher.batch(items.clone(), reciprocal).unwrap(),
    ];

    for results in all {
        assert_eq!(results.len(), items.len());
        let failure = results[zero_at].failure().unwrap();
        assert_eq!(failure.index, zero_at);
        assert_eq!(failure.kind, FailureKind::Error);
        assert!(failure.message.contains("division by zero"));

        let values = into_values(results);
        assert_eq!(values[zero_at], None);
        assert_eq!(values[0], Some(-1.0 / 3.0));
        assert_eq!(values[6], Some(1.0 / 3.0));
    }
}

#[test]
fn test_panicking_item_does_not_abort_the_batch() {
    let scratch = TempDir::new().unwrap();
    let dispatcher = quiet_dispatcher(2, &scratch);

    let results = dispatcher
        .batch((0..10_u32).collect(), |x| {
            if x == 7 {
                panic!("item {x} exploded");
            }
            Ok::<_, String>(x)
        })
        .unwrap();

    assert_eq!(results.iter().filter(|r| r.is_completed()).count(), 9);
    let failure = results[7].failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Panic);
    assert!(failure.message.contains("item 7 exploded"));
}

#[test]
fn test_batch_with_shared_sees_the_same_state_everywhere() {
    let scratch = TempDir::new().unwrap();
    let dispatcher = quiet_dispatcher(4, &scratch).batch_size(5);

    let mut lookup = HashMap::new();
    for key in 0..20_u32 {
        lookup.insert(key, format!("value-{key}"));
    }
    let bundle = dispatcher
        .shared_bundle()
        .with("lookup", &lookup)
        .unwrap()
        .with("suffix", "!")
        .unwrap();

    let results = dispatcher
        .batch_with_shared((0..20_u32).collect(), &bundle, |key, shared| {
            let lookup: HashMap<u32, String> = shared.get("lookup").map_err(|e| e.to_string())?;
            let suffix: String = shared.get("suffix").map_err(|e| e.to_string())?;
            lookup
                .get(&key)
                .map(|value| format!("{value}{suffix}"))
                .ok_or_else(|| format!("missing {key}"))
        })
        .unwrap();

    let values = into_values(results);
    assert_eq!(values[0].as_deref(), Some("value-0!"));
    assert_eq!(values[19].as_deref(), Some("value-19!"));
    assert_eq!(entry_count(scratch.path()), 0);
}

#[test]
fn test_worker_mutation_of_shared_state_stays_private() {
    let scratch = TempDir::new().unwrap();
    let bundle = SharedStateBundle::new().with("list", &vec![1_u8, 2, 3]).unwrap();
    let options = DumpOptions {
        processes: Some(4),
        scratch_root: scratch.path().to_path_buf(),
        ..DumpOptions::default()
    };

    let results = process_dump(
        (0..8_u8).collect(),
        &bundle,
        |x, shared| {
            let mut list: Vec<u8> = shared.get("list").map_err(|e| e.to_string())?;
            list.push(x);
            Ok::<_, String>(list.len())
        },
        &options,
    )
    .unwrap();

    assert!(into_values(results).into_iter().all(|len| len == Some(4)));
    assert_eq!(entry_count(scratch.path()), 0);
}

#[test]
fn test_unknown_shared_name_fails_only_that_item() {
    let scratch = TempDir::new().unwrap();
    let dispatcher = quiet_dispatcher(2, &scratch);
    let bundle = dispatcher.shared_bundle().with("known", &1_u32).unwrap();

    let results = dispatcher
        .parallel_with_shared((0..4_u32).collect(), &bundle, |x, shared| {
            let name = if x == 2 { "unknown" } else { "known" };
            shared
                .get::<u32>(name)
                .map(|base| base + x)
                .map_err(|e| e.to_string())
        })
        .unwrap();

    assert_eq!(into_values(results), vec![Some(1), Some(2), None, Some(4)]);
}

#[test]
fn test_unwritable_scratch_root_is_a_setup_failure() {
    let scratch = TempDir::new().unwrap();
    let blocker = scratch.path().join("not-a-directory");
    std::fs::write(&blocker, b"file").unwrap();

    let dispatcher = quiet_dispatcher(2, &scratch).scratch_root(&blocker);
    let bundle = dispatcher.shared_bundle().with("x", &1_u8).unwrap();
    let error = dispatcher
        .batch_with_shared(vec![1_u8, 2], &bundle, |x, _| Ok::<_, String>(x))
        .unwrap_err();

    assert!(matches!(error, TurntableError::ScratchIo(_)));
    assert!(error.is_setup_failure());
}

#[test]
fn test_thread_map_shares_caller_state_by_reference() {
    let weights = Arc::new(vec![2_u64, 3, 5]);
    let options = ThreadOptions {
        threads: Some(3),
        ..ThreadOptions::default()
    };

    let results = thread_map(
        (0..3_usize).collect(),
        |i| Ok::<_, String>(weights[i] * 10),
        &options,
    );
    assert_eq!(into_values(results), vec![Some(20), Some(30), Some(50)]);
}
