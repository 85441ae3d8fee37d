#![allow(dead_code)]

use proptest::prelude::*;

/// Item sequences of up to 200 values
pub fn items_strategy() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(-1_000i64..1_000, 0..200)
}

/// A non-empty sequence together with a worker count in `1..=len`
pub fn items_with_processes_strategy() -> impl Strategy<Value = (Vec<i64>, usize)> {
    prop::collection::vec(-1_000i64..1_000, 1..200)
        .prop_flat_map(|items| {
            let len = items.len();
            (Just(items), 1..=len)
        })
}

/// Valid shared-state entry names
pub fn entry_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,31}"
}
