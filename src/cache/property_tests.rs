//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check key normalization, store bounds and identity
//! eviction against simple reference models.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashSet;

use crate::cache::{CacheStore, Capacity};
use crate::equality::{ArgEquality, KeyMatching};
use crate::key::{IdentityField, KeyPipeline};
use crate::memoize::{MemoizeOptions, Memoized};
use crate::policy::IdentityEviction;

// == Strategies ==
/// Generates identities of mixed kinds, duplicates allowed
fn identity_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        (0i64..20).prop_map(|n| json!(n)),
        "[a-e]{1,2}".prop_map(|s| json!(s)),
        any::<bool>().prop_map(|b| json!(b)),
        Just(Value::Null),
    ]
}

fn element(id: &Value) -> Value {
    json!({ "id": id })
}

fn identity_pipeline() -> KeyPipeline {
    KeyPipeline::new().with_identity(IdentityField::field("id"))
}

fn key_for(ids: &[Value]) -> Vec<Value> {
    identity_pipeline().transform(&[Value::Array(ids.iter().map(element).collect())])
}

/// Canonical multiset of identities for comparison
fn multiset(ids: &[Value]) -> Vec<String> {
    let mut rendered: Vec<String> = ids.iter().map(Value::to_string).collect();
    rendered.sort();
    rendered
}

fn identity_memo(bound: usize) -> Memoized<usize> {
    MemoizeOptions::new()
        .identity_field("id")
        .capacity_bound(bound)
        .build(|args: &[Value]| args.first().and_then(Value::as_array).map_or(0, Vec::len))
}

fn single(id: u32) -> Vec<Value> {
    vec![json!([{ "id": id }])]
}

/// Generates a sequence of operations against an identity cache
#[derive(Debug, Clone)]
enum IdentityOp {
    /// Call with a key never seen before
    Fresh,
    /// Call with the n-th currently cached key, modulo the cache size
    Revisit(usize),
}

fn identity_op_strategy() -> impl Strategy<Value = IdentityOp> {
    prop_oneof![
        Just(IdentityOp::Fresh),
        (0usize..8).prop_map(IdentityOp::Revisit),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Reordering the elements of a collection never changes its key
    #[test]
    fn prop_identity_key_ignores_order(
        (ids, shuffled) in prop::collection::vec(identity_strategy(), 0..8)
            .prop_flat_map(|ids| (Just(ids.clone()), Just(ids).prop_shuffle()))
    ) {
        prop_assert_eq!(key_for(&ids), key_for(&shuffled));
    }

    // Keys are equal exactly when the identity multisets are equal
    #[test]
    fn prop_identity_key_distinguishes_multisets(
        a in prop::collection::vec(identity_strategy(), 0..6),
        b in prop::collection::vec(identity_strategy(), 0..6),
    ) {
        prop_assert_eq!(key_for(&a) == key_for(&b), multiset(&a) == multiset(&b));
    }

    // Extra arguments are left untouched by identity normalization
    #[test]
    fn prop_identity_key_keeps_trailing_args(
        ids in prop::collection::vec(identity_strategy(), 0..6),
        extra in "[a-z]{0,8}",
    ) {
        let args = vec![Value::Array(ids.iter().map(element).collect()), json!(extra)];
        let key = identity_pipeline().transform(&args);
        prop_assert_eq!(key.len(), 2);
        prop_assert_eq!(&key[1], &args[1]);
    }

    // A bounded store never holds more than its bound, and never holds a key twice
    #[test]
    fn prop_store_respects_capacity(
        bound in 1usize..6,
        inserts in prop::collection::vec(0u8..10, 1..40),
    ) {
        let mut store = CacheStore::new(
            Capacity::Bounded(bound),
            ArgEquality::SameValueZero,
            KeyMatching::PerArgument,
        );

        for n in inserts {
            let key = vec![json!(n)];
            match store.find(&key) {
                Some(index) => {
                    store.promote(index);
                }
                None => {
                    store.insert(key, n);
                }
            }
            prop_assert!(store.len() <= bound);
        }

        let unique: HashSet<String> = store.keys().iter().map(|k| Value::Array(k.clone()).to_string()).collect();
        prop_assert_eq!(unique.len(), store.len());
    }

    // Identity eviction keeps the logical size within the bound
    #[test]
    fn prop_identity_eviction_bound(
        bound in 1usize..5,
        calls in prop::collection::vec(0u32..12, 1..60),
    ) {
        let memoized = identity_memo(bound);
        for id in calls {
            memoized.call(&single(id));
            prop_assert!(memoized.size() <= bound);
            prop_assert!(memoized.has(&single(id)));
        }
    }

    // Touching a key records the current clock value for it
    #[test]
    fn prop_touch_records_latest_clock(ids in prop::collection::vec(0u32..6, 1..30)) {
        let mut policy = IdentityEviction::new(None);
        for id in ids {
            let access = policy.stage(&single(id));
            let clock = policy.touch(&access);
            prop_assert_eq!(clock, policy.usage_counter());
            prop_assert_eq!(policy.last_access(&access.hash), Some(clock));
        }
    }

    // Clearing empties the cache, and clearing again changes nothing
    #[test]
    fn prop_clear_is_idempotent(calls in prop::collection::vec(0u32..8, 0..20)) {
        let memoized = identity_memo(3);
        for id in &calls {
            memoized.call(&single(*id));
        }

        memoized.clear();
        prop_assert_eq!(memoized.size(), 0);
        memoized.clear();
        prop_assert_eq!(memoized.size(), 0);
        prop_assert!(memoized.keys().is_empty());
    }

    // With only fresh keys and hits on live entries, identity eviction is plain LRU
    #[test]
    fn prop_fresh_keys_follow_lru(
        bound in 1usize..5,
        ops in prop::collection::vec(identity_op_strategy(), 1..50),
    ) {
        let memoized = identity_memo(bound);
        // Most recently used first
        let mut model: Vec<u32> = Vec::new();
        let mut next_id = 0u32;

        for op in ops {
            match op {
                IdentityOp::Fresh => {
                    memoized.call(&single(next_id));
                    model.insert(0, next_id);
                    model.truncate(bound);
                    next_id += 1;
                }
                IdentityOp::Revisit(n) => {
                    if model.is_empty() {
                        continue;
                    }
                    let id = model.remove(n % model.len());
                    memoized.call(&single(id));
                    model.insert(0, id);
                }
            }

            prop_assert_eq!(memoized.size(), model.len());
            for id in &model {
                prop_assert!(memoized.has(&single(*id)), "id {} should be cached", id);
            }
        }
    }
}
