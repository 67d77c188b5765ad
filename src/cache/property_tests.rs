//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the cache against a plain HashMap model and the
//! arithmetic against the standard wrapping operations.

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use tokio_test::block_on;

use crate::cache::{Cache, Expiration, Value};
use crate::error::CacheError;
use crate::storage::MemoryStorage;

// == Helpers ==
fn memory_cache() -> Cache {
    Cache::new(None, None, 0, Arc::new(MemoryStorage::new())).unwrap()
}

// == Strategies ==
/// Generates cache keys
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,16}"
}

/// Generates string values
fn value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{0,64}"
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: String },
    Add { key: String, value: String },
    Replace { key: String, value: String },
    Delete { key: String },
    Get { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    // A small key space so operations collide
    let key = "[abc]";
    prop_oneof![
        (key, value_strategy()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        (key, value_strategy()).prop_map(|(key, value)| CacheOp::Add { key, value }),
        (key, value_strategy()).prop_map(|(key, value)| CacheOp::Replace { key, value }),
        key.prop_map(|key| CacheOp::Delete { key }),
        key.prop_map(|key| CacheOp::Get { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // A value that was set is read back unchanged.
    #[test]
    fn prop_set_then_get(key in key_strategy(), value in value_strategy()) {
        let cache = memory_cache();
        let found = block_on(async {
            cache.set(&key, value.clone(), Expiration::Never, None).await.unwrap();
            cache.get(&key).await.unwrap()
        });
        prop_assert_eq!(found, Some(Value::Str(value)));
    }

    // The second add of a live key fails and keeps the first value.
    #[test]
    fn prop_add_twice_fails(key in key_strategy(), first in value_strategy(), second in value_strategy()) {
        let cache = memory_cache();
        let (result, found) = block_on(async {
            cache.add(&key, first.clone(), Expiration::Default, None).await.unwrap();
            let result = cache.add(&key, second, Expiration::Default, None).await;
            (result, cache.get(&key).await.unwrap())
        });
        prop_assert!(matches!(result, Err(CacheError::AlreadyExists(_))));
        prop_assert_eq!(found, Some(Value::Str(first)));
    }

    // Deleted keys read as absent.
    #[test]
    fn prop_delete_removes(key in key_strategy(), value in value_strategy()) {
        let cache = memory_cache();
        let found = block_on(async {
            cache.set(&key, value, Expiration::Default, None).await.unwrap();
            cache.delete(&key).await.unwrap();
            cache.get(&key).await.unwrap()
        });
        prop_assert_eq!(found, None);
    }

    // Any operation sequence behaves like a HashMap.
    #[test]
    fn prop_matches_hashmap_model(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let cache = memory_cache();
        let mut model: HashMap<String, String> = HashMap::new();

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    block_on(cache.set(&key, value.clone(), Expiration::Default, None)).unwrap();
                    model.insert(key, value);
                }
                CacheOp::Add { key, value } => {
                    let result = block_on(cache.add(&key, value.clone(), Expiration::Default, None));
                    if model.contains_key(&key) {
                        prop_assert!(matches!(result, Err(CacheError::AlreadyExists(_))));
                    } else {
                        prop_assert!(result.is_ok());
                        model.insert(key, value);
                    }
                }
                CacheOp::Replace { key, value } => {
                    let result = block_on(cache.replace(&key, value.clone(), Expiration::Default, None));
                    if model.contains_key(&key) {
                        prop_assert!(result.is_ok());
                        model.insert(key, value);
                    } else {
                        prop_assert!(matches!(result, Err(CacheError::NotFound(_))));
                    }
                }
                CacheOp::Delete { key } => {
                    block_on(cache.delete(&key)).unwrap();
                    model.remove(&key);
                }
                CacheOp::Get { key } => {
                    let found = block_on(cache.get(&key)).unwrap();
                    prop_assert_eq!(found, model.get(&key).cloned().map(Value::Str));
                }
            }
        }
    }

    // Untyped increment truncates `n` to the stored width and wraps.
    #[test]
    fn prop_increment_i8_wraps(start in any::<i8>(), n in any::<i64>()) {
        let cache = memory_cache();
        let found = block_on(async {
            cache.set("n", start, Expiration::Default, None).await.unwrap();
            cache.increment("n", n).await.unwrap();
            cache.get("n").await.unwrap()
        });
        prop_assert_eq!(found, Some(Value::I8(start.wrapping_add(n as i8))));
    }

    #[test]
    fn prop_decrement_u16_wraps(start in any::<u16>(), n in any::<i64>()) {
        let cache = memory_cache();
        let found = block_on(async {
            cache.set("n", start, Expiration::Default, None).await.unwrap();
            cache.decrement("n", n).await.unwrap();
            cache.get("n").await.unwrap()
        });
        prop_assert_eq!(found, Some(Value::U16(start.wrapping_sub(n as u16))));
    }

    // Typed increments return what they store.
    #[test]
    fn prop_typed_increment_returns_stored(start in any::<u64>(), n in any::<u64>()) {
        let cache = memory_cache();
        let (returned, found) = block_on(async {
            cache.set("n", start, Expiration::Default, None).await.unwrap();
            let returned = cache.increment_u64("n", n).await.unwrap();
            (returned, cache.get("n").await.unwrap())
        });
        prop_assert_eq!(returned, start.wrapping_add(n));
        prop_assert_eq!(found, Some(Value::U64(returned)));
    }
}
