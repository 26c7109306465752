//! Property-Based Tests for the Cache Module
//!
//! Uses proptest to check key determinism, glob matching and store semantics.

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::time::Duration;

use crate::cache::{pattern, CacheStore, MemoryStore};
use crate::keys::{build_key, parse_key, validate_key, MAX_KEY_LENGTH};

// == Test Configuration ==
const TEST_MAX_ENTRIES: usize = 100;
const TEST_TTL: Duration = Duration::from_secs(300);

// == Strategies ==
fn resource_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["user", "group", "permission_set", "assignment", "account"])
}

fn operation_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["list", "describe", "get", "members"])
}

/// Arbitrary printable identifiers, including characters that need sanitizing
fn identifier_strategy() -> impl Strategy<Value = String> {
    "[ -~]{1,120}"
}

/// Parameter pairs with unique names
fn params_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::hash_map("[A-Za-z]{1,12}", "[a-z0-9]{0,12}", 0..6)
        .prop_map(|m| m.into_iter().collect())
}

fn segment_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9_-]{1,12}"
}

fn to_map(pairs: &[(String, String)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.clone(), json!(v)))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Identical inputs give identical keys whatever the parameter order.
    #[test]
    fn prop_key_determinism(
        resource in resource_strategy(),
        operation in operation_strategy(),
        identifier in identifier_strategy(),
        params in params_strategy(),
    ) {
        let forward = to_map(&params);
        let mut reversed_pairs = params.clone();
        reversed_pairs.reverse();
        let reversed = to_map(&reversed_pairs);

        let a = build_key(resource, operation, Some(&identifier), None, Some(&forward)).unwrap();
        let b = build_key(resource, operation, Some(&identifier), None, Some(&reversed)).unwrap();
        prop_assert_eq!(&a, &b);
    }

    // Every built key is valid, bounded and parses back to its parts.
    #[test]
    fn prop_keys_are_valid_and_parseable(
        resource in resource_strategy(),
        operation in operation_strategy(),
        identifier in identifier_strategy(),
        sub in proptest::option::of(identifier_strategy()),
        params in params_strategy(),
    ) {
        prop_assume!(!identifier.trim().is_empty());
        let map = to_map(&params);
        let key = build_key(
            resource,
            operation,
            Some(&identifier),
            sub.as_deref(),
            Some(&map),
        )
        .unwrap();

        prop_assert!(key.len() <= MAX_KEY_LENGTH);
        prop_assert!(validate_key(&key).is_ok());

        let parsed = parse_key(&key).unwrap();
        prop_assert_eq!(parsed.resource_type.as_str(), resource);
        prop_assert_eq!(parsed.operation.as_str(), operation);
        prop_assert_eq!(parsed.params_hash.is_some(), !map.is_empty());
    }

    // Different identifiers never collapse to the same key.
    #[test]
    fn prop_distinct_identifiers_distinct_keys(
        a in identifier_strategy(),
        b in identifier_strategy(),
    ) {
        prop_assume!(a.trim() != b.trim());
        let key_a = build_key("user", "describe", Some(&a), None, None).unwrap();
        let key_b = build_key("user", "describe", Some(&b), None, None).unwrap();
        prop_assert_ne!(key_a, key_b);
    }

    // A trailing-star pattern behaves exactly like a prefix test.
    #[test]
    fn prop_prefix_pattern_matches_prefix(
        prefix in "[a-z:]{0,10}",
        key in "[a-z:]{0,20}",
    ) {
        let glob = format!("{}*", prefix);
        prop_assert_eq!(pattern::matches(&glob, &key), key.starts_with(&prefix));
    }

    // A key always matches itself, and `*` matches anything.
    #[test]
    fn prop_pattern_reflexive(key in "[a-z0-9_:-]{0,40}") {
        prop_assert!(pattern::matches(&key, &key));
        prop_assert!(pattern::matches("*", &key));
    }

    // Invalidating one resource type never touches another.
    #[test]
    fn prop_invalidate_resource_type_is_precise(
        user_ids in prop::collection::hash_set(segment_strategy(), 1..20),
        group_ids in prop::collection::hash_set(segment_strategy(), 1..20),
    ) {
        let store = MemoryStore::new(TEST_MAX_ENTRIES, 1_000);
        for id in &user_ids {
            store.set(&format!("user:describe:{}", id), json!(id), TEST_TTL).unwrap();
        }
        for id in &group_ids {
            store.set(&format!("group:describe:{}", id), json!(id), TEST_TTL).unwrap();
        }

        let removed = store.invalidate("user:*").unwrap();
        prop_assert_eq!(removed, user_ids.len());

        let remaining = store.keys().unwrap();
        prop_assert_eq!(remaining.len(), group_ids.len());
        prop_assert!(remaining.iter().all(|k| k.starts_with("group:")));
    }

    // Storing then reading (before expiry) returns the stored value.
    #[test]
    fn prop_roundtrip_storage(key in "[a-z_]{1,30}", value in "[a-zA-Z0-9 ]{0,64}") {
        let store = MemoryStore::new(TEST_MAX_ENTRIES, 1_000);
        store.set(&key, json!(value), TEST_TTL).unwrap();
        prop_assert_eq!(store.get(&key).unwrap(), Some(json!(value)));
    }

    // Later writes win and never duplicate the entry.
    #[test]
    fn prop_overwrite_semantics(
        key in "[a-z_]{1,30}",
        first in any::<i64>(),
        second in any::<i64>(),
    ) {
        let store = MemoryStore::new(TEST_MAX_ENTRIES, 1_000);
        store.set(&key, json!(first), TEST_TTL).unwrap();
        store.set(&key, json!(second), TEST_TTL).unwrap();

        prop_assert_eq!(store.get(&key).unwrap(), Some(json!(second)));
        prop_assert_eq!(store.len(), 1);
    }

    // The number of entries never exceeds the configured capacity.
    #[test]
    fn prop_capacity_enforcement(keys in prop::collection::vec("[a-z]{1,8}", 1..200)) {
        let max_entries = 50;
        let store = MemoryStore::new(max_entries, 1_000);
        for key in keys {
            store.set(&key, json!(1), TEST_TTL).unwrap();
            prop_assert!(store.len() <= max_entries);
        }
    }
}
