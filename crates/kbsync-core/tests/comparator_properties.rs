//! Property-based tests for drift detection.
//!
//! - Normalization is idempotent
//! - Every document equals itself
//! - Server-injected root fields never register as drift
//! - A change to a caller-owned field always registers as drift
//! - Log pattern lists survive the comma-joined alias unchanged

use kbsync_core::NormalizingComparator;
use kbsync_core::compare::SAVED_OBJECT_SERVER_FIELDS;
use kbsync_core::model::{join_patterns, split_patterns};
use proptest::prelude::*;
use serde_json::{Map, Value, json};

// =============================================================================
// HELPER STRATEGIES
// =============================================================================

fn leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 *._-]{0,20}".prop_map(Value::String),
    ]
}

fn value_strategy() -> impl Strategy<Value = Value> {
    leaf_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Root keys never collide with the denylist because of the prefix
fn document_strategy() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map("attr_[a-z]{1,6}", value_strategy(), 0..6)
        .prop_map(|m| m.into_iter().collect())
}

fn server_fields_strategy() -> impl Strategy<Value = Vec<(&'static str, Value)>> {
    prop::sample::subsequence(SAVED_OBJECT_SERVER_FIELDS.to_vec(), 0..=SAVED_OBJECT_SERVER_FIELDS.len())
        .prop_flat_map(|keys| {
            let n = keys.len();
            (Just(keys), prop::collection::vec(leaf_strategy(), n))
        })
        .prop_map(|(keys, values)| keys.into_iter().zip(values).collect())
}

fn pattern_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9*._-]{1,16}"
}

// =============================================================================
// COMPARATOR PROPERTIES
// =============================================================================

proptest! {
    #[test]
    fn normalize_is_idempotent(doc in document_strategy(), fields in server_fields_strategy()) {
        let comparator = NormalizingComparator::saved_object();
        let mut doc = doc;
        for (key, value) in fields {
            doc.insert(key.to_string(), value);
        }
        let doc = Value::Object(doc);

        let once = comparator.normalize(&doc);
        let twice = comparator.normalize(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn every_document_equals_itself(doc in value_strategy()) {
        let comparator = NormalizingComparator::saved_object();
        prop_assert!(comparator.equal_values(&doc, &doc));
        prop_assert!(comparator.equal(&doc.to_string(), &doc.to_string()));
    }

    #[test]
    fn server_fields_are_not_drift(doc in document_strategy(), fields in server_fields_strategy()) {
        let comparator = NormalizingComparator::saved_object();
        let desired = Value::Object(doc.clone());

        let mut echoed = doc;
        for (key, value) in fields {
            echoed.insert(key.to_string(), value);
        }
        let echoed = Value::Object(echoed);

        prop_assert!(comparator.equal_values(&echoed, &desired));
        prop_assert!(comparator.equal_values(&desired, &echoed));
    }

    #[test]
    fn caller_field_change_is_drift(
        doc in document_strategy(),
        key in "attr_[a-z]{1,6}",
        value in leaf_strategy(),
    ) {
        let comparator = NormalizingComparator::saved_object();
        let before = Value::Object(doc.clone());

        let mut after = doc;
        let changed = after.get(&key) != Some(&value);
        after.insert(key, value);
        let after = Value::Object(after);

        prop_assert_eq!(comparator.equal_values(&before, &after), !changed);
    }

    #[test]
    fn normalize_leaves_input_untouched(doc in document_strategy()) {
        let comparator = NormalizingComparator::saved_object();
        let mut doc = doc;
        doc.insert("updated_at".into(), json!("2024-01-01T00:00:00Z"));
        let doc = Value::Object(doc);
        let snapshot = doc.clone();

        let _ = comparator.normalize(&doc);
        prop_assert_eq!(doc, snapshot);
    }

    #[test]
    fn patterns_round_trip_in_order(patterns in prop::collection::vec(pattern_strategy(), 0..8)) {
        prop_assert_eq!(split_patterns(&join_patterns(&patterns)), patterns);
    }
}
