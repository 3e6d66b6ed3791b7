//! Normalizing comparator
//!
//! The remote store echoes a document back with bookkeeping fields added
//! (migration markers, timestamps, version counters, ...). Comparing raw
//! documents would report drift on every read, so both sides are stripped of
//! a denylist of server-owned root keys before a structural comparison.
//!
//! Object key order is irrelevant, array order is significant.

use serde_json::Value;

use crate::model::ResourceKind;

/// Server-owned root keys of a generic saved object
pub const SAVED_OBJECT_SERVER_FIELDS: &[&str] = &[
    "coreMigrationVersion",
    "migrationVersion",
    "namespaces",
    "references",
    "type",
    "updated_at",
    "id",
    "version",
];

/// Equality over JSON documents, ignoring a fixed set of root keys
#[derive(Debug, Clone, Copy)]
pub struct NormalizingComparator {
    denylist: &'static [&'static str],
}

impl NormalizingComparator {
    /// Comparator with a custom denylist
    pub const fn new(denylist: &'static [&'static str]) -> Self {
        Self { denylist }
    }

    /// Comparator for generic saved objects
    pub const fn saved_object() -> Self {
        Self::new(SAVED_OBJECT_SERVER_FIELDS)
    }

    /// Comparator used for the given kind's update decision, if that kind
    /// compares whole documents. Index patterns compare only their title and
    /// log pattern sets their ordered list, so they get `None`.
    pub fn for_kind(kind: ResourceKind) -> Option<Self> {
        match kind {
            ResourceKind::FreeformObject => Some(Self::saved_object()),
            ResourceKind::IndexPattern | ResourceKind::LogPatternSet => None,
        }
    }

    /// Return a copy of `doc` without the denylisted root keys.
    ///
    /// Only the root object is stripped; nested objects and non-object roots
    /// are returned unchanged.
    pub fn normalize(&self, doc: &Value) -> Value {
        let mut copy = doc.clone();
        if let Value::Object(map) = &mut copy {
            for key in self.denylist {
                map.remove(*key);
            }
        }
        copy
    }

    /// Compare two raw JSON texts. Unparsable input is never equal.
    pub fn equal(&self, old: &str, new: &str) -> bool {
        let (Ok(old), Ok(new)) = (
            serde_json::from_str::<Value>(old),
            serde_json::from_str::<Value>(new),
        ) else {
            return false;
        };
        self.equal_values(&old, &new)
    }

    /// Compare two parsed documents
    pub fn equal_values(&self, old: &Value, new: &Value) -> bool {
        self.normalize(old) == self.normalize(new)
    }
}

impl Default for NormalizingComparator {
    fn default() -> Self {
        Self::saved_object()
    }
}

/// Whether `raw` parses as a JSON document
pub fn is_valid_json(raw: &str) -> bool {
    serde_json::from_str::<Value>(raw).is_ok()
}
