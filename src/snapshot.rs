//! Immutable reads of a node in the tree store.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A read of a single node: its key within the parent and its JSON value.
///
/// Snapshots are what the store hands to listeners. The crate never looks
/// inside `value` itself; selectors give snapshots meaning.
///
/// A `null` value means the node does not exist.
///
/// # Examples
///
/// ```
/// use livefold::Snapshot;
/// use serde_json::json;
///
/// let snapshot = Snapshot::new("alice", json!({"age": 31, "address": {"city": "Oslo"}}));
/// assert_eq!(snapshot.key(), "alice");
/// assert!(snapshot.exists());
/// assert_eq!(snapshot.child("address/city"), Some(&json!("Oslo")));
/// assert_eq!(snapshot.child("missing"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    key: String,
    value: Value,
}

impl Snapshot {
    /// Create a snapshot for `key` holding `value`.
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Snapshot {
            key: key.into(),
            value,
        }
    }

    /// The node's key within its parent.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The node's value; `null` if the node does not exist.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consume the snapshot, returning its value.
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Returns `true` unless the value is `null`.
    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }

    /// Look up a descendant by a `/`-separated path.
    ///
    /// Empty segments are ignored, so `"a//b"` and `"/a/b"` both mean `a/b`.
    pub fn child(&self, path: &str) -> Option<&Value> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(&self.value, |node, segment| node.get(segment))
    }
}
