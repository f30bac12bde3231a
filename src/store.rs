//! The contract a realtime tree store has to fulfil for live views.

use crate::error::Result;
use crate::query::Query;
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};

/// Detaches a listener. Calling it for a listener that has already gone away
/// (fired once, cancelled by an error) must be a no-op.
pub type Unlisten = Box<dyn FnOnce()>;

/// Receives the ordered children of a single-shot range read.
pub type RangeCallback = Box<dyn FnOnce(Result<Vec<Snapshot>>)>;

/// Receives child notifications of one kind for a query.
pub type ChildCallback = Box<dyn FnMut(Result<ChildNotification>)>;

/// Receives the whole value of a query whenever it changes.
pub type ValueCallback = Box<dyn FnMut(Result<Option<Snapshot>>)>;

/// The kinds of child listener a store offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildEventKind {
    Added,
    Changed,
    Removed,
}

/// One child-level notification as delivered by the store.
///
/// `snapshot` is mandatory by contract; it is optional here only so a
/// misbehaving store can be detected and reported as
/// [`Error::NullSnapshot`](crate::Error::NullSnapshot).
#[derive(Debug, Clone, PartialEq)]
pub struct ChildNotification {
    pub snapshot: Option<Snapshot>,
    /// Key of the child immediately before this one in query order; `None`
    /// for the first child. Always `None` for removals.
    pub preceding_key: Option<String>,
}

impl ChildNotification {
    pub fn new(snapshot: Snapshot, preceding_key: Option<String>) -> Self {
        ChildNotification {
            snapshot: Some(snapshot),
            preceding_key,
        }
    }
}

/// A subscribable tree store.
///
/// Every listening method returns an [`Unlisten`] that detaches the listener.
/// Callbacks run on the caller's single event loop; a store must not invoke a
/// callback while another callback of the same store is running.
///
/// Once a listener reports an `Err`, the store considers it cancelled and
/// never invokes it again.
pub trait ChangeSource {
    /// Read the ordered children of `query` once.
    fn once_range(&self, query: &Query, callback: RangeCallback) -> Unlisten;

    /// Listen for child notifications of `kind` within `query`.
    ///
    /// An added-listener is first told about every child already in the
    /// query's window, in order.
    fn on_child(&self, query: &Query, kind: ChildEventKind, callback: ChildCallback) -> Unlisten;

    /// Listen to the value of `query`, starting with its current value.
    fn on_value(&self, query: &Query, callback: ValueCallback) -> Unlisten;

    fn on_child_added(&self, query: &Query, callback: ChildCallback) -> Unlisten {
        self.on_child(query, ChildEventKind::Added, callback)
    }

    fn on_child_changed(&self, query: &Query, callback: ChildCallback) -> Unlisten {
        self.on_child(query, ChildEventKind::Changed, callback)
    }

    fn on_child_removed(&self, query: &Query, callback: ChildCallback) -> Unlisten {
        self.on_child(query, ChildEventKind::Removed, callback)
    }
}
