//! Ordered change events for a query, and the algorithms that apply them to a
//! list.

use crate::checkpoint::{self, LoadBuffer};
use crate::event::{EventFilter, ListEvent};
use crate::observable::Observable;
use crate::query::Query;
use crate::snapshot::Snapshot;
use crate::store::{ChangeSource, ChildEventKind};
use std::rc::Rc;

/// Normalizes the child callbacks of one query into a stream of
/// [`ListEvent`]s.
///
/// With `filter.loaded` set, the first event is a single
/// [`ListEvent::Loaded`] holding the query's initial contents in order; child
/// notifications that race the initial read are folded into it rather than
/// emitted. Unsubscribing detaches every store listener that is still attached.
///
/// # Examples
///
/// ```
/// use livefold::{EventFilter, ListEvent, ListEventStream, MemoryStore, Notification, Query};
/// use serde_json::json;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let store = MemoryStore::new();
/// store.set("letters", json!({"a": 1, "b": 2}));
///
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let sink = seen.clone();
/// let _subscription = ListEventStream::create(store.source(), Query::new("letters"), EventFilter::default())
///     .subscribe(move |notification| {
///         if let Notification::Next(event) = notification {
///             sink.borrow_mut().push(event.kind());
///         }
///     });
/// store.flush();
/// store.set("letters/c", json!(3));
/// store.flush();
///
/// assert_eq!(*seen.borrow(), vec!["loaded", "added"]);
/// ```
pub struct ListEventStream;

impl ListEventStream {
    /// Create the event stream of `query` on `source`.
    pub fn create(
        source: Rc<dyn ChangeSource>,
        query: Query,
        filter: EventFilter,
    ) -> Observable<ListEvent> {
        checkpoint::stream::<ListBuffer>(source, query, filter)
    }
}

#[derive(Default)]
struct ListBuffer(Vec<Snapshot>);

fn snapshot_key(snapshot: &Snapshot) -> String {
    snapshot.key().to_string()
}

impl LoadBuffer for ListBuffer {
    type Event = ListEvent;

    fn added(&mut self, snapshot: Snapshot, preceding_key: Option<&str>) {
        on_added(&mut self.0, snapshot, preceding_key, snapshot_key);
    }

    fn changed(&mut self, snapshot: Snapshot, preceding_key: Option<&str>) {
        on_changed(&mut self.0, snapshot, preceding_key, snapshot_key);
    }

    fn removed(&mut self, snapshot: &Snapshot) {
        on_removed(&mut self.0, snapshot.key(), snapshot_key);
    }

    fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|snapshot| snapshot.key() == key)
    }

    fn into_loaded(self) -> ListEvent {
        ListEvent::Loaded { list: self.0 }
    }

    fn child_event(
        kind: ChildEventKind,
        snapshot: Snapshot,
        preceding_key: Option<String>,
    ) -> ListEvent {
        match kind {
            ChildEventKind::Added => ListEvent::Added {
                snapshot,
                preceding_key,
            },
            ChildEventKind::Changed => ListEvent::Changed {
                snapshot,
                preceding_key,
            },
            ChildEventKind::Removed => ListEvent::Removed { snapshot },
        }
    }
}

/// Insert `element` right after the element keyed `preceding_key`, or at the
/// head when `preceding_key` is `None`.
///
/// A `preceding_key` that names no element also inserts at the head.
///
/// ```
/// use livefold::list_event::on_added;
///
/// let key = |s: &&str| s.to_string();
/// let mut list = vec!["a", "c"];
/// on_added(&mut list, "b", Some("a"), key);
/// on_added(&mut list, "_", None, key);
/// assert_eq!(list, ["_", "a", "b", "c"]);
/// ```
pub fn on_added<T>(
    elements: &mut Vec<T>,
    element: T,
    preceding_key: Option<&str>,
    key_of: impl Fn(&T) -> String,
) {
    let index = match preceding_key {
        None => 0,
        Some(preceding) => match elements.iter().position(|e| key_of(e) == preceding) {
            Some(found) => found + 1,
            None => {
                log::warn!("preceding key '{preceding}' not found, inserting at head");
                0
            }
        },
    };
    elements.insert(index, element);
}

/// Move the element with `element`'s key to the position implied by
/// `preceding_key`, replacing its value.
pub fn on_changed<T>(
    elements: &mut Vec<T>,
    element: T,
    preceding_key: Option<&str>,
    key_of: impl Fn(&T) -> String,
) {
    let key = key_of(&element);
    elements.retain(|e| key_of(e) != key);
    on_added(elements, element, preceding_key, key_of);
}

/// Drop the element keyed `key`. Returns `true` if one was dropped.
pub fn on_removed<T>(elements: &mut Vec<T>, key: &str, key_of: impl Fn(&T) -> String) -> bool {
    let before = elements.len();
    elements.retain(|e| key_of(e) != key);
    elements.len() != before
}

/// Select every snapshot of a `Loaded` event, keeping their order.
pub fn on_loaded<T>(snapshots: &[Snapshot], selector: impl Fn(&Snapshot) -> T) -> Vec<T> {
    snapshots.iter().map(selector).collect()
}
