//! An in-process tree store.
//!
//! [`MemoryStore`] keeps a JSON tree, evaluates queries against it and
//! notifies listeners the way a realtime store does: child-level added,
//! changed and removed notifications with preceding keys, whole-value
//! notifications and single-shot range reads.
//!
//! Nothing is delivered synchronously. Writes and registrations queue their
//! notifications, and [`MemoryStore::flush`] delivers them in order, playing
//! the part of the event loop.

use crate::error::Error;
use crate::query::{normalize_path, Bound, Limit, Order, Query};
use crate::snapshot::Snapshot;
use crate::store::{
    ChangeSource, ChildCallback, ChildEventKind, ChildNotification, RangeCallback, Unlisten,
    ValueCallback,
};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::rc::{Rc, Weak};

static NULL: Value = Value::Null;

enum Callback {
    Child(ChildEventKind, Rc<RefCell<ChildCallback>>),
    Value(Rc<RefCell<ValueCallback>>),
    Range(RangeCallback),
}

struct Listener {
    query: Query,
    callback: Callback,
    cancelled: bool,
}

enum Payload {
    Child(ChildNotification),
    Value(Snapshot),
    Read,
    Failed(Error),
}

struct Delivery {
    id: u64,
    payload: Payload,
}

/// What a listener could observe before and after a write.
enum Observed {
    Window(Vec<Snapshot>),
    Value(Snapshot),
}

#[derive(Default)]
struct Inner {
    root: Value,
    listeners: BTreeMap<u64, Listener>,
    next_id: u64,
    queue: VecDeque<Delivery>,
    deferred: VecDeque<Delivery>,
    defer_reads: bool,
    flushing: bool,
}

/// An in-memory [`ChangeSource`].
///
/// Cloning yields another handle to the same tree.
///
/// # Examples
///
/// ```
/// use livefold::{MemoryStore, Query};
/// use serde_json::json;
///
/// let store = MemoryStore::new();
/// store.set("scores", json!({"ann": {"points": 3}, "bob": {"points": 1}}));
///
/// let query = Query::new("scores").order_by_child("points").limit_to_first(1);
/// let keys: Vec<String> = store.read(&query).iter().map(|s| s.key().to_string()).collect();
/// assert_eq!(keys, ["bob"]);
/// ```
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<Inner>>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("MemoryStore")
            .field("listeners", &inner.listeners.len())
            .field("pending", &(inner.queue.len() + inner.deferred.len()))
            .finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// This store as a shareable [`ChangeSource`].
    pub fn source(&self) -> Rc<dyn ChangeSource> {
        Rc::new(self.clone())
    }

    /// Replace the value at `path`. Writing `null` removes the node.
    pub fn set(&self, path: &str, value: Value) {
        self.write(vec![(normalize_path(path), value)]);
    }

    /// Write several descendants of `path` at once; keys of `values` are
    /// relative paths and `null` values remove. Listeners see a single change.
    ///
    /// Anything but an object is ignored.
    pub fn update(&self, path: &str, values: Value) {
        let Value::Object(values) = values else {
            log::warn!("ignoring non-object update of '{path}'");
            return;
        };
        let base = normalize_path(path);
        let writes = values
            .into_iter()
            .map(|(relative, value)| (normalize_path(&format!("{base}/{relative}")), value))
            .collect();
        self.write(writes);
    }

    /// Remove the node at `path`.
    pub fn remove(&self, path: &str) {
        self.set(path, Value::Null);
    }

    /// The value at `path`, `null` if there is none.
    pub fn get(&self, path: &str) -> Value {
        let path = normalize_path(path);
        value_at(&self.inner.borrow().root, &path).clone()
    }

    /// The ordered children of `query` as they stand now.
    pub fn read(&self, query: &Query) -> Vec<Snapshot> {
        window(&self.inner.borrow().root, query)
    }

    /// Hold single-shot range reads back until every other queued
    /// notification has been delivered.
    pub fn defer_reads(&self, defer: bool) {
        self.inner.borrow_mut().defer_reads = defer;
    }

    /// Report `message` as an error to every listener on `path`. The listeners
    /// are cancelled and receive nothing else.
    pub fn fail(&self, path: &str, message: &str) {
        let path = normalize_path(path);
        let mut inner = self.inner.borrow_mut();
        let ids: Vec<u64> = inner
            .listeners
            .iter_mut()
            .filter(|(_, listener)| listener.query.path() == path && !listener.cancelled)
            .map(|(id, listener)| {
                listener.cancelled = true;
                *id
            })
            .collect();
        for id in ids {
            inner.queue.push_back(Delivery {
                id,
                payload: Payload::Failed(Error::Upstream(message.to_string())),
            });
        }
    }

    /// Deliver a raw child notification to every `kind` listener on `path`,
    /// bypassing the tree.
    pub fn inject(&self, path: &str, kind: ChildEventKind, notification: ChildNotification) {
        let path = normalize_path(path);
        let mut inner = self.inner.borrow_mut();
        let ids: Vec<u64> = inner
            .listeners
            .iter()
            .filter(|(_, listener)| {
                !listener.cancelled
                    && listener.query.path() == path
                    && matches!(&listener.callback, Callback::Child(k, _) if *k == kind)
            })
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            inner.queue.push_back(Delivery {
                id,
                payload: Payload::Child(notification.clone()),
            });
        }
    }

    /// Number of attached listeners, including pending single-shot reads.
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    /// Number of notifications waiting for [`flush`](MemoryStore::flush).
    pub fn pending(&self) -> usize {
        let inner = self.inner.borrow();
        inner.queue.len() + inner.deferred.len()
    }

    /// Deliver queued notifications until none are left, including those
    /// queued by the callbacks themselves. Returns how many were delivered.
    ///
    /// Calling `flush` from inside a callback is a no-op; the outer call keeps
    /// draining.
    pub fn flush(&self) -> usize {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.flushing {
                return 0;
            }
            inner.flushing = true;
        }
        let mut delivered = 0;
        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                inner.queue.pop_front().or_else(|| inner.deferred.pop_front())
            };
            let Some(delivery) = next else {
                break;
            };
            if self.deliver(delivery) {
                delivered += 1;
            }
        }
        self.inner.borrow_mut().flushing = false;
        delivered
    }

    fn deliver(&self, Delivery { id, payload }: Delivery) -> bool {
        let action = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let Some(listener) = inner.listeners.get(&id) else {
                return false;
            };
            if listener.cancelled && !matches!(payload, Payload::Failed(_)) {
                return false;
            }
            match payload {
                Payload::Failed(error) => match inner.listeners.remove(&id) {
                    Some(listener) => Action::Fail(listener.callback, error),
                    None => return false,
                },
                Payload::Read => {
                    let snapshots = window(&inner.root, &listener.query);
                    match inner.listeners.remove(&id) {
                        Some(Listener {
                            callback: Callback::Range(callback),
                            ..
                        }) => Action::Range(callback, snapshots),
                        _ => return false,
                    }
                }
                Payload::Child(notification) => match &listener.callback {
                    Callback::Child(_, callback) => Action::Child(callback.clone(), notification),
                    _ => return false,
                },
                Payload::Value(snapshot) => match &listener.callback {
                    Callback::Value(callback) => Action::Value(callback.clone(), snapshot),
                    _ => return false,
                },
            }
        };

        match action {
            Action::Child(callback, notification) => call(&callback, Ok(notification)),
            Action::Value(callback, snapshot) => call(&callback, Ok(Some(snapshot))),
            Action::Range(callback, snapshots) => callback(Ok(snapshots)),
            Action::Fail(callback, error) => match callback {
                Callback::Child(_, callback) => call(&callback, Err(error)),
                Callback::Value(callback) => call(&callback, Err(error)),
                Callback::Range(callback) => callback(Err(error)),
            },
        }
        true
    }

    fn listen(&self, query: &Query, callback: Callback) -> Unlisten {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            let replay = match &callback {
                Callback::Child(ChildEventKind::Added, _) => added_all(&window(&inner.root, query))
                    .map(Payload::Child)
                    .collect(),
                Callback::Value(_) => vec![Payload::Value(value_snapshot(&inner.root, query))],
                Callback::Range(_) => vec![Payload::Read],
                Callback::Child(..) => Vec::new(),
            };
            let deferred = inner.defer_reads && matches!(callback, Callback::Range(_));
            for payload in replay {
                let delivery = Delivery { id, payload };
                if deferred {
                    inner.deferred.push_back(delivery);
                } else {
                    inner.queue.push_back(delivery);
                }
            }
            inner.listeners.insert(
                id,
                Listener {
                    query: query.clone(),
                    callback,
                    cancelled: false,
                },
            );
            id
        };
        log::trace!("listener {id} attached to '{}'", query.path());

        let weak: Weak<RefCell<Inner>> = Rc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                let removed = inner.borrow_mut().listeners.remove(&id);
                if removed.is_some() {
                    log::trace!("listener {id} detached");
                }
                drop(removed);
            }
        })
    }

    fn write(&self, writes: Vec<(String, Value)>) {
        let mut inner = self.inner.borrow_mut();
        let before = inner.observe();
        for (path, value) in writes {
            let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
            write_at(&mut inner.root, &segments, prune(value));
        }
        let after = inner.observe();
        inner.enqueue_changes(before, after);
    }
}

fn call<A>(callback: &Rc<RefCell<Box<dyn FnMut(A)>>>, argument: A) {
    let mut callback = callback.borrow_mut();
    (*callback)(argument);
}

enum Action {
    Child(Rc<RefCell<ChildCallback>>, ChildNotification),
    Value(Rc<RefCell<ValueCallback>>, Snapshot),
    Range(RangeCallback, Vec<Snapshot>),
    Fail(Callback, Error),
}

impl Inner {
    fn observe(&self) -> HashMap<u64, Observed> {
        self.listeners
            .iter()
            .filter(|(_, listener)| !listener.cancelled)
            .filter_map(|(id, listener)| {
                let observed = match listener.callback {
                    Callback::Child(..) => Observed::Window(window(&self.root, &listener.query)),
                    Callback::Value(_) => Observed::Value(value_snapshot(&self.root, &listener.query)),
                    Callback::Range(_) => return None,
                };
                Some((*id, observed))
            })
            .collect()
    }

    /// Queue the notifications that turn `before` into `after`.
    ///
    /// Child listeners on the same query share one sequence: removals first,
    /// then additions and changes in the new window's order, each placed
    /// after its new predecessor. Applied in order, the sequence turns the
    /// old window into the new one. Value notifications come last.
    fn enqueue_changes(&mut self, mut before: HashMap<u64, Observed>, mut after: HashMap<u64, Observed>) {
        let mut groups: Vec<Group> = Vec::new();
        let mut values = Vec::new();

        for (id, listener) in &self.listeners {
            let (Some(old), Some(new)) = (before.remove(id), after.remove(id)) else {
                continue;
            };
            match (&listener.callback, old, new) {
                (Callback::Value(_), Observed::Value(old), Observed::Value(new)) => {
                    if old != new {
                        values.push(Delivery {
                            id: *id,
                            payload: Payload::Value(new),
                        });
                    }
                }
                (Callback::Child(kind, _), Observed::Window(old), Observed::Window(new)) => {
                    match groups.iter_mut().find(|group| group.query == listener.query) {
                        Some(group) => group.listeners.push((*id, *kind)),
                        None => groups.push(Group {
                            query: listener.query.clone(),
                            listeners: vec![(*id, *kind)],
                            old,
                            new,
                        }),
                    }
                }
                _ => {}
            }
        }

        for group in groups {
            for (kind, notification) in diff(&group.old, &group.new) {
                for (id, _) in group.listeners.iter().filter(|(_, k)| *k == kind) {
                    self.queue.push_back(Delivery {
                        id: *id,
                        payload: Payload::Child(notification.clone()),
                    });
                }
            }
        }
        self.queue.extend(values);
    }
}

/// The child listeners of one query, with the window they saw before and
/// after a write.
struct Group {
    query: Query,
    listeners: Vec<(u64, ChildEventKind)>,
    old: Vec<Snapshot>,
    new: Vec<Snapshot>,
}

/// The child notifications that take a window from `old` to `new`.
fn diff(old: &[Snapshot], new: &[Snapshot]) -> Vec<(ChildEventKind, ChildNotification)> {
    let old_by_key: HashMap<&str, &Snapshot> = old.iter().map(|s| (s.key(), s)).collect();
    let new_keys: HashSet<&str> = new.iter().map(Snapshot::key).collect();
    let removed = old
        .iter()
        .filter(|snapshot| !new_keys.contains(snapshot.key()))
        .map(|snapshot| (ChildEventKind::Removed, ChildNotification::new(snapshot.clone(), None)));
    let placed = with_preceding(new).filter_map(|(snapshot, preceding)| {
        let kind = match old_by_key.get(snapshot.key()) {
            None => ChildEventKind::Added,
            Some(previous) if previous.value() != snapshot.value() => ChildEventKind::Changed,
            Some(_) => return None,
        };
        Some((kind, ChildNotification::new(snapshot.clone(), preceding)))
    });
    removed.chain(placed).collect()
}

fn with_preceding(window: &[Snapshot]) -> impl Iterator<Item = (&Snapshot, Option<String>)> {
    window.iter().enumerate().map(move |(index, snapshot)| {
        let preceding = index
            .checked_sub(1)
            .map(|previous| window[previous].key().to_string());
        (snapshot, preceding)
    })
}

fn added_all(window: &[Snapshot]) -> impl Iterator<Item = ChildNotification> + '_ {
    with_preceding(window).map(|(snapshot, preceding)| ChildNotification::new(snapshot.clone(), preceding))
}

fn value_at<'a>(root: &'a Value, path: &str) -> &'a Value {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .try_fold(root, |node, segment| node.get(segment))
        .unwrap_or(&NULL)
}

fn value_snapshot(root: &Value, query: &Query) -> Snapshot {
    if query.is_reference() {
        return Snapshot::new(query.key(), value_at(root, query.path()).clone());
    }
    let children: Map<String, Value> = window(root, query)
        .into_iter()
        .map(|snapshot| (snapshot.key().to_string(), snapshot.into_value()))
        .collect();
    let value = if children.is_empty() {
        Value::Null
    } else {
        Value::Object(children)
    };
    Snapshot::new(query.key(), value)
}

/// Evaluate `query` against the tree: order, range, then limit.
fn window(root: &Value, query: &Query) -> Vec<Snapshot> {
    let Value::Object(children) = value_at(root, query.path()) else {
        return Vec::new();
    };
    let order = query.order();
    let mut snapshots: Vec<Snapshot> = children
        .iter()
        .map(|(key, value)| Snapshot::new(key.as_str(), value.clone()))
        .filter(|snapshot| query.start().is_none_or(|bound| after_start(order, snapshot, bound)))
        .filter(|snapshot| query.end().is_none_or(|bound| before_end(order, snapshot, bound)))
        .collect();
    snapshots.sort_by(|a, b| compare_children(order, a, b));
    match query.limit() {
        Some(Limit::First(n)) => snapshots.truncate(n),
        Some(Limit::Last(n)) => {
            let skip = snapshots.len().saturating_sub(n);
            snapshots.drain(..skip);
        }
        None => {}
    }
    snapshots
}

fn compare_children(order: &Order, a: &Snapshot, b: &Snapshot) -> Ordering {
    match order {
        Order::Default | Order::Key => compare_keys(a.key(), b.key()),
        _ => compare_values(ordering_value(order, a), ordering_value(order, b))
            .then_with(|| compare_keys(a.key(), b.key())),
    }
}

fn ordering_value<'a>(order: &Order, snapshot: &'a Snapshot) -> &'a Value {
    match order {
        Order::Child(path) => snapshot.child(path).unwrap_or(&NULL),
        Order::Value => snapshot.value(),
        Order::Priority => snapshot.value().get(".priority").unwrap_or(&NULL),
        Order::Default | Order::Key => &NULL,
    }
}

fn after_start(order: &Order, snapshot: &Snapshot, bound: &Bound) -> bool {
    bound_cmp(order, snapshot, bound, Ordering::Less) != Ordering::Less
}

fn before_end(order: &Order, snapshot: &Snapshot, bound: &Bound) -> bool {
    bound_cmp(order, snapshot, bound, Ordering::Greater) != Ordering::Greater
}

/// Compare a child with a boundary. A missing tiebreak key compares as
/// `open`, so equal values are always inside the range.
fn bound_cmp(order: &Order, snapshot: &Snapshot, bound: &Bound, open: Ordering) -> Ordering {
    match order {
        Order::Default | Order::Key => match bound.value() {
            Value::Null => open.reverse(),
            value => compare_keys(snapshot.key(), &bound_key(value)),
        },
        _ => compare_values(ordering_value(order, snapshot), bound.value()).then_with(|| {
            match bound.key() {
                Some(key) => compare_keys(snapshot.key(), key),
                None => open.reverse(),
            }
        }),
    }
}

fn bound_key(value: &Value) -> String {
    match value {
        Value::String(key) => key.clone(),
        other => other.to_string(),
    }
}

fn integer_key(key: &str) -> Option<i64> {
    let parsed: i32 = key.parse().ok()?;
    (parsed.to_string() == key).then_some(i64::from(parsed))
}

/// Key order: 32-bit integer keys first, numerically, then the rest
/// lexicographically.
pub(crate) fn compare_keys(a: &str, b: &str) -> Ordering {
    match (integer_key(a), integer_key(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) | Value::Object(_) => 5,
    }
}

/// Value order: null, false, true, numbers, strings, then objects (which
/// compare equal to each other).
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    rank(a).cmp(&rank(b)).then_with(|| match (a, b) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or_default();
            let b = b.as_f64().unwrap_or_default();
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => Ordering::Equal,
    })
}

/// Drop `null` members and empty objects, the way the store never keeps them.
fn prune(value: Value) -> Value {
    match value {
        Value::Object(members) => {
            let members: Map<String, Value> = members
                .into_iter()
                .map(|(key, value)| (key, prune(value)))
                .filter(|(_, value)| !value.is_null())
                .collect();
            if members.is_empty() {
                Value::Null
            } else {
                Value::Object(members)
            }
        }
        other => other,
    }
}

fn write_at(node: &mut Value, segments: &[&str], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    let Value::Object(members) = node else {
        return;
    };
    if rest.is_empty() {
        if value.is_null() {
            members.remove(*first);
        } else {
            members.insert((*first).to_string(), value);
        }
    } else {
        let child = members.entry((*first).to_string()).or_insert(Value::Null);
        write_at(child, rest, value);
        if child.is_null() {
            members.remove(*first);
        }
    }
    if members.is_empty() {
        *node = Value::Null;
    }
}

impl ChangeSource for MemoryStore {
    fn once_range(&self, query: &Query, callback: RangeCallback) -> Unlisten {
        self.listen(query, Callback::Range(callback))
    }

    fn on_child(&self, query: &Query, kind: ChildEventKind, callback: ChildCallback) -> Unlisten {
        self.listen(query, Callback::Child(kind, Rc::new(RefCell::new(callback))))
    }

    fn on_value(&self, query: &Query, callback: ValueCallback) -> Unlisten {
        self.listen(query, Callback::Value(Rc::new(RefCell::new(callback))))
    }
}
