//! Infinite lists: an ordered list that grows one page at a time.
//!
//! Each value on the load-more signal requests one more page. Pages are
//! requested strictly one after another, since a page's query starts where the
//! previous page ended: the cursor of page *N + 1* is only known once page *N*
//! has loaded. Signals that arrive early wait in a `PageQueue` until the
//! cursor they need has been resolved.
//!
//! Realtime lists keep every loaded page in sync with later additions, changes
//! and removals. Frozen lists read each page once.

mod frozen;
mod realtime;

use crate::error::{Error, Result};
use crate::observable::Observable;
use crate::query::{Bound, Query};
use crate::snapshot::Snapshot;
use crate::store::ChangeSource;
use crate::view::{KeySelector, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::rc::Rc;

/// Page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: usize = 10;

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_true() -> bool {
    true
}

/// The ordering an infinite list pages through. Exactly one must be set.
///
/// Without a query the list pages by key; a deserialized query only sets the
/// orderings it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfiniteListQuery {
    #[serde(default)]
    pub order_by_key: bool,
    #[serde(default)]
    pub order_by_child: Option<String>,
}

impl Default for InfiniteListQuery {
    fn default() -> Self {
        InfiniteListQuery {
            order_by_key: true,
            order_by_child: None,
        }
    }
}

/// Options of an [`InfiniteList`].
///
/// ```
/// use livefold::InfiniteListOptions;
/// use serde_json::json;
///
/// let options: InfiniteListOptions = serde_json::from_value(json!({
///     "pageSize": 3,
///     "query": {"orderByChild": "number"},
///     "reverse": true
/// }))
/// .unwrap();
/// assert_eq!(options, InfiniteListOptions::default().page_size(3).order_by_child("number").reverse(true));
/// assert!(options.realtime);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InfiniteListOptions {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    pub query: InfiniteListQuery,
    /// Keep loaded pages in sync after they load.
    #[serde(default = "default_true")]
    pub realtime: bool,
    /// Page from the end of the ordering backwards, emitting in descending
    /// order.
    pub reverse: bool,
}

impl Default for InfiniteListOptions {
    fn default() -> Self {
        InfiniteListOptions {
            page_size: DEFAULT_PAGE_SIZE,
            query: InfiniteListQuery::default(),
            realtime: true,
            reverse: false,
        }
    }
}

impl InfiniteListOptions {
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Page by key. Clears any child ordering.
    pub fn order_by_key(mut self) -> Self {
        self.query = InfiniteListQuery {
            order_by_key: true,
            order_by_child: None,
        };
        self
    }

    /// Page by the value at `child`. Clears key ordering.
    pub fn order_by_child(mut self, child: &str) -> Self {
        self.query = InfiniteListQuery {
            order_by_key: false,
            order_by_child: Some(child.to_string()),
        };
        self
    }

    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    fn page_order(&self) -> Result<PageOrder> {
        if self.page_size == 0 {
            return Err(Error::InvalidPageSize(self.page_size));
        }
        match (&self.query.order_by_child, self.query.order_by_key) {
            (Some(_), true) => Err(Error::MultipleOrderings),
            (Some(child), false) => Ok(PageOrder::Child(child.clone())),
            (None, true) => Ok(PageOrder::Key),
            (None, false) => Err(Error::UnsupportedOrder),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PageOrder {
    Key,
    Child(String),
}

/// Where the next page starts: the position of the boundary element of the
/// page before it.
#[derive(Debug, Clone, PartialEq)]
enum Cursor {
    Key(String),
    Child { value: Value, key: String },
}

impl Cursor {
    fn of(order: &PageOrder, snapshot: &Snapshot) -> Self {
        match order {
            PageOrder::Key => Cursor::Key(snapshot.key().to_string()),
            PageOrder::Child(path) => Cursor::Child {
                value: snapshot.child(path).cloned().unwrap_or(Value::Null),
                key: snapshot.key().to_string(),
            },
        }
    }

    /// Key of the snapshot the cursor was taken from.
    fn key(&self) -> &str {
        match self {
            Cursor::Key(key) | Cursor::Child { key, .. } => key,
        }
    }

    fn bound(&self) -> Bound {
        match self {
            Cursor::Key(key) => Bound::Value(Value::String(key.clone())),
            Cursor::Child { value, key } => Bound::Keyed {
                value: value.clone(),
                key: key.clone(),
            },
        }
    }
}

/// An element of a page, with its identity and its paging position.
struct Entry<T> {
    key: String,
    cursor: Cursor,
    value: T,
}

/// Turns page requests into queries and page reads into entries.
struct Pager<T> {
    base: Query,
    order: PageOrder,
    page_size: usize,
    reverse: bool,
    value_selector: Selector<T>,
    key_selector: KeySelector<T>,
}

impl<T> Pager<T> {
    /// The window of the page that starts at `cursor`. The boundary element is
    /// read again, so the limit grows by one when there is a cursor.
    fn page_query(&self, cursor: Option<&Cursor>) -> Query {
        let limit = self.page_size + usize::from(cursor.is_some());
        let query = self.base.clone();
        match (cursor, self.reverse) {
            (Some(cursor), false) => query.start_at(cursor.bound()).limit_to_first(limit),
            (None, false) => query.limit_to_first(limit),
            (Some(cursor), true) => query.end_at(cursor.bound()).limit_to_last(limit),
            (None, true) => query.limit_to_last(limit),
        }
    }

    fn entry(&self, snapshot: &Snapshot) -> Entry<T> {
        let value = (self.value_selector)(snapshot);
        Entry {
            key: (self.key_selector)(&value),
            cursor: Cursor::of(&self.order, snapshot),
            value,
        }
    }

    /// The entries of a loaded page in query order, without the boundary
    /// element shared with the previous page.
    fn entries(&self, snapshots: &[Snapshot], cursor: Option<&Cursor>) -> Vec<Entry<T>> {
        let mut entries: Vec<Entry<T>> = snapshots.iter().map(|s| self.entry(s)).collect();
        if let Some(cursor) = cursor {
            let boundary = if self.reverse {
                entries.len().checked_sub(1)
            } else if entries.is_empty() {
                None
            } else {
                Some(0)
            };
            if let Some(index) = boundary.filter(|&index| entries[index].cursor.key() == cursor.key()) {
                entries.remove(index);
            }
        }
        entries
    }

    /// The cursor the page after `entries` starts from. An empty page leaves
    /// the cursor where it was.
    fn next_cursor(&self, entries: &[Entry<T>], previous: Option<Cursor>) -> Option<Cursor> {
        let boundary = if self.reverse {
            entries.first()
        } else {
            entries.last()
        };
        boundary.map(|entry| entry.cursor.clone()).or(previous)
    }
}

/// Pairs load-more signals with resolved cursors, one page at a time.
#[derive(Debug)]
struct PageQueue {
    signals: usize,
    cursors: VecDeque<Option<Cursor>>,
    next_index: usize,
}

impl PageQueue {
    fn new() -> Self {
        PageQueue {
            signals: 0,
            cursors: VecDeque::from([None]),
            next_index: 0,
        }
    }

    fn signal(&mut self) {
        self.signals += 1;
    }

    fn resolve(&mut self, cursor: Option<Cursor>) {
        self.cursors.push_back(cursor);
    }

    /// The next page to request, if a signal and its cursor are both ready.
    fn take(&mut self) -> Option<(usize, Option<Cursor>)> {
        if self.signals == 0 {
            return None;
        }
        let cursor = self.cursors.pop_front()?;
        self.signals -= 1;
        let index = self.next_index;
        self.next_index += 1;
        Some((index, cursor))
    }

    /// Returns `true` while a requested page has not yet resolved its cursor.
    fn in_flight(&self) -> bool {
        self.cursors.is_empty()
    }

    /// Returns `true` once every signal has been served and no page is loading.
    fn idle(&self) -> bool {
        self.signals == 0 && !self.in_flight()
    }
}

/// A list that loads a page for every value on a load-more signal.
///
/// # Examples
///
/// ```
/// use livefold::{
///     select_key, select_keyed_value, InfiniteList, InfiniteListOptions, MemoryStore,
///     Notification, Query, Subject,
/// };
/// use serde_json::json;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let store = MemoryStore::new();
/// store.set("items", json!({"a": 1, "b": 2, "c": 3}));
///
/// let load_more = Subject::new();
/// let list = InfiniteList::create(
///     store.source(),
///     Query::new("items"),
///     load_more.as_observable(),
///     select_keyed_value,
///     select_key,
///     InfiniteListOptions::default().page_size(2),
/// )
/// .unwrap();
///
/// let sizes = Rc::new(RefCell::new(Vec::new()));
/// let sink = sizes.clone();
/// let _subscription = list.subscribe(move |notification| {
///     if let Notification::Next(elements) = notification {
///         sink.borrow_mut().push(elements.len());
///     }
/// });
///
/// load_more.next(());
/// store.flush();
/// load_more.next(());
/// store.flush();
/// assert_eq!(*sizes.borrow(), vec![2, 3]);
/// ```
pub struct InfiniteList;

impl InfiniteList {
    /// Create an infinite list over the children of `reference`.
    ///
    /// Any ordering or range on `reference` is replaced by the ordering in
    /// `options`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `options` names no ordering, both
    /// orderings, or a page size of zero.
    pub fn create<T, S>(
        source: Rc<dyn ChangeSource>,
        reference: Query,
        load_more: Observable<S>,
        value_selector: impl Fn(&Snapshot) -> T + 'static,
        key_selector: impl Fn(&T) -> String + 'static,
        options: InfiniteListOptions,
    ) -> Result<Observable<Vec<T>>>
    where
        T: Clone + 'static,
        S: 'static,
    {
        let order = options.page_order()?;
        let base = match &order {
            PageOrder::Key => reference.reference().order_by_key(),
            PageOrder::Child(child) => reference.reference().order_by_child(child),
        };
        let pager = Rc::new(Pager {
            base,
            order,
            page_size: options.page_size,
            reverse: options.reverse,
            value_selector: Rc::new(value_selector),
            key_selector: Rc::new(key_selector),
        });
        log::debug!(
            "infinite list over '{}': page size {}, realtime {}, reverse {}",
            reference.path(),
            options.page_size,
            options.realtime,
            options.reverse
        );
        Ok(if options.realtime {
            realtime::list(source, pager, load_more)
        } else {
            frozen::list(source, pager, load_more)
        })
    }
}
