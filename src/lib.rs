//! Reactive lists, maps and infinite lists over a realtime tree store.
//!
//! A [`ChangeSource`] reports child additions, changes and removals on a
//! query. This crate turns those callbacks into [`Observable`] streams:
//!
//! - [`ListEventStream`] and [`MapEventStream`] emit a single `Loaded`
//!   checkpoint with a consistent initial read, then the individual changes.
//! - [`ListView`], [`MapView`] and [`ValueView`] fold those events into live
//!   collections. [`InfoView`] follows the store's connection state.
//! - [`InfiniteList`] loads an ordered list one page per load-more signal and
//!   keeps the loaded pages in sync.
//!
//! [`MemoryStore`] is an in-process source with an explicit delivery queue,
//! and [`Database`] bundles the views with their default selectors.
//!
//! ```
//! use livefold::{Database, MemoryStore, Notification};
//! use serde_json::json;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let store = MemoryStore::new();
//! store.set("items", json!({"a": 1, "b": 2}));
//! let database = Database::new(store.source());
//!
//! let keys = Rc::new(RefCell::new(Vec::new()));
//! let sink = keys.clone();
//! let _subscription = database
//!     .list(database.reference("items"))
//!     .subscribe(move |notification| {
//!         if let Notification::Next(list) = notification {
//!             let list: Vec<String> = list.iter().map(|v| v.key().to_string()).collect();
//!             sink.borrow_mut().push(list);
//!         }
//!     });
//!
//! store.flush();
//! store.set("items/c", json!(3));
//! store.flush();
//! assert_eq!(*keys.borrow(), vec![vec!["a", "b"], vec!["a", "b", "c"]]);
//! ```

mod checkpoint;
mod database;
mod error;
mod event;
mod infinite;
mod info;
pub mod keyed;
pub mod list_event;
pub mod map_event;
mod memory;
mod observable;
mod query;
pub mod snapshot;
mod store;
mod view;

pub use database::Database;
pub use error::{Error, Result};
pub use event::{EventFilter, ListEvent, MapEvent};
pub use infinite::{InfiniteList, InfiniteListOptions, InfiniteListQuery, DEFAULT_PAGE_SIZE};
pub use info::{Info, InfoView, INFO_PATH};
pub use keyed::{select_key, select_keyed_value, select_value, KeyedValue};
pub use list_event::ListEventStream;
pub use map_event::MapEventStream;
pub use memory::MemoryStore;
pub use observable::{Notification, Observable, Observer, Subject, Subscriber, Subscription, Teardown};
pub use query::{Bound, Limit, Order, Query, QueryOptions};
pub use snapshot::Snapshot;
pub use store::{
    ChangeSource, ChildCallback, ChildEventKind, ChildNotification, RangeCallback, Unlisten,
    ValueCallback,
};
pub use view::{reduce_list, reduce_map, KeySelector, ListView, MapView, Selector, ValueView};
