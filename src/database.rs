use crate::error::Result;
use crate::event::{EventFilter, ListEvent, MapEvent};
use crate::infinite::{InfiniteList, InfiniteListOptions};
use crate::info::{Info, InfoView};
use crate::keyed::{select_key, select_keyed_value, select_value, KeyedValue};
use crate::list_event::ListEventStream;
use crate::map_event::MapEventStream;
use crate::observable::Observable;
use crate::query::{Query, QueryOptions};
use crate::snapshot::Snapshot;
use crate::store::ChangeSource;
use crate::view::{ListView, MapView, ValueView};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Entry point over one change source.
///
/// Hands out live views with the default selectors: lists of
/// [`KeyedValue`]s, maps and values of plain JSON. The `_with` variants take
/// custom selectors.
#[derive(Clone)]
pub struct Database {
    source: Rc<dyn ChangeSource>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    pub fn new(source: Rc<dyn ChangeSource>) -> Self {
        Database { source }
    }

    pub fn source(&self) -> Rc<dyn ChangeSource> {
        self.source.clone()
    }

    /// An unconstrained query over `path`.
    pub fn reference(&self, path: &str) -> Query {
        Query::new(path)
    }

    /// Build a query over `path` from `options`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MultipleOrderings`](crate::Error::MultipleOrderings)
    /// if `options` names more than one ordering.
    pub fn query(&self, path: &str, options: &QueryOptions) -> Result<Query> {
        Query::with_options(path, options)
    }

    /// The live, ordered children of `query` as `$key`/`$value` pairs.
    pub fn list(&self, query: Query) -> Observable<Vec<KeyedValue>> {
        self.list_with(query, select_keyed_value, select_key)
    }

    pub fn list_with<T: Clone + 'static>(
        &self,
        query: Query,
        value_selector: impl Fn(&Snapshot) -> T + 'static,
        key_selector: impl Fn(&T) -> String + 'static,
    ) -> Observable<Vec<T>> {
        ListView::create(self.source.clone(), query, value_selector, key_selector)
    }

    /// The live children of `query`, by key.
    pub fn map(&self, query: Query) -> Observable<BTreeMap<String, Value>> {
        self.map_with(query, select_value)
    }

    pub fn map_with<T: Clone + 'static>(
        &self,
        query: Query,
        value_selector: impl Fn(&Snapshot) -> T + 'static,
    ) -> Observable<BTreeMap<String, T>> {
        MapView::create(self.source.clone(), query, value_selector)
    }

    /// The live value at `query`.
    pub fn value(&self, query: Query) -> Observable<Value> {
        ValueView::create(self.source.clone(), query, select_value)
    }

    /// The live connection state of the store.
    pub fn info(&self) -> Observable<Info> {
        InfoView::create(self.source.clone())
    }

    pub fn list_events(&self, query: Query, filter: EventFilter) -> Observable<ListEvent> {
        ListEventStream::create(self.source.clone(), query, filter)
    }

    pub fn map_events(&self, query: Query, filter: EventFilter) -> Observable<MapEvent> {
        MapEventStream::create(self.source.clone(), query, filter)
    }

    /// An infinite list of `$key`/`$value` pairs over the children of
    /// `reference`, one page per value on `load_more`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `options` is invalid.
    pub fn infinite_list<S: 'static>(
        &self,
        reference: Query,
        load_more: Observable<S>,
        options: InfiniteListOptions,
    ) -> Result<Observable<Vec<KeyedValue>>> {
        self.infinite_list_with(reference, load_more, select_keyed_value, select_key, options)
    }

    pub fn infinite_list_with<T, S>(
        &self,
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
        InfiniteList::create(
            self.source.clone(),
            reference,
            load_more,
            value_selector,
            key_selector,
            options,
        )
    }
}
