//! Live collections folded from event streams.

use crate::error::{Error, Result};
use crate::event::{EventFilter, ListEvent, MapEvent};
use crate::list_event::{self, ListEventStream};
use crate::map_event::{self, MapEventStream};
use crate::observable::{Notification, Observable, Subscriber};
use crate::query::Query;
use crate::snapshot::Snapshot;
use crate::store::ChangeSource;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Turns a snapshot into an element.
pub type Selector<T> = Rc<dyn Fn(&Snapshot) -> T>;

/// Extracts the identity of an element.
pub type KeySelector<T> = Rc<dyn Fn(&T) -> String>;

/// Fold one list event into the current elements.
///
/// Reducers take owned state and return owned state, so a view can move its
/// accumulator through them without cloning.
pub fn reduce_list<T>(
    mut elements: Vec<T>,
    event: ListEvent,
    value_selector: &dyn Fn(&Snapshot) -> T,
    key_selector: &dyn Fn(&T) -> String,
) -> Vec<T> {
    match event {
        ListEvent::Loaded { list } => list_event::on_loaded(&list, value_selector),
        ListEvent::Added {
            snapshot,
            preceding_key,
        } => {
            list_event::on_added(
                &mut elements,
                value_selector(&snapshot),
                preceding_key.as_deref(),
                key_selector,
            );
            elements
        }
        ListEvent::Changed {
            snapshot,
            preceding_key,
        } => {
            list_event::on_changed(
                &mut elements,
                value_selector(&snapshot),
                preceding_key.as_deref(),
                key_selector,
            );
            elements
        }
        ListEvent::Removed { snapshot } => {
            list_event::on_removed(&mut elements, snapshot.key(), key_selector);
            elements
        }
    }
}

/// Fold one map event into the current entries.
pub fn reduce_map<T>(
    mut entries: BTreeMap<String, T>,
    event: MapEvent,
    value_selector: &dyn Fn(&Snapshot) -> T,
) -> BTreeMap<String, T> {
    match event {
        MapEvent::Loaded { map } => map
            .iter()
            .map(|(key, snapshot)| (key.clone(), value_selector(snapshot)))
            .collect(),
        MapEvent::Added { snapshot } | MapEvent::Changed { snapshot } => {
            map_event::on_upserted(&mut entries, snapshot.key(), value_selector(&snapshot));
            entries
        }
        MapEvent::Removed { snapshot } => {
            map_event::on_deleted(&mut entries, snapshot.key());
            entries
        }
    }
}

/// Run `events` through `reduce`, emitting the accumulated state after every
/// event.
fn fold<E, S>(events: Observable<E>, reduce: impl Fn(S, E) -> S + 'static) -> Observable<S>
where
    E: 'static,
    S: Clone + Default + 'static,
{
    let reduce = Rc::new(reduce);
    Observable::new(move |downstream: &Subscriber<S>| {
        let state = Rc::new(RefCell::new(S::default()));
        let reduce = reduce.clone();
        let sink = downstream.clone();
        let upstream = events.subscribe(move |notification| match notification {
            Notification::Next(event) => {
                let next = {
                    let mut state = state.borrow_mut();
                    let current = std::mem::take(&mut *state);
                    *state = reduce(current, event);
                    (*state).clone()
                };
                sink.next(next);
            }
            Notification::Error(error) => sink.error(error),
            Notification::Complete => sink.complete(),
        });
        downstream.add_subscription(upstream);
    })
}

/// A live, ordered list of the children of a query.
///
/// Emits the whole list once the query has loaded and again after every
/// addition, change or removal.
pub struct ListView;

impl ListView {
    pub fn create<T: Clone + 'static>(
        source: Rc<dyn ChangeSource>,
        query: Query,
        value_selector: impl Fn(&Snapshot) -> T + 'static,
        key_selector: impl Fn(&T) -> String + 'static,
    ) -> Observable<Vec<T>> {
        let value_selector: Selector<T> = Rc::new(value_selector);
        let key_selector: KeySelector<T> = Rc::new(key_selector);
        let events = ListEventStream::create(source, query, EventFilter::default());
        fold(events, move |elements, event| {
            reduce_list(elements, event, &*value_selector, &*key_selector)
        })
    }
}

/// A live map of the children of a query, by key.
pub struct MapView;

impl MapView {
    pub fn create<T: Clone + 'static>(
        source: Rc<dyn ChangeSource>,
        query: Query,
        value_selector: impl Fn(&Snapshot) -> T + 'static,
    ) -> Observable<BTreeMap<String, T>> {
        let value_selector: Selector<T> = Rc::new(value_selector);
        let events = MapEventStream::create(source, query, EventFilter::default());
        fold(events, move |entries, event| {
            reduce_map(entries, event, &*value_selector)
        })
    }
}

/// The live value of a query as a whole.
///
/// Emits the current value on subscription and again whenever it changes.
pub struct ValueView;

impl ValueView {
    pub fn create<T: 'static>(
        source: Rc<dyn ChangeSource>,
        query: Query,
        selector: impl Fn(&Snapshot) -> T + 'static,
    ) -> Observable<T> {
        let selector: Selector<T> = Rc::new(selector);
        Observable::new(move |subscriber: &Subscriber<T>| {
            let sink = subscriber.clone();
            let selector = selector.clone();
            let unlisten = source.on_value(
                &query,
                Box::new(move |result: Result<Option<Snapshot>>| match result {
                    Ok(Some(snapshot)) => sink.next(selector(&snapshot)),
                    Ok(None) => sink.error(Error::NullSnapshot),
                    Err(error) => sink.error(error),
                }),
            );
            subscriber.add(unlisten);
        })
    }
}
