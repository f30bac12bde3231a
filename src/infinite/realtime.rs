//! Realtime paging: loaded pages stay in sync with the store.
//!
//! Every page keeps an added-listener on its own window, so elements that
//! enter a page after it loaded are inserted there. Changes and removals are
//! watched once, on the unlimited base query, and applied across all pages.
//!
//! Pages hold their entries in query order; reverse lists flip each page when
//! emitting.

use super::{Cursor, Entry, PageQueue, Pager};
use crate::event::{EventFilter, ListEvent};
use crate::list_event::ListEventStream;
use crate::observable::{Notification, Observable, Subscriber, Subscription};
use crate::snapshot::Snapshot;
use crate::store::ChangeSource;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

struct Page<T> {
    index: usize,
    /// The cursor the page was requested with.
    cursor: Option<Cursor>,
    entries: Vec<Entry<T>>,
    loaded_empty: bool,
}

impl<T> Page<T> {
    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.key == key)
    }
}

struct State<T> {
    queue: PageQueue,
    /// Loaded pages, by request index.
    pages: Vec<Page<T>>,
    page_subscriptions: HashMap<usize, Subscription>,
    detached: HashSet<usize>,
    base_subscriptions: Vec<Subscription>,
    signal: Option<Subscription>,
    requesting: bool,
    cancelled: bool,
}

enum Outcome<T> {
    Emit(Vec<T>),
    Detach(Option<Subscription>),
    Ignore,
}

struct Realtime<T> {
    source: Rc<dyn ChangeSource>,
    pager: Rc<Pager<T>>,
    subscriber: Subscriber<Vec<T>>,
    state: RefCell<State<T>>,
}

pub(super) fn list<T, S>(
    source: Rc<dyn ChangeSource>,
    pager: Rc<Pager<T>>,
    load_more: Observable<S>,
) -> Observable<Vec<T>>
where
    T: Clone + 'static,
    S: 'static,
{
    Observable::new(move |subscriber: &Subscriber<Vec<T>>| {
        let list = Rc::new(Realtime {
            source: source.clone(),
            pager: pager.clone(),
            subscriber: subscriber.clone(),
            state: RefCell::new(State {
                queue: PageQueue::new(),
                pages: Vec::new(),
                page_subscriptions: HashMap::new(),
                detached: HashSet::new(),
                base_subscriptions: Vec::new(),
                signal: None,
                requesting: false,
                cancelled: false,
            }),
        });
        let teardown = list.clone();
        subscriber.add(move || teardown.cancel());

        list.watch_base();

        let weak = Rc::downgrade(&list);
        let sink = subscriber.clone();
        let signal = load_more.subscribe(move |notification| match notification {
            Notification::Next(_) => {
                if let Some(list) = weak.upgrade() {
                    list.request();
                }
            }
            Notification::Error(error) => sink.error(error),
            Notification::Complete => {}
        });
        let rejected = {
            let mut state = list.state.borrow_mut();
            if state.cancelled {
                Some(signal)
            } else {
                state.signal = Some(signal);
                None
            }
        };
        drop(rejected);
    })
}

impl<T: Clone + 'static> Realtime<T> {
    fn watch_base(self: &Rc<Self>) {
        let filters = [
            EventFilter::none().with_changed(),
            EventFilter::none().with_removed(),
        ];
        for filter in filters {
            let weak = Rc::downgrade(self);
            let subscription =
                ListEventStream::create(self.source.clone(), self.pager.base.clone(), filter)
                    .subscribe(move |notification| {
                        if let Some(list) = weak.upgrade() {
                            list.on_base(notification);
                        }
                    });
            let rejected = {
                let mut state = self.state.borrow_mut();
                if state.cancelled {
                    Some(subscription)
                } else {
                    state.base_subscriptions.push(subscription);
                    None
                }
            };
            drop(rejected);
        }
    }

    fn request(self: &Rc<Self>) {
        {
            let mut state = self.state.borrow_mut();
            if state.cancelled {
                return;
            }
            state.queue.signal();
        }
        self.start_pages();
    }

    /// Open every page whose signal and cursor are both available. Pages
    /// resolved while this runs are picked up by the same loop.
    fn start_pages(self: &Rc<Self>) {
        {
            let mut state = self.state.borrow_mut();
            if state.requesting {
                return;
            }
            state.requesting = true;
        }
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                if state.cancelled {
                    None
                } else {
                    state.queue.take()
                }
            };
            let Some((index, cursor)) = next else {
                break;
            };
            self.open_page(index, cursor);
        }
        self.state.borrow_mut().requesting = false;
    }

    fn open_page(self: &Rc<Self>, index: usize, cursor: Option<Cursor>) {
        let query = self.pager.page_query(cursor.as_ref());
        log::debug!("requesting page {index} of '{}'", query.path());

        let weak = Rc::downgrade(self);
        let filter = EventFilter::none().with_added().with_loaded();
        let subscription = ListEventStream::create(self.source.clone(), query, filter).subscribe(
            move |notification| {
                if let Some(list) = weak.upgrade() {
                    list.on_page(index, &cursor, notification);
                }
            },
        );

        let rejected = {
            let mut state = self.state.borrow_mut();
            if state.cancelled || state.detached.contains(&index) {
                Some(subscription)
            } else {
                state.page_subscriptions.insert(index, subscription);
                None
            }
        };
        drop(rejected);
    }

    fn on_page(
        self: &Rc<Self>,
        index: usize,
        cursor: &Option<Cursor>,
        notification: Notification<ListEvent>,
    ) {
        match notification {
            Notification::Next(ListEvent::Loaded { list }) => {
                self.on_loaded(index, cursor.clone(), &list)
            }
            Notification::Next(ListEvent::Added {
                snapshot,
                preceding_key,
            }) => self.on_added(index, &snapshot, preceding_key.as_deref()),
            Notification::Next(_) | Notification::Complete => {}
            Notification::Error(error) => self.subscriber.error(error),
        }
    }

    fn on_base(&self, notification: Notification<ListEvent>) {
        match notification {
            Notification::Next(ListEvent::Changed {
                snapshot,
                preceding_key,
            }) => self.on_changed(&snapshot, preceding_key.as_deref()),
            Notification::Next(ListEvent::Removed { snapshot }) => self.on_removed(&snapshot),
            Notification::Next(_) | Notification::Complete => {}
            Notification::Error(error) => self.subscriber.error(error),
        }
    }

    fn on_loaded(self: &Rc<Self>, index: usize, cursor: Option<Cursor>, snapshots: &[Snapshot]) {
        let mut entries = self.pager.entries(snapshots, cursor.as_ref());
        let next_cursor = self.pager.next_cursor(&entries, cursor.clone());
        let elements = {
            let mut state = self.state.borrow_mut();
            if state.cancelled {
                return;
            }
            // A boundary element that changed in place can fall inside this
            // page's window as well.
            entries.retain(|entry| {
                state
                    .pages
                    .iter()
                    .all(|page| page.position(&entry.key).is_none())
            });
            log::debug!("page {index} loaded with {} element(s)", entries.len());
            let position = state
                .pages
                .iter()
                .position(|page| page.index > index)
                .unwrap_or(state.pages.len());
            let loaded_empty = entries.is_empty();
            state.pages.insert(
                position,
                Page {
                    index,
                    cursor,
                    entries,
                    loaded_empty,
                },
            );
            state.queue.resolve(next_cursor);
            self.flatten(&state.pages)
        };
        self.subscriber.next(elements);
        self.start_pages();
    }

    fn on_added(&self, index: usize, snapshot: &Snapshot, preceding_key: Option<&str>) {
        let entry = self.pager.entry(snapshot);
        let outcome = {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;
            if state.cancelled {
                return;
            }
            match state.pages.iter().position(|page| page.index == index) {
                None => Outcome::Ignore,
                Some(position) if state.pages[position].loaded_empty => {
                    state.detached.insert(index);
                    Outcome::Detach(state.page_subscriptions.remove(&index))
                }
                Some(_) if state.pages.iter().any(|page| page.position(&entry.key).is_some()) => {
                    Outcome::Ignore
                }
                Some(position) => {
                    let page = &mut state.pages[position];
                    match self.insertion_point(page, preceding_key) {
                        Some(at) => {
                            page.entries.insert(at, entry);
                            Outcome::Emit(self.flatten(&state.pages))
                        }
                        None => Outcome::Ignore,
                    }
                }
            }
        };
        match outcome {
            Outcome::Emit(elements) => self.subscriber.next(elements),
            Outcome::Detach(subscription) => {
                log::trace!("detaching empty page {index}");
                drop(subscription);
            }
            Outcome::Ignore => {}
        }
    }

    /// Where an element added to `page`'s window after `preceding_key` goes,
    /// or `None` if it lies outside what the page shows.
    fn insertion_point(&self, page: &Page<T>, preceding_key: Option<&str>) -> Option<usize> {
        if self.pager.reverse {
            // The head of a reverse page borders the next, older page.
            return page.position(preceding_key?).map(|found| found + 1);
        }
        match preceding_key {
            None => Some(0),
            Some(preceding) if page.entries.last().is_some_and(|last| last.key == preceding) => {
                None
            }
            Some(preceding) if page.cursor.as_ref().is_some_and(|c| c.key() == preceding) => {
                Some(0)
            }
            Some(preceding) => page.position(preceding).map(|found| found + 1),
        }
    }

    fn on_changed(&self, snapshot: &Snapshot, preceding_key: Option<&str>) {
        let entry = self.pager.entry(snapshot);
        let elements = {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;
            if state.cancelled {
                return;
            }
            if let Some((page, at)) = self.unmoved_slot(&state.pages, &entry.key, preceding_key) {
                state.pages[page].entries[at] = entry;
                Some(self.flatten(&state.pages))
            } else {
                self.move_changed(&mut state.pages, entry, preceding_key)
            }
        };
        if let Some(elements) = elements {
            self.subscriber.next(elements);
        }
    }

    /// The slot of a loaded element whose change leaves it where it is.
    ///
    /// That is the case when its preceding key is the element before it. The
    /// oldest element of a reverse list has no loaded predecessor; it stays at
    /// the edge of the list unless it moves in among loaded elements.
    fn unmoved_slot(
        &self,
        pages: &[Page<T>],
        key: &str,
        preceding_key: Option<&str>,
    ) -> Option<(usize, usize)> {
        let order = self.query_order(pages);
        let found = order
            .iter()
            .position(|&(page, at)| pages[page].entries[at].key == key)?;
        let before = found.checked_sub(1).map(|previous| {
            let (page, at) = order[previous];
            pages[page].entries[at].key.as_str()
        });
        let unmoved = match (before, preceding_key) {
            (Some(before), Some(preceding)) => before == preceding,
            (None, None) => true,
            (None, Some(preceding)) => {
                self.pager.reverse && !pages.iter().any(|page| page.position(preceding).is_some())
            }
            (Some(_), None) => false,
        };
        unmoved.then_some(order[found])
    }

    /// Every loaded slot, in query order.
    fn query_order(&self, pages: &[Page<T>]) -> Vec<(usize, usize)> {
        let slots = |(page, loaded): (usize, &Page<T>)| {
            (0..loaded.entries.len()).map(move |at| (page, at))
        };
        if self.pager.reverse {
            pages.iter().enumerate().rev().flat_map(slots).collect()
        } else {
            pages.iter().enumerate().flat_map(slots).collect()
        }
    }

    fn move_changed(
        &self,
        pages: &mut [Page<T>],
        entry: Entry<T>,
        preceding_key: Option<&str>,
    ) -> Option<Vec<T>> {
        let mut modified = false;
        for page in pages.iter_mut() {
            let before = page.entries.len();
            page.entries.retain(|existing| existing.key != entry.key);
            modified |= page.entries.len() != before;
        }
        if let Some((page, at)) = self.change_position(pages, preceding_key) {
            pages[page].entries.insert(at, entry);
            modified = true;
        }
        modified.then(|| self.flatten(pages))
    }
    /// Page and index a changed element moves to, or `None` if its new
    /// position lies beyond the loaded range.
    fn change_position(&self, pages: &[Page<T>], preceding_key: Option<&str>) -> Option<(usize, usize)> {
        let Some(preceding) = preceding_key else {
            return (!self.pager.reverse && !pages.is_empty()).then_some((0, 0));
        };
        if !self.pager.reverse {
            let last = pages.iter().rev().find_map(|page| page.entries.last());
            if last.is_some_and(|last| last.key == preceding) {
                return None;
            }
        }
        pages.iter().enumerate().find_map(|(index, page)| {
            page.position(preceding).map(|found| (index, found + 1))
        })
    }

    fn on_removed(&self, snapshot: &Snapshot) {
        let key = (self.pager.key_selector)(&(self.pager.value_selector)(snapshot));
        let elements = {
            let mut state = self.state.borrow_mut();
            if state.cancelled {
                return;
            }
            let mut modified = false;
            for page in &mut state.pages {
                let before = page.entries.len();
                page.entries.retain(|existing| existing.key != key);
                modified |= page.entries.len() != before;
            }
            modified.then(|| self.flatten(&state.pages))
        };
        if let Some(elements) = elements {
            self.subscriber.next(elements);
        }
    }

    fn flatten(&self, pages: &[Page<T>]) -> Vec<T> {
        let mut elements = Vec::new();
        for page in pages {
            if self.pager.reverse {
                elements.extend(page.entries.iter().rev().map(|entry| entry.value.clone()));
            } else {
                elements.extend(page.entries.iter().map(|entry| entry.value.clone()));
            }
        }
        elements
    }

    fn cancel(&self) {
        let (pages, base, signal) = {
            let mut state = self.state.borrow_mut();
            state.cancelled = true;
            (
                std::mem::take(&mut state.page_subscriptions),
                std::mem::take(&mut state.base_subscriptions),
                state.signal.take(),
            )
        };
        log::debug!(
            "cancelling infinite list over '{}': {} page listener(s)",
            self.pager.base.path(),
            pages.len()
        );
        drop(signal);
        drop(pages);
        drop(base);
    }
}
