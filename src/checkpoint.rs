//! The "loaded" checkpoint protocol shared by the list and map event streams.
//!
//! A stream that wants a `Loaded` event reads the query's range once and
//! remembers the key of its last child. Child notifications that arrive before
//! the checkpoint are folded into a buffer instead of being emitted. The
//! checkpoint fires when the buffer holds that last key, either because the
//! read finished after the matching add or because the matching add arrives
//! after the read. From then on notifications are emitted as they come, and
//! listeners that only existed to find the checkpoint detach themselves.

use crate::error::{Error, Result};
use crate::event::EventFilter;
use crate::observable::{Observable, Subscriber};
use crate::query::Query;
use crate::snapshot::Snapshot;
use crate::store::{ChangeSource, ChildEventKind, ChildNotification, Unlisten};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// The pre-checkpoint accumulator of an event stream, and the events it
/// produces.
pub(crate) trait LoadBuffer: Default + 'static {
    type Event: 'static;

    fn added(&mut self, snapshot: Snapshot, preceding_key: Option<&str>);
    fn changed(&mut self, snapshot: Snapshot, preceding_key: Option<&str>);
    fn removed(&mut self, snapshot: &Snapshot);
    fn contains(&self, key: &str) -> bool;

    /// The `Loaded` event carrying everything buffered so far.
    fn into_loaded(self) -> Self::Event;

    /// An event for one child notification after the checkpoint.
    fn child_event(
        kind: ChildEventKind,
        snapshot: Snapshot,
        preceding_key: Option<String>,
    ) -> Self::Event;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    Range,
    Child(ChildEventKind),
}

struct Checkpoint<B> {
    filter: EventFilter,
    has_loaded: bool,
    last_loaded_key: Option<String>,
    buffer: B,
    unlisteners: HashMap<Slot, Unlisten>,
}

enum Step<E> {
    Emit(E),
    Loaded(E),
    Detach(Option<Unlisten>),
    Buffered,
}

impl<B: LoadBuffer> Checkpoint<B> {
    fn new(filter: EventFilter) -> Self {
        Checkpoint {
            filter,
            has_loaded: !filter.loaded,
            last_loaded_key: None,
            buffer: B::default(),
            unlisteners: HashMap::new(),
        }
    }

    fn take_loaded(&mut self) -> B::Event {
        self.has_loaded = true;
        std::mem::take(&mut self.buffer).into_loaded()
    }

    fn range_read(&mut self, snapshots: &[Snapshot]) -> Option<B::Event> {
        self.unlisteners.remove(&Slot::Range);
        self.last_loaded_key = snapshots.last().map(|snapshot| snapshot.key().to_string());
        let ready = match &self.last_loaded_key {
            None => true,
            Some(key) => self.buffer.contains(key),
        };
        ready.then(|| self.take_loaded())
    }

    fn child(
        &mut self,
        kind: ChildEventKind,
        snapshot: Snapshot,
        preceding_key: Option<String>,
    ) -> Step<B::Event> {
        if self.has_loaded {
            if self.filter.includes(kind) {
                return Step::Emit(B::child_event(kind, snapshot, preceding_key));
            }
            return Step::Detach(self.unlisteners.remove(&Slot::Child(kind)));
        }

        match kind {
            ChildEventKind::Added => {
                let is_last = self.last_loaded_key.as_deref() == Some(snapshot.key());
                self.buffer.added(snapshot, preceding_key.as_deref());
                if is_last {
                    return Step::Loaded(self.take_loaded());
                }
            }
            ChildEventKind::Changed => self.buffer.changed(snapshot, preceding_key.as_deref()),
            ChildEventKind::Removed => self.buffer.removed(&snapshot),
        }
        Step::Buffered
    }
}

/// Build an event stream over `query` that honours `filter`.
pub(crate) fn stream<B: LoadBuffer>(
    source: Rc<dyn ChangeSource>,
    query: Query,
    filter: EventFilter,
) -> Observable<B::Event> {
    Observable::new(move |subscriber: &Subscriber<B::Event>| {
        let state = Rc::new(RefCell::new(Checkpoint::<B>::new(filter)));
        let only_loaded = filter.is_loaded_only();

        let teardown_state = state.clone();
        let path = query.path().to_string();
        subscriber.add(move || {
            let unlisteners: Vec<Unlisten> = teardown_state
                .borrow_mut()
                .unlisteners
                .drain()
                .map(|(_, unlisten)| unlisten)
                .collect();
            log::trace!("detaching {} listener(s) from '{path}'", unlisteners.len());
            for unlisten in unlisteners {
                unlisten();
            }
        });

        if filter.loaded {
            let sink = subscriber.clone();
            let range_state = state.clone();
            let unlisten = source.once_range(
                &query,
                Box::new(move |result: Result<Vec<Snapshot>>| {
                    let snapshots = match result {
                        Ok(snapshots) => snapshots,
                        Err(error) => return sink.error(error),
                    };
                    let loaded = range_state.borrow_mut().range_read(&snapshots);
                    if let Some(event) = loaded {
                        emit_loaded(&sink, event, only_loaded);
                    }
                }),
            );
            attach(subscriber, &state, Slot::Range, unlisten);
        }

        let kinds = [
            (ChildEventKind::Added, filter.added),
            (ChildEventKind::Changed, filter.changed),
            (ChildEventKind::Removed, filter.removed),
        ];
        for (kind, requested) in kinds {
            if !(requested || filter.loaded) || subscriber.is_closed() {
                continue;
            }
            let sink = subscriber.clone();
            let child_state = state.clone();
            let unlisten = source.on_child(
                &query,
                kind,
                Box::new(move |result: Result<ChildNotification>| {
                    let notification = match result {
                        Ok(notification) => notification,
                        Err(error) => return sink.error(error),
                    };
                    let Some(snapshot) = notification.snapshot else {
                        return sink.error(Error::NullSnapshot);
                    };
                    let step = child_state
                        .borrow_mut()
                        .child(kind, snapshot, notification.preceding_key);
                    match step {
                        Step::Emit(event) => sink.next(event),
                        Step::Loaded(event) => emit_loaded(&sink, event, only_loaded),
                        Step::Detach(unlisten) => {
                            if let Some(unlisten) = unlisten {
                                log::trace!("detaching {kind:?} listener after checkpoint");
                                unlisten();
                            }
                        }
                        Step::Buffered => {}
                    }
                }),
            );
            log::trace!("attached {kind:?} listener to '{}'", query.path());
            attach(subscriber, &state, Slot::Child(kind), unlisten);
        }
    })
}

fn attach<B: LoadBuffer>(
    subscriber: &Subscriber<B::Event>,
    state: &Rc<RefCell<Checkpoint<B>>>,
    slot: Slot,
    unlisten: Unlisten,
) {
    // A store that answers synchronously may already have ended the stream.
    if subscriber.is_closed() {
        unlisten();
        return;
    }
    state.borrow_mut().unlisteners.insert(slot, unlisten);
}

fn emit_loaded<E: 'static>(subscriber: &Subscriber<E>, event: E, only_loaded: bool) {
    log::debug!("checkpoint reached, emitting loaded event");
    subscriber.next(event);
    if only_loaded {
        subscriber.complete();
    }
}
