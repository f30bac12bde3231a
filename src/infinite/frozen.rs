//! Non-realtime paging: each page is read once and never updated.

use super::{Cursor, PageQueue, Pager};
use crate::event::{EventFilter, ListEvent};
use crate::list_event::ListEventStream;
use crate::observable::{Notification, Observable, Subscriber, Subscription};
use crate::snapshot::Snapshot;
use crate::store::ChangeSource;
use std::cell::RefCell;
use std::rc::Rc;

struct State<T> {
    queue: PageQueue,
    elements: Vec<T>,
    page: Option<Subscription>,
    signal: Option<Subscription>,
    signal_done: bool,
    requesting: bool,
    cancelled: bool,
}

struct Frozen<T> {
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
        let list = Rc::new(Frozen {
            source: source.clone(),
            pager: pager.clone(),
            subscriber: subscriber.clone(),
            state: RefCell::new(State {
                queue: PageQueue::new(),
                elements: Vec::new(),
                page: None,
                signal: None,
                signal_done: false,
                requesting: false,
                cancelled: false,
            }),
        });
        let teardown = list.clone();
        subscriber.add(move || teardown.cancel());

        let weak = Rc::downgrade(&list);
        let signal = load_more.subscribe(move |notification| {
            let Some(list) = weak.upgrade() else {
                return;
            };
            match notification {
                Notification::Next(_) => list.request(),
                Notification::Error(error) => list.subscriber.error(error),
                Notification::Complete => {
                    list.state.borrow_mut().signal_done = true;
                    list.complete_if_idle();
                }
            }
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

impl<T: Clone + 'static> Frozen<T> {
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
        log::debug!("reading page {index} of '{}'", query.path());

        let weak = Rc::downgrade(self);
        let subscription =
            ListEventStream::create(self.source.clone(), query, EventFilter::loaded_only())
                .subscribe(move |notification| {
                    let Some(list) = weak.upgrade() else {
                        return;
                    };
                    match notification {
                        Notification::Next(ListEvent::Loaded { list: snapshots }) => {
                            list.on_loaded(index, cursor.clone(), &snapshots)
                        }
                        Notification::Next(_) | Notification::Complete => {}
                        Notification::Error(error) => list.subscriber.error(error),
                    }
                });

        // The previous page has already emitted its only event.
        let replaced = {
            let mut state = self.state.borrow_mut();
            if state.cancelled {
                Some(subscription)
            } else {
                state.page.replace(subscription)
            }
        };
        drop(replaced);
    }

    fn on_loaded(self: &Rc<Self>, index: usize, cursor: Option<Cursor>, snapshots: &[Snapshot]) {
        let entries = self.pager.entries(snapshots, cursor.as_ref());
        let next_cursor = self.pager.next_cursor(&entries, cursor);
        let elements = {
            let mut state = self.state.borrow_mut();
            if state.cancelled {
                return;
            }
            log::debug!("page {index} read with {} element(s)", entries.len());
            let values = entries.into_iter().map(|entry| entry.value);
            if self.pager.reverse {
                state.elements.extend(values.rev());
            } else {
                state.elements.extend(values);
            }
            state.queue.resolve(next_cursor);
            state.elements.clone()
        };
        self.subscriber.next(elements);
        self.start_pages();
        self.complete_if_idle();
    }

    /// Complete once the signal has completed and every page it asked for has
    /// been emitted.
    fn complete_if_idle(&self) {
        let done = {
            let state = self.state.borrow();
            !state.cancelled && state.signal_done && state.queue.idle()
        };
        if done {
            log::debug!("infinite list over '{}' complete", self.pager.base.path());
            self.subscriber.complete();
        }
    }

    fn cancel(&self) {
        let (page, signal) = {
            let mut state = self.state.borrow_mut();
            state.cancelled = true;
            (state.page.take(), state.signal.take())
        };
        drop(signal);
        drop(page);
    }
}
