//! Single-threaded push streams.
//!
//! Everything in this crate runs on one event loop: store callbacks, load-more
//! signals and consumer code all interleave on the same thread. Streams are
//! therefore built from `Rc`/`RefCell` rather than channels.
//!
//! - [`Observable`] is cold: each [`subscribe`](Observable::subscribe) runs its
//!   producer afresh with its own state.
//! - [`Subscriber`] is the producer's handle. It drops emissions after the
//!   stream has ended and runs registered teardown actions exactly once.
//! - [`Subscription`] is the consumer's handle. Unsubscribing is idempotent
//!   and happens automatically on drop.
//! - [`Subject`] is a hot multicast source, typically used as a "load more"
//!   signal.
//!
//! Notifications raised while the same subscriber is already delivering one
//! (an observer that triggers its own upstream) are queued and delivered in
//! order once the current delivery returns.

use crate::error::Error;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

/// An action run when a stream ends or is unsubscribed.
pub type Teardown = Box<dyn FnOnce()>;

/// One notification delivered to an observer.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification<T> {
    Next(T),
    Error(Error),
    Complete,
}

/// Receives the notifications of a stream.
///
/// After `error` or `complete` nothing else is delivered.
///
/// Any `FnMut(Notification<T>)` closure is an observer:
///
/// ```
/// use livefold::{Notification, Observable};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let sink = seen.clone();
/// let numbers = Observable::new(|subscriber| {
///     subscriber.next(1);
///     subscriber.next(2);
///     subscriber.complete();
/// });
/// let _subscription = numbers
///     .map(|n| n * 10)
///     .subscribe(move |notification| sink.borrow_mut().push(notification));
///
/// assert_eq!(
///     *seen.borrow(),
///     vec![Notification::Next(10), Notification::Next(20), Notification::Complete]
/// );
/// ```
pub trait Observer<T> {
    fn next(&mut self, value: T);
    fn error(&mut self, error: Error);
    fn complete(&mut self);
}

impl<T, F> Observer<T> for F
where
    F: FnMut(Notification<T>),
{
    fn next(&mut self, value: T) {
        self(Notification::Next(value))
    }

    fn error(&mut self, error: Error) {
        self(Notification::Error(error))
    }

    fn complete(&mut self) {
        self(Notification::Complete)
    }
}

struct Shared<T> {
    closed: Cell<bool>,
    delivering: Cell<bool>,
    queue: RefCell<VecDeque<Notification<T>>>,
    observer: RefCell<Box<dyn Observer<T>>>,
    teardowns: RefCell<Vec<Teardown>>,
}

impl<T> Shared<T> {
    fn push(&self, notification: Notification<T>) {
        self.queue.borrow_mut().push_back(notification);
        if self.delivering.replace(true) {
            return;
        }
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(notification) = next else {
                break;
            };
            let mut observer = self.observer.borrow_mut();
            match notification {
                Notification::Next(value) => observer.next(value),
                Notification::Error(error) => observer.error(error),
                Notification::Complete => observer.complete(),
            }
        }
        self.delivering.set(false);
    }

    fn run_teardowns(&self) {
        loop {
            let batch = std::mem::take(&mut *self.teardowns.borrow_mut());
            if batch.is_empty() {
                break;
            }
            for teardown in batch {
                teardown();
            }
        }
    }
}

trait Close {
    fn close(&self);
    fn is_closed(&self) -> bool;
}

impl<T> Close for Shared<T> {
    fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        self.queue.borrow_mut().clear();
        self.run_teardowns();
    }

    fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

/// Producer-side handle of one subscription.
///
/// Cloning yields another handle to the same subscription, so a producer can
/// hand it to every callback that may emit.
pub struct Subscriber<T> {
    shared: Rc<Shared<T>>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Subscriber {
            shared: self.shared.clone(),
        }
    }
}

impl<T: 'static> Subscriber<T> {
    fn new(observer: Box<dyn Observer<T>>) -> Self {
        Subscriber {
            shared: Rc::new(Shared {
                closed: Cell::new(false),
                delivering: Cell::new(false),
                queue: RefCell::new(VecDeque::new()),
                observer: RefCell::new(observer),
                teardowns: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Emit a value. Ignored once the stream has ended.
    pub fn next(&self, value: T) {
        if self.shared.closed.get() {
            return;
        }
        self.shared.push(Notification::Next(value));
    }

    /// End the stream with `error`, then run the teardown actions.
    pub fn error(&self, error: Error) {
        if self.shared.closed.replace(true) {
            return;
        }
        log::warn!("stream ended with error: {error}");
        self.shared.push(Notification::Error(error));
        self.shared.run_teardowns();
    }

    /// End the stream normally, then run the teardown actions.
    pub fn complete(&self) {
        if self.shared.closed.replace(true) {
            return;
        }
        self.shared.push(Notification::Complete);
        self.shared.run_teardowns();
    }

    /// Returns `true` once the stream has ended or been unsubscribed.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.get()
    }

    /// Register an action to run when the stream ends. Runs immediately if it
    /// already has.
    pub fn add(&self, teardown: impl FnOnce() + 'static) {
        if self.shared.closed.get() {
            teardown();
        } else {
            self.shared.teardowns.borrow_mut().push(Box::new(teardown));
        }
    }

    /// Tie an inner subscription's lifetime to this stream.
    pub fn add_subscription(&self, subscription: Subscription) {
        self.add(move || drop(subscription));
    }
}

/// Consumer-side handle of one subscription.
///
/// Dropping it unsubscribes; keep it alive for as long as the stream should
/// run.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    handle: Option<Rc<dyn Close>>,
}

impl Subscription {
    /// A subscription that is already closed.
    pub fn closed() -> Self {
        Subscription { handle: None }
    }

    /// Stop the stream and run its teardown actions. Idempotent.
    pub fn unsubscribe(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
    }

    /// Returns `true` once the stream has ended or been unsubscribed.
    pub fn is_closed(&self) -> bool {
        self.handle.as_ref().is_none_or(|handle| handle.is_closed())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A cold stream: each subscription runs the producer with a fresh
/// [`Subscriber`].
pub struct Observable<T> {
    producer: Rc<dyn Fn(&Subscriber<T>)>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Observable {
            producer: self.producer.clone(),
        }
    }
}

impl<T: 'static> Observable<T> {
    /// Create a stream from a producer. The producer emits through the
    /// subscriber and registers its teardown actions with
    /// [`Subscriber::add`].
    pub fn new(producer: impl Fn(&Subscriber<T>) + 'static) -> Self {
        Observable {
            producer: Rc::new(producer),
        }
    }

    /// Run the producer, delivering every notification to `on_notification`.
    pub fn subscribe(&self, on_notification: impl FnMut(Notification<T>) + 'static) -> Subscription {
        self.subscribe_with(on_notification)
    }

    /// Run the producer for `observer`.
    pub fn subscribe_with(&self, observer: impl Observer<T> + 'static) -> Subscription {
        let subscriber = Subscriber::new(Box::new(observer));
        (self.producer)(&subscriber);
        let handle: Rc<dyn Close> = subscriber.shared;
        Subscription {
            handle: Some(handle),
        }
    }

    /// Transform every emitted value.
    pub fn map<U: 'static>(self, f: impl Fn(T) -> U + 'static) -> Observable<U> {
        let f = Rc::new(f);
        Observable::new(move |downstream: &Subscriber<U>| {
            let f = f.clone();
            let sink = downstream.clone();
            let upstream = self.subscribe(move |notification| match notification {
                Notification::Next(value) => sink.next(f(value)),
                Notification::Error(error) => sink.error(error),
                Notification::Complete => sink.complete(),
            });
            downstream.add_subscription(upstream);
        })
    }
}

struct SubjectState<T> {
    observers: Vec<(u64, Subscriber<T>)>,
    next_id: u64,
    stopped: Option<Option<Error>>,
}

/// A hot stream that multicasts whatever is pushed into it.
///
/// Subscribers only see values pushed after they subscribed. Once completed or
/// errored, late subscribers receive the terminal notification immediately.
///
/// ```
/// use livefold::{Notification, Subject};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let signal = Subject::new();
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let sink = seen.clone();
/// let subscription = signal
///     .as_observable()
///     .subscribe(move |notification| sink.borrow_mut().push(notification));
///
/// signal.next(());
/// assert_eq!(signal.observer_count(), 1);
/// drop(subscription);
/// assert_eq!(signal.observer_count(), 0);
/// assert_eq!(*seen.borrow(), vec![Notification::Next(())]);
/// ```
pub struct Subject<T> {
    state: Rc<RefCell<SubjectState<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Subject {
            state: self.state.clone(),
        }
    }
}

impl<T: Clone + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Subject<T> {
    pub fn new() -> Self {
        Subject {
            state: Rc::new(RefCell::new(SubjectState {
                observers: Vec::new(),
                next_id: 1,
                stopped: None,
            })),
        }
    }

    /// Push `value` to every current subscriber.
    pub fn next(&self, value: T) {
        let observers: Vec<Subscriber<T>> = self
            .state
            .borrow()
            .observers
            .iter()
            .map(|(_, subscriber)| subscriber.clone())
            .collect();
        for subscriber in observers {
            subscriber.next(value.clone());
        }
    }

    /// End every current and future subscription with `error`.
    pub fn error(&self, error: Error) {
        for subscriber in self.stop(Some(error.clone())) {
            subscriber.error(error.clone());
        }
    }

    /// Complete every current and future subscription.
    pub fn complete(&self) {
        for subscriber in self.stop(None) {
            subscriber.complete();
        }
    }

    /// Number of live subscriptions.
    pub fn observer_count(&self) -> usize {
        self.state.borrow().observers.len()
    }

    /// A stream view of this subject.
    pub fn as_observable(&self) -> Observable<T> {
        let state = self.state.clone();
        Observable::new(move |subscriber: &Subscriber<T>| {
            let stopped = state.borrow().stopped.clone();
            match stopped {
                Some(Some(error)) => return subscriber.error(error),
                Some(None) => return subscriber.complete(),
                None => {}
            }
            let id = {
                let mut state = state.borrow_mut();
                let id = state.next_id;
                state.next_id += 1;
                state.observers.push((id, subscriber.clone()));
                id
            };
            let weak: Weak<RefCell<SubjectState<T>>> = Rc::downgrade(&state);
            subscriber.add(move || {
                if let Some(state) = weak.upgrade() {
                    state.borrow_mut().observers.retain(|(other, _)| *other != id);
                }
            });
        })
    }

    fn stop(&self, error: Option<Error>) -> Vec<Subscriber<T>> {
        let mut state = self.state.borrow_mut();
        if state.stopped.is_some() {
            return Vec::new();
        }
        state.stopped = Some(error);
        std::mem::take(&mut state.observers)
            .into_iter()
            .map(|(_, subscriber)| subscriber)
            .collect()
    }
}
