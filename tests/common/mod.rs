#![allow(dead_code)]

use livefold::{KeyedValue, MemoryStore, Notification, Observable, Subscription};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;

pub const SEQUENCE_PATH: &str = "sequence";

/// Key of the `n`th sequence element, e.g. `-KLDnr30------------`.
pub fn sequence_key(n: u32) -> String {
    format!("-KLDnr{n}------------")
}

/// A store holding keys 30 to 37 under `sequence`, each with a `number`
/// that decreases as the key increases (0 down to -7).
pub fn sequence_store() -> MemoryStore {
    let store = MemoryStore::new();
    let mut members = serde_json::Map::new();
    for n in 30..=37 {
        members.insert(sequence_key(n), json!({"number": 30 - i64::from(n)}));
    }
    store.set(SEQUENCE_PATH, Value::Object(members));
    store
}

/// Every notification a subscription has received.
pub struct Recorder<T> {
    seen: Rc<RefCell<Vec<Notification<T>>>>,
    subscription: Subscription,
}

impl<T: Clone + 'static> Recorder<T> {
    pub fn values(&self) -> Vec<T> {
        self.seen
            .borrow()
            .iter()
            .filter_map(|notification| match notification {
                Notification::Next(value) => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last(&self) -> Option<T> {
        self.values().pop()
    }

    pub fn notifications(&self) -> Vec<Notification<T>> {
        self.seen.borrow().clone()
    }

    pub fn is_complete(&self) -> bool {
        self.seen
            .borrow()
            .iter()
            .any(|notification| matches!(notification, Notification::Complete))
    }

    pub fn error(&self) -> Option<livefold::Error> {
        self.seen.borrow().iter().find_map(|notification| match notification {
            Notification::Error(error) => Some(error.clone()),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.seen.borrow().len()
    }

    pub fn unsubscribe(&mut self) {
        self.subscription.unsubscribe();
    }
}

pub fn record<T: Clone + 'static>(observable: &Observable<T>) -> Recorder<T> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let subscription = observable.subscribe(move |notification| sink.borrow_mut().push(notification));
    Recorder { seen, subscription }
}

pub fn keys(list: &[KeyedValue]) -> Vec<String> {
    list.iter().map(|value| value.key().to_string()).collect()
}

pub fn numbers(list: &[KeyedValue]) -> Vec<i64> {
    list.iter()
        .map(|value| value.value["number"].as_i64().unwrap())
        .collect()
}
