mod common;

use common::record;
use livefold::map_event::{on_deleted, on_upserted};
use livefold::{
    ChildEventKind, ChildNotification, Error, EventFilter, MapEvent, MapEventStream, MemoryStore,
    Notification, Query, Snapshot,
};
use serde_json::json;
use std::collections::BTreeMap;

fn fruit() -> MemoryStore {
    let store = MemoryStore::new();
    store.set("fruit", json!({"apple": 3, "banana": 5}));
    store
}

fn loaded(entries: &[(&str, i64)]) -> MapEvent {
    MapEvent::Loaded {
        map: entries
            .iter()
            .map(|(key, value)| (key.to_string(), Snapshot::new(*key, json!(value))))
            .collect(),
    }
}

#[test]
fn test_loaded_then_changes() {
    let store = fruit();
    let recorder = record(&MapEventStream::create(
        store.source(),
        Query::new("fruit"),
        EventFilter::default(),
    ));
    store.flush();
    store.set("fruit/cherry", json!(7));
    store.flush();
    store.set("fruit/apple", json!(4));
    store.flush();
    store.remove("fruit/banana");
    store.flush();

    assert_eq!(
        recorder.values(),
        vec![
            loaded(&[("apple", 3), ("banana", 5)]),
            MapEvent::Added {
                snapshot: Snapshot::new("cherry", json!(7)),
            },
            MapEvent::Changed {
                snapshot: Snapshot::new("apple", json!(4)),
            },
            MapEvent::Removed {
                snapshot: Snapshot::new("banana", json!(5)),
            },
        ]
    );
}

#[test]
fn test_loaded_with_deferred_read() {
    let store = fruit();
    store.defer_reads(true);
    let recorder = record(&MapEventStream::create(
        store.source(),
        Query::new("fruit"),
        EventFilter::default(),
    ));
    store.remove("fruit/apple");
    store.flush();

    assert_eq!(recorder.values(), vec![loaded(&[("banana", 5)])]);
}

#[test]
fn test_loaded_only_completes() {
    let store = fruit();
    let recorder = record(&MapEventStream::create(
        store.source(),
        Query::new("fruit"),
        EventFilter::loaded_only(),
    ));
    store.flush();

    assert_eq!(
        recorder.notifications(),
        vec![
            Notification::Next(loaded(&[("apple", 3), ("banana", 5)])),
            Notification::Complete
        ]
    );
    assert_eq!(store.listener_count(), 0);
}

#[test]
fn test_changes_only() {
    let store = fruit();
    let recorder = record(&MapEventStream::create(
        store.source(),
        Query::new("fruit"),
        EventFilter::none().with_changed(),
    ));
    store.flush();
    assert!(recorder.values().is_empty());

    store.update("fruit", json!({"apple": 1, "banana": null}));
    store.flush();

    assert_eq!(
        recorder.values(),
        vec![MapEvent::Changed {
            snapshot: Snapshot::new("apple", json!(1)),
        }]
    );
    assert_eq!(store.listener_count(), 1);
}

#[test]
fn test_missing_snapshot_is_a_protocol_violation() {
    let store = fruit();
    let recorder = record(&MapEventStream::create(
        store.source(),
        Query::new("fruit"),
        EventFilter::default(),
    ));
    store.flush();
    store.inject(
        "fruit",
        ChildEventKind::Removed,
        ChildNotification {
            snapshot: None,
            preceding_key: None,
        },
    );
    store.flush();

    assert_eq!(recorder.error(), Some(Error::NullSnapshot));
    assert_eq!(store.listener_count(), 0);
}

#[test]
fn test_unsubscribe_detaches_every_listener() {
    let store = fruit();
    let mut recorder = record(&MapEventStream::create(
        store.source(),
        Query::new("fruit"),
        EventFilter::default(),
    ));
    store.flush();
    recorder.unsubscribe();
    assert_eq!(store.listener_count(), 0);
}

#[test]
fn test_map_helpers() {
    let mut map = BTreeMap::new();
    on_upserted(&mut map, "a", 1);
    on_upserted(&mut map, "a", 2);
    on_upserted(&mut map, "b", 3);
    assert_eq!(map.get("a"), Some(&2));
    assert!(on_deleted(&mut map, "b"));
    assert!(!on_deleted(&mut map, "b"));
    assert_eq!(map.len(), 1);
}
