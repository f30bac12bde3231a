mod common;

use common::record;
use livefold::{
    ChildEventKind, ChildNotification, Error, EventFilter, ListEvent, ListEventStream,
    MemoryStore, Notification, Query, Snapshot,
};
use serde_json::json;

fn letters() -> MemoryStore {
    let store = MemoryStore::new();
    store.set("letters", json!({"a": 1, "b": 2, "c": 3}));
    store
}

fn loaded(entries: &[(&str, i64)]) -> ListEvent {
    ListEvent::Loaded {
        list: entries
            .iter()
            .map(|(key, value)| Snapshot::new(*key, json!(value)))
            .collect(),
    }
}

fn added_and_loaded() -> EventFilter {
    EventFilter::none().with_added().with_loaded()
}

#[test]
fn test_loaded_when_read_arrives_first() {
    let store = letters();
    let events = ListEventStream::create(store.source(), Query::new("letters"), added_and_loaded());
    let recorder = record(&events);
    store.flush();

    assert_eq!(recorder.values(), vec![loaded(&[("a", 1), ("b", 2), ("c", 3)])]);
}

#[test]
fn test_loaded_when_adds_arrive_first() {
    let store = letters();
    store.defer_reads(true);
    let events = ListEventStream::create(store.source(), Query::new("letters"), added_and_loaded());
    let recorder = record(&events);
    store.flush();

    assert_eq!(recorder.values(), vec![loaded(&[("a", 1), ("b", 2), ("c", 3)])]);
}

#[test]
fn test_loaded_folds_changes_racing_the_read() {
    let store = letters();
    store.defer_reads(true);
    let events =
        ListEventStream::create(store.source(), Query::new("letters"), EventFilter::default());
    let recorder = record(&events);
    store.set("letters/b", json!(20));
    store.flush();

    assert_eq!(recorder.values(), vec![loaded(&[("a", 1), ("b", 20), ("c", 3)])]);
}

#[test]
fn test_empty_query_loads_empty_list() {
    let store = MemoryStore::new();
    let events = ListEventStream::create(store.source(), Query::new("nothing"), added_and_loaded());
    let recorder = record(&events);
    store.flush();

    assert_eq!(recorder.values(), vec![ListEvent::Loaded { list: vec![] }]);
}

#[test]
fn test_events_after_loaded() {
    let store = letters();
    let events =
        ListEventStream::create(store.source(), Query::new("letters"), EventFilter::default());
    let recorder = record(&events);
    store.flush();

    store.set("letters/d", json!(4));
    store.flush();
    store.set("letters/a", json!(10));
    store.flush();
    store.remove("letters/b");
    store.flush();

    assert_eq!(
        recorder.values(),
        vec![
            loaded(&[("a", 1), ("b", 2), ("c", 3)]),
            ListEvent::Added {
                snapshot: Snapshot::new("d", json!(4)),
                preceding_key: Some("c".to_string()),
            },
            ListEvent::Changed {
                snapshot: Snapshot::new("a", json!(10)),
                preceding_key: None,
            },
            ListEvent::Removed {
                snapshot: Snapshot::new("b", json!(2)),
            },
        ]
    );
}

#[test]
fn test_without_loaded_every_add_is_emitted() {
    let store = letters();
    let events = ListEventStream::create(
        store.source(),
        Query::new("letters"),
        EventFilter::none().with_added(),
    );
    let recorder = record(&events);
    store.flush();

    let kinds: Vec<&str> = recorder.values().iter().map(ListEvent::kind).collect();
    assert_eq!(kinds, ["added", "added", "added"]);
    assert_eq!(store.listener_count(), 1);
}

#[test]
fn test_ordered_by_child_with_moves() {
    let store = MemoryStore::new();
    store.set("scores", json!({"a": {"n": 3}, "b": {"n": 1}, "c": {"n": 2}}));
    let query = Query::new("scores").order_by_child("n");
    let recorder = record(&ListEventStream::create(
        store.source(),
        query,
        EventFilter::default(),
    ));
    store.flush();
    store.set("scores/a/n", json!(0));
    store.flush();

    let values = recorder.values();
    let ListEvent::Loaded { list } = &values[0] else {
        panic!("expected loaded, got {:?}", values[0]);
    };
    let keys: Vec<&str> = list.iter().map(Snapshot::key).collect();
    assert_eq!(keys, ["b", "c", "a"]);
    assert_eq!(
        values[1],
        ListEvent::Changed {
            snapshot: Snapshot::new("a", json!({"n": 0})),
            preceding_key: None,
        }
    );
}

#[test]
fn test_limited_window_reports_entries_and_exits() {
    let store = letters();
    let query = Query::new("letters").limit_to_first(2);
    let recorder = record(&ListEventStream::create(
        store.source(),
        query,
        EventFilter::default(),
    ));
    store.flush();
    store.remove("letters/a");
    store.flush();

    assert_eq!(
        recorder.values(),
        vec![
            loaded(&[("a", 1), ("b", 2)]),
            ListEvent::Removed {
                snapshot: Snapshot::new("a", json!(1)),
            },
            ListEvent::Added {
                snapshot: Snapshot::new("c", json!(3)),
                preceding_key: Some("b".to_string()),
            },
        ]
    );
}

#[test]
fn test_loaded_only_completes() {
    let store = letters();
    let recorder = record(&ListEventStream::create(
        store.source(),
        Query::new("letters"),
        EventFilter::loaded_only(),
    ));
    store.flush();

    assert_eq!(
        recorder.notifications(),
        vec![
            Notification::Next(loaded(&[("a", 1), ("b", 2), ("c", 3)])),
            Notification::Complete,
        ]
    );
    assert_eq!(store.listener_count(), 0);
}

#[test]
fn test_unrequested_listeners_detach_after_loaded() {
    let store = letters();
    let recorder = record(&ListEventStream::create(
        store.source(),
        Query::new("letters"),
        added_and_loaded(),
    ));
    store.flush();
    // added, changed and removed listeners; the read has been answered
    assert_eq!(store.listener_count(), 3);

    store.set("letters/b", json!(20));
    store.flush();
    assert_eq!(store.listener_count(), 2);

    store.remove("letters/c");
    store.flush();
    assert_eq!(store.listener_count(), 1);

    assert_eq!(recorder.values().len(), 1);
}

#[test]
fn test_missing_snapshot_is_a_protocol_violation() {
    let store = letters();
    let recorder = record(&ListEventStream::create(
        store.source(),
        Query::new("letters"),
        EventFilter::default(),
    ));
    store.flush();
    store.inject(
        "letters",
        ChildEventKind::Added,
        ChildNotification {
            snapshot: None,
            preceding_key: None,
        },
    );
    store.flush();

    let error = recorder.error().unwrap();
    assert_eq!(error, Error::NullSnapshot);
    assert!(error.is_protocol_violation());
    assert_eq!(store.listener_count(), 0);
}

#[test]
fn test_store_failure_ends_stream() {
    let store = letters();
    let recorder = record(&ListEventStream::create(
        store.source(),
        Query::new("letters"),
        EventFilter::default(),
    ));
    store.flush();
    store.fail("letters", "permission denied");
    store.flush();

    let error = recorder.error().unwrap();
    assert_eq!(error, Error::Upstream("permission denied".to_string()));
    assert!(error.is_upstream());
    assert_eq!(store.listener_count(), 0);

    store.set("letters/d", json!(4));
    store.flush();
    assert_eq!(recorder.values().len(), 1);
}

#[test]
fn test_failure_before_read_ends_stream() {
    let store = letters();
    let recorder = record(&ListEventStream::create(
        store.source(),
        Query::new("letters"),
        EventFilter::default(),
    ));
    store.fail("letters", "offline");
    store.flush();

    assert!(recorder.values().is_empty());
    assert_eq!(recorder.error(), Some(Error::Upstream("offline".to_string())));
    assert_eq!(store.listener_count(), 0);
}

#[test]
fn test_unsubscribe_detaches_every_listener() {
    let store = letters();
    let mut recorder = record(&ListEventStream::create(
        store.source(),
        Query::new("letters"),
        EventFilter::default(),
    ));
    store.flush();
    assert!(store.listener_count() > 0);

    recorder.unsubscribe();
    assert_eq!(store.listener_count(), 0);

    store.set("letters/d", json!(4));
    assert_eq!(store.pending(), 0);
    assert_eq!(store.flush(), 0);
    assert_eq!(recorder.values().len(), 1);
}

#[test]
fn test_unsubscribe_before_read_is_answered() {
    let store = letters();
    let mut recorder = record(&ListEventStream::create(
        store.source(),
        Query::new("letters"),
        EventFilter::default(),
    ));
    recorder.unsubscribe();
    assert_eq!(store.listener_count(), 0);
    assert_eq!(store.flush(), 0);
    assert!(recorder.values().is_empty());
}

#[test]
fn test_each_subscription_reads_afresh() {
    let store = letters();
    let events =
        ListEventStream::create(store.source(), Query::new("letters"), EventFilter::loaded_only());
    let first = record(&events);
    store.flush();
    store.set("letters/d", json!(4));
    store.flush();
    let second = record(&events);
    store.flush();

    assert_eq!(first.values(), vec![loaded(&[("a", 1), ("b", 2), ("c", 3)])]);
    assert_eq!(
        second.values(),
        vec![loaded(&[("a", 1), ("b", 2), ("c", 3), ("d", 4)])]
    );
}
