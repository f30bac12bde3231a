mod common;

use common::record;
use livefold::{
    select_key, select_keyed_value, select_value, Error, KeyedValue, ListView, MapView,
    MemoryStore, Query, Snapshot, ValueView,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;

fn keyed(entries: &[(&str, i64)]) -> Vec<Value> {
    entries
        .iter()
        .map(|(key, value)| json!({"$key": key, "$value": value}))
        .collect()
}

fn as_json(list: &[KeyedValue]) -> Vec<Value> {
    list.iter().map(KeyedValue::to_json).collect()
}

#[test]
fn test_list_view_tracks_additions_and_removals() {
    let store = MemoryStore::new();
    store.set("items", json!({"a": 1, "b": 2, "c": 3}));
    let recorder = record(&ListView::create(
        store.source(),
        Query::new("items"),
        select_keyed_value,
        select_key,
    ));
    store.flush();
    assert_eq!(
        recorder.values().iter().map(|l| as_json(l)).collect::<Vec<_>>(),
        vec![keyed(&[("a", 1), ("b", 2), ("c", 3)])]
    );

    store.set("items/d", json!(4));
    store.flush();
    assert_eq!(
        as_json(&recorder.last().unwrap()),
        keyed(&[("a", 1), ("b", 2), ("c", 3), ("d", 4)])
    );

    store.remove("items/b");
    store.flush();
    assert_eq!(
        as_json(&recorder.last().unwrap()),
        keyed(&[("a", 1), ("c", 3), ("d", 4)])
    );
    assert_eq!(recorder.values().len(), 3);
}

#[test]
fn test_list_view_follows_child_order() {
    let store = MemoryStore::new();
    store.set(
        "players",
        json!({"ann": {"score": 20}, "bob": {"score": 10}, "cat": {"score": 30}}),
    );
    let recorder = record(&ListView::create(
        store.source(),
        Query::new("players").order_by_child("score"),
        |snapshot: &Snapshot| snapshot.key().to_string(),
        |name: &String| name.clone(),
    ));
    store.flush();
    assert_eq!(recorder.last().unwrap(), ["bob", "ann", "cat"]);

    store.set("players/bob/score", json!(40));
    store.flush();
    assert_eq!(recorder.last().unwrap(), ["ann", "cat", "bob"]);

    store.set("players/dan", json!({"score": 25}));
    store.flush();
    assert_eq!(recorder.last().unwrap(), ["ann", "dan", "cat", "bob"]);
}

#[test]
fn test_list_view_of_empty_query() {
    let store = MemoryStore::new();
    let recorder = record(&ListView::create(
        store.source(),
        Query::new("empty"),
        select_keyed_value,
        select_key,
    ));
    store.flush();
    assert_eq!(recorder.values(), vec![Vec::<KeyedValue>::new()]);

    store.set("empty/x", json!(true));
    store.flush();
    assert_eq!(
        recorder.last().unwrap(),
        vec![KeyedValue::new("x", json!(true))]
    );
}

#[test]
fn test_list_view_error_ends_stream() {
    let store = MemoryStore::new();
    store.set("items", json!({"a": 1}));
    let recorder = record(&ListView::create(
        store.source(),
        Query::new("items"),
        select_keyed_value,
        select_key,
    ));
    store.flush();
    store.fail("items", "denied");
    store.flush();

    assert_eq!(recorder.error(), Some(Error::Upstream("denied".to_string())));
    assert_eq!(store.listener_count(), 0);
}

#[test]
fn test_map_view() {
    let store = MemoryStore::new();
    store.set("stock", json!({"apple": 3, "pear": 1}));
    let recorder = record(&MapView::create(
        store.source(),
        Query::new("stock"),
        select_value,
    ));
    store.flush();
    store.update("stock", json!({"apple": 2, "plum": 9, "pear": null}));
    store.flush();

    let expected: Vec<BTreeMap<String, Value>> = vec![
        [("apple".to_string(), json!(3)), ("pear".to_string(), json!(1))]
            .into_iter()
            .collect(),
        [("apple".to_string(), json!(2)), ("plum".to_string(), json!(9))]
            .into_iter()
            .collect(),
    ];
    // one write, three child events after the first emission
    let values = recorder.values();
    assert_eq!(values.first(), expected.first());
    assert_eq!(values.last(), expected.last());
    assert_eq!(values.len(), 4);
}

#[test]
fn test_value_view() {
    let store = MemoryStore::new();
    store.set("config", json!({"theme": "dark"}));
    let recorder = record(&ValueView::create(
        store.source(),
        Query::new("config/theme"),
        select_value,
    ));
    store.flush();
    store.set("config/theme", json!("light"));
    store.flush();
    store.set("config/other", json!(1));
    store.flush();

    assert_eq!(recorder.values(), vec![json!("dark"), json!("light")]);
}

#[test]
fn test_value_view_of_missing_node_emits_null() {
    let store = MemoryStore::new();
    let recorder = record(&ValueView::create(
        store.source(),
        Query::new("nowhere"),
        |snapshot: &Snapshot| snapshot.exists(),
    ));
    store.flush();
    assert_eq!(recorder.values(), vec![false]);
}

#[test]
fn test_value_view_unsubscribe() {
    let store = MemoryStore::new();
    let mut recorder = record(&ValueView::create(
        store.source(),
        Query::new("config"),
        select_value,
    ));
    assert_eq!(store.listener_count(), 1);
    recorder.unsubscribe();
    assert_eq!(store.listener_count(), 0);
}
