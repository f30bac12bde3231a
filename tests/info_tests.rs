mod common;

use common::record;
use livefold::{Database, Info, InfoView, MemoryStore, INFO_PATH};
use serde_json::json;
use std::time::{Duration, SystemTime};

fn connected(offset: Option<f64>) -> Info {
    Info {
        connected: true,
        server_time_offset: offset,
    }
}

#[test]
fn test_info_follows_connection_state() {
    let store = MemoryStore::new();
    store.set(INFO_PATH, json!({"connected": false}));
    let database = Database::new(store.source());
    let recorder = record(&database.info());
    store.flush();

    store.set(".info/connected", json!(true));
    store.flush();
    store.set(".info/serverTimeOffset", json!(-250));
    store.flush();

    assert_eq!(
        recorder.values(),
        vec![Info::default(), connected(None), connected(Some(-250.0))]
    );
    assert!(recorder.error().is_none());
}

#[test]
fn test_missing_or_malformed_info_reads_as_disconnected() {
    let store = MemoryStore::new();
    let recorder = record(&InfoView::create(store.source()));
    store.flush();
    store.set(INFO_PATH, json!({"connected": "yes"}));
    store.flush();

    assert_eq!(recorder.values(), vec![Info::default(), Info::default()]);
    assert!(recorder.error().is_none());
}

#[test]
fn test_server_time_applies_offset() {
    assert_eq!(Info::default().server_time(), None);

    let ahead = connected(Some(60_000.0)).server_time().unwrap();
    assert!(ahead > SystemTime::now() + Duration::from_secs(30));

    let behind = connected(Some(-60_000.0)).server_time().unwrap();
    assert!(behind < SystemTime::now() - Duration::from_secs(30));
}

#[test]
fn test_info_from_json() {
    let info: Info =
        serde_json::from_value(json!({"connected": true, "serverTimeOffset": 12})).unwrap();
    assert_eq!(info, connected(Some(12.0)));
    assert_eq!(
        serde_json::to_value(Info::default()).unwrap(),
        json!({"connected": false})
    );
}

#[test]
fn test_unsubscribe_detaches_info() {
    let store = MemoryStore::new();
    let mut recorder = record(&InfoView::create(store.source()));
    store.flush();
    assert_eq!(store.listener_count(), 1);

    recorder.unsubscribe();
    assert_eq!(store.listener_count(), 0);
}
