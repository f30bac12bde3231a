mod common;

use common::{keys, record};
use livefold::list_event::{on_added, on_removed};
use livefold::{select_key, select_keyed_value, ListView, MemoryStore, Query};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum Op {
    Set(u8, u8),
    Remove(u8),
    Update(Vec<(u8, Option<u8>)>),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..10, 0u8..6).prop_map(|(key, value)| Op::Set(key, value)),
        2 => (0u8..10).prop_map(Op::Remove),
        1 => proptest::collection::vec((0u8..10, proptest::option::of(0u8..6)), 1..4)
            .prop_map(Op::Update),
    ]
}

fn arb_query() -> impl Strategy<Value = Query> {
    prop_oneof![
        Just(Query::new("items")),
        Just(Query::new("items").order_by_value()),
        Just(Query::new("items").order_by_value().limit_to_first(4)),
        Just(Query::new("items").order_by_key().limit_to_last(3)),
    ]
}

fn key(n: u8) -> String {
    format!("k{n}")
}

fn apply(store: &MemoryStore, op: &Op) {
    match op {
        Op::Set(n, value) => store.set(&format!("items/{}", key(*n)), json!(value)),
        Op::Remove(n) => store.remove(&format!("items/{}", key(*n))),
        Op::Update(writes) => {
            let mut values = serde_json::Map::new();
            for (n, value) in writes {
                values.insert(key(*n), value.map_or(serde_json::Value::Null, |v| json!(v)));
            }
            store.update("items", serde_json::Value::Object(values));
        }
    }
}

// For any sequence of writes, a live list folded from child events matches a
// fresh read of the same query, with no duplicate keys.
proptest! {
    #[test]
    fn prop_list_view_matches_store(query in arb_query(), ops in proptest::collection::vec(arb_op(), 0..40)) {
        let store = MemoryStore::new();
        let recorder = record(&ListView::create(
            store.source(),
            query.clone(),
            select_keyed_value,
            select_key,
        ));
        store.flush();

        for op in &ops {
            apply(&store, op);
            store.flush();

            let list = recorder.last().unwrap();
            let listed = keys(&list);
            let expected: Vec<String> = store
                .read(&query)
                .iter()
                .map(|snapshot| snapshot.key().to_string())
                .collect();
            prop_assert_eq!(&listed, &expected);

            let unique: HashSet<&String> = listed.iter().collect();
            prop_assert_eq!(unique.len(), listed.len());
        }
        prop_assert!(recorder.error().is_none());
    }
}

// Inserting after an existing key and removing keys keeps every key unique.
proptest! {
    #[test]
    fn prop_ordering_keeps_keys_unique(ops in proptest::collection::vec((0u8..10, any::<bool>(), 0usize..10), 0..60)) {
        let mut elements: Vec<String> = Vec::new();
        for (n, insert, anchor) in ops {
            let element = key(n);
            on_removed(&mut elements, &element, |e: &String| e.clone());
            if insert {
                let preceding = elements.get(anchor).cloned();
                on_added(&mut elements, element.clone(), preceding.as_deref(), |e: &String| e.clone());
                let position = elements.iter().position(|e| *e == element).unwrap();
                match preceding {
                    Some(preceding) => prop_assert_eq!(&elements[position - 1], &preceding),
                    None => prop_assert_eq!(position, 0),
                }
            }
            let unique: HashSet<&String> = elements.iter().collect();
            prop_assert_eq!(unique.len(), elements.len());
        }
    }
}
