use livefold::{Bound, Error, Limit, Order, Query, QueryOptions};
use serde_json::json;

#[test]
fn test_reference_has_no_constraints() {
    let query = Query::new("a/b");
    assert!(query.is_reference());
    assert_eq!(query.path(), "a/b");
    assert_eq!(query.key(), "b");
    assert_eq!(query.order(), &Order::Default);
    assert_eq!(query.start(), None);
    assert_eq!(query.end(), None);
    assert_eq!(query.limit(), None);
}

#[test]
fn test_path_is_normalized() {
    assert_eq!(Query::new("//a///b/").path(), "a/b");
    assert_eq!(Query::new("/").path(), "");
}

#[test]
fn test_builder() {
    let query = Query::new("scores")
        .order_by_value()
        .start_at(Bound::Value(json!(1)))
        .end_at(Bound::Keyed {
            value: json!(9),
            key: "z".to_string(),
        })
        .limit_to_last(4);
    assert_eq!(query.order(), &Order::Value);
    assert_eq!(query.start(), Some(&Bound::Value(json!(1))));
    assert_eq!(query.end().and_then(Bound::key), Some("z"));
    assert_eq!(query.limit(), Some(Limit::Last(4)));
    assert!(!query.is_reference());

    let reference = query.reference();
    assert!(reference.is_reference());
    assert_eq!(reference.path(), "scores");
}

#[test]
fn test_equal_to_sets_both_bounds() {
    let query = Query::new("scores").order_by_priority().equal_to(Bound::Value(json!(5)));
    assert_eq!(query.order(), &Order::Priority);
    assert_eq!(query.start(), Some(&Bound::Value(json!(5))));
    assert_eq!(query.end(), Some(&Bound::Value(json!(5))));
}

#[test]
fn test_with_options() {
    let options = QueryOptions {
        order_by_child: Some("points".to_string()),
        limit_to_first: Some(2),
        ..QueryOptions::default()
    };
    let query = Query::with_options("scores", &options).unwrap();
    assert_eq!(query.order(), &Order::Child("points".to_string()));
    assert_eq!(query.limit(), Some(Limit::First(2)));

    let query = Query::with_options("scores", &QueryOptions::default()).unwrap();
    assert!(query.is_reference());
}

#[test]
fn test_with_options_rejects_multiple_orderings() {
    let options = QueryOptions {
        order_by_key: true,
        order_by_value: true,
        ..QueryOptions::default()
    };
    let error = Query::with_options("scores", &options).unwrap_err();
    assert_eq!(error, Error::MultipleOrderings);
    assert!(error.is_configuration());
}

#[test]
fn test_options_from_json() {
    let options: QueryOptions = serde_json::from_value(json!({
        "orderByKey": true,
        "startAt": "b",
        "endAt": {"value": "d", "key": "x"},
        "limitToLast": 2
    }))
    .unwrap();
    let query = Query::with_options("letters", &options).unwrap();
    assert_eq!(query.order(), &Order::Key);
    assert_eq!(query.start(), Some(&Bound::Value(json!("b"))));
    assert_eq!(query.end().map(Bound::value), Some(&json!("d")));
    assert_eq!(query.limit(), Some(Limit::Last(2)));
}

#[test]
fn test_error_messages() {
    assert_eq!(Error::MultipleOrderings.to_string(), "multiple orderings specified");
    assert_eq!(Error::NullSnapshot.to_string(), "received null snapshot");
    assert_eq!(
        Error::Upstream("denied".to_string()).to_string(),
        "store error: denied"
    );
}
