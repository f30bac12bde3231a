//! Query descriptions handed to the store.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a query's children are ordered.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Order {
    /// The store's default ordering.
    #[default]
    Default,
    /// By child key.
    Key,
    /// By the value found at a (possibly nested, `/`-separated) child path.
    Child(String),
    /// By the child's own value.
    Value,
    /// By the child's `.priority`.
    Priority,
}

/// A range boundary: a bare ordering value, or a value with a key tiebreak.
///
/// For key-ordered queries the bare value is the key itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bound {
    /// Value plus the key that breaks ties between equal values.
    Keyed { value: Value, key: String },
    /// A bare value (`null` is a valid boundary).
    Value(Value),
}

impl Bound {
    /// The ordering value of the boundary.
    pub fn value(&self) -> &Value {
        match self {
            Bound::Keyed { value, .. } | Bound::Value(value) => value,
        }
    }

    /// The tiebreak key, if one was given.
    pub fn key(&self) -> Option<&str> {
        match self {
            Bound::Keyed { key, .. } => Some(key),
            Bound::Value(_) => None,
        }
    }
}

/// A cap on the number of children a query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Limit {
    /// The first `n` children in order.
    First(usize),
    /// The last `n` children in order.
    Last(usize),
}

/// A path in the store plus the ordering, range and limit applied to its
/// children.
///
/// A query with no constraints is a *reference* to the path.
///
/// # Examples
///
/// ```
/// use livefold::{Bound, Limit, Order, Query};
/// use serde_json::json;
///
/// let query = Query::new("/scores/")
///     .order_by_child("points")
///     .start_at(Bound::Value(json!(10)))
///     .limit_to_first(5);
/// assert_eq!(query.path(), "scores");
/// assert_eq!(query.order(), &Order::Child("points".to_string()));
/// assert_eq!(query.limit(), Some(Limit::First(5)));
/// assert!(!query.is_reference());
/// assert!(query.reference().is_reference());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    path: String,
    order: Order,
    start_at: Option<Bound>,
    end_at: Option<Bound>,
    limit: Option<Limit>,
}

impl Query {
    /// A reference to `path`. Leading, trailing and repeated `/` are dropped.
    pub fn new(path: &str) -> Self {
        Query {
            path: normalize_path(path),
            order: Order::Default,
            start_at: None,
            end_at: None,
            limit: None,
        }
    }

    /// Build a query from options, rejecting more than one ordering.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MultipleOrderings`] if more than one `order_by_*`
    /// option is set.
    pub fn with_options(path: &str, options: &QueryOptions) -> Result<Self> {
        let orderings = [
            options.order_by_child.is_some(),
            options.order_by_key,
            options.order_by_priority,
            options.order_by_value,
        ];
        if orderings.iter().filter(|set| **set).count() > 1 {
            return Err(Error::MultipleOrderings);
        }

        let mut query = Query::new(path);
        if let Some(child) = &options.order_by_child {
            query = query.order_by_child(child);
        } else if options.order_by_key {
            query = query.order_by_key();
        } else if options.order_by_priority {
            query = query.order_by_priority();
        } else if options.order_by_value {
            query = query.order_by_value();
        }
        if let Some(bound) = &options.equal_to {
            query = query.equal_to(bound.clone());
        }
        if let Some(bound) = &options.start_at {
            query = query.start_at(bound.clone());
        }
        if let Some(bound) = &options.end_at {
            query = query.end_at(bound.clone());
        }
        if let Some(n) = options.limit_to_first {
            query = query.limit_to_first(n);
        }
        if let Some(n) = options.limit_to_last {
            query = query.limit_to_last(n);
        }
        Ok(query)
    }

    /// Order children by key.
    pub fn order_by_key(mut self) -> Self {
        self.order = Order::Key;
        self
    }

    /// Order children by the value at `child`.
    pub fn order_by_child(mut self, child: &str) -> Self {
        self.order = Order::Child(normalize_path(child));
        self
    }

    /// Order children by their own value.
    pub fn order_by_value(mut self) -> Self {
        self.order = Order::Value;
        self
    }

    /// Order children by priority.
    pub fn order_by_priority(mut self) -> Self {
        self.order = Order::Priority;
        self
    }

    /// Only children at or after `bound`.
    pub fn start_at(mut self, bound: Bound) -> Self {
        self.start_at = Some(bound);
        self
    }

    /// Only children at or before `bound`.
    pub fn end_at(mut self, bound: Bound) -> Self {
        self.end_at = Some(bound);
        self
    }

    /// Only children equal to `bound`.
    pub fn equal_to(self, bound: Bound) -> Self {
        self.start_at(bound.clone()).end_at(bound)
    }

    /// Keep at most the first `n` children.
    pub fn limit_to_first(mut self, n: usize) -> Self {
        self.limit = Some(Limit::First(n));
        self
    }

    /// Keep at most the last `n` children.
    pub fn limit_to_last(mut self, n: usize) -> Self {
        self.limit = Some(Limit::Last(n));
        self
    }

    /// Normalized path of the queried node (no leading or trailing `/`).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last segment of the path, or `""` for the root.
    pub fn key(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }

    pub fn order(&self) -> &Order {
        &self.order
    }

    pub fn start(&self) -> Option<&Bound> {
        self.start_at.as_ref()
    }

    pub fn end(&self) -> Option<&Bound> {
        self.end_at.as_ref()
    }

    pub fn limit(&self) -> Option<Limit> {
        self.limit
    }

    /// The unconstrained reference this query was built on.
    pub fn reference(&self) -> Query {
        Query::new(&self.path)
    }

    /// Returns `true` if no ordering, range or limit is applied.
    pub fn is_reference(&self) -> bool {
        self.order == Order::Default
            && self.start_at.is_none()
            && self.end_at.is_none()
            && self.limit.is_none()
    }
}

/// Declarative query input, as accepted by [`Query::with_options`].
///
/// Deserializes from camelCase JSON:
///
/// ```
/// use livefold::{Bound, QueryOptions};
/// use serde_json::json;
///
/// let options: QueryOptions = serde_json::from_value(json!({
///     "orderByChild": "points",
///     "startAt": {"value": 10, "key": "bob"},
///     "limitToFirst": 3
/// }))
/// .unwrap();
/// assert_eq!(options.order_by_child.as_deref(), Some("points"));
/// assert_eq!(options.start_at, Some(Bound::Keyed { value: json!(10), key: "bob".to_string() }));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryOptions {
    pub order_by_child: Option<String>,
    pub order_by_key: bool,
    pub order_by_priority: bool,
    pub order_by_value: bool,
    pub start_at: Option<Bound>,
    pub end_at: Option<Bound>,
    pub equal_to: Option<Bound>,
    pub limit_to_first: Option<usize>,
    pub limit_to_last: Option<usize>,
}

pub(crate) fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
