//! Values paired with the key they were read from, and the default selectors.

use crate::snapshot::Snapshot;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

const KEY_FIELD: &str = "$key";
const VALUE_FIELD: &str = "$value";

/// A node's value tagged with its key.
///
/// Serialized the way list elements are usually consumed: objects gain a
/// `$key` field next to their own fields, anything else is wrapped as
/// `{"$key": ..., "$value": ...}`.
///
/// # Examples
///
/// ```
/// use livefold::KeyedValue;
/// use serde_json::json;
///
/// let primitive = KeyedValue::new("a", json!(1));
/// assert_eq!(primitive.to_json(), json!({"$key": "a", "$value": 1}));
///
/// let composite = KeyedValue::new("b", json!({"name": "bee"}));
/// assert_eq!(composite.to_json(), json!({"$key": "b", "name": "bee"}));
///
/// let back = KeyedValue::from_json(json!({"$key": "b", "name": "bee"})).unwrap();
/// assert_eq!(back, composite);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedValue {
    /// Key of the node the value was read from.
    pub key: String,
    /// The node's value, `null` if it did not exist.
    pub value: Value,
}

impl KeyedValue {
    /// Pair `value` with `key`.
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        KeyedValue {
            key: key.into(),
            value,
        }
    }

    /// The key the value was read from.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Drop the key, returning the bare value.
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Render as a single JSON value carrying `$key` (and `$value` for
    /// non-objects).
    pub fn to_json(&self) -> Value {
        let mut fields = Map::new();
        fields.insert(KEY_FIELD.to_string(), Value::String(self.key.clone()));
        match &self.value {
            Value::Object(object) => {
                for (name, value) in object {
                    fields.insert(name.clone(), value.clone());
                }
            }
            other => {
                fields.insert(VALUE_FIELD.to_string(), other.clone());
            }
        }
        Value::Object(fields)
    }

    /// Parse the shape produced by [`KeyedValue::to_json`].
    ///
    /// Returns `None` if `json` is not an object with a string `$key`.
    pub fn from_json(json: Value) -> Option<Self> {
        let Value::Object(mut fields) = json else {
            return None;
        };
        let key = match fields.remove(KEY_FIELD)? {
            Value::String(key) => key,
            _ => return None,
        };
        let value = match fields.remove(VALUE_FIELD) {
            Some(value) => value,
            None => Value::Object(fields),
        };
        Some(KeyedValue { key, value })
    }
}

impl Serialize for KeyedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for KeyedValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = Value::deserialize(deserializer)?;
        KeyedValue::from_json(json)
            .ok_or_else(|| serde::de::Error::custom("expected an object with a string `$key`"))
    }
}

/// Default list element selector: the snapshot's value tagged with its key.
pub fn select_keyed_value(snapshot: &Snapshot) -> KeyedValue {
    KeyedValue::new(snapshot.key(), snapshot.value().clone())
}

/// Default element key selector for [`KeyedValue`] elements.
pub fn select_key(value: &KeyedValue) -> String {
    value.key.clone()
}

/// Default map value selector: the snapshot's bare value.
pub fn select_value(snapshot: &Snapshot) -> Value {
    snapshot.value().clone()
}
