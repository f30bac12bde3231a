//! Unordered change events for a query.

use crate::checkpoint::{self, LoadBuffer};
use crate::event::{EventFilter, MapEvent};
use crate::observable::Observable;
use crate::query::Query;
use crate::snapshot::Snapshot;
use crate::store::{ChangeSource, ChildEventKind};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Normalizes the child callbacks of one query into a stream of
/// [`MapEvent`]s.
///
/// Follows the same checkpoint protocol as
/// [`ListEventStream`](crate::ListEventStream); the initial contents are keyed
/// instead of ordered and preceding keys are dropped.
pub struct MapEventStream;

impl MapEventStream {
    /// Create the event stream of `query` on `source`.
    pub fn create(
        source: Rc<dyn ChangeSource>,
        query: Query,
        filter: EventFilter,
    ) -> Observable<MapEvent> {
        checkpoint::stream::<MapBuffer>(source, query, filter)
    }
}

#[derive(Default)]
struct MapBuffer(BTreeMap<String, Snapshot>);

impl LoadBuffer for MapBuffer {
    type Event = MapEvent;

    fn added(&mut self, snapshot: Snapshot, _preceding_key: Option<&str>) {
        let key = snapshot.key().to_string();
        on_upserted(&mut self.0, &key, snapshot);
    }

    fn changed(&mut self, snapshot: Snapshot, _preceding_key: Option<&str>) {
        let key = snapshot.key().to_string();
        on_upserted(&mut self.0, &key, snapshot);
    }

    fn removed(&mut self, snapshot: &Snapshot) {
        on_deleted(&mut self.0, snapshot.key());
    }

    fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    fn into_loaded(self) -> MapEvent {
        MapEvent::Loaded { map: self.0 }
    }

    fn child_event(
        kind: ChildEventKind,
        snapshot: Snapshot,
        _preceding_key: Option<String>,
    ) -> MapEvent {
        match kind {
            ChildEventKind::Added => MapEvent::Added { snapshot },
            ChildEventKind::Changed => MapEvent::Changed { snapshot },
            ChildEventKind::Removed => MapEvent::Removed { snapshot },
        }
    }
}

/// Insert or replace the value for `key`.
pub fn on_upserted<T>(map: &mut BTreeMap<String, T>, key: &str, value: T) {
    map.insert(key.to_string(), value);
}

/// Drop the value for `key`. Returns `true` if there was one.
pub fn on_deleted<T>(map: &mut BTreeMap<String, T>, key: &str) -> bool {
    map.remove(key).is_some()
}
