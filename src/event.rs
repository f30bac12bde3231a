use crate::snapshot::Snapshot;
use crate::store::ChildEventKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A change to an ordered query, as emitted by
/// [`ListEventStream`](crate::ListEventStream).
///
/// `Loaded` comes first (when requested) and carries the whole initial window,
/// already reconciled with any child notifications that raced the initial
/// read. The other variants describe one child each.
#[derive(Debug, Clone, PartialEq)]
pub enum ListEvent {
    /// The initial, ordered contents of the query.
    Loaded { list: Vec<Snapshot> },
    /// A child entered the query after `preceding_key` (`None`: at the head).
    Added {
        snapshot: Snapshot,
        preceding_key: Option<String>,
    },
    /// A child's value changed; `preceding_key` is its current position.
    Changed {
        snapshot: Snapshot,
        preceding_key: Option<String>,
    },
    /// A child left the query.
    Removed { snapshot: Snapshot },
}

impl ListEvent {
    /// Short name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ListEvent::Loaded { .. } => "loaded",
            ListEvent::Added { .. } => "added",
            ListEvent::Changed { .. } => "changed",
            ListEvent::Removed { .. } => "removed",
        }
    }
}

/// A change to an unordered query, as emitted by
/// [`MapEventStream`](crate::MapEventStream).
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    /// The initial contents of the query, by key.
    Loaded { map: BTreeMap<String, Snapshot> },
    Added { snapshot: Snapshot },
    Changed { snapshot: Snapshot },
    Removed { snapshot: Snapshot },
}

impl MapEvent {
    /// Short name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MapEvent::Loaded { .. } => "loaded",
            MapEvent::Added { .. } => "added",
            MapEvent::Changed { .. } => "changed",
            MapEvent::Removed { .. } => "removed",
        }
    }
}

/// Which events an event stream emits.
///
/// Every flag is independent. `loaded` on its own yields a stream that emits
/// the initial contents once and then completes.
///
/// # Examples
///
/// ```
/// use livefold::EventFilter;
///
/// let all = EventFilter::default();
/// assert!(all.added && all.changed && all.loaded && all.removed);
///
/// let changes = EventFilter::none().with_changed();
/// assert!(changes.changed && !changes.loaded);
/// assert!(!changes.is_loaded_only());
/// assert!(EventFilter::loaded_only().is_loaded_only());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventFilter {
    pub added: bool,
    pub changed: bool,
    pub loaded: bool,
    pub removed: bool,
}

impl Default for EventFilter {
    fn default() -> Self {
        EventFilter {
            added: true,
            changed: true,
            loaded: true,
            removed: true,
        }
    }
}

impl EventFilter {
    /// A filter with every event switched off.
    pub fn none() -> Self {
        EventFilter {
            added: false,
            changed: false,
            loaded: false,
            removed: false,
        }
    }

    /// Only the initial `Loaded` event.
    pub fn loaded_only() -> Self {
        EventFilter::none().with_loaded()
    }

    pub fn with_added(mut self) -> Self {
        self.added = true;
        self
    }

    pub fn with_changed(mut self) -> Self {
        self.changed = true;
        self
    }

    pub fn with_loaded(mut self) -> Self {
        self.loaded = true;
        self
    }

    pub fn with_removed(mut self) -> Self {
        self.removed = true;
        self
    }

    /// Returns `true` if events of `kind` are requested.
    pub fn includes(&self, kind: ChildEventKind) -> bool {
        match kind {
            ChildEventKind::Added => self.added,
            ChildEventKind::Changed => self.changed,
            ChildEventKind::Removed => self.removed,
        }
    }

    /// Returns `true` if no child-level event is requested.
    pub fn is_loaded_only(&self) -> bool {
        !(self.added || self.changed || self.removed)
    }
}
