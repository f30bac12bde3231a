//! Connection state published under `.info`.

use crate::observable::Observable;
use crate::query::Query;
use crate::snapshot::Snapshot;
use crate::store::ChangeSource;
use crate::view::ValueView;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::time::{Duration, SystemTime};

/// Path of the node a store publishes its connection state under.
pub const INFO_PATH: &str = ".info";

/// The connection state of a store.
///
/// # Examples
///
/// ```
/// use livefold::Info;
/// use serde_json::json;
///
/// let info: Info = serde_json::from_value(json!({"connected": true})).unwrap();
/// assert!(info.connected);
/// assert_eq!(info.server_time(), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Info {
    pub connected: bool,
    /// Estimated server clock skew, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_time_offset: Option<f64>,
}

impl Info {
    /// Read the connection state from a `.info` snapshot. A missing or
    /// malformed node reads as disconnected.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        if !snapshot.exists() {
            return Info::default();
        }
        match serde_json::from_value(snapshot.value().clone()) {
            Ok(info) => info,
            Err(error) => {
                log::warn!("malformed connection state: {error}");
                Info::default()
            }
        }
    }

    /// The current time on the server, if the store reports a clock offset.
    pub fn server_time(&self) -> Option<SystemTime> {
        let offset = self.server_time_offset?;
        let skew = Duration::try_from_secs_f64(offset.abs() / 1000.0).ok()?;
        let now = SystemTime::now();
        if offset < 0.0 {
            now.checked_sub(skew)
        } else {
            now.checked_add(skew)
        }
    }
}

/// The live connection state of a store.
pub struct InfoView;

impl InfoView {
    pub fn create(source: Rc<dyn ChangeSource>) -> Observable<Info> {
        ValueView::create(source, Query::new(INFO_PATH), Info::from_snapshot)
    }
}
