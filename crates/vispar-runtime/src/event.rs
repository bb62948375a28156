//! Event types for the runtime

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vispar_core::{EventTime, Value};

/// Type alias for IndexMap with FxBuildHasher for faster hashing of event fields.
pub type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Whether an event is entering the downstream view or leaving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    #[default]
    Current,
    Expired,
}

/// A timestamped sensor event
///
/// Operators never alias host memory: windows keep their own clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event type name (Arc<str> for O(1) clone instead of O(n) String clone)
    pub event_type: Arc<str>,
    /// Milliseconds, non-decreasing within one stream
    pub timestamp: EventTime,
    #[serde(default)]
    pub kind: EventKind,
    /// Attribute values in declaration order
    pub data: FxIndexMap<String, Value>,
}

impl Event {
    pub fn new(event_type: impl Into<Arc<str>>, timestamp: EventTime) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp,
            kind: EventKind::Current,
            data: IndexMap::with_hasher(FxBuildHasher),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Copy of this event tagged as leaving the window.
    pub fn expired(mut self) -> Self {
        self.kind = EventKind::Expired;
        self
    }

    pub fn is_expired(&self) -> bool {
        self.kind == EventKind::Expired
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(|v| v.as_int())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }
}
