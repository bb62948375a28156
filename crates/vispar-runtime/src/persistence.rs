//! Checkpoint/restore contract shared by every stateful operator.
//!
//! Each operator snapshots into one variant of [`OperatorState`], wrapped in a
//! versioned [`OperatorCheckpoint`]. The host persistence layer treats the
//! encoded bytes as an opaque blob; `restore` validates the shape of the blob
//! completely before touching the live instance, so a rejected restore leaves
//! the previous state in place.
//!
//! # Example
//! ```
//! use vispar_runtime::aggregation::{IncrementalAggregator, StringMinimum};
//! use vispar_runtime::persistence::{Checkpointable, OperatorCheckpoint};
//!
//! let mut min = StringMinimum::new();
//! min.add(&"kitchen".into()).unwrap();
//!
//! let blob = min.checkpoint().to_bytes().unwrap();
//! let mut restored = StringMinimum::new();
//! restored.restore(&OperatorCheckpoint::from_bytes(&blob).unwrap()).unwrap();
//! assert_eq!(restored.current(), min.current());
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vispar_core::{EventTime, Value};

use crate::config::CheckpointConfig;
use crate::error::StateError;
use crate::event::{Event, EventKind, FxIndexMap};

/// Current checkpoint format version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Snapshot and replace operator state.
pub trait Checkpointable {
    fn checkpoint(&self) -> OperatorCheckpoint;

    /// Replace the instance state with `checkpoint`. All-or-nothing.
    fn restore(&mut self, checkpoint: &OperatorCheckpoint) -> Result<(), StateError>;
}

/// Versioned, self-describing operator snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorCheckpoint {
    pub version: u32,
    pub state: OperatorState,
}

impl OperatorCheckpoint {
    pub fn new(state: OperatorState) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            state,
        }
    }

    /// The payload, if this checkpoint was written by a supported version.
    pub fn state(&self) -> Result<&OperatorState, StateError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(StateError::VersionMismatch {
                expected: CHECKPOINT_VERSION,
                found: self.version,
            });
        }
        Ok(&self.state)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StateError> {
        serde_json::to_vec(self).map_err(|e| StateError::Malformed(e.to_string()))
    }

    pub fn to_bytes_pretty(&self) -> Result<Vec<u8>, StateError> {
        serde_json::to_vec_pretty(self).map_err(|e| StateError::Malformed(e.to_string()))
    }

    /// Encode in the blob style chosen by `config`.
    pub fn encode(&self, config: &CheckpointConfig) -> Result<Vec<u8>, StateError> {
        if config.pretty {
            self.to_bytes_pretty()
        } else {
            self.to_bytes()
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StateError> {
        serde_json::from_slice(bytes).map_err(|e| StateError::Malformed(e.to_string()))
    }
}

/// Per-operator checkpoint payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperatorState {
    Window(WindowCheckpoint),
    Minimum(MultisetCheckpoint),
    Maximum(MultisetCheckpoint),
    MedianPick(SequenceCheckpoint),
    Concat(SequenceCheckpoint),
    Counter(CounterCheckpoint),
    Correlator(CorrelatorCheckpoint),
    Comparator,
}

impl OperatorState {
    pub fn kind(&self) -> &'static str {
        match self {
            OperatorState::Window(_) => "window",
            OperatorState::Minimum(_) => "minimum",
            OperatorState::Maximum(_) => "maximum",
            OperatorState::MedianPick(_) => "median_pick",
            OperatorState::Concat(_) => "concat",
            OperatorState::Counter(_) => "counter",
            OperatorState::Correlator(_) => "correlator",
            OperatorState::Comparator => "comparator",
        }
    }

    pub(crate) fn mismatch(&self, expected: &'static str) -> StateError {
        StateError::KindMismatch {
            expected,
            found: self.kind(),
        }
    }
}

/// Checkpoint for a hybrid time/length window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowCheckpoint {
    pub capacity: usize,
    pub ttl_ms: i64,
    /// Retained entries, oldest first
    pub entries: Vec<WindowEntryCheckpoint>,
    pub occupancy: usize,
    /// Deadline of the outstanding wake-up, if one was requested
    pub pending_wakeup: Option<EventTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowEntryCheckpoint {
    pub event: SerializableEvent,
    pub expiry_deadline: EventTime,
}

/// Ordered multiset as (value, multiplicity) pairs in ascending order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultisetCheckpoint {
    pub values: Vec<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceCheckpoint {
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterCheckpoint {
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatorCheckpoint {
    pub last_a: i64,
    pub last_b: i64,
}

/// Serializable representation of an event for persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializableEvent {
    pub event_type: String,
    pub timestamp_ms: i64,
    pub kind: EventKind,
    /// Fields in their original order
    pub fields: Vec<(String, SerializableValue)>,
}

/// Serializable value type
///
/// Externally tagged, unlike [`Value`], so ints and floats survive a round
/// trip through formats that do not distinguish them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SerializableValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<&Value> for SerializableValue {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => SerializableValue::Null,
            Value::Bool(b) => SerializableValue::Bool(*b),
            Value::Int(i) => SerializableValue::Int(*i),
            Value::Float(f) => SerializableValue::Float(*f),
            Value::Str(s) => SerializableValue::String(s.clone()),
        }
    }
}

impl From<SerializableValue> for Value {
    fn from(sv: SerializableValue) -> Self {
        match sv {
            SerializableValue::Null => Value::Null,
            SerializableValue::Bool(b) => Value::Bool(b),
            SerializableValue::Int(i) => Value::Int(i),
            SerializableValue::Float(f) => Value::Float(f),
            SerializableValue::String(s) => Value::Str(s),
        }
    }
}

impl From<&Event> for SerializableEvent {
    fn from(event: &Event) -> Self {
        Self {
            event_type: event.event_type.to_string(),
            timestamp_ms: event.timestamp,
            kind: event.kind,
            fields: event
                .data
                .iter()
                .map(|(k, v)| (k.clone(), SerializableValue::from(v)))
                .collect(),
        }
    }
}

impl From<SerializableEvent> for Event {
    fn from(se: SerializableEvent) -> Self {
        let data: FxIndexMap<String, Value> = se
            .fields
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect();
        Event {
            event_type: Arc::from(se.event_type),
            timestamp: se.timestamp_ms,
            kind: se.kind,
            data,
        }
    }
}
