//! Incremental string aggregators and the event counter.
//!
//! Aggregators here are fed one value at a time as events enter (`add`) and
//! leave (`remove`) a window, and answer with the new aggregate after every
//! call instead of recomputing over the window contents.
//!
//! | Operator | Backing state | Aggregate |
//! |----------|---------------|-----------|
//! | [`StringMinimum`] | ordered multiset | smallest value |
//! | [`StringMaximum`] | ordered multiset | largest value |
//! | [`StringMedianPick`] | sorted sequence | element at `(n - 1) / 2` |
//! | [`StringConcatenator`] | insertion-ordered sequence | concatenation |
//! | [`EventCounter`] | one integer | number of `add` calls |
//!
//! The empty aggregate is the empty string. `Null` inputs are treated as
//! absent values: they neither enter nor leave the state.

use std::collections::BTreeMap;

use vispar_core::{AttributeType, Value};

use crate::error::{OperatorError, StateError};
use crate::persistence::{
    Checkpointable, CounterCheckpoint, MultisetCheckpoint, OperatorCheckpoint, OperatorState,
    SequenceCheckpoint,
};

/// An aggregate maintained under add/remove/reset.
pub trait IncrementalAggregator: Checkpointable + Send {
    /// Registry name of this aggregator.
    fn name(&self) -> &'static str;

    /// Add one value and return the new aggregate.
    fn add(&mut self, value: &Value) -> Result<Value, OperatorError>;

    /// Remove one instance of `value` and return the new aggregate.
    ///
    /// Removing a value that is not present changes nothing.
    fn remove(&mut self, value: &Value) -> Result<Value, OperatorError>;

    /// Clear all state and return the empty aggregate.
    fn reset(&mut self) -> Value;

    /// The aggregate for the current state.
    fn current(&self) -> Value;
}

fn empty() -> Value {
    Value::Str(String::new())
}

/// Borrow the string payload of `value`. `Null` is absent.
fn string_input<'a>(
    operator: &'static str,
    value: &'a Value,
) -> Result<Option<&'a str>, OperatorError> {
    match value {
        Value::Str(s) => Ok(Some(s)),
        Value::Null => Ok(None),
        other => Err(OperatorError::TypeMismatch {
            operator,
            expected: AttributeType::Str,
            found: other.type_name(),
        }),
    }
}

// =============================================================================
// Ordered multiset (Minimum / Maximum)
// =============================================================================

#[derive(Debug, Default, Clone, PartialEq)]
struct OrderedMultiset {
    counts: BTreeMap<String, usize>,
}

impl OrderedMultiset {
    fn insert(&mut self, value: &str) {
        *self.counts.entry(value.to_string()).or_insert(0) += 1;
    }

    fn remove_one(&mut self, value: &str) {
        if let Some(count) = self.counts.get_mut(value) {
            *count -= 1;
            if *count == 0 {
                self.counts.remove(value);
            }
        }
    }

    fn first(&self) -> Option<&str> {
        self.counts.keys().next().map(String::as_str)
    }

    fn last(&self) -> Option<&str> {
        self.counts.keys().next_back().map(String::as_str)
    }

    fn to_checkpoint(&self) -> MultisetCheckpoint {
        MultisetCheckpoint {
            values: self
                .counts
                .iter()
                .map(|(v, n)| (v.clone(), *n))
                .collect(),
        }
    }

    fn from_checkpoint(cp: &MultisetCheckpoint) -> Result<Self, StateError> {
        let mut counts = BTreeMap::new();
        for (value, n) in &cp.values {
            if *n == 0 {
                return Err(StateError::Inconsistent(format!(
                    "multiset entry {value:?} has multiplicity 0"
                )));
            }
            if counts.insert(value.clone(), *n).is_some() {
                return Err(StateError::Inconsistent(format!(
                    "multiset entry {value:?} appears twice"
                )));
            }
        }
        Ok(Self { counts })
    }
}

/// Smallest string currently in the window
#[derive(Debug, Default, Clone)]
pub struct StringMinimum {
    values: OrderedMultiset,
}

impl StringMinimum {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IncrementalAggregator for StringMinimum {
    fn name(&self) -> &'static str {
        "stringMin"
    }

    fn add(&mut self, value: &Value) -> Result<Value, OperatorError> {
        if let Some(s) = string_input(self.name(), value)? {
            self.values.insert(s);
        }
        Ok(self.current())
    }

    fn remove(&mut self, value: &Value) -> Result<Value, OperatorError> {
        if let Some(s) = string_input(self.name(), value)? {
            self.values.remove_one(s);
        }
        Ok(self.current())
    }

    fn reset(&mut self) -> Value {
        self.values = OrderedMultiset::default();
        empty()
    }

    fn current(&self) -> Value {
        self.values.first().map(Value::from).unwrap_or_else(empty)
    }
}

impl Checkpointable for StringMinimum {
    fn checkpoint(&self) -> OperatorCheckpoint {
        OperatorCheckpoint::new(OperatorState::Minimum(self.values.to_checkpoint()))
    }

    fn restore(&mut self, checkpoint: &OperatorCheckpoint) -> Result<(), StateError> {
        match checkpoint.state()? {
            OperatorState::Minimum(cp) => {
                self.values = OrderedMultiset::from_checkpoint(cp)?;
                Ok(())
            }
            other => Err(other.mismatch("minimum")),
        }
    }
}

/// Largest string currently in the window
#[derive(Debug, Default, Clone)]
pub struct StringMaximum {
    values: OrderedMultiset,
}

impl StringMaximum {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IncrementalAggregator for StringMaximum {
    fn name(&self) -> &'static str {
        "stringMax"
    }

    fn add(&mut self, value: &Value) -> Result<Value, OperatorError> {
        if let Some(s) = string_input(self.name(), value)? {
            self.values.insert(s);
        }
        Ok(self.current())
    }

    fn remove(&mut self, value: &Value) -> Result<Value, OperatorError> {
        if let Some(s) = string_input(self.name(), value)? {
            self.values.remove_one(s);
        }
        Ok(self.current())
    }

    fn reset(&mut self) -> Value {
        self.values = OrderedMultiset::default();
        empty()
    }

    fn current(&self) -> Value {
        self.values.last().map(Value::from).unwrap_or_else(empty)
    }
}

impl Checkpointable for StringMaximum {
    fn checkpoint(&self) -> OperatorCheckpoint {
        OperatorCheckpoint::new(OperatorState::Maximum(self.values.to_checkpoint()))
    }

    fn restore(&mut self, checkpoint: &OperatorCheckpoint) -> Result<(), StateError> {
        match checkpoint.state()? {
            OperatorState::Maximum(cp) => {
                self.values = OrderedMultiset::from_checkpoint(cp)?;
                Ok(())
            }
            other => Err(other.mismatch("maximum")),
        }
    }
}

// =============================================================================
// Median pick
// =============================================================================

/// Lower-median pick over the sorted window contents.
///
/// Not a statistical median: nothing is averaged, the element at index
/// `(n - 1) / 2` of the sorted values is returned as is.
#[derive(Debug, Default, Clone)]
pub struct StringMedianPick {
    sorted: Vec<String>,
}

impl StringMedianPick {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }
}

impl IncrementalAggregator for StringMedianPick {
    fn name(&self) -> &'static str {
        "stringMedianPick"
    }

    fn add(&mut self, value: &Value) -> Result<Value, OperatorError> {
        if let Some(s) = string_input(self.name(), value)? {
            let at = self.sorted.partition_point(|x| x.as_str() <= s);
            self.sorted.insert(at, s.to_string());
        }
        Ok(self.current())
    }

    fn remove(&mut self, value: &Value) -> Result<Value, OperatorError> {
        if let Some(s) = string_input(self.name(), value)? {
            let at = self.sorted.partition_point(|x| x.as_str() < s);
            if self.sorted.get(at).is_some_and(|x| x == s) {
                self.sorted.remove(at);
            }
        }
        Ok(self.current())
    }

    fn reset(&mut self) -> Value {
        self.sorted.clear();
        empty()
    }

    fn current(&self) -> Value {
        match self.sorted.len() {
            0 => empty(),
            n => Value::from(self.sorted[(n - 1) / 2].as_str()),
        }
    }
}

impl Checkpointable for StringMedianPick {
    fn checkpoint(&self) -> OperatorCheckpoint {
        OperatorCheckpoint::new(OperatorState::MedianPick(SequenceCheckpoint {
            values: self.sorted.clone(),
        }))
    }

    fn restore(&mut self, checkpoint: &OperatorCheckpoint) -> Result<(), StateError> {
        let cp = match checkpoint.state()? {
            OperatorState::MedianPick(cp) => cp,
            other => return Err(other.mismatch("median_pick")),
        };
        if cp.values.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(StateError::Inconsistent(
                "median values are not sorted".to_string(),
            ));
        }
        self.sorted = cp.values.clone();
        Ok(())
    }
}

// =============================================================================
// Concatenation
// =============================================================================

/// Concatenation of the window's string values in arrival order
#[derive(Debug, Default, Clone)]
pub struct StringConcatenator {
    parts: Vec<String>,
}

impl StringConcatenator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IncrementalAggregator for StringConcatenator {
    fn name(&self) -> &'static str {
        "stringConcat"
    }

    fn add(&mut self, value: &Value) -> Result<Value, OperatorError> {
        if let Some(s) = string_input(self.name(), value)? {
            self.parts.push(s.to_string());
        }
        Ok(self.current())
    }

    fn remove(&mut self, value: &Value) -> Result<Value, OperatorError> {
        if let Some(s) = string_input(self.name(), value)? {
            if let Some(at) = self.parts.iter().position(|p| p == s) {
                self.parts.remove(at);
            }
        }
        Ok(self.current())
    }

    fn reset(&mut self) -> Value {
        self.parts.clear();
        empty()
    }

    fn current(&self) -> Value {
        Value::Str(self.parts.concat())
    }
}

impl Checkpointable for StringConcatenator {
    fn checkpoint(&self) -> OperatorCheckpoint {
        OperatorCheckpoint::new(OperatorState::Concat(SequenceCheckpoint {
            values: self.parts.clone(),
        }))
    }

    fn restore(&mut self, checkpoint: &OperatorCheckpoint) -> Result<(), StateError> {
        match checkpoint.state()? {
            OperatorState::Concat(cp) => {
                self.parts = cp.values.clone();
                Ok(())
            }
            other => Err(other.mismatch("concat")),
        }
    }
}

// =============================================================================
// Counter
// =============================================================================

/// Counts processed events. Has no `remove`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventCounter {
    count: u64,
}

impl EventCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one event; its attribute values are ignored.
    pub fn add(&mut self, _data: &[Value]) -> u64 {
        self.count += 1;
        self.count
    }

    pub fn reset(&mut self) -> u64 {
        self.count = 0;
        self.count
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Checkpointable for EventCounter {
    fn checkpoint(&self) -> OperatorCheckpoint {
        OperatorCheckpoint::new(OperatorState::Counter(CounterCheckpoint { count: self.count }))
    }

    fn restore(&mut self, checkpoint: &OperatorCheckpoint) -> Result<(), StateError> {
        match checkpoint.state()? {
            OperatorState::Counter(cp) => {
                self.count = cp.count;
                Ok(())
            }
            other => Err(other.mismatch("counter")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::from(v)
    }

    #[test]
    fn minimum_tracks_smallest_with_duplicates() {
        let mut min = StringMinimum::new();
        assert_eq!(min.add(&s("m")).unwrap(), s("m"));
        assert_eq!(min.add(&s("c")).unwrap(), s("c"));
        assert_eq!(min.add(&s("c")).unwrap(), s("c"));
        // One "c" leaves, the other keeps the minimum.
        assert_eq!(min.remove(&s("c")).unwrap(), s("c"));
        assert_eq!(min.remove(&s("c")).unwrap(), s("m"));
        assert_eq!(min.remove(&s("m")).unwrap(), s(""));
    }

    #[test]
    fn maximum_tracks_largest() {
        let mut max = StringMaximum::new();
        max.add(&s("apple")).unwrap();
        assert_eq!(max.add(&s("pear")).unwrap(), s("pear"));
        assert_eq!(max.add(&s("fig")).unwrap(), s("pear"));
        assert_eq!(max.remove(&s("pear")).unwrap(), s("fig"));
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut max = StringMaximum::new();
        max.add(&s("b")).unwrap();
        assert_eq!(max.remove(&s("zzz")).unwrap(), s("b"));

        let mut median = StringMedianPick::new();
        median.add(&s("b")).unwrap();
        assert_eq!(median.remove(&s("a")).unwrap(), s("b"));
        assert_eq!(median.len(), 1);
    }

    #[test]
    fn median_pick_uses_lower_median() {
        let mut m = StringMedianPick::new();
        assert_eq!(m.add(&s("a")).unwrap(), s("a"));
        assert_eq!(m.add(&s("c")).unwrap(), s("a"));
        assert_eq!(m.add(&s("b")).unwrap(), s("b"));
        assert_eq!(m.add(&s("y")).unwrap(), s("b"));
        assert_eq!(m.add(&s("x")).unwrap(), s("c"));
        assert_eq!(m.remove(&s("a")).unwrap(), s("c"));
        assert_eq!(m.remove(&s("y")).unwrap(), s("c"));
    }

    #[test]
    fn concatenator_keeps_arrival_order_and_skips_null() {
        let mut c = StringConcatenator::new();
        c.add(&s("on")).unwrap();
        c.add(&Value::Null).unwrap();
        c.add(&s("off")).unwrap();
        assert_eq!(c.add(&s("on")).unwrap(), s("onoffon"));
        assert_eq!(c.remove(&s("on")).unwrap(), s("offon"));
        assert_eq!(c.reset(), s(""));
        assert_eq!(c.current(), s(""));
    }

    #[test]
    fn non_string_input_is_rejected_without_state_change() {
        let mut min = StringMinimum::new();
        min.add(&s("k")).unwrap();
        let err = min.add(&Value::Int(3)).unwrap_err();
        assert_eq!(
            err,
            OperatorError::TypeMismatch {
                operator: "stringMin",
                expected: AttributeType::Str,
                found: "int"
            }
        );
        assert_eq!(min.current(), s("k"));
    }

    #[test]
    fn reset_returns_identity() {
        let mut min = StringMinimum::new();
        min.add(&s("q")).unwrap();
        assert_eq!(min.reset(), s(""));
        assert_eq!(min.current(), s(""));
    }

    #[test]
    fn counter_counts_and_resets() {
        let mut c = EventCounter::new();
        assert_eq!(c.add(&[]), 1);
        assert_eq!(c.add(&[Value::Int(9), s("x")]), 2);
        assert_eq!(c.reset(), 0);
        assert_eq!(c.add(&[]), 1);
    }

    #[test]
    fn multiset_restore_rejects_zero_multiplicity() {
        let cp = OperatorCheckpoint::new(OperatorState::Minimum(MultisetCheckpoint {
            values: vec![("a".into(), 0)],
        }));
        let mut min = StringMinimum::new();
        min.add(&s("z")).unwrap();
        assert!(matches!(min.restore(&cp), Err(StateError::Inconsistent(_))));
        assert_eq!(min.current(), s("z"));
    }

    #[test]
    fn median_restore_rejects_unsorted() {
        let cp = OperatorCheckpoint::new(OperatorState::MedianPick(SequenceCheckpoint {
            values: vec!["b".into(), "a".into()],
        }));
        assert!(matches!(
            StringMedianPick::new().restore(&cp),
            Err(StateError::Inconsistent(_))
        ));
    }

    #[test]
    fn minimum_and_maximum_checkpoints_are_not_interchangeable() {
        let mut min = StringMinimum::new();
        min.add(&s("a")).unwrap();
        let err = StringMaximum::new().restore(&min.checkpoint()).unwrap_err();
        assert_eq!(
            err,
            StateError::KindMismatch {
                expected: "maximum",
                found: "minimum"
            }
        );
    }
}
