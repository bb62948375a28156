//! Two-input scalar functions: the rising-edge correlator and the null-aware
//! string comparator.

use std::cmp::Ordering;

use tracing::trace;
use vispar_core::{AttributeType, Value};

use crate::error::{OperatorError, StateError};
use crate::persistence::{Checkpointable, CorrelatorCheckpoint, OperatorCheckpoint, OperatorState};

/// Fires when both inputs strictly exceed the last accepted pair.
///
/// State is the last pair for which the correlator fired. A firing pair
/// replaces it; a non-firing pair leaves it alone, so a later pair is always
/// compared against the most recent *accepted* pair, not the most recent input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RisingEdgeCorrelator {
    last_a: i64,
    last_b: i64,
}

impl Default for RisingEdgeCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl RisingEdgeCorrelator {
    pub const NAME: &'static str = "risingEdgeAnd";

    /// Starts from the baseline `(0, 0)`: the first firing pair must be
    /// strictly positive in both inputs.
    pub fn new() -> Self {
        Self::with_baseline(0, 0)
    }

    /// Start from an explicit baseline, e.g. `(i64::MIN, i64::MIN)` for
    /// streams whose readings may be negative.
    pub fn with_baseline(last_a: i64, last_b: i64) -> Self {
        Self { last_a, last_b }
    }

    pub fn last(&self) -> (i64, i64) {
        (self.last_a, self.last_b)
    }

    pub fn execute(&mut self, a: i64, b: i64) -> bool {
        if a > self.last_a && b > self.last_b {
            trace!(a, b, "rising edge");
            self.last_a = a;
            self.last_b = b;
            true
        } else {
            false
        }
    }

    /// [`execute`](Self::execute) over runtime values. Only `Int` is accepted.
    pub fn evaluate(&mut self, a: &Value, b: &Value) -> Result<bool, OperatorError> {
        let a = integral(a)?;
        let b = integral(b)?;
        Ok(self.execute(a, b))
    }
}

fn integral(value: &Value) -> Result<i64, OperatorError> {
    value.as_int().ok_or(OperatorError::TypeMismatch {
        operator: RisingEdgeCorrelator::NAME,
        expected: AttributeType::Long,
        found: value.type_name(),
    })
}

impl Checkpointable for RisingEdgeCorrelator {
    fn checkpoint(&self) -> OperatorCheckpoint {
        OperatorCheckpoint::new(OperatorState::Correlator(CorrelatorCheckpoint {
            last_a: self.last_a,
            last_b: self.last_b,
        }))
    }

    fn restore(&mut self, checkpoint: &OperatorCheckpoint) -> Result<(), StateError> {
        match checkpoint.state()? {
            OperatorState::Correlator(cp) => {
                self.last_a = cp.last_a;
                self.last_b = cp.last_b;
                Ok(())
            }
            other => Err(other.mismatch("correlator")),
        }
    }
}

/// Lexicographic comparison where a missing value sorts last.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StringComparator;

impl StringComparator {
    pub const NAME: &'static str = "stringCompare";

    pub fn new() -> Self {
        Self
    }

    /// `1` if `a` is missing, else `-1` if `b` is missing, else the ordering
    /// of `a` against `b` as `-1`, `0` or `1`.
    ///
    /// Only the sign is meaningful to callers, so the result is normalized
    /// rather than reporting the character distance between the strings.
    pub fn execute(&self, a: Option<&str>, b: Option<&str>) -> i32 {
        match (a, b) {
            (None, _) => 1,
            (Some(_), None) => -1,
            (Some(a), Some(b)) => match a.cmp(b) {
                Ordering::Less => -1,
                Ordering::Equal => 0,
                Ordering::Greater => 1,
            },
        }
    }

    /// [`execute`](Self::execute) over runtime values; `Null` is missing.
    pub fn evaluate(&self, a: &Value, b: &Value) -> Result<i32, OperatorError> {
        Ok(self.execute(optional_str(a)?, optional_str(b)?))
    }
}

fn optional_str(value: &Value) -> Result<Option<&str>, OperatorError> {
    match value {
        Value::Null => Ok(None),
        Value::Str(s) => Ok(Some(s)),
        other => Err(OperatorError::TypeMismatch {
            operator: StringComparator::NAME,
            expected: AttributeType::Str,
            found: other.type_name(),
        }),
    }
}

impl Checkpointable for StringComparator {
    fn checkpoint(&self) -> OperatorCheckpoint {
        OperatorCheckpoint::new(OperatorState::Comparator)
    }

    fn restore(&mut self, checkpoint: &OperatorCheckpoint) -> Result<(), StateError> {
        match checkpoint.state()? {
            OperatorState::Comparator => Ok(()),
            other => Err(other.mismatch("comparator")),
        }
    }
}
