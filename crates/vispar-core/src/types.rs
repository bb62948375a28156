//! Declared attribute domains

use serde::{Deserialize, Serialize};
use std::fmt;

/// Event time in milliseconds.
pub type EventTime = i64;

/// Declared type of a sensor attribute or operator argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    /// UTF-8 string
    Str,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// 32-bit floating point
    Float,
    /// 64-bit floating point
    Double,
    /// Boolean
    Bool,
}

impl AttributeType {
    pub fn is_integral(self) -> bool {
        matches!(self, AttributeType::Int | AttributeType::Long)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::Str => write!(f, "string"),
            AttributeType::Int => write!(f, "int"),
            AttributeType::Long => write!(f, "long"),
            AttributeType::Float => write!(f, "float"),
            AttributeType::Double => write!(f, "double"),
            AttributeType::Bool => write!(f, "bool"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_types() {
        assert!(AttributeType::Int.is_integral());
        assert!(AttributeType::Long.is_integral());
        assert!(!AttributeType::Double.is_integral());
        assert!(!AttributeType::Str.is_integral());
    }

    #[test]
    fn serde_lowercase_names() {
        let ty: AttributeType = serde_json::from_str("\"long\"").unwrap();
        assert_eq!(ty, AttributeType::Long);
        assert_eq!(AttributeType::Str.to_string(), "string");
    }
}
