//! # Vispar Core
//!
//! Foundational types shared by the Vispar stream operators.
//!
//! Sensor streams deliver timestamped, typed attribute events. This crate holds
//! the pieces of that model every operator needs without pulling in the
//! runtime:
//!
//! - [`value`]: runtime values carried in event fields and passed to operators
//! - [`types`]: declared attribute domains, used to validate operator arguments
//!   once at pattern-compile time
//!
//! ## Quick Start
//!
//! ```rust
//! use vispar_core::{AttributeType, Value};
//!
//! let reading = Value::from("warm");
//! assert_eq!(reading.as_str(), Some("warm"));
//! assert!(AttributeType::Long.is_integral());
//! ```

pub mod types;
pub mod value;

pub use types::{AttributeType, EventTime};
pub use value::Value;
