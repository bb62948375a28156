//! Vispar Runtime - stateful stream operators for sensor pattern matching
//!
//! Operators are built once through the [`OperatorRegistry`], which validates
//! their arguments, and then driven per event by the host engine:
//!
//! - [`window::HybridWindow`]: sliding window bounded by count and age, with
//!   proactive expiry through a [`clock::Scheduler`]
//! - [`aggregation`]: incremental string min/max/median-pick/concat and an
//!   event counter
//! - [`correlator`]: rising-edge AND over two integral inputs, and a
//!   null-aware string comparator
//! - [`actor`]: a tokio task that owns one window and its expiry timer
//!
//! Every operator snapshots into a versioned [`persistence::OperatorCheckpoint`].

pub mod actor;
pub mod aggregation;
pub mod clock;
pub mod config;
pub mod correlator;
pub mod error;
pub mod event;
pub mod logging;
pub mod persistence;
pub mod registry;
pub mod window;

pub use actor::{WindowActor, WindowHandle};
pub use aggregation::{
    EventCounter, IncrementalAggregator, StringConcatenator, StringMaximum, StringMedianPick,
    StringMinimum,
};
pub use clock::{Clock, ManualClock, RecordingScheduler, Scheduler, SystemClock, TokioClock};
pub use config::RuntimeConfig;
pub use correlator::{RisingEdgeCorrelator, StringComparator};
pub use error::{ConfigError, OperatorError, StateError};
pub use event::{Event, EventKind};
pub use logging::init_tracing;
pub use persistence::{Checkpointable, OperatorCheckpoint, CHECKPOINT_VERSION};
pub use registry::{Operator, OperatorArg, OperatorRegistry};
pub use window::{Admission, HybridWindow};
