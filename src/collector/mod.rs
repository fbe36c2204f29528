//! Event collection for the flowstate sensor.
//!
//! Hosts either push [`EditEvent`]s directly into a
//! [`SampleBuffer`](crate::core::SampleBuffer) or replay them from JSON lines through a
//! [`ReplayCollector`].

pub mod replay;
pub mod types;

// Re-export commonly used types
pub use replay::{
    parse_line, read_events, CollectorConfig, CollectorError, ReplayCollector, ReplaySource,
};
pub use types::{EditEvent, EventStamper};
