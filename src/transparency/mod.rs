//! Transparency module for the flowstate sensor.
//!
//! Tracks and exposes what the sensor did with the edits it observed.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog,
    TransparencyStats,
};
