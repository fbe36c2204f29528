//! Core functionality for the flowstate sensor.
//!
//! This module contains:
//! - Sample buffering and the classification triggers
//! - Feature computation from samples
//! - Flow-state classification with hysteresis
//! - Keystroke-dynamics record extraction
//! - State report building for export

pub mod buffer;
pub mod classifier;
pub mod features;
pub mod keystroke;
pub mod report;

// Re-export commonly used types
pub use buffer::{Sample, SampleBuffer, Trigger};
pub use classifier::{next_state, FlowClassifier, FlowState, StateScores, StateSnapshot};
pub use features::{compute_features, FeatureVector};
pub use keystroke::{extract_timing_record, KeystrokeError, TimingRecord};
pub use report::{ReportBuilder, StateReport, PRODUCER_NAME, REPORT_VERSION};
