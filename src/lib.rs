//! Flowstate Sensor - behavioral flow-state estimation from text-edit events.
//!
//! The sensor turns a stream of edit events (one per keystroke, paste or deletion) into an
//! estimate of the typist's state: FOCUSED, FLOW, IDLE, THRASHING or FATIGUED. Separately, it can
//! rebuild per-key timings from a sample and export them in the CMU keystroke-dynamics layout.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Flowstate Sensor                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │  Collector  │──▶│   Sample    │──▶│  Features   │         │
//! │  │  (replay)   │   │   Buffer    │   │ (compute)   │         │
//! │  └─────────────┘   └─────────────┘   └─────────────┘         │
//! │                           │                 │                │
//! │                           ▼                 ▼                │
//! │                    ┌─────────────┐   ┌─────────────┐         │
//! │                    │  Keystroke  │   │ Classifier  │         │
//! │                    │   Record    │   │ (5 states)  │         │
//! │                    └─────────────┘   └─────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use flowstate_sensor::{AnalysisConfig, EditEvent, FlowState, SampleBuffer};
//!
//! let mut buffer = SampleBuffer::new(AnalysisConfig::default());
//! buffer.push(EditEvent::insert(0, 0, "f"));
//! buffer.push(EditEvent::insert(120, 120, "n"));
//!
//! assert_eq!(buffer.size(), 2);
//! assert_eq!(buffer.state().state, FlowState::Focused);
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod transparency;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use collector::{CollectorConfig, CollectorError, EditEvent, EventStamper, ReplayCollector};
pub use config::{AnalysisConfig, Config, ConfigError, RateThresholds, RecordConfig};
pub use core::{
    compute_features, extract_timing_record, next_state, FeatureVector, FlowClassifier,
    FlowState, KeystrokeError, ReportBuilder, Sample, SampleBuffer, StateReport, StateScores,
    StateSnapshot, TimingRecord,
};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Try to build a timing record from the newest sample that contains the target phrase.
///
/// Samples are tried newest first; each failure is logged and skipped.
pub fn newest_timing_record(
    samples: &[Sample],
    subject: u32,
    session_index: u32,
    rep: u32,
) -> Option<TimingRecord> {
    newest_record_with_end(samples, subject, session_index, rep).map(|(_, record)| record)
}

fn newest_record_with_end(
    samples: &[Sample],
    subject: u32,
    session_index: u32,
    rep: u32,
) -> Option<(i64, TimingRecord)> {
    samples.iter().rev().find_map(|sample| {
        match extract_timing_record(sample.as_slice(), subject, session_index, rep) {
            Ok(record) => sample.end().map(|end| (end, record)),
            Err(e) => {
                tracing::debug!(error = %e, events = sample.len(), "no timing record in sample");
                None
            }
        }
    })
}

/// Hands out each typed phrase at most once across repeated extraction attempts.
///
/// After a record is exported, only events newer than the sample it came from are searched,
/// so the next record needs the phrase to be typed again. Unexported phrases older than an
/// exported one are superseded.
#[derive(Debug, Clone, Default)]
pub struct RecordExporter {
    exported_through: Option<i64>,
}

impl RecordExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamp of the last event already covered by an exported record.
    pub fn exported_through(&self) -> Option<i64> {
        self.exported_through
    }

    /// Extract a record from events not yet exported, newest sample first.
    pub fn next_record(
        &mut self,
        samples: &[Sample],
        subject: u32,
        session_index: u32,
        rep: u32,
    ) -> Option<TimingRecord> {
        let fresh: Vec<Sample> = samples
            .iter()
            .filter_map(|sample| self.unexported(sample))
            .collect();

        let (end, record) = newest_record_with_end(&fresh, subject, session_index, rep)?;
        self.exported_through = Some(end);
        Some(record)
    }

    fn unexported(&self, sample: &Sample) -> Option<Sample> {
        let events: Vec<EditEvent> = match self.exported_through {
            Some(through) => sample
                .events
                .iter()
                .filter(|e| e.timestamp > through)
                .cloned()
                .collect(),
            None => sample.events.clone(),
        };
        (!events.is_empty()).then(|| Sample::new(events))
    }
}
