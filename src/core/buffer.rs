//! Segmentation of the edit stream into samples.
//!
//! Events accumulate in an open sample until a long gap (a context switch) closes it. Three
//! triggers recompute the state snapshot: a context switch, the open sample spanning the
//! analysis length, and the rolling window overflowing its capacity.

use crate::collector::types::EditEvent;
use crate::config::AnalysisConfig;
use crate::core::classifier::{FlowClassifier, StateSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Upper bound on the open sample's up-front allocation; larger windows grow on demand.
const MAX_PREALLOCATED: usize = 4_096;

/// A run of events with no internal gap at or above the context-switch window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub events: Vec<EditEvent>,
}

impl Sample {
    pub fn new(events: Vec<EditEvent>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Timestamp of the first event.
    pub fn start(&self) -> Option<i64> {
        self.events.first().map(|e| e.timestamp)
    }

    /// Timestamp of the last event.
    pub fn end(&self) -> Option<i64> {
        self.events.last().map(|e| e.timestamp)
    }

    pub fn duration_ms(&self) -> i64 {
        match (self.start(), self.end()) {
            (Some(start), Some(end)) => end - start,
            _ => 0,
        }
    }

    /// Concatenated inserted text.
    pub fn text(&self) -> String {
        self.events.iter().map(|e| e.text.as_str()).collect()
    }

    pub fn as_slice(&self) -> &[EditEvent] {
        &self.events
    }
}

/// Why the buffer recomputed its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    ContextSwitch,
    AnalysisLength,
    Eviction,
    Flush,
}

/// Owns the open sample, the closed samples and the latest state snapshot.
///
/// Single writer: `push` takes `&mut self`, and every accessor hands out copies.
pub struct SampleBuffer {
    classifier: FlowClassifier,
    /// Rolling open sample, preallocated to capacity + 1
    open: VecDeque<EditEvent>,
    /// Archived samples, oldest first
    closed: Vec<Sample>,
    /// Latest snapshot
    state: StateSnapshot,
    /// Capacity overflows since the open sample was last cleared
    overflows: usize,
    /// Classifications run since creation
    recomputes: u64,
}

impl SampleBuffer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self::with_initial_state(config, StateSnapshot::initial())
    }

    /// Start from a known snapshot instead of Focused.
    pub fn with_initial_state(config: AnalysisConfig, state: StateSnapshot) -> Self {
        let capacity = config.max_window_size.saturating_add(1).min(MAX_PREALLOCATED);
        Self {
            classifier: FlowClassifier::new(config),
            open: VecDeque::with_capacity(capacity),
            closed: Vec::new(),
            state,
            overflows: 0,
            recomputes: 0,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        self.classifier.config()
    }

    /// Add an event.
    ///
    /// Events must arrive in non-decreasing timestamp order.
    pub fn push(&mut self, event: EditEvent) {
        let config = self.classifier.config();
        let context_switch_window = config.context_switch_window_ms;
        let max_length = config.max_length_for_analysis_ms;
        let max_size = config.max_window_size;
        let recompute_interval = config.eviction_recompute_interval.max(1);

        // Long gap: archive the open sample as-is and start a new episode
        if let Some(prev) = self.peek() {
            if event.timestamp.saturating_sub(prev.timestamp) >= context_switch_window {
                let sample = Sample::new(self.open.iter().cloned().collect());
                self.recompute(sample.as_slice(), Trigger::ContextSwitch);
                self.closed.push(sample);
                self.clear();
            }
        }

        let start = self.open.front().map(|e| e.timestamp);
        let timestamp = event.timestamp;
        self.open.push_back(event);

        // Periodic re-baseline; the raw sample is dropped, only the state survives
        if let Some(start) = start {
            if timestamp.saturating_sub(start) >= max_length {
                self.recompute_open(Trigger::AnalysisLength);
                self.clear();
                return;
            }
        }

        if self.open.len() > max_size {
            self.open.pop_front();
            if self.overflows % recompute_interval == 0 {
                self.recompute_open(Trigger::Eviction);
            }
            self.overflows += 1;
        }
    }

    /// Archive and classify the open sample, e.g. on shutdown.
    pub fn flush(&mut self) {
        if self.open.is_empty() {
            return;
        }
        let sample = Sample::new(self.open.iter().cloned().collect());
        self.recompute(sample.as_slice(), Trigger::Flush);
        self.closed.push(sample);
        self.clear();
    }

    /// The last computed snapshot. Stale between triggers.
    pub fn state(&self) -> StateSnapshot {
        self.state.clone()
    }

    /// Copy of the open sample.
    pub fn buffer(&self) -> Vec<EditEvent> {
        self.open.iter().cloned().collect()
    }

    /// Closed samples plus the open sample if it is non-empty.
    pub fn all_samples(&self) -> Vec<Sample> {
        let mut samples = self.closed.clone();
        if !self.open.is_empty() {
            samples.push(Sample::new(self.buffer()));
        }
        samples
    }

    pub fn closed_samples(&self) -> Vec<Sample> {
        self.closed.clone()
    }

    /// Most recently archived sample.
    pub fn latest_closed(&self) -> Option<Sample> {
        self.closed.last().cloned()
    }

    pub fn closed_count(&self) -> usize {
        self.closed.len()
    }

    /// Number of classifications run so far.
    pub fn recompute_count(&self) -> u64 {
        self.recomputes
    }

    /// Most recent event of the open sample.
    pub fn peek(&self) -> Option<&EditEvent> {
        self.open.back()
    }

    pub fn size(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Concatenated text of the open sample.
    pub fn open_text(&self) -> String {
        self.open.iter().map(|e| e.text.as_str()).collect()
    }

    /// Drop the open sample without classifying it.
    pub fn clear(&mut self) {
        self.open.clear();
        self.overflows = 0;
    }

    fn recompute_open(&mut self, trigger: Trigger) {
        let events: Vec<EditEvent> = self.open.make_contiguous().to_vec();
        self.recompute(&events, trigger);
    }

    fn recompute(&mut self, events: &[EditEvent], trigger: Trigger) {
        let next = self.classifier.transition(&self.state, events);
        self.recomputes += 1;
        tracing::debug!(
            ?trigger,
            events = events.len(),
            state = %next.state,
            "recomputed flow state"
        );
        if next.state != self.state.state {
            tracing::info!(from = %self.state.state, to = %next.state, "flow state changed");
        }
        self.state = next;
    }
}
