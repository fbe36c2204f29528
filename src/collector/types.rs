//! Edit event types for the flowstate sensor.
//!
//! An [`EditEvent`] is the only input surface of the pipeline. Any source that can produce a
//! monotonic stream of these records (an editor, a terminal, a synthetic harness) can drive it.

use serde::{Deserialize, Serialize};

/// A single text-edit event.
///
/// `text` holds at most one character for ordinary keystrokes. An empty `text` denotes a pure
/// deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditEvent {
    /// Wall-clock time of the edit in milliseconds
    pub timestamp: i64,
    /// Milliseconds since the previous edit (0 for the first event)
    #[serde(default)]
    pub delta_time: i64,
    /// Inserted text
    #[serde(default)]
    pub text: String,
    /// Number of characters removed by this edit
    #[serde(rename = "deletedChars", alias = "deleted_chars", default)]
    pub deleted_chars: u32,
    /// Identifier of the document or buffer that produced the edit
    #[serde(
        rename = "sourceId",
        alias = "source_id",
        alias = "fileName",
        default
    )]
    pub source_id: String,
}

impl EditEvent {
    /// Create an insertion event.
    pub fn insert(timestamp: i64, delta_time: i64, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            delta_time,
            text: text.into(),
            deleted_chars: 0,
            source_id: String::new(),
        }
    }

    /// Create a pure deletion event.
    pub fn delete(timestamp: i64, delta_time: i64, deleted_chars: u32) -> Self {
        Self {
            timestamp,
            delta_time,
            text: String::new(),
            deleted_chars,
            source_id: String::new(),
        }
    }

    /// Attach a source identifier.
    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self
    }

    /// Number of inserted characters (not bytes).
    pub fn inserted_chars(&self) -> usize {
        self.text.chars().count()
    }

    /// Whether this edit removes text without inserting any.
    pub fn is_deletion(&self) -> bool {
        self.text.is_empty() || self.deleted_chars > 0
    }
}

/// Fills `delta_time` from successive timestamps.
///
/// Hosts that only know absolute timestamps feed edits through a stamper so the first event
/// gets a delta of 0 and every later one gets the gap to its predecessor.
#[derive(Debug, Default, Clone)]
pub struct EventStamper {
    last_timestamp: Option<i64>,
}

impl EventStamper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an event, computing its delta from the previously stamped one.
    pub fn stamp(
        &mut self,
        timestamp: i64,
        text: impl Into<String>,
        deleted_chars: u32,
        source_id: impl Into<String>,
    ) -> EditEvent {
        let delta_time = match self.last_timestamp {
            Some(last) => (timestamp - last).max(0),
            None => 0,
        };
        self.last_timestamp = Some(timestamp);

        EditEvent {
            timestamp,
            delta_time,
            text: text.into(),
            deleted_chars,
            source_id: source_id.into(),
        }
    }

    /// Forget the previous timestamp so the next event starts at delta 0.
    pub fn reset(&mut self) {
        self.last_timestamp = None;
    }
}
