//! Exportable state reports.
//!
//! A report wraps one classified sample with producer metadata and wall-clock times so that
//! snapshots from several editors or sessions can be merged downstream.

use crate::core::buffer::Sample;
use crate::core::classifier::{FlowState, StateScores, StateSnapshot};
use crate::core::features::FeatureVector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Report format version.
pub const REPORT_VERSION: &str = "1.0";

/// The name of this producer.
pub const PRODUCER_NAME: &str = "flowstate-sensor";

/// Producer metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    /// Unique instance identifier (UUID)
    pub instance_id: String,
}

/// Time span and provenance of the classified sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSample {
    /// First event time (RFC3339)
    pub start: String,
    /// Last event time (RFC3339)
    pub end: String,
    pub events: usize,
    /// Distinct document identifiers seen in the sample
    pub source_ids: Vec<String>,
    /// Data quality (0-1) from event count
    pub quality: f64,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A classified sample ready for export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateReport {
    pub report_version: String,
    /// When the sample ended (RFC3339)
    pub observed_at_utc: String,
    /// When this report was built (RFC3339)
    pub computed_at_utc: String,
    pub producer: ReportProducer,
    pub sample: ReportSample,
    pub state: FlowState,
    pub scores: StateScores,
    pub features: FeatureVector,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<HashMap<String, serde_json::Value>>,
}

/// Builder for state reports.
pub struct ReportBuilder {
    instance_id: Uuid,
    session_id: Option<String>,
}

impl ReportBuilder {
    /// Create a new builder with a unique instance ID.
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            session_id: None,
        }
    }

    /// Set the session ID for generated reports.
    pub fn with_session_id(mut self, session_id: String) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Build a report for a sample and the snapshot computed from it.
    pub fn build(&self, sample: &Sample, snapshot: &StateSnapshot) -> StateReport {
        let computed_at = Utc::now();
        let start = sample.start().map_or(computed_at, |ms| to_utc(ms, computed_at));
        let end = sample.end().map_or(computed_at, |ms| to_utc(ms, computed_at));

        let events = sample.len();
        let quality = if events == 0 {
            0.0
        } else if events < 10 {
            0.5
        } else if events < 50 {
            0.75
        } else {
            0.95
        };

        let source_ids: Vec<String> = sample
            .events
            .iter()
            .filter(|e| !e.source_id.is_empty())
            .map(|e| e.source_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut meta = HashMap::new();
        meta.insert(
            "duration_ms".to_string(),
            serde_json::Value::from(sample.duration_ms()),
        );
        if let Some(ref session_id) = self.session_id {
            meta.insert(
                "session_id".to_string(),
                serde_json::Value::String(session_id.clone()),
            );
        }

        StateReport {
            report_version: REPORT_VERSION.to_string(),
            observed_at_utc: end.to_rfc3339(),
            computed_at_utc: computed_at.to_rfc3339(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                instance_id: self.instance_id.to_string(),
            },
            sample: ReportSample {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
                events,
                source_ids,
                quality,
                degraded: events < 10,
                notes: if events < 10 {
                    Some("Low event count in sample".to_string())
                } else {
                    None
                },
            },
            state: snapshot.state,
            scores: snapshot.scores,
            features: snapshot.features.clone(),
            meta: Some(meta),
        }
    }

    /// Build and serialize a report to JSON.
    pub fn build_json(&self, sample: &Sample, snapshot: &StateSnapshot) -> String {
        let report = self.build(sample, snapshot);
        serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn to_utc(millis: i64, fallback: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(fallback)
}
