//! Transparency log of pipeline activity.
//!
//! Counts what the sensor did with the edits it saw. No event content is stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the current session.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Edit events pushed into the buffer
    events_ingested: AtomicU64,
    /// Samples closed by a context switch or flush
    samples_archived: AtomicU64,
    /// Classifier runs
    classifications: AtomicU64,
    /// Classifier runs that changed the state
    state_transitions: AtomicU64,
    /// Timing records written out
    records_exported: AtomicU64,
    /// Timing record attempts that failed
    records_skipped: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self {
            events_ingested: AtomicU64::new(0),
            samples_archived: AtomicU64::new(0),
            classifications: AtomicU64::new(0),
            state_transitions: AtomicU64::new(0),
            records_exported: AtomicU64::new(0),
            records_skipped: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that accumulates onto counters stored at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!(error = %e, "could not load previous transparency stats");
        }

        log
    }

    pub fn record_events(&self, count: u64) {
        self.events_ingested.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_samples_archived(&self, count: u64) {
        self.samples_archived.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_classifications(&self, count: u64) {
        self.classifications.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_state_transition(&self) {
        self.state_transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exported(&self) {
        self.records_exported.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.records_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            events_ingested: self.events_ingested.load(Ordering::Relaxed),
            samples_archived: self.samples_archived.load(Ordering::Relaxed),
            classifications: self.classifications.load(Ordering::Relaxed),
            state_transitions: self.state_transitions.load(Ordering::Relaxed),
            records_exported: self.records_exported.load(Ordering::Relaxed),
            records_skipped: self.records_skipped.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Edit events ingested: {}\n\
             - Samples archived: {}\n\
             - Classifications run: {}\n\
             - State transitions: {}\n\
             - Timing records exported: {}\n\
             - Timing records skipped: {}\n\
             - Session duration: {} seconds",
            stats.events_ingested,
            stats.samples_archived,
            stats.classifications,
            stats.state_transitions,
            stats.records_exported,
            stats.records_skipped,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                events_ingested: stats.events_ingested,
                samples_archived: stats.samples_archived,
                classifications: stats.classifications,
                state_transitions: stats.state_transitions,
                records_exported: stats.records_exported,
                records_skipped: stats.records_skipped,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.events_ingested
                    .store(persisted.events_ingested, Ordering::Relaxed);
                self.samples_archived
                    .store(persisted.samples_archived, Ordering::Relaxed);
                self.classifications
                    .store(persisted.classifications, Ordering::Relaxed);
                self.state_transitions
                    .store(persisted.state_transitions, Ordering::Relaxed);
                self.records_exported
                    .store(persisted.records_exported, Ordering::Relaxed);
                self.records_skipped
                    .store(persisted.records_skipped, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.events_ingested.store(0, Ordering::Relaxed);
        self.samples_archived.store(0, Ordering::Relaxed);
        self.classifications.store(0, Ordering::Relaxed);
        self.state_transitions.store(0, Ordering::Relaxed);
        self.records_exported.store(0, Ordering::Relaxed);
        self.records_skipped.store(0, Ordering::Relaxed);
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub events_ingested: u64,
    pub samples_archived: u64,
    pub classifications: u64,
    pub state_transitions: u64,
    pub records_exported: u64,
    pub records_skipped: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    events_ingested: u64,
    samples_archived: u64,
    classifications: u64,
    state_transitions: u64,
    records_exported: u64,
    records_skipped: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparency_log_counting() {
        let log = TransparencyLog::new();

        log.record_events(3);
        log.record_events(2);
        log.record_state_transition();
        log.record_skipped();

        let stats = log.stats();
        assert_eq!(stats.events_ingested, 5);
        assert_eq!(stats.state_transitions, 1);
        assert_eq!(stats.records_skipped, 1);
        assert_eq!(stats.records_exported, 0);
    }

    #[test]
    fn test_transparency_log_reset() {
        let log = TransparencyLog::new();

        log.record_events(100);
        log.record_classifications(7);
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.events_ingested, 0);
        assert_eq!(stats.classifications, 0);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats").join("transparency.json");

        let log = TransparencyLog::with_persistence(path.clone());
        log.record_events(12);
        log.record_samples_archived(2);
        log.record_exported();
        log.save().unwrap();

        let reloaded = TransparencyLog::with_persistence(path);
        let stats = reloaded.stats();
        assert_eq!(stats.events_ingested, 12);
        assert_eq!(stats.samples_archived, 2);
        assert_eq!(stats.records_exported, 1);
    }

    #[test]
    fn test_summary_format() {
        let summary = TransparencyLog::new().summary();

        assert!(summary.contains("Edit events ingested: 0"));
        assert!(summary.contains("State transitions"));
        assert!(summary.contains("Timing records skipped"));
    }
}
