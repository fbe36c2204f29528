//! Feature computation from samples.
//!
//! Every function here is total: empty input and zero durations produce zeros instead of
//! errors, so the always-on classification path can never fail.

use crate::collector::types::EditEvent;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Gaps at or below this are fluent typing (milliseconds).
pub const BURST_MAX_GAP_MS: i64 = 200;

/// Gaps at or above this are pauses (milliseconds).
pub const PAUSE_MIN_GAP_MS: i64 = 2_000;

/// Numeric summary of one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    /// Time span between the first and last event
    pub duration_ms: i64,
    /// Event count
    pub events: usize,

    // Editing friction
    /// Inserted characters
    pub ins: u64,
    /// Deleted characters
    pub del: u64,
    /// `max(0, ins - del)`
    pub net: u64,
    /// `del / max(1, ins)`
    pub delete_ratio: f64,
    /// `(ins + del) / max(1, net)`
    pub churn: f64,

    // Rhythm
    /// Fraction of events with `0 < dt <= 200ms`
    pub burst_fraction: f64,
    /// Events with `dt >= 2s` per minute
    pub bursts_per_min: f64,
    pub events_per_min: f64,
    /// Population standard deviation of inter-event gaps
    pub gap_variability_ms: f64,

    // Pauses and breaks
    /// Share of the duration spent in gaps between 2s and the break window
    pub pause_fraction: f64,
    /// Gaps longer than the break window
    pub breaks: u32,
    pub breaks_per_min: f64,
    pub median_break_ms: f64,

    // Reserved for cross-sample trend analysis
    pub pause_trend_slope: f64,
    pub struggle_share: f64,
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self {
            duration_ms: 0,
            events: 0,
            ins: 0,
            del: 0,
            net: 0,
            delete_ratio: 0.0,
            churn: 1.0,
            burst_fraction: 0.0,
            bursts_per_min: 0.0,
            events_per_min: 0.0,
            gap_variability_ms: 0.0,
            pause_fraction: 0.0,
            breaks: 0,
            breaks_per_min: 0.0,
            median_break_ms: 0.0,
            pause_trend_slope: 0.0,
            struggle_share: 0.0,
        }
    }
}

/// Compute the feature vector of a sample.
pub fn compute_features(events: &[EditEvent], break_window_ms: i64) -> FeatureVector {
    let duration_ms = total_duration(events);
    let minutes = duration_ms as f64 / 60_000.0;

    let friction = friction_metrics(events);

    let burst_events = events
        .iter()
        .filter(|e| e.delta_time > 0 && e.delta_time <= BURST_MAX_GAP_MS)
        .count();
    let long_gap_events = events
        .iter()
        .filter(|e| e.delta_time >= PAUSE_MIN_GAP_MS)
        .count();

    let breaks = break_count(events, break_window_ms);

    FeatureVector {
        duration_ms,
        events: events.len(),
        ins: friction.ins,
        del: friction.del,
        net: friction.net,
        delete_ratio: friction.delete_ratio,
        churn: friction.churn,
        burst_fraction: ratio(burst_events as f64, events.len() as f64),
        bursts_per_min: ratio(long_gap_events as f64, minutes),
        events_per_min: events_per_minute(events),
        gap_variability_ms: gap_variability(events),
        pause_fraction: pause_fraction(events, PAUSE_MIN_GAP_MS, break_window_ms),
        breaks,
        breaks_per_min: ratio(breaks as f64, minutes),
        median_break_ms: median_break_ms(events, break_window_ms),
        pause_trend_slope: 0.0,
        struggle_share: 0.0,
    }
}

/// Drop events that are unlikely to be single keystrokes (paste, bulk delete).
pub fn clean_anomalies(events: &[EditEvent]) -> Vec<EditEvent> {
    events
        .iter()
        .filter(|e| e.deleted_chars <= 1 && e.inserted_chars() <= 1)
        .cloned()
        .collect()
}

/// Time covered by the sample in milliseconds.
pub fn total_duration(events: &[EditEvent]) -> i64 {
    match (events.first(), events.last()) {
        (Some(first), Some(last)) => last.timestamp - first.timestamp,
        _ => 0,
    }
}

/// Events per minute over the sample's duration.
pub fn events_per_minute(events: &[EditEvent]) -> f64 {
    let minutes = total_duration(events) as f64 / 60_000.0;
    ratio(events.len() as f64, minutes)
}

/// Insert/delete totals and the ratios derived from them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrictionMetrics {
    pub ins: u64,
    pub del: u64,
    pub net: u64,
    pub delete_ratio: f64,
    pub churn: f64,
}

/// Compute all friction metrics at once.
pub fn friction_metrics(events: &[EditEvent]) -> FrictionMetrics {
    let ins: u64 = events.iter().map(|e| e.inserted_chars() as u64).sum();
    let del: u64 = events.iter().map(|e| u64::from(e.deleted_chars)).sum();
    let net = ins.saturating_sub(del);

    FrictionMetrics {
        ins,
        del,
        net,
        delete_ratio: del as f64 / ins.max(1) as f64,
        churn: (ins + del) as f64 / net.max(1) as f64,
    }
}

/// Fraction of the sample's duration spent in medium pauses.
pub fn pause_fraction(events: &[EditEvent], min_pause_ms: i64, max_pause_ms: i64) -> f64 {
    let duration = total_duration(events);
    if duration <= 0 {
        return 0.0;
    }

    let paused_ms: i64 = events
        .iter()
        .filter(|e| e.delta_time >= min_pause_ms && e.delta_time <= max_pause_ms)
        .map(|e| e.delta_time)
        .sum();

    paused_ms as f64 / duration as f64
}

/// Count of gaps longer than the break window.
pub fn break_count(events: &[EditEvent], break_ms: i64) -> u32 {
    events.iter().filter(|e| e.delta_time > break_ms).count() as u32
}

/// Median length of the gaps longer than the break window.
pub fn median_break_ms(events: &[EditEvent], break_ms: i64) -> f64 {
    let breaks: Vec<f64> = events
        .iter()
        .filter(|e| e.delta_time > break_ms)
        .map(|e| e.delta_time as f64)
        .collect();
    median(&breaks).unwrap_or(0.0)
}

/// Standard median; `None` for an empty slice.
pub(crate) fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

fn gap_variability(events: &[EditEvent]) -> f64 {
    if events.len() < 2 {
        return 0.0;
    }
    let sd = events
        .iter()
        .map(|e| e.delta_time as f64)
        .population_std_dev();
    if sd.is_finite() {
        sd
    } else {
        0.0
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(timestamp: i64, delta_time: i64, text: &str) -> EditEvent {
        EditEvent::insert(timestamp, delta_time, text)
    }

    fn with_gaps(gaps: &[i64]) -> Vec<EditEvent> {
        let mut ts = 0;
        let mut events = vec![typed(ts, 0, "a")];
        for &gap in gaps {
            ts += gap;
            events.push(typed(ts, gap, "a"));
        }
        events
    }

    #[test]
    fn test_empty_sample_is_neutral() {
        let features = compute_features(&[], 2_000);
        assert_eq!(features.duration_ms, 0);
        assert_eq!(features.events, 0);
        assert_eq!(features.burst_fraction, 0.0);
        assert_eq!(features.bursts_per_min, 0.0);
        assert_eq!(features.pause_fraction, 0.0);
        assert_eq!(features.median_break_ms, 0.0);
        assert_eq!(features.pause_trend_slope, 0.0);
        assert_eq!(features.struggle_share, 0.0);
    }

    #[test]
    fn test_default_vector_has_unit_churn() {
        let features = FeatureVector::default();
        assert_eq!(features.churn, 1.0);
        assert_eq!(features.delete_ratio, 0.0);
    }

    #[test]
    fn test_friction_metrics() {
        let events = vec![
            typed(0, 0, "a"),
            typed(100, 100, "b"),
            typed(200, 100, "c"),
            EditEvent::delete(300, 100, 1),
        ];
        let features = compute_features(&events, 2_000);

        assert_eq!(features.ins, 3);
        assert_eq!(features.del, 1);
        assert_eq!(features.net, 2);
        assert!((features.delete_ratio - 1.0 / 3.0).abs() < 1e-12);
        assert!((features.churn - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_delete_ratio_without_insertions() {
        let events = vec![EditEvent::delete(0, 0, 4), EditEvent::delete(50, 50, 3)];
        let features = compute_features(&events, 2_000);

        assert_eq!(features.ins, 0);
        assert_eq!(features.net, 0);
        assert_eq!(features.delete_ratio, 7.0);
        assert_eq!(features.churn, 7.0);
    }

    #[test]
    fn test_friction_ratios_never_negative() {
        for events in [
            vec![],
            vec![typed(0, 0, "")],
            vec![EditEvent::delete(0, 0, 10)],
            with_gaps(&[10, 20, 30]),
        ] {
            let features = compute_features(&events, 2_000);
            assert!(features.churn >= 0.0);
            assert!(features.delete_ratio >= 0.0);
        }
    }

    #[test]
    fn test_burst_fraction_excludes_zero_gaps() {
        // First event has dt = 0 and is not a burst
        let events = with_gaps(&[100, 200, 201]);
        let features = compute_features(&events, 2_000);
        assert_eq!(features.burst_fraction, 0.5);
    }

    #[test]
    fn test_bursts_per_min_counts_long_gaps() {
        // 60s duration, three gaps of at least 2s
        let events = with_gaps(&[2_000, 3_000, 55_000]);
        let features = compute_features(&events, 100_000);
        assert_eq!(features.duration_ms, 60_000);
        assert_eq!(features.bursts_per_min, 3.0);
    }

    #[test]
    fn test_pause_fraction_uses_break_window() {
        // 2s and 4s pauses count with a 5s break window, the 6s gap is a break
        let events = with_gaps(&[2_000, 4_000, 6_000, 8_000]);
        let features = compute_features(&events, 5_000);

        assert_eq!(features.duration_ms, 20_000);
        assert!((features.pause_fraction - 6_000.0 / 20_000.0).abs() < 1e-12);
        assert_eq!(features.breaks, 2);
        assert!((features.breaks_per_min - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_median_break_ms() {
        assert_eq!(median_break_ms(&with_gaps(&[6_000, 8_000]), 5_000), 7_000.0);
        assert_eq!(median_break_ms(&with_gaps(&[9_000]), 5_000), 9_000.0);
        assert_eq!(median_break_ms(&with_gaps(&[]), 5_000), 0.0);
        assert_eq!(median_break_ms(&with_gaps(&[100, 9_000, 200]), 5_000), 9_000.0);
    }

    #[test]
    fn test_events_per_minute() {
        // 11 events over one second
        let events = with_gaps(&[100; 10]);
        assert!((events_per_minute(&events) - 660.0).abs() < 1e-9);
        assert_eq!(events_per_minute(&events[..1]), 0.0);
    }

    #[test]
    fn test_gap_variability() {
        let steady = with_gaps(&[100, 100, 100]);
        let features = compute_features(&steady, 2_000);
        // Gaps are 0, 100, 100, 100
        assert!((features.gap_variability_ms - 43.30127018922193).abs() < 1e-9);

        let single = compute_features(&steady[..1], 2_000);
        assert_eq!(single.gap_variability_ms, 0.0);
    }

    #[test]
    fn test_clean_anomalies() {
        let events = vec![
            typed(0, 0, "a"),
            typed(10, 10, "pasted text"),
            EditEvent::delete(20, 10, 1),
            EditEvent::delete(30, 10, 12),
        ];
        let cleaned = clean_anomalies(&events);

        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].text, "a");
        assert_eq!(cleaned[1].deleted_chars, 1);
    }

    #[test]
    fn test_camel_case_field_names() {
        let json = serde_json::to_value(FeatureVector::default()).unwrap();
        for key in [
            "durationMs",
            "deleteRatio",
            "burstFraction",
            "burstsPerMin",
            "pauseFraction",
            "breaksPerMin",
            "medianBreakMs",
            "pauseTrendSlope",
            "struggleShare",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }
}
