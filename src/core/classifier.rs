//! Behavioral state classification.
//!
//! Each state gets a 0-1 score from the sample's feature vector. The previous snapshot is fed
//! back in so that a state, once entered, is kept until its score drops below a lower exit
//! threshold.

use crate::collector::types::EditEvent;
use crate::config::{AnalysisConfig, RateThresholds};
use crate::core::features::{clean_anomalies, compute_features, FeatureVector};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Behavioral state of the person typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowState {
    /// Default and residual state
    #[default]
    Focused,
    /// Fast, fluent, low-friction typing
    Flow,
    /// Stop-start rhythm with frequent breaks
    #[serde(alias = "HESITATING")]
    Idle,
    /// Inhumanly fast input (keyboard mashing)
    Thrashing,
    /// Slowing down and making more corrections
    Fatigued,
}

impl FlowState {
    pub const ALL: [FlowState; 5] = [
        FlowState::Focused,
        FlowState::Flow,
        FlowState::Idle,
        FlowState::Thrashing,
        FlowState::Fatigued,
    ];

    /// Entry order of the non-residual states, rarer and higher-impact first.
    pub const PRIORITY: [FlowState; 4] = [
        FlowState::Fatigued,
        FlowState::Thrashing,
        FlowState::Idle,
        FlowState::Flow,
    ];

    /// Enter/exit thresholds. `None` for Focused, which is never entered by threshold.
    pub fn hysteresis(self) -> Option<Hysteresis> {
        match self {
            FlowState::Focused => None,
            FlowState::Flow => Some(Hysteresis::new(0.70, 0.50)),
            FlowState::Thrashing => Some(Hysteresis::new(0.70, 0.50)),
            FlowState::Idle => Some(Hysteresis::new(0.65, 0.45)),
            FlowState::Fatigued => Some(Hysteresis::new(0.75, 0.55)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FlowState::Focused => "FOCUSED",
            FlowState::Flow => "FLOW",
            FlowState::Idle => "IDLE",
            FlowState::Thrashing => "THRASHING",
            FlowState::Fatigued => "FATIGUED",
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asymmetric thresholds; `exit` is always below `enter`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hysteresis {
    pub enter: f64,
    pub exit: f64,
}

impl Hysteresis {
    const fn new(enter: f64, exit: f64) -> Self {
        Self { enter, exit }
    }
}

/// Confidence per state, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct StateScores {
    pub focused: f64,
    pub flow: f64,
    #[serde(alias = "HESITATING")]
    pub idle: f64,
    pub thrashing: f64,
    pub fatigued: f64,
}

impl StateScores {
    pub fn get(&self, state: FlowState) -> f64 {
        match state {
            FlowState::Focused => self.focused,
            FlowState::Flow => self.flow,
            FlowState::Idle => self.idle,
            FlowState::Thrashing => self.thrashing,
            FlowState::Fatigued => self.fatigued,
        }
    }
}

impl Default for StateScores {
    fn default() -> Self {
        Self {
            focused: 1.0,
            flow: 0.0,
            idle: 0.0,
            thrashing: 0.0,
            fatigued: 0.0,
        }
    }
}

/// Result of one classification.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub state: FlowState,
    pub scores: StateScores,
    pub features: FeatureVector,
}

impl StateSnapshot {
    /// Focused with full confidence and a neutral feature vector.
    pub fn initial() -> Self {
        Self::default()
    }
}

/// Scores samples and applies hysteresis against the previous snapshot.
#[derive(Debug, Clone, Default)]
pub struct FlowClassifier {
    config: AnalysisConfig,
}

impl FlowClassifier {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Compute the next snapshot. Pure and total.
    pub fn transition(&self, previous: &StateSnapshot, events: &[EditEvent]) -> StateSnapshot {
        let features = if self.config.filter_anomalies {
            compute_features(&clean_anomalies(events), self.config.break_window_ms)
        } else {
            compute_features(events, self.config.break_window_ms)
        };

        let scores = score_all(&features, &self.config.rates);
        let state = select_state(previous.state, &scores);

        StateSnapshot {
            state,
            scores,
            features,
        }
    }
}

/// One-shot form of [`FlowClassifier::transition`].
pub fn next_state(
    previous: &StateSnapshot,
    events: &[EditEvent],
    config: &AnalysisConfig,
) -> StateSnapshot {
    FlowClassifier::new(config.clone()).transition(previous, events)
}

/// Score every state for a feature vector.
pub fn score_all(features: &FeatureVector, rates: &RateThresholds) -> StateScores {
    let flow = score_flow(features, rates);
    let thrashing = score_thrashing(features, rates);
    let idle = score_idle(features);
    let fatigued = score_fatigued(features, rates);
    let focused = clamp01(1.0 - flow.max(thrashing).max(idle).max(fatigued));

    StateScores {
        focused,
        flow,
        idle,
        thrashing,
        fatigued,
    }
}

/// Pick the state for a set of scores given the previous state.
pub fn select_state(previous: FlowState, scores: &StateScores) -> FlowState {
    if scores.thrashing >= 1.0 {
        return FlowState::Thrashing;
    }

    if let Some(thresholds) = previous.hysteresis() {
        if scores.get(previous) >= thresholds.exit {
            return previous;
        }
    }

    FlowState::PRIORITY
        .into_iter()
        .find(|state| {
            state
                .hysteresis()
                .is_some_and(|thresholds| scores.get(*state) >= thresholds.enter)
        })
        .unwrap_or(FlowState::Focused)
}

/// FLOW: faster than normal, bursty, few pauses, low churn.
fn score_flow(f: &FeatureVector, rates: &RateThresholds) -> f64 {
    let speed = ramp(f.events_per_min, rates.normal, rates.fast);
    let burst = ramp(f.burst_fraction, 0.35, 0.70);
    let low_pause = clamp01(1.0 - f.pause_fraction / 0.20);
    let low_churn = clamp01(1.0 - f.churn / 2.5);
    clamp01(0.60 * speed + 0.30 * burst + 0.20 * low_pause + 0.15 * low_churn)
}

/// THRASHING: zero below the smash rate, 1.0 at twice it.
fn score_thrashing(f: &FeatureVector, rates: &RateThresholds) -> f64 {
    if f.events_per_min <= rates.smash {
        return 0.0;
    }
    ramp(f.events_per_min, rates.smash, 2.0 * rates.smash)
}

/// IDLE: frequent and long breaks, medium pauses.
fn score_idle(f: &FeatureVector) -> f64 {
    let breaks = clamp01(f.breaks_per_min / 3.0);
    let median = clamp01(f.median_break_ms / 12_000.0);
    let pause = clamp01(f.pause_fraction / 0.30);
    clamp01(0.45 * breaks + 0.35 * median + 0.20 * pause)
}

/// FATIGUED: slower than normal, few bursts, more pauses and rewriting.
fn score_fatigued(f: &FeatureVector, rates: &RateThresholds) -> f64 {
    // A zero-length sample says nothing about rate
    let slowdown = if f.duration_ms > 0 {
        ramp(rates.normal - f.events_per_min, 0.0, rates.normal - rates.slow)
    } else {
        0.0
    };
    let low_burst = clamp01(1.0 - f.burst_fraction / 0.35);
    let pause = clamp01(f.pause_fraction / 0.30);
    let churn = clamp01((f.churn - 1.0) / 2.0);
    clamp01(0.40 * slowdown + 0.20 * low_burst + 0.20 * pause + 0.20 * churn)
}

/// Linear 0→1 between `lo` and `hi`, clamped.
fn ramp(value: f64, lo: f64, hi: f64) -> f64 {
    if hi <= lo {
        return if value >= hi { 1.0 } else { 0.0 };
    }
    clamp01((value - lo) / (hi - lo))
}

fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Single-character insertions at a fixed gap.
    fn steady(count: usize, gap_ms: i64) -> Vec<EditEvent> {
        (0..count)
            .map(|i| {
                let delta = if i == 0 { 0 } else { gap_ms };
                EditEvent::insert(i as i64 * gap_ms, delta, "a")
            })
            .collect()
    }

    fn snapshot_in(state: FlowState) -> StateSnapshot {
        StateSnapshot {
            state,
            ..StateSnapshot::initial()
        }
    }

    fn classifier() -> FlowClassifier {
        FlowClassifier::new(AnalysisConfig::default())
    }

    #[test]
    fn test_initial_snapshot() {
        let snapshot = StateSnapshot::initial();
        assert_eq!(snapshot.state, FlowState::Focused);
        assert_eq!(snapshot.scores.focused, 1.0);
        assert_eq!(snapshot.features.churn, 1.0);
    }

    #[test]
    fn test_empty_sample_stays_focused() {
        let next = classifier().transition(&StateSnapshot::initial(), &[]);
        assert_eq!(next.state, FlowState::Focused);
        for state in FlowState::ALL {
            let score = next.scores.get(state);
            assert!((0.0..=1.0).contains(&score), "{state}: {score}");
        }
    }

    #[test]
    fn test_thrashing_override_ignores_previous_state() {
        // 21 events in one second = 1260 events/min, above twice the smash rate
        let events = steady(21, 50);
        for previous in FlowState::ALL {
            let next = classifier().transition(&snapshot_in(previous), &events);
            assert_eq!(next.state, FlowState::Thrashing);
            assert_eq!(next.scores.thrashing, 1.0);
        }
    }

    #[test]
    fn test_thrashing_is_gated_by_smash_rate() {
        let rates = RateThresholds::default();
        let mut features = FeatureVector {
            events_per_min: rates.smash,
            duration_ms: 60_000,
            ..FeatureVector::default()
        };
        assert_eq!(score_thrashing(&features, &rates), 0.0);

        features.events_per_min = rates.smash * 1.5;
        assert!((score_thrashing(&features, &rates) - 0.5).abs() < 1e-12);

        features.events_per_min = rates.smash * 2.0;
        assert_eq!(score_thrashing(&features, &rates), 1.0);
    }

    fn strict_classifier() -> FlowClassifier {
        FlowClassifier::new(AnalysisConfig {
            rates: RateThresholds::strict(),
            ..AnalysisConfig::default()
        })
    }

    #[test]
    fn test_enters_flow() {
        // 11 events 120ms apart, 550 events/min
        let next = classifier().transition(&StateSnapshot::initial(), &steady(11, 120));
        assert_eq!(next.state, FlowState::Flow);
        assert!(next.scores.flow >= 0.70);
        assert_eq!(next.scores.thrashing, 0.0);
    }

    #[test]
    fn test_fast_typing_is_not_thrashing() {
        // 150ms and 250ms gaps: 440 and 264 events/min
        for gap in [150, 250] {
            let next = classifier().transition(&snapshot_in(FlowState::Flow), &steady(11, gap));
            assert_eq!(next.scores.thrashing, 0.0, "gap {gap}ms");
            assert_ne!(next.state, FlowState::Thrashing, "gap {gap}ms");
        }

        // The strict thresholds read 4 keys per second as smashing
        let next = strict_classifier().transition(&StateSnapshot::initial(), &steady(11, 250));
        assert_eq!(next.state, FlowState::Thrashing);
    }

    #[test]
    fn test_flow_is_sticky_between_thresholds() {
        // 11 events 1100ms apart, 60 events/min: flow score near 0.59 with strict rates
        let events = steady(11, 1_100);

        let from_focused = strict_classifier().transition(&StateSnapshot::initial(), &events);
        assert!(from_focused.scores.flow > 0.50 && from_focused.scores.flow < 0.70);
        assert_eq!(from_focused.state, FlowState::Focused);

        let from_flow = strict_classifier().transition(&snapshot_in(FlowState::Flow), &events);
        assert_eq!(from_flow.state, FlowState::Flow);
    }

    #[test]
    fn test_leaves_state_below_exit_threshold() {
        let events = steady(11, 1_100);
        let next = classifier().transition(&snapshot_in(FlowState::Idle), &events);
        assert!(next.scores.idle < 0.45);
        assert_eq!(next.state, FlowState::Focused);
    }

    #[test]
    fn test_enters_idle() {
        // Four 8s breaks: 7.5 breaks/min, median 8s
        let next = classifier().transition(&StateSnapshot::initial(), &steady(5, 8_000));
        assert_eq!(next.state, FlowState::Idle);
        assert!(next.scores.idle >= 0.65);
    }

    #[test]
    fn test_enters_fatigued() {
        let gap = 4_000;
        let mut events: Vec<EditEvent> = ["a", "b", "c", "d"]
            .iter()
            .enumerate()
            .map(|(i, t)| EditEvent::insert(i as i64 * gap, if i == 0 { 0 } else { gap }, *t))
            .collect();
        events.push(EditEvent::delete(4 * gap, gap, 1));
        events.push(EditEvent::delete(5 * gap, gap, 1));

        let next = classifier().transition(&StateSnapshot::initial(), &events);
        assert_eq!(next.features.churn, 3.0);
        assert!(next.scores.fatigued >= 0.75);
        // Fatigued outranks Idle
        assert_eq!(next.state, FlowState::Fatigued);
    }

    #[test]
    fn test_focused_is_residual() {
        let next = classifier().transition(&StateSnapshot::initial(), &steady(11, 700));
        let max_other = next
            .scores
            .flow
            .max(next.scores.idle)
            .max(next.scores.thrashing)
            .max(next.scores.fatigued);
        assert!((next.scores.focused - (1.0 - max_other)).abs() < 1e-12);
    }

    #[test]
    fn test_transition_is_pure() {
        let events = steady(30, 150);
        let previous = snapshot_in(FlowState::Idle);
        let first = classifier().transition(&previous, &events);
        let second = classifier().transition(&previous, &events);
        assert_eq!(first, second);
        assert_eq!(first, next_state(&previous, &events, &AnalysisConfig::default()));
    }

    #[test]
    fn test_anomaly_filter_is_opt_in() {
        let mut events = steady(11, 700);
        events.push(EditEvent::insert(7_100, 100, "a whole pasted paragraph"));

        let raw = classifier().transition(&StateSnapshot::initial(), &events);
        assert_eq!(raw.features.events, 12);

        let config = AnalysisConfig {
            filter_anomalies: true,
            ..AnalysisConfig::default()
        };
        let filtered = FlowClassifier::new(config).transition(&StateSnapshot::initial(), &events);
        assert_eq!(filtered.features.events, 11);
        assert_eq!(filtered.features.ins, 11);
    }

    #[test]
    fn test_priority_order() {
        let scores = StateScores {
            focused: 0.0,
            flow: 0.9,
            idle: 0.9,
            thrashing: 0.9,
            fatigued: 0.9,
        };
        assert_eq!(select_state(FlowState::Focused, &scores), FlowState::Fatigued);

        let scores = StateScores {
            fatigued: 0.6,
            ..scores
        };
        assert_eq!(select_state(FlowState::Focused, &scores), FlowState::Thrashing);
        // Fatigued is kept once entered while above its exit threshold
        assert_eq!(select_state(FlowState::Fatigued, &scores), FlowState::Fatigued);
    }

    #[test]
    fn test_exit_below_enter_for_every_state() {
        for state in FlowState::PRIORITY {
            let h = state.hysteresis().unwrap();
            assert!(h.exit < h.enter, "{state}");
        }
        assert!(FlowState::Focused.hysteresis().is_none());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(serde_json::to_string(&FlowState::Idle).unwrap(), "\"IDLE\"");
        let legacy: FlowState = serde_json::from_str("\"HESITATING\"").unwrap();
        assert_eq!(legacy, FlowState::Idle);

        let json = serde_json::to_value(StateScores::default()).unwrap();
        assert_eq!(json["FOCUSED"], 1.0);
        assert_eq!(json["THRASHING"], 0.0);
    }
}
