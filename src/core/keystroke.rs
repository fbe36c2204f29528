//! Keystroke-dynamics records in the CMU benchmark layout.
//!
//! Editors report when a character appeared, not when a key went down or came up. The adapter
//! rebuilds a key-down timeline from `delta_time`, estimates hold times from the local rhythm and
//! then looks for the fixed benchmark phrase `.tie5Roanl` followed by Return.

use crate::collector::types::EditEvent;
use crate::core::features::median;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Characters of the benchmark phrase, in typing order.
pub const TARGET_CHARS: [&str; 11] = [".", "t", "i", "e", "5", "R", "o", "a", "n", "l", "\n"];

/// Benchmark key labels for [`TARGET_CHARS`].
pub const TARGET_LABELS: [&str; 11] = [
    "period", "t", "i", "e", "five", "Shift.r", "o", "a", "n", "l", "Return",
];

/// Hold time bounds in milliseconds.
const MIN_HOLD_MS: f64 = 30.0;
const MAX_HOLD_MS: f64 = 250.0;

/// Gap assumed when a sample has no positive deltas.
const FALLBACK_GAP_MS: f64 = 120.0;

/// Errors raised while building a timing record. All are recoverable: callers skip the sample.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KeystrokeError {
    #[error("Insufficient data: {found} events, at least {required} required")]
    InsufficientData { found: usize, required: usize },

    #[error("Target phrase not found: matched {matched} of {expected} keys")]
    SequenceNotFound { matched: usize, expected: usize },

    #[error("Unsupported character for key label mapping: {0:?}")]
    UnsupportedCharacter(char),

    #[error("Label mismatch at {index}: got {got}, expected {expected}")]
    LabelMismatch {
        index: usize,
        got: String,
        expected: String,
    },

    #[error("Non-finite timing in column {0}")]
    NonFiniteTiming(&'static str),
}

/// One benchmark row: identifiers, 11 hold times, 10 down-down and 10 up-down latencies.
///
/// Field order and serialized names follow the benchmark's column layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingRecord {
    pub subject: u32,
    #[serde(rename = "sessionIndex")]
    pub session_index: u32,
    pub rep: u32,

    #[serde(rename = "H.period")]
    pub h_period: f64,
    #[serde(rename = "DD.period.t")]
    pub dd_period_t: f64,
    #[serde(rename = "UD.period.t")]
    pub ud_period_t: f64,

    #[serde(rename = "H.t")]
    pub h_t: f64,
    #[serde(rename = "DD.t.i")]
    pub dd_t_i: f64,
    #[serde(rename = "UD.t.i")]
    pub ud_t_i: f64,

    #[serde(rename = "H.i")]
    pub h_i: f64,
    #[serde(rename = "DD.i.e")]
    pub dd_i_e: f64,
    #[serde(rename = "UD.i.e")]
    pub ud_i_e: f64,

    #[serde(rename = "H.e")]
    pub h_e: f64,
    #[serde(rename = "DD.e.five")]
    pub dd_e_five: f64,
    #[serde(rename = "UD.e.five")]
    pub ud_e_five: f64,

    #[serde(rename = "H.five")]
    pub h_five: f64,
    #[serde(rename = "DD.five.Shift.r")]
    pub dd_five_shift_r: f64,
    #[serde(rename = "UD.five.Shift.r")]
    pub ud_five_shift_r: f64,

    #[serde(rename = "H.Shift.r")]
    pub h_shift_r: f64,
    #[serde(rename = "DD.Shift.r.o")]
    pub dd_shift_r_o: f64,
    #[serde(rename = "UD.Shift.r.o")]
    pub ud_shift_r_o: f64,

    #[serde(rename = "H.o")]
    pub h_o: f64,
    #[serde(rename = "DD.o.a")]
    pub dd_o_a: f64,
    #[serde(rename = "UD.o.a")]
    pub ud_o_a: f64,

    #[serde(rename = "H.a")]
    pub h_a: f64,
    #[serde(rename = "DD.a.n")]
    pub dd_a_n: f64,
    #[serde(rename = "UD.a.n")]
    pub ud_a_n: f64,

    #[serde(rename = "H.n")]
    pub h_n: f64,
    #[serde(rename = "DD.n.l")]
    pub dd_n_l: f64,
    #[serde(rename = "UD.n.l")]
    pub ud_n_l: f64,

    #[serde(rename = "H.l")]
    pub h_l: f64,
    #[serde(rename = "DD.l.Return")]
    pub dd_l_return: f64,
    #[serde(rename = "UD.l.Return")]
    pub ud_l_return: f64,

    #[serde(rename = "H.Return")]
    pub h_return: f64,
}

impl TimingRecord {
    /// Column names in benchmark order.
    pub const COLUMNS: [&'static str; 34] = [
        "subject",
        "sessionIndex",
        "rep",
        "H.period",
        "DD.period.t",
        "UD.period.t",
        "H.t",
        "DD.t.i",
        "UD.t.i",
        "H.i",
        "DD.i.e",
        "UD.i.e",
        "H.e",
        "DD.e.five",
        "UD.e.five",
        "H.five",
        "DD.five.Shift.r",
        "UD.five.Shift.r",
        "H.Shift.r",
        "DD.Shift.r.o",
        "UD.Shift.r.o",
        "H.o",
        "DD.o.a",
        "UD.o.a",
        "H.a",
        "DD.a.n",
        "UD.a.n",
        "H.n",
        "DD.n.l",
        "UD.n.l",
        "H.l",
        "DD.l.Return",
        "UD.l.Return",
        "H.Return",
    ];

    /// Build a record from per-key holds and per-digraph latencies, rejecting NaN and infinities.
    pub fn new(
        subject: u32,
        session_index: u32,
        rep: u32,
        holds: [f64; 11],
        down_down: [f64; 10],
        up_down: [f64; 10],
    ) -> Result<Self, KeystrokeError> {
        let record = Self {
            subject,
            session_index,
            rep,
            h_period: holds[0],
            dd_period_t: down_down[0],
            ud_period_t: up_down[0],
            h_t: holds[1],
            dd_t_i: down_down[1],
            ud_t_i: up_down[1],
            h_i: holds[2],
            dd_i_e: down_down[2],
            ud_i_e: up_down[2],
            h_e: holds[3],
            dd_e_five: down_down[3],
            ud_e_five: up_down[3],
            h_five: holds[4],
            dd_five_shift_r: down_down[4],
            ud_five_shift_r: up_down[4],
            h_shift_r: holds[5],
            dd_shift_r_o: down_down[5],
            ud_shift_r_o: up_down[5],
            h_o: holds[6],
            dd_o_a: down_down[6],
            ud_o_a: up_down[6],
            h_a: holds[7],
            dd_a_n: down_down[7],
            ud_a_n: up_down[7],
            h_n: holds[8],
            dd_n_l: down_down[8],
            ud_n_l: up_down[8],
            h_l: holds[9],
            dd_l_return: down_down[9],
            ud_l_return: up_down[9],
            h_return: holds[10],
        };

        for (column, value) in Self::COLUMNS[3..].iter().zip(record.timings()) {
            if !value.is_finite() {
                return Err(KeystrokeError::NonFiniteTiming(*column));
            }
        }
        Ok(record)
    }

    /// The 31 timing columns in benchmark order.
    pub fn timings(&self) -> [f64; 31] {
        [
            self.h_period,
            self.dd_period_t,
            self.ud_period_t,
            self.h_t,
            self.dd_t_i,
            self.ud_t_i,
            self.h_i,
            self.dd_i_e,
            self.ud_i_e,
            self.h_e,
            self.dd_e_five,
            self.ud_e_five,
            self.h_five,
            self.dd_five_shift_r,
            self.ud_five_shift_r,
            self.h_shift_r,
            self.dd_shift_r_o,
            self.ud_shift_r_o,
            self.h_o,
            self.dd_o_a,
            self.ud_o_a,
            self.h_a,
            self.dd_a_n,
            self.ud_a_n,
            self.h_n,
            self.dd_n_l,
            self.ud_n_l,
            self.h_l,
            self.dd_l_return,
            self.ud_l_return,
            self.h_return,
        ]
    }

    pub fn csv_header() -> String {
        Self::COLUMNS.join(",")
    }

    pub fn to_csv_row(&self) -> String {
        let mut fields = vec![
            self.subject.to_string(),
            self.session_index.to_string(),
            self.rep.to_string(),
        ];
        fields.extend(self.timings().iter().map(|v| v.to_string()));
        fields.join(",")
    }
}

/// A reconstructed key press.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TimedKey {
    down: f64,
    up: f64,
}

/// Build a timing record from a sample.
///
/// The first occurrence of the target phrase as a subsequence is used; deletions and any
/// characters between target keys are skipped.
pub fn extract_timing_record(
    events: &[EditEvent],
    subject: u32,
    session_index: u32,
    rep: u32,
) -> Result<TimingRecord, KeystrokeError> {
    if events.len() < TARGET_CHARS.len() {
        return Err(KeystrokeError::InsufficientData {
            found: events.len(),
            required: TARGET_CHARS.len(),
        });
    }

    let timed = reconstruct_down_up(events);
    let picked = find_target_sequence(events, &timed)?;

    for (index, (event, _)) in picked.iter().enumerate() {
        let got = match event.text.chars().next() {
            Some(ch) => cmu_label(ch)?,
            None => String::new(),
        };
        if got != TARGET_LABELS[index] {
            return Err(KeystrokeError::LabelMismatch {
                index,
                got,
                expected: TARGET_LABELS[index].to_string(),
            });
        }
    }

    let keys: Vec<TimedKey> = picked.iter().map(|(_, key)| *key).collect();
    let mut holds = [0.0; 11];
    for (hold, key) in holds.iter_mut().zip(&keys) {
        *hold = key.up - key.down;
    }
    let mut down_down = [0.0; 10];
    let mut up_down = [0.0; 10];
    for (i, pair) in keys.windows(2).enumerate() {
        down_down[i] = pair[1].down - pair[0].down;
        up_down[i] = pair[1].down - pair[0].up;
    }

    TimingRecord::new(subject, session_index, rep, holds, down_down, up_down)
}

/// Benchmark label of a produced character.
pub fn cmu_label(ch: char) -> Result<String, KeystrokeError> {
    const DIGITS: [&str; 10] = [
        "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
    ];

    match ch {
        '.' => Ok("period".to_string()),
        '\n' => Ok("Return".to_string()),
        'A'..='Z' => Ok(format!("Shift.{}", ch.to_ascii_lowercase())),
        'a'..='z' => Ok(ch.to_string()),
        '0'..='9' => Ok(DIGITS[(ch as u8 - b'0') as usize].to_string()),
        _ => Err(KeystrokeError::UnsupportedCharacter(ch)),
    }
}

/// Down times from cumulative deltas; up times from a hold estimated on the neighbouring gaps.
fn reconstruct_down_up(events: &[EditEvent]) -> Vec<TimedKey> {
    let positive: Vec<f64> = events
        .iter()
        .filter(|e| e.delta_time > 0)
        .map(|e| e.delta_time as f64)
        .collect();
    let typical_gap = median(&positive).unwrap_or(FALLBACK_GAP_MS);
    let gap_or_typical = |gap: Option<i64>| match gap {
        Some(g) if g > 0 => g as f64,
        _ => typical_gap,
    };

    let mut timed = Vec::with_capacity(events.len());
    let mut down = 0.0;
    for (i, event) in events.iter().enumerate() {
        down = if i == 0 {
            event.timestamp as f64
        } else {
            down + event.delta_time as f64
        };

        let prev_gap = (i > 0).then_some(event.delta_time);
        let next_gap = events.get(i + 1).map(|e| e.delta_time);
        let neighbour = gap_or_typical(prev_gap).min(gap_or_typical(next_gap));
        let hold = (0.9 * neighbour).clamp(MIN_HOLD_MS, MAX_HOLD_MS);

        timed.push(TimedKey {
            down,
            up: down + hold,
        });
    }
    timed
}

/// First in-order subsequence of the target characters, ignoring deletions.
fn find_target_sequence<'a>(
    events: &'a [EditEvent],
    timed: &[TimedKey],
) -> Result<Vec<(&'a EditEvent, TimedKey)>, KeystrokeError> {
    let mut picked = Vec::with_capacity(TARGET_CHARS.len());

    for (event, key) in events.iter().zip(timed) {
        if picked.len() == TARGET_CHARS.len() {
            break;
        }
        if event.text.is_empty() || event.deleted_chars > 0 {
            continue;
        }
        if event.text == TARGET_CHARS[picked.len()] {
            picked.push((event, *key));
        }
    }

    if picked.len() != TARGET_CHARS.len() {
        return Err(KeystrokeError::SequenceNotFound {
            matched: picked.len(),
            expected: TARGET_CHARS.len(),
        });
    }
    Ok(picked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PHRASE: &str = ".tie5Roanl\n";

    fn typed(text: &str, start: i64, gap: i64) -> Vec<EditEvent> {
        text.chars()
            .enumerate()
            .map(|(i, ch)| {
                let i = i as i64;
                EditEvent::insert(start + i * gap, if i == 0 { 0 } else { gap }, ch.to_string())
            })
            .collect()
    }

    #[test]
    fn test_steady_phrase() {
        let events = typed(PHRASE, 1_000, 100);
        let record = extract_timing_record(&events, 3, 2, 1).unwrap();

        assert_eq!(record.subject, 3);
        assert_eq!(record.session_index, 2);
        assert_eq!(record.rep, 1);
        assert_eq!(record.dd_period_t, 100.0);
        assert_eq!(record.h_period, 90.0);
        assert_eq!(record.h_return, 90.0);
        assert!((record.ud_l_return - 10.0).abs() < 1e-9);

        let timings = record.timings();
        assert_eq!(timings.len(), 31);
        assert!(timings.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_column_counts() {
        let record = extract_timing_record(&typed(PHRASE, 0, 100), 0, 1, 1).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        let object = json.as_object().unwrap();

        assert_eq!(object.len(), 34);
        assert_eq!(object.keys().filter(|k| k.starts_with("H.")).count(), 11);
        assert_eq!(object.keys().filter(|k| k.starts_with("DD.")).count(), 10);
        assert_eq!(object.keys().filter(|k| k.starts_with("UD.")).count(), 10);
        assert_eq!(json["DD.five.Shift.r"], 100.0);
        assert_eq!(json["sessionIndex"], 1);
    }

    #[test]
    fn test_serialized_column_order() {
        let record = extract_timing_record(&typed(PHRASE, 0, 100), 0, 1, 1).unwrap();
        let json = serde_json::to_string(&record).unwrap();

        let mut last = 0;
        for column in TimingRecord::COLUMNS {
            let needle = format!("\"{column}\":");
            let position = json.find(&needle).unwrap();
            assert!(position >= last, "{column} out of order");
            last = position;
        }
    }

    #[test]
    fn test_csv_row_matches_header() {
        let record = extract_timing_record(&typed(PHRASE, 0, 100), 5, 1, 2).unwrap();
        let header = TimingRecord::csv_header();
        let row = record.to_csv_row();

        assert!(header.starts_with("subject,sessionIndex,rep,H.period,DD.period.t"));
        assert!(header.ends_with("UD.l.Return,H.Return"));
        assert_eq!(header.split(',').count(), row.split(',').count());
        assert!(row.starts_with("5,1,2,90,100,10,"));
    }

    #[test]
    fn test_finds_phrase_among_noise() {
        let mut events = typed("xx.ti", 0, 150);
        events.push(EditEvent::delete(750, 150, 1));
        events.push(EditEvent::insert(900, 150, "i"));
        events.extend(typed("e5Rzoanl\n", 1_050, 150));
        // Continuation deltas for the appended run
        events[7].delta_time = 150;

        let record = extract_timing_record(&events, 0, 1, 1).unwrap();
        // ".", "t", "i" are at 300, 450, 600; the retyped "i" is not used
        assert_eq!(record.dd_period_t, 150.0);
        assert_eq!(record.dd_t_i, 150.0);
        // "R" to "o" skips the stray "z"
        assert_eq!(record.dd_shift_r_o, 300.0);
    }

    #[test]
    fn test_hold_is_clamped() {
        let fast = extract_timing_record(&typed(PHRASE, 0, 10), 0, 1, 1).unwrap();
        assert_eq!(fast.h_t, 30.0);
        assert_eq!(fast.ud_t_i, -20.0);

        let slow = extract_timing_record(&typed(PHRASE, 0, 1_000), 0, 1, 1).unwrap();
        assert_eq!(slow.h_t, 250.0);
    }

    #[test]
    fn test_zero_deltas_use_fallback_gap() {
        let events: Vec<EditEvent> = PHRASE
            .chars()
            .map(|ch| EditEvent::insert(500, 0, ch.to_string()))
            .collect();
        let record = extract_timing_record(&events, 0, 1, 1).unwrap();

        assert!((record.h_period - 108.0).abs() < 1e-9);
        assert_eq!(record.dd_period_t, 0.0);
    }

    #[test]
    fn test_insufficient_data() {
        let events = typed(".tie5", 0, 100);
        assert_eq!(
            extract_timing_record(&events, 0, 1, 1),
            Err(KeystrokeError::InsufficientData {
                found: 5,
                required: 11
            })
        );
    }

    #[test]
    fn test_sequence_not_found() {
        let events = typed("hello world", 0, 100);
        assert_eq!(
            extract_timing_record(&events, 0, 1, 1),
            Err(KeystrokeError::SequenceNotFound {
                matched: 0,
                expected: 11
            })
        );

        // Lowercase "r" does not stand in for Shift.r
        let events = typed(".tie5roanl\n", 0, 100);
        assert!(matches!(
            extract_timing_record(&events, 0, 1, 1),
            Err(KeystrokeError::SequenceNotFound { matched: 5, .. })
        ));
    }

    #[test]
    fn test_deletions_are_never_matched() {
        let mut events = typed(PHRASE, 0, 100);
        // An edit that inserts "." while replacing a selection is not a plain keystroke
        events[0].deleted_chars = 3;
        assert!(matches!(
            extract_timing_record(&events, 0, 1, 1),
            Err(KeystrokeError::SequenceNotFound { matched: 0, .. })
        ));
    }

    #[test]
    fn test_cmu_labels() {
        assert_eq!(cmu_label('.').unwrap(), "period");
        assert_eq!(cmu_label('\n').unwrap(), "Return");
        assert_eq!(cmu_label('R').unwrap(), "Shift.r");
        assert_eq!(cmu_label('q').unwrap(), "q");
        assert_eq!(cmu_label('0').unwrap(), "zero");
        assert_eq!(cmu_label('5').unwrap(), "five");
        assert_eq!(
            cmu_label('#'),
            Err(KeystrokeError::UnsupportedCharacter('#'))
        );

        let labels: Vec<String> = TARGET_CHARS
            .iter()
            .filter_map(|c| c.chars().next())
            .map(|c| cmu_label(c).unwrap())
            .collect();
        assert_eq!(labels, TARGET_LABELS);
    }

    #[test]
    fn test_non_finite_timing_rejected() {
        let mut holds = [90.0; 11];
        holds[4] = f64::NAN;
        assert_eq!(
            TimingRecord::new(0, 1, 1, holds, [100.0; 10], [10.0; 10]),
            Err(KeystrokeError::NonFiniteTiming("H.five"))
        );

        let mut up_down = [10.0; 10];
        up_down[9] = f64::INFINITY;
        assert_eq!(
            TimingRecord::new(0, 1, 1, [90.0; 11], [100.0; 10], up_down),
            Err(KeystrokeError::NonFiniteTiming("UD.l.Return"))
        );
    }

    #[test]
    fn test_label_mismatch_message() {
        let err = KeystrokeError::LabelMismatch {
            index: 5,
            got: "r".to_string(),
            expected: "Shift.r".to_string(),
        };
        assert_eq!(err.to_string(), "Label mismatch at 5: got r, expected Shift.r");
    }
}
