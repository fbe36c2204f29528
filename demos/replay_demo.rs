//! Demonstration of the flowstate pipeline on a synthetic typing session.
//!
//! This example shows how to:
//! 1. Stamp raw edits into events
//! 2. Feed them through a sample buffer
//! 3. Watch state transitions as the rhythm changes
//! 4. Build state reports for archived samples
//! 5. Extract a keystroke timing record
//!
//! Run with: cargo run --example replay_demo

use flowstate_sensor::{
    AnalysisConfig, EventStamper, RecordExporter, ReportBuilder, SampleBuffer, TimingRecord,
    TransparencyLog,
};

/// One phase of the synthetic session: text typed at a fixed gap.
struct Phase {
    label: &'static str,
    text: String,
    gap_ms: i64,
}

fn main() {
    println!("Flowstate Sensor - Replay Demo");
    println!("==============================");
    println!();

    let phases = vec![
        Phase {
            label: "fluent typing",
            text: "fn main() { println!(\"hi\"); }".to_string(),
            gap_ms: 150,
        },
        Phase {
            label: "keyboard mashing",
            text: "asdfjkl;".repeat(6),
            gap_ms: 20,
        },
        Phase {
            label: "benchmark phrase",
            text: ".tie5Roanl\n".to_string(),
            gap_ms: 110,
        },
    ];

    let config = AnalysisConfig {
        max_length_for_analysis_ms: 5_000,
        ..AnalysisConfig::default()
    };
    let mut buffer = SampleBuffer::new(config);
    let mut stamper = EventStamper::new();
    let reports = ReportBuilder::new();
    let transparency_log = TransparencyLog::new();

    println!("Instance ID: {}", reports.instance_id());
    println!();

    let mut clock = 0;
    for phase in &phases {
        println!("--- {} ({}ms between keys) ---", phase.label, phase.gap_ms);

        for ch in phase.text.chars() {
            let event = stamper.stamp(clock, ch.to_string(), 0, "demo.rs");
            clock += phase.gap_ms;

            let previous = buffer.state().state;
            let closed_before = buffer.closed_count();
            buffer.push(event);
            transparency_log.record_events(1);

            let current = buffer.state();
            if current.state != previous {
                transparency_log.record_state_transition();
                println!(
                    "  {} -> {} at t={}ms ({:.0} events/min)",
                    previous, current.state, clock, current.features.events_per_min
                );
            }

            if buffer.closed_count() > closed_before {
                transparency_log.record_samples_archived(1);
                if let Some(sample) = buffer.latest_closed() {
                    let report = reports.build(&sample, &current);
                    println!(
                        "  archived sample: {} events, quality {:.2}",
                        report.sample.events, report.sample.quality
                    );
                }
            }
        }

        // Step away between phases
        clock += 15_000;
        println!();
    }

    buffer.flush();
    println!("Final state: {}", buffer.state().state);
    println!();

    match RecordExporter::new().next_record(&buffer.all_samples(), 1, 1, 1) {
        Some(record) => {
            transparency_log.record_exported();
            println!("Timing record:");
            println!("  {}", TimingRecord::csv_header());
            println!("  {}", record.to_csv_row());
        }
        None => {
            transparency_log.record_skipped();
            println!("No sample contained the benchmark phrase.");
        }
    }

    println!();
    println!("{}", transparency_log.summary());
    println!();
    println!("Demo complete!");
}
