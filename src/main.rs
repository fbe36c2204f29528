//! Flowstate Sensor CLI
//!
//! Replays edit events through the flow-state pipeline and exports snapshots and keystroke
//! timing records.

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::RecvTimeoutError;
use flowstate_sensor::{
    collector::{read_events, CollectorConfig, ReplayCollector, ReplaySource},
    config::Config,
    core::{extract_timing_record, FlowClassifier, ReportBuilder, StateReport, StateSnapshot},
    transparency::create_shared_log_with_persistence,
    RecordExporter, SampleBuffer, TimingRecord, VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowstate")]
#[command(version = VERSION)]
#[command(about = "Behavioral flow-state sensor for text editing", long_about = None)]
struct Cli {
    /// Use this configuration file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay edit events through the sample buffer
    Run {
        /// JSON lines file of events (stdin when omitted)
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Seconds between timing record attempts
        #[arg(long)]
        record_interval: Option<u64>,

        /// Subject number for timing records
        #[arg(long)]
        subject: Option<u32>,

        /// Session index for timing records
        #[arg(long)]
        session_index: Option<u32>,

        /// Recompute delta_time from timestamps
        #[arg(long)]
        restamp: bool,
    },

    /// Classify a whole event file as one sample
    Classify {
        #[arg(long, short)]
        input: PathBuf,
    },

    /// Extract a keystroke timing record from an event file
    Record {
        #[arg(long, short)]
        input: PathBuf,

        #[arg(long, value_enum, default_value = "json")]
        format: RecordFormat,

        #[arg(long)]
        subject: Option<u32>,

        #[arg(long)]
        session_index: Option<u32>,

        #[arg(long, default_value = "1")]
        rep: u32,
    },

    /// Show cumulative statistics
    Status,

    /// Show configuration
    Config,

    /// Serve the HTTP ingestion API
    #[cfg(feature = "server")]
    Serve {
        /// Port to bind on 127.0.0.1 (0 for random)
        #[arg(long, default_value = "7878")]
        port: u16,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RecordFormat {
    Json,
    Csv,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Run {
            input,
            record_interval,
            subject,
            session_index,
            restamp,
        } => {
            let mut config = config;
            if let Some(secs) = record_interval {
                config.record.record_interval_secs = secs;
            }
            if let Some(subject) = subject {
                config.record.subject = subject;
            }
            if let Some(index) = session_index {
                config.record.session_index = index;
            }
            cmd_run(&config, input, restamp);
        }
        Commands::Classify { input } => {
            cmd_classify(&config, &input);
        }
        Commands::Record {
            input,
            format,
            subject,
            session_index,
            rep,
        } => {
            let subject = subject.unwrap_or(config.record.subject);
            let session_index = session_index.unwrap_or(config.record.session_index);
            cmd_record(&input, format, subject, session_index, rep);
        }
        Commands::Status => {
            cmd_status(&config);
        }
        Commands::Config => {
            cmd_config(&config, cli.config.as_deref());
        }
        #[cfg(feature = "server")]
        Commands::Serve { port } => {
            cmd_serve(&config, port);
        }
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Config {
    let result = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    match result {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load configuration ({e}), using defaults");
            Config::default()
        }
    }
}

fn cmd_run(config: &Config, input: Option<PathBuf>, restamp: bool) {
    println!("Flowstate Sensor v{VERSION}");
    println!();

    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let source = match input {
        Some(path) => ReplaySource::File(path),
        None => ReplaySource::Stdin,
    };
    println!("Replaying events from {}", describe_source(&source));
    println!(
        "  Context switch window: {}ms",
        config.analysis.context_switch_window_ms
    );
    println!(
        "  Record interval: {}s",
        config.record.record_interval_secs
    );

    let transparency_log =
        create_shared_log_with_persistence(config.data_path.join("transparency.json"));

    let mut collector = ReplayCollector::new(CollectorConfig {
        source,
        restamp,
        ..CollectorConfig::default()
    });
    if let Err(e) = collector.start() {
        eprintln!("Error starting collector: {e}");
        std::process::exit(1);
    }

    let mut buffer = SampleBuffer::new(config.analysis.clone());
    let report_builder = ReportBuilder::new();
    println!("Instance ID: {}", report_builder.instance_id());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let mut reports: Vec<StateReport> = Vec::new();
    let mut records: Vec<TimingRecord> = Vec::new();
    let mut exporter = RecordExporter::new();
    let mut rep = 1;
    let record_interval = Duration::from_secs(config.record.record_interval_secs);
    let mut last_record_attempt = Instant::now();

    let receiver = collector.receiver().clone();

    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                let previous = buffer.state();
                let closed_before = buffer.closed_count();
                let recomputes_before = buffer.recompute_count();

                buffer.push(event);
                transparency_log.record_events(1);
                transparency_log
                    .record_classifications(buffer.recompute_count() - recomputes_before);

                let current = buffer.state();
                if current.state != previous.state {
                    transparency_log.record_state_transition();
                    print_transition(&previous, &current);
                }

                if buffer.closed_count() > closed_before {
                    if let Some(sample) = buffer.latest_closed() {
                        transparency_log.record_samples_archived(1);
                        reports.push(report_builder.build(&sample, &current));
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if last_record_attempt.elapsed() >= record_interval {
            if let Some(record) = attempt_record(config, &buffer, &mut exporter, rep) {
                records.push(record);
                rep += 1;
                transparency_log.record_exported();
            } else {
                transparency_log.record_skipped();
            }
            last_record_attempt = Instant::now();
        }
    }

    println!();
    println!("Stopping replay...");
    collector.stop();

    if collector.skipped_lines() > 0 {
        eprintln!(
            "Warning: Skipped {} unreadable event line(s)",
            collector.skipped_lines()
        );
    }

    // Classify and archive whatever is still open
    let closed_before = buffer.closed_count();
    let recomputes_before = buffer.recompute_count();
    buffer.flush();
    transparency_log.record_classifications(buffer.recompute_count() - recomputes_before);
    if buffer.closed_count() > closed_before {
        if let Some(sample) = buffer.latest_closed() {
            transparency_log.record_samples_archived(1);
            reports.push(report_builder.build(&sample, &buffer.state()));
        }
    }

    if let Some(record) = attempt_record(config, &buffer, &mut exporter, rep) {
        records.push(record);
        transparency_log.record_exported();
    } else {
        transparency_log.record_skipped();
    }

    println!("Final state: {}", buffer.state().state);

    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    if !reports.is_empty() {
        let path = config.export_path.join(format!("session_{stamp}.json"));
        match serde_json::to_string_pretty(&reports) {
            Ok(json) => match write_export(&path, &json) {
                Ok(()) => println!("Exported {} state reports to {:?}", reports.len(), path),
                Err(e) => eprintln!("Error writing state reports: {e}"),
            },
            Err(e) => eprintln!("Error serializing state reports: {e}"),
        }
    }
    if !records.is_empty() {
        let path = config.export_path.join(format!("records_{stamp}.csv"));
        let mut csv = TimingRecord::csv_header();
        for record in &records {
            csv.push('\n');
            csv.push_str(&record.to_csv_row());
        }
        match write_export(&path, &csv) {
            Ok(()) => println!("Exported {} timing records to {:?}", records.len(), path),
            Err(e) => eprintln!("Error writing timing records: {e}"),
        }
    }

    if let Err(e) = transparency_log.save() {
        eprintln!("Warning: Could not save transparency log: {e}");
    }

    println!();
    println!("{}", transparency_log.summary());
}

fn cmd_classify(config: &Config, input: &Path) {
    let events = match read_events(input) {
        Ok(events) => events,
        Err(e) => {
            eprintln!("Error reading events: {e}");
            std::process::exit(1);
        }
    };

    let classifier = FlowClassifier::new(config.analysis.clone());
    let snapshot = classifier.transition(&StateSnapshot::initial(), &events);

    match serde_json::to_string_pretty(&snapshot) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error serializing snapshot: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_record(input: &Path, format: RecordFormat, subject: u32, session_index: u32, rep: u32) {
    let events = match read_events(input) {
        Ok(events) => events,
        Err(e) => {
            eprintln!("Error reading events: {e}");
            std::process::exit(1);
        }
    };

    let record = match extract_timing_record(&events, subject, session_index, rep) {
        Ok(record) => record,
        Err(e) => {
            eprintln!("No timing record: {e}");
            std::process::exit(1);
        }
    };

    match format {
        RecordFormat::Csv => {
            println!("{}", TimingRecord::csv_header());
            println!("{}", record.to_csv_row());
        }
        RecordFormat::Json => match serde_json::to_string_pretty(&record) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing record: {e}");
                std::process::exit(1);
            }
        },
    }
}

fn cmd_status(config: &Config) {
    println!("Flowstate Sensor Status");
    println!("=======================");
    println!();
    println!("Export path: {:?}", config.export_path);
    println!("Data path: {:?}", config.data_path);
    println!();

    let stats_path = config.data_path.join("transparency.json");
    if !stats_path.exists() {
        println!("No previous session data found.");
        return;
    }

    if let Ok(content) = std::fs::read_to_string(&stats_path) {
        if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) {
            println!("Cumulative Statistics:");
            for (key, label) in [
                ("events_ingested", "Edit events ingested"),
                ("samples_archived", "Samples archived"),
                ("classifications", "Classifications run"),
                ("state_transitions", "State transitions"),
                ("records_exported", "Timing records exported"),
                ("records_skipped", "Timing records skipped"),
            ] {
                if let Some(value) = stats.get(key) {
                    println!("  {label}: {value}");
                }
            }
        }
    }
}

fn cmd_config(config: &Config, path: Option<&Path>) {
    println!("Configuration");
    println!("=============");
    println!();
    match path {
        Some(path) => println!("Config file: {path:?}"),
        None => println!("Config file: {:?}", Config::config_path()),
    }
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(config).unwrap_or_else(|_| "Error".to_string())
    );
}

#[cfg(feature = "server")]
fn cmd_serve(config: &Config, port: u16) {
    use flowstate_sensor::server::{run, ServerConfig};

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            std::process::exit(1);
        }
    };

    let server_config = ServerConfig::new(port, config.analysis.clone(), config.record.clone());
    let result: anyhow::Result<()> = runtime.block_on(async move {
        let (addr, shutdown_tx) = run(server_config).await?;
        println!("Listening on http://{addr}");
        println!("Press Ctrl+C to stop");
        tokio::signal::ctrl_c().await?;
        let _ = shutdown_tx.send(());
        Ok(())
    });

    if let Err(e) = result {
        eprintln!("Server error: {e}");
        std::process::exit(1);
    }
}

fn attempt_record(
    config: &Config,
    buffer: &SampleBuffer,
    exporter: &mut RecordExporter,
    rep: u32,
) -> Option<TimingRecord> {
    let samples = buffer.all_samples();
    let record = exporter.next_record(
        &samples,
        config.record.subject,
        config.record.session_index,
        rep,
    );
    if record.is_none() {
        tracing::warn!(
            samples = samples.len(),
            exported_through = ?exporter.exported_through(),
            "skipping timing record: no new sample contains the target phrase"
        );
    }
    record
}

fn print_transition(previous: &StateSnapshot, current: &StateSnapshot) {
    println!(
        "[{}] {} -> {} (score {:.2}, {:.0} events/min)",
        Utc::now().format("%H:%M:%S"),
        previous.state,
        current.state,
        current.scores.get(current.state),
        current.features.events_per_min
    );
}

fn describe_source(source: &ReplaySource) -> String {
    match source {
        ReplaySource::File(path) => format!("{path:?}"),
        ReplaySource::Stdin => "stdin".to_string(),
    }
}

fn write_export(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}
