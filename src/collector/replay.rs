//! Replay collection of edit events from JSON lines.
//!
//! Each line holds one event object. A background thread reads the file (or stdin) and hands
//! events to the consumer through a bounded channel, so a slow consumer applies backpressure
//! instead of growing memory.

use crate::collector::types::{EditEvent, EventStamper};
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// Where events are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaySource {
    File(PathBuf),
    Stdin,
}

/// Configuration for a replay collector.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub source: ReplaySource,
    /// Capacity of the event channel
    pub channel_capacity: usize,
    /// Recompute `delta_time` from timestamps instead of trusting the input
    pub restamp: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            source: ReplaySource::Stdin,
            channel_capacity: 10_000,
            restamp: false,
        }
    }
}

/// Errors that can occur during event collection.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Collector is already running")]
    AlreadyRunning,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid event on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads events on a background thread.
pub struct ReplayCollector {
    config: CollectorConfig,
    sender: Option<Sender<EditEvent>>,
    receiver: Receiver<EditEvent>,
    running: Arc<AtomicBool>,
    skipped_lines: Arc<AtomicU64>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ReplayCollector {
    pub fn new(config: CollectorConfig) -> Self {
        let (sender, receiver) = bounded(config.channel_capacity.max(1));

        Self {
            config,
            sender: Some(sender),
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            skipped_lines: Arc::new(AtomicU64::new(0)),
            thread_handle: None,
        }
    }

    /// Start reading in a background thread.
    ///
    /// A collector runs once: the channel disconnects when the input is exhausted.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        let sender = match self.sender.take() {
            Some(sender) if !self.running.load(Ordering::SeqCst) => sender,
            Some(sender) => {
                self.sender = Some(sender);
                return Err(CollectorError::AlreadyRunning);
            }
            None => return Err(CollectorError::AlreadyRunning),
        };

        // Open before spawning so a missing file is reported to the caller
        let reader: Box<dyn BufRead + Send> = match &self.config.source {
            ReplaySource::File(path) => Box::new(BufReader::new(File::open(path)?)),
            ReplaySource::Stdin => Box::new(BufReader::new(io::stdin())),
        };

        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let skipped = self.skipped_lines.clone();
        let restamp = self.config.restamp;

        let handle = thread::spawn(move || {
            pump_lines(reader, sender, &running, &skipped, restamp);
            running.store(false, Ordering::SeqCst);
        });

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop reading. Joins the reader unless it is blocked on input.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }

    /// Check if the reader thread is still producing.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for edit events.
    pub fn receiver(&self) -> &Receiver<EditEvent> {
        &self.receiver
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&self) -> Option<EditEvent> {
        self.receiver.try_recv().ok()
    }

    /// Lines that could not be parsed so far.
    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines.load(Ordering::Relaxed)
    }
}

impl Drop for ReplayCollector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn pump_lines(
    reader: Box<dyn BufRead + Send>,
    sender: Sender<EditEvent>,
    running: &AtomicBool,
    skipped: &AtomicU64,
    restamp: bool,
) {
    let mut stamper = EventStamper::new();

    for (index, line) in reader.lines().enumerate() {
        if !running.load(Ordering::SeqCst) {
            return;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "stopped reading events");
                return;
            }
        };

        let mut event = match parse_line(&line, index + 1) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable event line");
                skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };
        if restamp {
            event = stamper.stamp(
                event.timestamp,
                event.text,
                event.deleted_chars,
                event.source_id,
            );
        }

        // Re-check the flag while the consumer is not draining
        let mut pending = event;
        loop {
            match sender.send_timeout(pending, Duration::from_millis(100)) {
                Ok(()) => break,
                Err(SendTimeoutError::Timeout(event)) => {
                    if !running.load(Ordering::SeqCst) {
                        return;
                    }
                    pending = event;
                }
                Err(SendTimeoutError::Disconnected(_)) => return,
            }
        }
    }
}

/// Parse one JSON line. Blank lines yield `None`.
pub fn parse_line(line: &str, line_number: usize) -> Result<Option<EditEvent>, CollectorError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|source| CollectorError::Parse {
            line: line_number,
            source,
        })
}

/// Read every event of a JSON lines file, skipping lines that do not parse.
pub fn read_events(path: &Path) -> Result<Vec<EditEvent>, CollectorError> {
    let reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        match parse_line(&line?, index + 1) {
            Ok(Some(event)) => events.push(event),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "skipping unreadable event line"),
        }
    }
    Ok(events)
}
