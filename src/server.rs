//! HTTP server for receiving edit events from editor extensions.
//!
//! This module provides an HTTP server that:
//! - Accepts edit events via POST /events (one object or an array)
//! - Runs them through a shared [`SampleBuffer`]
//! - Serves the latest state snapshot and the recorded samples
//! - Extracts keystroke-dynamics records on request
//!
//! # Architecture
//!
//! ```text
//! Editor extension ──→ POST /events ──→ SampleBuffer ──→ GET /state
//!                                            ↓
//!                                     POST /record ──→ TimingRecord
//! ```

use crate::collector::types::EditEvent;
use crate::config::{AnalysisConfig, RecordConfig};
use crate::core::{Sample, SampleBuffer, StateSnapshot, TimingRecord};
use crate::RecordExporter;
use crate::transparency::{create_shared_log, SharedTransparencyLog, TransparencyStats};
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    pub analysis: AnalysisConfig,
    pub record: RecordConfig,
}

impl ServerConfig {
    pub fn new(port: u16, analysis: AnalysisConfig, record: RecordConfig) -> Self {
        Self {
            port,
            analysis,
            record,
        }
    }
}

/// Shared server state
pub struct ServerState {
    /// Single writer: every push goes through the write lock
    buffer: RwLock<SampleBuffer>,
    record: RecordConfig,
    /// Held for the whole extraction so concurrent requests never export one phrase twice
    exporter: Mutex<RecordExporter>,
    /// Next repetition number for extracted records
    next_rep: AtomicU32,
    transparency: SharedTransparencyLog,
}

impl ServerState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            buffer: RwLock::new(SampleBuffer::new(config.analysis.clone())),
            record: config.record.clone(),
            exporter: Mutex::new(RecordExporter::new()),
            next_rep: AtomicU32::new(1),
            transparency: create_shared_log(),
        }
    }
}

/// One event or a batch
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EventBatch {
    Many(Vec<EditEvent>),
    One(EditEvent),
}

impl EventBatch {
    fn into_events(self) -> Vec<EditEvent> {
        match self {
            EventBatch::Many(events) => events,
            EventBatch::One(event) => vec![event],
        }
    }
}

/// Response from the events endpoint
#[derive(Debug, Clone, Serialize)]
pub struct EventsResponse {
    pub accepted: usize,
    pub state: StateSnapshot,
}

/// Optional overrides for record extraction
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordRequest {
    pub subject: Option<u32>,
    pub session_index: Option<u32>,
    pub rep: Option<u32>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub stats: TransparencyStats,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// GET /health
async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        stats: state.transparency.stats(),
    })
}

/// POST /events
///
/// Events must be in timestamp order, both within a batch and across requests.
async fn ingest_events(
    State(state): State<Arc<ServerState>>,
    Json(batch): Json<EventBatch>,
) -> Json<EventsResponse> {
    let events = batch.into_events();
    let accepted = events.len();

    let snapshot = {
        let mut buffer = state.buffer.write().await;
        let closed_before = buffer.closed_count();
        let recomputes_before = buffer.recompute_count();

        for event in events {
            let previous = buffer.state().state;
            buffer.push(event);
            if buffer.state().state != previous {
                state.transparency.record_state_transition();
            }
        }

        state
            .transparency
            .record_samples_archived((buffer.closed_count() - closed_before) as u64);
        state
            .transparency
            .record_classifications(buffer.recompute_count() - recomputes_before);
        buffer.state()
    };
    state.transparency.record_events(accepted as u64);

    Json(EventsResponse {
        accepted,
        state: snapshot,
    })
}

/// GET /state
async fn current_state(State(state): State<Arc<ServerState>>) -> Json<StateSnapshot> {
    Json(state.buffer.read().await.state())
}

/// GET /samples
async fn samples(State(state): State<Arc<ServerState>>) -> Json<Vec<Sample>> {
    Json(state.buffer.read().await.all_samples())
}

/// POST /record
///
/// Extracts a timing record from the newest sample with a phrase not exported before.
/// Without a `rep` override, repetitions are numbered 1, 2, ... across successful calls.
async fn record(
    State(state): State<Arc<ServerState>>,
    request: Option<Json<RecordRequest>>,
) -> Result<Json<TimingRecord>, ApiError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let subject = request.subject.unwrap_or(state.record.subject);
    let session_index = request.session_index.unwrap_or(state.record.session_index);

    let mut exporter = state.exporter.lock().await;
    let samples = state.buffer.read().await.all_samples();
    match exporter.next_record(&samples, subject, session_index, request.rep.unwrap_or(0)) {
        Some(mut record) => {
            if request.rep.is_none() {
                record.rep = state.next_rep.fetch_add(1, Ordering::Relaxed);
            }
            state.transparency.record_exported();
            Ok(Json(record))
        }
        None => {
            state.transparency.record_skipped();
            tracing::warn!(samples = samples.len(), "no new sample contains the target phrase");
            Err((
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse {
                    error: "No new sample contains the target phrase".to_string(),
                    code: "NO_RECORD".to_string(),
                }),
            ))
        }
    }
}

/// Build the router over a shared state.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/events", post(ingest_events))
        .route("/state", get(current_state))
        .route("/samples", get(samples))
        .route("/record", post(record))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState::new(&config));
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Flowstate server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
