//! Structured core events and the observability hook
//!
//! Every core operation (fetch attempt, parse failure, upsert outcome, job
//! transition, training event) emits a `{kind, attributes}` event to an
//! injected sink. The core treats sinks as fire-and-forget: a slow, full or
//! dropped sink never blocks or fails the emitting operation.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::book::UpsertOutcome;
use crate::domain::crawl_job::JobStatus;

/// Structured event emitted by the core.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppEvent {
    FetchAttempt { url: String, attempt: u32 },
    FetchFailed { url: String, reason: String, permanent: bool },
    PageParsed { url: String, candidates: usize, dropped: usize },
    ParseFailed { url: String, reason: String },
    UpsertApplied { id: String, outcome: UpsertOutcome },
    UpsertFailed { id: String, reason: String },
    JobTransition { job_id: Uuid, from: JobStatus, to: JobStatus },
    ModelTrained { version: u64, training_examples: usize },
    PredictionServed { version: u64, value: bool, confidence: f64 },
}

impl AppEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AppEvent::FetchAttempt { .. } => "fetch_attempt",
            AppEvent::FetchFailed { .. } => "fetch_failed",
            AppEvent::PageParsed { .. } => "page_parsed",
            AppEvent::ParseFailed { .. } => "parse_failed",
            AppEvent::UpsertApplied { .. } => "upsert_applied",
            AppEvent::UpsertFailed { .. } => "upsert_failed",
            AppEvent::JobTransition { .. } => "job_transition",
            AppEvent::ModelTrained { .. } => "model_trained",
            AppEvent::PredictionServed { .. } => "prediction_served",
        }
    }

    /// Event payload without the kind discriminant.
    pub fn attributes(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => {
                map.remove("kind");
                Value::Object(map)
            }
            Ok(other) => other,
            Err(_) => Value::Null,
        }
    }
}

/// Injected observability sink. Implementations must be non-blocking; the
/// core never inspects the result of an emit.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AppEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: AppEvent) {}
}

/// Logs events through `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: AppEvent) {
        tracing::info!(kind = event.kind(), attributes = %event.attributes(), "core event");
    }
}

/// Forwards events into an unbounded channel. A dropped receiver silently
/// discards events instead of failing the emitting operation.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<AppEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: AppEvent) {
        let _ = self.tx.send(event);
    }
}
