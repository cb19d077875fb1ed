//! Ingestion of session events into sensor readings
//!
//! The pipeline task sits behind a [`ConnectionSession`](crate::session::ConnectionSession),
//! parses every inbound message in arrival order and broadcasts the outcome,
//! together with connectivity changes, to any number of observers.

mod event;
mod history;
mod ingestion;


pub use event::PipelineEvent;
pub use ingestion::{IngestionPipeline, TelemetryClient, TelemetryConnection};
