//! Error types for RoboFace Flux
//!
//! The fusion core itself never fails; these errors belong to the surfaces
//! around it (trace parsing, configuration, the threaded runtime).

use thiserror::Error;

/// Errors that can occur outside the pure fusion core
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to parse sensor trace: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid sample: {0}")]
    InvalidSample(#[from] crate::normalizer::SampleRejection),

    #[error("Trace validation failed: {0}")]
    Validation(#[from] crate::schema::ValidationError),

    #[error("Engine is stopped")]
    Stopped,

    #[error("Engine is already running")]
    AlreadyRunning,

    #[error("Failed to spawn engine worker: {0}")]
    SpawnFailed(String),

    #[error("Engine worker panicked")]
    WorkerPanicked,
}
