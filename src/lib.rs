//! RoboFace Flux - On-device sensor fusion and emotion engine for an animated face
//!
//! Flux turns noisy, asynchronous device sensors into one stable emotional
//! state through a deterministic pipeline: normalization → event detection →
//! metrics aggregation → prioritized state machine with hysteresis →
//! publication.
//!
//! ## Entry points
//!
//! - **EmotionProcessor**: synchronous engine driven with explicit timestamps
//! - **EmotionEngine**: threaded runtime with a sensor queue and a tick timer
//! - **Trace replay**: run a recorded `roboface.sensor_event.v1` trace

pub mod clock;
pub mod config;
pub mod detectors;
pub mod emotion;
pub mod encoder;
pub mod error;
pub mod metrics;
pub mod normalizer;
pub mod pipeline;
pub mod publication;
pub mod runtime;
pub mod schema;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::EngineConfig;
pub use emotion::{Decision, EmotionChange, EmotionStateMachine, Rule};
pub use encoder::{StateEncoder, StatePayload};
pub use error::EngineError;
pub use pipeline::EmotionProcessor;
pub use publication::{Observable, Publication, PublishedSnapshot};
pub use runtime::{EmotionEngine, SensorSink};
pub use types::{BehaviorMetrics, EmotionState, Millis, SensorEvent};

// Schema exports
pub use schema::{replay_trace, SensorRecord, SensorTraceAdapter, SCHEMA_VERSION};

/// Library version embedded in all state payloads
pub const ROBOFACE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for state payloads
pub const PRODUCER_NAME: &str = "roboface-flux";
