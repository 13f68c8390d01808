//! Unified roboface.sensor_event.v1 schema
//!
//! This module defines the recorded-trace format for sensor input, the
//! adapter that parses and validates traces, and deterministic replay of a
//! trace through the engine.

mod adapter;
mod replay;
mod sensor_event;

pub use adapter::*;
pub use replay::*;
pub use sensor_event::*;
