//! State encoding
//!
//! Encodes published snapshots into `roboface.state.v1` JSON payloads for
//! overlays, logs and the CLI.

use crate::emotion::Rule;
use crate::error::EngineError;
use crate::publication::{PublishedMetrics, PublishedSnapshot};
use crate::types::{EmotionState, Millis, Pose};
use crate::{PRODUCER_NAME, ROBOFACE_VERSION};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Output payload schema identifier
pub const STATE_SCHEMA_VERSION: &str = "roboface.state.v1";

/// Who produced a payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// One encoded state frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePayload {
    pub schema_version: String,
    pub producer: StateProducer,
    /// Wall-clock time of encoding (RFC 3339)
    pub computed_at_utc: String,
    /// Engine clock time the snapshot was taken at
    pub engine_time_ms: Millis,
    pub emotion: EmotionState,
    /// Numeric emotion code used by hosts across the C ABI
    pub emotion_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<Rule>,
    pub pose: Pose,
    pub metrics: PublishedMetrics,
}

/// Encoder for state payloads
pub struct StateEncoder {
    instance_id: String,
}

impl Default for StateEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StateEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Encode a snapshot taken at engine time `at_ms`
    pub fn encode(&self, snapshot: &PublishedSnapshot, at_ms: Millis) -> StatePayload {
        StatePayload {
            schema_version: STATE_SCHEMA_VERSION.to_string(),
            producer: StateProducer {
                name: PRODUCER_NAME.to_string(),
                version: ROBOFACE_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            engine_time_ms: at_ms,
            emotion: snapshot.emotion,
            emotion_code: snapshot.emotion.code(),
            rule: snapshot.rule,
            pose: snapshot.pose,
            metrics: snapshot.metrics,
        }
    }

    /// Encode to pretty JSON
    pub fn encode_to_json(
        &self,
        snapshot: &PublishedSnapshot,
        at_ms: Millis,
    ) -> Result<String, EngineError> {
        let payload = self.encode(snapshot, at_ms);
        serde_json::to_string_pretty(&payload).map_err(EngineError::JsonError)
    }

    /// Encode to a single JSON line
    pub fn encode_to_line(
        &self,
        snapshot: &PublishedSnapshot,
        at_ms: Millis,
    ) -> Result<String, EngineError> {
        let payload = self.encode(snapshot, at_ms);
        serde_json::to_string(&payload).map_err(EngineError::JsonError)
    }
}
