//! roboface.sensor_event.v1 schema definition
//!
//! One record per sensor reading, stamped with engine time:
//!
//! ```json
//! {"t_ms": 1020, "kind": "motion", "x": 0.3, "y": 9.7, "z": 0.4}
//! {"t_ms": 1100, "kind": "proximity", "distance": 0.0, "max_range": 5.0}
//! {"t_ms": 1200, "kind": "sound", "mean_abs_amplitude": 850.0}
//! {"t_ms": 1300, "kind": "pcm", "samples": [12, -40, 33]}
//! {"t_ms": 1400, "kind": "rotation", "z": 0.02}
//! ```

use crate::config::FilterConfig;
use crate::types::{
    Millis, MotionSample, ProximitySample, RotationSample, SensorEvent, SoundSample,
};
use serde::{Deserialize, Serialize};

/// Current schema version
pub const SCHEMA_VERSION: &str = "roboface.sensor_event.v1";

/// Reading carried by a record, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorPayload {
    /// Raw accelerometer reading (m/s²)
    Motion { x: f32, y: f32, z: f32 },
    /// Gyroscope Z rate (rad/s)
    Rotation { z: f32 },
    /// Proximity distance; a missing range falls back to the default
    Proximity {
        distance: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_range: Option<f32>,
    },
    /// Mean absolute amplitude over one microphone window
    Sound { mean_abs_amplitude: f32 },
    /// Raw 16-bit mono PCM window
    Pcm { samples: Vec<i16> },
}

/// One timestamped sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRecord {
    /// Optional per-record schema tag; checked when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    /// Engine time of the reading
    pub t_ms: Millis,
    #[serde(flatten)]
    pub payload: SensorPayload,
}

impl SensorRecord {
    pub fn new(t_ms: Millis, payload: SensorPayload) -> Self {
        Self {
            schema_version: None,
            t_ms,
            payload,
        }
    }

    /// Record for an in-memory sensor event
    pub fn from_event(t_ms: Millis, event: &SensorEvent) -> Self {
        let payload = match event {
            SensorEvent::Motion(m) => SensorPayload::Motion {
                x: m.x,
                y: m.y,
                z: m.z,
            },
            SensorEvent::Rotation(r) => SensorPayload::Rotation { z: r.z },
            SensorEvent::Proximity(p) => SensorPayload::Proximity {
                distance: p.distance,
                max_range: Some(p.max_range),
            },
            SensorEvent::Sound(s) => SensorPayload::Sound {
                mean_abs_amplitude: s.mean_abs_amplitude,
            },
            SensorEvent::Pcm(samples) => SensorPayload::Pcm {
                samples: samples.clone(),
            },
        };
        Self::new(t_ms, payload)
    }

    /// Tag the record with the current schema version
    pub fn with_schema_version(mut self) -> Self {
        self.schema_version = Some(SCHEMA_VERSION.to_string());
        self
    }

    pub fn kind(&self) -> &'static str {
        match self.payload {
            SensorPayload::Motion { .. } => "motion",
            SensorPayload::Rotation { .. } => "rotation",
            SensorPayload::Proximity { .. } => "proximity",
            SensorPayload::Sound { .. } => "sound",
            SensorPayload::Pcm { .. } => "pcm",
        }
    }

    /// Engine input for this record
    pub fn to_event(&self) -> SensorEvent {
        match &self.payload {
            SensorPayload::Motion { x, y, z } => SensorEvent::Motion(MotionSample::new(*x, *y, *z)),
            SensorPayload::Rotation { z } => SensorEvent::Rotation(RotationSample { z: *z }),
            SensorPayload::Proximity {
                distance,
                max_range,
            } => SensorEvent::Proximity(ProximitySample {
                distance: *distance,
                // Zero makes the detector use its fallback range
                max_range: max_range.unwrap_or(0.0),
            }),
            SensorPayload::Sound { mean_abs_amplitude } => SensorEvent::Sound(SoundSample {
                mean_abs_amplitude: *mean_abs_amplitude,
            }),
            SensorPayload::Pcm { samples } => SensorEvent::Pcm(samples.clone()),
        }
    }

    /// Check the schema tag only
    pub fn validate_version(&self) -> Result<(), ValidationError> {
        match &self.schema_version {
            Some(version) if version != SCHEMA_VERSION => {
                Err(ValidationError::InvalidSchemaVersion {
                    expected: SCHEMA_VERSION.to_string(),
                    actual: version.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Validate against the default sample limits
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_with(&FilterConfig::default())
    }

    /// Validate the record against the limits the engine will enforce
    pub fn validate_with(&self, limits: &FilterConfig) -> Result<(), ValidationError> {
        self.validate_version()?;

        match &self.payload {
            SensorPayload::Motion { x, y, z } => {
                check("x", *x, limits.max_abs_accel)?;
                check("y", *y, limits.max_abs_accel)?;
                check("z", *z, limits.max_abs_accel)
            }
            SensorPayload::Rotation { z } => check("z", *z, limits.max_abs_rotation),
            SensorPayload::Proximity {
                distance,
                max_range,
            } => {
                if !distance.is_finite() {
                    return Err(ValidationError::NonFinite { field: "distance" });
                }
                if *distance < 0.0 {
                    return Err(ValidationError::Negative {
                        field: "distance",
                        value: *distance,
                    });
                }
                match max_range {
                    Some(range) if !range.is_finite() => {
                        Err(ValidationError::NonFinite { field: "max_range" })
                    }
                    _ => Ok(()),
                }
            }
            SensorPayload::Sound { mean_abs_amplitude } => {
                check("mean_abs_amplitude", *mean_abs_amplitude, limits.max_amplitude)?;
                if *mean_abs_amplitude < 0.0 {
                    return Err(ValidationError::Negative {
                        field: "mean_abs_amplitude",
                        value: *mean_abs_amplitude,
                    });
                }
                Ok(())
            }
            SensorPayload::Pcm { samples } => {
                if samples.is_empty() {
                    Err(ValidationError::EmptyPcm)
                } else {
                    Ok(())
                }
            }
        }
    }
}

fn check(field: &'static str, value: f32, limit: f32) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFinite { field });
    }
    if value.abs() > limit {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            limit,
        });
    }
    Ok(())
}

/// Validation errors for sensor records
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Field {field} is not finite")]
    NonFinite { field: &'static str },

    #[error("Field {field} is {value}, beyond the limit of {limit}")]
    OutOfRange {
        field: &'static str,
        value: f32,
        limit: f32,
    },

    #[error("Field {field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f32 },

    #[error("PCM window has no samples")]
    EmptyPcm,

    #[error("Timestamp {current} is earlier than the previous record at {previous}")]
    UnorderedTimestamp { previous: Millis, current: Millis },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_deserialize_motion_record() {
        let json = r#"{"t_ms": 1020, "kind": "motion", "x": 0.5, "y": 9.7, "z": 0.25}"#;
        let record: SensorRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.t_ms, 1020);
        assert_eq!(record.kind(), "motion");
        assert_eq!(
            record.to_event(),
            SensorEvent::Motion(MotionSample::new(0.5, 9.7, 0.25))
        );
    }

    #[test]
    fn test_serialize_uses_flat_layout() {
        let record = SensorRecord::new(
            40,
            SensorPayload::Sound {
                mean_abs_amplitude: 850.0,
            },
        );
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["t_ms"], 40);
        assert_eq!(value["kind"], "sound");
        assert_eq!(value["mean_abs_amplitude"], 850.0);
        assert!(value.get("schema_version").is_none());
    }

    #[test]
    fn test_proximity_without_range_uses_fallback() {
        let json = r#"{"t_ms": 5, "kind": "proximity", "distance": 0.0}"#;
        let record: SensorRecord = serde_json::from_str(json).unwrap();
        match record.to_event() {
            SensorEvent::Proximity(p) => assert_eq!(p.max_range, 0.0),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let json = r#"{"t_ms": 5, "kind": "light", "lux": 120.0}"#;
        assert!(serde_json::from_str::<SensorRecord>(json).is_err());
    }

    #[test]
    fn test_from_event_preserves_reading() {
        let event = SensorEvent::Pcm(vec![1, -2, 3]);
        let record = SensorRecord::from_event(77, &event);
        assert_eq!(record.to_event(), event);
    }

    #[test]
    fn test_validation() {
        let ok = SensorRecord::new(0, SensorPayload::Rotation { z: 0.4 }).with_schema_version();
        assert!(ok.validate().is_ok());

        let absurd = SensorRecord::new(
            0,
            SensorPayload::Motion {
                x: 5_000.0,
                y: 0.0,
                z: 0.0,
            },
        );
        assert!(matches!(
            absurd.validate(),
            Err(ValidationError::OutOfRange { field: "x", .. })
        ));

        let negative = SensorRecord::new(
            0,
            SensorPayload::Proximity {
                distance: -1.0,
                max_range: None,
            },
        );
        assert!(matches!(
            negative.validate(),
            Err(ValidationError::Negative { .. })
        ));

        let empty = SensorRecord::new(0, SensorPayload::Pcm { samples: vec![] });
        assert_eq!(empty.validate(), Err(ValidationError::EmptyPcm));
    }

    #[test]
    fn test_wrong_schema_version() {
        let json = r#"{"schema_version": "wear.raw_event.v1", "t_ms": 0, "kind": "rotation", "z": 0.0}"#;
        let record: SensorRecord = serde_json::from_str(json).unwrap();
        assert!(matches!(
            record.validate(),
            Err(ValidationError::InvalidSchemaVersion { .. })
        ));
    }
}
