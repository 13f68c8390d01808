//! Core data types for RoboFace Flux
//!
//! This module defines the sensor samples that flow into the engine, the
//! behavior metrics snapshot the engine maintains, and the closed set of
//! emotions the character can display.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds on the engine's monotonic clock
pub type Millis = u64;

/// Emotional state displayed by the character.
///
/// `Listening` and `Surprised` are valid states that no current rule selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionState {
    Idle,
    Happy,
    Angry,
    Sad,
    Sleep,
    #[default]
    Curious,
    Irritated,
    Listening,
    Surprised,
}

impl EmotionState {
    /// Every member of the enumeration, in declaration order
    pub const ALL: [EmotionState; 9] = [
        EmotionState::Idle,
        EmotionState::Happy,
        EmotionState::Angry,
        EmotionState::Sad,
        EmotionState::Sleep,
        EmotionState::Curious,
        EmotionState::Irritated,
        EmotionState::Listening,
        EmotionState::Surprised,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionState::Idle => "idle",
            EmotionState::Happy => "happy",
            EmotionState::Angry => "angry",
            EmotionState::Sad => "sad",
            EmotionState::Sleep => "sleep",
            EmotionState::Curious => "curious",
            EmotionState::Irritated => "irritated",
            EmotionState::Listening => "listening",
            EmotionState::Surprised => "surprised",
        }
    }

    /// Stable numeric code used across the C ABI
    pub fn code(&self) -> i32 {
        match self {
            EmotionState::Idle => 0,
            EmotionState::Happy => 1,
            EmotionState::Angry => 2,
            EmotionState::Sad => 3,
            EmotionState::Sleep => 4,
            EmotionState::Curious => 5,
            EmotionState::Irritated => 6,
            EmotionState::Listening => 7,
            EmotionState::Surprised => 8,
        }
    }

    /// Inverse of [`EmotionState::code`]
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.code() == code)
    }

    /// Baseline states clear accumulated shakes when entered
    pub fn is_baseline(&self) -> bool {
        matches!(self, EmotionState::Curious | EmotionState::Idle)
    }
}

impl fmt::Display for EmotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw accelerometer reading in device-frame m/s²
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl MotionSample {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Unfiltered acceleration magnitude
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Gyroscope rotation rate around the device Z axis (rad/s)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotationSample {
    pub z: f32,
}

/// Proximity reading: measured distance and the sensor's maximum range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximitySample {
    pub distance: f32,
    pub max_range: f32,
}

/// Mean absolute amplitude of a ~100ms window of 16-bit mono PCM
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoundSample {
    pub mean_abs_amplitude: f32,
}

/// A single input delivered by an acquisition collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    Motion(MotionSample),
    Rotation(RotationSample),
    Proximity(ProximitySample),
    Sound(SoundSample),
    /// Raw PCM window; the sound normalizer computes the amplitude itself
    Pcm(Vec<i16>),
}

impl SensorEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SensorEvent::Motion(_) => "motion",
            SensorEvent::Rotation(_) => "rotation",
            SensorEvent::Proximity(_) => "proximity",
            SensorEvent::Sound(_) => "sound",
            SensorEvent::Pcm(_) => "pcm",
        }
    }
}

/// Normalized head pose derived from motion sensors
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Left/right tilt in [-1, 1]
    pub tilt_x: f32,
    /// Forward/back tilt in [-1, 1]
    pub tilt_y: f32,
    /// Smoothed Z rotation rate (rad/s), unbounded
    pub rotation_z: f32,
}

/// Accumulated behavior signals from which emotions are derived.
///
/// Owned and mutated exclusively by the metrics aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BehaviorMetrics {
    /// Smoothed tilt magnitude (non-negative)
    pub activity_level: f32,
    /// Time since the last qualifying motion, recomputed on every tick
    pub still_time_ms: Millis,
    /// Debounced shakes within the current decay window
    pub shake_count: u32,
    /// Proximity sensor reports something covering the device
    pub is_near: bool,
    /// Smoothed ambient sound level in [0, 1]
    pub sound_level: f32,
    /// Timestamp of the last qualifying motion
    pub last_motion_ms: Millis,
}

impl BehaviorMetrics {
    /// Zeroed metrics for an engine started at `start_ms`
    pub fn new(start_ms: Millis) -> Self {
        Self {
            activity_level: 0.0,
            still_time_ms: 0,
            shake_count: 0,
            is_near: false,
            sound_level: 0.0,
            last_motion_ms: start_ms,
        }
    }
}

impl Default for BehaviorMetrics {
    fn default() -> Self {
        Self::new(0)
    }
}
