//! Engine configuration
//!
//! Every threshold and time constant used by the engine lives here. The
//! defaults reproduce the tuned behavior of the face; a JSON file only needs
//! to name the values it overrides.

use crate::error::EngineError;
use crate::types::Millis;
use serde::{Deserialize, Serialize};

/// Smoothing coefficients and sample guards for the signal normalizers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Low-pass coefficient for each accelerometer axis.
    pub tilt_alpha: f32,
    /// Low-pass coefficient for the gyroscope Z rate.
    pub rotation_alpha: f32,
    /// Divisor mapping filtered acceleration onto [-1, 1] tilt.
    pub tilt_divisor: f32,
    /// Amplitude that maps to a full-scale sound level of 1.0.
    pub sound_full_scale: f32,
    /// Sound level smoothing coefficient.
    pub sound_alpha: f32,
    /// Accelerometer components beyond this (m/s²) are rejected.
    pub max_abs_accel: f32,
    /// Gyroscope rates beyond this (rad/s) are rejected.
    pub max_abs_rotation: f32,
    /// Largest mean amplitude a 16-bit PCM window can produce.
    pub max_amplitude: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            tilt_alpha: 0.2,
            rotation_alpha: 0.2,
            tilt_divisor: 9.81,
            sound_full_scale: 3000.0,
            sound_alpha: 0.3,
            max_abs_accel: 1000.0,
            max_abs_rotation: 100.0,
            max_amplitude: 32768.0,
        }
    }
}

/// Thresholds for the discrete event detectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Raw acceleration magnitude that counts as a shake (m/s²).
    pub shake_threshold: f32,
    /// Minimum spacing between two shake triggers.
    pub shake_debounce_ms: Millis,
    /// Tilt magnitude above which a sample counts as motion.
    pub motion_threshold: f32,
    /// Range used when the proximity sensor reports a bogus maximum.
    pub fallback_proximity_range: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            shake_threshold: 14.0,
            shake_debounce_ms: 400,
            motion_threshold: 0.15,
            fallback_proximity_range: 5.0,
        }
    }
}

/// Aggregation and state-machine constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionConfig {
    /// Activity smoothing coefficient.
    pub activity_alpha: f32,
    /// Shakes decay after this long without a new one.
    pub shake_window_ms: Millis,
    /// Minimum dwell before a non-emergency transition.
    pub min_dwell_ms: Millis,
    /// Shake count at which the device is considered shaking.
    pub shaking_count: u32,
    /// Still time below which the device is considered moving.
    pub moving_still_ms: Millis,
    /// Activity level above which the device is very active.
    pub high_activity: f32,
    /// Still time below which activity counts as engagement.
    pub engaged_still_ms: Millis,
    /// Sound level above which the face becomes irritated.
    pub loud_sound: f32,
    /// Inclusive lower bound of the sad still-time band.
    pub sad_after_ms: Millis,
    /// Inclusive upper bound of the sad band; sleep starts beyond it.
    pub sleep_after_ms: Millis,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            activity_alpha: 0.1,
            shake_window_ms: 3000,
            min_dwell_ms: 2000,
            shaking_count: 2,
            moving_still_ms: 500,
            high_activity: 0.5,
            engaged_still_ms: 2000,
            loud_sound: 0.6,
            sad_after_ms: 6000,
            sleep_after_ms: 15000,
        }
    }
}

/// Scheduling and queueing for the threaded runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Evaluation cadence.
    pub tick_interval_ms: Millis,
    /// Bounded capacity of the sensor event queue.
    pub event_queue_capacity: usize,
    /// Bounded capacity of each emotion-change subscription.
    pub subscriber_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            event_queue_capacity: 256,
            subscriber_capacity: 16,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub filter: FilterConfig,
    pub detector: DetectorConfig,
    pub emotion: EmotionConfig,
    pub runtime: RuntimeConfig,
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON configuration and validate it
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the full configuration, including defaults
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that every value is usable by the engine
    pub fn validate(&self) -> Result<(), EngineError> {
        check_alpha("filter.tilt_alpha", self.filter.tilt_alpha)?;
        check_alpha("filter.rotation_alpha", self.filter.rotation_alpha)?;
        check_alpha("emotion.activity_alpha", self.emotion.activity_alpha)?;
        check_alpha("filter.sound_alpha", self.filter.sound_alpha)?;

        check_positive("filter.tilt_divisor", self.filter.tilt_divisor)?;
        check_positive("filter.sound_full_scale", self.filter.sound_full_scale)?;
        check_positive("filter.max_abs_accel", self.filter.max_abs_accel)?;
        check_positive("filter.max_abs_rotation", self.filter.max_abs_rotation)?;
        check_positive("filter.max_amplitude", self.filter.max_amplitude)?;
        check_positive("detector.shake_threshold", self.detector.shake_threshold)?;
        check_positive(
            "detector.fallback_proximity_range",
            self.detector.fallback_proximity_range,
        )?;

        check_unit("emotion.high_activity", self.emotion.high_activity)?;
        check_unit("emotion.loud_sound", self.emotion.loud_sound)?;
        if self.emotion.shaking_count == 0 {
            return Err(EngineError::InvalidConfig(
                "emotion.shaking_count must be at least 1".to_string(),
            ));
        }

        if self.emotion.sad_after_ms > self.emotion.sleep_after_ms {
            return Err(EngineError::InvalidConfig(format!(
                "emotion.sad_after_ms ({}) must not exceed emotion.sleep_after_ms ({})",
                self.emotion.sad_after_ms, self.emotion.sleep_after_ms
            )));
        }
        if self.runtime.tick_interval_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "runtime.tick_interval_ms must be positive".to_string(),
            ));
        }
        if self.runtime.event_queue_capacity == 0 || self.runtime.subscriber_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "runtime queue capacities must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_alpha(name: &str, value: f32) -> Result<(), EngineError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(format!(
            "{name} must be in (0, 1], got {value}"
        )))
    }
}

fn check_unit(name: &str, value: f32) -> Result<(), EngineError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(format!(
            "{name} must be in [0, 1], got {value}"
        )))
    }
}

fn check_positive(name: &str, value: f32) -> Result<(), EngineError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(format!(
            "{name} must be positive, got {value}"
        )))
    }
}
