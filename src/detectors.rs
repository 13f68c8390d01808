//! Discrete event detection
//!
//! Derives discrete events from the continuous sensor streams:
//! - Shake: raw acceleration magnitude spikes, debounced
//! - Proximity: near/far edges only, never repeats
//! - Stillness: whether a tilt sample counts as motion at all

use crate::config::DetectorConfig;
use crate::normalizer::{SampleRejection, Tilt};
use crate::types::{Millis, MotionSample, ProximitySample};
use tracing::{debug, warn};

/// A debounced shake
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShakeEvent {
    pub at_ms: Millis,
    /// Raw acceleration magnitude that crossed the threshold
    pub magnitude: f32,
}

/// Shake detector on unfiltered acceleration magnitude.
///
/// Uses the raw sample rather than the smoothed one so short, sharp shakes
/// are not averaged away.
#[derive(Debug, Clone)]
pub struct ShakeDetector {
    threshold: f32,
    debounce_ms: Millis,
    last_trigger_ms: Option<Millis>,
    triggers: u64,
}

impl ShakeDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            threshold: config.shake_threshold,
            debounce_ms: config.shake_debounce_ms,
            last_trigger_ms: None,
            triggers: 0,
        }
    }

    /// Check one accelerometer sample for a shake at `now`
    pub fn observe(&mut self, sample: &MotionSample, now: Millis) -> Option<ShakeEvent> {
        let magnitude = sample.magnitude();
        if magnitude.is_nan() || magnitude <= self.threshold {
            return None;
        }

        if let Some(last) = self.last_trigger_ms {
            if now.saturating_sub(last) < self.debounce_ms {
                return None;
            }
        }

        self.last_trigger_ms = Some(now);
        self.triggers += 1;
        debug!(magnitude, at_ms = now, "shake detected");
        Some(ShakeEvent {
            at_ms: now,
            magnitude,
        })
    }

    pub fn triggers(&self) -> u64 {
        self.triggers
    }
}

/// Edge reported when the proximity state flips
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProximityEdge {
    pub near: bool,
}

/// Proximity edge detector. Starts out "far".
#[derive(Debug, Clone)]
pub struct ProximityDetector {
    near: bool,
    fallback_range: f32,
}

impl ProximityDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            near: false,
            fallback_range: config.fallback_proximity_range,
        }
    }

    /// Feed a reading; returns an edge only when near/far changes
    pub fn observe(
        &mut self,
        sample: &ProximitySample,
    ) -> Result<Option<ProximityEdge>, SampleRejection> {
        if !sample.distance.is_finite() {
            warn!("dropping non-finite proximity reading");
            return Err(SampleRejection::NonFinite {
                channel: "proximity",
            });
        }
        if sample.distance < 0.0 {
            warn!(distance = sample.distance, "dropping negative proximity reading");
            return Err(SampleRejection::OutOfRange {
                channel: "proximity",
                value: sample.distance,
                limit: 0.0,
            });
        }

        // Many sensors report 0 for near and their max range for far
        let range = if sample.max_range.is_finite() && sample.max_range > 0.0 {
            sample.max_range
        } else {
            self.fallback_range
        };

        let near = sample.distance < range;
        if near == self.near {
            return Ok(None);
        }
        self.near = near;
        debug!(near, "proximity changed");
        Ok(Some(ProximityEdge { near }))
    }

    pub fn is_near(&self) -> bool {
        self.near
    }
}

/// Decides whether a tilt sample is real motion.
#[derive(Debug, Clone)]
pub struct StillnessDetector {
    threshold: f32,
}

impl StillnessDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            threshold: config.motion_threshold,
        }
    }

    /// True when the sample should refresh the last-motion timestamp
    pub fn is_motion(&self, tilt: &Tilt) -> bool {
        tilt.magnitude() > self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DetectorConfig {
        DetectorConfig::default()
    }

    fn hard_shake() -> MotionSample {
        MotionSample::new(12.0, 8.0, 9.8)
    }

    #[test]
    fn test_first_crossing_triggers() {
        let mut shake = ShakeDetector::new(&config());
        let event = shake.observe(&hard_shake(), 0).unwrap();
        assert_eq!(event.at_ms, 0);
        assert!(event.magnitude > 14.0);
    }

    #[test]
    fn test_gravity_alone_is_not_a_shake() {
        let mut shake = ShakeDetector::new(&config());
        assert!(shake.observe(&MotionSample::new(0.0, 0.0, 9.81), 0).is_none());
        // Exactly at the threshold does not count
        assert!(shake.observe(&MotionSample::new(0.0, 0.0, 14.0), 10).is_none());
    }

    #[test]
    fn test_debounce_within_400ms() {
        let mut shake = ShakeDetector::new(&config());
        assert!(shake.observe(&hard_shake(), 1_000).is_some());
        assert!(shake.observe(&hard_shake(), 1_200).is_none());
        assert!(shake.observe(&hard_shake(), 1_399).is_none());
        assert!(shake.observe(&hard_shake(), 1_400).is_some());
        assert_eq!(shake.triggers(), 2);
    }

    #[test]
    fn test_out_of_order_time_does_not_trigger() {
        let mut shake = ShakeDetector::new(&config());
        assert!(shake.observe(&hard_shake(), 5_000).is_some());
        assert!(shake.observe(&hard_shake(), 4_000).is_none());
    }

    #[test]
    fn test_proximity_edges_only() {
        let mut prox = ProximityDetector::new(&config());
        let far = ProximitySample {
            distance: 5.0,
            max_range: 5.0,
        };
        let near = ProximitySample {
            distance: 0.0,
            max_range: 5.0,
        };

        assert_eq!(prox.observe(&far).unwrap(), None);
        assert_eq!(
            prox.observe(&near).unwrap(),
            Some(ProximityEdge { near: true })
        );
        assert_eq!(prox.observe(&near).unwrap(), None);
        assert_eq!(prox.observe(&near).unwrap(), None);
        assert_eq!(
            prox.observe(&far).unwrap(),
            Some(ProximityEdge { near: false })
        );
        assert!(!prox.is_near());
    }

    #[test]
    fn test_proximity_fallback_range() {
        let mut prox = ProximityDetector::new(&config());
        let reading = ProximitySample {
            distance: 3.0,
            max_range: f32::NAN,
        };
        assert_eq!(
            prox.observe(&reading).unwrap(),
            Some(ProximityEdge { near: true })
        );
    }

    #[test]
    fn test_proximity_rejects_garbage() {
        let mut prox = ProximityDetector::new(&config());
        assert!(prox
            .observe(&ProximitySample {
                distance: f32::NAN,
                max_range: 5.0
            })
            .is_err());
        assert!(prox
            .observe(&ProximitySample {
                distance: -1.0,
                max_range: 5.0
            })
            .is_err());
        assert!(!prox.is_near());
    }

    #[test]
    fn test_stillness_threshold() {
        let still = StillnessDetector::new(&config());
        assert!(!still.is_motion(&Tilt { x: 0.05, y: 0.05 }));
        assert!(!still.is_motion(&Tilt { x: 0.15, y: 0.0 }));
        assert!(still.is_motion(&Tilt { x: -0.1, y: 0.1 }));
    }
}
