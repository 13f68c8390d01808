//! Behavior metrics aggregation
//!
//! The aggregator owns the one mutable [`BehaviorMetrics`] snapshot. Detector
//! and normalizer outputs are folded in as they arrive; the periodic tick
//! recomputes still time and decays stale shakes. Nothing else writes the
//! snapshot.

use crate::config::EmotionConfig;
use crate::detectors::{ProximityEdge, ShakeEvent};
use crate::normalizer::Tilt;
use crate::types::{BehaviorMetrics, Millis};
use tracing::debug;

/// What a tick changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub still_time_ms: Millis,
    /// Shakes were cleared because the decay window ran out
    pub shakes_decayed: bool,
}

/// Single writer of the behavior metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    metrics: BehaviorMetrics,
    shake_window_start_ms: Millis,
    activity_alpha: f32,
    shake_window_ms: Millis,
}

impl MetricsAggregator {
    /// Zeroed metrics for an engine started at `start_ms`
    pub fn new(config: &EmotionConfig, start_ms: Millis) -> Self {
        Self {
            metrics: BehaviorMetrics::new(start_ms),
            shake_window_start_ms: start_ms,
            activity_alpha: config.activity_alpha,
            shake_window_ms: config.shake_window_ms,
        }
    }

    /// Latest snapshot
    pub fn metrics(&self) -> &BehaviorMetrics {
        &self.metrics
    }

    pub fn shake_window_start_ms(&self) -> Millis {
        self.shake_window_start_ms
    }

    /// Fold a normalized motion sample into activity and stillness.
    ///
    /// `is_motion` comes from the stillness detector; a still sample leaves
    /// the last-motion timestamp alone so still time keeps growing.
    pub fn record_motion(&mut self, tilt: Tilt, is_motion: bool, now: Millis) {
        let alpha = self.activity_alpha;
        self.metrics.activity_level =
            alpha * tilt.magnitude() + (1.0 - alpha) * self.metrics.activity_level;
        if is_motion {
            self.metrics.last_motion_ms = now;
        }
    }

    /// Count a debounced shake and restart the decay window
    pub fn record_shake(&mut self, event: &ShakeEvent) {
        self.metrics.shake_count = self.metrics.shake_count.saturating_add(1);
        self.shake_window_start_ms = event.at_ms;
    }

    pub fn record_proximity(&mut self, edge: ProximityEdge) {
        self.metrics.is_near = edge.near;
    }

    /// Store the sound normalizer's smoothed level
    pub fn record_sound(&mut self, smoothed_level: f32) {
        self.metrics.sound_level = smoothed_level.clamp(0.0, 1.0);
    }

    /// Periodic maintenance: still time, then shake decay
    pub fn tick(&mut self, now: Millis) -> TickReport {
        self.metrics.still_time_ms = now.saturating_sub(self.metrics.last_motion_ms);

        let window_elapsed = now.saturating_sub(self.shake_window_start_ms);
        let shakes_decayed = window_elapsed > self.shake_window_ms && self.metrics.shake_count > 0;
        if shakes_decayed {
            debug!(
                shakes = self.metrics.shake_count,
                window_elapsed, "shake window expired"
            );
            self.metrics.shake_count = 0;
        }

        TickReport {
            still_time_ms: self.metrics.still_time_ms,
            shakes_decayed,
        }
    }

    /// Drop accumulated shakes (entering a baseline emotion consumes them)
    pub fn clear_shakes(&mut self) {
        self.metrics.shake_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator(start: Millis) -> MetricsAggregator {
        MetricsAggregator::new(&EmotionConfig::default(), start)
    }

    fn shake(at_ms: Millis) -> ShakeEvent {
        ShakeEvent {
            at_ms,
            magnitude: 20.0,
        }
    }

    #[test]
    fn test_still_time_grows_without_input() {
        let mut agg = aggregator(0);
        let mut previous = None;
        for i in 1..=10 {
            let report = agg.tick(i * 500);
            if let Some(prev) = previous {
                assert!(report.still_time_ms > prev);
            }
            previous = Some(report.still_time_ms);
        }
        assert_eq!(agg.metrics().still_time_ms, 5_000);
    }

    #[test]
    fn test_motion_resets_still_time() {
        let mut agg = aggregator(0);
        agg.tick(4_000);
        assert_eq!(agg.metrics().still_time_ms, 4_000);

        agg.record_motion(Tilt { x: 0.3, y: 0.0 }, true, 4_100);
        agg.tick(4_500);
        assert_eq!(agg.metrics().still_time_ms, 400);
    }

    #[test]
    fn test_still_sample_keeps_last_motion() {
        let mut agg = aggregator(0);
        agg.record_motion(Tilt { x: 0.01, y: 0.01 }, false, 3_000);
        assert_eq!(agg.metrics().last_motion_ms, 0);
        assert!(agg.metrics().activity_level > 0.0);
    }

    #[test]
    fn test_activity_smoothing() {
        let mut agg = aggregator(0);
        agg.record_motion(Tilt { x: 1.0, y: -1.0 }, true, 0);
        assert!((agg.metrics().activity_level - 0.2).abs() < 1e-6);
        agg.record_motion(Tilt { x: 1.0, y: -1.0 }, true, 10);
        assert!((agg.metrics().activity_level - 0.38).abs() < 1e-6);
    }

    #[test]
    fn test_shakes_decay_after_window() {
        let mut agg = aggregator(0);
        agg.record_shake(&shake(1_000));
        agg.record_shake(&shake(1_500));
        assert_eq!(agg.metrics().shake_count, 2);

        // 3000ms after the last shake is not yet "more than" the window
        let report = agg.tick(4_500);
        assert!(!report.shakes_decayed);
        assert_eq!(agg.metrics().shake_count, 2);

        let report = agg.tick(4_501);
        assert!(report.shakes_decayed);
        assert_eq!(agg.metrics().shake_count, 0);

        // Nothing left to decay
        assert!(!agg.tick(9_000).shakes_decayed);
    }

    #[test]
    fn test_new_shake_extends_window() {
        let mut agg = aggregator(0);
        agg.record_shake(&shake(1_000));
        agg.record_shake(&shake(3_500));
        agg.tick(4_500);
        assert_eq!(agg.metrics().shake_count, 2);
    }

    #[test]
    fn test_proximity_and_sound() {
        let mut agg = aggregator(0);
        agg.record_proximity(ProximityEdge { near: true });
        assert!(agg.metrics().is_near);
        agg.record_sound(0.42);
        assert!((agg.metrics().sound_level - 0.42).abs() < 1e-6);
        agg.record_proximity(ProximityEdge { near: false });
        assert!(!agg.metrics().is_near);
    }

    #[test]
    fn test_clear_shakes() {
        let mut agg = aggregator(0);
        agg.record_shake(&shake(10));
        agg.clear_shakes();
        assert_eq!(agg.metrics().shake_count, 0);
    }
}
