//! Pipeline orchestration
//!
//! [`EmotionProcessor`] wires the normalizers, detectors, metrics aggregator,
//! state machine and publication layer into one synchronous unit. The host
//! feeds sensor events and ticks with explicit timestamps; the threaded
//! runtime, the C ABI and trace replay all drive this same type.

use crate::config::EngineConfig;
use crate::detectors::{
    ProximityDetector, ProximityEdge, ShakeDetector, ShakeEvent, StillnessDetector,
};
use crate::emotion::{Decision, EmotionChange, EmotionStateMachine};
use crate::encoder::{StateEncoder, StatePayload};
use crate::error::EngineError;
use crate::metrics::MetricsAggregator;
use crate::normalizer::{RotationNormalizer, SampleRejection, SoundNormalizer, TiltNormalizer};
use crate::publication::{Publication, PublishedSnapshot};
use crate::types::{
    BehaviorMetrics, EmotionState, Millis, MotionSample, ProximitySample, RotationSample,
    SensorEvent, SoundSample,
};
use std::sync::Arc;
use tracing::debug;

/// Result of one evaluation tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    pub decision: Decision,
    /// Present when the tick changed the emotion
    pub change: Option<EmotionChange>,
    /// Shakes were dropped because the decay window expired
    pub shakes_decayed: bool,
}

/// Sample counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub accepted_samples: u64,
    pub rejected_samples: u64,
    pub shakes: u64,
    pub ticks: u64,
    pub transitions: u64,
}

/// Single-threaded sensor fusion and emotion engine.
///
/// Owns every piece of mutable engine state. Outputs are written to a shared
/// [`Publication`] that other threads may read.
pub struct EmotionProcessor {
    tilt: TiltNormalizer,
    rotation: RotationNormalizer,
    sound: SoundNormalizer,
    shake: ShakeDetector,
    proximity: ProximityDetector,
    stillness: StillnessDetector,
    aggregator: MetricsAggregator,
    machine: EmotionStateMachine,
    publication: Arc<Publication>,
    config: EngineConfig,
    last_seen_ms: Millis,
    stats: ProcessorStats,
}

impl EmotionProcessor {
    /// Create a processor with default tuning, started at `start_ms`
    pub fn new(start_ms: Millis) -> Self {
        Self::build(EngineConfig::default(), start_ms)
    }

    /// Create a processor from a validated configuration
    pub fn with_config(config: EngineConfig, start_ms: Millis) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::build(config, start_ms))
    }

    /// Create a processor that writes into an existing publication
    pub fn with_publication(
        config: EngineConfig,
        start_ms: Millis,
        publication: Arc<Publication>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::build_with(config, start_ms, publication))
    }

    fn build(config: EngineConfig, start_ms: Millis) -> Self {
        let publication = Arc::new(Publication::new(config.runtime.subscriber_capacity));
        Self::build_with(config, start_ms, publication)
    }

    fn build_with(config: EngineConfig, start_ms: Millis, publication: Arc<Publication>) -> Self {
        Self {
            tilt: TiltNormalizer::new(&config.filter),
            rotation: RotationNormalizer::new(&config.filter),
            sound: SoundNormalizer::new(&config.filter),
            shake: ShakeDetector::new(&config.detector),
            proximity: ProximityDetector::new(&config.detector),
            stillness: StillnessDetector::new(&config.detector),
            aggregator: MetricsAggregator::new(&config.emotion, start_ms),
            machine: EmotionStateMachine::new(config.emotion.clone(), start_ms),
            publication,
            config,
            last_seen_ms: start_ms,
            stats: ProcessorStats::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared handle to the published outputs
    pub fn publication(&self) -> Arc<Publication> {
        Arc::clone(&self.publication)
    }

    pub fn current_emotion(&self) -> EmotionState {
        self.machine.current()
    }

    pub fn metrics(&self) -> &BehaviorMetrics {
        self.aggregator.metrics()
    }

    pub fn stats(&self) -> ProcessorStats {
        self.stats
    }

    /// Latest engine time seen by an event or tick
    pub fn last_seen_ms(&self) -> Millis {
        self.last_seen_ms
    }

    pub fn snapshot(&self) -> PublishedSnapshot {
        self.publication.snapshot()
    }

    /// Encode the current snapshot
    pub fn encode(&self, encoder: &StateEncoder) -> StatePayload {
        encoder.encode(&self.publication.snapshot(), self.last_seen_ms)
    }

    /// Accelerometer sample: tilt, activity, stillness and shake detection
    pub fn on_motion(
        &mut self,
        sample: &MotionSample,
        now: Millis,
    ) -> Result<Option<ShakeEvent>, SampleRejection> {
        self.observe_time(now);
        let result = self.tilt.process(sample);
        let tilt = self.count(result)?;
        self.publication.publish_tilt(tilt.x, tilt.y);

        let is_motion = self.stillness.is_motion(&tilt);
        self.aggregator.record_motion(tilt, is_motion, now);

        let shake = self.shake.observe(sample, now);
        if let Some(event) = &shake {
            self.aggregator.record_shake(event);
            self.stats.shakes += 1;
        }

        let metrics = self.aggregator.metrics();
        self.publication.activity_level.set(metrics.activity_level);
        self.publication.shake_count.set(metrics.shake_count);
        Ok(shake)
    }

    /// Gyroscope Z sample
    pub fn on_rotation(
        &mut self,
        sample: &RotationSample,
        now: Millis,
    ) -> Result<f32, SampleRejection> {
        self.observe_time(now);
        let result = self.rotation.process(sample);
        let rotation_z = self.count(result)?;
        self.publication.publish_rotation(rotation_z);
        Ok(rotation_z)
    }

    /// Proximity reading; only flips reach the metrics
    pub fn on_proximity(
        &mut self,
        sample: &ProximitySample,
        now: Millis,
    ) -> Result<Option<ProximityEdge>, SampleRejection> {
        self.observe_time(now);
        let result = self.proximity.observe(sample);
        let edge = self.count(result)?;
        if let Some(edge) = edge {
            self.aggregator.record_proximity(edge);
            self.publication.is_near.set(edge.near);
        }
        Ok(edge)
    }

    /// Mean-amplitude sound window
    pub fn on_sound(&mut self, sample: &SoundSample, now: Millis) -> Result<f32, SampleRejection> {
        self.observe_time(now);
        let result = self.sound.process(sample);
        let level = self.count(result)?;
        self.record_sound(level);
        Ok(level)
    }

    /// Raw 16-bit PCM window
    pub fn on_pcm(&mut self, pcm: &[i16], now: Millis) -> Result<f32, SampleRejection> {
        self.observe_time(now);
        let result = self.sound.process_pcm(pcm);
        let level = self.count(result)?;
        self.record_sound(level);
        Ok(level)
    }

    /// Dispatch any sensor event
    pub fn apply(&mut self, event: &SensorEvent, now: Millis) -> Result<(), SampleRejection> {
        match event {
            SensorEvent::Motion(sample) => self.on_motion(sample, now).map(|_| ()),
            SensorEvent::Rotation(sample) => self.on_rotation(sample, now).map(|_| ()),
            SensorEvent::Proximity(sample) => self.on_proximity(sample, now).map(|_| ()),
            SensorEvent::Sound(sample) => self.on_sound(sample, now).map(|_| ()),
            SensorEvent::Pcm(pcm) => self.on_pcm(pcm, now).map(|_| ()),
        }
    }

    /// Periodic evaluation.
    ///
    /// Stages:
    /// 1. Aggregator maintenance (still time, shake decay)
    /// 2. State machine decision and commit
    /// 3. Shake reset when a baseline emotion is entered
    /// 4. Publication, after every write above has completed
    pub fn tick(&mut self, now: Millis) -> TickOutcome {
        self.observe_time(now);
        self.stats.ticks += 1;

        // Stage 1
        let report = self.aggregator.tick(now);

        // Stage 2
        let (decision, change) = self.machine.evaluate(self.aggregator.metrics(), now);

        // Stage 3
        if let Some(change) = &change {
            self.stats.transitions += 1;
            if change.to.is_baseline() {
                self.aggregator.clear_shakes();
            }
        }

        // Stage 4
        self.publication.publish_metrics(self.aggregator.metrics());
        if let Some(change) = &change {
            self.publication.publish_change(change);
        }

        debug!(
            at_ms = now,
            emotion = %self.machine.current(),
            target = %decision.target,
            still_time_ms = report.still_time_ms,
            "tick"
        );

        TickOutcome {
            decision,
            change,
            shakes_decayed: report.shakes_decayed,
        }
    }

    fn record_sound(&mut self, level: f32) {
        self.aggregator.record_sound(level);
        self.publication
            .sound_level
            .set(self.aggregator.metrics().sound_level);
    }

    fn observe_time(&mut self, now: Millis) {
        self.last_seen_ms = self.last_seen_ms.max(now);
    }

    fn count<T>(&mut self, result: Result<T, SampleRejection>) -> Result<T, SampleRejection> {
        match result {
            Ok(_) => self.stats.accepted_samples += 1,
            Err(_) => self.stats.rejected_samples += 1,
        }
        result
    }
}
