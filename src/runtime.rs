//! Threaded engine runtime
//!
//! A single worker thread owns the [`EmotionProcessor`] and is the only
//! writer of engine state. Producers hand sensor events to a bounded queue
//! through a [`SensorSink`]; the worker selects between that queue, a tick
//! timer and a shutdown signal. Readers observe the shared [`Publication`].

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::emotion::EmotionChange;
use crate::error::EngineError;
use crate::pipeline::{EmotionProcessor, ProcessorStats};
use crate::publication::{Publication, PublishedSnapshot};
use crate::types::{
    Millis, MotionSample, ProximitySample, RotationSample, SensorEvent, SoundSample,
};
use crossbeam_channel::{bounded, never, select, tick, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

type TimedEvent = (Millis, SensorEvent);

/// Producer handle for sensor callbacks. Cheap to clone.
#[derive(Clone)]
pub struct SensorSink {
    tx: Sender<TimedEvent>,
    open: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
}

impl SensorSink {
    /// Queue an event stamped with the engine clock's current time
    pub fn send(&self, event: SensorEvent) -> Result<(), EngineError> {
        let now = self.clock.now_ms();
        self.send_at(event, now)
    }

    /// Queue an event with an explicit engine time.
    ///
    /// Never blocks: when the queue is full the event is dropped and counted.
    pub fn send_at(&self, event: SensorEvent, t_ms: Millis) -> Result<(), EngineError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(EngineError::Stopped);
        }
        match self.tx.try_send((t_ms, event)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full((_, event))) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(kind = event.kind(), dropped, "sensor queue full, event dropped");
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(EngineError::Stopped),
        }
    }

    pub fn push_motion(&self, x: f32, y: f32, z: f32) -> Result<(), EngineError> {
        self.send(SensorEvent::Motion(MotionSample::new(x, y, z)))
    }

    pub fn push_rotation(&self, z: f32) -> Result<(), EngineError> {
        self.send(SensorEvent::Rotation(RotationSample { z }))
    }

    pub fn push_proximity(&self, distance: f32, max_range: f32) -> Result<(), EngineError> {
        self.send(SensorEvent::Proximity(ProximitySample {
            distance,
            max_range,
        }))
    }

    pub fn push_sound_level(&self, mean_abs_amplitude: f32) -> Result<(), EngineError> {
        self.send(SensorEvent::Sound(SoundSample { mean_abs_amplitude }))
    }

    pub fn push_pcm(&self, pcm: Vec<i16>) -> Result<(), EngineError> {
        self.send(SensorEvent::Pcm(pcm))
    }

    /// Events lost to a full queue so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

struct Running {
    shutdown_tx: Sender<()>,
    worker: JoinHandle<ProcessorStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

/// Threaded emotion engine.
///
/// One-shot: after `stop()` the engine cannot be started again.
pub struct EmotionEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    publication: Arc<Publication>,
    open: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    running: Option<Running>,
    lifecycle: Lifecycle,
}

impl EmotionEngine {
    /// Engine on the system clock
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Engine on a caller-provided clock
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self, EngineError> {
        config.validate()?;
        let publication = Arc::new(Publication::new(config.runtime.subscriber_capacity));
        Ok(Self {
            config,
            clock,
            publication,
            open: Arc::new(AtomicBool::new(false)),
            dropped: Arc::new(AtomicU64::new(0)),
            running: None,
            lifecycle: Lifecycle::Idle,
        })
    }

    /// Shared handle to the published outputs
    pub fn publication(&self) -> Arc<Publication> {
        Arc::clone(&self.publication)
    }

    pub fn subscribe_emotion(&self) -> Receiver<EmotionChange> {
        self.publication.subscribe_emotion()
    }

    pub fn snapshot(&self) -> PublishedSnapshot {
        self.publication.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Spawn the worker and open acquisition
    pub fn start(&mut self) -> Result<SensorSink, EngineError> {
        match self.lifecycle {
            Lifecycle::Running => return Err(EngineError::AlreadyRunning),
            Lifecycle::Stopped => return Err(EngineError::Stopped),
            Lifecycle::Idle => {}
        }

        let start_ms = self.clock.now_ms();
        let processor = EmotionProcessor::with_publication(
            self.config.clone(),
            start_ms,
            Arc::clone(&self.publication),
        )?;

        let (events_tx, events_rx) =
            bounded::<TimedEvent>(self.config.runtime.event_queue_capacity);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let interval = Duration::from_millis(self.config.runtime.tick_interval_ms);
        let clock = Arc::clone(&self.clock);

        let worker = std::thread::Builder::new()
            .name("roboface-engine".into())
            .spawn(move || Self::worker_loop(processor, events_rx, shutdown_rx, interval, clock))
            .map_err(|e| EngineError::SpawnFailed(e.to_string()))?;

        self.open.store(true, Ordering::Release);
        self.running = Some(Running {
            shutdown_tx,
            worker,
        });
        self.lifecycle = Lifecycle::Running;
        info!(start_ms, tick_ms = interval.as_millis() as u64, "emotion engine started");

        Ok(SensorSink {
            tx: events_tx,
            open: Arc::clone(&self.open),
            dropped: Arc::clone(&self.dropped),
            clock: Arc::clone(&self.clock),
        })
    }

    /// Close acquisition, stop the worker and wait for it to exit.
    ///
    /// Events still queued are discarded. Stopping an engine that is not
    /// running is a no-op.
    pub fn stop(&mut self) -> Result<ProcessorStats, EngineError> {
        self.open.store(false, Ordering::Release);
        let Some(running) = self.running.take() else {
            return Ok(ProcessorStats::default());
        };
        self.lifecycle = Lifecycle::Stopped;

        // The worker may already be gone; join reports that below
        let _ = running.shutdown_tx.send(());
        let stats = running
            .worker
            .join()
            .map_err(|_| EngineError::WorkerPanicked)?;

        info!(
            ticks = stats.ticks,
            transitions = stats.transitions,
            dropped = self.dropped_events(),
            "emotion engine stopped"
        );
        Ok(stats)
    }

    fn worker_loop(
        mut processor: EmotionProcessor,
        events_rx: Receiver<TimedEvent>,
        shutdown_rx: Receiver<()>,
        interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> ProcessorStats {
        let ticker = tick(interval);
        let mut events = events_rx;
        loop {
            let mut producers_gone = false;
            select! {
                recv(shutdown_rx) -> _ => break,
                recv(events) -> msg => match msg {
                    Ok((t_ms, event)) => {
                        // Rejections are logged by the normalizers
                        let _ = processor.apply(&event, t_ms);
                    }
                    Err(_) => producers_gone = true,
                },
                recv(ticker) -> _ => {
                    processor.tick(clock.now_ms());
                }
            }
            // The evaluator keeps running on defaults until shutdown
            if producers_gone {
                debug!("every sensor sink dropped, evaluating without input");
                events = never();
            }
        }
        processor.stats()
    }
}

impl Drop for EmotionEngine {
    fn drop(&mut self) {
        if self.running.is_some() {
            if let Err(e) = self.stop() {
                warn!(error = %e, "emotion engine did not stop cleanly");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::EmotionState;
    use std::time::Instant;

    fn fast_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.runtime.tick_interval_ms = 5;
        config
    }

    fn engine(clock: &ManualClock) -> EmotionEngine {
        EmotionEngine::with_clock(fast_config(), Arc::new(clock.clone())).unwrap()
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_covering_puts_engine_to_sleep() {
        let clock = ManualClock::new(0);
        let mut engine = engine(&clock);
        let publication = engine.publication();
        let sink = engine.start().unwrap();

        sink.push_proximity(0.0, 5.0).unwrap();
        clock.set(1_000);

        assert!(wait_for(|| publication.emotion.get() == EmotionState::Sleep));
        assert!(publication.is_near.get());

        let stats = engine.stop().unwrap();
        assert!(stats.ticks > 0);
        assert_eq!(stats.accepted_samples, 1);
    }

    #[test]
    fn test_subscriber_receives_change() {
        let clock = ManualClock::new(0);
        let mut engine = engine(&clock);
        let changes = engine.subscribe_emotion();
        let sink = engine.start().unwrap();

        sink.push_motion(12.0, 8.0, 9.8).unwrap();
        clock.set(500);
        sink.push_motion(12.0, 8.0, 9.8).unwrap();

        let change = changes.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(change.from, EmotionState::Curious);
        assert_eq!(change.to, EmotionState::Angry);
        engine.stop().unwrap();
    }

    #[test]
    fn test_sink_rejects_after_stop() {
        let clock = ManualClock::new(0);
        let mut engine = engine(&clock);
        let sink = engine.start().unwrap();
        assert!(sink.is_open());

        engine.stop().unwrap();
        assert!(!sink.is_open());
        assert!(matches!(sink.push_rotation(0.1), Err(EngineError::Stopped)));
        assert!(!engine.is_running());
    }

    #[test]
    fn test_lifecycle_errors() {
        let clock = ManualClock::new(0);
        let mut engine = engine(&clock);
        let _sink = engine.start().unwrap();
        assert!(matches!(engine.start(), Err(EngineError::AlreadyRunning)));

        engine.stop().unwrap();
        assert!(matches!(engine.start(), Err(EngineError::Stopped)));
        // Second stop is a no-op
        assert!(engine.stop().is_ok());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = fast_config();
        config.runtime.event_queue_capacity = 0;
        assert!(matches!(
            EmotionEngine::new(config),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let clock = ManualClock::new(0);
        let mut config = fast_config();
        config.runtime.event_queue_capacity = 1;
        // Long tick so the worker is mostly waiting on events
        config.runtime.tick_interval_ms = 60_000;
        let mut engine = EmotionEngine::with_clock(config, Arc::new(clock.clone())).unwrap();
        let sink = engine.start().unwrap();

        for _ in 0..10_000 {
            sink.push_rotation(0.1).unwrap();
        }
        // Whatever the worker kept up with, nothing blocked. At most one
        // event can still sit in the queue when stop discards it.
        let stats = engine.stop().unwrap();
        let handled = stats.accepted_samples + sink.dropped();
        assert!(handled == 10_000 || handled == 9_999, "handled {handled}");
    }

    #[test]
    fn test_ticks_continue_after_every_sink_is_dropped() {
        let clock = ManualClock::new(0);
        let mut engine = engine(&clock);
        let publication = engine.publication();
        let sink = engine.start().unwrap();
        drop(sink);

        clock.set(7_000);
        assert!(wait_for(|| publication.emotion.get() == EmotionState::Sad));
        assert!(engine.is_running());

        let stats = engine.stop().unwrap();
        assert!(stats.ticks > 0);
        assert_eq!(stats.accepted_samples, 0);
    }

    #[test]
    fn test_events_queued_before_sink_drop_are_evaluated() {
        let clock = ManualClock::new(0);
        let mut engine = engine(&clock);
        let changes = engine.subscribe_emotion();
        let sink = engine.start().unwrap();

        sink.push_proximity(0.0, 5.0).unwrap();
        drop(sink);
        clock.set(500);

        let change = changes.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(change.to, EmotionState::Sleep);
        assert!(change.emergency);
        assert_eq!(engine.stop().unwrap().accepted_samples, 1);
    }

    #[test]
    fn test_drop_stops_worker() {
        let clock = ManualClock::new(0);
        let mut engine = engine(&clock);
        let sink = engine.start().unwrap();
        drop(engine);
        assert!(matches!(sink.push_rotation(0.0), Err(EngineError::Stopped)));
    }
}
