//! Publication layer
//!
//! Exposes the engine's outputs as independently observable values. Each cell
//! is written by the component that owns the value, at that component's
//! cadence, so a reader combining several cells may see them from slightly
//! different moments. Emotion changes are additionally pushed to subscribers
//! over bounded channels.

use crate::emotion::{EmotionChange, Rule};
use crate::types::{BehaviorMetrics, EmotionState, Millis, Pose};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// A single published value with a change counter.
///
/// `version()` only moves when `set` stores a value different from the
/// current one, so pollers can cheaply detect change.
#[derive(Debug)]
pub struct Observable<T> {
    value: RwLock<T>,
    version: AtomicU64,
}

impl<T: Clone + PartialEq> Observable<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: RwLock::new(initial),
            version: AtomicU64::new(0),
        }
    }

    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Store `value`; returns whether it differed from the previous one
    pub fn set(&self, value: T) -> bool {
        let mut guard = self.value.write();
        if *guard == value {
            return false;
        }
        *guard = value;
        self.version.fetch_add(1, Ordering::AcqRel);
        true
    }
}

impl<T: Clone + PartialEq + Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Debug metrics as published to overlays and the JSON encoder
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishedMetrics {
    pub activity_level: f32,
    pub still_time_ms: Millis,
    pub shake_count: u32,
    pub sound_level: f32,
    pub is_near: bool,
}

impl From<&BehaviorMetrics> for PublishedMetrics {
    fn from(metrics: &BehaviorMetrics) -> Self {
        Self {
            activity_level: metrics.activity_level,
            still_time_ms: metrics.still_time_ms,
            shake_count: metrics.shake_count,
            sound_level: metrics.sound_level,
            is_near: metrics.is_near,
        }
    }
}

/// Point-in-time read of every cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedSnapshot {
    pub emotion: EmotionState,
    /// Rule behind the most recent accepted change, if any
    pub rule: Option<Rule>,
    pub pose: Pose,
    pub metrics: PublishedMetrics,
}

/// Observable outputs of the engine
#[derive(Debug)]
pub struct Publication {
    pub emotion: Observable<EmotionState>,
    pub last_rule: Observable<Option<Rule>>,
    pub tilt_x: Observable<f32>,
    pub tilt_y: Observable<f32>,
    pub rotation_z: Observable<f32>,
    pub activity_level: Observable<f32>,
    pub still_time_ms: Observable<Millis>,
    pub shake_count: Observable<u32>,
    pub sound_level: Observable<f32>,
    pub is_near: Observable<bool>,
    subscribers: Mutex<Vec<Sender<EmotionChange>>>,
    subscriber_capacity: usize,
}

impl Default for Publication {
    fn default() -> Self {
        Self::new(16)
    }
}

impl Publication {
    /// Cells start at the engine's initial state: Curious, level pose, zero metrics
    pub fn new(subscriber_capacity: usize) -> Self {
        Self {
            emotion: Observable::new(EmotionState::Curious),
            last_rule: Observable::new(None),
            tilt_x: Observable::default(),
            tilt_y: Observable::default(),
            rotation_z: Observable::default(),
            activity_level: Observable::default(),
            still_time_ms: Observable::default(),
            shake_count: Observable::default(),
            sound_level: Observable::default(),
            is_near: Observable::default(),
            subscribers: Mutex::new(Vec::new()),
            subscriber_capacity: subscriber_capacity.max(1),
        }
    }

    /// Receive every accepted emotion change from now on.
    ///
    /// A subscriber that falls `subscriber_capacity` changes behind loses
    /// the newest ones; a dropped receiver is forgotten on the next change.
    pub fn subscribe_emotion(&self) -> Receiver<EmotionChange> {
        let (tx, rx) = bounded(self.subscriber_capacity);
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Publish an accepted change and fan it out
    pub fn publish_change(&self, change: &EmotionChange) {
        self.emotion.set(change.to);
        self.last_rule.set(Some(change.rule));

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(*change) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(to = %change.to, "emotion subscriber is full, change dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("pruning disconnected emotion subscriber");
                false
            }
        });
    }

    pub fn publish_tilt(&self, tilt_x: f32, tilt_y: f32) {
        self.tilt_x.set(tilt_x);
        self.tilt_y.set(tilt_y);
    }

    pub fn publish_rotation(&self, rotation_z: f32) {
        self.rotation_z.set(rotation_z);
    }

    /// Publish every debug metric from the aggregator's snapshot
    pub fn publish_metrics(&self, metrics: &BehaviorMetrics) {
        self.activity_level.set(metrics.activity_level);
        self.still_time_ms.set(metrics.still_time_ms);
        self.shake_count.set(metrics.shake_count);
        self.sound_level.set(metrics.sound_level);
        self.is_near.set(metrics.is_near);
    }

    pub fn pose(&self) -> Pose {
        Pose {
            tilt_x: self.tilt_x.get(),
            tilt_y: self.tilt_y.get(),
            rotation_z: self.rotation_z.get(),
        }
    }

    pub fn snapshot(&self) -> PublishedSnapshot {
        PublishedSnapshot {
            emotion: self.emotion.get(),
            rule: self.last_rule.get(),
            pose: self.pose(),
            metrics: PublishedMetrics {
                activity_level: self.activity_level.get(),
                still_time_ms: self.still_time_ms.get(),
                shake_count: self.shake_count.get(),
                sound_level: self.sound_level.get(),
                is_near: self.is_near.get(),
            },
        }
    }
}
