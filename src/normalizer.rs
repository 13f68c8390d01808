//! Signal normalization
//!
//! Converts raw sensor readings into bounded engineering units:
//! - Tilt: low-passed accelerometer X/Y mapped onto [-1, 1]
//! - Rotation: low-passed gyroscope Z rate (rad/s, unbounded)
//! - Sound: mean absolute PCM amplitude mapped onto [0, 1], then smoothed
//!
//! Every normalizer owns its smoothing accumulators. Samples are checked
//! before they reach a filter: a single NaN would otherwise poison an
//! exponential accumulator forever. A rejected sample leaves the filter
//! exactly where it was.

use crate::config::FilterConfig;
use crate::types::{MotionSample, RotationSample, SoundSample};
use thiserror::Error;
use tracing::warn;

/// Why a raw sample was kept away from a filter
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleRejection {
    #[error("{channel} sample is not finite")]
    NonFinite { channel: &'static str },

    #[error("{channel} sample {value} exceeds limit {limit}")]
    OutOfRange {
        channel: &'static str,
        value: f32,
        limit: f32,
    },

    #[error("{channel} window is empty")]
    EmptyWindow { channel: &'static str },
}

/// Exponential smoothing accumulator: `v' = α·x + (1-α)·v`, starting at zero.
#[derive(Debug, Clone)]
pub struct SmoothingFilter {
    alpha: f32,
    value: f32,
    updates: u64,
}

impl SmoothingFilter {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha,
            value: 0.0,
            updates: 0,
        }
    }

    /// Fold one sample in and return the new value.
    ///
    /// Callers must only pass finite samples.
    pub fn update(&mut self, sample: f32) -> f32 {
        self.value = self.alpha * sample + (1.0 - self.alpha) * self.value;
        self.updates += 1;
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }
}

/// Reject NaN/inf and readings past a physical sanity limit.
fn guard(channel: &'static str, value: f32, limit: f32) -> Result<f32, SampleRejection> {
    if !value.is_finite() {
        return Err(SampleRejection::NonFinite { channel });
    }
    if value.abs() > limit {
        return Err(SampleRejection::OutOfRange {
            channel,
            value,
            limit,
        });
    }
    Ok(value)
}

/// Normalized tilt for one motion sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tilt {
    pub x: f32,
    pub y: f32,
}

impl Tilt {
    /// Activity magnitude contributed by this tilt
    pub fn magnitude(&self) -> f32 {
        self.x.abs() + self.y.abs()
    }
}

/// Accelerometer → tilt normalizer
#[derive(Debug, Clone)]
pub struct TiltNormalizer {
    x: SmoothingFilter,
    y: SmoothingFilter,
    z: SmoothingFilter,
    divisor: f32,
    max_abs_accel: f32,
    rejected: u64,
}

impl TiltNormalizer {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            x: SmoothingFilter::new(config.tilt_alpha),
            y: SmoothingFilter::new(config.tilt_alpha),
            z: SmoothingFilter::new(config.tilt_alpha),
            divisor: config.tilt_divisor,
            max_abs_accel: config.max_abs_accel,
            rejected: 0,
        }
    }

    /// Filter one accelerometer sample and return the resulting tilt.
    ///
    /// The whole sample is rejected if any axis is invalid, so the three
    /// accumulators always advance together.
    pub fn process(&mut self, sample: &MotionSample) -> Result<Tilt, SampleRejection> {
        let checked = guard("accel_x", sample.x, self.max_abs_accel)
            .and_then(|x| guard("accel_y", sample.y, self.max_abs_accel).map(|y| (x, y)))
            .and_then(|(x, y)| {
                guard("accel_z", sample.z, self.max_abs_accel).map(|z| (x, y, z))
            });

        let (x, y, z) = match checked {
            Ok(axes) => axes,
            Err(rejection) => {
                self.rejected += 1;
                warn!(%rejection, "dropping accelerometer sample");
                return Err(rejection);
            }
        };

        self.x.update(x);
        self.y.update(y);
        self.z.update(z);
        Ok(self.current())
    }

    /// Tilt implied by the current filter state
    pub fn current(&self) -> Tilt {
        Tilt {
            x: (-self.x.value() / self.divisor).clamp(-1.0, 1.0),
            y: (self.y.value() / self.divisor).clamp(-1.0, 1.0),
        }
    }

    /// Filtered acceleration on all three axes
    pub fn filtered(&self) -> [f32; 3] {
        [self.x.value(), self.y.value(), self.z.value()]
    }

    pub fn accepted(&self) -> u64 {
        self.x.updates()
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

/// Gyroscope Z → smoothed rotation rate
#[derive(Debug, Clone)]
pub struct RotationNormalizer {
    z: SmoothingFilter,
    max_abs_rotation: f32,
    rejected: u64,
}

impl RotationNormalizer {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            z: SmoothingFilter::new(config.rotation_alpha),
            max_abs_rotation: config.max_abs_rotation,
            rejected: 0,
        }
    }

    pub fn process(&mut self, sample: &RotationSample) -> Result<f32, SampleRejection> {
        match guard("gyro_z", sample.z, self.max_abs_rotation) {
            Ok(z) => Ok(self.z.update(z)),
            Err(rejection) => {
                self.rejected += 1;
                warn!(%rejection, "dropping gyroscope sample");
                Err(rejection)
            }
        }
    }

    pub fn current(&self) -> f32 {
        self.z.value()
    }

    pub fn accepted(&self) -> u64 {
        self.z.updates()
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

/// Microphone amplitude → smoothed sound level in [0, 1]
#[derive(Debug, Clone)]
pub struct SoundNormalizer {
    level: SmoothingFilter,
    full_scale: f32,
    max_amplitude: f32,
    rejected: u64,
}

impl SoundNormalizer {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            level: SmoothingFilter::new(config.sound_alpha),
            full_scale: config.sound_full_scale,
            max_amplitude: config.max_amplitude,
            rejected: 0,
        }
    }

    /// Instantaneous level of one amplitude window, before smoothing
    pub fn raw_level(&self, sample: &SoundSample) -> Result<f32, SampleRejection> {
        let amplitude = guard("sound", sample.mean_abs_amplitude, self.max_amplitude)?;
        if amplitude < 0.0 {
            return Err(SampleRejection::OutOfRange {
                channel: "sound",
                value: amplitude,
                limit: 0.0,
            });
        }
        Ok((amplitude / self.full_scale).clamp(0.0, 1.0))
    }

    /// Smooth one amplitude window into the running level
    pub fn process(&mut self, sample: &SoundSample) -> Result<f32, SampleRejection> {
        match self.raw_level(sample) {
            Ok(level) => Ok(self.level.update(level)),
            Err(rejection) => {
                self.rejected += 1;
                warn!(%rejection, "dropping sound sample");
                Err(rejection)
            }
        }
    }

    /// Compute the mean absolute amplitude of a PCM window and smooth it in
    pub fn process_pcm(&mut self, pcm: &[i16]) -> Result<f32, SampleRejection> {
        let sample = match Self::level_from_pcm(pcm) {
            Some(sample) => sample,
            None => {
                self.rejected += 1;
                return Err(SampleRejection::EmptyWindow { channel: "pcm" });
            }
        };
        self.process(&sample)
    }

    /// Mean absolute amplitude of a 16-bit mono window; `None` when empty
    pub fn level_from_pcm(pcm: &[i16]) -> Option<SoundSample> {
        if pcm.is_empty() {
            return None;
        }
        let sum: f64 = pcm.iter().map(|s| (*s as i32).unsigned_abs() as f64).sum();
        Some(SoundSample {
            mean_abs_amplitude: (sum / pcm.len() as f64) as f32,
        })
    }

    pub fn current(&self) -> f32 {
        self.level.value()
    }

    pub fn accepted(&self) -> u64 {
        self.level.updates()
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FilterConfig {
        FilterConfig::default()
    }

    #[test]
    fn test_smoothing_filter_starts_at_zero() {
        let mut filter = SmoothingFilter::new(0.2);
        assert_eq!(filter.value(), 0.0);
        let v = filter.update(10.0);
        assert!((v - 2.0).abs() < 1e-6);
        let v = filter.update(10.0);
        assert!((v - 3.6).abs() < 1e-5);
    }

    #[test]
    fn test_tilt_saturates_at_unit_range() {
        let mut tilt = TiltNormalizer::new(&config());
        let mut last = Tilt::default();
        for _ in 0..200 {
            last = tilt.process(&MotionSample::new(50.0, -50.0, 0.0)).unwrap();
            assert!((-1.0..=1.0).contains(&last.x));
            assert!((-1.0..=1.0).contains(&last.y));
        }
        // X is inverted, Y is not
        assert_eq!(last.x, -1.0);
        assert_eq!(last.y, -1.0);
    }

    #[test]
    fn test_tilt_positive_saturation() {
        let mut tilt = TiltNormalizer::new(&config());
        let mut last = Tilt::default();
        for _ in 0..200 {
            last = tilt.process(&MotionSample::new(-50.0, 50.0, 0.0)).unwrap();
        }
        assert_eq!(last.x, 1.0);
        assert_eq!(last.y, 1.0);
    }

    #[test]
    fn test_tilt_scaling_below_saturation() {
        let mut tilt = TiltNormalizer::new(&config());
        let result = tilt.process(&MotionSample::new(9.81, 0.0, 9.81)).unwrap();
        // One step of α=0.2 from zero
        assert!((result.x + 0.2).abs() < 1e-5);
        assert_eq!(result.y, 0.0);
    }

    #[test]
    fn test_non_finite_sample_leaves_filter_untouched() {
        let mut tilt = TiltNormalizer::new(&config());
        tilt.process(&MotionSample::new(4.0, 2.0, 9.8)).unwrap();
        let before = tilt.filtered();

        let result = tilt.process(&MotionSample::new(f32::NAN, 0.0, 0.0));
        assert_eq!(
            result,
            Err(SampleRejection::NonFinite { channel: "accel_x" })
        );
        let result = tilt.process(&MotionSample::new(0.0, 0.0, f32::INFINITY));
        assert!(result.is_err());

        assert_eq!(tilt.filtered(), before);
        assert_eq!(tilt.accepted(), 1);
        assert_eq!(tilt.rejected(), 2);

        // Filter still usable afterwards
        let tilt_after = tilt.process(&MotionSample::new(4.0, 2.0, 9.8)).unwrap();
        assert!(tilt_after.x.is_finite());
    }

    #[test]
    fn test_absurd_accel_rejected() {
        let mut tilt = TiltNormalizer::new(&config());
        let result = tilt.process(&MotionSample::new(0.0, 5000.0, 0.0));
        assert!(matches!(
            result,
            Err(SampleRejection::OutOfRange { channel: "accel_y", .. })
        ));
        assert_eq!(tilt.filtered(), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_rotation_is_smoothed_and_unclamped() {
        let mut rotation = RotationNormalizer::new(&config());
        let mut last = 0.0;
        for _ in 0..100 {
            last = rotation.process(&RotationSample { z: 5.0 }).unwrap();
        }
        assert!(last > 4.99);
        assert!(rotation.process(&RotationSample { z: f32::NAN }).is_err());
        assert_eq!(rotation.current(), last);
    }

    #[test]
    fn test_sound_raw_level_is_clamped() {
        let sound = SoundNormalizer::new(&config());
        let level = sound
            .raw_level(&SoundSample {
                mean_abs_amplitude: 1500.0,
            })
            .unwrap();
        assert!((level - 0.5).abs() < 1e-6);

        let level = sound
            .raw_level(&SoundSample {
                mean_abs_amplitude: 20000.0,
            })
            .unwrap();
        assert_eq!(level, 1.0);
    }

    #[test]
    fn test_sound_smoothing() {
        let mut sound = SoundNormalizer::new(&config());
        let level = sound
            .process(&SoundSample {
                mean_abs_amplitude: 3000.0,
            })
            .unwrap();
        assert!((level - 0.3).abs() < 1e-6);
        let level = sound
            .process(&SoundSample {
                mean_abs_amplitude: 3000.0,
            })
            .unwrap();
        assert!((level - 0.51).abs() < 1e-6);
    }

    #[test]
    fn test_sound_rejects_negative_and_nan() {
        let mut sound = SoundNormalizer::new(&config());
        assert!(sound
            .process(&SoundSample {
                mean_abs_amplitude: -1.0
            })
            .is_err());
        assert!(sound
            .process(&SoundSample {
                mean_abs_amplitude: f32::NAN
            })
            .is_err());
        assert_eq!(sound.current(), 0.0);
        assert_eq!(sound.rejected(), 2);
    }

    #[test]
    fn test_level_from_pcm() {
        let pcm = [1000i16, -1000, 3000, -3000];
        let sample = SoundNormalizer::level_from_pcm(&pcm).unwrap();
        assert!((sample.mean_abs_amplitude - 2000.0).abs() < 1e-3);

        // i16::MIN must not overflow
        let sample = SoundNormalizer::level_from_pcm(&[i16::MIN]).unwrap();
        assert_eq!(sample.mean_abs_amplitude, 32768.0);

        assert!(SoundNormalizer::level_from_pcm(&[]).is_none());
    }

    #[test]
    fn test_empty_pcm_window_is_no_update() {
        let mut sound = SoundNormalizer::new(&config());
        sound.process_pcm(&[3000; 16]).unwrap();
        let before = sound.current();
        assert_eq!(
            sound.process_pcm(&[]),
            Err(SampleRejection::EmptyWindow { channel: "pcm" })
        );
        assert_eq!(sound.current(), before);
    }
}
