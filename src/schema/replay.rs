//! Deterministic trace replay
//!
//! Drives an [`EmotionProcessor`] with a recorded trace, using the trace's own
//! timestamps as the engine clock and ticking every `tick_interval_ms`.

use crate::config::EngineConfig;
use crate::emotion::EmotionChange;
use crate::encoder::{StateEncoder, StatePayload};
use crate::error::EngineError;
use crate::pipeline::{EmotionProcessor, ProcessorStats};
use crate::schema::sensor_event::SensorRecord;
use crate::types::{EmotionState, Millis};
use tracing::debug;

/// Which ticks produce an output frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePolicy {
    #[default]
    EveryTick,
    OnChange,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Keep ticking this long after the last record
    pub tail_ms: Millis,
    pub frames: FramePolicy,
    /// Fixed producer instance id, for reproducible output
    pub instance_id: Option<String>,
}

/// Everything a replay produced
#[derive(Debug, Clone)]
pub struct ReplayOutput {
    pub frames: Vec<StatePayload>,
    pub changes: Vec<EmotionChange>,
    pub final_emotion: EmotionState,
    pub stats: ProcessorStats,
}

/// Replay with default options
pub fn replay_trace(
    records: &[SensorRecord],
    config: &EngineConfig,
) -> Result<ReplayOutput, EngineError> {
    replay_trace_with(records, config, &ReplayOptions::default())
}

/// Replay a trace.
///
/// Records stamped at or before a tick are applied before that tick runs.
/// Invalid samples are rejected by the processor and counted in the stats;
/// only a foreign schema version aborts the replay.
pub fn replay_trace_with(
    records: &[SensorRecord],
    config: &EngineConfig,
    options: &ReplayOptions,
) -> Result<ReplayOutput, EngineError> {
    for record in records {
        record.validate_version()?;
    }

    let start = records.first().map_or(0, |r| r.t_ms);
    let mut processor = EmotionProcessor::with_config(config.clone(), start)?;
    let encoder = match &options.instance_id {
        Some(id) => StateEncoder::with_instance_id(id.clone()),
        None => StateEncoder::new(),
    };
    let interval = config.runtime.tick_interval_ms;

    let mut output = ReplayOutput {
        frames: Vec::new(),
        changes: Vec::new(),
        final_emotion: processor.current_emotion(),
        stats: ProcessorStats::default(),
    };
    let mut next_tick = start.saturating_add(interval);
    let mut latest = start;

    for record in records {
        while next_tick < record.t_ms {
            run_tick(&mut processor, &encoder, options.frames, next_tick, &mut output);
            next_tick = next_tick.saturating_add(interval);
        }
        if let Err(rejection) = processor.apply(&record.to_event(), record.t_ms) {
            debug!(t_ms = record.t_ms, %rejection, "replay sample rejected");
        }
        latest = latest.max(record.t_ms);
    }

    let end = latest.saturating_add(options.tail_ms);
    while next_tick <= end {
        run_tick(&mut processor, &encoder, options.frames, next_tick, &mut output);
        next_tick = next_tick.saturating_add(interval);
    }

    output.final_emotion = processor.current_emotion();
    output.stats = processor.stats();
    Ok(output)
}

fn run_tick(
    processor: &mut EmotionProcessor,
    encoder: &StateEncoder,
    policy: FramePolicy,
    now: Millis,
    output: &mut ReplayOutput,
) {
    let outcome = processor.tick(now);
    if let Some(change) = outcome.change {
        output.changes.push(change);
    }
    if policy == FramePolicy::EveryTick || outcome.change.is_some() {
        output.frames.push(processor.encode(encoder));
    }
}
