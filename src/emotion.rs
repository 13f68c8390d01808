//! Emotion state machine
//!
//! Evaluated on a fixed cadence against the latest metrics snapshot. A
//! priority rule set picks a target emotion; a dwell floor keeps the face from
//! flapping between states on transient noise, while emergencies (shaking,
//! loud noise, being covered, being woken) bypass the floor.
//!
//! Evaluation is split into a pure [`EmotionStateMachine::decide`] and a
//! [`EmotionStateMachine::commit`] that applies an accepted decision, so the
//! rule set can be inspected without side effects.

use crate::config::EmotionConfig;
use crate::types::{BehaviorMetrics, EmotionState, Millis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// The rule that produced a target emotion, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Repeated shakes
    Shaking,
    /// Proximity sensor covered
    Covered,
    /// Already asleep and undisturbed; sound cannot wake it
    DeepSleep,
    /// Sustained loud ambient sound
    Loud,
    /// Vigorous, recent handling
    Engaged,
    /// Left alone for a while
    Lonely,
    /// Left alone for a long time
    Drowsy,
    /// Nothing else applies
    Baseline,
}

impl Rule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::Shaking => "shaking",
            Rule::Covered => "covered",
            Rule::DeepSleep => "deep_sleep",
            Rule::Loud => "loud",
            Rule::Engaged => "engaged",
            Rule::Lonely => "lonely",
            Rule::Drowsy => "drowsy",
            Rule::Baseline => "baseline",
        }
    }
}

/// Booleans derived from a metrics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signals {
    pub is_shaking: bool,
    pub is_moving: bool,
    pub is_very_active: bool,
}

/// Outcome of the transition gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Target equals the current emotion
    Unchanged,
    /// Accepted through an emergency bypass
    Emergency,
    /// Accepted because the dwell floor has elapsed
    DwellElapsed,
    /// Rejected; the current emotion has not been held long enough
    Held { remaining_ms: Millis },
}

/// Result of evaluating the rules against one snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub at_ms: Millis,
    pub current: EmotionState,
    pub target: EmotionState,
    pub rule: Rule,
    pub signals: Signals,
    pub gate: Gate,
}

impl Decision {
    /// The target should replace the current emotion
    pub fn accepted(&self) -> bool {
        matches!(self.gate, Gate::Emergency | Gate::DwellElapsed)
    }
}

/// An accepted change of emotion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionChange {
    pub from: EmotionState,
    pub to: EmotionState,
    pub at_ms: Millis,
    pub rule: Rule,
    pub emergency: bool,
}

/// Priority rule evaluator with dwell-floor hysteresis
#[derive(Debug, Clone)]
pub struct EmotionStateMachine {
    config: EmotionConfig,
    current: EmotionState,
    last_change_ms: Millis,
}

impl EmotionStateMachine {
    /// Start Curious, with the stability clock at `start_ms`
    pub fn new(config: EmotionConfig, start_ms: Millis) -> Self {
        Self::with_state(config, EmotionState::Curious, start_ms)
    }

    /// Start from an arbitrary emotion entered at `last_change_ms`
    pub fn with_state(config: EmotionConfig, current: EmotionState, last_change_ms: Millis) -> Self {
        Self {
            config,
            current,
            last_change_ms,
        }
    }

    pub fn current(&self) -> EmotionState {
        self.current
    }

    pub fn last_change_ms(&self) -> Millis {
        self.last_change_ms
    }

    pub fn signals(&self, metrics: &BehaviorMetrics) -> Signals {
        Signals {
            is_shaking: metrics.shake_count >= self.config.shaking_count,
            is_moving: metrics.still_time_ms < self.config.moving_still_ms,
            is_very_active: metrics.activity_level > self.config.high_activity,
        }
    }

    /// First matching rule wins
    pub fn select_target(&self, metrics: &BehaviorMetrics) -> (EmotionState, Rule) {
        let signals = self.signals(metrics);
        let cfg = &self.config;
        let still = metrics.still_time_ms;

        if signals.is_shaking {
            (EmotionState::Angry, Rule::Shaking)
        } else if metrics.is_near {
            (EmotionState::Sleep, Rule::Covered)
        } else if self.current == EmotionState::Sleep && !signals.is_moving && !signals.is_shaking {
            (EmotionState::Sleep, Rule::DeepSleep)
        } else if metrics.sound_level > cfg.loud_sound {
            (EmotionState::Irritated, Rule::Loud)
        } else if signals.is_very_active && still < cfg.engaged_still_ms {
            (EmotionState::Happy, Rule::Engaged)
        } else if (cfg.sad_after_ms..=cfg.sleep_after_ms).contains(&still) {
            (EmotionState::Sad, Rule::Lonely)
        } else if still > cfg.sleep_after_ms {
            (EmotionState::Sleep, Rule::Drowsy)
        } else {
            (EmotionState::Curious, Rule::Baseline)
        }
    }

    /// Conditions that bypass the dwell floor.
    ///
    /// The Angry and Irritated clauses restate their rules on purpose; keep
    /// the predicate in this exact form.
    pub fn is_emergency(&self, target: EmotionState, metrics: &BehaviorMetrics) -> bool {
        let signals = self.signals(metrics);
        target == EmotionState::Angry
            || target == EmotionState::Irritated
            || (target == EmotionState::Sleep && metrics.is_near)
            || (self.current == EmotionState::Sleep && signals.is_moving && !metrics.is_near)
    }

    /// Evaluate the rules and the transition gate without changing state
    pub fn decide(&self, metrics: &BehaviorMetrics, now: Millis) -> Decision {
        let signals = self.signals(metrics);
        let (target, rule) = self.select_target(metrics);

        let gate = if target == self.current {
            Gate::Unchanged
        } else if self.is_emergency(target, metrics) {
            Gate::Emergency
        } else {
            let held_for = now.saturating_sub(self.last_change_ms);
            if held_for >= self.config.min_dwell_ms {
                Gate::DwellElapsed
            } else {
                Gate::Held {
                    remaining_ms: self.config.min_dwell_ms - held_for,
                }
            }
        };

        Decision {
            at_ms: now,
            current: self.current,
            target,
            rule,
            signals,
            gate,
        }
    }

    /// Apply a decision produced by [`decide`](Self::decide)
    pub fn commit(&mut self, decision: &Decision) -> Option<EmotionChange> {
        if !decision.accepted() || decision.current != self.current {
            if let Gate::Held { remaining_ms } = decision.gate {
                debug!(
                    current = %decision.current,
                    target = %decision.target,
                    remaining_ms,
                    "transition held by dwell floor"
                );
            }
            return None;
        }

        let transition = EmotionChange {
            from: self.current,
            to: decision.target,
            at_ms: decision.at_ms,
            rule: decision.rule,
            emergency: decision.gate == Gate::Emergency,
        };
        self.current = decision.target;
        self.last_change_ms = decision.at_ms;

        info!(
            from = %transition.from,
            to = %transition.to,
            rule = transition.rule.as_str(),
            emergency = transition.emergency,
            at_ms = transition.at_ms,
            "emotion changed"
        );
        Some(transition)
    }

    /// Decide and commit in one step
    pub fn evaluate(
        &mut self,
        metrics: &BehaviorMetrics,
        now: Millis,
    ) -> (Decision, Option<EmotionChange>) {
        let decision = self.decide(metrics, now);
        let transition = self.commit(&decision);
        (decision, transition)
    }
}
