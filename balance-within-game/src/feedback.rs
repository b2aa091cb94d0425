//! Outbound signals consumed by the presentation layer.
//!
//! The core never knows how a signal is rendered (haptics, sound, toast).
//! Sinks are fire-and-forget: the simulation emits and moves on.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    LOG_ACTION_APPLIED, LOG_ACTION_BLOCKED, LOG_CRITICAL_ENTERED, LOG_HEART_LOST,
    LOG_HEART_RESTORED, LOG_HINT_USED, LOG_LEVEL_ENDED, LOG_STIMULUS_APPLIED,
};
use crate::engine::EndReason;
use crate::levels::{Deviation, LevelId, VariableKind};
use crate::scoring::LevelResults;

/// Symbolic feedback event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FeedbackEvent {
    HeartLost {
        remaining: u8,
    },
    HeartRestored {
        count: u8,
    },
    CriticalEntered {
        variable: VariableKind,
        deviation: Deviation,
        message: String,
    },
    LevelEnded {
        level: LevelId,
        reason: EndReason,
    },
    HintUsed {
        remaining: u8,
    },
    ActionApplied {
        action_id: String,
        message: String,
    },
    ActionBlocked {
        action_id: String,
        message: String,
    },
    StimulusApplied {
        text: String,
        effect: f64,
    },
}

impl FeedbackEvent {
    /// Stable key identifying the event kind.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::HeartLost { .. } => LOG_HEART_LOST,
            Self::HeartRestored { .. } => LOG_HEART_RESTORED,
            Self::CriticalEntered { .. } => LOG_CRITICAL_ENTERED,
            Self::LevelEnded { .. } => LOG_LEVEL_ENDED,
            Self::HintUsed { .. } => LOG_HINT_USED,
            Self::ActionApplied { .. } => LOG_ACTION_APPLIED,
            Self::ActionBlocked { .. } => LOG_ACTION_BLOCKED,
            Self::StimulusApplied { .. } => LOG_STIMULUS_APPLIED,
        }
    }
}

/// Receiver for feedback signals (haptics, sound effects, animations).
pub trait FeedbackSink {
    fn emit(&self, event: &FeedbackEvent);
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFeedback;

impl FeedbackSink for NullFeedback {
    fn emit(&self, _event: &FeedbackEvent) {}
}

/// Sink that keeps every event; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct FeedbackLog {
    events: Rc<RefCell<Vec<FeedbackEvent>>>,
}

impl FeedbackLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<FeedbackEvent> {
        self.events.borrow().clone()
    }

    /// Number of recorded events with the given key.
    #[must_use]
    pub fn count(&self, key: &str) -> usize {
        self.events.borrow().iter().filter(|e| e.key() == key).count()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl FeedbackSink for FeedbackLog {
    fn emit(&self, event: &FeedbackEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

/// Navigation triggers the core fires at the end of a session.
pub trait Navigator {
    /// Route to the results view.
    fn show_results(&self, results: &LevelResults);

    /// The player tried to start a level without hearts.
    fn redirect_no_hearts(&self, next_heart_in: Option<Duration>);
}

/// Navigator that ignores every transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNavigator;

impl Navigator for NullNavigator {
    fn show_results(&self, _results: &LevelResults) {}

    fn redirect_no_hearts(&self, _next_heart_in: Option<Duration>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_counts_by_key() {
        let log = FeedbackLog::new();
        let shared = log.clone();
        shared.emit(&FeedbackEvent::HeartLost { remaining: 2 });
        shared.emit(&FeedbackEvent::HintUsed { remaining: 1 });
        shared.emit(&FeedbackEvent::HeartLost { remaining: 1 });
        assert_eq!(log.count("log.heart-lost"), 2);
        assert_eq!(log.count("log.hint-used"), 1);
        log.clear();
        assert!(shared.events().is_empty());
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = FeedbackEvent::HeartLost { remaining: 0 };
        let json = serde_json::to_string(&event).expect("serialize");
        assert_eq!(json, r#"{"event":"heart_lost","remaining":0}"#);
    }
}
