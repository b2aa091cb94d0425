//! Per-level homeostasis state machine.
//!
//! [`LevelEngine`] owns the canonical run state and applies one mutation at a
//! time (drift, stimulus, action, countdown, balance sample). It has no notion
//! of time; [`LevelSession`] drives it from scheduled timers.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::feedback::{FeedbackEvent, FeedbackSink};
use crate::hearts::HeartsHandle;
use crate::levels::{Deviation, LevelId, LevelSpec, Stimulus, VariableKind};
use crate::rng::RngBundle;

pub mod schedule;
pub mod session;

pub use schedule::{Scheduler, TimerId};
pub use session::LevelSession;

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    TimeExpired,
    OutOfHearts,
    Abandoned,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeExpired => write!(f, "time expired"),
            Self::OutOfHearts => write!(f, "out of hearts"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "reason")]
pub enum Phase {
    Loading,
    Active,
    Ended(EndReason),
}

/// A level could not be started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartRefused {
    #[error("no hearts left")]
    NoHearts { next_heart_in: Option<Duration> },
    #[error("level {0} is locked")]
    Locked(LevelId),
}

/// A player action was rejected without touching state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("unknown action `{0}`")]
    UnknownAction(String),
    #[error("session is not active")]
    NotActive,
}

/// Result of a well-formed action request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    Applied {
        target: VariableKind,
        value: f64,
        message: String,
    },
    /// Disabled by the level's scenario; nothing changed.
    Blocked { message: String },
}

/// One tracked variable's current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableReading {
    pub kind: VariableKind,
    pub value: f64,
    pub in_band: bool,
    pub critical: Option<Deviation>,
}

/// State published to presentation after each advance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub level: LevelId,
    pub phase: Phase,
    pub variables: Vec<VariableReading>,
    pub time_remaining: u32,
    pub time_balanced: u32,
    pub hints_used: u8,
    pub hearts: u8,
    pub current_stimulus: Option<Stimulus>,
    /// Feedback raised since the previous report.
    pub events: Vec<FeedbackEvent>,
}

/// Final tally of a session that ran to a scored end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub level: LevelId,
    pub reason: EndReason,
    pub time_balanced: u32,
    pub total_time: u32,
    pub hearts_remaining: u8,
    pub hints_used: u8,
}

/// Canonical state of one level run.
pub struct LevelEngine {
    spec: LevelSpec,
    values: SmallVec<[f64; 3]>,
    phase: Phase,
    time_remaining: u32,
    time_balanced: u32,
    hints_used: u8,
    max_hints: u8,
    current_stimulus: Option<Stimulus>,
    hearts: HeartsHandle,
    feedback: Rc<dyn FeedbackSink>,
    rng: RngBundle,
    pending: Vec<FeedbackEvent>,
}

impl fmt::Debug for LevelEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelEngine")
            .field("level", &self.spec.id)
            .field("values", &self.values)
            .field("phase", &self.phase)
            .field("time_remaining", &self.time_remaining)
            .field("time_balanced", &self.time_balanced)
            .field("hints_used", &self.hints_used)
            .finish_non_exhaustive()
    }
}

impl LevelEngine {
    /// Create a run in `Loading`. Refused before any state exists when the
    /// hearts pool is empty.
    ///
    /// # Errors
    ///
    /// Returns `StartRefused::NoHearts` when no hearts are left.
    pub fn new(
        spec: LevelSpec,
        hearts: HeartsHandle,
        feedback: Rc<dyn FeedbackSink>,
        rng: RngBundle,
        max_hints: u8,
    ) -> Result<Self, StartRefused> {
        if !hearts.can_play() {
            return Err(StartRefused::NoHearts {
                next_heart_in: hearts.next_replenish_in(),
            });
        }
        let values = spec
            .variables
            .iter()
            .map(|v| v.domain.clamp(v.start))
            .collect();
        log::info!(
            "level {} ({}) created, seed {}",
            spec.id.number(),
            spec.name,
            rng.seed()
        );
        Ok(Self {
            time_remaining: spec.duration_secs,
            spec,
            values,
            phase: Phase::Loading,
            time_balanced: 0,
            hints_used: 0,
            max_hints,
            current_stimulus: None,
            hearts,
            feedback,
            rng,
            pending: Vec::new(),
        })
    }

    #[must_use]
    pub const fn spec(&self) -> &LevelSpec {
        &self.spec
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.phase, Phase::Active)
    }

    #[must_use]
    pub const fn is_ended(&self) -> bool {
        matches!(self.phase, Phase::Ended(_))
    }

    #[must_use]
    pub const fn time_remaining(&self) -> u32 {
        self.time_remaining
    }

    #[must_use]
    pub const fn time_balanced(&self) -> u32 {
        self.time_balanced
    }

    #[must_use]
    pub const fn hints_used(&self) -> u8 {
        self.hints_used
    }

    #[must_use]
    pub const fn hints_remaining(&self) -> u8 {
        self.max_hints.saturating_sub(self.hints_used)
    }

    #[must_use]
    pub const fn current_stimulus(&self) -> Option<&Stimulus> {
        self.current_stimulus.as_ref()
    }

    #[must_use]
    pub const fn rng(&self) -> &RngBundle {
        &self.rng
    }

    /// Current value of a tracked variable.
    #[must_use]
    pub fn value(&self, kind: VariableKind) -> Option<f64> {
        self.index_of(kind).map(|i| self.values[i])
    }

    /// True when every variable sits inside its normal band.
    #[must_use]
    pub fn all_in_band(&self) -> bool {
        self.spec
            .variables
            .iter()
            .zip(&self.values)
            .all(|(spec, value)| spec.normal.contains(*value))
    }

    /// Leave `Loading`. Returns false when not in `Loading`.
    pub fn begin(&mut self) -> bool {
        if self.phase != Phase::Loading {
            return false;
        }
        self.phase = Phase::Active;
        log::info!("level {} started", self.spec.id.number());
        true
    }

    /// Apply one drift tick to every variable.
    pub fn apply_drift(&mut self) {
        if !self.is_active() {
            return;
        }
        for i in 0..self.values.len() {
            let unit = self.rng.drift_unit();
            let var = &self.spec.variables[i];
            let delta = var.drift.delta(unit);
            self.values[i] = var.domain.clamp(self.values[i] + delta);
        }
        log::debug!("drift applied: {:?}", self.values);
        self.check_critical();
    }

    /// Pick and apply a random stimulus. `None` when the level has no table.
    pub fn inject_stimulus(&mut self) -> Option<Stimulus> {
        if !self.is_active() {
            return None;
        }
        let index = self.rng.stimulus_index(self.spec.stimuli.len())?;
        let stimulus = self.spec.stimuli[index].clone();
        if let Some(i) = self.index_of(stimulus.target) {
            let var = &self.spec.variables[i];
            self.values[i] = var.domain.clamp(self.values[i] + stimulus.effect);
        }
        log::debug!("stimulus: {} ({:+})", stimulus.text, stimulus.effect);
        self.record(FeedbackEvent::StimulusApplied {
            text: stimulus.text.clone(),
            effect: stimulus.effect,
        });
        self.current_stimulus = Some(stimulus.clone());
        self.check_critical();
        Some(stimulus)
    }

    /// Apply a player action by id.
    ///
    /// # Errors
    ///
    /// Returns `ActionError` when the session is not active or the id is unknown.
    pub fn submit_action(&mut self, action_id: &str) -> Result<ActionOutcome, ActionError> {
        if !self.is_active() {
            return Err(ActionError::NotActive);
        }
        let action = self
            .spec
            .action(action_id)
            .cloned()
            .ok_or_else(|| ActionError::UnknownAction(action_id.to_string()))?;

        if self.spec.is_disabled(&action.id) {
            let message = self
                .spec
                .scenario
                .as_ref()
                .map(|s| s.blocked_text.clone())
                .unwrap_or_default();
            log::debug!("action {} blocked by scenario", action.id);
            self.record(FeedbackEvent::ActionBlocked {
                action_id: action.id,
                message: message.clone(),
            });
            return Ok(ActionOutcome::Blocked { message });
        }

        let Some(i) = self.index_of(action.target) else {
            return Err(ActionError::UnknownAction(action.id));
        };
        let var = &self.spec.variables[i];
        let value = var.domain.clamp(self.values[i] + action.effect);
        self.values[i] = value;
        let message = self.action_message(i, value);
        log::debug!("action {} -> {} = {value:.2}", action.id, action.target);
        self.record(FeedbackEvent::ActionApplied {
            action_id: action.id,
            message: message.clone(),
        });
        self.check_critical();
        Ok(ActionOutcome::Applied {
            target: action.target,
            value,
            message,
        })
    }

    fn action_message(&self, index: usize, value: f64) -> String {
        if let Some(text) = &self.spec.monitor_text {
            return text.clone();
        }
        let var = &self.spec.variables[index];
        match var.normal.deviation(value) {
            None => self.spec.corrected_text.clone(),
            Some(side) => var.action_text.for_side(side).to_string(),
        }
    }

    /// Use a hint. `None` once the per-session cap is reached.
    pub fn request_hint(&mut self) -> Option<String> {
        if !self.is_active() || self.hints_used >= self.max_hints {
            return None;
        }
        self.hints_used += 1;
        let text = self.hint_text();
        self.record(FeedbackEvent::HintUsed {
            remaining: self.hints_remaining(),
        });
        Some(text)
    }

    /// Contextual hint for the current values, without consuming a hint.
    #[must_use]
    pub fn hint_text(&self) -> String {
        let issues: Vec<&str> = self
            .spec
            .variables
            .iter()
            .zip(&self.values)
            .filter_map(|(var, value)| {
                var.normal
                    .deviation(*value)
                    .map(|side| var.hint_text.for_side(side))
            })
            .collect();
        if issues.is_empty() {
            self.spec.balanced_hint.clone()
        } else {
            issues.join("\n\n")
        }
    }

    /// One-second balance sample.
    pub fn sample_balance(&mut self) {
        if self.is_active() && self.all_in_band() {
            self.time_balanced = self.time_balanced.saturating_add(1);
        }
    }

    /// One-second countdown step; ends the run at zero.
    pub fn countdown_tick(&mut self) {
        if !self.is_active() {
            return;
        }
        self.time_remaining = self.time_remaining.saturating_sub(1);
        if self.time_remaining == 0 {
            self.end(EndReason::TimeExpired);
        }
    }

    /// End without a result.
    pub fn abandon(&mut self) {
        if !self.is_ended() {
            self.end(EndReason::Abandoned);
        }
    }

    fn check_critical(&mut self) {
        let breaches: SmallVec<[(usize, Deviation); 3]> = self
            .spec
            .variables
            .iter()
            .zip(&self.values)
            .enumerate()
            .filter_map(|(i, (var, value))| var.critical.deviation(*value).map(|side| (i, side)))
            .collect();
        if breaches.is_empty() {
            return;
        }

        if self.hearts.deduct_heart() {
            self.pending.push(FeedbackEvent::HeartLost {
                remaining: self.hearts.count(),
            });
        }
        for (i, side) in breaches {
            let var = &self.spec.variables[i];
            let kind = var.kind;
            let message = var.critical_text.for_side(side).to_string();
            let recovered = var.recovery_for(side);
            log::debug!(
                "{kind} critical {side:?} at {:.2}, recovering to {recovered}",
                self.values[i]
            );
            self.values[i] = recovered;
            self.record(FeedbackEvent::CriticalEntered {
                variable: kind,
                deviation: side,
                message,
            });
        }
        if self.hearts.count() == 0 {
            self.end(EndReason::OutOfHearts);
        }
    }

    fn end(&mut self, reason: EndReason) {
        self.phase = Phase::Ended(reason);
        log::info!(
            "level {} ended ({reason}): {}s balanced, {} heart(s)",
            self.spec.id.number(),
            self.time_balanced,
            self.hearts.count()
        );
        self.record(FeedbackEvent::LevelEnded {
            level: self.spec.id,
            reason,
        });
    }

    fn record(&mut self, event: FeedbackEvent) {
        self.feedback.emit(&event);
        self.pending.push(event);
    }

    fn index_of(&self, kind: VariableKind) -> Option<usize> {
        self.spec.variables.iter().position(|v| v.kind == kind)
    }

    /// Snapshot of every variable.
    #[must_use]
    pub fn readings(&self) -> Vec<VariableReading> {
        self.spec
            .variables
            .iter()
            .zip(&self.values)
            .map(|(var, value)| VariableReading {
                kind: var.kind,
                value: *value,
                in_band: var.normal.contains(*value),
                critical: var.critical.deviation(*value),
            })
            .collect()
    }

    /// Build a report and drain the events raised since the last one.
    pub fn report(&mut self) -> TickReport {
        TickReport {
            level: self.spec.id,
            phase: self.phase,
            variables: self.readings(),
            time_remaining: self.time_remaining,
            time_balanced: self.time_balanced,
            hints_used: self.hints_used,
            hearts: self.hearts.count(),
            current_stimulus: self.current_stimulus.clone(),
            events: std::mem::take(&mut self.pending),
        }
    }

    /// Scored outcome, once the run has ended on time or hearts.
    #[must_use]
    pub fn outcome(&self) -> Option<SessionOutcome> {
        match self.phase {
            Phase::Ended(reason @ (EndReason::TimeExpired | EndReason::OutOfHearts)) => {
                Some(SessionOutcome {
                    level: self.spec.id,
                    reason,
                    time_balanced: self.time_balanced,
                    total_time: self.spec.duration_secs,
                    hearts_remaining: self.hearts.count(),
                    hints_used: self.hints_used,
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::feedback::{FeedbackLog, NullFeedback};
    use crate::hearts::HeartsEconomy;
    use crate::levels::Drift;
    use crate::storage::{MemoryStore, RecordStore};

    fn hearts() -> HeartsHandle {
        HeartsHandle::new(HeartsEconomy::load_default(
            RecordStore::new(MemoryStore::new()),
            Rc::new(ManualClock::starting_at(1_000)),
            Rc::new(NullFeedback),
        ))
    }

    fn quiet(id: LevelId) -> LevelSpec {
        let mut spec = LevelSpec::get(id).clone();
        spec.stimuli.clear();
        for var in &mut spec.variables {
            var.drift = Drift {
                base: 0.0,
                spread: 0.0,
            };
        }
        spec
    }

    fn engine(spec: LevelSpec, hearts: HeartsHandle) -> LevelEngine {
        let mut engine = LevelEngine::new(
            spec,
            hearts,
            Rc::new(NullFeedback),
            RngBundle::from_user_seed(11),
            2,
        )
        .expect("hearts available");
        assert!(engine.begin());
        engine
    }

    #[test]
    fn refuses_without_hearts() {
        let hearts = hearts();
        for _ in 0..3 {
            hearts.deduct_heart();
        }
        let err = LevelEngine::new(
            LevelSpec::get(LevelId::Thermoregulation).clone(),
            hearts,
            Rc::new(NullFeedback),
            RngBundle::from_user_seed(1),
            2,
        )
        .unwrap_err();
        assert_eq!(
            err,
            StartRefused::NoHearts {
                next_heart_in: Some(Duration::from_millis(300_000))
            }
        );
    }

    #[test]
    fn actions_require_active_phase() {
        let mut engine = LevelEngine::new(
            quiet(LevelId::Thermoregulation),
            hearts(),
            Rc::new(NullFeedback),
            RngBundle::from_user_seed(1),
            2,
        )
        .unwrap();
        assert_eq!(engine.submit_action("sweat"), Err(ActionError::NotActive));
        engine.begin();
        assert!(!engine.begin());
        assert_eq!(
            engine.submit_action("fly"),
            Err(ActionError::UnknownAction("fly".into()))
        );
        assert!((engine.value(VariableKind::Temperature).unwrap() - 37.0).abs() < 1e-9);
    }

    #[test]
    fn action_feedback_classifies_result() {
        let mut engine = engine(quiet(LevelId::Thermoregulation), hearts());
        let ActionOutcome::Applied { message, value, .. } = engine.submit_action("rest").unwrap()
        else {
            panic!("rest applies");
        };
        assert!((value - 37.0).abs() < 1e-9);
        assert!(message.starts_with("Negative feedback activated"));
        let ActionOutcome::Applied { message, .. } = engine.submit_action("shiver").unwrap() else {
            panic!("shiver applies");
        };
        assert!(message.starts_with("Body temperature is too high"));
    }

    #[test]
    fn disabled_action_is_blocked_without_change() {
        let mut engine = engine(quiet(LevelId::SystemInteraction), hearts());
        let before = engine.readings();
        let outcome = engine.submit_action("insulin").unwrap();
        assert_eq!(
            outcome,
            ActionOutcome::Blocked {
                message: "Insulin response is disabled! You must use other methods.".into()
            }
        );
        assert_eq!(engine.readings(), before);
        let ActionOutcome::Applied { message, .. } = engine.submit_action("eat").unwrap() else {
            panic!("eat applies");
        };
        assert_eq!(message, "Action applied. Monitor all systems!");
    }

    #[test]
    fn critical_breach_deducts_once_and_recovers() {
        let hearts = hearts();
        let mut spec = quiet(LevelId::Thermoregulation);
        spec.actions[1].effect = 4.0; // shiver past 40
        let mut engine = engine(spec, hearts.clone());
        engine.submit_action("shiver").unwrap();
        assert_eq!(hearts.count(), 2);
        assert!((engine.value(VariableKind::Temperature).unwrap() - 39.0).abs() < 1e-9);
        let report = engine.report();
        assert!(report.events.iter().any(|e| matches!(
            e,
            FeedbackEvent::CriticalEntered {
                deviation: Deviation::High,
                ..
            }
        )));
        assert!(report.events.contains(&FeedbackEvent::HeartLost { remaining: 2 }));
        assert!(engine.is_active());
    }

    #[test]
    fn simultaneous_breaches_cost_one_heart() {
        let hearts = hearts();
        let mut spec = quiet(LevelId::SystemInteraction);
        for var in &mut spec.variables {
            var.start = var.critical.max + 1.0;
        }
        let mut engine = engine(spec, hearts.clone());
        engine.apply_drift();
        assert_eq!(hearts.count(), 2);
        for reading in engine.readings() {
            assert_eq!(reading.critical, None);
        }
    }

    #[test]
    fn last_heart_ends_session() {
        let hearts = hearts();
        hearts.deduct_heart();
        hearts.deduct_heart();
        let mut spec = quiet(LevelId::BloodSugar);
        spec.actions[0].effect = 100.0;
        let mut engine = engine(spec, hearts.clone());
        engine.submit_action("eat").unwrap();
        assert_eq!(hearts.count(), 0);
        assert_eq!(engine.phase(), Phase::Ended(EndReason::OutOfHearts));
        let outcome = engine.outcome().expect("scored end");
        assert_eq!(outcome.hearts_remaining, 0);
        assert_eq!(engine.submit_action("eat"), Err(ActionError::NotActive));
    }

    #[test]
    fn hints_are_capped_and_contextual() {
        let log = FeedbackLog::new();
        let mut spec = quiet(LevelId::SystemInteraction);
        spec.variables[0].start = 110.0; // glucose high
        spec.variables[2].start = 30.0; // hydration low
        let mut engine = LevelEngine::new(
            spec,
            hearts(),
            Rc::new(log.clone()),
            RngBundle::from_user_seed(2),
            2,
        )
        .unwrap();
        engine.begin();
        let hint = engine.request_hint().expect("first hint");
        assert_eq!(
            hint,
            "Glucose is high. Without insulin, try eating less and resting to slow glucose rise.\n\nDehydration detected. Drink water."
        );
        assert!(engine.request_hint().is_some());
        assert_eq!(engine.request_hint(), None);
        assert_eq!(engine.hints_used(), 2);
        assert_eq!(log.count("log.hint-used"), 2);

        let mut calm = engine_for_hint();
        assert_eq!(
            calm.request_hint().as_deref(),
            Some("Temperature is normal. Rest to maintain current balance.")
        );
    }

    fn engine_for_hint() -> LevelEngine {
        engine(quiet(LevelId::Thermoregulation), hearts())
    }

    #[test]
    fn countdown_and_balance_bookkeeping() {
        let mut engine = engine(quiet(LevelId::Thermoregulation), hearts());
        for _ in 0..59 {
            engine.sample_balance();
            engine.countdown_tick();
        }
        assert!(engine.is_active());
        engine.sample_balance();
        engine.countdown_tick();
        assert_eq!(engine.phase(), Phase::Ended(EndReason::TimeExpired));
        assert_eq!(engine.time_balanced(), 60);
        assert_eq!(engine.time_remaining(), 0);
        engine.sample_balance();
        assert_eq!(engine.time_balanced(), 60);
    }

    #[test]
    fn abandon_has_no_outcome() {
        let mut engine = engine(quiet(LevelId::WaterBalance), hearts());
        engine.abandon();
        assert_eq!(engine.phase(), Phase::Ended(EndReason::Abandoned));
        assert_eq!(engine.outcome(), None);
    }

    #[test]
    fn stimulus_and_drift_stay_in_domain() {
        let mut engine = engine(LevelSpec::get(LevelId::BloodSugar).clone(), hearts());
        for _ in 0..200 {
            engine.apply_drift();
            engine.inject_stimulus();
            for (reading, var) in engine.readings().iter().zip(&engine.spec().variables) {
                assert!(var.domain.contains(reading.value));
            }
            if engine.is_ended() {
                break;
            }
        }
    }
}
