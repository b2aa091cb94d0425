use std::rc::Rc;
use std::time::Duration;

use crate::config::SimConfig;
use crate::engine::schedule::{Scheduler, TimerId};
use crate::engine::{
    ActionError, ActionOutcome, LevelEngine, Phase, SessionOutcome, StartRefused, TickReport,
};
use crate::feedback::FeedbackSink;
use crate::hearts::HeartsHandle;
use crate::levels::LevelSpec;
use crate::rng::RngBundle;

/// Periodic and one-shot processes owned by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Process {
    BalanceSample,
    Countdown,
    Drift,
    Stimulus,
}

/// A level run driven by virtual time.
///
/// Timers exist only while the engine is `Active`; they are cancelled when
/// the run ends, is abandoned, or the session is dropped.
#[derive(Debug)]
pub struct LevelSession {
    engine: LevelEngine,
    scheduler: Scheduler<Process>,
    config: SimConfig,
    pending_stimuli: Vec<TimerId>,
}

impl LevelSession {
    /// Create a session in `Loading`.
    ///
    /// # Errors
    ///
    /// Returns `StartRefused::NoHearts` when the hearts pool is empty.
    pub fn start(
        spec: LevelSpec,
        hearts: HeartsHandle,
        feedback: Rc<dyn FeedbackSink>,
        rng: RngBundle,
        config: SimConfig,
    ) -> Result<Self, StartRefused> {
        let engine = LevelEngine::new(spec, hearts, feedback, rng, config.max_hints)?;
        Ok(Self {
            engine,
            scheduler: Scheduler::new(),
            config,
            pending_stimuli: Vec::new(),
        })
    }

    /// Dismiss the briefing and start the clocks. The first stimulus lands
    /// immediately. Returns false when already begun.
    pub fn begin(&mut self) -> bool {
        if !self.engine.begin() {
            return false;
        }
        // Sample before countdown so the final second still counts.
        self.scheduler
            .every(self.config.sample_interval(), Process::BalanceSample);
        self.scheduler
            .every(self.config.sample_interval(), Process::Countdown);
        self.scheduler
            .every(self.config.drift_interval(), Process::Drift);
        self.engine.inject_stimulus();
        self.settle();
        true
    }

    /// Advance virtual time by `dt`, firing every due timer in order.
    pub fn advance(&mut self, dt: Duration) -> TickReport {
        let until = self.scheduler.now() + dt;
        while let Some(fired) = self.scheduler.pop_due(until) {
            match fired.kind {
                Process::BalanceSample => self.engine.sample_balance(),
                Process::Countdown => self.engine.countdown_tick(),
                Process::Drift => self.engine.apply_drift(),
                Process::Stimulus => {
                    self.pending_stimuli.retain(|id| *id != fired.id);
                    self.engine.inject_stimulus();
                }
            }
            if self.settle() {
                break;
            }
        }
        self.scheduler.advance_to(until);
        self.engine.report()
    }

    /// Apply a player action; applied actions queue the next stimulus.
    ///
    /// # Errors
    ///
    /// Returns `ActionError` when the session is not active or the id is unknown.
    pub fn submit_action(&mut self, action_id: &str) -> Result<ActionOutcome, ActionError> {
        let outcome = self.engine.submit_action(action_id)?;
        if matches!(outcome, ActionOutcome::Applied { .. })
            && !self.settle()
            && !self.engine.spec().stimuli.is_empty()
        {
            let id = self
                .scheduler
                .after(self.config.stimulus_delay(), Process::Stimulus);
            self.pending_stimuli.push(id);
        }
        Ok(outcome)
    }

    /// Use one of the session's hints.
    pub fn request_hint(&mut self) -> Option<String> {
        self.engine.request_hint()
    }

    /// End without a result and drop every timer.
    pub fn abandon(&mut self) -> TickReport {
        self.engine.abandon();
        self.settle();
        self.engine.report()
    }

    /// Report without advancing time.
    pub fn report(&mut self) -> TickReport {
        self.engine.report()
    }

    #[must_use]
    pub const fn engine(&self) -> &LevelEngine {
        &self.engine
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.engine.phase()
    }

    #[must_use]
    pub const fn is_ended(&self) -> bool {
        self.engine.is_ended()
    }

    /// Virtual time since the session was created.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.scheduler.now()
    }

    /// Number of live timers.
    #[must_use]
    pub fn active_timers(&self) -> usize {
        self.scheduler.len()
    }

    /// Stimuli queued behind their display delay.
    #[must_use]
    pub fn pending_stimuli(&self) -> usize {
        self.pending_stimuli.len()
    }

    #[must_use]
    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.engine.outcome()
    }

    /// Cancel timers once the run has ended. Returns whether it has.
    fn settle(&mut self) -> bool {
        if self.engine.is_ended() {
            self.scheduler.clear();
            self.pending_stimuli.clear();
            return true;
        }
        false
    }
}

impl Drop for LevelSession {
    fn drop(&mut self) {
        self.scheduler.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::EndReason;
    use crate::feedback::NullFeedback;
    use crate::hearts::HeartsEconomy;
    use crate::levels::{Drift, LevelId};
    use crate::storage::{MemoryStore, RecordStore};

    fn hearts() -> HeartsHandle {
        HeartsHandle::new(HeartsEconomy::load_default(
            RecordStore::new(MemoryStore::new()),
            Rc::new(ManualClock::starting_at(0)),
            Rc::new(NullFeedback),
        ))
    }

    fn session(spec: LevelSpec) -> LevelSession {
        LevelSession::start(
            spec,
            hearts(),
            Rc::new(NullFeedback),
            RngBundle::from_user_seed(5),
            SimConfig::default(),
        )
        .expect("hearts available")
    }

    fn calm(id: LevelId, duration_secs: u32) -> LevelSpec {
        let mut spec = LevelSpec::get(id).clone();
        spec.duration_secs = duration_secs;
        spec.stimuli.clear();
        for var in &mut spec.variables {
            var.drift = Drift {
                base: 0.0,
                spread: 0.0,
            };
        }
        spec
    }

    #[test]
    fn loading_runs_no_timers() {
        let mut session = session(LevelSpec::get(LevelId::Thermoregulation).clone());
        let report = session.advance(Duration::from_secs(5));
        assert_eq!(report.phase, Phase::Loading);
        assert_eq!(report.time_remaining, 60);
        assert_eq!(session.active_timers(), 0);
        assert!(session.begin());
        assert!(!session.begin());
        assert_eq!(session.active_timers(), 3);
    }

    #[test]
    fn balanced_run_counts_every_second() {
        let mut session = session(calm(LevelId::Thermoregulation, 30));
        session.begin();
        let mut report = session.advance(Duration::from_millis(250));
        while !session.is_ended() {
            report = session.advance(Duration::from_millis(250));
        }
        assert_eq!(report.phase, Phase::Ended(EndReason::TimeExpired));
        assert_eq!(report.time_balanced, 30);
        assert_eq!(session.elapsed(), Duration::from_secs(30));
        assert_eq!(session.active_timers(), 0);
    }

    #[test]
    fn applied_action_queues_delayed_stimulus() {
        let mut session = session(LevelSpec::get(LevelId::WaterBalance).clone());
        session.begin();
        let first = session.report().current_stimulus;
        assert!(first.is_some());
        session.submit_action("rest").unwrap();
        assert_eq!(session.pending_stimuli(), 1);
        session.advance(Duration::from_millis(1_999));
        assert_eq!(session.pending_stimuli(), 1);
        let report = session.advance(Duration::from_millis(1));
        assert_eq!(session.pending_stimuli(), 0);
        assert!(
            report
                .events
                .iter()
                .any(|e| e.key() == "log.stimulus-applied")
        );
    }

    #[test]
    fn blocked_action_queues_nothing() {
        let mut session = session(LevelSpec::get(LevelId::SystemInteraction).clone());
        session.begin();
        let outcome = session.submit_action("insulin").unwrap();
        assert!(matches!(outcome, ActionOutcome::Blocked { .. }));
        assert_eq!(session.pending_stimuli(), 0);
    }

    #[test]
    fn abandon_clears_timers() {
        let mut session = session(LevelSpec::get(LevelId::BloodSugar).clone());
        session.begin();
        session.submit_action("eat").ok();
        let report = session.abandon();
        assert_eq!(report.phase, Phase::Ended(EndReason::Abandoned));
        assert_eq!(session.active_timers(), 0);
        assert_eq!(session.pending_stimuli(), 0);
        assert_eq!(session.outcome(), None);
        let after = session.advance(Duration::from_secs(10));
        assert!(after.events.is_empty());
    }
}
