//! Balance Within Game Engine
//!
//! Platform-agnostic core of the Balance Within homeostasis game: the per-level
//! simulation loop, the hearts economy with timed regeneration, star scoring,
//! and level progression. Presentation plugs in through the feedback,
//! navigation and storage traits.

pub mod clock;
pub mod config;
pub mod constants;
pub mod engine;
pub mod feedback;
pub mod hearts;
pub mod levels;
pub mod numbers;
pub mod progress;
pub mod rng;
pub mod scoring;
pub mod storage;

#[cfg(feature = "async")]
pub mod runtime;

use std::rc::Rc;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, SimConfig};
pub use engine::{
    ActionError, ActionOutcome, EndReason, LevelEngine, LevelSession, Phase, SessionOutcome,
    StartRefused, TickReport, VariableReading,
};
pub use feedback::{FeedbackEvent, FeedbackLog, FeedbackSink, Navigator, NullFeedback, NullNavigator};
pub use hearts::{HeartsEconomy, HeartsHandle, HeartsState, format_countdown};
pub use levels::{
    Action, ActionTag, Band, Deviation, Drift, LevelId, LevelSpec, Scenario, Stimulus,
    VariableKind, VariableSpec, catalog,
};
pub use progress::{Progress, ProgressTracker};
pub use rng::RngBundle;
pub use scoring::{LevelResults, calculate_stars};
pub use storage::{FileStore, KeyValueStore, MemoryStore, RecordStore, StoreError};

/// Process-wide services, constructed once at startup.
///
/// Owns the hearts economy and progress tracker and hands a [`HeartsHandle`]
/// to every level session it starts.
pub struct GameServices {
    hearts: HeartsHandle,
    progress: ProgressTracker,
    feedback: Rc<dyn FeedbackSink>,
    navigator: Rc<dyn Navigator>,
    config: SimConfig,
}

impl std::fmt::Debug for GameServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameServices")
            .field("hearts", &self.hearts)
            .field("progress", &self.progress)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GameServices {
    /// Load persisted state and reconcile regeneration that happened while closed.
    pub fn new(
        store: impl KeyValueStore + 'static,
        clock: Rc<dyn Clock>,
        feedback: Rc<dyn FeedbackSink>,
        navigator: Rc<dyn Navigator>,
        config: SimConfig,
    ) -> Self {
        let records = RecordStore::new(store);
        let hearts = HeartsHandle::new(HeartsEconomy::load(
            records.clone(),
            clock,
            Rc::clone(&feedback),
            config.replenish_interval_ms,
        ));
        let progress = ProgressTracker::load(records);
        Self {
            hearts,
            progress,
            feedback,
            navigator,
            config,
        }
    }

    #[must_use]
    pub fn hearts(&self) -> HeartsHandle {
        self.hearts.clone()
    }

    #[must_use]
    pub const fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Start a catalog level. Refusals are also routed to the navigator.
    ///
    /// # Errors
    ///
    /// Returns `StartRefused` when the level is locked or no hearts are left.
    pub fn start_level(
        &self,
        level: LevelId,
        seed: Option<u64>,
    ) -> Result<LevelSession, StartRefused> {
        if !self.progress.is_level_unlocked(level) {
            return Err(StartRefused::Locked(level));
        }
        self.start_spec(LevelSpec::get(level).clone(), seed)
    }

    /// Start a session for an arbitrary level definition.
    ///
    /// # Errors
    ///
    /// Returns `StartRefused::NoHearts` when no hearts are left.
    pub fn start_spec(
        &self,
        spec: LevelSpec,
        seed: Option<u64>,
    ) -> Result<LevelSession, StartRefused> {
        let rng = seed.map_or_else(RngBundle::from_entropy, RngBundle::from_user_seed);
        LevelSession::start(
            spec,
            self.hearts.clone(),
            Rc::clone(&self.feedback),
            rng,
            self.config.clone(),
        )
        .inspect_err(|err| {
            if let StartRefused::NoHearts { next_heart_in } = err {
                log::info!("level start refused: no hearts");
                self.navigator.redirect_no_hearts(*next_heart_in);
            }
        })
    }

    /// Score a finished session, commit it, and route to the results view.
    pub fn commit_outcome(&mut self, outcome: &SessionOutcome) -> LevelResults {
        let spec = LevelSpec::get(outcome.level);
        let results = LevelResults::compute(
            spec,
            outcome.time_balanced,
            outcome.total_time,
            outcome.hearts_remaining,
            outcome.hints_used,
        );
        self.progress
            .complete_level(outcome.level, results.stars, results.time_balanced);
        self.navigator.show_results(&results);
        results
    }

    /// Recurring reconciliation tick.
    pub fn reconcile_hearts(&self) -> u8 {
        self.hearts.reconcile_now()
    }

    /// Restore default progress and a full hearts pool.
    pub fn reset_all_progress(&mut self) {
        self.progress.reset();
        self.hearts.reset();
        log::info!("all progress reset");
    }
}
