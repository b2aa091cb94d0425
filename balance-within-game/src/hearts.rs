//! Shared life pool with timed per-heart regeneration.
//!
//! Lost hearts are queued as absolute epoch timestamps. Reconciliation
//! compares them to the wall clock, so hearts that came due while the process
//! was closed are restored on the next load.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::constants::{HEARTS_DATA_KEY, MAX_HEARTS, REPLENISH_INTERVAL_MS};
use crate::feedback::{FeedbackEvent, FeedbackSink};
use crate::numbers::millis_to_u64;
use crate::storage::RecordStore;

/// Persisted hearts record (`HEARTS_DATA`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartsState {
    pub count: u8,
    #[serde(default)]
    pub replenish_timestamps: Vec<i64>,
}

impl Default for HeartsState {
    fn default() -> Self {
        Self {
            count: MAX_HEARTS,
            replenish_timestamps: Vec::new(),
        }
    }
}

impl HeartsState {
    /// Repair a loaded record so `count + pending <= MAX_HEARTS` holds.
    /// Returns whether anything had to change.
    pub fn sanitize(&mut self) -> bool {
        let before = self.clone();
        self.count = self.count.min(MAX_HEARTS);
        self.replenish_timestamps.sort_unstable();
        let room = usize::from(MAX_HEARTS - self.count);
        self.replenish_timestamps.truncate(room);
        *self != before
    }

    /// Lose one heart at `now`. No-op returning false when already empty.
    pub fn deduct(&mut self, now: i64, replenish_interval_ms: i64) -> bool {
        if self.count == 0 {
            return false;
        }
        self.count -= 1;
        self.replenish_timestamps
            .push(now.saturating_add(replenish_interval_ms));
        self.replenish_timestamps.sort_unstable();
        true
    }

    /// Restore every heart whose timestamp is due. Returns how many came back.
    pub fn reconcile(&mut self, now: i64) -> u8 {
        let due = self
            .replenish_timestamps
            .iter()
            .take_while(|ts| **ts <= now)
            .count();
        if due == 0 {
            return 0;
        }
        self.replenish_timestamps.drain(..due);
        let before = self.count;
        let due = u8::try_from(due).unwrap_or(MAX_HEARTS);
        self.count = self.count.saturating_add(due).min(MAX_HEARTS);
        self.count - before
    }

    /// Earliest pending timestamp.
    #[must_use]
    pub fn next_timestamp(&self) -> Option<i64> {
        self.replenish_timestamps.first().copied()
    }
}

/// Owner of the hearts record. All mutation goes through here.
pub struct HeartsEconomy {
    state: HeartsState,
    records: RecordStore,
    clock: Rc<dyn Clock>,
    feedback: Rc<dyn FeedbackSink>,
    replenish_interval_ms: i64,
}

impl std::fmt::Debug for HeartsEconomy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartsEconomy")
            .field("state", &self.state)
            .field("replenish_interval_ms", &self.replenish_interval_ms)
            .finish_non_exhaustive()
    }
}

impl HeartsEconomy {
    /// Load the persisted record (defaulting when absent or malformed) and
    /// catch up on any regeneration that happened while closed.
    pub fn load(
        records: RecordStore,
        clock: Rc<dyn Clock>,
        feedback: Rc<dyn FeedbackSink>,
        replenish_interval_ms: i64,
    ) -> Self {
        let mut state: HeartsState = records.load(HEARTS_DATA_KEY).unwrap_or_default();
        let repaired = state.sanitize();
        if repaired {
            log::warn!("hearts record violated its invariant and was repaired");
        }
        let mut economy = Self {
            state,
            records,
            clock,
            feedback,
            replenish_interval_ms,
        };
        let now = economy.clock.now_millis();
        let restored = economy.reconcile(now);
        if repaired && restored == 0 {
            economy.persist();
        }
        log::info!(
            "hearts loaded: {} of {MAX_HEARTS}, {} pending",
            economy.state.count,
            economy.state.replenish_timestamps.len()
        );
        economy
    }

    /// Load with the default five minute regeneration interval.
    pub fn load_default(
        records: RecordStore,
        clock: Rc<dyn Clock>,
        feedback: Rc<dyn FeedbackSink>,
    ) -> Self {
        Self::load(records, clock, feedback, REPLENISH_INTERVAL_MS)
    }

    #[must_use]
    pub const fn state(&self) -> &HeartsState {
        &self.state
    }

    #[must_use]
    pub const fn count(&self) -> u8 {
        self.state.count
    }

    #[must_use]
    pub const fn can_play(&self) -> bool {
        self.state.count > 0
    }

    /// Lose one heart. Returns false (and changes nothing) when none are left.
    pub fn deduct_heart(&mut self) -> bool {
        let event = self.take_heart();
        if let Some(event) = &event {
            self.feedback.emit(event);
        }
        event.is_some()
    }

    /// Deduct and persist, returning the signal instead of emitting it.
    fn take_heart(&mut self) -> Option<FeedbackEvent> {
        let now = self.clock.now_millis();
        if !self.state.deduct(now, self.replenish_interval_ms) {
            log::debug!("heart deduction ignored: pool already empty");
            return None;
        }
        self.persist();
        log::info!("heart lost, {} remaining", self.state.count);
        Some(FeedbackEvent::HeartLost {
            remaining: self.state.count,
        })
    }

    /// Time until the next heart comes back, if any are pending.
    #[must_use]
    pub fn next_replenish_in(&self) -> Option<Duration> {
        let next = self.state.next_timestamp()?;
        let remaining = next.saturating_sub(self.clock.now_millis());
        Some(Duration::from_millis(millis_to_u64(remaining)))
    }

    /// Restore every heart due at `now`. Idempotent for a fixed `now`.
    pub fn reconcile(&mut self, now: i64) -> u8 {
        let (restored, event) = self.restore_due(now);
        if let Some(event) = &event {
            self.feedback.emit(event);
        }
        restored
    }

    fn restore_due(&mut self, now: i64) -> (u8, Option<FeedbackEvent>) {
        let restored = self.state.reconcile(now);
        if restored == 0 {
            return (0, None);
        }
        self.persist();
        log::info!(
            "{restored} heart(s) restored, {} of {MAX_HEARTS}",
            self.state.count
        );
        let event = FeedbackEvent::HeartRestored {
            count: self.state.count,
        };
        (restored, Some(event))
    }

    /// Reconcile against the economy's own clock.
    pub fn reconcile_now(&mut self) -> u8 {
        let now = self.clock.now_millis();
        self.reconcile(now)
    }

    /// Restore the default full pool and persist it.
    pub fn reset(&mut self) {
        self.state = HeartsState::default();
        self.persist();
    }

    fn persist(&self) {
        self.records.save(HEARTS_DATA_KEY, &self.state);
    }
}

/// Cloneable single-threaded handle to the process-wide hearts economy.
///
/// Borrows never outlive a method call, so a level session and the
/// reconciliation tick can interleave freely on one thread. Feedback is
/// emitted after the borrow is released, so sinks may read the pool.
#[derive(Debug, Clone)]
pub struct HeartsHandle {
    inner: Rc<RefCell<HeartsEconomy>>,
}

impl HeartsHandle {
    #[must_use]
    pub fn new(economy: HeartsEconomy) -> Self {
        Self {
            inner: Rc::new(RefCell::new(economy)),
        }
    }

    #[must_use]
    pub fn can_play(&self) -> bool {
        self.inner.borrow().can_play()
    }

    #[must_use]
    pub fn count(&self) -> u8 {
        self.inner.borrow().count()
    }

    pub fn deduct_heart(&self) -> bool {
        let (event, sink) = {
            let mut economy = self.inner.borrow_mut();
            (economy.take_heart(), Rc::clone(&economy.feedback))
        };
        if let Some(event) = &event {
            sink.emit(event);
        }
        event.is_some()
    }

    #[must_use]
    pub fn next_replenish_in(&self) -> Option<Duration> {
        self.inner.borrow().next_replenish_in()
    }

    pub fn reconcile(&self, now: i64) -> u8 {
        let ((restored, event), sink) = {
            let mut economy = self.inner.borrow_mut();
            (economy.restore_due(now), Rc::clone(&economy.feedback))
        };
        if let Some(event) = &event {
            sink.emit(event);
        }
        restored
    }

    pub fn reconcile_now(&self) -> u8 {
        let now = self.inner.borrow().clock.now_millis();
        self.reconcile(now)
    }

    #[must_use]
    pub fn snapshot(&self) -> HeartsState {
        self.inner.borrow().state().clone()
    }

    pub fn reset(&self) {
        self.inner.borrow_mut().reset();
    }
}

/// Render a countdown as `m:ss`, rounding partial seconds up.
#[must_use]
pub fn format_countdown(remaining: Duration) -> String {
    let millis = remaining.as_millis();
    if millis == 0 {
        return "0:00".to_string();
    }
    let total_seconds = millis.div_ceil(1_000);
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{minutes}:{seconds:02}")
}
