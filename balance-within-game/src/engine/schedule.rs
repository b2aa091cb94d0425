//! Deterministic virtual-time timers.
//!
//! Timers fire in due-time order; ties go to the timer registered first.
//! Periodic timers keep their registration rank across reschedules, so a
//! 1-second sample registered before the countdown always fires first.

use std::time::Duration;

/// Handle used to cancel a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone)]
struct Timer<T> {
    id: TimerId,
    due: Duration,
    period: Option<Duration>,
    kind: T,
}

/// A timer that came due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired<T> {
    pub id: TimerId,
    pub at: Duration,
    pub kind: T,
}

/// Timer queue over a virtual clock starting at zero.
#[derive(Debug, Clone)]
pub struct Scheduler<T> {
    now: Duration,
    next_id: u64,
    timers: Vec<Timer<T>>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            now: Duration::ZERO,
            next_id: 0,
            timers: Vec::new(),
        }
    }
}

impl<T: Copy> Scheduler<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    #[must_use]
    pub const fn now(&self) -> Duration {
        self.now
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Fire every `period`, first at `now + period`. A zero period is
    /// bumped to one millisecond.
    pub fn every(&mut self, period: Duration, kind: T) -> TimerId {
        let period = period.max(Duration::from_millis(1));
        self.push(self.now + period, Some(period), kind)
    }

    /// Fire once at `now + delay`.
    pub fn after(&mut self, delay: Duration, kind: T) -> TimerId {
        self.push(self.now + delay, None, kind)
    }

    fn push(&mut self, due: Duration, period: Option<Duration>, kind: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.push(Timer {
            id,
            due,
            period,
            kind,
        });
        id
    }

    /// Returns whether a live timer was removed.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != id);
        self.timers.len() != before
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }

    /// Pop the next timer due at or before `until`, moving the clock to its
    /// due time. Periodic timers are rescheduled.
    pub fn pop_due(&mut self, until: Duration) -> Option<Fired<T>> {
        let index = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= until)
            .min_by_key(|(_, t)| (t.due, t.id))
            .map(|(i, _)| i)?;
        let timer = &mut self.timers[index];
        let fired = Fired {
            id: timer.id,
            at: timer.due,
            kind: timer.kind,
        };
        self.now = self.now.max(timer.due);
        match timer.period {
            Some(period) => timer.due += period,
            None => {
                self.timers.swap_remove(index);
            }
        }
        Some(fired)
    }

    /// Move the clock forward without firing anything.
    pub fn advance_to(&mut self, until: Duration) {
        self.now = self.now.max(until);
    }
}
