//! Wall-clock drivers on a current-thread tokio runtime.
//!
//! State is `Rc`-shared, so everything here runs inside a `LocalSet` (or
//! directly on the test runtime). Borrows never span an `.await`.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};

use crate::config::SimConfig;
use crate::engine::{ActionError, ActionOutcome, LevelEngine, SessionOutcome, TickReport};
use crate::hearts::HeartsHandle;

/// Requests from presentation to a running level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Action(String),
    Hint,
    Abandon,
}

/// Messages published by a running level.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Tick(TickReport),
    Action(Result<ActionOutcome, ActionError>),
    Hint(Option<String>),
}

/// Drive `engine` in real time until it ends.
///
/// Drift, balance sampling, the countdown and queued stimuli each run on
/// their own timer. On a shared instant the sample fires before the
/// countdown. Closing the command channel abandons the level.
pub async fn run_level(
    mut engine: LevelEngine,
    config: &SimConfig,
    mut commands: mpsc::UnboundedReceiver<Command>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
) -> Option<SessionOutcome> {
    let start = Instant::now();
    let second = start + config.sample_interval();
    let mut sample = interval_at(second, config.sample_interval());
    let mut countdown = interval_at(second, config.sample_interval());
    let mut drift = interval_at(start + config.drift_interval(), config.drift_interval());
    for timer in [&mut sample, &mut countdown, &mut drift] {
        timer.set_missed_tick_behavior(MissedTickBehavior::Burst);
    }
    let mut stimuli: VecDeque<Instant> = VecDeque::new();
    let has_stimuli = !engine.spec().stimuli.is_empty();

    if engine.begin() {
        engine.inject_stimulus();
    }
    publish(&updates, SessionUpdate::Tick(engine.report()));

    while !engine.is_ended() {
        let next_stimulus = stimuli.front().copied();
        tokio::select! {
            biased;
            _ = sample.tick() => engine.sample_balance(),
            _ = countdown.tick() => engine.countdown_tick(),
            _ = drift.tick() => engine.apply_drift(),
            () = wait_until(next_stimulus) => {
                stimuli.pop_front();
                engine.inject_stimulus();
            }
            command = commands.recv() => match command {
                Some(Command::Action(id)) => {
                    let result = engine.submit_action(&id);
                    if has_stimuli
                        && !engine.is_ended()
                        && matches!(result, Ok(ActionOutcome::Applied { .. }))
                    {
                        stimuli.push_back(Instant::now() + config.stimulus_delay());
                    }
                    publish(&updates, SessionUpdate::Action(result));
                }
                Some(Command::Hint) => {
                    let hint = engine.request_hint();
                    publish(&updates, SessionUpdate::Hint(hint));
                }
                Some(Command::Abandon) | None => engine.abandon(),
            },
        }
        publish(&updates, SessionUpdate::Tick(engine.report()));
    }
    engine.outcome()
}

async fn wait_until(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn publish(updates: &mpsc::UnboundedSender<SessionUpdate>, update: SessionUpdate) {
    if updates.send(update).is_err() {
        log::debug!("session update dropped: no listener");
    }
}

/// Process-wide hearts reconciliation task.
#[derive(Debug)]
pub struct Reconciler {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Reconciler {
    /// Stop the task and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.task.await {
            log::warn!("hearts reconciler stopped abnormally: {err}");
        }
    }
}

/// Reconcile `hearts` every `period` until shut down. Must be called from
/// within a `LocalSet`.
#[must_use]
pub fn spawn_reconciler(hearts: HeartsHandle, period: Duration) -> Reconciler {
    let (shutdown, mut stop) = oneshot::channel::<()>();
    let task = tokio::task::spawn_local(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = &mut stop => break,
                _ = ticker.tick() => {
                    hearts.reconcile_now();
                }
            }
        }
        log::debug!("hearts reconciler stopped");
    });
    Reconciler { shutdown, task }
}
