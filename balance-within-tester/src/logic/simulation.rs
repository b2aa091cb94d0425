use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use balance_within_game::constants::{MAX_HEARTS, MAX_HINTS};
use balance_within_game::{
    ActionOutcome, EndReason, FeedbackEvent, FeedbackLog, GameServices, LevelId, LevelResults,
    LevelSpec, ManualClock, MemoryStore, Navigator, SimConfig, TickReport, calculate_stars,
};
use serde::{Deserialize, Serialize};

use super::policy::{PolicyDecision, Strategy};

/// Virtual time between session advances.
const STEP: Duration = Duration::from_millis(250);
/// Steps between policy decisions (a half-second reaction time).
const DECISION_EVERY: u32 = 2;
/// Slack past the level duration before a run counts as hung.
const OVERRUN_SLACK: Duration = Duration::from_secs(5);
const START_EPOCH_MS: i64 = 1_700_000_000_000;

/// One headless level run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPlan {
    pub level: LevelId,
    pub strategy: Strategy,
    pub seed: u64,
}

/// What happened during a run, plus every invariant it broke.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub level: LevelId,
    pub strategy: Strategy,
    pub seed: u64,
    pub reason: Option<EndReason>,
    pub stars: u8,
    pub time_balanced: u32,
    pub balance_percentage: u32,
    pub hearts_remaining: u8,
    pub hints_used: u8,
    pub actions_applied: u32,
    pub actions_blocked: u32,
    pub stimuli: u32,
    pub critical_events: u32,
    pub violations: Vec<String>,
}

#[derive(Default)]
struct ResultsCapture(RefCell<Vec<LevelResults>>);

impl Navigator for ResultsCapture {
    fn show_results(&self, results: &LevelResults) {
        self.0.borrow_mut().push(results.clone());
    }

    fn redirect_no_hearts(&self, _next_heart_in: Option<Duration>) {}
}

#[derive(Default)]
struct Tally {
    actions_applied: u32,
    actions_blocked: u32,
    stimuli: u32,
    critical_events: u32,
    hearts_lost: u32,
}

impl Tally {
    fn absorb(&mut self, events: &[FeedbackEvent]) {
        for event in events {
            match event {
                FeedbackEvent::ActionApplied { .. } => self.actions_applied += 1,
                FeedbackEvent::ActionBlocked { .. } => self.actions_blocked += 1,
                FeedbackEvent::StimulusApplied { .. } => self.stimuli += 1,
                FeedbackEvent::CriticalEntered { .. } => self.critical_events += 1,
                FeedbackEvent::HeartLost { .. } => self.hearts_lost += 1,
                _ => {}
            }
        }
    }
}

/// Play one level on a virtual clock, commit it, and audit the result.
#[must_use]
pub fn simulate(plan: &RunPlan) -> RunSummary {
    let clock = ManualClock::starting_at(START_EPOCH_MS);
    let navigator = Rc::new(ResultsCapture::default());
    let config = SimConfig::default();
    let mut services = GameServices::new(
        MemoryStore::new(),
        Rc::new(clock.clone()),
        Rc::new(FeedbackLog::new()),
        navigator.clone(),
        config.clone(),
    );
    let spec = LevelSpec::get(plan.level);
    let mut policy = plan.strategy.create_policy(plan.seed);
    let mut violations = Vec::new();
    let mut tally = Tally::default();

    let mut session = match services.start_spec(spec.clone(), Some(plan.seed)) {
        Ok(session) => session,
        Err(err) => {
            violations.push(format!("fresh install refused to start: {err}"));
            return summary(plan, None, None, &tally, violations);
        }
    };
    session.begin();
    let mut report = session.report();
    tally.absorb(&report.events);

    let limit = Duration::from_secs(u64::from(spec.duration_secs)) + OVERRUN_SLACK;
    let mut step = 0_u32;
    while !session.is_ended() {
        if step % DECISION_EVERY == 0 {
            match policy.decide(spec, &report) {
                PolicyDecision::Wait => {}
                PolicyDecision::Hint => {
                    if session.request_hint().is_none() {
                        violations.push("hint refused while hints remained".to_string());
                    }
                }
                PolicyDecision::Act { action_id, rationale } => {
                    log::debug!("{} acts {action_id}: {rationale}", policy.name());
                    match session.submit_action(&action_id) {
                        Ok(ActionOutcome::Blocked { .. }) if !spec.is_disabled(&action_id) => {
                            violations.push(format!("enabled action {action_id} was blocked"));
                        }
                        Ok(_) => {}
                        Err(err) => violations.push(format!("action {action_id} rejected: {err}")),
                    }
                }
            }
        }
        report = session.advance(STEP);
        clock.advance(STEP);
        if step % 4 == 3 {
            services.reconcile_hearts();
        }
        tally.absorb(&report.events);
        check_tick(spec, &report, &services, &mut violations);
        step += 1;
        if session.elapsed() > limit {
            violations.push(format!("session still running after {limit:?}"));
            break;
        }
    }

    // Events raised by a decision that ended the run are still pending.
    report = session.report();
    tally.absorb(&report.events);

    let Some(outcome) = session.outcome() else {
        violations.push("session ended without a scored outcome".to_string());
        return summary(plan, None, None, &tally, violations);
    };
    drop(session);

    match outcome.reason {
        EndReason::TimeExpired if report.time_remaining != 0 => {
            violations.push("time expired with seconds left".to_string());
        }
        EndReason::OutOfHearts if outcome.hearts_remaining != 0 => {
            violations.push("out of hearts with hearts left".to_string());
        }
        _ => {}
    }
    if u32::from(MAX_HEARTS - outcome.hearts_remaining) != tally.hearts_lost {
        violations.push(format!(
            "{} heart(s) lost but {} recorded",
            MAX_HEARTS - outcome.hearts_remaining,
            tally.hearts_lost
        ));
    }

    let results = services.commit_outcome(&outcome);
    let expected = calculate_stars(outcome.hints_used, outcome.hearts_remaining);
    if results.stars != expected || !(1..=3).contains(&results.stars) {
        violations.push(format!("stars {} (expected {expected})", results.stars));
    }
    if navigator.0.borrow().len() != 1 {
        violations.push("results view not shown exactly once".to_string());
    }
    let progress = services.progress().progress();
    if !progress.is_completed(plan.level) {
        violations.push("level not marked completed".to_string());
    }
    let sum: u32 = progress.stars.values().map(|s| u32::from(*s)).sum();
    if progress.total_stars != sum {
        violations.push(format!("total stars {} != sum {sum}", progress.total_stars));
    }

    clock.advance(Duration::from_millis(
        u64::try_from(config.replenish_interval_ms).unwrap_or(0),
    ));
    services.reconcile_hearts();
    if services.hearts().count() != MAX_HEARTS {
        violations.push("hearts not fully regenerated after the interval".to_string());
    }

    summary(plan, Some(&results), Some(outcome.reason), &tally, violations)
}

fn check_tick(
    spec: &LevelSpec,
    report: &TickReport,
    services: &GameServices,
    violations: &mut Vec<String>,
) {
    for (reading, var) in report.variables.iter().zip(&spec.variables) {
        if !var.domain.contains(reading.value) {
            violations.push(format!("{} {} left its domain", var.kind, reading.value));
        }
        if !var.critical.contains(reading.value) {
            violations.push(format!("{} {} left critical band", var.kind, reading.value));
        }
    }
    let hearts = services.hearts().snapshot();
    if usize::from(hearts.count) + hearts.replenish_timestamps.len() > usize::from(MAX_HEARTS) {
        violations.push(format!("hearts invariant broken: {hearts:?}"));
    }
    let elapsed = spec.duration_secs - report.time_remaining;
    if report.time_balanced > elapsed {
        violations.push(format!(
            "{}s balanced after {elapsed}s",
            report.time_balanced
        ));
    }
    if report.hints_used > MAX_HINTS {
        violations.push(format!("{} hints used", report.hints_used));
    }
}

fn summary(
    plan: &RunPlan,
    results: Option<&LevelResults>,
    reason: Option<EndReason>,
    tally: &Tally,
    violations: Vec<String>,
) -> RunSummary {
    RunSummary {
        level: plan.level,
        strategy: plan.strategy,
        seed: plan.seed,
        reason,
        stars: results.map_or(0, |r| r.stars),
        time_balanced: results.map_or(0, |r| r.time_balanced),
        balance_percentage: results.map_or(0, |r| r.balance_percentage),
        hearts_remaining: results.map_or(0, |r| r.hearts_remaining),
        hints_used: results.map_or(0, |r| r.hints_used),
        actions_applied: tally.actions_applied,
        actions_blocked: tally.actions_blocked,
        stimuli: tally.stimuli,
        critical_events: tally.critical_events,
        violations,
    }
}
