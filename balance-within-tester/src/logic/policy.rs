use std::fmt;

use balance_within_game::constants::MAX_HINTS;
use balance_within_game::{ActionTag, LevelSpec, TickReport};
use clap::ValueEnum;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

/// What a policy wants to do at a decision point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Wait,
    Act { action_id: String, rationale: String },
    Hint,
}

/// Policy interface for automated play.
pub trait PlayerPolicy {
    /// Name used for logging/debug output.
    fn name(&self) -> &'static str;

    /// Decide on the next move given the latest report.
    fn decide(&mut self, level: &LevelSpec, report: &TickReport) -> PolicyDecision;
}

/// Built-in gameplay strategies for automated runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Correct whichever variable is closest to leaving its band
    Reactive,
    /// Never act
    Idle,
    /// Random actions, including disabled ones
    Random,
    /// Spend every hint first, then play reactively
    HintHeavy,
}

impl Strategy {
    pub const ALL: [Self; 4] = [Self::Reactive, Self::Idle, Self::Random, Self::HintHeavy];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Reactive => "Reactive",
            Self::Idle => "Idle",
            Self::Random => "Random",
            Self::HintHeavy => "Hint Heavy",
        }
    }

    #[must_use]
    pub fn create_policy(self, seed: u64) -> Box<dyn PlayerPolicy> {
        match self {
            Self::Reactive => Box::new(ReactivePolicy),
            Self::Idle => Box::new(IdlePolicy),
            Self::Random => Box::new(RandomPolicy::new(seed)),
            Self::HintHeavy => Box::new(HintHeavyPolicy),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

struct ReactivePolicy;
struct IdlePolicy;
struct HintHeavyPolicy;

struct RandomPolicy {
    rng: ChaCha20Rng,
    act_probability: f64,
}

impl RandomPolicy {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            act_probability: 0.3,
        }
    }
}

impl PlayerPolicy for ReactivePolicy {
    fn name(&self) -> &'static str {
        "Reactive"
    }

    fn decide(&mut self, level: &LevelSpec, report: &TickReport) -> PolicyDecision {
        corrective_action(level, report).map_or(PolicyDecision::Wait, |(action_id, rationale)| {
            PolicyDecision::Act {
                action_id,
                rationale,
            }
        })
    }
}

impl PlayerPolicy for IdlePolicy {
    fn name(&self) -> &'static str {
        "Idle"
    }

    fn decide(&mut self, _level: &LevelSpec, _report: &TickReport) -> PolicyDecision {
        PolicyDecision::Wait
    }
}

impl PlayerPolicy for HintHeavyPolicy {
    fn name(&self) -> &'static str {
        "Hint Heavy"
    }

    fn decide(&mut self, level: &LevelSpec, report: &TickReport) -> PolicyDecision {
        if report.hints_used < MAX_HINTS {
            return PolicyDecision::Hint;
        }
        ReactivePolicy.decide(level, report)
    }
}

impl PlayerPolicy for RandomPolicy {
    fn name(&self) -> &'static str {
        "Random"
    }

    fn decide(&mut self, level: &LevelSpec, _report: &TickReport) -> PolicyDecision {
        if level.actions.is_empty() || !self.rng.gen_bool(self.act_probability) {
            return PolicyDecision::Wait;
        }
        let index = self.rng.gen_range(0..level.actions.len());
        PolicyDecision::Act {
            action_id: level.actions[index].id.clone(),
            rationale: format!("roll {index}"),
        }
    }
}

/// Share of the normal band treated as "about to leave".
const EDGE_MARGIN: f64 = 0.15;

/// Pick the action that best recenters the variable closest to leaving its
/// band. Actions that would overshoot further from center are skipped.
fn corrective_action(level: &LevelSpec, report: &TickReport) -> Option<(String, String)> {
    let (var, value, needed) = report
        .variables
        .iter()
        .filter_map(|reading| {
            let var = level.variable(reading.kind)?;
            let width = var.normal.max - var.normal.min;
            let margin = width * EDGE_MARGIN;
            let center = (var.normal.max + var.normal.min) / 2.0;
            let needed = if reading.value > var.normal.max - margin {
                ActionTag::Lowers
            } else if reading.value < var.normal.min + margin {
                ActionTag::Raises
            } else {
                return None;
            };
            let severity = (reading.value - center).abs() / (width / 2.0);
            Some((var, reading.value, needed, severity))
        })
        .max_by(|a, b| a.3.total_cmp(&b.3))
        .map(|(var, value, needed, _)| (var, value, needed))?;

    let center = (var.normal.max + var.normal.min) / 2.0;
    let current_gap = (value - center).abs();
    level
        .actions
        .iter()
        .filter(|a| a.target == var.kind && a.tag == needed && !level.is_disabled(&a.id))
        .map(|a| (a, (var.domain.clamp(value + a.effect) - center).abs()))
        .filter(|(_, gap)| *gap < current_gap)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(a, gap)| {
            (
                a.id.clone(),
                format!("{} {value:.1} -> gap {gap:.2}", var.kind),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use balance_within_game::{LevelId, Phase, VariableKind, VariableReading};

    fn report(kind: VariableKind, value: f64, hints_used: u8) -> TickReport {
        TickReport {
            level: LevelId::Thermoregulation,
            phase: Phase::Active,
            variables: vec![VariableReading {
                kind,
                value,
                in_band: false,
                critical: None,
            }],
            time_remaining: 30,
            time_balanced: 0,
            hints_used,
            hearts: 3,
            current_stimulus: None,
            events: Vec::new(),
        }
    }

    #[test]
    fn reactive_cools_when_hot_and_waits_when_centered() {
        let level = LevelSpec::get(LevelId::Thermoregulation);
        let mut policy = Strategy::Reactive.create_policy(1);
        assert!(matches!(
            policy.decide(level, &report(VariableKind::Temperature, 38.4, 0)),
            PolicyDecision::Act { ref action_id, .. } if action_id == "sweat"
        ));
        assert!(matches!(
            policy.decide(level, &report(VariableKind::Temperature, 35.9, 0)),
            PolicyDecision::Act { ref action_id, .. } if action_id == "shiver"
        ));
        assert_eq!(
            policy.decide(level, &report(VariableKind::Temperature, 37.0, 0)),
            PolicyDecision::Wait
        );
    }

    #[test]
    fn reactive_skips_overshooting_actions() {
        let level = LevelSpec::get(LevelId::Thermoregulation);
        // 37.4 - 1.0 lands further from center than it started.
        assert_eq!(
            Strategy::Reactive
                .create_policy(1)
                .decide(level, &report(VariableKind::Temperature, 37.4, 0)),
            PolicyDecision::Wait
        );
    }

    #[test]
    fn reactive_never_picks_disabled_insulin() {
        let level = LevelSpec::get(LevelId::SystemInteraction);
        let decision = Strategy::Reactive
            .create_policy(1)
            .decide(level, &report(VariableKind::Glucose, 120.0, 0));
        assert!(matches!(
            decision,
            PolicyDecision::Act { ref action_id, .. } if action_id == "rest"
        ));
    }

    #[test]
    fn hint_heavy_spends_hints_first() {
        let level = LevelSpec::get(LevelId::Thermoregulation);
        let mut policy = Strategy::HintHeavy.create_policy(1);
        assert_eq!(
            policy.decide(level, &report(VariableKind::Temperature, 37.0, 0)),
            PolicyDecision::Hint
        );
        assert_eq!(
            policy.decide(level, &report(VariableKind::Temperature, 37.0, 2)),
            PolicyDecision::Wait
        );
    }

    #[test]
    fn random_policy_is_seeded() {
        let level = LevelSpec::get(LevelId::BloodSugar);
        let sample = |seed| {
            let mut policy = Strategy::Random.create_policy(seed);
            (0..20)
                .map(|_| policy.decide(level, &report(VariableKind::Glucose, 85.0, 0)))
                .collect::<Vec<_>>()
        };
        assert_eq!(sample(9), sample(9));
        assert_eq!(Strategy::Idle.create_policy(0).name(), "Idle");
    }
}
