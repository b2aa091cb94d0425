use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use balance_within_game::{EndReason, LevelId, LevelSpec};

use super::policy::Strategy;
use super::simulation::{RunPlan, RunSummary, simulate};

/// Aggregate of every iteration of one level, strategy and seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub level: LevelId,
    pub strategy: Strategy,
    pub seed: u64,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    pub average_stars: f64,
    pub average_balance_percentage: f64,
    pub out_of_hearts_runs: usize,
    #[serde(with = "duration_serde")]
    pub average_duration: Duration,
    #[serde(with = "duration_vec_serde")]
    pub performance_data: Vec<Duration>,
}

/// `(key, description)` for every runnable scenario.
#[must_use]
pub fn list_scenarios() -> Vec<(String, String)> {
    LevelId::ALL
        .into_iter()
        .map(|id| {
            let spec = LevelSpec::get(id);
            let mut description = format!(
                "{} - {} ({}s, {} variable(s))",
                spec.name,
                spec.description,
                spec.duration_secs,
                spec.variables.len()
            );
            if let Some(scenario) = &spec.scenario {
                description.push_str(&format!(" [{}]", scenario.title));
            }
            (id.as_str().replace('_', "-"), description)
        })
        .collect()
}

pub struct LogicTester {
    verbose: bool,
}

impl LogicTester {
    pub const fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn run_scenario(
        &self,
        level: LevelId,
        strategy: Strategy,
        seeds: &[u64],
        iterations: usize,
    ) -> Vec<ScenarioResult> {
        let mut results = Vec::new();

        for &seed in seeds {
            if self.verbose {
                println!(
                    "🧪 Testing level: {} (strategy: {} seed: {})",
                    LevelSpec::get(level).name.bright_white(),
                    strategy,
                    seed
                );
            }
            results.push(self.run_single_scenario(level, strategy, seed, iterations));
        }

        results
    }

    fn run_single_scenario(
        &self,
        level: LevelId,
        strategy: Strategy,
        seed: u64,
        iterations: usize,
    ) -> ScenarioResult {
        let mut successes = 0;
        let mut failures = Vec::new();
        let mut performance_data = Vec::new();
        let mut summaries: Vec<RunSummary> = Vec::with_capacity(iterations);

        for i in 0..iterations {
            let start_time = Instant::now();
            let iteration_seed = seed.wrapping_add(u64::try_from(i).unwrap_or(u64::MAX));
            let summary = simulate(&RunPlan {
                level,
                strategy,
                seed: iteration_seed,
            });

            if summary.violations.is_empty() {
                successes += 1;
                let duration = start_time.elapsed();
                performance_data.push(duration);
                if self.verbose {
                    println!(
                        "  ✅ Iteration {}/{} passed ({duration:?}) stars:{} balanced:{}s hearts:{}",
                        i + 1,
                        iterations,
                        summary.stars,
                        summary.time_balanced,
                        summary.hearts_remaining
                    );
                }
            } else {
                let joined = summary.violations.join("; ");
                failures.push(format!(
                    "Iteration {} (seed {}, ending {}): {joined}",
                    i + 1,
                    summary.seed,
                    summary
                        .reason
                        .map_or_else(|| "none".to_string(), |r| r.to_string())
                ));
                if self.verbose {
                    println!(
                        "  ❌ Iteration {}/{} failed: {}",
                        i + 1,
                        iterations,
                        joined.red()
                    );
                }
            }
            summaries.push(summary);
        }

        ScenarioResult {
            scenario_name: format!("{} / {}", LevelSpec::get(level).name, strategy.label()),
            level,
            strategy,
            seed,
            passed: failures.is_empty(),
            iterations_run: iterations,
            successful_iterations: successes,
            failures,
            average_stars: mean(summaries.iter().map(|s| f64::from(s.stars))),
            average_balance_percentage: mean(
                summaries.iter().map(|s| f64::from(s.balance_percentage)),
            ),
            out_of_hearts_runs: summaries
                .iter()
                .filter(|s| s.reason == Some(EndReason::OutOfHearts))
                .count(),
            average_duration: average(&performance_data),
            performance_data,
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0_u32), |(sum, n), v| (sum + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / f64::from(count)
    }
}

fn average(durations: &[Duration]) -> Duration {
    if durations.is_empty() {
        Duration::ZERO
    } else {
        durations.iter().sum::<Duration>() / u32::try_from(durations.len()).unwrap_or(1)
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u128::deserialize(deserializer)?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}

mod duration_vec_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis: Vec<u128> = durations.iter().map(Duration::as_millis).collect();
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Vec::<u128>::deserialize(deserializer)?;
        Ok(millis
            .into_iter()
            .map(|m| Duration::from_millis(u64::try_from(m).unwrap_or(0)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_result_aggregates_iterations() {
        let tester = LogicTester::new(false);
        let results = tester.run_scenario(LevelId::Thermoregulation, Strategy::Reactive, &[7, 8], 2);
        assert_eq!(results.len(), 2);
        for result in &results {
            assert!(result.passed, "{:?}", result.failures);
            assert_eq!(result.iterations_run, 2);
            assert_eq!(result.successful_iterations, 2);
            assert!((1.0..=3.0).contains(&result.average_stars));
            assert_eq!(result.performance_data.len(), 2);
        }
    }

    #[test]
    fn scenario_result_serializes_durations_as_millis() {
        let result = ScenarioResult {
            scenario_name: "Thermoregulation / Idle".into(),
            level: LevelId::Thermoregulation,
            strategy: Strategy::Idle,
            seed: 1,
            passed: true,
            iterations_run: 1,
            successful_iterations: 1,
            failures: Vec::new(),
            average_stars: 2.0,
            average_balance_percentage: 40.0,
            out_of_hearts_runs: 0,
            average_duration: Duration::from_millis(12),
            performance_data: vec![Duration::from_millis(12)],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["average_duration"], 12);
        assert_eq!(json["strategy"], "idle");
        assert_eq!(json["level"], "thermoregulation");
    }

    #[test]
    fn scenarios_cover_every_level() {
        let scenarios = list_scenarios();
        assert_eq!(scenarios.len(), 4);
        assert_eq!(scenarios[1].0, "water-balance");
        assert!(scenarios[3].1.contains("Insulin Response Disabled"));
    }

    #[test]
    fn mean_handles_empty_input() {
        assert!((mean(std::iter::empty()) - 0.0).abs() < f64::EPSILON);
        assert_eq!(average(&[]), Duration::ZERO);
    }
}
