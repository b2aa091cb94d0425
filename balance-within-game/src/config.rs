//! Simulation cadences and economy tunables.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DRIFT_INTERVAL_MS, MAX_HINTS, RECONCILE_INTERVAL_MS, REPLENISH_INTERVAL_MS,
    SAMPLE_INTERVAL_MS, STIMULUS_DELAY_MS,
};

/// Errors raised while loading or validating a [`SimConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{field} must be between {min} and {max} (got {value})")]
    RangeViolation {
        field: &'static str,
        min: u64,
        max: u64,
        value: u64,
    },
    #[error("drift interval {drift_ms}ms must not exceed the sample interval {sample_ms}ms")]
    DriftSlowerThanSample { drift_ms: u64, sample_ms: u64 },
}

/// Tunable cadences. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default = "SimConfig::default_drift_interval_ms")]
    pub drift_interval_ms: u64,
    #[serde(default = "SimConfig::default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    #[serde(default = "SimConfig::default_stimulus_delay_ms")]
    pub stimulus_delay_ms: u64,
    #[serde(default = "SimConfig::default_max_hints")]
    pub max_hints: u8,
    #[serde(default = "SimConfig::default_replenish_interval_ms")]
    pub replenish_interval_ms: i64,
    #[serde(default = "SimConfig::default_reconcile_interval_ms")]
    pub reconcile_interval_ms: u64,
}

impl SimConfig {
    const fn default_drift_interval_ms() -> u64 {
        DRIFT_INTERVAL_MS
    }

    const fn default_sample_interval_ms() -> u64 {
        SAMPLE_INTERVAL_MS
    }

    const fn default_stimulus_delay_ms() -> u64 {
        STIMULUS_DELAY_MS
    }

    const fn default_max_hints() -> u8 {
        MAX_HINTS
    }

    const fn default_replenish_interval_ms() -> i64 {
        REPLENISH_INTERVAL_MS
    }

    const fn default_reconcile_interval_ms() -> u64 {
        RECONCILE_INTERVAL_MS
    }

    /// Parse and validate a JSON overlay.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the JSON is malformed or a field is out of bounds.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when any field violates the documented bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        range("drift_interval_ms", self.drift_interval_ms, 50, 10_000)?;
        range("sample_interval_ms", self.sample_interval_ms, 100, 10_000)?;
        range("stimulus_delay_ms", self.stimulus_delay_ms, 0, 60_000)?;
        range("max_hints", u64::from(self.max_hints), 0, 10)?;
        range(
            "replenish_interval_ms",
            u64::try_from(self.replenish_interval_ms).unwrap_or(0),
            1_000,
            86_400_000,
        )?;
        range("reconcile_interval_ms", self.reconcile_interval_ms, 100, 60_000)?;
        if self.drift_interval_ms > self.sample_interval_ms {
            return Err(ConfigError::DriftSlowerThanSample {
                drift_ms: self.drift_interval_ms,
                sample_ms: self.sample_interval_ms,
            });
        }
        Ok(())
    }

    #[must_use]
    pub const fn drift_interval(&self) -> Duration {
        Duration::from_millis(self.drift_interval_ms)
    }

    #[must_use]
    pub const fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    #[must_use]
    pub const fn stimulus_delay(&self) -> Duration {
        Duration::from_millis(self.stimulus_delay_ms)
    }

    #[must_use]
    pub const fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            drift_interval_ms: Self::default_drift_interval_ms(),
            sample_interval_ms: Self::default_sample_interval_ms(),
            stimulus_delay_ms: Self::default_stimulus_delay_ms(),
            max_hints: Self::default_max_hints(),
            replenish_interval_ms: Self::default_replenish_interval_ms(),
            reconcile_interval_ms: Self::default_reconcile_interval_ms(),
        }
    }
}

fn range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if !(min..=max).contains(&value) {
        return Err(ConfigError::RangeViolation {
            field,
            min,
            max,
            value,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = SimConfig::default();
        cfg.validate().expect("defaults are valid");
        assert_eq!(cfg.drift_interval(), Duration::from_millis(667));
        assert_eq!(cfg.max_hints, 2);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = SimConfig::from_json(r#"{"drift_interval_ms": 500}"#).expect("valid");
        assert_eq!(cfg.drift_interval_ms, 500);
        assert_eq!(cfg.sample_interval_ms, 1_000);
        assert_eq!(cfg.replenish_interval_ms, 300_000);
    }

    #[test]
    fn rejects_out_of_range_fields() {
        let err = SimConfig::from_json(r#"{"sample_interval_ms": 5}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::RangeViolation {
                field: "sample_interval_ms",
                ..
            }
        ));
        let err = SimConfig::from_json(r#"{"drift_interval_ms": 2000}"#).unwrap_err();
        assert!(matches!(err, ConfigError::DriftSlowerThanSample { .. }));
        assert!(matches!(
            SimConfig::from_json("nope").unwrap_err(),
            ConfigError::Parse(_)
        ));
    }
}
