//! Centralized balance and tuning constants for the Balance Within simulation.
//!
//! These values define the deterministic math for the core simulation.
//! Per-level physiology (bands, thresholds, recovery points) lives in the
//! level catalog; this module holds the cross-level economy and cadences.

// Feedback and log keys ----------------------------------------------------
pub(crate) const LOG_HEART_LOST: &str = "log.heart-lost";
pub(crate) const LOG_HEART_RESTORED: &str = "log.heart-restored";
pub(crate) const LOG_CRITICAL_ENTERED: &str = "log.critical-entered";
pub(crate) const LOG_LEVEL_ENDED: &str = "log.level-ended";
pub(crate) const LOG_HINT_USED: &str = "log.hint-used";
pub(crate) const LOG_ACTION_APPLIED: &str = "log.action-applied";
pub(crate) const LOG_ACTION_BLOCKED: &str = "log.action-blocked";
pub(crate) const LOG_STIMULUS_APPLIED: &str = "log.stimulus-applied";

// Hearts economy -----------------------------------------------------------
/// Size of the shared life pool.
pub const MAX_HEARTS: u8 = 3;
/// Wall-clock delay before a lost heart is restored (5 minutes).
pub const REPLENISH_INTERVAL_MS: i64 = 5 * 60 * 1_000;
/// Cadence of the process-wide hearts reconciliation tick.
pub const RECONCILE_INTERVAL_MS: u64 = 1_000;

// Session cadences ---------------------------------------------------------
/// Drift tick (roughly 0.67 s).
pub const DRIFT_INTERVAL_MS: u64 = 667;
/// Countdown and balance sampling cadence.
pub const SAMPLE_INTERVAL_MS: u64 = 1_000;
/// Display delay between a resolved action and the next stimulus.
pub const STIMULUS_DELAY_MS: u64 = 2_000;
/// Hints available per session.
pub const MAX_HINTS: u8 = 2;

// Scoring ------------------------------------------------------------------
pub(crate) const STARS_MAX: u8 = 3;
pub(crate) const STARS_MIN: u8 = 1;
pub(crate) const STAR_PENALTY_PER_HINT: f64 = 1.0;
pub(crate) const STAR_PENALTY_PER_HEART: f64 = 0.5;
pub(crate) const BALANCE_EXCELLENT_PCT: u32 = 80;
pub(crate) const BALANCE_GOOD_PCT: u32 = 50;

// Progression --------------------------------------------------------------
/// Number of levels in the campaign.
pub const LEVEL_COUNT: u8 = 4;

// Persistence keys ---------------------------------------------------------
pub(crate) const GAME_PROGRESS_KEY: &str = "@balance_within_progress";
pub(crate) const HEARTS_DATA_KEY: &str = "@balance_within_hearts";
