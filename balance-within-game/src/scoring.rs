//! Star rating and the results summary shown after a level.
use serde::{Deserialize, Serialize};

use crate::constants::{
    BALANCE_EXCELLENT_PCT, BALANCE_GOOD_PCT, MAX_HEARTS, STAR_PENALTY_PER_HEART,
    STAR_PENALTY_PER_HINT, STARS_MAX, STARS_MIN,
};
use crate::levels::{LevelId, LevelSpec};
use crate::numbers::{percentage, round_half_up_to_i32};

/// Stars earned from hints used and hearts left at the end of a session.
///
/// `3 - hints - 0.5 * hearts_lost`, rounded half-up and clamped to `1..=3`.
#[must_use]
pub fn calculate_stars(hints_used: u8, hearts_remaining: u8) -> u8 {
    let hearts_lost = MAX_HEARTS.saturating_sub(hearts_remaining);
    let raw = f64::from(STARS_MAX)
        - f64::from(hints_used) * STAR_PENALTY_PER_HINT
        - f64::from(hearts_lost) * STAR_PENALTY_PER_HEART;
    let rounded = round_half_up_to_i32(raw).clamp(i32::from(STARS_MIN), i32::from(STARS_MAX));
    u8::try_from(rounded).unwrap_or(STARS_MIN)
}

/// Headline message for a star rating.
#[must_use]
pub const fn mastery_message(stars: u8) -> &'static str {
    match stars {
        3.. => "Perfect! Your body systems remained in balance!",
        2 => "Good job! You maintained homeostasis well.",
        _ => "Keep practicing! Homeostasis requires constant attention.",
    }
}

/// Commentary on the share of time spent in band.
#[must_use]
pub const fn balance_message(balance_pct: u32) -> &'static str {
    if balance_pct >= BALANCE_EXCELLENT_PCT {
        "Excellent balance maintenance!"
    } else if balance_pct >= BALANCE_GOOD_PCT {
        "Good effort at maintaining stability."
    } else {
        "Try to keep systems balanced longer."
    }
}

/// Results handed to navigation when a session ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelResults {
    pub level_id: LevelId,
    pub stars: u8,
    pub time_balanced: u32,
    pub total_time: u32,
    pub hearts_remaining: u8,
    pub hints_used: u8,
    pub balance_percentage: u32,
    pub mastery_message: String,
    pub balance_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_note: Option<String>,
}

impl LevelResults {
    /// Score a finished session that ran for `total_time` seconds.
    #[must_use]
    pub fn compute(
        level: &LevelSpec,
        time_balanced: u32,
        total_time: u32,
        hearts_remaining: u8,
        hints_used: u8,
    ) -> Self {
        let stars = calculate_stars(hints_used, hearts_remaining);
        let balance_percentage = percentage(time_balanced.min(total_time), total_time);
        Self {
            level_id: level.id,
            stars,
            time_balanced,
            total_time,
            hearts_remaining,
            hints_used,
            balance_percentage,
            mastery_message: mastery_message(stars).to_string(),
            balance_message: balance_message(balance_percentage).to_string(),
            scenario_note: level.scenario.as_ref().map(|s| s.results_note.clone()),
        }
    }
}
