//! Level unlocks, completions and best scores.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::constants::{GAME_PROGRESS_KEY, STARS_MAX};
use crate::levels::LevelId;
use crate::storage::RecordStore;

/// Persisted progress record (`GAME_PROGRESS`), keyed by level number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    #[serde(default)]
    pub unlocked_levels: BTreeSet<u8>,
    #[serde(default)]
    pub completed_levels: BTreeSet<u8>,
    #[serde(default)]
    pub stars: BTreeMap<u8, u8>,
    #[serde(default)]
    pub total_stars: u32,
    #[serde(default)]
    pub time_balanced: BTreeMap<u8, u32>,
}

impl Default for Progress {
    fn default() -> Self {
        let levels = LevelId::ALL.map(LevelId::number);
        Self {
            unlocked_levels: BTreeSet::from([LevelId::Thermoregulation.number()]),
            completed_levels: BTreeSet::new(),
            stars: levels.iter().map(|n| (*n, 0)).collect(),
            total_stars: 0,
            time_balanced: levels.iter().map(|n| (*n, 0)).collect(),
        }
    }
}

impl Progress {
    /// Repair a loaded record. Returns whether anything changed.
    pub fn sanitize(&mut self) -> bool {
        let before = self.clone();
        let known = |n: &u8| LevelId::from_number(*n).is_some();
        self.unlocked_levels.retain(known);
        self.completed_levels.retain(known);
        self.stars.retain(|n, _| known(n));
        self.time_balanced.retain(|n, _| known(n));
        for stars in self.stars.values_mut() {
            *stars = (*stars).min(STARS_MAX);
        }
        self.unlocked_levels
            .insert(LevelId::Thermoregulation.number());
        self.recompute_total();
        *self != before
    }

    fn recompute_total(&mut self) {
        self.total_stars = self.stars.values().map(|s| u32::from(*s)).sum();
    }

    /// Merge a finished run. Bests only ever increase.
    pub fn record_completion(&mut self, level: LevelId, stars: u8, time_balanced: u32) {
        let number = level.number();
        self.completed_levels.insert(number);
        let best = self.stars.entry(number).or_insert(0);
        *best = (*best).max(stars.min(STARS_MAX));
        let best = self.time_balanced.entry(number).or_insert(0);
        *best = (*best).max(time_balanced);
        if let Some(next) = level.next() {
            self.unlocked_levels.insert(next.number());
        }
        self.recompute_total();
    }

    #[must_use]
    pub fn is_unlocked(&self, level: LevelId) -> bool {
        self.unlocked_levels.contains(&level.number())
    }

    #[must_use]
    pub fn is_completed(&self, level: LevelId) -> bool {
        self.completed_levels.contains(&level.number())
    }

    #[must_use]
    pub fn best_stars(&self, level: LevelId) -> u8 {
        self.stars.get(&level.number()).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn best_time_balanced(&self, level: LevelId) -> u32 {
        self.time_balanced.get(&level.number()).copied().unwrap_or(0)
    }
}

/// Owner of the progress record; every mutation is persisted in one write.
#[derive(Debug)]
pub struct ProgressTracker {
    progress: Progress,
    records: RecordStore,
}

impl ProgressTracker {
    /// Load the persisted record, falling back to defaults.
    #[must_use]
    pub fn load(records: RecordStore) -> Self {
        let mut progress: Progress = records.load(GAME_PROGRESS_KEY).unwrap_or_default();
        if progress.sanitize() {
            log::warn!("progress record was inconsistent and has been repaired");
            records.save(GAME_PROGRESS_KEY, &progress);
        }
        log::info!(
            "progress loaded: {} unlocked, {} stars",
            progress.unlocked_levels.len(),
            progress.total_stars
        );
        Self { progress, records }
    }

    #[must_use]
    pub const fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Commit a finished level.
    pub fn complete_level(&mut self, level: LevelId, stars: u8, time_balanced: u32) {
        self.progress.record_completion(level, stars, time_balanced);
        self.records.save(GAME_PROGRESS_KEY, &self.progress);
        log::info!(
            "level {} committed: {stars} star(s), {time_balanced}s balanced, total {}",
            level.number(),
            self.progress.total_stars
        );
    }

    #[must_use]
    pub fn is_level_unlocked(&self, level: LevelId) -> bool {
        self.progress.is_unlocked(level)
    }

    #[must_use]
    pub fn is_level_completed(&self, level: LevelId) -> bool {
        self.progress.is_completed(level)
    }

    /// Restore defaults and persist them.
    pub fn reset(&mut self) {
        self.progress = Progress::default();
        self.records.save(GAME_PROGRESS_KEY, &self.progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn defaults_unlock_only_first_level() {
        let progress = Progress::default();
        assert!(progress.is_unlocked(LevelId::Thermoregulation));
        assert!(!progress.is_unlocked(LevelId::WaterBalance));
        assert_eq!(progress.total_stars, 0);
        assert_eq!(progress.stars.len(), 4);
    }

    #[test]
    fn completion_keeps_bests_and_unlocks_next() {
        let mut progress = Progress::default();
        progress.record_completion(LevelId::Thermoregulation, 2, 40);
        progress.record_completion(LevelId::Thermoregulation, 1, 50);
        assert_eq!(progress.best_stars(LevelId::Thermoregulation), 2);
        assert_eq!(progress.best_time_balanced(LevelId::Thermoregulation), 50);
        assert!(progress.is_unlocked(LevelId::WaterBalance));
        assert!(progress.is_completed(LevelId::Thermoregulation));
        assert_eq!(progress.total_stars, 2);

        progress.record_completion(LevelId::SystemInteraction, 3, 10);
        assert_eq!(progress.unlocked_levels.len(), 2);
        assert_eq!(progress.total_stars, 5);
    }

    #[test]
    fn sanitize_drops_unknown_levels_and_recomputes_total() {
        let mut progress = Progress {
            unlocked_levels: BTreeSet::from([2, 9]),
            completed_levels: BTreeSet::from([0]),
            stars: BTreeMap::from([(1, 7), (8, 3)]),
            total_stars: 99,
            time_balanced: BTreeMap::from([(1, 10), (5, 5)]),
        };
        assert!(progress.sanitize());
        assert_eq!(progress.unlocked_levels, BTreeSet::from([1, 2]));
        assert!(progress.completed_levels.is_empty());
        assert_eq!(progress.stars, BTreeMap::from([(1, 3)]));
        assert_eq!(progress.total_stars, 3);
        assert_eq!(progress.time_balanced, BTreeMap::from([(1, 10)]));
        assert!(!progress.sanitize());
    }

    #[test]
    fn tracker_persists_each_commit() {
        let memory = MemoryStore::new();
        let mut tracker = ProgressTracker::load(RecordStore::new(memory.clone()));
        tracker.complete_level(LevelId::WaterBalance, 3, 42);
        let raw = memory.raw(GAME_PROGRESS_KEY).expect("persisted");
        assert!(raw.contains("\"totalStars\":3"));
        assert!(raw.contains("\"unlockedLevels\":[1,3]"));

        let reloaded = ProgressTracker::load(RecordStore::new(memory.clone()));
        assert_eq!(reloaded.progress(), tracker.progress());

        tracker.reset();
        assert_eq!(tracker.progress(), &Progress::default());
        let reloaded = ProgressTracker::load(RecordStore::new(memory));
        assert!(!reloaded.is_level_completed(LevelId::WaterBalance));
    }

    #[test]
    fn malformed_record_loads_defaults() {
        let memory = MemoryStore::new();
        memory.put_raw(GAME_PROGRESS_KEY, "[1,2,3]");
        let tracker = ProgressTracker::load(RecordStore::new(memory));
        assert_eq!(tracker.progress(), &Progress::default());
    }
}
