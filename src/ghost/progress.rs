//! Progress comparison between the live player and a ghost
//!
//! Progress is the set of collectibles taken and the tick each was first
//! taken at. The time difference is read off the most recent collectible the
//! player has taken that the ghost's run also took.

use serde::{Deserialize, Serialize};

use crate::replay::{EntityId, ProgressEvent};

/// First-taken tick per entity, in the order the entities were taken
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressLog {
    taken: Vec<(EntityId, u64)>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a replay's recorded events
    pub fn from_events(events: &[ProgressEvent]) -> Self {
        let mut log = Self::new();
        for e in events {
            log.record(e.entity, e.tick);
        }
        log
    }

    /// Note `entity` taken at `tick`; returns false if it was already taken
    pub fn record(&mut self, entity: EntityId, tick: u64) -> bool {
        if self.tick_of(entity).is_some() {
            return false;
        }
        self.taken.push((entity, tick));
        true
    }

    pub fn tick_of(&self, entity: EntityId) -> Option<u64> {
        self.taken
            .iter()
            .find(|(id, _)| *id == entity)
            .map(|&(_, tick)| tick)
    }

    pub fn last(&self) -> Option<(EntityId, u64)> {
        self.taken.last().copied()
    }

    pub fn len(&self) -> usize {
        self.taken.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taken.is_empty()
    }

    pub fn clear(&mut self) {
        self.taken.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, u64)> + '_ {
        self.taken.iter().copied()
    }
}

/// Player lead over the ghost in seconds (positive = player ahead)
///
/// Walks the player's log from the most recent entry back and uses the first
/// entity the ghost also took. Entities only one side took are skipped; with
/// no common entity there is no delta. Each side's ticks are converted with
/// its own tick rate.
pub fn progress_delta(
    player: &ProgressLog,
    player_tick_rate: u32,
    ghost: &ProgressLog,
    ghost_tick_rate: u32,
) -> Option<f32> {
    player.taken.iter().rev().find_map(|&(entity, player_tick)| {
        let ghost_tick = ghost.tick_of(entity)?;
        let ghost_secs = ghost_tick as f64 / ghost_tick_rate.max(1) as f64;
        let player_secs = player_tick as f64 / player_tick_rate.max(1) as f64;
        Some((ghost_secs - player_secs) as f32)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(entries: &[(EntityId, u64)]) -> ProgressLog {
        let mut log = ProgressLog::new();
        for &(entity, tick) in entries {
            log.record(entity, tick);
        }
        log
    }

    #[test]
    fn test_first_take_wins() {
        let mut l = ProgressLog::new();
        assert!(l.record(4, 10));
        assert!(!l.record(4, 20));
        assert_eq!(l.tick_of(4), Some(10));
        assert_eq!(l.len(), 1);
    }

    #[test]
    fn test_no_common_entity() {
        let player = log(&[(1, 50)]);
        let ghost = log(&[(2, 40)]);
        assert_eq!(progress_delta(&player, 100, &ghost, 100), None);
        assert_eq!(progress_delta(&ProgressLog::new(), 100, &ghost, 100), None);
    }

    #[test]
    fn test_sign_convention() {
        let ghost = log(&[(1, 100), (2, 200)]);
        // Player got there 10 ticks earlier: ahead
        let delta = progress_delta(&log(&[(1, 90)]), 100, &ghost, 100).unwrap();
        assert!((delta - 0.1).abs() < 1e-6);
        // Later at the second one: behind
        let delta = progress_delta(&log(&[(1, 90), (2, 230)]), 100, &ghost, 100).unwrap();
        assert!((delta + 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_uneven_counts_use_latest_common() {
        let ghost = log(&[(1, 100), (2, 200)]);
        // Player took 3 (ghost never did) after 2: 2 still decides
        let player = log(&[(1, 90), (2, 230), (3, 260)]);
        let delta = progress_delta(&player, 100, &ghost, 100).unwrap();
        assert!((delta + 0.3).abs() < 1e-6);
        // Player took them in a different order than the ghost
        let player = log(&[(2, 150), (1, 180)]);
        let delta = progress_delta(&player, 100, &ghost, 100).unwrap();
        assert!((delta + 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_rates_are_converted() {
        // Ghost sampled at 50 Hz: tick 50 is 1.0 s
        let ghost = log(&[(7, 50)]);
        let player = log(&[(7, 80)]);
        let delta = progress_delta(&player, 100, &ghost, 50).unwrap();
        assert!((delta - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_from_events() {
        let events = [
            ProgressEvent { tick: 5, entity: 1 },
            ProgressEvent { tick: 9, entity: 1 },
            ProgressEvent { tick: 12, entity: 2 },
        ];
        let l = ProgressLog::from_events(&events);
        assert_eq!(l.len(), 2);
        assert_eq!(l.last(), Some((2, 12)));
    }
}
