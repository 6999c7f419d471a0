//! Live scene: one level, one rider, fixed-step gameplay rules
//!
//! Each step advances the rider one tick, then applies the level rules:
//! collectibles are taken on contact, hazards kill, and the finish zone ends
//! the run once every collectible is taken.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::entity::Entity;
use super::physics::{Controls, Physics};
use crate::consts::PHYS_STEP;
use crate::ghost::GhostHandle;
use crate::replay::{EntityId, Snapshot};
use crate::ticks_to_seconds;

/// Circular trigger area
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub center: Vec2,
    pub radius: f32,
}

impl Zone {
    pub fn new(center: Vec2, radius: f32) -> Self {
        Self { center, radius }
    }

    pub fn contains(&self, point: Vec2) -> bool {
        self.center.distance_squared(point) <= self.radius * self.radius
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Collectible {
    pub id: EntityId,
    pub zone: Zone,
}

/// Level data the scene needs; loading it is the host's job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub id: String,
    pub start: Vec2,
    pub collectibles: Vec<Collectible>,
    pub finish: Zone,
    pub hazards: Vec<Zone>,
}

impl Level {
    pub fn new(id: &str, start: Vec2, finish: Zone) -> Self {
        Self {
            id: id.to_string(),
            start,
            collectibles: Vec::new(),
            finish,
            hazards: Vec::new(),
        }
    }

    pub fn with_collectible(mut self, id: EntityId, center: Vec2, radius: f32) -> Self {
        self.collectibles.push(Collectible {
            id,
            zone: Zone::new(center, radius),
        });
        self
    }

    pub fn with_hazard(mut self, center: Vec2, radius: f32) -> Self {
        self.hazards.push(Zone::new(center, radius));
        self
    }
}

/// How the run ended
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelOutcome {
    pub finished: bool,
    /// Seconds from the start of the run
    pub time: f32,
}

/// What one step produced
#[derive(Debug, Clone, Default)]
pub struct StepReport {
    pub tick: u64,
    pub state: Snapshot,
    pub taken: Vec<EntityId>,
    /// Set on the tick the run ended
    pub ended: Option<LevelOutcome>,
}

/// Scene event callbacks
///
/// The scene owns its hooks and lends itself to each call.
pub trait SceneHooks {
    fn on_entity_taken(&mut self, _scene: &Scene, _entity: EntityId) {}
    fn on_ghost_progress_delta(&mut self, _scene: &Scene, _ghost: GhostHandle, _delta: f32) {}
    fn on_level_finished(&mut self, _scene: &Scene, _finished: bool, _finish_time: f32) {}
}

pub struct Scene {
    level: Level,
    tick: u64,
    player: Entity,
    taken: Vec<EntityId>,
    outcome: Option<LevelOutcome>,
    hooks: Option<Box<dyn SceneHooks>>,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("level", &self.level.id)
            .field("tick", &self.tick)
            .field("taken", &self.taken)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

impl Scene {
    /// Scene with a live rider at the level start
    pub fn new(level: Level) -> Self {
        let player = Entity::live(Snapshot::at(level.start));
        Self::with_player(level, player)
    }

    pub fn with_player(level: Level, player: Entity) -> Self {
        Self {
            level,
            tick: 0,
            player,
            taken: Vec::new(),
            outcome: None,
            hooks: None,
        }
    }

    pub fn set_hooks(&mut self, hooks: Box<dyn SceneHooks>) {
        self.hooks = Some(hooks);
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    /// Ticks run since the level started
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn player(&self) -> &Entity {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut Entity {
        &mut self.player
    }

    pub fn set_controls(&mut self, controls: Controls) {
        self.player.set_controls(controls);
    }

    /// Collectibles taken so far, in order
    pub fn taken(&self) -> &[EntityId] {
        &self.taken
    }

    pub fn outcome(&self) -> Option<LevelOutcome> {
        self.outcome
    }

    pub fn is_over(&self) -> bool {
        self.outcome.is_some()
    }

    /// Advance one fixed tick
    ///
    /// The tick counter keeps running after the run ended so ghosts stay in
    /// lock-step. A live rider no longer moves once the run ended; a
    /// replay-driven one keeps following its cursor, and the outcome is
    /// cleared when the cursor leaves the terminal record.
    pub fn step(&mut self, physics: &mut dyn Physics) -> StepReport {
        self.tick += 1;
        let mut report = StepReport {
            tick: self.tick,
            ..Default::default()
        };

        if self.player.is_live() {
            if self.outcome.is_none() {
                self.player.update(physics, PHYS_STEP as f32);
                self.apply_rules(&mut report.taken);
                let state = *self.player.state();
                if state.is_terminal() {
                    report.ended = Some(self.end(LevelOutcome {
                        finished: state.flags.finished,
                        time: ticks_to_seconds(self.tick as i64),
                    }));
                }
            }
        } else {
            self.player.update(physics, PHYS_STEP as f32);
            report.ended = self.follow_replay();
        }

        for &entity in &report.taken {
            self.with_hooks(|hooks, scene| hooks.on_entity_taken(scene, entity));
        }
        if let Some(outcome) = report.ended {
            self.with_hooks(|hooks, scene| {
                hooks.on_level_finished(scene, outcome.finished, outcome.time)
            });
        }

        report.state = *self.player.state();
        report
    }

    fn end(&mut self, outcome: LevelOutcome) -> LevelOutcome {
        self.outcome = Some(outcome);
        log::info!(
            "Level '{}' {} at {:.2}s",
            self.level.id,
            if outcome.finished { "finished" } else { "failed" },
            outcome.time
        );
        outcome
    }

    /// Outcome of a watched run, taken from the recording itself
    ///
    /// Only the unblended record under the cursor counts, and the time is
    /// the recorded one, so playback speed and sample rate do not shift it.
    fn follow_replay(&mut self) -> Option<LevelOutcome> {
        let playback = self.player.playback()?;
        let record = playback.current_record();
        if !record.is_terminal() {
            if self.outcome.take().is_some() {
                log::debug!("Level '{}' replay left its end at tick {}", self.level.id, self.tick);
            }
            return None;
        }
        if self.outcome.is_some() {
            return None;
        }
        let outcome = LevelOutcome {
            finished: record.flags.finished,
            time: playback.replay().finish_time(),
        };
        Some(self.end(outcome))
    }

    fn apply_rules(&mut self, taken_now: &mut Vec<EntityId>) {
        let position = self.player.state().position;

        for c in &self.level.collectibles {
            if !self.taken.contains(&c.id) && c.zone.contains(position) {
                self.taken.push(c.id);
                taken_now.push(c.id);
                log::debug!("Entity {} taken at tick {}", c.id, self.tick);
            }
        }

        let flags = &mut self.player.state_mut().flags;
        if self.level.hazards.iter().any(|h| h.contains(position)) {
            flags.dead = true;
        } else if self.taken.len() == self.level.collectibles.len()
            && self.level.finish.contains(position)
        {
            flags.finished = true;
        }
    }

    /// Forward a ghost time difference to the hooks
    pub fn notify_ghost_delta(&mut self, ghost: GhostHandle, delta: f32) {
        self.with_hooks(|hooks, scene| hooks.on_ghost_progress_delta(scene, ghost, delta));
    }

    fn with_hooks(&mut self, f: impl FnOnce(&mut dyn SceneHooks, &Scene)) {
        if let Some(mut hooks) = self.hooks.take() {
            f(hooks.as_mut(), self);
            self.hooks = Some(hooks);
        }
    }
}
