//! Ghost manager
//!
//! Owns every ghost of the current level and advances them by exactly the
//! tick count the live scene ran. Load failures only ever make a ghost
//! absent; they never reach the tick loop.

use std::sync::Arc;

use super::progress::{ProgressLog, progress_delta};
use super::{GhostHandle, GhostState};
use crate::consts::TICKS_PER_SECOND;
use crate::error::{ReplayError, Result};
use crate::persistence::PendingLoad;
use crate::replay::{EntityId, PlaybackController, Replay, Snapshot};

/// A recorded run raced alongside the player
#[derive(Debug, Clone)]
pub struct Ghost {
    handle: GhostHandle,
    playback: PlaybackController,
    /// Collectibles taken in the recorded run
    progress: ProgressLog,
    info: String,
    /// Counted by `best_reference_delta`
    reference: bool,
    state: GhostState,
}

impl Ghost {
    fn new(handle: GhostHandle, replay: Arc<Replay>) -> Self {
        let info = if replay.is_finished() {
            format!("{} ({:.2}s)", replay.player_id(), replay.finish_time())
        } else {
            format!("{} (unfinished)", replay.player_id())
        };
        Self {
            handle,
            progress: ProgressLog::from_events(replay.events()),
            playback: PlaybackController::new(replay),
            info,
            reference: true,
            state: GhostState::Active,
        }
    }

    pub fn handle(&self) -> GhostHandle {
        self.handle
    }

    pub fn state(&self) -> GhostState {
        self.state
    }

    pub fn player_name(&self) -> &str {
        self.playback.replay().player_id()
    }

    /// Label shown next to the ghost
    pub fn info(&self) -> &str {
        &self.info
    }

    pub fn is_reference(&self) -> bool {
        self.reference
    }

    /// Finish time of the recorded run, if it finished
    pub fn finish_time(&self) -> Option<f32> {
        let replay = self.playback.replay();
        replay.is_finished().then(|| replay.finish_time())
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    pub fn progress(&self) -> &ProgressLog {
        &self.progress
    }

    /// Pose to render; `interpolate` blends between recorded ticks
    pub fn snapshot(&self, interpolate: bool) -> Snapshot {
        if interpolate {
            self.playback.current_snapshot()
        } else {
            self.playback.current_record()
        }
    }

    fn advance(&mut self, steps: u32) {
        if self.state != GhostState::Active {
            return;
        }
        self.playback.advance(steps);
        self.refresh_state();
    }

    fn refresh_state(&mut self) {
        if self.state == GhostState::Active && self.playback.is_stopped() {
            self.state = GhostState::Stopped;
            log::info!(
                "{} ({}) stopped at replay tick {}",
                self.handle,
                self.player_name(),
                self.playback.current_tick()
            );
        }
    }
}

#[derive(Debug)]
struct PendingGhost {
    handle: GhostHandle,
    load: PendingLoad,
}

#[derive(Debug)]
pub struct GhostManager {
    level_id: String,
    /// Simulation ticks run since the level started
    current_tick: u64,
    player_progress: ProgressLog,
    ghosts: Vec<Ghost>,
    pending: Vec<PendingGhost>,
    next_id: u32,
}

impl GhostManager {
    pub fn new(level_id: &str) -> Self {
        Self {
            level_id: level_id.to_string(),
            current_tick: 0,
            player_progress: ProgressLog::new(),
            ghosts: Vec::new(),
            pending: Vec::new(),
            next_id: 1,
        }
    }

    pub fn level_id(&self) -> &str {
        &self.level_id
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Drop every ghost and start over on `level_id`
    pub fn restart(&mut self, level_id: &str) {
        if !self.ghosts.is_empty() || !self.pending.is_empty() {
            log::info!(
                "Releasing {} ghost(s), {} pending",
                self.ghosts.len(),
                self.pending.len()
            );
        }
        *self = Self {
            next_id: self.next_id,
            ..Self::new(level_id)
        };
    }

    fn allocate(&mut self) -> GhostHandle {
        let handle = GhostHandle(self.next_id);
        self.next_id += 1;
        handle
    }

    /// Open replay bytes and race them on `level`
    pub fn add_ghost(&mut self, replay_bytes: &[u8], level: &str) -> Result<GhostHandle> {
        let replay = Replay::open(replay_bytes)?;
        self.add_replay(Arc::new(replay), level)
    }

    /// Race an already opened replay; several ghosts may share one replay
    pub fn add_replay(&mut self, replay: Arc<Replay>, level: &str) -> Result<GhostHandle> {
        check_level(&replay, level)?;
        let handle = self.allocate();
        self.insert(handle, replay);
        Ok(handle)
    }

    /// Register a ghost whose bytes are still loading
    ///
    /// It stays `Loading` (and out of `tick`) until the load completes.
    pub fn add_pending(&mut self, load: PendingLoad) -> GhostHandle {
        let handle = self.allocate();
        log::debug!("{} loading from '{}'", handle, load.name());
        self.pending.push(PendingGhost { handle, load });
        handle
    }

    fn insert(&mut self, handle: GhostHandle, replay: Arc<Replay>) {
        let mut ghost = Ghost::new(handle, replay);
        ghost.playback.sync_to(self.current_tick);
        ghost.refresh_state();
        log::info!(
            "{} added: {} on '{}' ({} ticks)",
            handle,
            ghost.info,
            self.level_id,
            ghost.playback.replay().tick_count()
        );
        self.ghosts.push(ghost);
    }

    fn poll_pending(&mut self) {
        let mut waiting = Vec::with_capacity(self.pending.len());
        for mut pending in std::mem::take(&mut self.pending) {
            let result = match pending.load.poll() {
                None => {
                    waiting.push(pending);
                    continue;
                }
                Some(result) => result,
            };
            let opened = result
                .map_err(ReplayError::from)
                .and_then(|bytes| Replay::open(&bytes))
                .and_then(|replay| check_level(&replay, &self.level_id).map(|()| replay));
            match opened {
                Ok(replay) => self.insert(pending.handle, Arc::new(replay)),
                Err(e) => log::warn!(
                    "{} from '{}' not added: {}",
                    pending.handle,
                    pending.load.name(),
                    e
                ),
            }
        }
        self.pending = waiting;
    }

    /// Advance every active ghost by `count` ticks
    ///
    /// Called with the same count the live scene was advanced by this frame.
    pub fn tick(&mut self, count: u32) {
        self.poll_pending();
        self.current_tick += count as u64;
        for ghost in &mut self.ghosts {
            ghost.advance(count);
        }
    }

    /// Detach and release a ghost (loaded or still loading)
    pub fn remove_ghost(&mut self, handle: GhostHandle) -> Result<()> {
        if let Some(i) = self.ghosts.iter().position(|g| g.handle == handle) {
            self.ghosts.remove(i);
        } else if let Some(i) = self.pending.iter().position(|p| p.handle == handle) {
            self.pending.remove(i);
        } else {
            return Err(ReplayError::UnknownGhost(handle));
        }
        log::info!("{} removed", handle);
        Ok(())
    }

    pub fn state(&self, handle: GhostHandle) -> Option<GhostState> {
        if self.pending.iter().any(|p| p.handle == handle) {
            return Some(GhostState::Loading);
        }
        self.ghost(handle).map(Ghost::state)
    }

    pub fn ghost(&self, handle: GhostHandle) -> Option<&Ghost> {
        self.ghosts.iter().find(|g| g.handle == handle)
    }

    fn ghost_mut(&mut self, handle: GhostHandle) -> Result<&mut Ghost> {
        self.ghosts
            .iter_mut()
            .find(|g| g.handle == handle)
            .ok_or(ReplayError::UnknownGhost(handle))
    }

    /// Loaded ghosts, active or stopped
    pub fn ghosts(&self) -> impl Iterator<Item = &Ghost> {
        self.ghosts.iter()
    }

    pub fn len(&self) -> usize {
        self.ghosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ghosts.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn set_info(&mut self, handle: GhostHandle, info: &str) -> Result<()> {
        self.ghost_mut(handle)?.info = info.to_string();
        Ok(())
    }

    pub fn set_reference(&mut self, handle: GhostHandle, reference: bool) -> Result<()> {
        self.ghost_mut(handle)?.reference = reference;
        Ok(())
    }

    /// Note a collectible the live player took at simulation tick `tick`
    pub fn record_player_progress(&mut self, entity: EntityId, tick: u64) -> bool {
        self.player_progress.record(entity, tick)
    }

    pub fn player_progress(&self) -> &ProgressLog {
        &self.player_progress
    }

    /// Player lead over `handle` in seconds (positive = player ahead)
    ///
    /// None until the player and the ghost's run share a collectible, or
    /// while the ghost is still loading.
    pub fn progress_delta(&self, handle: GhostHandle) -> Result<Option<f32>> {
        match self.ghost(handle) {
            Some(ghost) => Ok(self.delta_for(ghost)),
            None if self.pending.iter().any(|p| p.handle == handle) => Ok(None),
            None => Err(ReplayError::UnknownGhost(handle)),
        }
    }

    fn delta_for(&self, ghost: &Ghost) -> Option<f32> {
        progress_delta(
            &self.player_progress,
            TICKS_PER_SECOND,
            &ghost.progress,
            ghost.playback.replay().tick_rate(),
        )
    }

    /// Delta against every loaded ghost that has one
    pub fn deltas(&self) -> Vec<(GhostHandle, f32)> {
        self.ghosts
            .iter()
            .filter_map(|g| self.delta_for(g).map(|d| (g.handle, d)))
            .collect()
    }

    /// Largest delta among reference ghosts
    pub fn best_reference_delta(&self) -> Option<f32> {
        self.ghosts
            .iter()
            .filter(|g| g.reference)
            .filter_map(|g| self.delta_for(g))
            .reduce(f32::max)
    }
}

fn check_level(replay: &Replay, level: &str) -> Result<()> {
    if replay.level_id() != level {
        return Err(ReplayError::LevelMismatch {
            expected: level.to_string(),
            found: replay.level_id().to_string(),
        });
    }
    Ok(())
}
