//! Per-level session: the frame loop tying clock, scene, recorder and ghosts
//!
//! A frame asks the clock how many ticks to run, steps the scene that many
//! times (recording each resulting snapshot), then advances every ghost by
//! the same count. Recording failures are logged and drop the recording;
//! they never stop the scene.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::entity::Entity;
use super::physics::{Controls, Physics};
use super::scene::{Level, LevelOutcome, Scene, SceneHooks};
use crate::clock::{FramePacer, SimulationClock};
use crate::error::{ReplayError, Result};
use crate::ghost::{GhostHandle, GhostManager};
use crate::persistence::{PendingLoad, Storage};
use crate::replay::{EntityId, PlaybackController, Replay, ReplayRecorder, ReplayStore, Snapshot};
use crate::settings::Settings;

/// Which rider a rendered snapshot belongs to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderTarget<'a> {
    Player,
    Ghost { handle: GhostHandle, info: &'a str },
}

/// Rendering collaborator; pulls interpolated poses at its own rate
pub trait Renderer {
    fn render(&mut self, target: RenderTarget<'_>, snapshot: &Snapshot);
}

/// What one frame did
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameReport {
    pub steps: u32,
    pub resynced: bool,
    /// Scene tick after the frame
    pub tick: u64,
    pub taken: Vec<EntityId>,
    /// Player lead per ghost, when enabled in settings
    pub deltas: Vec<(GhostHandle, f32)>,
    pub ended: Option<LevelOutcome>,
}

pub struct Session {
    settings: Settings,
    clock: SimulationClock,
    pacer: FramePacer,
    scene: Scene,
    recorder: ReplayStore,
    ghosts: GhostManager,
    physics: Box<dyn Physics>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("settings", &self.settings)
            .field("scene", &self.scene)
            .field("ghosts", &self.ghosts.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Live run on `level` by `player_id`, recording if enabled
    pub fn live(
        settings: Settings,
        level: Level,
        player_id: &str,
        physics: Box<dyn Physics>,
    ) -> Result<Self> {
        let mut session = Self::build(settings, Scene::new(level), physics);
        if session.settings.record_replays {
            let level_id = session.scene.level().id.clone();
            let recorder = session.recorder.start_recording(
                &level_id,
                player_id,
                session.settings.effective_tick_rate(),
                session.settings.compress_replays,
            )?;
            recorder.append(0, *session.scene.player().state())?;
        }
        Ok(session)
    }

    /// Watch a recorded run on `level`; nothing is recorded
    pub fn watch(
        settings: Settings,
        level: Level,
        replay: Arc<Replay>,
        physics: Box<dyn Physics>,
    ) -> Result<Self> {
        if replay.level_id() != level.id {
            return Err(ReplayError::LevelMismatch {
                expected: level.id,
                found: replay.level_id().to_string(),
            });
        }
        let player = Entity::replay_driven(PlaybackController::new(replay));
        Ok(Self::build(settings, Scene::with_player(level, player), physics))
    }

    fn build(settings: Settings, scene: Scene, physics: Box<dyn Physics>) -> Self {
        Self {
            clock: SimulationClock::default(),
            pacer: FramePacer::new(settings.max_fps),
            ghosts: GhostManager::new(&scene.level().id),
            recorder: ReplayStore::new(),
            settings,
            scene,
            physics,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn ghosts(&self) -> &GhostManager {
        &self.ghosts
    }

    pub fn ghosts_mut(&mut self) -> &mut GhostManager {
        &mut self.ghosts
    }

    pub fn recorder(&self) -> &ReplayStore {
        &self.recorder
    }

    pub fn set_hooks(&mut self, hooks: Box<dyn SceneHooks>) {
        self.scene.set_hooks(hooks);
    }

    pub fn set_controls(&mut self, controls: Controls) {
        self.scene.set_controls(controls);
    }

    /// Playback cursor of a watched run
    pub fn playback_mut(&mut self) -> Option<&mut PlaybackController> {
        self.scene.player_mut().playback_mut()
    }

    pub fn add_ghost(&mut self, replay_bytes: &[u8]) -> Result<GhostHandle> {
        let level_id = self.scene.level().id.clone();
        self.ghosts.add_ghost(replay_bytes, &level_id)
    }

    pub fn add_pending_ghost(&mut self, load: PendingLoad) -> GhostHandle {
        self.ghosts.add_pending(load)
    }

    /// Run the ticks due at wall-clock time `now` (seconds)
    pub fn frame(&mut self, now: f64) -> FrameReport {
        let batch = self.clock.ticks_to_run(now);
        let mut report = FrameReport {
            steps: batch.steps,
            resynced: batch.resynced,
            ..Default::default()
        };

        for _ in 0..batch.steps {
            let step = self.scene.step(self.physics.as_mut());
            for &entity in &step.taken {
                self.ghosts.record_player_progress(entity, step.tick);
            }
            self.record_step(step.tick, &step.state, &step.taken, step.ended);
            report.taken.extend_from_slice(&step.taken);
            if step.ended.is_some() {
                report.ended = step.ended;
            }
        }
        self.ghosts.tick(batch.steps);
        report.tick = self.scene.tick();

        if self.settings.show_ghost_time_diff {
            report.deltas = self.ghosts.deltas();
            if !report.taken.is_empty() {
                for &(handle, delta) in &report.deltas {
                    self.scene.notify_ghost_delta(handle, delta);
                }
            }
        }
        report
    }

    fn record_step(
        &mut self,
        tick: u64,
        state: &Snapshot,
        taken: &[EntityId],
        ended: Option<LevelOutcome>,
    ) {
        if !self.recorder.is_recording() {
            return;
        }
        let stride = self.settings.record_stride() as u64;
        let mut result = Ok(());
        // The terminal state is always kept, on the next sample slot
        if tick % stride == 0 || ended.is_some() {
            result = self.recorder.append_snapshot(tick.div_ceil(stride), *state);
        }
        for &entity in taken {
            result = result.and_then(|()| self.recorder.record_event(tick / stride, entity));
        }
        if let Some(outcome) = ended {
            result = result.and_then(|()| self.recorder.finalize(outcome.finished, outcome.time));
        }
        if let Err(e) = result {
            log::warn!("Recording dropped at tick {}: {}", tick, e);
            self.recorder.abort();
        }
    }

    /// Seal an unfinished recording (player quit mid-run)
    pub fn finish_recording(&mut self) -> Result<()> {
        if self.recorder.is_recording() {
            let time = crate::ticks_to_seconds(self.scene.tick() as i64);
            self.recorder.finalize(false, time)?;
        }
        Ok(())
    }

    /// Discard the current recording
    pub fn abort_recording(&mut self) {
        self.recorder.abort();
    }

    /// Hand off the finalized recording
    pub fn take_recording(&mut self) -> Result<ReplayRecorder> {
        self.recorder.take_finalized()
    }

    /// Persist the finalized recording under `name`
    pub fn save_recording(&mut self, storage: &dyn Storage, name: &str) -> Result<usize> {
        self.recorder.persist(storage, name)
    }

    /// Hand interpolated poses of the player and every ghost to `renderer`
    pub fn render(&self, renderer: &mut dyn Renderer, now: f64) {
        let alpha = self.clock.alpha(now);
        renderer.render(RenderTarget::Player, &self.scene.player().interpolated(alpha));
        for ghost in self.ghosts.ghosts() {
            let snapshot = ghost.snapshot(self.settings.ghost_interpolation);
            renderer.render(
                RenderTarget::Ghost {
                    handle: ghost.handle(),
                    info: ghost.info(),
                },
                &snapshot,
            );
        }
    }

    /// Sleep out the rest of the frame budget
    pub fn pace_frame(&mut self, now_ms: impl FnMut() -> i64, sleep: impl FnMut(std::time::Duration)) {
        self.pacer.wait(now_ms, sleep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::PHYS_STEP;
    use crate::persistence::MemoryStorage;
    use crate::sim::physics::TrackPhysics;
    use crate::seconds_to_ticks;
    use crate::sim::scene::Zone;
    use glam::Vec2;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg32;

    fn level() -> Level {
        Level::new("L1", Vec2::ZERO, Zone::new(Vec2::new(12.0, 0.0), 0.5))
            .with_collectible(1, Vec2::new(3.0, 0.0), 0.5)
            .with_collectible(2, Vec2::new(7.0, 0.0), 0.5)
    }

    fn scripted(tick: u64) -> Controls {
        Controls {
            throttle: if tick % 40 < 30 { 1.0 } else { 0.4 },
            brake: if tick % 97 == 0 { 0.5 } else { 0.0 },
            lean: ((tick as f32) * 0.05).sin() * 0.2,
            change_direction: false,
        }
    }

    /// Drive a session with jittered frame times until the run ends
    fn drive(session: &mut Session, seed: u64) -> Vec<(u64, bool, bool)> {
        let mut rng = Pcg32::seed_from_u64(seed);
        let mut now = 0.0f64;
        let mut flags = Vec::new();
        session.frame(now);
        for _ in 0..20_000 {
            now += rng.random_range(0.004..0.03);
            session.set_controls(scripted(session.scene().tick()));
            let report = session.frame(now);
            let s = session.scene().player().state();
            flags.push((report.tick, s.flags.dead, s.flags.finished));
            if report.ended.is_some() || session.scene().is_over() {
                break;
            }
        }
        flags
    }

    #[test]
    fn test_live_run_records_and_finishes() {
        let mut session =
            Session::live(Settings::default(), level(), "alice", Box::new(TrackPhysics::default()))
                .unwrap();
        drive(&mut session, 7);
        let outcome = session.scene().outcome().unwrap();
        assert!(outcome.finished);

        let storage = MemoryStorage::new();
        session.save_recording(&storage, "alice-L1").unwrap();
        let replay = Replay::open(&storage.read_bytes("alice-L1").unwrap()).unwrap();
        assert_eq!(replay.tick_count() as i64, seconds_to_ticks(outcome.time) + 1);
        assert!(replay.is_finished());
        assert_eq!(replay.finish_time(), outcome.time);
        assert_eq!(replay.events().len(), 2);
    }

    #[test]
    fn test_watching_reproduces_flags_and_time() {
        let mut live =
            Session::live(Settings::default(), level(), "alice", Box::new(TrackPhysics::default()))
                .unwrap();
        drive(&mut live, 11);
        let live_outcome = live.scene().outcome().unwrap();
        let replay = Arc::new(live.take_recording().unwrap().into_replay().unwrap());

        let mut watch = Session::watch(
            Settings::default(),
            level(),
            replay.clone(),
            Box::new(TrackPhysics::default()),
        )
        .unwrap();
        let mut now = 0.0;
        watch.frame(now);
        while !watch.scene().is_over() && watch.scene().tick() < 10_000 {
            now += PHYS_STEP * 3.0;
            watch.frame(now);
        }
        assert_eq!(watch.scene().outcome(), Some(live_outcome));

        // Flags tick by tick
        for t in 0..replay.tick_count() {
            let s = replay.snapshot_at(t).unwrap();
            assert_eq!(s.flags.finished, t == replay.tick_count() - 1);
            assert!(!s.flags.dead);
        }
    }

    #[test]
    fn test_watching_half_rate_recording_keeps_finish_time() {
        let settings = Settings {
            replay_tick_rate: 50,
            ..Default::default()
        };
        for seed in [11, 12, 13] {
            let mut live =
                Session::live(settings.clone(), level(), "alice", Box::new(TrackPhysics::default()))
                    .unwrap();
            drive(&mut live, seed);
            let live_outcome = live.scene().outcome().unwrap();
            let replay = Arc::new(live.take_recording().unwrap().into_replay().unwrap());
            assert_eq!(replay.tick_rate(), 50);

            for speed in [1.0, 2.0] {
                let mut watch = Session::watch(
                    settings.clone(),
                    level(),
                    replay.clone(),
                    Box::new(TrackPhysics::default()),
                )
                .unwrap();
                watch.playback_mut().unwrap().set_speed(speed);
                let mut now = 0.0;
                watch.frame(now);
                while !watch.scene().is_over() && watch.scene().tick() < 10_000 {
                    now += PHYS_STEP;
                    watch.frame(now);
                }
                assert_eq!(watch.scene().outcome(), Some(live_outcome));
            }
        }
    }

    #[test]
    fn test_ghost_runs_in_lock_step() {
        let mut first =
            Session::live(Settings::default(), level(), "alice", Box::new(TrackPhysics::default()))
                .unwrap();
        drive(&mut first, 3);
        let bytes = first.take_recording().unwrap().to_bytes().unwrap();

        let settings = Settings {
            record_replays: false,
            ..Default::default()
        };
        let mut second =
            Session::live(settings, level(), "bob", Box::new(TrackPhysics::default())).unwrap();
        let ghost = second.add_ghost(&bytes).unwrap();
        let mut now = 0.0;
        second.frame(now);
        let mut saw_delta = false;
        for _ in 0..200 {
            now += 0.017;
            second.set_controls(Controls {
                throttle: 0.8,
                ..Default::default()
            });
            let report = second.frame(now);
            let g = second.ghosts().ghost(ghost).unwrap();
            assert_eq!(
                g.playback().current_tick().min(g.playback().replay().terminal_tick() as f64),
                (report.tick as f64).min(g.playback().replay().terminal_tick() as f64)
            );
            saw_delta |= !report.deltas.is_empty();
        }
        assert!(saw_delta);
        assert!(second.recorder().recorder().is_none());
    }

    #[test]
    fn test_watch_rejects_other_level() {
        let mut live =
            Session::live(Settings::default(), level(), "alice", Box::new(TrackPhysics::default()))
                .unwrap();
        drive(&mut live, 5);
        let replay = Arc::new(live.take_recording().unwrap().into_replay().unwrap());
        let other = Level::new("L2", Vec2::ZERO, Zone::new(Vec2::ONE, 1.0));
        let err = Session::watch(Settings::default(), other, replay, Box::new(TrackPhysics::default()))
            .unwrap_err();
        assert!(matches!(err, ReplayError::LevelMismatch { .. }));
    }

    #[test]
    fn test_quit_mid_run_finalizes_unfinished() {
        let mut session =
            Session::live(Settings::default(), level(), "alice", Box::new(TrackPhysics::default()))
                .unwrap();
        session.frame(0.0);
        session.frame(0.05);
        session.finish_recording().unwrap();
        let replay = session.take_recording().unwrap().into_replay().unwrap();
        assert!(!replay.is_finished());
        assert_eq!(replay.tick_count(), 6);
    }

    #[test]
    fn test_lower_sample_rate_records_every_other_tick() {
        let settings = Settings {
            replay_tick_rate: 50,
            compress_replays: false,
            ..Default::default()
        };
        let mut session =
            Session::live(settings, level(), "alice", Box::new(TrackPhysics::default())).unwrap();
        session.frame(0.0);
        session.frame(0.1);
        session.finish_recording().unwrap();
        let replay = session.take_recording().unwrap().into_replay().unwrap();
        assert_eq!(replay.tick_rate(), 50);
        assert_eq!(replay.tick_count(), 6);
        assert_eq!(replay.snapshot_at(5).unwrap(), session.scene().player().state());
    }

    #[test]
    fn test_render_pulls_every_rider() {
        struct Count(usize, usize);
        impl Renderer for Count {
            fn render(&mut self, target: RenderTarget<'_>, _snapshot: &Snapshot) {
                match target {
                    RenderTarget::Player => self.0 += 1,
                    RenderTarget::Ghost { .. } => self.1 += 1,
                }
            }
        }

        let mut first =
            Session::live(Settings::default(), level(), "alice", Box::new(TrackPhysics::default()))
                .unwrap();
        drive(&mut first, 9);
        let bytes = first.take_recording().unwrap().to_bytes().unwrap();

        let mut session =
            Session::live(Settings::default(), level(), "bob", Box::new(TrackPhysics::default()))
                .unwrap();
        session.add_ghost(&bytes).unwrap();
        session.add_ghost(&bytes).unwrap();
        session.frame(0.0);
        session.frame(0.035);
        let mut counter = Count(0, 0);
        session.render(&mut counter, 0.036);
        assert_eq!((counter.0, counter.1), (1, 2));
    }
}
