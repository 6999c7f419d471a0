//! XMoto replay demo entry point
//!
//! Headless walk through the replay core: record a run, save it, race it as
//! a ghost, then watch it back at double speed with a rewind.
//!
//! Usage: `xmoto-replay [replay-dir]` (in-memory storage when omitted)

#[cfg(not(target_arch = "wasm32"))]
mod demo {
    use std::sync::Arc;
    use std::time::Duration;

    use glam::Vec2;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg32;

    use xmoto_replay::Settings;
    use xmoto_replay::error::Result;
    use xmoto_replay::ghost::GhostHandle;
    use xmoto_replay::persistence::{DirStorage, MemoryStorage, Storage, spawn_load};
    use xmoto_replay::replay::{EntityId, Replay, ReplayInfo};
    use xmoto_replay::sim::{Controls, Level, Scene, SceneHooks, Session, TrackPhysics, Zone};

    const PLAYER: &str = "alice";
    const RIVAL: &str = "bob";

    fn demo_level() -> Level {
        Level::new("L1", Vec2::ZERO, Zone::new(Vec2::new(40.0, 0.0), 0.6))
            .with_collectible(1, Vec2::new(8.0, 0.0), 0.5)
            .with_collectible(2, Vec2::new(18.0, 0.0), 0.5)
            .with_collectible(3, Vec2::new(31.0, 0.0), 0.5)
    }

    /// Logs scene events the way a HUD would show them
    struct HudHooks;

    impl SceneHooks for HudHooks {
        fn on_entity_taken(&mut self, scene: &Scene, entity: EntityId) {
            log::info!(
                "[{:>6.2}s] strawberry {} ({}/{})",
                xmoto_replay::ticks_to_seconds(scene.tick() as i64),
                entity,
                scene.taken().len(),
                scene.level().collectibles.len()
            );
        }

        fn on_ghost_progress_delta(&mut self, _scene: &Scene, ghost: GhostHandle, delta: f32) {
            log::info!("{}: {:+.2}s", ghost, delta);
        }

        fn on_level_finished(&mut self, _scene: &Scene, finished: bool, finish_time: f32) {
            if finished {
                log::info!("Finished in {:.2}s", finish_time);
            } else {
                log::info!("Crashed after {:.2}s", finish_time);
            }
        }
    }

    /// Virtual wall clock with jittered frame work and paced sleeps
    struct FrameClock {
        now_ms: i64,
        rng: Pcg32,
    }

    impl FrameClock {
        fn new(seed: u64) -> Self {
            Self {
                now_ms: 0,
                rng: Pcg32::seed_from_u64(seed),
            }
        }

        fn seconds(&self) -> f64 {
            self.now_ms as f64 / 1000.0
        }

        /// Simulated render work, then the pacer's sleep
        fn end_frame(&mut self, session: &mut Session) {
            self.now_ms += self.rng.random_range(2..30);
            let now = std::cell::Cell::new(self.now_ms);
            session.pace_frame(
                || now.get(),
                |d: Duration| now.set(now.get() + d.as_millis() as i64),
            );
            self.now_ms = now.get();
        }
    }

    /// Run frames until the scene ends or `max_frames` pass
    fn run_frames(
        session: &mut Session,
        clock: &mut FrameClock,
        max_frames: usize,
        mut controls: impl FnMut(u64) -> Controls,
    ) {
        session.frame(clock.seconds());
        for _ in 0..max_frames {
            session.set_controls(controls(session.scene().tick()));
            let report = session.frame(clock.seconds());
            if report.resynced {
                log::debug!("Frame clock resynced at tick {}", report.tick);
            }
            if session.scene().is_over() {
                break;
            }
            clock.end_frame(session);
        }
    }

    fn rider(tick: u64) -> Controls {
        Controls {
            throttle: if tick % 150 < 120 { 1.0 } else { 0.3 },
            lean: ((tick as f32) * 0.02).sin() * 0.3,
            ..Default::default()
        }
    }

    fn rival(tick: u64) -> Controls {
        Controls {
            throttle: 0.9,
            brake: if tick % 200 < 10 { 0.4 } else { 0.0 },
            ..Default::default()
        }
    }

    pub fn run() -> Result<()> {
        let storage: Arc<dyn Storage> = match std::env::args().nth(1) {
            Some(dir) => Arc::new(DirStorage::open(dir)?),
            None => Arc::new(MemoryStorage::new()),
        };
        let settings = Settings::load(storage.as_ref());
        let replay_name = format!("{}-{}.rpl", PLAYER, demo_level().id);

        // 1. Live run, recorded
        log::info!("== {} rides {}", PLAYER, demo_level().id);
        let mut session = Session::live(
            settings.clone(),
            demo_level(),
            PLAYER,
            Box::new(TrackPhysics::default()),
        )?;
        session.set_hooks(Box::new(HudHooks));
        let mut clock = FrameClock::new(1);
        run_frames(&mut session, &mut clock, 10_000, rider);
        session.finish_recording()?;
        let written = session.save_recording(storage.as_ref(), &replay_name)?;
        log::info!(
            "Saved '{}' ({} bytes, {} resyncs)",
            replay_name,
            written,
            session.clock().resyncs()
        );

        let bytes = storage.read_bytes(&replay_name)?;
        let info = ReplayInfo::probe(&bytes)?;
        log::info!(
            "Replay info: {} on {} at {} Hz, {}",
            info.header.player_id,
            info.header.level_id,
            info.header.tick_rate,
            info.finish_time
                .map_or_else(|| "unfinished".to_string(), |t| format!("{:.2}s", t))
        );

        // 2. Race the recording as a ghost
        log::info!("== {} races {}'s ghost", RIVAL, PLAYER);
        let race_settings = Settings {
            record_replays: false,
            ..settings.clone()
        };
        let mut race = Session::live(
            race_settings,
            demo_level(),
            RIVAL,
            Box::new(TrackPhysics::default()),
        )?;
        race.set_hooks(Box::new(HudHooks));
        race.add_pending_ghost(spawn_load(storage.clone(), &replay_name));
        let mut clock = FrameClock::new(2);
        run_frames(&mut race, &mut clock, 10_000, rival);
        if let Some(best) = race.ghosts().best_reference_delta() {
            log::info!("Final difference to the best ghost: {:+.2}s", best);
        }

        // 3. Watch it back at double speed, rewinding once
        log::info!("== Watching {} at 2x", replay_name);
        let replay = Arc::new(Replay::open(&bytes)?);
        let mut watch = Session::watch(
            settings,
            demo_level(),
            replay.clone(),
            Box::new(TrackPhysics::default()),
        )?;
        if let Some(playback) = watch.playback_mut() {
            playback.set_speed(2.0);
        }
        let mut clock = FrameClock::new(3);
        let mut rewound = false;
        watch.frame(clock.seconds());
        loop {
            let report = watch.frame(clock.seconds());
            let Some(playback) = watch.playback_mut() else {
                break;
            };
            if !rewound && playback.elapsed_seconds() > replay.finish_time() / 2.0 {
                playback.fast_rewind_at_least(1.0, 50);
                log::info!("Rewound to {:.2}s", playback.elapsed_seconds());
                rewound = true;
            }
            if playback.is_stopped() || report.tick > 100_000 {
                log::info!("Playback stopped at {:.2}s", playback.elapsed_seconds());
                break;
            }
            clock.end_frame(&mut watch);
        }
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("XMoto replay demo starting...");

    if let Err(e) = demo::run() {
        log::error!("Demo failed: {}", e);
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // No browser surface; the library is the product on wasm
}
