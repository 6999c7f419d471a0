//! Playback controller
//!
//! A cursor over a shared read-only `Replay`. The cursor position is a
//! fractional replay tick; `current_snapshot` blends the two bracketing
//! records. Speed may be negative (rewind) or fractional (slow motion).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::snapshot::Snapshot;
use super::store::Replay;
use crate::consts::TICKS_PER_SECOND;

/// Which bound of the stream stopped the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBound {
    Start,
    /// First dead/finished tick, or the last recorded tick
    End,
}

/// Mutable read position over a replay
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackCursor {
    /// Replay tick, fractional between records
    pub tick: f64,
    pub speed: f64,
    /// Speed to restore on `resume`, set while paused
    pub paused_speed: Option<f64>,
    pub stopped: Option<StopBound>,
}

impl Default for PlaybackCursor {
    fn default() -> Self {
        Self {
            tick: 0.0,
            speed: 1.0,
            paused_speed: None,
            stopped: None,
        }
    }
}

/// Saved cursor location for `restore`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackPosition {
    pub tick: f64,
}

#[derive(Debug, Clone)]
pub struct PlaybackController {
    replay: Arc<Replay>,
    cursor: PlaybackCursor,
    /// Replay ticks per simulation tick
    rate_scale: f64,
    /// Last tick the cursor may reach
    bound: f64,
}

impl PlaybackController {
    pub fn new(replay: Arc<Replay>) -> Self {
        let rate_scale = replay.tick_rate() as f64 / TICKS_PER_SECOND as f64;
        let bound = replay.terminal_tick() as f64;
        Self {
            replay,
            cursor: PlaybackCursor::default(),
            rate_scale,
            bound,
        }
    }

    pub fn replay(&self) -> &Arc<Replay> {
        &self.replay
    }

    pub fn cursor(&self) -> &PlaybackCursor {
        &self.cursor
    }

    pub fn current_tick(&self) -> f64 {
        self.cursor.tick
    }

    pub fn speed(&self) -> f64 {
        self.cursor.speed
    }

    pub fn is_paused(&self) -> bool {
        self.cursor.paused_speed.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.cursor.stopped.is_some()
    }

    pub fn stopped_at(&self) -> Option<StopBound> {
        self.cursor.stopped
    }

    /// Replay time under the cursor, in seconds
    pub fn elapsed_seconds(&self) -> f32 {
        (self.cursor.tick / self.replay.tick_rate() as f64) as f32
    }

    /// Move by `steps` simulation ticks at the current speed
    ///
    /// The cursor clamps at either bound and stops there. A stopped cursor
    /// only moves again once the speed points away from the bound it hit.
    pub fn advance(&mut self, steps: u32) {
        let speed = self.cursor.speed;
        if steps == 0 || speed == 0.0 {
            return;
        }
        match self.cursor.stopped {
            Some(StopBound::End) if speed > 0.0 => return,
            Some(StopBound::Start) if speed < 0.0 => return,
            _ => {}
        }
        let target = self.cursor.tick + steps as f64 * speed * self.rate_scale;
        self.cursor.tick = target.clamp(0.0, self.bound);
        self.refresh_stop();
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.cursor.speed = speed;
        self.cursor.paused_speed = None;
        self.refresh_stop();
    }

    /// Freeze the cursor; `resume` restores the previous speed
    pub fn pause(&mut self) {
        if self.cursor.paused_speed.is_none() {
            self.cursor.paused_speed = Some(self.cursor.speed);
            self.cursor.speed = 0.0;
        }
    }

    pub fn resume(&mut self) {
        if let Some(speed) = self.cursor.paused_speed.take() {
            self.cursor.speed = speed;
            self.refresh_stop();
        }
    }

    /// One-shot jump forward by `ticks` replay ticks; speed is unchanged
    pub fn fast_forward(&mut self, ticks: u64) {
        self.seek_to(self.cursor.tick + ticks as f64);
    }

    /// One-shot jump backward by `ticks` replay ticks; speed is unchanged
    pub fn fast_rewind(&mut self, ticks: u64) {
        self.seek_to(self.cursor.tick - ticks as f64);
    }

    /// Rewind by `seconds` of replay time, but never by fewer than `min_ticks`
    pub fn fast_rewind_at_least(&mut self, seconds: f32, min_ticks: u64) {
        let ticks = self.seconds_to_replay_ticks(seconds.abs()).max(min_ticks);
        self.fast_rewind(ticks);
    }

    /// Skip by a signed amount of replay time
    pub fn skip_seconds(&mut self, seconds: f32) {
        let ticks = self.seconds_to_replay_ticks(seconds.abs());
        if seconds >= 0.0 {
            self.fast_forward(ticks);
        } else {
            self.fast_rewind(ticks);
        }
    }

    /// Place the cursor at an absolute replay tick (clamped)
    pub fn seek_to(&mut self, tick: f64) {
        self.cursor.tick = tick.clamp(0.0, self.bound);
        self.refresh_stop();
    }

    /// Place the cursor where simulation tick `sim_tick` falls in this replay
    pub fn sync_to(&mut self, sim_tick: u64) {
        self.seek_to(sim_tick as f64 * self.rate_scale);
    }

    pub fn position(&self) -> PlaybackPosition {
        PlaybackPosition {
            tick: self.cursor.tick,
        }
    }

    pub fn restore(&mut self, position: PlaybackPosition) {
        self.seek_to(position.tick);
    }

    /// Snapshot under the cursor, blended between records
    ///
    /// On an exact tick the recorded snapshot is returned unmodified.
    pub fn current_snapshot(&self) -> Snapshot {
        let base = self.cursor.tick.floor();
        let frac = self.cursor.tick - base;
        let i = base as usize;
        if frac == 0.0 {
            return self.record(i);
        }
        Snapshot::interpolate(&self.record(i), &self.record(i + 1), frac as f32)
    }

    /// Recorded snapshot at or just before the cursor, without blending
    pub fn current_record(&self) -> Snapshot {
        self.record(self.cursor.tick.floor() as usize)
    }

    fn record(&self, index: usize) -> Snapshot {
        let snapshots = self.replay.snapshots();
        snapshots[index.min(snapshots.len() - 1)]
    }

    fn seconds_to_replay_ticks(&self, seconds: f32) -> u64 {
        (seconds as f64 * self.replay.tick_rate() as f64).round() as u64
    }

    fn refresh_stop(&mut self) {
        let was_stopped = self.cursor.stopped.is_some();
        self.cursor.stopped = if self.cursor.tick >= self.bound {
            Some(StopBound::End)
        } else if self.cursor.tick <= 0.0 && self.cursor.speed < 0.0 {
            Some(StopBound::Start)
        } else {
            None
        };
        if let (false, Some(bound)) = (was_stopped, self.cursor.stopped) {
            log::debug!(
                "Playback of '{}' stopped at {:?} (tick {})",
                self.replay.player_id(),
                bound,
                self.cursor.tick
            );
        }
    }
}
