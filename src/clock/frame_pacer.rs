//! Frame pacing
//!
//! Computes how long to sleep after a rendered frame so the loop does not
//! exceed the configured frame rate. Oversleeping in one frame shortens the
//! next frame's sleep; lateness beyond `MAX_FRAME_LATE_MS` is dropped.

use std::time::Duration;

use crate::consts::{DEFAULT_MAX_FPS, MAX_FRAME_LATE_MS};

#[derive(Debug, Clone)]
pub struct FramePacer {
    max_fps: u32,
    /// Timestamp (ms) at the end of the previous frame's wait
    last_frame_ms: Option<i64>,
    /// Carried-over lateness (ms); positive means behind schedule
    late_ms: i64,
}

impl Default for FramePacer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FPS)
    }
}

impl FramePacer {
    pub fn new(max_fps: u32) -> Self {
        Self {
            max_fps: max_fps.max(1),
            last_frame_ms: None,
            late_ms: 0,
        }
    }

    pub fn set_max_fps(&mut self, max_fps: u32) {
        self.max_fps = max_fps.max(1);
    }

    /// Minimum frame duration in ms for the current cap
    pub fn frame_budget_ms(&self) -> i64 {
        1000 / self.max_fps as i64
    }

    /// Current carried-over lateness in ms
    pub fn late_ms(&self) -> i64 {
        self.late_ms
    }

    /// Sleep to request after a frame that ends at `now_ms`
    ///
    /// When no sleep is due, the deficit becomes the carried lateness.
    pub fn sleep_budget(&mut self, now_ms: i64) -> Duration {
        let last = *self.last_frame_ms.get_or_insert(now_ms);
        let frame_duration = now_ms - last;
        let mut delta = self.frame_budget_ms() - (frame_duration + self.late_ms);

        // Too far behind: forget it rather than accumulate
        if delta < -MAX_FRAME_LATE_MS {
            delta = 0;
        }

        if delta > 0 {
            Duration::from_millis(delta as u64)
        } else {
            self.late_ms = -delta;
            Duration::ZERO
        }
    }

    /// Record the outcome of a sleep and start the next frame at `now_ms`
    ///
    /// Oversleep becomes lateness for the next frame. Sleeping time is not
    /// counted in the next frame's duration.
    pub fn end_frame(&mut self, requested: Duration, slept: Duration, now_ms: i64) {
        if !requested.is_zero() {
            self.late_ms = if slept >= requested {
                (slept - requested).as_millis() as i64
            } else {
                0
            };
        }
        self.last_frame_ms = Some(now_ms);
    }

    /// Pace one frame using the given time source and sleep function
    pub fn wait(&mut self, mut now_ms: impl FnMut() -> i64, mut sleep: impl FnMut(Duration)) {
        let budget = self.sleep_budget(now_ms());
        let mut slept = Duration::ZERO;
        if !budget.is_zero() {
            let before = now_ms();
            sleep(budget);
            slept = Duration::from_millis((now_ms() - before).max(0) as u64);
        }
        self.end_frame(budget, slept, now_ms());
    }
}
