//! Fixed-step simulation clock
//!
//! Converts variable frame timing into a whole number of physics ticks.
//! The live scene and every ghost are advanced by the same count each frame,
//! so their tick indices never drift apart.

use crate::consts::{MAX_STEPS_PER_FRAME, PHYS_STEP};

/// Result of one `ticks_to_run` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickBatch {
    /// Ticks to execute this frame (never above the clock's cap)
    pub steps: u32,
    /// Simulated time jumped forward to wall-clock time (deficit dropped)
    pub resynced: bool,
}

/// Fixed-step scheduler with a per-frame cap and resync on overload
#[derive(Debug, Clone)]
pub struct SimulationClock {
    step: f64,
    max_steps: u32,
    /// Wall-clock time of the last executed tick (None until first call)
    last_phys_time: Option<f64>,
    /// Ticks emitted since construction/reset
    elapsed_ticks: u64,
    resyncs: u64,
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new(PHYS_STEP, MAX_STEPS_PER_FRAME)
    }
}

impl SimulationClock {
    pub fn new(step: f64, max_steps: u32) -> Self {
        Self {
            step,
            max_steps: max_steps.max(1),
            last_phys_time: None,
            elapsed_ticks: 0,
            resyncs: 0,
        }
    }

    /// Step duration in seconds
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Number of ticks this frame should run for wall-clock time `now` (seconds)
    pub fn ticks_to_run(&mut self, now: f64) -> TickBatch {
        let Some(mut last) = self.last_phys_time else {
            // First call seeds the reference point
            self.last_phys_time = Some(now);
            return TickBatch::default();
        };

        let mut steps = 0;
        while last + self.step <= now && steps < self.max_steps {
            last += self.step;
            steps += 1;
        }

        // Could not clear the deficit within the cap: give up and jump to now
        let resynced = last + self.step < now;
        if resynced {
            last = now;
            self.resyncs += 1;
            log::debug!("Simulation clock resynced after {} steps (now={:.3})", steps, now);
        }

        self.last_phys_time = Some(last);
        self.elapsed_ticks += steps as u64;
        TickBatch { steps, resynced }
    }

    /// Fraction of the next tick already elapsed at `now`, in [0, 1]
    ///
    /// Used by rendering to interpolate between the previous and current tick.
    pub fn alpha(&self, now: f64) -> f32 {
        match self.last_phys_time {
            Some(last) => ((now - last) / self.step).clamp(0.0, 1.0) as f32,
            None => 0.0,
        }
    }

    /// Total ticks emitted
    pub fn elapsed_ticks(&self) -> u64 {
        self.elapsed_ticks
    }

    /// Number of resyncs so far
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Forget the reference time (next call seeds again and runs zero ticks)
    pub fn reset(&mut self) {
        self.last_phys_time = None;
        self.elapsed_ticks = 0;
    }
}
