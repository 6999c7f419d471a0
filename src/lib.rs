//! XMoto replay core - fixed-step clock, replays and ghosts
//!
//! Core modules:
//! - `clock`: Fixed-step simulation clock and frame pacing
//! - `replay`: Snapshot codec, replay recording/reading, playback control
//! - `ghost`: Ghost racing in lock-step with the live player
//! - `sim`: Live scene, entities and the per-frame session loop
//! - `persistence`: Storage collaborator (memory/directory) and async loads
//! - `settings`: Player preferences that shape recording and ghosts

pub mod clock;
pub mod error;
pub mod ghost;
pub mod persistence;
pub mod replay;
pub mod settings;
pub mod sim;

pub use error::{CodecError, ReplayError, Result};
pub use settings::Settings;

/// Simulation configuration constants
pub mod consts {
    /// Fixed simulation timestep in seconds (100 Hz physics)
    pub const PHYS_STEP: f64 = 0.01;
    /// Physics ticks per second (inverse of `PHYS_STEP`)
    pub const TICKS_PER_SECOND: u32 = 100;
    /// Maximum ticks executed in one frame before the clock resyncs
    pub const MAX_STEPS_PER_FRAME: u32 = 10;
    /// Frame lateness beyond this (ms) is dropped instead of carried over
    pub const MAX_FRAME_LATE_MS: i64 = 100;
    /// Default frame rate cap for the frame pacer
    pub const DEFAULT_MAX_FPS: u32 = 50;
}

/// Convert a tick count to seconds of simulated time
#[inline]
pub fn ticks_to_seconds(ticks: i64) -> f32 {
    (ticks as f64 * consts::PHYS_STEP) as f32
}

/// Convert seconds of simulated time to whole ticks (rounded to nearest)
#[inline]
pub fn seconds_to_ticks(seconds: f32) -> i64 {
    (seconds as f64 / consts::PHYS_STEP).round() as i64
}

/// Normalized angle to [-π, π)
///
/// Constant time for any input; non-finite angles come back as NaN.
#[inline]
pub fn normalize_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    // rem_euclid can round up to TAU for tiny negative inputs
    if wrapped >= PI { wrapped - TAU } else { wrapped }
}

/// Interpolate between two angles along the shortest arc
#[inline]
pub fn lerp_angle(a: f32, b: f32, t: f32) -> f32 {
    let delta = normalize_angle(b - a);
    normalize_angle(a + delta * t)
}
