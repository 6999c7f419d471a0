//! Player settings that shape recording and ghosts
//!
//! Persisted as JSON through the `Storage` collaborator.

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_MAX_FPS, TICKS_PER_SECOND};
use crate::persistence::Storage;

/// Session settings/preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Frame rate cap for the frame pacer
    pub max_fps: u32,

    // === Recording ===
    /// Record live runs
    pub record_replays: bool,
    /// zlib-compress the replay body
    pub compress_replays: bool,
    /// Stored samples per second (divides the physics rate)
    pub replay_tick_rate: u32,

    // === Ghosts ===
    /// Report the time difference to ghosts
    pub show_ghost_time_diff: bool,
    /// Blend ghost poses between recorded ticks when rendering
    pub ghost_interpolation: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_fps: DEFAULT_MAX_FPS,

            record_replays: true,
            compress_replays: true,
            replay_tick_rate: TICKS_PER_SECOND,

            show_ghost_time_diff: true,
            ghost_interpolation: true,
        }
    }
}

impl Settings {
    /// Storage key
    const STORAGE_KEY: &'static str = "xmoto_replay_settings.json";

    /// Physics ticks between two recorded samples
    ///
    /// Smallest stride that divides the physics rate without exceeding the
    /// configured sample rate.
    pub fn record_stride(&self) -> u32 {
        let rate = self.replay_tick_rate.clamp(1, TICKS_PER_SECOND);
        (1..=TICKS_PER_SECOND)
            .find(|s| TICKS_PER_SECOND % s == 0 && TICKS_PER_SECOND / s <= rate)
            .unwrap_or(TICKS_PER_SECOND)
    }

    /// Rate actually recorded, an exact divisor of the physics rate
    pub fn effective_tick_rate(&self) -> u32 {
        TICKS_PER_SECOND / self.record_stride()
    }

    /// Load settings, falling back to defaults when missing or malformed
    pub fn load(storage: &dyn Storage) -> Self {
        match storage.read_bytes(Self::STORAGE_KEY) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(settings) => {
                    log::info!("Loaded settings");
                    settings
                }
                Err(e) => {
                    log::warn!("Malformed settings ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("Using default settings");
                Self::default()
            }
        }
    }

    pub fn save(&self, storage: &dyn Storage) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
        storage.write_bytes(Self::STORAGE_KEY, &json)?;
        log::info!("Settings saved");
        Ok(())
    }
}
