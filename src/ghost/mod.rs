//! Ghost racing
//!
//! Ghosts are recorded runs replayed in lock-step with the live player.
//! `GhostManager` owns them and their playback cursors; `progress` computes
//! the player's lead or lag against each one.

pub mod manager;
pub mod progress;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use manager::{Ghost, GhostManager};
pub use progress::{ProgressLog, progress_delta};

/// Opaque id of a ghost within one manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GhostHandle(pub u32);

impl fmt::Display for GhostHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ghost#{}", self.0)
    }
}

/// Ghost lifecycle; a removed ghost is simply no longer known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GhostState {
    /// Replay bytes still being read
    Loading,
    Active,
    /// Frozen at the final pose until removed
    Stopped,
}
