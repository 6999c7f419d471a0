//! Rider entity
//!
//! One type for every rider in a scene. What moves it is a capability tag:
//! live controls through the physics collaborator, or a replay cursor.

use super::physics::{Controls, Physics};
use crate::replay::{PlaybackController, Snapshot};

/// Where a rider's motion comes from
#[derive(Debug, Clone)]
pub enum Drive {
    LiveControlled(Controls),
    ReplayDriven(PlaybackController),
}

#[derive(Debug, Clone)]
pub struct Entity {
    state: Snapshot,
    /// State one tick earlier, for render interpolation
    previous: Snapshot,
    drive: Drive,
}

impl Entity {
    pub fn live(start: Snapshot) -> Self {
        Self {
            state: start,
            previous: start,
            drive: Drive::LiveControlled(Controls::default()),
        }
    }

    pub fn replay_driven(playback: PlaybackController) -> Self {
        let start = playback.current_snapshot();
        Self {
            state: start,
            previous: start,
            drive: Drive::ReplayDriven(playback),
        }
    }

    pub fn drive(&self) -> &Drive {
        &self.drive
    }

    pub fn is_live(&self) -> bool {
        matches!(self.drive, Drive::LiveControlled(_))
    }

    /// Controls for the next tick; ignored for replay-driven riders
    pub fn set_controls(&mut self, controls: Controls) {
        if let Drive::LiveControlled(current) = &mut self.drive {
            *current = controls;
        }
    }

    pub fn playback(&self) -> Option<&PlaybackController> {
        match &self.drive {
            Drive::ReplayDriven(playback) => Some(playback),
            Drive::LiveControlled(_) => None,
        }
    }

    pub fn playback_mut(&mut self) -> Option<&mut PlaybackController> {
        match &mut self.drive {
            Drive::ReplayDriven(playback) => Some(playback),
            Drive::LiveControlled(_) => None,
        }
    }

    /// Advance one fixed tick
    pub fn update(&mut self, physics: &mut dyn Physics, dt: f32) {
        self.previous = self.state;
        match &mut self.drive {
            Drive::LiveControlled(controls) => {
                self.state = physics.advance_entity(&self.state, controls, dt);
                // Direction change is a one-shot press
                controls.change_direction = false;
            }
            Drive::ReplayDriven(playback) => {
                playback.advance(1);
                self.state = playback.current_snapshot();
            }
        }
    }

    pub fn state(&self) -> &Snapshot {
        &self.state
    }

    /// Scene-level flag changes (dead/finished) on the live rider
    pub fn state_mut(&mut self) -> &mut Snapshot {
        &mut self.state
    }

    /// Pose `alpha` of the way from the previous tick to the current one
    pub fn interpolated(&self, alpha: f32) -> Snapshot {
        if alpha >= 1.0 {
            return self.state;
        }
        Snapshot::interpolate(&self.previous, &self.state, alpha)
    }
}
