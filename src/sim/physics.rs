//! Physics collaborator
//!
//! The scene calls `Physics::advance_entity` once per tick for the live
//! rider. `TrackPhysics` is a small deterministic integrator over flat
//! ground; real collision and rigid-body work belongs to the host.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::normalize_angle;
use crate::replay::Snapshot;

/// Resolved control signals for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Controls {
    /// 0.0 - 1.0
    pub throttle: f32,
    /// 0.0 - 1.0
    pub brake: f32,
    /// -1.0 (back) to 1.0 (forward)
    pub lean: f32,
    /// Turn the bike around this tick
    pub change_direction: bool,
}

pub trait Physics {
    /// State after one fixed step of `dt` seconds
    fn advance_entity(&mut self, state: &Snapshot, controls: &Controls, dt: f32) -> Snapshot;
}

/// Reference integrator: engine, brake, drag, gravity, flat ground
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackPhysics {
    pub ground_y: f32,
    pub gravity: f32,
    pub engine_accel: f32,
    pub brake_decel: f32,
    /// Fraction of velocity lost per second
    pub drag: f32,
    /// Radians per second at full lean
    pub lean_rate: f32,
    pub wheel_radius: f32,
}

impl Default for TrackPhysics {
    fn default() -> Self {
        Self {
            ground_y: 0.0,
            gravity: 9.81,
            engine_accel: 12.0,
            brake_decel: 20.0,
            drag: 0.2,
            lean_rate: 3.0,
            wheel_radius: 0.35,
        }
    }
}

const MAX_RPM: f32 = 9000.0;

impl Physics for TrackPhysics {
    fn advance_entity(&mut self, state: &Snapshot, controls: &Controls, dt: f32) -> Snapshot {
        let mut next = *state;
        if state.is_terminal() {
            next.velocity = Vec2::ZERO;
            next.engine_rpm = 0.0;
            return next;
        }

        if controls.change_direction {
            next.flags.direction = next.flags.direction.flipped();
        }
        let sign = next.flags.direction.sign();
        let on_ground = state.position.y <= self.ground_y + 1e-4;

        let mut vel = state.velocity;
        if on_ground {
            vel.x += sign * controls.throttle.clamp(0.0, 1.0) * self.engine_accel * dt;
            let braking = controls.brake.clamp(0.0, 1.0) * self.brake_decel * dt;
            vel.x -= vel.x.signum() * braking.min(vel.x.abs());
        }
        vel.x -= vel.x * self.drag * dt;
        vel.y -= self.gravity * dt;

        let mut pos = state.position + vel * dt;
        if pos.y < self.ground_y {
            pos.y = self.ground_y;
            vel.y = 0.0;
        }

        let mut angle = state.angle + controls.lean.clamp(-1.0, 1.0) * self.lean_rate * dt;
        if on_ground && controls.lean == 0.0 {
            // Settle back onto both wheels
            angle -= angle * (5.0 * dt).min(1.0);
        }

        let roll = -(pos.x - state.position.x) / self.wheel_radius;
        next.position = pos;
        next.velocity = vel;
        next.angle = normalize_angle(angle);
        next.rear_wheel_angle = normalize_angle(state.rear_wheel_angle + roll);
        next.front_wheel_angle = normalize_angle(state.front_wheel_angle + roll);
        next.engine_rpm = (controls.throttle * 0.6 + vel.x.abs() * 0.02).min(1.0) * MAX_RPM;
        next.place_parts();
        next
    }
}
