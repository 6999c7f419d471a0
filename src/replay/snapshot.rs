//! Biker snapshot - the fixed-layout state of one rider at one tick
//!
//! Layout (little-endian, `RECORD_SIZE` bytes):
//! - position, angle, velocity (5 × f32)
//! - rear/front wheel position (4 × f32), rear/front wheel angle (2 × f32)
//! - engine rpm (f32)
//! - limb positions, `LIMB_COUNT` × (x, y) f32
//! - flags byte (dead, finished, facing left)

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::codec::{ByteReader, ByteWriter};
use crate::error::CodecError;
use crate::lerp_angle;

/// Number of limb/part anchors stored per snapshot
pub const LIMB_COUNT: usize = 7;

/// Encoded size of one snapshot record in bytes
pub const RECORD_SIZE: usize = (5 + 4 + 2 + 1 + LIMB_COUNT * 2) * 4 + 1;

const FLAG_DEAD: u8 = 1 << 0;
const FLAG_FINISHED: u8 = 1 << 1;
const FLAG_LEFT: u8 = 1 << 2;

/// Rider body parts, in storage order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Limb {
    Head,
    Shoulder,
    Elbow,
    Hand,
    LowerBody,
    Knee,
    Foot,
}

impl Limb {
    pub const ALL: [Limb; LIMB_COUNT] = [
        Limb::Head,
        Limb::Shoulder,
        Limb::Elbow,
        Limb::Hand,
        Limb::LowerBody,
        Limb::Knee,
        Limb::Foot,
    ];

    /// Rest-pose offset from the frame center when facing right
    pub fn rest_offset(self) -> Vec2 {
        match self {
            Limb::Head => Vec2::new(0.05, 1.1),
            Limb::Shoulder => Vec2::new(0.0, 0.85),
            Limb::Elbow => Vec2::new(0.2, 0.6),
            Limb::Hand => Vec2::new(0.45, 0.55),
            Limb::LowerBody => Vec2::new(-0.15, 0.35),
            Limb::Knee => Vec2::new(0.2, 0.3),
            Limb::Foot => Vec2::new(0.05, -0.05),
        }
    }
}

/// Which way the bike faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Right,
    Left,
}

impl Direction {
    pub fn flipped(self) -> Self {
        match self {
            Direction::Right => Direction::Left,
            Direction::Left => Direction::Right,
        }
    }

    /// +1 for right, -1 for left
    pub fn sign(self) -> f32 {
        match self {
            Direction::Right => 1.0,
            Direction::Left => -1.0,
        }
    }
}

/// Discrete per-tick status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SnapshotFlags {
    pub dead: bool,
    pub finished: bool,
    pub direction: Direction,
}

impl SnapshotFlags {
    pub fn to_byte(self) -> u8 {
        let mut b = 0;
        if self.dead {
            b |= FLAG_DEAD;
        }
        if self.finished {
            b |= FLAG_FINISHED;
        }
        if self.direction == Direction::Left {
            b |= FLAG_LEFT;
        }
        b
    }

    /// Unknown bits are ignored
    pub fn from_byte(b: u8) -> Self {
        Self {
            dead: b & FLAG_DEAD != 0,
            finished: b & FLAG_FINISHED != 0,
            direction: if b & FLAG_LEFT != 0 {
                Direction::Left
            } else {
                Direction::Right
            },
        }
    }
}

/// State of one biker at one tick
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Frame center (world units)
    pub position: Vec2,
    /// Frame rotation (radians)
    pub angle: f32,
    pub velocity: Vec2,
    pub rear_wheel: Vec2,
    pub front_wheel: Vec2,
    pub rear_wheel_angle: f32,
    pub front_wheel_angle: f32,
    pub engine_rpm: f32,
    /// Limb anchor positions, indexed by `Limb as usize`
    pub limbs: [Vec2; LIMB_COUNT],
    pub flags: SnapshotFlags,
}

impl Snapshot {
    /// A bike at rest at `position`, facing right, limbs in rest pose
    pub fn at(position: Vec2) -> Self {
        let mut s = Self {
            position,
            ..Default::default()
        };
        s.place_parts();
        s
    }

    /// Recompute wheel and limb anchors from position, angle and direction
    pub fn place_parts(&mut self) {
        let origin = self.position;
        let rot = Vec2::from_angle(self.angle);
        let sign = self.flags.direction.sign();
        let local = |offset: Vec2| origin + rot.rotate(Vec2::new(offset.x * sign, offset.y));
        self.rear_wheel = local(Vec2::new(-0.7, -0.35));
        self.front_wheel = local(Vec2::new(0.7, -0.35));
        for limb in Limb::ALL {
            self.limbs[limb as usize] = local(limb.rest_offset());
        }
    }

    pub fn limb(&self, limb: Limb) -> Vec2 {
        self.limbs[limb as usize]
    }

    /// Dead or finished: the run cannot progress past this state
    pub fn is_terminal(&self) -> bool {
        self.flags.dead || self.flags.finished
    }

    pub fn write(&self, w: &mut ByteWriter) {
        w.f32(self.position.x);
        w.f32(self.position.y);
        w.f32(self.angle);
        w.f32(self.velocity.x);
        w.f32(self.velocity.y);
        w.f32(self.rear_wheel.x);
        w.f32(self.rear_wheel.y);
        w.f32(self.front_wheel.x);
        w.f32(self.front_wheel.y);
        w.f32(self.rear_wheel_angle);
        w.f32(self.front_wheel_angle);
        w.f32(self.engine_rpm);
        for limb in &self.limbs {
            w.f32(limb.x);
            w.f32(limb.y);
        }
        w.u8(self.flags.to_byte());
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(RECORD_SIZE);
        self.write(&mut w);
        w.into_inner()
    }

    /// Decode one record from the front of `bytes` (extra bytes are ignored)
    ///
    /// NaN or infinite fields are rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < RECORD_SIZE {
            return Err(CodecError::TooShort {
                needed: RECORD_SIZE,
                got: bytes.len(),
            });
        }
        fn finite(r: &mut ByteReader<'_>, field: &'static str) -> Result<f32, CodecError> {
            let v = r.f32()?;
            if !v.is_finite() {
                return Err(CodecError::NonFinite { field });
            }
            Ok(v)
        }
        fn vec2(r: &mut ByteReader<'_>, field: &'static str) -> Result<Vec2, CodecError> {
            Ok(Vec2::new(finite(r, field)?, finite(r, field)?))
        }

        let mut r = ByteReader::new(bytes);
        let position = vec2(&mut r, "position")?;
        let angle = finite(&mut r, "angle")?;
        let velocity = vec2(&mut r, "velocity")?;
        let rear_wheel = vec2(&mut r, "rear_wheel")?;
        let front_wheel = vec2(&mut r, "front_wheel")?;
        let rear_wheel_angle = finite(&mut r, "rear_wheel_angle")?;
        let front_wheel_angle = finite(&mut r, "front_wheel_angle")?;
        let engine_rpm = finite(&mut r, "engine_rpm")?;
        let mut limbs = [Vec2::ZERO; LIMB_COUNT];
        for limb in &mut limbs {
            *limb = vec2(&mut r, "limbs")?;
        }
        let flags = SnapshotFlags::from_byte(r.u8()?);

        Ok(Self {
            position,
            angle,
            velocity,
            rear_wheel,
            front_wheel,
            rear_wheel_angle,
            front_wheel_angle,
            engine_rpm,
            limbs,
            flags,
        })
    }

    /// Blend `a` toward `b` by `t` in [0, 1]
    ///
    /// Continuous fields are interpolated (angles along the shortest arc);
    /// flags come from `b`, the later sample. When the bike flips direction
    /// between the two samples the pose cannot be blended (the limbs are
    /// mirrored), so `a`'s continuous fields are kept.
    pub fn interpolate(a: &Snapshot, b: &Snapshot, t: f32) -> Snapshot {
        let t = t.clamp(0.0, 1.0);
        if a.flags.direction != b.flags.direction {
            return Snapshot { flags: b.flags, ..*a };
        }

        let mut limbs = a.limbs;
        for (limb, target) in limbs.iter_mut().zip(b.limbs.iter()) {
            *limb = limb.lerp(*target, t);
        }

        Snapshot {
            position: a.position.lerp(b.position, t),
            angle: lerp_angle(a.angle, b.angle, t),
            velocity: a.velocity.lerp(b.velocity, t),
            rear_wheel: a.rear_wheel.lerp(b.rear_wheel, t),
            front_wheel: a.front_wheel.lerp(b.front_wheel, t),
            rear_wheel_angle: lerp_angle(a.rear_wheel_angle, b.rear_wheel_angle, t),
            front_wheel_angle: lerp_angle(a.front_wheel_angle, b.front_wheel_angle, t),
            engine_rpm: a.engine_rpm + (b.engine_rpm - a.engine_rpm) * t,
            limbs,
            flags: b.flags,
        }
    }
}
