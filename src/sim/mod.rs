//! Fixed-step simulation of one level
//!
//! Everything in a step is pure and deterministic:
//! - Fixed timestep only (`consts::PHYS_STEP`)
//! - Identical control input sequences give identical snapshots
//! - No rendering or platform dependencies; those are collaborator traits

pub mod entity;
pub mod physics;
pub mod scene;
pub mod session;

pub use entity::{Drive, Entity};
pub use physics::{Controls, Physics, TrackPhysics};
pub use scene::{Collectible, Level, LevelOutcome, Scene, SceneHooks, StepReport, Zone};
pub use session::{FrameReport, RenderTarget, Renderer, Session};
