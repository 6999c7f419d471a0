//! Replay recording, storage and playback
//!
//! - `snapshot`: the per-tick vehicle state record
//! - `codec`: byte primitives and body compression
//! - `store`: append-only recorder and read-only `Replay`
//! - `playback`: cursor over a `Replay` with speed, seek and pause

pub mod codec;
pub mod playback;
pub mod snapshot;
pub mod store;

pub use playback::{PlaybackController, PlaybackPosition};
pub use snapshot::{Direction, Limb, Snapshot, SnapshotFlags};
pub use store::{
    EntityId, FinishRecord, ProgressEvent, Replay, ReplayHeader, ReplayInfo, ReplayRecorder,
    ReplayStore,
};
