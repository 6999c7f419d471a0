//! Simulation timing
//!
//! - `SimulationClock`: wall-clock time -> whole fixed-size ticks per frame
//! - `FramePacer`: post-render sleep budget with lateness carry-over

pub mod frame_pacer;
pub mod sim_clock;

pub use frame_pacer::FramePacer;
pub use sim_clock::{SimulationClock, TickBatch};
