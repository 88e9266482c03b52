//! # Tick Synchronization
//!
//! Readers of a tick see one committed snapshot while writers stage into a
//! double buffer. Nothing staged becomes visible until the boundary swap.
//!
//! - [`MutationBuffer`]: double-buffered component writes
//! - [`TickEpoch`]: generation counter invalidating tick-scoped handles

mod epoch;
mod mutation_buffer;

pub use epoch::{HandleGuard, TickEpoch};
pub use mutation_buffer::{MutationBuffer, StagedWrite, StagingArea};
