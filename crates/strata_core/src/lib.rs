//! # STRATA Core Runtime
//!
//! Tick-synchronized entity-component store designed for:
//! - Deferred visibility: nothing written during a tick is seen before the next
//! - Exclusive write authority per `(entity, component)` pair
//! - Read-only spatial queries over a per-tick snapshot
//!
//! ## Architecture Rules
//!
//! 1. **Committed state is immutable during a tick** - Readers share one snapshot
//! 2. **All mutation is staged** - Writes and structural changes apply at the boundary
//! 3. **Handles are tick-scoped** - Iterators and queries go stale when the tick ends
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_core::{ComponentInstance, Position, Simulation, SimulationConfig, TickScheduler};
//!
//! let sim = Simulation::new(SimulationConfig::default().with_max_ticks(10))?;
//! sim.create_entity(vec![ComponentInstance::of(&Position::new(0.0, 0.0, 0.0), "movement")])?;
//!
//! let mut scheduler = TickScheduler::new(sim);
//! scheduler.run("movement", |entities, _ctx: &mut (), _ticks_fired| {
//!     while !entities.is_finished()? {
//!         let mut pos: Position = entities.get()?;
//!         pos.coords.x += 1.0;
//!         entities.update(&pos)?;
//!         entities.next_entity()?;
//!     }
//!     Ok(())
//! }, &mut ())?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;
pub mod log;
pub mod scheduler;
pub mod simulation;
pub mod snapshot;
pub mod spatial;
pub mod sync;

pub use config::{ComponentSchemaConfig, SimulationConfig};
pub use ecs::{
    Component, ComponentId, ComponentInstance, Coordinates, EdgeLength, EntityId, Layer, Persistence,
    Position, SchemaRegistry, SystemMarker,
};
pub use error::{SimError, SimResult, StatusCode};
pub use log::{send_log_message, LogLevel};
pub use scheduler::{
    EntityCommands, EntityIterator, RunSummary, SchedulerState, StopHandle, TickReport, TickScheduler,
    TickStats, TickSystem,
};
pub use simulation::{CommitReport, Simulation};
pub use snapshot::Snapshot;
pub use spatial::{Constraint, Query};
