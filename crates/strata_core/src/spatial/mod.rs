//! # Spatial Query Engine
//!
//! Read-only queries over the snapshot taken at the start of a tick.
//!
//! ## Design
//!
//! - Positions are indexed once per tick in a uniform XZ grid
//! - Geometric constraints visit only overlapping cells
//! - Results are produced lazily by a forward-only [`Query`]

mod constraint;
mod grid;
mod query;

pub use constraint::{Bounds, Constraint};
pub use grid::{CellCoord, SpatialIndex};
pub use query::Query;
