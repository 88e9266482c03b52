//! # Entity Component Store
//!
//! Entities are opaque ids carrying fixed-size binary components. Every
//! component has exactly one writer layer.
//!
//! ## Design
//!
//! - Component layouts are registered up front in a [`SchemaRegistry`]
//! - Records live in dense per-type columns ([`ComponentTable`])
//! - Existence and authority live in the [`EntityDirectory`]
//! - Structural changes queue in a [`ChangeLog`] until the tick boundary

mod component;
mod directory;
mod entity;
mod layer;
mod schema;
mod storage;

pub use component::{
    Component, ComponentId, ComponentInstance, Coordinates, EdgeLength, Persistence, Position,
    SystemMarker,
};
pub use directory::{ChangeLog, EntityDirectory, EntityRecord, PendingChange, ReplayStats};
pub use entity::{EntityAllocator, EntityId};
pub use layer::Layer;
pub use schema::{ComponentSchema, SchemaRegistry};
pub use storage::{ComponentColumn, ComponentTable};
