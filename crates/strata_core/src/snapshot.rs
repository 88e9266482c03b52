//! # Committed Snapshot
//!
//! The state every reader of a tick sees. A snapshot is shared behind an
//! `Arc` for the whole tick and only ever mutated at the boundary, through
//! copy-on-write, once no handle of the closing tick can reach it.

use std::sync::Arc;

use crate::ecs::{
    Component, ComponentId, ComponentTable, Coordinates, EntityDirectory, EntityId, SchemaRegistry,
};
use crate::error::SimResult;
use crate::spatial::SpatialIndex;

/// Committed state as of the start of a tick.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub(crate) tick: u64,
    pub(crate) schema: Arc<SchemaRegistry>,
    pub(crate) directory: EntityDirectory,
    pub(crate) table: ComponentTable,
    pub(crate) spatial: SpatialIndex,
}

impl Snapshot {
    pub(crate) fn new(schema: Arc<SchemaRegistry>, cell_size: f64) -> Self {
        let table = ComponentTable::new(&schema);
        Self {
            tick: 0,
            schema,
            directory: EntityDirectory::new(),
            table,
            spatial: SpatialIndex::new(cell_size),
        }
    }

    /// Tick this snapshot was committed for.
    #[inline]
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Registered component layouts.
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    /// Existence and authority state.
    #[inline]
    #[must_use]
    pub const fn directory(&self) -> &EntityDirectory {
        &self.directory
    }

    /// Committed component values.
    #[inline]
    #[must_use]
    pub const fn table(&self) -> &ComponentTable {
        &self.table
    }

    /// Position index built at the start of the tick.
    #[inline]
    #[must_use]
    pub const fn spatial(&self) -> &SpatialIndex {
        &self.spatial
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.directory.len()
    }

    /// Copies a committed component value into `out`.
    ///
    /// # Errors
    ///
    /// See [`ComponentTable::get`].
    pub fn get(&self, entity: EntityId, component: ComponentId, out: &mut [u8]) -> SimResult<()> {
        self.table.get(entity, component, out)
    }

    /// Reads a typed committed component value.
    ///
    /// # Errors
    ///
    /// See [`ComponentTable::get`].
    pub fn read<C: Component>(&self, entity: EntityId) -> SimResult<C> {
        self.table.read(entity)
    }

    /// Committed position of an entity, if it has one.
    #[must_use]
    pub fn position_of(&self, entity: EntityId) -> Option<Coordinates> {
        self.spatial.position_of(entity)
    }

    /// Rebuilds the spatial index from the committed Position column.
    pub(crate) fn rebuild_spatial(&mut self) {
        self.spatial.rebuild(&self.table);
    }
}
