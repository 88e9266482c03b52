//! # Component Storage
//!
//! Dense, per-type storage of fixed-size binary records.
//!
//! Each column keeps its records packed back to back:
//! - Access is O(1) via an entity → slot map
//! - Removal swaps the last record into the hole, keeping the column dense
//! - Iteration walks contiguous memory

use std::collections::HashMap;

use super::component::{Component, ComponentId};
use super::entity::EntityId;
use super::schema::SchemaRegistry;
use crate::error::{SimError, SimResult};
use crate::sync::StagingArea;

/// Dense storage for a single component type.
#[derive(Clone, Debug)]
pub struct ComponentColumn {
    /// Record size in bytes.
    size: usize,
    /// Packed records, `entities.len() * size` bytes.
    data: Vec<u8>,
    /// Owner of each slot.
    entities: Vec<EntityId>,
    /// Entity → slot.
    slots: HashMap<EntityId, usize>,
}

impl ComponentColumn {
    /// Creates an empty column for records of `size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if size is zero.
    #[must_use]
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "Record size must be greater than zero");
        Self {
            size,
            data: Vec::new(),
            entities: Vec::new(),
            slots: HashMap::new(),
        }
    }

    /// Record size in bytes.
    #[inline]
    #[must_use]
    pub const fn record_size(&self) -> usize {
        self.size
    }

    /// Number of stored records.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the column holds no records.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns `true` if the entity has a record here.
    #[inline]
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.slots.contains_key(&entity)
    }

    /// Gets the record of an entity.
    #[inline]
    #[must_use]
    pub fn get(&self, entity: EntityId) -> Option<&[u8]> {
        let slot = *self.slots.get(&entity)?;
        let start = slot * self.size;
        Some(&self.data[start..start + self.size])
    }

    /// Inserts or overwrites a record.
    ///
    /// Returns `true` if the entity had no record before.
    pub(crate) fn insert(&mut self, entity: EntityId, bytes: &[u8]) -> bool {
        debug_assert_eq!(bytes.len(), self.size);
        if self.overwrite(entity, bytes) {
            return false;
        }
        self.slots.insert(entity, self.entities.len());
        self.entities.push(entity);
        self.data.extend_from_slice(bytes);
        true
    }

    /// Overwrites an existing record.
    ///
    /// Returns `false` if the entity has no record.
    pub(crate) fn overwrite(&mut self, entity: EntityId, bytes: &[u8]) -> bool {
        debug_assert_eq!(bytes.len(), self.size);
        let Some(&slot) = self.slots.get(&entity) else {
            return false;
        };
        let start = slot * self.size;
        self.data[start..start + self.size].copy_from_slice(bytes);
        true
    }

    /// Removes a record, moving the last record into its slot.
    ///
    /// Returns `false` if the entity had no record.
    pub(crate) fn remove(&mut self, entity: EntityId) -> bool {
        let Some(slot) = self.slots.remove(&entity) else {
            return false;
        };
        let last = self.entities.len() - 1;
        if slot != last {
            let size = self.size;
            self.data.copy_within(last * size..(last + 1) * size, slot * size);
        }
        self.entities.swap_remove(slot);
        if let Some(&moved) = self.entities.get(slot) {
            self.slots.insert(moved, slot);
        }
        self.data.truncate(last * self.size);
        true
    }

    /// Iterates over all records with their owners.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &[u8])> {
        self.entities
            .iter()
            .copied()
            .zip(self.data.chunks_exact(self.size))
    }

    /// Iterates over the owners of all records.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().copied()
    }
}

/// Committed component values of every entity, one column per type.
///
/// Only the commit path mutates the table; during a tick it is shared
/// read-only between all systems.
#[derive(Clone, Debug, Default)]
pub struct ComponentTable {
    columns: HashMap<ComponentId, ComponentColumn>,
}

impl ComponentTable {
    /// Creates a table with one empty column per registered type.
    #[must_use]
    pub fn new(schema: &SchemaRegistry) -> Self {
        let columns = schema
            .iter()
            .map(|entry| (entry.id, ComponentColumn::new(entry.size)))
            .collect();
        Self { columns }
    }

    /// Returns the column of a component type.
    #[inline]
    #[must_use]
    pub fn column(&self, component: ComponentId) -> Option<&ComponentColumn> {
        self.columns.get(&component)
    }

    /// Returns `true` if the entity carries the component.
    #[inline]
    #[must_use]
    pub fn contains(&self, entity: EntityId, component: ComponentId) -> bool {
        self.columns
            .get(&component)
            .is_some_and(|column| column.contains(entity))
    }

    /// Committed bytes of a component.
    #[inline]
    #[must_use]
    pub fn get_bytes(&self, entity: EntityId, component: ComponentId) -> Option<&[u8]> {
        self.columns.get(&component)?.get(entity)
    }

    /// Copies the committed value of a component into `out`.
    ///
    /// Nothing is copied on failure.
    ///
    /// # Errors
    ///
    /// - `InvalidComponent` if the type is unknown
    /// - `InvalidDataSize` if `out` is not exactly the record size
    /// - `MissingComponent` if the entity does not carry the component
    pub fn get(&self, entity: EntityId, component: ComponentId, out: &mut [u8]) -> SimResult<()> {
        let column = self
            .columns
            .get(&component)
            .ok_or_else(|| SimError::invalid_component(component, "unregistered component type"))?;
        if out.len() != column.record_size() {
            return Err(SimError::InvalidDataSize {
                component,
                expected: column.record_size(),
                actual: out.len(),
            });
        }
        let bytes = column
            .get(entity)
            .ok_or(SimError::MissingComponent { entity, component })?;
        out.copy_from_slice(bytes);
        Ok(())
    }

    /// Reads a typed component.
    ///
    /// # Errors
    ///
    /// Same as [`ComponentTable::get`].
    pub fn read<C: Component>(&self, entity: EntityId) -> SimResult<C> {
        let mut value: C = bytemuck::Zeroable::zeroed();
        self.get(entity, C::ID, bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }

    /// Applies every write staged in `area`, leaving it empty.
    ///
    /// Returns the number of records written. Writes to records that no
    /// longer exist are dropped.
    pub fn commit(&mut self, area: &mut StagingArea) -> usize {
        let mut applied = 0;
        for write in area.drain() {
            if let Some(column) = self.columns.get_mut(&write.component) {
                if column.overwrite(write.entity, &write.data) {
                    applied += 1;
                }
            }
        }
        applied
    }

    /// Inserts a record. The type must be registered.
    pub(crate) fn insert(&mut self, entity: EntityId, component: ComponentId, bytes: &[u8]) {
        if let Some(column) = self.columns.get_mut(&component) {
            column.insert(entity, bytes);
        }
    }

    /// Removes one record.
    pub(crate) fn remove(&mut self, entity: EntityId, component: ComponentId) -> bool {
        self.columns
            .get_mut(&component)
            .is_some_and(|column| column.remove(entity))
    }

    /// Removes every record of an entity.
    pub(crate) fn remove_entity(&mut self, entity: EntityId) {
        for column in self.columns.values_mut() {
            column.remove(entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::Position;
    use crate::error::StatusCode;

    #[test]
    fn test_column_insert_get() {
        let mut column = ComponentColumn::new(4);
        assert!(column.insert(EntityId::new(3), &[1, 2, 3, 4]));
        assert!(!column.insert(EntityId::new(3), &[5, 6, 7, 8]));
        assert_eq!(column.get(EntityId::new(3)), Some(&[5, 6, 7, 8][..]));
        assert_eq!(column.len(), 1);
    }

    #[test]
    fn test_column_remove_keeps_dense() {
        let mut column = ComponentColumn::new(2);
        for i in 0..4u8 {
            column.insert(EntityId::new(u64::from(i)), &[i, i]);
        }

        assert!(column.remove(EntityId::new(1)));
        assert!(!column.remove(EntityId::new(1)));
        assert_eq!(column.len(), 3);

        // The last record moved into slot 1 and is still addressable.
        assert_eq!(column.get(EntityId::new(3)), Some(&[3, 3][..]));
        assert_eq!(column.get(EntityId::new(0)), Some(&[0, 0][..]));
        assert_eq!(column.get(EntityId::new(2)), Some(&[2, 2][..]));

        let owners: Vec<u64> = column.iter().map(|(id, _)| id.index()).collect();
        assert_eq!(owners, vec![0, 3, 2]);
    }

    #[test]
    fn test_column_remove_last() {
        let mut column = ComponentColumn::new(1);
        column.insert(EntityId::new(0), &[9]);
        assert!(column.remove(EntityId::new(0)));
        assert!(column.is_empty());
        assert_eq!(column.iter().count(), 0);
    }

    #[test]
    fn test_table_get_validates_size_before_copy() {
        let schema = SchemaRegistry::with_builtins();
        let mut table = ComponentTable::new(&schema);
        let entity = EntityId::new(0);
        table.insert(entity, Position::ID, bytemuck::bytes_of(&Position::new(1.0, 2.0, 3.0)));

        let mut short = [0xAAu8; 23];
        let err = table.get(entity, Position::ID, &mut short).unwrap_err();
        assert_eq!(err.status(), StatusCode::InvalidDataSize);
        assert!(short.iter().all(|b| *b == 0xAA));

        let pos: Position = table.read(entity).unwrap();
        assert_eq!(pos, Position::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_table_missing_component() {
        let schema = SchemaRegistry::with_builtins();
        let table = ComponentTable::new(&schema);
        let err = table.read::<Position>(EntityId::new(5)).unwrap_err();
        assert_eq!(err.status(), StatusCode::MissingComponent);
    }

    #[test]
    fn test_remove_entity_clears_all_columns() {
        let schema = SchemaRegistry::with_builtins();
        let mut table = ComponentTable::new(&schema);
        let entity = EntityId::new(1);
        table.insert(entity, Position::ID, &[0u8; 24]);
        table.insert(entity, crate::ecs::component::Persistence::ID, &[0u8]);

        table.remove_entity(entity);
        assert!(!table.contains(entity, Position::ID));
        assert!(!table.contains(entity, crate::ecs::component::Persistence::ID));
    }
}
