//! # Entity Directory
//!
//! Tracks which entities exist, which components they carry and which layer
//! holds write authority over each component.
//!
//! Structural requests made during a tick never touch the directory
//! directly. They are validated against the committed state and appended to
//! a [`ChangeLog`], which is replayed at the tick boundary:
//!
//! ```text
//! creations  →  component ops (add / remove / set writer)  →  deletions
//! ```
//!
//! Within each class changes replay in submission order.

use std::collections::{BTreeMap, HashMap, HashSet};

use super::component::{ComponentId, ComponentInstance};
use super::entity::{EntityAllocator, EntityId};
use super::layer::Layer;
use super::schema::SchemaRegistry;
use super::storage::ComponentTable;
use crate::error::{SimError, SimResult};

/// Committed component set of one entity, with the writer of each component.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntityRecord {
    writers: BTreeMap<ComponentId, Layer>,
}

impl EntityRecord {
    /// Returns `true` if the entity carries the component.
    #[inline]
    #[must_use]
    pub fn has(&self, component: ComponentId) -> bool {
        self.writers.contains_key(&component)
    }

    /// Layer holding write authority over a component.
    #[inline]
    #[must_use]
    pub fn writer(&self, component: ComponentId) -> Option<&Layer> {
        self.writers.get(&component)
    }

    /// Returns `true` if `layer` writes at least one component.
    #[must_use]
    pub fn owns_any(&self, layer: &Layer) -> bool {
        self.writers.values().any(|writer| writer == layer)
    }

    /// Component types carried, in id order.
    pub fn components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.writers.keys().copied()
    }

    /// `(component, writer)` pairs in id order.
    pub fn writers(&self) -> impl Iterator<Item = (ComponentId, &Layer)> {
        self.writers.iter().map(|(id, layer)| (*id, layer))
    }

    /// Number of components carried.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.writers.len()
    }

    /// Returns `true` if the entity carries no components.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }
}

/// Committed existence and authority state.
#[derive(Clone, Debug, Default)]
pub struct EntityDirectory {
    entities: BTreeMap<EntityId, EntityRecord>,
    /// Number of entity indices allocated as of the last commit.
    allocated: u64,
}

impl EntityDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if no entity is live.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of entity indices handed out as of the last commit.
    #[inline]
    #[must_use]
    pub const fn allocated(&self) -> u64 {
        self.allocated
    }

    /// Returns `true` if the entity is live.
    #[inline]
    #[must_use]
    pub fn is_live(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    /// Committed record of an entity.
    #[inline]
    #[must_use]
    pub fn record(&self, entity: EntityId) -> Option<&EntityRecord> {
        self.entities.get(&entity)
    }

    /// Iterates over live entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &EntityRecord)> {
        self.entities.iter().map(|(id, record)| (*id, record))
    }

    /// Layer holding write authority over a component.
    ///
    /// # Errors
    ///
    /// `NotFound` if the entity is not live, `MissingComponent` if it does
    /// not carry the component.
    pub fn writer(&self, entity: EntityId, component: ComponentId) -> SimResult<&Layer> {
        self.record(entity)
            .ok_or(SimError::NotFound(entity))?
            .writer(component)
            .ok_or(SimError::MissingComponent { entity, component })
    }

    /// Checks that `layer` may write a component.
    ///
    /// # Errors
    ///
    /// As [`EntityDirectory::writer`], plus `NoWriteAccess` if another layer
    /// holds authority.
    pub fn check_write(&self, entity: EntityId, component: ComponentId, layer: &Layer) -> SimResult<()> {
        if self.writer(entity, component)? == layer {
            Ok(())
        } else {
            Err(SimError::NoWriteAccess {
                entity,
                component,
                layer: layer.clone(),
            })
        }
    }

    /// Entities on which `layer` writes at least one component, in id order.
    #[must_use]
    pub fn entities_for_layer(&self, layer: &Layer) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|(_, record)| record.owns_any(layer))
            .map(|(id, _)| *id)
            .collect()
    }
}

/// A structural change waiting for the tick boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingChange {
    /// Create an entity with its initial components.
    CreateEntity {
        /// New entity.
        entity: EntityId,
        /// Initial components.
        components: Vec<ComponentInstance>,
    },
    /// Attach a component.
    AddComponent {
        /// Target entity.
        entity: EntityId,
        /// Component to attach.
        instance: ComponentInstance,
    },
    /// Detach a component.
    RemoveComponent {
        /// Target entity.
        entity: EntityId,
        /// Component type.
        component: ComponentId,
    },
    /// Transfer write authority.
    SetWriter {
        /// Target entity.
        entity: EntityId,
        /// Component type.
        component: ComponentId,
        /// New writer.
        layer: Layer,
    },
    /// Delete an entity.
    DeleteEntity {
        /// Target entity.
        entity: EntityId,
    },
}

/// Counts of structural changes applied by one replay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Entities created.
    pub created: usize,
    /// Component adds, removes and writer transfers applied.
    pub component_ops: usize,
    /// Entities deleted.
    pub deleted: usize,
}

/// Ordered log of structural requests made since the last commit.
#[derive(Debug)]
pub struct ChangeLog {
    allocator: EntityAllocator,
    capacity: usize,
    changes: Vec<PendingChange>,
    created: HashSet<EntityId>,
    deleted: HashSet<EntityId>,
    added: HashMap<(EntityId, ComponentId), Layer>,
    removed: HashSet<(EntityId, ComponentId)>,
}

impl ChangeLog {
    /// Creates an empty log for a simulation holding at most `capacity`
    /// entities.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            allocator: EntityAllocator::new(),
            capacity,
            changes: Vec::new(),
            created: HashSet::new(),
            deleted: HashSet::new(),
            added: HashMap::new(),
            removed: HashSet::new(),
        }
    }

    /// Pending changes in submission order.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> &[PendingChange] {
        &self.changes
    }

    /// Number of pending changes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns `true` if nothing is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of entity indices handed out, including pending creations.
    #[inline]
    #[must_use]
    pub const fn allocated(&self) -> u64 {
        self.allocator.allocated()
    }

    /// Returns `true` if the entity was created since the last commit.
    #[inline]
    #[must_use]
    pub fn is_pending_creation(&self, entity: EntityId) -> bool {
        self.created.contains(&entity)
    }

    /// Rejects entities that are not visible yet.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the entity was created since the last commit.
    pub fn reject_new_entity(&self, entity: EntityId) -> SimResult<()> {
        if self.is_pending_creation(entity) {
            return Err(SimError::InvalidArgument(format!(
                "{entity} is created this tick and cannot be modified until it is visible"
            )));
        }
        Ok(())
    }

    fn will_have(&self, record: &EntityRecord, entity: EntityId, component: ComponentId) -> bool {
        let key = (entity, component);
        self.added.contains_key(&key) || (record.has(component) && !self.removed.contains(&key))
    }

    /// Stages creation of a new entity.
    ///
    /// The creator may attach components authored by any layer.
    ///
    /// # Errors
    ///
    /// - `InvalidComponent` on an unknown type or size mismatch
    /// - `DuplicateComponent` if a type appears twice
    /// - `OutOfMemory` if the entity capacity is exhausted
    pub fn stage_create(
        &mut self,
        directory: &EntityDirectory,
        schema: &SchemaRegistry,
        components: Vec<ComponentInstance>,
    ) -> SimResult<EntityId> {
        let mut seen = HashSet::with_capacity(components.len());
        for instance in &components {
            schema.validate_instance(instance.component, instance.data.len())?;
            if !seen.insert(instance.component) {
                return Err(SimError::DuplicateComponent(instance.component));
            }
        }
        if directory.len() + self.created.len() >= self.capacity {
            return Err(SimError::OutOfMemory {
                capacity: self.capacity,
            });
        }

        let entity = self.allocator.allocate();
        self.created.insert(entity);
        self.changes.push(PendingChange::CreateEntity { entity, components });
        Ok(entity)
    }

    /// Stages deletion of a live entity. Repeated requests collapse.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an entity created this tick, `NotFound` if the
    /// entity is not live.
    pub fn stage_delete(&mut self, directory: &EntityDirectory, entity: EntityId) -> SimResult<()> {
        self.reject_new_entity(entity)?;
        if !directory.is_live(entity) {
            return Err(SimError::NotFound(entity));
        }
        if self.deleted.insert(entity) {
            self.changes.push(PendingChange::DeleteEntity { entity });
        }
        Ok(())
    }

    /// Stages addition of a component.
    ///
    /// The caller must already write some component on the entity, and the
    /// new component must be authored by the caller's own layer.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an entity created this tick
    /// - `NotFound` if the entity is not live
    /// - `InvalidComponent` on an unknown type or size mismatch
    /// - `NoWriteAccess` if the caller may not add components here
    /// - `AlreadyExists` if the component is present or pending addition
    pub fn stage_add(
        &mut self,
        directory: &EntityDirectory,
        schema: &SchemaRegistry,
        caller: &Layer,
        entity: EntityId,
        instance: ComponentInstance,
    ) -> SimResult<()> {
        self.reject_new_entity(entity)?;
        let record = directory.record(entity).ok_or(SimError::NotFound(entity))?;
        schema.validate_instance(instance.component, instance.data.len())?;

        let component = instance.component;
        if !record.owns_any(caller) || instance.layer != *caller {
            return Err(SimError::NoWriteAccess {
                entity,
                component,
                layer: caller.clone(),
            });
        }
        if self.will_have(record, entity, component) {
            return Err(SimError::AlreadyExists { entity, component });
        }

        self.removed.remove(&(entity, component));
        self.added.insert((entity, component), instance.layer.clone());
        self.changes.push(PendingChange::AddComponent { entity, instance });
        Ok(())
    }

    /// Stages removal of a component the caller writes, including one the
    /// caller added earlier in the same tick.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an entity created this tick
    /// - `NotFound` if the entity is not live
    /// - `MissingComponent` if the component is absent or already pending removal
    /// - `NoWriteAccess` if the caller is not the component's writer
    pub fn stage_remove(
        &mut self,
        directory: &EntityDirectory,
        caller: &Layer,
        entity: EntityId,
        component: ComponentId,
    ) -> SimResult<()> {
        self.reject_new_entity(entity)?;
        let record = directory.record(entity).ok_or(SimError::NotFound(entity))?;
        if !self.will_have(record, entity, component) {
            return Err(SimError::MissingComponent { entity, component });
        }
        let key = (entity, component);
        // A pending addition is written by the layer that staged it.
        let caller_writes = match self.added.get(&key) {
            Some(adder) => adder == caller,
            None => record.writer(component) == Some(caller),
        };
        if !caller_writes {
            return Err(SimError::NoWriteAccess {
                entity,
                component,
                layer: caller.clone(),
            });
        }

        self.added.remove(&key);
        self.removed.insert(key);
        self.changes
            .push(PendingChange::RemoveComponent { entity, component });
        Ok(())
    }

    /// Stages a transfer of write authority to `target`.
    ///
    /// Only the current writer may transfer. Several transfers of the same
    /// component in one tick resolve to the last one.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an entity created this tick
    /// - `NotFound` if the entity is not live
    /// - `MissingComponent` if the component is absent
    /// - `NoWriteAccess` if the caller is not the current writer
    pub fn stage_set_writer(
        &mut self,
        directory: &EntityDirectory,
        caller: &Layer,
        entity: EntityId,
        component: ComponentId,
        target: Layer,
    ) -> SimResult<()> {
        self.reject_new_entity(entity)?;
        directory.check_write(entity, component, caller)?;
        self.changes.push(PendingChange::SetWriter {
            entity,
            component,
            layer: target,
        });
        Ok(())
    }

    /// Applies every pending change to the committed state, leaving the log
    /// empty.
    pub fn replay(&mut self, directory: &mut EntityDirectory, table: &mut ComponentTable) -> ReplayStats {
        let mut stats = ReplayStats::default();

        for change in &self.changes {
            if let PendingChange::CreateEntity { entity, components } = change {
                let mut record = EntityRecord::default();
                for instance in components {
                    record.writers.insert(instance.component, instance.layer.clone());
                    table.insert(*entity, instance.component, &instance.data);
                }
                directory.entities.insert(*entity, record);
                stats.created += 1;
            }
        }

        for change in &self.changes {
            match change {
                PendingChange::AddComponent { entity, instance } => {
                    if let Some(record) = directory.entities.get_mut(entity) {
                        record.writers.insert(instance.component, instance.layer.clone());
                        table.insert(*entity, instance.component, &instance.data);
                        stats.component_ops += 1;
                    }
                }
                PendingChange::RemoveComponent { entity, component } => {
                    if let Some(record) = directory.entities.get_mut(entity) {
                        record.writers.remove(component);
                        table.remove(*entity, *component);
                        stats.component_ops += 1;
                    }
                }
                PendingChange::SetWriter {
                    entity,
                    component,
                    layer,
                } => {
                    if let Some(writer) = directory
                        .entities
                        .get_mut(entity)
                        .and_then(|record| record.writers.get_mut(component))
                    {
                        *writer = layer.clone();
                        stats.component_ops += 1;
                    }
                }
                PendingChange::CreateEntity { .. } | PendingChange::DeleteEntity { .. } => {}
            }
        }

        for change in &self.changes {
            if let PendingChange::DeleteEntity { entity } = change {
                if directory.entities.remove(entity).is_some() {
                    table.remove_entity(*entity);
                    stats.deleted += 1;
                }
            }
        }

        directory.allocated = self.allocator.allocated();
        self.clear();
        stats
    }

    /// Drops every pending change. Allocated indices are not reused.
    pub fn discard(&mut self) {
        self.clear();
    }

    fn clear(&mut self) {
        self.changes.clear();
        self.created.clear();
        self.deleted.clear();
        self.added.clear();
        self.removed.clear();
    }
}
