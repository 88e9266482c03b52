//! # Entity Iterator
//!
//! The handle a tick callback receives. It walks the entities on which the
//! callback's layer writes at least one component, reads from the tick's
//! snapshot, and routes every mutation into the deferred paths:
//!
//! - component writes → [`MutationBuffer`]
//! - structural requests → [`ChangeLog`]
//!
//! Nothing an iterator does is visible to any reader before the next tick.
//! Iterators are owned values; cloning one gives an independent cursor over
//! the same tick.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::ecs::{ChangeLog, Component, ComponentId, ComponentInstance, EntityId, Layer};
use crate::error::{SimError, SimResult};
use crate::log::{send_log_message, LogLevel};
use crate::snapshot::Snapshot;
use crate::spatial::{Constraint, Query};
use crate::sync::{HandleGuard, MutationBuffer, StagedWrite};

/// Shared state of one open tick.
#[derive(Debug)]
pub(crate) struct TickContext {
    pub(crate) snapshot: Arc<Snapshot>,
    pub(crate) mutations: Arc<MutationBuffer>,
    pub(crate) changes: Arc<Mutex<ChangeLog>>,
    pub(crate) guard: HandleGuard,
    pub(crate) max_entities: usize,
}

/// Cursor over the entities a layer may update during one tick.
#[derive(Clone, Debug)]
pub struct EntityIterator {
    context: Arc<TickContext>,
    layer: Layer,
    entities: Arc<[EntityId]>,
    cursor: usize,
}

impl EntityIterator {
    pub(crate) fn new(context: Arc<TickContext>, layer: Layer) -> Self {
        let entities = context.snapshot.directory.entities_for_layer(&layer).into();
        Self {
            context,
            layer,
            entities,
            cursor: 0,
        }
    }

    /// Layer this iterator acts for.
    #[inline]
    #[must_use]
    pub const fn layer(&self) -> &Layer {
        &self.layer
    }

    /// Tick being processed.
    #[inline]
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.context.snapshot.tick
    }

    /// Entity capacity of the simulation.
    #[inline]
    #[must_use]
    pub fn max_entities(&self) -> usize {
        self.context.max_entities
    }

    /// Total number of entities this iterator visits.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the layer owns no entity this tick.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns `true` once every entity has been visited.
    ///
    /// # Errors
    ///
    /// `StaleHandle` after the tick has ended.
    pub fn is_finished(&self) -> SimResult<bool> {
        self.context.guard.check()?;
        Ok(self.cursor >= self.entities.len())
    }

    /// The current entity.
    ///
    /// # Errors
    ///
    /// `StaleHandle` after the tick, `IterationAlreadyCompleted` when finished.
    pub fn current(&self) -> SimResult<EntityId> {
        self.context.guard.check()?;
        self.entities
            .get(self.cursor)
            .copied()
            .ok_or(SimError::IterationAlreadyCompleted)
    }

    /// Moves to the next entity.
    ///
    /// # Errors
    ///
    /// `StaleHandle` after the tick, `IterationAlreadyCompleted` if already
    /// finished.
    pub fn next_entity(&mut self) -> SimResult<()> {
        self.current()?;
        self.cursor += 1;
        Ok(())
    }

    /// Operations on an arbitrary entity, on behalf of this layer.
    #[must_use]
    pub fn entity(&self, entity: EntityId) -> EntityCommands<'_> {
        EntityCommands { iter: self, entity }
    }

    /// Copies a committed component of the current entity into `out`.
    ///
    /// # Errors
    ///
    /// As [`EntityIterator::current`], plus `InvalidComponent`,
    /// `InvalidDataSize` (nothing copied) or `MissingComponent`.
    pub fn get_component(&self, component: ComponentId, out: &mut [u8]) -> SimResult<()> {
        self.get_component_of(self.current()?, component, out)
    }

    /// Reads a typed committed component of the current entity.
    ///
    /// # Errors
    ///
    /// See [`EntityIterator::get_component`].
    pub fn get<C: Component>(&self) -> SimResult<C> {
        self.get_of(self.current()?)
    }

    /// Stages a new value for a component of the current entity.
    ///
    /// # Errors
    ///
    /// As [`EntityIterator::current`], plus `InvalidComponent`,
    /// `InvalidDataSize` or `NoWriteAccess`.
    pub fn update_component(&self, component: ComponentId, data: &[u8]) -> SimResult<()> {
        self.update_component_of(self.current()?, component, data)
    }

    /// Stages a new typed value for the current entity.
    ///
    /// # Errors
    ///
    /// See [`EntityIterator::update_component`].
    pub fn update<C: Component>(&self, value: &C) -> SimResult<()> {
        self.update_component_of(self.current()?, C::ID, bytemuck::bytes_of(value))
    }

    /// Stages the addition of a component to the current entity.
    ///
    /// # Errors
    ///
    /// See [`ChangeLog::stage_add`].
    pub fn add_component(&self, instance: ComponentInstance) -> SimResult<()> {
        self.add_component_to(self.current()?, instance)
    }

    /// Stages the removal of a component from the current entity.
    ///
    /// # Errors
    ///
    /// See [`ChangeLog::stage_remove`].
    pub fn remove_component(&self, component: ComponentId) -> SimResult<()> {
        self.remove_component_from(self.current()?, component)
    }

    /// Stages deletion of the current entity.
    ///
    /// # Errors
    ///
    /// See [`ChangeLog::stage_delete`].
    pub fn delete_entity(&self) -> SimResult<()> {
        self.delete(self.current()?)
    }

    /// Stages a transfer of write authority over a component of the
    /// current entity.
    ///
    /// # Errors
    ///
    /// See [`ChangeLog::stage_set_writer`].
    pub fn set_writer(&self, component: ComponentId, target: impl Into<Layer>) -> SimResult<()> {
        self.set_writer_of(self.current()?, component, target.into())
    }

    /// Stages creation of a new entity. It is visible from the next tick.
    ///
    /// # Errors
    ///
    /// See [`ChangeLog::stage_create`].
    pub fn create_entity(&self, components: Vec<ComponentInstance>) -> SimResult<EntityId> {
        let snapshot = &self.context.snapshot;
        self.changes()?
            .stage_create(&snapshot.directory, &snapshot.schema, components)
    }

    /// Queries the tick's snapshot. Relative constraints are centred on the
    /// current entity.
    ///
    /// # Errors
    ///
    /// `IterationAlreadyCompleted` for a relative constraint once finished,
    /// otherwise see [`Constraint`] resolution.
    pub fn query(&self, constraint: &Constraint) -> SimResult<Query> {
        let anchor = if constraint.is_relative() {
            Some(self.current()?)
        } else {
            None
        };
        self.query_from(anchor, constraint)
    }

    /// Emits a message on the logging side channel, tagged with this layer.
    pub fn log(&self, level: LogLevel, message: &str) {
        send_log_message(&self.layer, level, message);
    }

    /// Locks the change log for this tick. The guard is checked under the
    /// lock so a request racing the boundary cannot reach the next tick.
    fn changes(&self) -> SimResult<MutexGuard<'_, ChangeLog>> {
        let changes = self.context.changes.lock();
        self.context.guard.check()?;
        Ok(changes)
    }

    fn get_component_of(&self, entity: EntityId, component: ComponentId, out: &mut [u8]) -> SimResult<()> {
        self.context.guard.check()?;
        self.context.snapshot.table.get(entity, component, out)
    }

    fn get_of<C: Component>(&self, entity: EntityId) -> SimResult<C> {
        self.context.guard.check()?;
        self.context.snapshot.table.read(entity)
    }

    fn update_component_of(&self, entity: EntityId, component: ComponentId, data: &[u8]) -> SimResult<()> {
        self.context.guard.check()?;
        let snapshot = &self.context.snapshot;
        snapshot.schema.check_buffer(component, data.len())?;
        self.context.changes.lock().reject_new_entity(entity)?;
        snapshot.directory.check_write(entity, component, &self.layer)?;
        self.context.mutations.stage_guarded(
            &self.context.guard,
            StagedWrite {
                entity,
                component,
                data: data.to_vec(),
                requested_at_tick: snapshot.tick,
            },
        )?;
        Ok(())
    }

    fn add_component_to(&self, entity: EntityId, instance: ComponentInstance) -> SimResult<()> {
        let snapshot = &self.context.snapshot;
        self.changes()?
            .stage_add(&snapshot.directory, &snapshot.schema, &self.layer, entity, instance)
    }

    fn remove_component_from(&self, entity: EntityId, component: ComponentId) -> SimResult<()> {
        self.changes()?
            .stage_remove(&self.context.snapshot.directory, &self.layer, entity, component)
    }

    fn delete(&self, entity: EntityId) -> SimResult<()> {
        self.changes()?
            .stage_delete(&self.context.snapshot.directory, entity)
    }

    fn set_writer_of(&self, entity: EntityId, component: ComponentId, target: Layer) -> SimResult<()> {
        self.changes()?.stage_set_writer(
            &self.context.snapshot.directory,
            &self.layer,
            entity,
            component,
            target,
        )
    }

    fn query_from(&self, anchor: Option<EntityId>, constraint: &Constraint) -> SimResult<Query> {
        Query::new(
            Arc::clone(&self.context.snapshot),
            self.context.guard.clone(),
            constraint,
            anchor,
        )
    }
}

/// Operations on one entity, issued through an [`EntityIterator`].
///
/// Authority is checked against the iterator's layer exactly as for the
/// iterator's current entity.
#[derive(Clone, Copy, Debug)]
pub struct EntityCommands<'a> {
    iter: &'a EntityIterator,
    entity: EntityId,
}

impl EntityCommands<'_> {
    /// Target entity.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.entity
    }

    /// See [`EntityIterator::get_component`].
    ///
    /// # Errors
    ///
    /// See [`EntityIterator::get_component`].
    pub fn get_component(&self, component: ComponentId, out: &mut [u8]) -> SimResult<()> {
        self.iter.get_component_of(self.entity, component, out)
    }

    /// See [`EntityIterator::get`].
    ///
    /// # Errors
    ///
    /// See [`EntityIterator::get_component`].
    pub fn get<C: Component>(&self) -> SimResult<C> {
        self.iter.get_of(self.entity)
    }

    /// See [`EntityIterator::update_component`].
    ///
    /// # Errors
    ///
    /// See [`EntityIterator::update_component`].
    pub fn update_component(&self, component: ComponentId, data: &[u8]) -> SimResult<()> {
        self.iter.update_component_of(self.entity, component, data)
    }

    /// See [`EntityIterator::update`].
    ///
    /// # Errors
    ///
    /// See [`EntityIterator::update_component`].
    pub fn update<C: Component>(&self, value: &C) -> SimResult<()> {
        self.iter
            .update_component_of(self.entity, C::ID, bytemuck::bytes_of(value))
    }

    /// See [`EntityIterator::add_component`].
    ///
    /// # Errors
    ///
    /// See [`ChangeLog::stage_add`].
    pub fn add_component(&self, instance: ComponentInstance) -> SimResult<()> {
        self.iter.add_component_to(self.entity, instance)
    }

    /// See [`EntityIterator::remove_component`].
    ///
    /// # Errors
    ///
    /// See [`ChangeLog::stage_remove`].
    pub fn remove_component(&self, component: ComponentId) -> SimResult<()> {
        self.iter.remove_component_from(self.entity, component)
    }

    /// See [`EntityIterator::delete_entity`].
    ///
    /// # Errors
    ///
    /// See [`ChangeLog::stage_delete`].
    pub fn delete(&self) -> SimResult<()> {
        self.iter.delete(self.entity)
    }

    /// See [`EntityIterator::set_writer`].
    ///
    /// # Errors
    ///
    /// See [`ChangeLog::stage_set_writer`].
    pub fn set_writer(&self, component: ComponentId, target: impl Into<Layer>) -> SimResult<()> {
        self.iter.set_writer_of(self.entity, component, target.into())
    }

    /// Queries the snapshot with relative constraints centred on this entity.
    ///
    /// # Errors
    ///
    /// See [`Constraint`] resolution.
    pub fn query(&self, constraint: &Constraint) -> SimResult<Query> {
        self.iter.query_from(Some(self.entity), constraint)
    }
}
