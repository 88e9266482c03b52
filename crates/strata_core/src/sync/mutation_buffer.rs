//! # Double-Buffered Mutation Staging
//!
//! Component writes issued during a tick are never visible to readers of
//! that tick. They land in the *active* staging area; at the tick boundary
//! the areas swap and the retired one is drained into committed storage.
//!
//! ```text
//! Tick N:
//!   systems stage writes     →  Area A (active)
//!   systems read committed   ←  Snapshot N
//!
//! Boundary:
//!   SWAP (atomic index toggle)
//!   drain Area A             →  Snapshot N+1
//!
//! Tick N+1:
//!   systems stage writes     →  Area B (active)
//! ```
//!
//! Within one area, a second write to the same `(entity, component)` pair
//! replaces the first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::epoch::HandleGuard;
use crate::ecs::{ComponentId, ComponentTable, EntityId};
use crate::error::SimResult;

/// A component write waiting for the tick boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagedWrite {
    /// Target entity.
    pub entity: EntityId,
    /// Target component type.
    pub component: ComponentId,
    /// New record bytes, already validated against the schema.
    pub data: Vec<u8>,
    /// Tick during which the write was requested.
    pub requested_at_tick: u64,
}

/// One side of the mutation buffer.
#[derive(Debug, Default)]
pub struct StagingArea {
    writes: HashMap<(EntityId, ComponentId), StagedWrite>,
}

impl StagingArea {
    /// Creates an empty area.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a write, replacing any earlier write to the same record.
    ///
    /// Returns `true` if the record had no staged write yet.
    pub fn stage(&mut self, write: StagedWrite) -> bool {
        self.writes
            .insert((write.entity, write.component), write)
            .is_none()
    }

    /// The write currently staged for a record.
    #[must_use]
    pub fn get(&self, entity: EntityId, component: ComponentId) -> Option<&StagedWrite> {
        self.writes.get(&(entity, component))
    }

    /// Number of staged records.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Returns `true` if nothing is staged.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Removes and yields every staged write.
    pub fn drain(&mut self) -> impl Iterator<Item = StagedWrite> + '_ {
        self.writes.drain().map(|(_, write)| write)
    }

    /// Drops every staged write.
    pub fn clear(&mut self) {
        self.writes.clear();
    }
}

/// Two staging areas behind an atomic index.
///
/// Staging locks only the active area, so systems of different layers can
/// stage concurrently with short critical sections.
#[derive(Debug)]
pub struct MutationBuffer {
    areas: [Mutex<StagingArea>; 2],
    /// Index of the area receiving writes (0 or 1).
    active: AtomicUsize,
    /// Number of completed swaps.
    swaps: AtomicU64,
}

impl Default for MutationBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationBuffer {
    /// Creates a buffer with two empty areas.
    #[must_use]
    pub fn new() -> Self {
        Self {
            areas: [Mutex::new(StagingArea::new()), Mutex::new(StagingArea::new())],
            active: AtomicUsize::new(0),
            swaps: AtomicU64::new(0),
        }
    }

    /// Index of the area currently receiving writes.
    #[inline]
    #[must_use]
    pub fn active_index(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Number of completed swaps.
    #[inline]
    #[must_use]
    pub fn swap_count(&self) -> u64 {
        self.swaps.load(Ordering::Relaxed)
    }

    /// Stages a write in the active area.
    ///
    /// Returns `true` if the record had no staged write yet.
    pub fn stage(&self, write: StagedWrite) -> bool {
        self.areas[self.active_index()].lock().stage(write)
    }

    /// Stages a write for a tick handle.
    ///
    /// The guard is checked while the area is locked. A write racing the
    /// boundary either lands in the area being retired or fails as stale;
    /// it never leaks into the next tick's area.
    ///
    /// # Errors
    ///
    /// `StaleHandle` if the guard's tick has ended.
    pub fn stage_guarded(&self, guard: &HandleGuard, write: StagedWrite) -> SimResult<bool> {
        let mut area = self.areas[self.active_index()].lock();
        guard.check()?;
        Ok(area.stage(write))
    }

    /// Number of records staged in the active area.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.areas[self.active_index()].lock().len()
    }

    /// Returns a copy of the write staged for a record, if any.
    #[must_use]
    pub fn staged(&self, entity: EntityId, component: ComponentId) -> Option<StagedWrite> {
        self.areas[self.active_index()]
            .lock()
            .get(entity, component)
            .cloned()
    }

    /// Swaps the areas and commits the retired one into `table`.
    ///
    /// Must only be called once every writer of the tick is done. Returns
    /// the number of records written.
    pub fn drain_into(&self, table: &mut ComponentTable) -> usize {
        let retired = self.active.fetch_xor(1, Ordering::AcqRel);
        self.swaps.fetch_add(1, Ordering::Relaxed);
        let mut area = self.areas[retired].lock();
        table.commit(&mut area)
    }

    /// Drops every write staged in the active area.
    pub fn discard(&self) -> usize {
        let mut area = self.areas[self.active_index()].lock();
        let dropped = area.len();
        area.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{Component, Position, SchemaRegistry};
    use crate::error::SimError;
    use crate::sync::TickEpoch;

    fn write(entity: u64, value: f64, tick: u64) -> StagedWrite {
        StagedWrite {
            entity: EntityId::new(entity),
            component: Position::ID,
            data: bytemuck::bytes_of(&Position::new(value, 0.0, 0.0)).to_vec(),
            requested_at_tick: tick,
        }
    }

    #[test]
    fn test_last_write_wins() {
        let mut area = StagingArea::new();
        assert!(area.stage(write(0, 1.0, 0)));
        assert!(!area.stage(write(0, 2.0, 0)));
        assert_eq!(area.len(), 1);
        assert_eq!(area.get(EntityId::new(0), Position::ID), Some(&write(0, 2.0, 0)));
    }

    #[test]
    fn test_drain_into_swaps_areas() {
        let schema = SchemaRegistry::with_builtins();
        let mut table = ComponentTable::new(&schema);
        table.insert(EntityId::new(0), Position::ID, &[0u8; 24]);

        let buffer = MutationBuffer::new();
        assert_eq!(buffer.active_index(), 0);
        buffer.stage(write(0, 5.0, 0));
        assert_eq!(buffer.pending(), 1);
        // Staging alone leaves committed storage untouched.
        assert_eq!(table.read::<Position>(EntityId::new(0)).unwrap(), Position::default());

        assert_eq!(buffer.drain_into(&mut table), 1);
        assert_eq!(buffer.active_index(), 1);
        assert_eq!(buffer.swap_count(), 1);
        assert_eq!(buffer.pending(), 0);
        assert_eq!(
            table.read::<Position>(EntityId::new(0)).unwrap(),
            Position::new(5.0, 0.0, 0.0)
        );
    }

    #[test]
    fn test_writes_to_missing_records_are_dropped() {
        let schema = SchemaRegistry::with_builtins();
        let mut table = ComponentTable::new(&schema);
        let buffer = MutationBuffer::new();
        buffer.stage(write(7, 1.0, 0));
        assert_eq!(buffer.drain_into(&mut table), 0);
        assert!(!table.contains(EntityId::new(7), Position::ID));
    }

    #[test]
    fn test_stale_guard_cannot_stage() {
        let epoch = TickEpoch::new();
        let buffer = MutationBuffer::new();
        let guard = epoch.guard();
        assert!(buffer.stage_guarded(&guard, write(0, 1.0, 0)).unwrap());

        epoch.advance();
        let mut table = ComponentTable::new(&SchemaRegistry::with_builtins());
        buffer.drain_into(&mut table);

        let err = buffer.stage_guarded(&guard, write(0, 2.0, 0)).unwrap_err();
        assert!(matches!(err, SimError::StaleHandle { .. }));
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn test_discard_clears_active_area() {
        let buffer = MutationBuffer::new();
        buffer.stage(write(0, 1.0, 0));
        buffer.stage(write(1, 1.0, 0));
        assert_eq!(buffer.discard(), 2);
        assert_eq!(buffer.pending(), 0);
        assert!(buffer.staged(EntityId::new(0), Position::ID).is_none());
    }

    #[test]
    fn test_concurrent_staging() {
        let buffer = MutationBuffer::new();
        std::thread::scope(|scope| {
            for t in 0..4u64 {
                let buffer = &buffer;
                scope.spawn(move || {
                    for i in 0..100u64 {
                        buffer.stage(write(t * 100 + i, 1.0, 0));
                    }
                });
            }
        });
        assert_eq!(buffer.pending(), 400);
    }
}
