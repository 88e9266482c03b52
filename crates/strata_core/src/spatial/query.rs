//! # Spatial Queries
//!
//! A [`Query`] is a forward-only cursor over the entities matching a
//! constraint in one tick's snapshot. Candidate entities are gathered when
//! the query is created; each candidate is tested exactly when the cursor
//! reaches it.
//!
//! ```rust,ignore
//! let mut query = iter.query(&Constraint::RelativeSphere { radius: 5.0 })?;
//! while !query.is_finished()? {
//!     let neighbour: Position = query.read()?;
//!     query.next_entity()?;
//! }
//! ```

use std::sync::Arc;

use super::constraint::{Constraint, ResolvedConstraint};
use crate::ecs::{Component, ComponentId, EntityId};
use crate::error::{SimError, SimResult};
use crate::snapshot::Snapshot;
use crate::sync::HandleGuard;

/// Tick-scoped cursor over the matches of a constraint.
///
/// Queries never observe writes issued during the tick they were created
/// in, and become stale once that tick ends.
#[derive(Clone, Debug)]
pub struct Query {
    snapshot: Arc<Snapshot>,
    guard: HandleGuard,
    constraint: ResolvedConstraint,
    candidates: Vec<EntityId>,
    /// Next candidate to test.
    cursor: usize,
    current: Option<EntityId>,
    /// Set once a stale access has been reported through `Iterator`.
    poisoned: bool,
}

impl Query {
    /// Creates a query pointing at its first match.
    pub(crate) fn new(
        snapshot: Arc<Snapshot>,
        guard: HandleGuard,
        constraint: &Constraint,
        anchor: Option<EntityId>,
    ) -> SimResult<Self> {
        guard.check()?;
        let resolved = constraint.resolve(&snapshot.directory, &snapshot.table, anchor)?;
        let candidates = plan(&snapshot, &resolved);
        let mut query = Self {
            snapshot,
            guard,
            constraint: resolved,
            candidates,
            cursor: 0,
            current: None,
            poisoned: false,
        };
        query.advance();
        Ok(query)
    }

    fn advance(&mut self) {
        self.current = None;
        while let Some(&entity) = self.candidates.get(self.cursor) {
            self.cursor += 1;
            let position = self.snapshot.spatial.position_of(entity);
            if self.constraint.matches(entity, position, &self.snapshot.table) {
                self.current = Some(entity);
                return;
            }
        }
    }

    /// Returns `true` once every match has been visited.
    ///
    /// # Errors
    ///
    /// `StaleHandle` after the tick has ended.
    pub fn is_finished(&self) -> SimResult<bool> {
        self.guard.check()?;
        Ok(self.current.is_none())
    }

    /// The current match.
    ///
    /// # Errors
    ///
    /// `StaleHandle` after the tick, `IterationAlreadyCompleted` when finished.
    pub fn current(&self) -> SimResult<EntityId> {
        self.guard.check()?;
        self.current.ok_or(SimError::IterationAlreadyCompleted)
    }

    /// Moves to the next match.
    ///
    /// # Errors
    ///
    /// `StaleHandle` after the tick, `IterationAlreadyCompleted` if the
    /// query was already finished.
    pub fn next_entity(&mut self) -> SimResult<()> {
        self.current()?;
        self.advance();
        Ok(())
    }

    /// Copies a committed component of the current match into `out`.
    ///
    /// # Errors
    ///
    /// As [`Query::current`], plus the [`crate::ecs::ComponentTable::get`] errors.
    pub fn get_component(&self, component: ComponentId, out: &mut [u8]) -> SimResult<()> {
        let entity = self.current()?;
        self.snapshot.table.get(entity, component, out)
    }

    /// Reads a typed component of the current match.
    ///
    /// # Errors
    ///
    /// See [`Query::get_component`].
    pub fn read<C: Component>(&self) -> SimResult<C> {
        let entity = self.current()?;
        self.snapshot.table.read(entity)
    }
}

/// Yields the current match, then advances.
impl Iterator for Query {
    type Item = SimResult<EntityId>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.poisoned {
            return None;
        }
        if let Err(err) = self.guard.check() {
            self.poisoned = true;
            return Some(Err(err));
        }
        let entity = self.current?;
        self.advance();
        Some(Ok(entity))
    }
}

/// Superset of the matches of `constraint`, without duplicates.
fn plan(snapshot: &Snapshot, constraint: &ResolvedConstraint) -> Vec<EntityId> {
    if let Some(bounds) = constraint.bounds() {
        return snapshot.spatial.candidates(bounds);
    }
    match constraint {
        ResolvedConstraint::Entity(entity) => {
            if snapshot.directory.is_live(*entity) {
                vec![*entity]
            } else {
                Vec::new()
            }
        }
        ResolvedConstraint::Component(component) => {
            let mut entities: Vec<EntityId> = snapshot
                .table
                .column(*component)
                .map(|column| column.entities().collect())
                .unwrap_or_default();
            entities.sort_unstable();
            entities
        }
        ResolvedConstraint::And(children) => children
            .iter()
            .map(|child| plan(snapshot, child))
            .min_by_key(Vec::len)
            .unwrap_or_default(),
        ResolvedConstraint::Or(children) => {
            let mut entities: Vec<EntityId> = children.iter().flat_map(|child| plan(snapshot, child)).collect();
            entities.sort_unstable();
            entities.dedup();
            entities
        }
        ResolvedConstraint::Sphere { .. } | ResolvedConstraint::Box { .. } | ResolvedConstraint::Cylinder { .. } => {
            Vec::new()
        }
    }
}
