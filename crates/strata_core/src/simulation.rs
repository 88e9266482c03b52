//! # Simulation
//!
//! One [`Simulation`] owns one world: the committed snapshot, the mutation
//! buffer, the pending-change log and the handle epoch. There is no global
//! state; a process may run several simulations side by side.
//!
//! ## Tick Boundary
//!
//! ```text
//! begin_tick:   share the frozen snapshot with the tick's handles
//! commit_tick:  advance epoch (stales every handle of the tick)
//!               → drain writes → replay structural changes
//!               → rebuild spatial index → tick += 1
//! discard_tick: drop writes and changes → advance epoch
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::SimulationConfig;
use crate::ecs::{ChangeLog, ComponentInstance, EntityId, Layer, ReplayStats, SchemaRegistry};
use crate::error::SimResult;
use crate::log::{send_log_message, LogLevel};
use crate::scheduler::TickContext;
use crate::snapshot::Snapshot;
use crate::spatial::{Constraint, Query};
use crate::sync::{MutationBuffer, TickEpoch};

/// What a tick boundary applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Tick that was closed.
    pub tick: u64,
    /// Component writes applied.
    pub writes_applied: usize,
    /// Structural changes applied.
    pub replay: ReplayStats,
}

/// A tick-synchronized entity-component world.
#[derive(Debug)]
pub struct Simulation {
    config: SimulationConfig,
    committed: Arc<Snapshot>,
    mutations: Arc<MutationBuffer>,
    changes: Arc<Mutex<ChangeLog>>,
    epoch: Arc<TickEpoch>,
}

impl Simulation {
    /// Creates an empty simulation.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration does not validate.
    pub fn new(config: SimulationConfig) -> SimResult<Self> {
        config.validate()?;
        let schema = Arc::new(config.schema()?);
        debug!(
            components = schema.len(),
            max_entities = config.max_entities,
            cell_size = config.spatial_cell_size,
            "Simulation created"
        );
        Ok(Self {
            committed: Arc::new(Snapshot::new(schema, config.spatial_cell_size)),
            mutations: Arc::new(MutationBuffer::new()),
            changes: Arc::new(Mutex::new(ChangeLog::new(config.max_entities))),
            epoch: TickEpoch::new(),
            config,
        })
    }

    /// Active configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Number of committed ticks.
    #[inline]
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.committed.tick
    }

    /// Registered component layouts.
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &SchemaRegistry {
        &self.committed.schema
    }

    /// Shares the committed snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.committed)
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.committed.directory.len()
    }

    /// Number of structural changes waiting for the next boundary.
    #[must_use]
    pub fn pending_changes(&self) -> usize {
        self.changes.lock().len()
    }

    /// Stages creation of an entity from outside any tick.
    ///
    /// The entity becomes visible at the next boundary, or when
    /// [`Simulation::apply_pending`] runs.
    ///
    /// # Errors
    ///
    /// See [`ChangeLog::stage_create`].
    pub fn create_entity(&self, components: Vec<ComponentInstance>) -> SimResult<EntityId> {
        self.changes
            .lock()
            .stage_create(&self.committed.directory, &self.committed.schema, components)
    }

    /// Applies staged writes and structural changes without advancing the
    /// tick counter. Outstanding handles become stale.
    pub fn apply_pending(&mut self) -> CommitReport {
        let report = self.apply(self.committed.tick);
        self.epoch.advance();
        report
    }

    /// Runs a query against the committed snapshot.
    ///
    /// Relative constraints have no reference entity here and are rejected.
    ///
    /// # Errors
    ///
    /// See [`Constraint`] resolution errors.
    pub fn query(&self, constraint: &Constraint) -> SimResult<Query> {
        Query::new(Arc::clone(&self.committed), self.epoch.guard(), constraint, None)
    }

    /// Emits a message on the logging side channel.
    pub fn log(&self, layer: &Layer, level: LogLevel, message: &str) {
        send_log_message(layer, level, message);
    }

    /// Freezes committed state for a new tick.
    ///
    /// The spatial index was rebuilt when the state was last committed.
    pub(crate) fn begin_tick(&self) -> Arc<TickContext> {
        let snapshot = &self.committed;
        trace!(
            tick = snapshot.tick,
            entities = snapshot.directory.len(),
            indexed = snapshot.spatial.len(),
            "Snapshot built"
        );
        Arc::new(TickContext {
            snapshot: Arc::clone(&self.committed),
            mutations: Arc::clone(&self.mutations),
            changes: Arc::clone(&self.changes),
            guard: self.epoch.guard(),
            max_entities: self.config.max_entities,
        })
    }

    /// Commits the open tick.
    pub(crate) fn commit_tick(&mut self) -> CommitReport {
        self.epoch.advance();
        let tick = self.committed.tick;
        let report = self.apply(tick);
        Arc::make_mut(&mut self.committed).tick = tick + 1;
        report
    }

    /// Drops everything staged during the open tick.
    pub(crate) fn discard_tick(&mut self) {
        self.epoch.advance();
        let writes = self.mutations.discard();
        let mut changes = self.changes.lock();
        let structural = changes.len();
        changes.discard();
        debug!(writes, structural, "Tick discarded");
    }

    fn apply(&mut self, tick: u64) -> CommitReport {
        let snapshot = Arc::make_mut(&mut self.committed);
        // Writes drain before the structural replay.
        let writes_applied = self.mutations.drain_into(&mut snapshot.table);
        let replay = self
            .changes
            .lock()
            .replay(&mut snapshot.directory, &mut snapshot.table);
        snapshot.rebuild_spatial();
        debug!(
            tick,
            writes_applied,
            created = replay.created,
            component_ops = replay.component_ops,
            deleted = replay.deleted,
            "Tick committed"
        );
        CommitReport {
            tick,
            writes_applied,
            replay,
        }
    }
}
