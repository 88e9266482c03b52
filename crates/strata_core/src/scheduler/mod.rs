//! # Tick Scheduler
//!
//! Drives the update loop of a [`Simulation`].
//!
//! ## State Machine
//!
//! ```text
//!        ┌──────────────────────────────────────────────────────┐
//!        ▼                                                      │
//!      Idle ──► BuildingSnapshot ──► RunningCallback ──► Committing
//!        │                                 │
//!        │ limit / stop                    │ callback error
//!        ▼                                 ▼
//!     Finished                          Aborted (terminal)
//! ```
//!
//! Each tick every participating layer's callback runs exactly once with
//! a fresh [`EntityIterator`]. Layers may run concurrently on scoped
//! threads; they all read the same snapshot and their writes commute
//! because authority over each component is exclusive.

mod clock;
mod iterator;

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::ecs::{Layer, ReplayStats};
use crate::error::{SimError, SimResult};
use crate::simulation::Simulation;

pub use clock::{TickClock, TickStats};
pub use iterator::{EntityCommands, EntityIterator};
pub(crate) use iterator::TickContext;

/// Phase of the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    /// Between ticks.
    Idle,
    /// Freezing committed state for the next tick.
    BuildingSnapshot,
    /// Tick callbacks are running.
    RunningCallback,
    /// Applying the tick's writes and structural changes.
    Committing,
    /// The tick limit was reached or a stop was requested.
    Finished,
    /// A callback failed. Terminal.
    Aborted,
}

/// A system driven by [`TickScheduler::run_concurrent`].
pub trait TickSystem: Send {
    /// Layer the system acts for.
    fn layer(&self) -> Layer;

    /// Runs one tick.
    ///
    /// # Errors
    ///
    /// Any error aborts the simulation.
    fn tick(&mut self, entities: &mut EntityIterator, ticks_fired: u32) -> SimResult<()>;
}

/// Requests a running scheduler to finish after the current tick.
///
/// Cheap to clone; every clone controls the same scheduler.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Requests a stop.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns `true` once a stop was requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Withdraws a stop request.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Outcome of one committed tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickReport {
    /// Tick that was committed.
    pub tick: u64,
    /// Intervals reported to the callbacks.
    pub ticks_fired: u32,
    /// Component writes applied.
    pub writes_applied: usize,
    /// Structural changes applied.
    pub replay: ReplayStats,
    /// Wall time spent in the tick.
    pub duration: Duration,
}

/// Outcome of a completed run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// Ticks committed by this run.
    pub ticks: u64,
    /// Committed tick count after the run.
    pub final_tick: u64,
    /// Whether the run ended through a [`StopHandle`].
    pub stopped: bool,
    /// Tick timing statistics.
    pub stats: TickStats,
}

/// Runs ticks of one simulation.
#[derive(Debug)]
pub struct TickScheduler {
    sim: Simulation,
    state: SchedulerState,
    clock: TickClock,
    stop: StopHandle,
}

impl TickScheduler {
    /// Creates a scheduler paced by the simulation's configuration.
    #[must_use]
    pub fn new(sim: Simulation) -> Self {
        let config = sim.config();
        let clock = TickClock::new(config.tick_rate_hz, config.realtime);
        Self {
            sim,
            state: SchedulerState::Idle,
            clock,
            stop: StopHandle::default(),
        }
    }

    /// Current phase.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        self.state
    }

    /// The driven simulation.
    #[inline]
    #[must_use]
    pub const fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// Mutable access to the driven simulation, between runs.
    #[inline]
    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.sim
    }

    /// Releases the simulation.
    #[must_use]
    pub fn into_simulation(self) -> Simulation {
        self.sim
    }

    /// Handle for stopping a run from inside a callback or another thread.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Tick timing statistics.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        self.clock.stats()
    }

    fn ensure_runnable(&self) -> SimResult<()> {
        if self.state == SchedulerState::Aborted {
            return Err(SimError::SchedulerAborted);
        }
        Ok(())
    }

    fn limit_reached(&self) -> bool {
        self.sim
            .config()
            .max_ticks
            .is_some_and(|max| self.sim.tick() >= max)
    }

    /// Runs `callback` for `layer` until the tick limit is reached, a stop
    /// is requested, or the callback fails.
    ///
    /// Entities created before the run become visible to the first tick.
    ///
    /// # Errors
    ///
    /// `Aborted` wrapping the callback's error; `SchedulerAborted` if an
    /// earlier run was aborted.
    pub fn run<C, F>(&mut self, layer: impl Into<Layer>, mut callback: F, context: &mut C) -> SimResult<RunSummary>
    where
        F: FnMut(&mut EntityIterator, &mut C, u32) -> SimResult<()>,
    {
        let layer = layer.into();
        info!(layer = %layer, tick = self.sim.tick(), "Simulation run started");
        self.drive(|scheduler, ticks_fired| scheduler.step_layer(&layer, &mut callback, context, ticks_fired))
    }

    /// Runs every system concurrently, one scoped thread per layer, until
    /// the tick limit is reached, a stop is requested, or a system fails.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if two systems share a layer, otherwise as
    /// [`TickScheduler::run`].
    pub fn run_concurrent(&mut self, systems: &mut [Box<dyn TickSystem>]) -> SimResult<RunSummary> {
        check_distinct_layers(systems)?;
        info!(systems = systems.len(), tick = self.sim.tick(), "Concurrent simulation run started");
        self.drive(|scheduler, ticks_fired| scheduler.step_systems(systems, ticks_fired))
    }

    fn drive<F>(&mut self, mut tick: F) -> SimResult<RunSummary>
    where
        F: FnMut(&mut Self, u32) -> SimResult<TickReport>,
    {
        self.ensure_runnable()?;
        let start_tick = self.sim.tick();
        if !self.limit_reached() {
            self.sim.apply_pending();
            self.clock.reset();
        }

        while !self.limit_reached() && !self.stop.is_stopped() {
            let ticks_fired = self.clock.wait_for_tick();
            tick(self, ticks_fired)?;
        }

        self.state = SchedulerState::Finished;
        let summary = RunSummary {
            ticks: self.sim.tick() - start_tick,
            final_tick: self.sim.tick(),
            stopped: self.stop.is_stopped(),
            stats: *self.clock.stats(),
        };
        info!(
            ticks = summary.ticks,
            final_tick = summary.final_tick,
            stopped = summary.stopped,
            late_ticks = summary.stats.late_ticks,
            "Simulation run finished"
        );
        Ok(summary)
    }

    /// Runs a single tick of `callback` for `layer`, with `ticks_fired = 1`.
    ///
    /// Stepping is driven by the caller and is not bounded by `max_ticks`,
    /// which only ends [`TickScheduler::run`]. A step after a finished run
    /// returns the scheduler to `Idle`.
    ///
    /// # Errors
    ///
    /// As [`TickScheduler::run`].
    pub fn step<C, F>(&mut self, layer: impl Into<Layer>, mut callback: F, context: &mut C) -> SimResult<TickReport>
    where
        F: FnMut(&mut EntityIterator, &mut C, u32) -> SimResult<()>,
    {
        self.ensure_runnable()?;
        self.step_layer(&layer.into(), &mut callback, context, 1)
    }

    /// Runs a single tick of every system concurrently. Like
    /// [`TickScheduler::step`], it is not bounded by `max_ticks`.
    ///
    /// # Errors
    ///
    /// As [`TickScheduler::run_concurrent`].
    pub fn step_concurrent(&mut self, systems: &mut [Box<dyn TickSystem>]) -> SimResult<TickReport> {
        self.ensure_runnable()?;
        check_distinct_layers(systems)?;
        self.step_systems(systems, 1)
    }

    fn step_layer<C, F>(&mut self, layer: &Layer, callback: &mut F, context: &mut C, ticks_fired: u32) -> SimResult<TickReport>
    where
        F: FnMut(&mut EntityIterator, &mut C, u32) -> SimResult<()>,
    {
        self.execute(ticks_fired, |tick_context| {
            let mut entities = EntityIterator::new(Arc::clone(tick_context), layer.clone());
            callback(&mut entities, context, ticks_fired)
        })
    }

    fn step_systems(&mut self, systems: &mut [Box<dyn TickSystem>], ticks_fired: u32) -> SimResult<TickReport> {
        self.execute(ticks_fired, |tick_context| {
            std::thread::scope(|scope| {
                let handles: Vec<_> = systems
                    .iter_mut()
                    .map(|system| {
                        let mut entities = EntityIterator::new(Arc::clone(tick_context), system.layer());
                        scope.spawn(move || system.tick(&mut entities, ticks_fired))
                    })
                    .collect();

                let mut outcome = Ok(());
                for handle in handles {
                    let result = handle.join().unwrap_or_else(|_| Err(panicked()));
                    if outcome.is_ok() {
                        outcome = result;
                    }
                }
                outcome
            })
        })
    }

    fn execute<F>(&mut self, ticks_fired: u32, invoke: F) -> SimResult<TickReport>
    where
        F: FnOnce(&Arc<TickContext>) -> SimResult<()>,
    {
        let started = self.clock.begin_tick();
        let tick = self.sim.tick();

        self.state = SchedulerState::BuildingSnapshot;
        let tick_context = self.sim.begin_tick();

        self.state = SchedulerState::RunningCallback;
        debug!(tick, ticks_fired, "Running tick callbacks");
        // A panicking callback aborts the tick like an error does.
        let result =
            panic::catch_unwind(AssertUnwindSafe(|| invoke(&tick_context))).unwrap_or_else(|_| Err(panicked()));
        drop(tick_context);

        if let Err(cause) = result {
            self.sim.discard_tick();
            self.state = SchedulerState::Aborted;
            warn!(tick, error = %cause, "Tick callback failed, simulation aborted");
            return Err(SimError::Aborted {
                tick,
                cause: Box::new(cause),
            });
        }

        self.state = SchedulerState::Committing;
        let commit = self.sim.commit_tick();
        self.state = SchedulerState::Idle;

        let duration = self.clock.end_tick(started);
        Ok(TickReport {
            tick,
            ticks_fired,
            writes_applied: commit.writes_applied,
            replay: commit.replay,
            duration,
        })
    }
}

fn panicked() -> SimError {
    SimError::Other("tick system panicked".into())
}

fn check_distinct_layers(systems: &[Box<dyn TickSystem>]) -> SimResult<()> {
    let mut seen = HashSet::new();
    for system in systems {
        let layer = system.layer();
        if !seen.insert(layer.clone()) {
            return Err(SimError::InvalidArgument(format!(
                "layer `{layer}` is driven by more than one system"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::ecs::{ComponentInstance, EntityId, Position};
    use crate::error::StatusCode;

    fn scheduler(max_ticks: u64) -> TickScheduler {
        let sim = Simulation::new(SimulationConfig::default().with_max_ticks(max_ticks)).unwrap();
        TickScheduler::new(sim)
    }

    fn spawn(scheduler: &TickScheduler, layer: &str) {
        scheduler
            .simulation()
            .create_entity(vec![ComponentInstance::of(&Position::default(), layer)])
            .unwrap();
    }

    #[test]
    fn test_run_stops_at_limit() {
        let mut scheduler = scheduler(3);
        let mut calls = Vec::new();
        let summary = scheduler
            .run(
                "movement",
                |entities: &mut EntityIterator, calls: &mut Vec<(u64, u32)>, fired| {
                    calls.push((entities.tick(), fired));
                    Ok(())
                },
                &mut calls,
            )
            .unwrap();

        assert_eq!(calls, vec![(0, 1), (1, 1), (2, 1)]);
        assert_eq!(summary.ticks, 3);
        assert_eq!(summary.final_tick, 3);
        assert!(!summary.stopped);
        assert_eq!(scheduler.state(), SchedulerState::Finished);
    }

    #[test]
    fn test_run_after_finish_returns_immediately() {
        let mut scheduler = scheduler(1);
        let mut calls = 0u32;
        let callback = |_: &mut EntityIterator, calls: &mut u32, _: u32| -> SimResult<()> {
            *calls += 1;
            Ok(())
        };
        scheduler.run("movement", callback, &mut calls).unwrap();
        let summary = scheduler.run("movement", callback, &mut calls).unwrap();
        assert_eq!(calls, 1);
        assert_eq!(summary.ticks, 0);
    }

    #[test]
    fn test_step_is_not_bounded_by_limit() {
        let mut scheduler = scheduler(1);
        let mut calls = 0u32;
        let callback = |_: &mut EntityIterator, calls: &mut u32, _: u32| -> SimResult<()> {
            *calls += 1;
            Ok(())
        };
        scheduler.run("movement", callback, &mut calls).unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Finished);

        let report = scheduler.step("movement", callback, &mut calls).unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(calls, 2);
        assert_eq!(scheduler.simulation().tick(), 2);
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        // The limit still ends any later run at once.
        let summary = scheduler.run("movement", callback, &mut calls).unwrap();
        assert_eq!(summary.ticks, 0);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_stop_handle_ends_run() {
        let mut scheduler = scheduler(u64::MAX);
        let stop = scheduler.stop_handle();
        let mut calls = 0u32;
        let summary = scheduler
            .run(
                "movement",
                move |_: &mut EntityIterator, calls: &mut u32, _| {
                    *calls += 1;
                    if *calls == 5 {
                        stop.stop();
                    }
                    Ok(())
                },
                &mut calls,
            )
            .unwrap();

        assert_eq!(calls, 5);
        assert!(summary.stopped);
        assert_eq!(summary.final_tick, 5);
    }

    #[test]
    fn test_callback_error_aborts() {
        let mut scheduler = scheduler(10);
        spawn(&scheduler, "movement");
        let mut unit = ();

        let err = scheduler
            .run(
                "movement",
                |entities: &mut EntityIterator, _: &mut (), _| {
                    if entities.tick() == 2 {
                        return Err(SimError::Other("boom".into()));
                    }
                    Ok(())
                },
                &mut unit,
            )
            .unwrap_err();

        assert_eq!(err.status(), StatusCode::Abort);
        assert!(matches!(err, SimError::Aborted { tick: 2, .. }));
        assert_eq!(scheduler.state(), SchedulerState::Aborted);
        assert_eq!(scheduler.simulation().tick(), 2);

        let again = scheduler
            .run("movement", |_: &mut EntityIterator, _: &mut (), _| Ok(()), &mut unit)
            .unwrap_err();
        assert_eq!(again, SimError::SchedulerAborted);
    }

    #[test]
    fn test_iterator_visits_owned_entities() {
        let mut scheduler = scheduler(1);
        spawn(&scheduler, "movement");
        spawn(&scheduler, "physics");
        spawn(&scheduler, "movement");
        scheduler.simulation_mut().apply_pending();

        let mut seen = Vec::new();
        scheduler
            .step(
                "movement",
                |entities: &mut EntityIterator, seen: &mut Vec<u64>, _| {
                    while !entities.is_finished()? {
                        seen.push(entities.current()?.index());
                        entities.next_entity()?;
                    }
                    assert_eq!(
                        entities.next_entity().unwrap_err(),
                        SimError::IterationAlreadyCompleted
                    );
                    Ok(())
                },
                &mut seen,
            )
            .unwrap();
        assert_eq!(seen, vec![0, 2]);
    }

    struct Counter {
        layer: &'static str,
        visited: usize,
    }

    impl TickSystem for Counter {
        fn layer(&self) -> Layer {
            Layer::new(self.layer)
        }

        fn tick(&mut self, entities: &mut EntityIterator, _: u32) -> SimResult<()> {
            self.visited += entities.len();
            Ok(())
        }
    }

    #[test]
    fn test_concurrent_layers_tick_once_each() {
        let mut scheduler = scheduler(2);
        spawn(&scheduler, "movement");
        spawn(&scheduler, "physics");
        spawn(&scheduler, "physics");

        let mut systems: Vec<Box<dyn TickSystem>> = vec![
            Box::new(Counter { layer: "movement", visited: 0 }),
            Box::new(Counter { layer: "physics", visited: 0 }),
        ];
        let summary = scheduler.run_concurrent(&mut systems).unwrap();
        assert_eq!(summary.ticks, 2);
        assert_eq!(scheduler.simulation().snapshot().entity_count(), 3);
    }

    #[test]
    fn test_concurrent_rejects_duplicate_layers() {
        let mut scheduler = scheduler(1);
        let mut systems: Vec<Box<dyn TickSystem>> = vec![
            Box::new(Counter { layer: "movement", visited: 0 }),
            Box::new(Counter { layer: "movement", visited: 0 }),
        ];
        let err = scheduler.step_concurrent(&mut systems).unwrap_err();
        assert_eq!(err.status(), StatusCode::InvalidArgument);
    }

    #[test]
    fn test_step_reports_commit() {
        let mut scheduler = scheduler(10);
        spawn(&scheduler, "movement");
        scheduler.simulation_mut().apply_pending();

        let mut unit = ();
        let report = scheduler
            .step(
                "movement",
                |entities: &mut EntityIterator, _: &mut (), _| {
                    entities.update(&Position::new(1.0, 0.0, 0.0))?;
                    entities.create_entity(Vec::new())?;
                    Ok(())
                },
                &mut unit,
            )
            .unwrap();

        assert_eq!(report.tick, 0);
        assert_eq!(report.ticks_fired, 1);
        assert_eq!(report.writes_applied, 1);
        assert_eq!(report.replay.created, 1);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        let pos: Position = scheduler
            .simulation()
            .snapshot()
            .read(EntityId::new(0))
            .unwrap();
        assert_eq!(pos, Position::new(1.0, 0.0, 0.0));
    }
}
