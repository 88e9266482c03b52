//! End-to-end checks of tick visibility, authority and abort behaviour.

use std::sync::{Arc, Barrier, Mutex};

use strata_core::{
    Component, ComponentId, ComponentInstance, EntityId, EntityIterator, Layer, Persistence, Position,
    SchedulerState, SimError, SimResult, Simulation, SimulationConfig, StatusCode, SystemMarker,
    TickScheduler, TickSystem,
};

const MOVEMENT: &str = "movement";
const PHYSICS: &str = "physics";

fn scheduler() -> TickScheduler {
    TickScheduler::new(Simulation::new(SimulationConfig::default()).unwrap())
}

fn spawn(scheduler: &mut TickScheduler, layer: &str, position: Position) -> EntityId {
    let sim = scheduler.simulation_mut();
    let id = sim
        .create_entity(vec![ComponentInstance::of(&position, layer)])
        .unwrap();
    sim.apply_pending();
    id
}

/// Runs one tick of `body` for `layer`, seeking the iterator to `entity`.
fn tick_on<F>(scheduler: &mut TickScheduler, layer: &str, mut body: F) -> SimResult<()>
where
    F: FnMut(&mut EntityIterator) -> SimResult<()>,
{
    scheduler
        .step(layer, |entities: &mut EntityIterator, _: &mut (), _| body(entities), &mut ())
        .map(drop)
}

fn position_of(scheduler: &TickScheduler, entity: EntityId) -> Position {
    scheduler.simulation().snapshot().read(entity).unwrap()
}

#[test]
fn test_writes_are_invisible_until_next_tick() {
    let mut scheduler = scheduler();
    let id = spawn(&mut scheduler, MOVEMENT, Position::new(0.0, 0.0, 0.0));

    tick_on(&mut scheduler, MOVEMENT, |entities| {
        entities.update(&Position::new(5.0, 0.0, 0.0))?;
        // Read-your-writes is not a thing within a tick.
        assert_eq!(entities.get::<Position>()?, Position::new(0.0, 0.0, 0.0));
        entities.update(&Position::new(7.0, 0.0, 0.0))?;
        Ok(())
    })
    .unwrap();

    // Last write of the tick wins.
    assert_eq!(position_of(&scheduler, id), Position::new(7.0, 0.0, 0.0));
}

#[test]
fn test_created_entity_visible_next_tick() {
    let mut scheduler = scheduler();
    spawn(&mut scheduler, MOVEMENT, Position::default());

    let mut created = None;
    tick_on(&mut scheduler, MOVEMENT, |entities| {
        let id = entities.create_entity(vec![ComponentInstance::of(&Position::new(1.0, 1.0, 1.0), MOVEMENT)])?;
        created = Some(id);

        assert_eq!(entities.len(), 1);
        assert_eq!(entities.entity(id).get::<Position>().unwrap_err().status(), StatusCode::MissingComponent);
        assert_eq!(
            entities.entity(id).update(&Position::default()).unwrap_err().status(),
            StatusCode::InvalidArgument
        );
        assert_eq!(entities.entity(id).delete().unwrap_err().status(), StatusCode::InvalidArgument);
        Ok(())
    })
    .unwrap();

    let created = created.unwrap();
    tick_on(&mut scheduler, MOVEMENT, |entities| {
        assert_eq!(entities.len(), 2);
        assert_eq!(entities.entity(created).get::<Position>()?, Position::new(1.0, 1.0, 1.0));
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_deleted_entity_visible_for_rest_of_tick() {
    let mut scheduler = scheduler();
    let id = spawn(&mut scheduler, MOVEMENT, Position::new(2.0, 0.0, 0.0));

    tick_on(&mut scheduler, MOVEMENT, |entities| {
        entities.delete_entity()?;
        entities.delete_entity()?;
        assert_eq!(entities.get::<Position>()?, Position::new(2.0, 0.0, 0.0));
        Ok(())
    })
    .unwrap();

    let snapshot = scheduler.simulation().snapshot();
    assert!(!snapshot.directory().is_live(id));
    assert_eq!(snapshot.entity_count(), 0);

    // Deleting a non-live entity reports it out of range.
    spawn(&mut scheduler, MOVEMENT, Position::default());
    let err = tick_on(&mut scheduler, MOVEMENT, |entities| entities.entity(id).delete()).unwrap_err();
    match err {
        SimError::Aborted { cause, .. } => assert_eq!(*cause, SimError::NotFound(id)),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_authority_is_exclusive() {
    let mut scheduler = scheduler();
    let owned_by_physics = spawn(&mut scheduler, PHYSICS, Position::default());
    spawn(&mut scheduler, MOVEMENT, Position::default());

    tick_on(&mut scheduler, MOVEMENT, |entities| {
        let err = entities
            .entity(owned_by_physics)
            .update(&Position::new(9.0, 9.0, 9.0))
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NoWriteAccess);

        // Reads are not restricted.
        assert_eq!(entities.entity(owned_by_physics).get::<Position>()?, Position::default());
        Ok(())
    })
    .unwrap();

    assert_eq!(position_of(&scheduler, owned_by_physics), Position::default());
}

#[test]
fn test_writer_transfer_takes_effect_next_tick() {
    let mut scheduler = scheduler();
    let id = spawn(&mut scheduler, MOVEMENT, Position::default());

    tick_on(&mut scheduler, MOVEMENT, |entities| {
        entities.set_writer(Position::ID, PHYSICS)?;
        // Still the writer until the boundary.
        entities.update(&Position::new(1.0, 0.0, 0.0))?;
        Ok(())
    })
    .unwrap();

    assert_eq!(
        scheduler.simulation().snapshot().directory().writer(id, Position::ID).unwrap(),
        &Layer::new(PHYSICS)
    );

    tick_on(&mut scheduler, PHYSICS, |entities| {
        assert_eq!(entities.current()?, id);
        entities.update(&Position::new(2.0, 0.0, 0.0))
    })
    .unwrap();
    assert_eq!(position_of(&scheduler, id), Position::new(2.0, 0.0, 0.0));
}

#[test]
fn test_add_and_remove_components() {
    let mut scheduler = scheduler();
    let id = spawn(&mut scheduler, MOVEMENT, Position::default());

    tick_on(&mut scheduler, MOVEMENT, |entities| {
        entities.add_component(ComponentInstance::of(&Persistence::default(), MOVEMENT))?;
        let err = entities
            .add_component(ComponentInstance::of(&Persistence::default(), MOVEMENT))
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::AlreadyExists);
        Ok(())
    })
    .unwrap();
    assert!(scheduler.simulation().snapshot().table().contains(id, Persistence::ID));

    tick_on(&mut scheduler, MOVEMENT, |entities| entities.remove_component(Persistence::ID)).unwrap();
    assert!(!scheduler.simulation().snapshot().table().contains(id, Persistence::ID));
}

#[test]
fn test_size_validation_never_copies_partially() {
    let mut scheduler = scheduler();
    spawn(&mut scheduler, MOVEMENT, Position::new(1.0, 2.0, 3.0));

    tick_on(&mut scheduler, MOVEMENT, |entities| {
        let mut short = [0x55u8; 16];
        let err = entities.get_component(Position::ID, &mut short).unwrap_err();
        assert_eq!(err.status(), StatusCode::InvalidDataSize);
        assert!(short.iter().all(|b| *b == 0x55));

        let err = entities.update_component(Position::ID, &[0u8; 25]).unwrap_err();
        assert_eq!(err.status(), StatusCode::InvalidDataSize);

        let err = entities.get_component(ComponentId(4242), &mut short).unwrap_err();
        assert_eq!(err.status(), StatusCode::InvalidComponent);
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_abort_commits_nothing_and_is_final() {
    let mut scheduler = scheduler();
    let id = spawn(&mut scheduler, MOVEMENT, Position::default());

    let err = tick_on(&mut scheduler, MOVEMENT, |entities| {
        entities.update(&Position::new(3.0, 3.0, 3.0))?;
        entities.create_entity(Vec::new())?;
        entities.delete_entity()?;
        Err(SimError::Other("system failure".into()))
    })
    .unwrap_err();

    assert_eq!(err.status(), StatusCode::Abort);
    assert_eq!(scheduler.state(), SchedulerState::Aborted);

    let sim = scheduler.simulation();
    assert_eq!(sim.tick(), 0);
    assert_eq!(sim.entity_count(), 1);
    assert_eq!(sim.pending_changes(), 0);
    assert_eq!(position_of(&scheduler, id), Position::default());

    let again = tick_on(&mut scheduler, MOVEMENT, |_| Ok(())).unwrap_err();
    assert_eq!(again, SimError::SchedulerAborted);
    assert_eq!(again.status(), StatusCode::Abort);
}

#[test]
fn test_panicking_callback_aborts_without_commit() {
    let mut scheduler = scheduler();
    let id = spawn(&mut scheduler, MOVEMENT, Position::default());

    let err = tick_on(&mut scheduler, MOVEMENT, |entities| {
        entities.update(&Position::new(9.0, 9.0, 9.0))?;
        panic!("movement system bug");
    })
    .unwrap_err();

    assert_eq!(err.status(), StatusCode::Abort);
    assert!(matches!(err, SimError::Aborted { tick: 0, .. }));
    assert_eq!(scheduler.state(), SchedulerState::Aborted);

    // The write staged before the panic was dropped with the tick.
    let report = scheduler.simulation_mut().apply_pending();
    assert_eq!(report.writes_applied, 0);
    assert_eq!(position_of(&scheduler, id), Position::default());

    let again = tick_on(&mut scheduler, MOVEMENT, |_| Ok(())).unwrap_err();
    assert_eq!(again, SimError::SchedulerAborted);
}

#[test]
fn test_handles_go_stale_after_their_tick() {
    let mut scheduler = scheduler();
    spawn(&mut scheduler, MOVEMENT, Position::default());

    let mut kept = None;
    tick_on(&mut scheduler, MOVEMENT, |entities| {
        kept = Some(entities.clone());
        Ok(())
    })
    .unwrap();

    let kept = kept.unwrap();
    for err in [
        kept.is_finished().unwrap_err(),
        kept.current().unwrap_err(),
        kept.update(&Position::default()).unwrap_err(),
    ] {
        assert!(matches!(err, SimError::StaleHandle { .. }), "{err:?}");
        assert_eq!(err.status(), StatusCode::InvalidArgument);
    }
}

#[test]
fn test_iterator_copies_are_independent() {
    let mut scheduler = scheduler();
    spawn(&mut scheduler, MOVEMENT, Position::default());
    spawn(&mut scheduler, MOVEMENT, Position::default());

    tick_on(&mut scheduler, MOVEMENT, |entities| {
        let mut copy = entities.clone();
        copy.next_entity()?;
        assert_eq!(entities.current()?, EntityId::new(0));
        assert_eq!(copy.current()?, EntityId::new(1));
        Ok(())
    })
    .unwrap();
}

struct Mover {
    layer: &'static str,
    dx: f64,
}

impl TickSystem for Mover {
    fn layer(&self) -> Layer {
        Layer::new(self.layer)
    }

    fn tick(&mut self, entities: &mut EntityIterator, ticks_fired: u32) -> SimResult<()> {
        while !entities.is_finished()? {
            let mut position: Position = entities.get()?;
            position.coords.x += self.dx * f64::from(ticks_fired);
            entities.update(&position)?;
            entities.next_entity()?;
        }
        Ok(())
    }
}

#[test]
fn test_concurrent_layers_commute() {
    let config = SimulationConfig::default().with_max_ticks(3);
    let mut scheduler = TickScheduler::new(Simulation::new(config).unwrap());
    let a = spawn(&mut scheduler, MOVEMENT, Position::default());
    let b = spawn(&mut scheduler, PHYSICS, Position::default());

    let mut systems: Vec<Box<dyn TickSystem>> = vec![
        Box::new(Mover { layer: MOVEMENT, dx: 1.0 }),
        Box::new(Mover { layer: PHYSICS, dx: -2.0 }),
    ];
    let summary = scheduler.run_concurrent(&mut systems).unwrap();

    assert_eq!(summary.ticks, 3);
    assert_eq!(position_of(&scheduler, a), Position::new(3.0, 0.0, 0.0));
    assert_eq!(position_of(&scheduler, b), Position::new(-6.0, 0.0, 0.0));
}

/// Adds a `SystemMarker` for its layer, then lets the other system run.
struct MarkerAdder {
    barrier: Arc<Barrier>,
}

impl TickSystem for MarkerAdder {
    fn layer(&self) -> Layer {
        Layer::new(PHYSICS)
    }

    fn tick(&mut self, entities: &mut EntityIterator, _: u32) -> SimResult<()> {
        let added = entities.add_component(ComponentInstance::of(&SystemMarker::default(), PHYSICS));
        self.barrier.wait();
        added
    }
}

/// Waits for the adder, then tries to take over its pending component.
struct MarkerThief {
    barrier: Arc<Barrier>,
    outcome: Arc<Mutex<Vec<StatusCode>>>,
}

impl TickSystem for MarkerThief {
    fn layer(&self) -> Layer {
        Layer::new(MOVEMENT)
    }

    fn tick(&mut self, entities: &mut EntityIterator, _: u32) -> SimResult<()> {
        self.barrier.wait();
        let removed = entities.remove_component(SystemMarker::ID);
        let transferred = entities.set_writer(SystemMarker::ID, MOVEMENT);
        let mut outcome = self.outcome.lock().unwrap();
        for result in [removed, transferred] {
            outcome.push(result.map_or_else(|err| err.status(), |()| StatusCode::Success));
        }
        Ok(())
    }
}

#[test]
fn test_pending_addition_is_owned_by_adding_layer() {
    let mut scheduler = scheduler();
    let sim = scheduler.simulation_mut();
    let id = sim
        .create_entity(vec![
            ComponentInstance::of(&Position::default(), MOVEMENT),
            ComponentInstance::of(&Persistence::default(), PHYSICS),
        ])
        .unwrap();
    sim.apply_pending();

    let barrier = Arc::new(Barrier::new(2));
    let outcome = Arc::new(Mutex::new(Vec::new()));
    let mut systems: Vec<Box<dyn TickSystem>> = vec![
        Box::new(MarkerAdder {
            barrier: Arc::clone(&barrier),
        }),
        Box::new(MarkerThief {
            barrier,
            outcome: Arc::clone(&outcome),
        }),
    ];
    scheduler.step_concurrent(&mut systems).unwrap();

    assert_eq!(
        *outcome.lock().unwrap(),
        vec![StatusCode::NoWriteAccess, StatusCode::MissingComponent]
    );
    let snapshot = scheduler.simulation().snapshot();
    assert!(snapshot.table().contains(id, SystemMarker::ID));
    assert_eq!(
        snapshot.directory().writer(id, SystemMarker::ID).unwrap(),
        &Layer::new(PHYSICS)
    );
}
