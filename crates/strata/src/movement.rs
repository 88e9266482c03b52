//! # Movement System
//!
//! A small flocking demo. Every entity owned by [`MOVEMENT_LAYER`] carries
//! a [`Position`], a [`Velocity`] and an [`Acceleration`]. Each tick an
//! entity looks up its neighbours with a relative sphere query, steers
//! toward their centroid and moves by `velocity * ticks_fired`.
//!
//! All reads see the committed snapshot, so the order in which entities are
//! visited never changes the outcome of a tick.

use bytemuck::{Pod, Zeroable};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use strata_core::{
    Component, ComponentId, ComponentInstance, Constraint, Coordinates, EntityId, EntityIterator, Layer,
    LogLevel, Position, SimResult, Simulation, SimulationConfig, TickSystem,
};

/// Layer that authors every movement component.
pub const MOVEMENT_LAYER: &str = "movement_layer";

/// Distance between neighbouring entities in the spawn grid.
pub const SPAWN_SPACING: f64 = 2.0;

/// Radius of the neighbourhood an entity steers by.
pub const NEIGHBOUR_RADIUS: f64 = 3.0;

/// Fraction of the distance to the neighbour centroid applied per tick.
pub const STEERING: f64 = 0.05;

/// Speed limit in units per tick.
pub const MAX_SPEED: f64 = 1.0;

/// Velocity in units per tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Velocity {
    /// Per-axis velocity.
    pub linear: Coordinates,
}

impl Component for Velocity {
    const ID: ComponentId = ComponentId(1000);
    const NAME: &'static str = "Velocity";
}

/// Steering applied to the velocity on the last tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Acceleration {
    /// Per-axis acceleration.
    pub linear: Coordinates,
}

impl Component for Acceleration {
    const ID: ComponentId = ComponentId(1001);
    const NAME: &'static str = "Acceleration";
}

/// Adds the movement schemas to `config` unless it already declares them.
#[must_use]
pub fn register_components(mut config: SimulationConfig) -> SimulationConfig {
    if !config.components.iter().any(|c| c.id == Velocity::ID.0) {
        config = config.with_component::<Velocity>();
    }
    if !config.components.iter().any(|c| c.id == Acceleration::ID.0) {
        config = config.with_component::<Acceleration>();
    }
    config
}

/// Stages `count` entities on a square grid in the XZ plane with seeded
/// random horizontal velocities.
///
/// The entities become visible at the next boundary.
///
/// # Errors
///
/// Propagates creation failures, e.g. `OutOfMemory` past `max_entities`.
pub fn populate(sim: &Simulation, count: usize, seed: u64) -> SimResult<Vec<EntityId>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let side = grid_side(count);
    let mut ids = Vec::with_capacity(count);

    for index in 0..count {
        let (row, column) = (index / side, index % side);
        let position = Position::new(grid_coord(column), 0.0, grid_coord(row));
        let velocity = Velocity {
            linear: Coordinates::new(
                rng.gen_range(-MAX_SPEED..=MAX_SPEED),
                0.0,
                rng.gen_range(-MAX_SPEED..=MAX_SPEED),
            ),
        };
        ids.push(sim.create_entity(vec![
            ComponentInstance::of(&position, MOVEMENT_LAYER),
            ComponentInstance::of(&velocity, MOVEMENT_LAYER),
            ComponentInstance::of(&Acceleration::default(), MOVEMENT_LAYER),
        ])?);
    }
    Ok(ids)
}

fn grid_side(count: usize) -> usize {
    let mut side = 1;
    while side * side < count {
        side += 1;
    }
    side
}

#[allow(clippy::cast_precision_loss)]
fn grid_coord(cell: usize) -> f64 {
    cell as f64 * SPAWN_SPACING
}

/// Flocking movement for [`MOVEMENT_LAYER`].
#[derive(Clone, Debug)]
pub struct MovementSystem {
    radius: f64,
    steering: f64,
    moved: u64,
}

impl Default for MovementSystem {
    fn default() -> Self {
        Self::new(NEIGHBOUR_RADIUS, STEERING)
    }
}

impl MovementSystem {
    /// Creates a system with the given neighbourhood radius and steering gain.
    #[must_use]
    pub const fn new(radius: f64, steering: f64) -> Self {
        Self {
            radius,
            steering,
            moved: 0,
        }
    }

    /// Entity updates staged so far.
    #[must_use]
    pub const fn moved(&self) -> u64 {
        self.moved
    }

    /// Moves every entity of the iterator once.
    ///
    /// # Errors
    ///
    /// Any runtime error; the scheduler aborts on it.
    pub fn tick(&mut self, entities: &mut EntityIterator, ticks_fired: u32) -> SimResult<()> {
        let neighbourhood = Constraint::RelativeSphere { radius: self.radius };
        while !entities.is_finished()? {
            self.move_current(entities, &neighbourhood, f64::from(ticks_fired))?;
            entities.next_entity()?;
        }
        entities.log(LogLevel::Debug, &format!("moved {} entities", entities.len()));
        Ok(())
    }

    fn move_current(&mut self, entities: &EntityIterator, neighbourhood: &Constraint, ticks: f64) -> SimResult<()> {
        let me = entities.current()?;
        let position: Position = entities.get()?;
        let velocity: Velocity = entities.get()?;

        let mut sum = Coordinates::ORIGIN;
        let mut neighbours = 0u32;
        for found in entities.query(neighbourhood)? {
            let other = found?;
            if other == me {
                continue;
            }
            let p: Position = entities.entity(other).get()?;
            sum = add(sum, p.coords);
            neighbours += 1;
        }

        let acceleration = if neighbours == 0 {
            Coordinates::ORIGIN
        } else {
            let centroid = scale(sum, 1.0 / f64::from(neighbours));
            scale(sub(centroid, position.coords), self.steering)
        };
        let linear = clamp_speed(add(velocity.linear, acceleration), MAX_SPEED);
        let moved = add(position.coords, scale(linear, ticks));

        entities.update(&Position { coords: moved })?;
        entities.update(&Velocity { linear })?;
        entities.update(&Acceleration { linear: acceleration })?;
        self.moved += 1;
        Ok(())
    }
}

impl TickSystem for MovementSystem {
    fn layer(&self) -> Layer {
        Layer::new(MOVEMENT_LAYER)
    }

    fn tick(&mut self, entities: &mut EntityIterator, ticks_fired: u32) -> SimResult<()> {
        Self::tick(self, entities, ticks_fired)
    }
}

fn add(a: Coordinates, b: Coordinates) -> Coordinates {
    Coordinates::new(a.x + b.x, a.y + b.y, a.z + b.z)
}

fn sub(a: Coordinates, b: Coordinates) -> Coordinates {
    Coordinates::new(a.x - b.x, a.y - b.y, a.z - b.z)
}

fn scale(a: Coordinates, factor: f64) -> Coordinates {
    Coordinates::new(a.x * factor, a.y * factor, a.z * factor)
}

fn clamp_speed(v: Coordinates, max: f64) -> Coordinates {
    let speed = v.distance_squared(Coordinates::ORIGIN).sqrt();
    if speed > max {
        scale(v, max / speed)
    } else {
        v
    }
}
