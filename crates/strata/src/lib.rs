//! # STRATA
//!
//! Demo systems built on [`strata_core`].
//!
//! ## Modules
//!
//! - `movement`: seeded flocking movement steered by spatial queries

pub mod movement;

pub use strata_core as core;

pub use movement::{populate, register_components, Acceleration, MovementSystem, Velocity, MOVEMENT_LAYER};
