//! # Simulation Configuration
//!
//! Loaded from TOML. Every field has a default, so an empty document is a
//! valid configuration.
//!
//! ```toml
//! tick_rate_hz = 30
//! realtime = true
//! max_ticks = 600
//! spatial_cell_size = 8.0
//!
//! [[components]]
//! id = 1000
//! name = "Velocity"
//! size = 24
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ecs::{Component, ComponentId, SchemaRegistry};
use crate::error::{SimError, SimResult};

/// Default tick rate.
pub const DEFAULT_TICK_RATE_HZ: u32 = 60;

/// Default entity capacity.
pub const DEFAULT_MAX_ENTITIES: usize = 1_000_000;

/// Default spatial grid cell edge.
pub const DEFAULT_CELL_SIZE: f64 = 4.0;

/// A component schema declared in configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentSchemaConfig {
    /// Component type id.
    pub id: u32,
    /// Schema name.
    pub name: String,
    /// Record size in bytes.
    pub size: usize,
}

/// Runtime configuration of a simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Ticks per second.
    pub tick_rate_hz: u32,
    /// Pace ticks against the wall clock instead of running back to back.
    pub realtime: bool,
    /// Stop after this many committed ticks.
    pub max_ticks: Option<u64>,
    /// Maximum number of live plus pending entities.
    pub max_entities: usize,
    /// Edge length of a spatial grid cell.
    pub spatial_cell_size: f64,
    /// Component types beyond the built-ins.
    pub components: Vec<ComponentSchemaConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            realtime: false,
            max_ticks: None,
            max_entities: DEFAULT_MAX_ENTITIES,
            spatial_cell_size: DEFAULT_CELL_SIZE,
            components: Vec::new(),
        }
    }
}

impl SimulationConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` on malformed TOML or invalid values.
    pub fn from_toml_str(source: &str) -> SimResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| SimError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the file cannot be read or is invalid.
    pub fn from_path(path: impl AsRef<Path>) -> SimResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| SimError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Serializes to TOML.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if serialization fails.
    pub fn to_toml_string(&self) -> SimResult<String> {
        toml::to_string(self).map_err(|e| SimError::InvalidConfig(e.to_string()))
    }

    /// Sets the tick limit.
    #[must_use]
    pub const fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = Some(max_ticks);
        self
    }

    /// Sets the entity capacity.
    #[must_use]
    pub const fn with_max_entities(mut self, max_entities: usize) -> Self {
        self.max_entities = max_entities;
        self
    }

    /// Declares a typed component.
    #[must_use]
    pub fn with_component<C: Component>(mut self) -> Self {
        self.components.push(ComponentSchemaConfig {
            id: C::ID.0,
            name: C::NAME.to_owned(),
            size: C::SIZE,
        });
        self
    }

    /// Checks every value.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> SimResult<()> {
        if self.tick_rate_hz == 0 {
            return Err(SimError::InvalidConfig("tick_rate_hz must be greater than zero".into()));
        }
        if self.max_entities == 0 {
            return Err(SimError::InvalidConfig("max_entities must be greater than zero".into()));
        }
        if !(self.spatial_cell_size.is_finite() && self.spatial_cell_size > 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "spatial_cell_size must be positive, got {}",
                self.spatial_cell_size
            )));
        }
        let mut ids = HashSet::new();
        for component in &self.components {
            if !ids.insert(component.id) {
                return Err(SimError::InvalidConfig(format!(
                    "component id {} declared more than once",
                    component.id
                )));
            }
        }
        self.schema().map(drop)
    }

    /// Builds the schema registry: built-ins plus configured components.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if a component has zero size or conflicts with a
    /// built-in.
    pub fn schema(&self) -> SimResult<SchemaRegistry> {
        let mut schema = SchemaRegistry::with_builtins();
        for component in &self.components {
            schema
                .register(ComponentId(component.id), &component.name, component.size)
                .map_err(|e| SimError::InvalidConfig(e.to_string()))?;
        }
        Ok(schema)
    }

    /// Length of one tick.
    #[must_use]
    pub fn tick_duration(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.tick_rate_hz.max(1)))
    }
}
