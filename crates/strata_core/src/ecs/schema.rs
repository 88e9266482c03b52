//! # Component Schema Registry
//!
//! Every component type has a fixed id and a fixed record size, known
//! before the simulation starts. Payloads are validated against this
//! registry on every write path.

use std::collections::BTreeMap;

use super::component::{Component, ComponentId, Persistence, Position, SystemMarker};
use crate::error::{SimError, SimResult};

/// Registered layout of one component type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentSchema {
    /// Component type id.
    pub id: ComponentId,
    /// Schema name, for diagnostics.
    pub name: String,
    /// Record size in bytes.
    pub size: usize,
}

/// Registry of known component types.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    entries: BTreeMap<ComponentId, ComponentSchema>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in component types.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.insert_unchecked::<Position>();
        registry.insert_unchecked::<Persistence>();
        registry.insert_unchecked::<SystemMarker>();
        registry
    }

    fn insert_unchecked<C: Component>(&mut self) {
        self.entries.insert(
            C::ID,
            ComponentSchema {
                id: C::ID,
                name: C::NAME.to_owned(),
                size: C::SIZE,
            },
        );
    }

    /// Registers a component type.
    ///
    /// Registering an identical schema twice is a no-op.
    ///
    /// # Errors
    ///
    /// `InvalidComponent` if `size` is zero or the id is already registered
    /// with a different layout.
    pub fn register(&mut self, id: ComponentId, name: &str, size: usize) -> SimResult<()> {
        if size == 0 {
            return Err(SimError::invalid_component(id, "record size must be non-zero"));
        }
        if let Some(existing) = self.entries.get(&id) {
            if existing.size == size && existing.name == name {
                return Ok(());
            }
            return Err(SimError::invalid_component(
                id,
                format!(
                    "already registered as `{}` ({} bytes)",
                    existing.name, existing.size
                ),
            ));
        }
        self.entries.insert(
            id,
            ComponentSchema {
                id,
                name: name.to_owned(),
                size,
            },
        );
        Ok(())
    }

    /// Registers a typed component.
    ///
    /// # Errors
    ///
    /// See [`SchemaRegistry::register`].
    pub fn register_component<C: Component>(&mut self) -> SimResult<()> {
        self.register(C::ID, C::NAME, C::SIZE)
    }

    /// Looks up a schema.
    #[inline]
    #[must_use]
    pub fn get(&self, id: ComponentId) -> Option<&ComponentSchema> {
        self.entries.get(&id)
    }

    /// Returns `true` if the type is registered.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: ComponentId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Registered record size for a type.
    ///
    /// # Errors
    ///
    /// `InvalidComponent` if the type is unknown.
    pub fn size_of(&self, id: ComponentId) -> SimResult<usize> {
        self.get(id)
            .map(|schema| schema.size)
            .ok_or_else(|| SimError::invalid_component(id, "unregistered component type"))
    }

    /// Validates a component instance payload.
    ///
    /// # Errors
    ///
    /// `InvalidComponent` if the type is unknown or the size does not match.
    pub fn validate_instance(&self, id: ComponentId, len: usize) -> SimResult<()> {
        let size = self.size_of(id)?;
        if size != len {
            return Err(SimError::invalid_component(
                id,
                format!("payload is {len} bytes, schema requires {size}"),
            ));
        }
        Ok(())
    }

    /// Validates a read or write buffer.
    ///
    /// # Errors
    ///
    /// `InvalidComponent` if the type is unknown, `InvalidDataSize` if the
    /// buffer length does not match.
    pub fn check_buffer(&self, id: ComponentId, len: usize) -> SimResult<()> {
        let expected = self.size_of(id)?;
        if expected != len {
            return Err(SimError::InvalidDataSize {
                component: id,
                expected,
                actual: len,
            });
        }
        Ok(())
    }

    /// Iterates over all schemas in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentSchema> {
        self.entries.values()
    }

    /// Number of registered types.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatusCode;

    #[test]
    fn test_builtins_registered() {
        let registry = SchemaRegistry::with_builtins();
        assert_eq!(registry.size_of(Position::ID).unwrap(), 24);
        assert_eq!(registry.size_of(Persistence::ID).unwrap(), 1);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_register_rejects_conflicts() {
        let mut registry = SchemaRegistry::new();
        registry.register(ComponentId(1000), "Velocity", 24).unwrap();
        registry.register(ComponentId(1000), "Velocity", 24).unwrap();

        let err = registry.register(ComponentId(1000), "Velocity", 8).unwrap_err();
        assert_eq!(err.status(), StatusCode::InvalidComponent);

        let err = registry.register(ComponentId(1001), "Empty", 0).unwrap_err();
        assert_eq!(err.status(), StatusCode::InvalidComponent);
    }

    #[test]
    fn test_validation_status_codes() {
        let registry = SchemaRegistry::with_builtins();

        assert!(registry.validate_instance(Position::ID, 24).is_ok());
        assert_eq!(
            registry.validate_instance(Position::ID, 23).unwrap_err().status(),
            StatusCode::InvalidComponent
        );
        assert_eq!(
            registry.check_buffer(Position::ID, 25).unwrap_err().status(),
            StatusCode::InvalidDataSize
        );
        assert_eq!(
            registry.check_buffer(ComponentId(9999), 4).unwrap_err().status(),
            StatusCode::InvalidComponent
        );
    }
}
