//! # Component Types
//!
//! Components are fixed-size binary records. The runtime only ever sees
//! bytes; typed access goes through [`Component`], which ties a `Pod` struct
//! to its numeric type id.

use std::fmt;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use super::layer::Layer;

/// Numeric identifier of a component type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(pub u32);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Marker trait for typed components.
///
/// Components must be:
/// - `Pod`: Plain old data, its bytes are the serialized record
/// - `Zeroable`: Can be safely zeroed
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Default, Pod, Zeroable)]
/// #[repr(C)]
/// struct Health {
///     value: f64,
/// }
///
/// impl Component for Health {
///     const ID: ComponentId = ComponentId(1000);
///     const NAME: &'static str = "Health";
/// }
/// ```
pub trait Component: Copy + Pod + Zeroable + Send + Sync + 'static {
    /// Unique identifier for this component type.
    const ID: ComponentId;
    /// Human-readable schema name.
    const NAME: &'static str;
    /// Serialized size in bytes.
    const SIZE: usize = std::mem::size_of::<Self>();
}

/// A point in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Coordinates {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate (up).
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

impl Coordinates {
    /// The origin.
    pub const ORIGIN: Self = Self::new(0.0, 0.0, 0.0);

    /// Creates a new point.
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Returns the squared distance to another point.
    ///
    /// This avoids the sqrt call for distance comparisons.
    #[inline]
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// Squared distance in the horizontal (XZ) plane.
    #[inline]
    #[must_use]
    pub fn horizontal_distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        dx * dx + dz * dz
    }

    /// Returns `true` if every coordinate is finite.
    #[inline]
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Full edge lengths of an axis-aligned box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct EdgeLength {
    /// Extent along X.
    pub x: f64,
    /// Extent along Y.
    pub y: f64,
    /// Extent along Z.
    pub z: f64,
}

impl EdgeLength {
    /// Creates new edge lengths.
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// A cube with the given edge.
    #[inline]
    #[must_use]
    pub const fn cube(edge: f64) -> Self {
        Self::new(edge, edge, edge)
    }
}

/// Position of an entity. Drives the spatial index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Position {
    /// World-space coordinates.
    pub coords: Coordinates,
}

impl Position {
    /// Creates a new position.
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            coords: Coordinates::new(x, y, z),
        }
    }
}

impl Component for Position {
    const ID: ComponentId = ComponentId(54);
    const NAME: &'static str = "Position";
}

/// Marks an entity as persistent. Carries no data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Persistence {
    /// Reserved byte; records cannot be empty.
    pub _reserved: u8,
}

impl Component for Persistence {
    const ID: ComponentId = ComponentId(55);
    const NAME: &'static str = "Persistence";
}

/// Marks an entity as representing a running system.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct SystemMarker {
    /// Reserved byte; records cannot be empty.
    pub _reserved: u8,
}

impl Component for SystemMarker {
    const ID: ComponentId = ComponentId(59);
    const NAME: &'static str = "System";
}

/// A component record paired with the layer that authors it.
///
/// Used for entity creation and component addition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentInstance {
    /// Component type.
    pub component: ComponentId,
    /// Serialized record.
    pub data: Vec<u8>,
    /// Layer that will hold write authority.
    pub layer: Layer,
}

impl ComponentInstance {
    /// Creates an instance from raw bytes.
    #[must_use]
    pub fn new(component: ComponentId, data: impl Into<Vec<u8>>, layer: impl Into<Layer>) -> Self {
        Self {
            component,
            data: data.into(),
            layer: layer.into(),
        }
    }

    /// Creates an instance from a typed component.
    #[must_use]
    pub fn of<C: Component>(value: &C, layer: impl Into<Layer>) -> Self {
        Self::new(C::ID, bytemuck::bytes_of(value).to_vec(), layer)
    }
}
