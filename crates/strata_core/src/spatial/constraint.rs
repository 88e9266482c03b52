//! # Query Constraints
//!
//! Constraints describe which entities a query returns. Geometric shapes
//! come in an absolute form (fixed center) and a relative form centred on a
//! reference entity's position, usually the iterator's current entity.

use crate::ecs::{Component, ComponentId, ComponentTable, Coordinates, EdgeLength, EntityDirectory, EntityId, Position};
use crate::error::{SimError, SimResult};

/// Selection rule for a spatial query.
#[derive(Clone, Debug, PartialEq)]
pub enum Constraint {
    /// Position within `radius` of `center` (Euclidean, inclusive).
    AbsoluteSphere {
        /// Sphere center.
        center: Coordinates,
        /// Sphere radius.
        radius: f64,
    },
    /// Position inside the axis-aligned box (inclusive).
    AbsoluteBox {
        /// Box center.
        center: Coordinates,
        /// Full edge lengths.
        edge_length: EdgeLength,
    },
    /// Horizontal (XZ) distance to `center` at most `radius`, any height.
    AbsoluteCylinder {
        /// Cylinder axis position; `y` is ignored.
        center: Coordinates,
        /// Cylinder radius.
        radius: f64,
    },
    /// Sphere centred on the reference entity.
    RelativeSphere {
        /// Sphere radius.
        radius: f64,
    },
    /// Box centred on the reference entity.
    RelativeBox {
        /// Full edge lengths.
        edge_length: EdgeLength,
    },
    /// Cylinder centred on the reference entity.
    RelativeCylinder {
        /// Cylinder radius.
        radius: f64,
    },
    /// Exactly one entity, if live.
    EntityIndex(EntityId),
    /// Every entity carrying the component type.
    Component(ComponentId),
    /// Entities matching every child constraint.
    And(Vec<Constraint>),
    /// Entities matching at least one child constraint.
    Or(Vec<Constraint>),
}

impl Constraint {
    /// Absolute sphere.
    #[must_use]
    pub const fn sphere(center: Coordinates, radius: f64) -> Self {
        Self::AbsoluteSphere { center, radius }
    }

    /// Absolute axis-aligned box.
    #[must_use]
    pub const fn cuboid(center: Coordinates, edge_length: EdgeLength) -> Self {
        Self::AbsoluteBox { center, edge_length }
    }

    /// Absolute vertical cylinder.
    #[must_use]
    pub const fn cylinder(center: Coordinates, radius: f64) -> Self {
        Self::AbsoluteCylinder { center, radius }
    }

    /// Presence of a typed component.
    #[must_use]
    pub const fn component<C: Component>() -> Self {
        Self::Component(C::ID)
    }

    /// Returns `true` if this constraint (or any child) needs a reference
    /// entity.
    #[must_use]
    pub fn is_relative(&self) -> bool {
        match self {
            Self::RelativeSphere { .. } | Self::RelativeBox { .. } | Self::RelativeCylinder { .. } => true,
            Self::And(children) | Self::Or(children) => children.iter().any(Self::is_relative),
            _ => false,
        }
    }

    /// Checks shape parameters.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for negative or non-finite sizes, non-finite
    /// centers, or an empty `And`/`Or`.
    pub fn validate(&self) -> SimResult<()> {
        match self {
            Self::AbsoluteSphere { center, radius } | Self::AbsoluteCylinder { center, radius } => {
                check_center(*center)?;
                check_extent("radius", *radius)
            }
            Self::AbsoluteBox { center, edge_length } => {
                check_center(*center)?;
                check_edges(*edge_length)
            }
            Self::RelativeSphere { radius } | Self::RelativeCylinder { radius } => {
                check_extent("radius", *radius)
            }
            Self::RelativeBox { edge_length } => check_edges(*edge_length),
            Self::EntityIndex(_) | Self::Component(_) => Ok(()),
            Self::And(children) | Self::Or(children) => {
                if children.is_empty() {
                    return Err(SimError::InvalidArgument(
                        "compound constraint needs at least one child".into(),
                    ));
                }
                children.iter().try_for_each(Self::validate)
            }
        }
    }

    /// Binds the constraint to committed state.
    ///
    /// Relative shapes are centred on `anchor`'s committed position.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if validation fails or a relative shape has no anchor
    /// - `MissingComponent` if the anchor has no position
    /// - `OutOfRange` for an entity index that was never allocated
    /// - `InvalidComponent` for an unregistered component type
    pub(crate) fn resolve(
        &self,
        directory: &EntityDirectory,
        table: &ComponentTable,
        anchor: Option<EntityId>,
    ) -> SimResult<ResolvedConstraint> {
        self.validate()?;
        self.bind(directory, table, anchor)
    }

    fn bind(
        &self,
        directory: &EntityDirectory,
        table: &ComponentTable,
        anchor: Option<EntityId>,
    ) -> SimResult<ResolvedConstraint> {
        let origin = || -> SimResult<Coordinates> {
            let entity = anchor.ok_or_else(|| {
                SimError::InvalidArgument("relative constraint needs a reference entity".into())
            })?;
            Ok(table.read::<Position>(entity)?.coords)
        };

        Ok(match self {
            Self::AbsoluteSphere { center, radius } => ResolvedConstraint::sphere(*center, *radius),
            Self::RelativeSphere { radius } => ResolvedConstraint::sphere(origin()?, *radius),
            Self::AbsoluteBox { center, edge_length } => ResolvedConstraint::cuboid(*center, *edge_length),
            Self::RelativeBox { edge_length } => ResolvedConstraint::cuboid(origin()?, *edge_length),
            Self::AbsoluteCylinder { center, radius } => ResolvedConstraint::cylinder(*center, *radius),
            Self::RelativeCylinder { radius } => ResolvedConstraint::cylinder(origin()?, *radius),
            Self::EntityIndex(entity) => {
                let allocated = directory.allocated();
                if entity.index() >= allocated {
                    return Err(SimError::OutOfRange {
                        index: entity.index(),
                        allocated,
                    });
                }
                ResolvedConstraint::Entity(*entity)
            }
            Self::Component(component) => {
                if table.column(*component).is_none() {
                    return Err(SimError::invalid_component(*component, "unregistered component type"));
                }
                ResolvedConstraint::Component(*component)
            }
            Self::And(children) => ResolvedConstraint::And(
                children
                    .iter()
                    .map(|child| child.bind(directory, table, anchor))
                    .collect::<SimResult<_>>()?,
            ),
            Self::Or(children) => ResolvedConstraint::Or(
                children
                    .iter()
                    .map(|child| child.bind(directory, table, anchor))
                    .collect::<SimResult<_>>()?,
            ),
        })
    }
}

fn check_center(center: Coordinates) -> SimResult<()> {
    if center.is_finite() {
        Ok(())
    } else {
        Err(SimError::InvalidArgument(format!("non-finite center {center:?}")))
    }
}

fn check_extent(what: &str, value: f64) -> SimResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidArgument(format!("{what} must be finite and non-negative, got {value}")))
    }
}

fn check_edges(edges: EdgeLength) -> SimResult<()> {
    check_extent("edge length", edges.x)?;
    check_extent("edge length", edges.y)?;
    check_extent("edge length", edges.z)
}

/// Axis-aligned bounds in the XZ plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    /// Minimum X.
    pub min_x: f64,
    /// Maximum X.
    pub max_x: f64,
    /// Minimum Z.
    pub min_z: f64,
    /// Maximum Z.
    pub max_z: f64,
}

impl Bounds {
    fn around(center: Coordinates, half_x: f64, half_z: f64) -> Self {
        Self {
            min_x: center.x - half_x,
            max_x: center.x + half_x,
            min_z: center.z - half_z,
            max_z: center.z + half_z,
        }
    }

    /// Returns `true` if the point lies inside (inclusive).
    #[inline]
    #[must_use]
    pub fn contains(&self, point: Coordinates) -> bool {
        point.x >= self.min_x && point.x <= self.max_x && point.z >= self.min_z && point.z <= self.max_z
    }
}

/// A constraint bound to concrete coordinates.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ResolvedConstraint {
    Sphere { center: Coordinates, radius: f64 },
    Box { min: Coordinates, max: Coordinates },
    Cylinder { center: Coordinates, radius: f64 },
    Entity(EntityId),
    Component(ComponentId),
    And(Vec<ResolvedConstraint>),
    Or(Vec<ResolvedConstraint>),
}

impl ResolvedConstraint {
    fn sphere(center: Coordinates, radius: f64) -> Self {
        Self::Sphere { center, radius }
    }

    fn cuboid(center: Coordinates, edge_length: EdgeLength) -> Self {
        let half = EdgeLength::new(edge_length.x / 2.0, edge_length.y / 2.0, edge_length.z / 2.0);
        Self::Box {
            min: Coordinates::new(center.x - half.x, center.y - half.y, center.z - half.z),
            max: Coordinates::new(center.x + half.x, center.y + half.y, center.z + half.z),
        }
    }

    fn cylinder(center: Coordinates, radius: f64) -> Self {
        Self::Cylinder { center, radius }
    }

    /// XZ bounds of the shape, or `None` if it is not geometric.
    pub(crate) fn bounds(&self) -> Option<Bounds> {
        match self {
            Self::Sphere { center, radius } | Self::Cylinder { center, radius } => {
                Some(Bounds::around(*center, *radius, *radius))
            }
            Self::Box { min, max } => Some(Bounds {
                min_x: min.x,
                max_x: max.x,
                min_z: min.z,
                max_z: max.z,
            }),
            _ => None,
        }
    }

    /// Exact membership test.
    ///
    /// `position` is the entity's committed position, if it has one.
    /// Geometric shapes never match an entity without a position.
    pub(crate) fn matches(&self, entity: EntityId, position: Option<Coordinates>, table: &ComponentTable) -> bool {
        match self {
            Self::Sphere { center, radius } => {
                position.is_some_and(|p| p.distance_squared(*center) <= radius * radius)
            }
            Self::Box { min, max } => position.is_some_and(|p| {
                p.x >= min.x && p.x <= max.x && p.y >= min.y && p.y <= max.y && p.z >= min.z && p.z <= max.z
            }),
            Self::Cylinder { center, radius } => {
                position.is_some_and(|p| p.horizontal_distance_squared(*center) <= radius * radius)
            }
            Self::Entity(target) => entity == *target,
            Self::Component(component) => table.contains(entity, *component),
            Self::And(children) => children.iter().all(|c| c.matches(entity, position, table)),
            Self::Or(children) => children.iter().any(|c| c.matches(entity, position, table)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatusCode;

    fn origin() -> Coordinates {
        Coordinates::ORIGIN
    }

    #[test]
    fn test_validate_rejects_bad_shapes() {
        assert!(Constraint::sphere(origin(), 1.0).validate().is_ok());
        assert!(Constraint::sphere(origin(), 0.0).validate().is_ok());

        for bad in [
            Constraint::sphere(origin(), -1.0),
            Constraint::cylinder(origin(), f64::NAN),
            Constraint::sphere(Coordinates::new(f64::INFINITY, 0.0, 0.0), 1.0),
            Constraint::cuboid(origin(), EdgeLength::new(1.0, -2.0, 1.0)),
            Constraint::RelativeSphere { radius: f64::INFINITY },
            Constraint::And(Vec::new()),
            Constraint::Or(vec![Constraint::sphere(origin(), -0.5)]),
        ] {
            assert_eq!(bad.validate().unwrap_err().status(), StatusCode::InvalidArgument, "{bad:?}");
        }
    }

    #[test]
    fn test_is_relative() {
        assert!(!Constraint::sphere(origin(), 1.0).is_relative());
        assert!(Constraint::RelativeBox { edge_length: EdgeLength::cube(1.0) }.is_relative());
        assert!(Constraint::And(vec![
            Constraint::component::<Position>(),
            Constraint::RelativeCylinder { radius: 2.0 },
        ])
        .is_relative());
    }

    #[test]
    fn test_sphere_is_inclusive() {
        let table = ComponentTable::default();
        let sphere = ResolvedConstraint::sphere(origin(), 1.0);
        let id = EntityId::new(0);
        assert!(sphere.matches(id, Some(Coordinates::new(0.0, 0.0, 1.0)), &table));
        assert!(!sphere.matches(id, Some(Coordinates::new(0.0, 0.0, 1.01)), &table));
        assert!(!sphere.matches(id, None, &table));
    }

    #[test]
    fn test_box_uses_half_edges() {
        let table = ComponentTable::default();
        let cuboid = ResolvedConstraint::cuboid(Coordinates::new(10.0, 0.0, 0.0), EdgeLength::new(2.0, 4.0, 2.0));
        let id = EntityId::new(0);
        assert!(cuboid.matches(id, Some(Coordinates::new(11.0, 2.0, -1.0)), &table));
        assert!(!cuboid.matches(id, Some(Coordinates::new(11.5, 0.0, 0.0)), &table));
        assert!(!cuboid.matches(id, Some(Coordinates::new(10.0, 2.5, 0.0)), &table));
    }

    #[test]
    fn test_cylinder_ignores_height() {
        let table = ComponentTable::default();
        let cylinder = ResolvedConstraint::cylinder(origin(), 2.0);
        let id = EntityId::new(0);
        assert!(cylinder.matches(id, Some(Coordinates::new(1.0, 1.0e6, 1.0)), &table));
        assert!(!cylinder.matches(id, Some(Coordinates::new(2.0, 0.0, 0.5)), &table));
    }

    #[test]
    fn test_bounds() {
        let bounds = ResolvedConstraint::sphere(Coordinates::new(1.0, 5.0, -1.0), 2.0)
            .bounds()
            .unwrap();
        assert_eq!(bounds, Bounds { min_x: -1.0, max_x: 3.0, min_z: -3.0, max_z: 1.0 });
        assert!(bounds.contains(Coordinates::new(3.0, 100.0, 1.0)));
        assert!(ResolvedConstraint::Entity(EntityId::new(0)).bounds().is_none());
    }
}
