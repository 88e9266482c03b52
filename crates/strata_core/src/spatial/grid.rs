//! # Spatial Grid
//!
//! Uniform grid partitioning of committed positions over the XZ plane.
//! Entities are assigned to cells by `floor(coord / cell_size)`; Y is not
//! partitioned. The grid is rebuilt from scratch once per tick.

use std::collections::HashMap;

use super::constraint::Bounds;
use crate::ecs::{Component, ComponentTable, Coordinates, EntityId, Position};

/// A cell coordinate in the XZ grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellCoord {
    /// Cell column along X.
    pub x: i64,
    /// Cell row along Z.
    pub z: i64,
}

impl CellCoord {
    /// Creates a cell coordinate.
    #[must_use]
    pub const fn new(x: i64, z: i64) -> Self {
        Self { x, z }
    }
}

/// Position snapshot of every Position-bearing entity, bucketed by cell.
#[derive(Clone, Debug)]
pub struct SpatialIndex {
    cell_size: f64,
    /// Every indexed entity and its position.
    entries: Vec<(EntityId, Coordinates)>,
    /// Entity → slot in `entries`.
    slots: HashMap<EntityId, usize>,
    /// Cell → slots in `entries`. Non-finite positions belong to no cell.
    cells: HashMap<CellCoord, Vec<usize>>,
}

impl SpatialIndex {
    /// Creates an empty index.
    ///
    /// # Panics
    ///
    /// Panics if `cell_size` is not a positive finite number.
    #[must_use]
    pub fn new(cell_size: f64) -> Self {
        assert!(
            cell_size.is_finite() && cell_size > 0.0,
            "cell_size must be positive"
        );
        Self {
            cell_size,
            entries: Vec::new(),
            slots: HashMap::new(),
            cells: HashMap::new(),
        }
    }

    /// Cell edge length.
    #[inline]
    #[must_use]
    pub const fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Number of indexed entities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entity is indexed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of non-empty cells.
    #[inline]
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Rebuilds the grid from the committed Position column.
    pub fn rebuild(&mut self, table: &ComponentTable) {
        self.entries.clear();
        self.slots.clear();
        self.cells.clear();

        let Some(column) = table.column(Position::ID) else {
            return;
        };
        for (entity, bytes) in column.iter() {
            let position: Position = bytemuck::pod_read_unaligned(bytes);
            let slot = self.entries.len();
            self.entries.push((entity, position.coords));
            self.slots.insert(entity, slot);
            if position.coords.is_finite() {
                let cell = self.position_to_cell(position.coords);
                self.cells.entry(cell).or_default().push(slot);
            }
        }
    }

    /// Converts a world position to a cell coordinate.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn position_to_cell(&self, position: Coordinates) -> CellCoord {
        CellCoord {
            x: (position.x / self.cell_size).floor() as i64,
            z: (position.z / self.cell_size).floor() as i64,
        }
    }

    /// Indexed position of an entity.
    #[inline]
    #[must_use]
    pub fn position_of(&self, entity: EntityId) -> Option<Coordinates> {
        self.slots.get(&entity).map(|&slot| self.entries[slot].1)
    }

    /// Entities whose position may lie inside `bounds`, in index order.
    ///
    /// Visits only overlapping cells, unless there are more of those than
    /// occupied cells, in which case every entry is scanned instead.
    #[must_use]
    pub fn candidates(&self, bounds: Bounds) -> Vec<EntityId> {
        let low = self.position_to_cell(Coordinates::new(bounds.min_x, 0.0, bounds.min_z));
        let high = self.position_to_cell(Coordinates::new(bounds.max_x, 0.0, bounds.max_z));
        let span = (i128::from(high.x) - i128::from(low.x) + 1) * (i128::from(high.z) - i128::from(low.z) + 1);

        let mut slots: Vec<usize> = if span > i128::try_from(self.cells.len()).unwrap_or(i128::MAX) {
            (0..self.entries.len()).collect()
        } else {
            let mut slots = Vec::new();
            for x in low.x..=high.x {
                for z in low.z..=high.z {
                    if let Some(cell) = self.cells.get(&CellCoord::new(x, z)) {
                        slots.extend_from_slice(cell);
                    }
                }
            }
            slots.sort_unstable();
            slots
        };
        slots.retain(|&slot| bounds.contains(self.entries[slot].1));
        slots.into_iter().map(|slot| self.entries[slot].0).collect()
    }

    /// Iterates over every indexed entity and its position.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, Coordinates)> + '_ {
        self.entries.iter().copied()
    }
}
