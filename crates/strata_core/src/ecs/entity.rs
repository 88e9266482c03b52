//! # Entity Identifiers
//!
//! Entities are opaque, monotonically assigned identifiers. An index is
//! never handed out twice, so a stale id can never alias a newer entity.

use std::fmt;

/// Unique identifier for an entity.
///
/// Indices are assigned in creation order starting at zero and are never
/// reused, even after the entity is deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Null/invalid entity ID.
    pub const NULL: Self = Self(u64::MAX);

    /// Creates an entity ID from its index.
    #[inline]
    #[must_use]
    pub const fn new(index: u64) -> Self {
        Self(index)
    }

    /// Returns the index of this entity.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u64 {
        self.0
    }

    /// Checks if this entity ID is null/invalid.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("entity#null")
        } else {
            write!(f, "entity#{}", self.0)
        }
    }
}

/// Hands out entity indices in strictly increasing order.
#[derive(Clone, Debug, Default)]
pub struct EntityAllocator {
    next: u64,
}

impl EntityAllocator {
    /// Creates an allocator starting at index zero.
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Allocates the next entity ID.
    #[inline]
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId::new(self.next);
        self.next += 1;
        id
    }

    /// Number of indices allocated so far.
    #[inline]
    #[must_use]
    pub const fn allocated(&self) -> u64 {
        self.next
    }
}
