//! # Tick Epochs
//!
//! Handles handed to systems (entity iterators, queries) borrow nothing;
//! they own a reference-counted snapshot instead. To stop them from being
//! used after their tick ends, every handle records the epoch generation it
//! was issued in and checks it on each access.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{SimError, SimResult};

/// Monotonic generation counter, advanced whenever a tick ends.
#[derive(Debug, Default)]
pub struct TickEpoch {
    generation: AtomicU64,
}

impl TickEpoch {
    /// Creates a shared epoch at generation zero.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Current generation.
    #[inline]
    #[must_use]
    pub fn current(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Invalidates every outstanding handle. Returns the new generation.
    pub fn advance(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Issues a guard bound to the current generation.
    #[must_use]
    pub fn guard(self: &Arc<Self>) -> HandleGuard {
        HandleGuard {
            epoch: Arc::clone(self),
            generation: self.current(),
        }
    }
}

/// Validity token carried by tick-scoped handles.
#[derive(Clone, Debug)]
pub struct HandleGuard {
    epoch: Arc<TickEpoch>,
    generation: u64,
}

impl HandleGuard {
    /// Generation this guard was issued in.
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `true` while the issuing tick is still running.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.epoch.current() == self.generation
    }

    /// Checks validity.
    ///
    /// # Errors
    ///
    /// `StaleHandle` once the epoch has advanced.
    #[inline]
    pub fn check(&self) -> SimResult<()> {
        let current = self.epoch.current();
        if current == self.generation {
            Ok(())
        } else {
            Err(SimError::StaleHandle {
                handle: self.generation,
                current,
            })
        }
    }
}
