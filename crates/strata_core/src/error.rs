//! # Status Codes and Errors
//!
//! Every fallible runtime operation returns [`SimResult`]. Each [`SimError`]
//! maps onto exactly one [`StatusCode`], the stable numeric vocabulary shared
//! with callers that only care about the outcome class.

use std::fmt;

use thiserror::Error;

use crate::ecs::{ComponentId, EntityId, Layer};

/// Stable status vocabulary returned by runtime operations.
///
/// The numeric values are part of the external contract and never change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StatusCode {
    /// The operation completed.
    Success = 0,
    /// The caller's layer is not the writer of the component.
    NoWriteAccess = 10,
    /// A buffer did not match the registered component size.
    InvalidDataSize = 11,
    /// An iterator or query was advanced past its last entity.
    IterationAlreadyCompleted = 12,
    /// A component instance was malformed or of an unknown type.
    InvalidComponent = 13,
    /// The component (or entity) already exists.
    AlreadyExists = 14,
    /// Entity capacity is exhausted.
    OutOfMemory = 15,
    /// The entity does not have the component.
    MissingComponent = 16,
    /// An argument was rejected.
    InvalidArgument = 18,
    /// An entity index is outside the allocated range.
    OutOfRange = 19,
    /// The operation is not supported.
    NotImplemented = 98,
    /// Generic error.
    Error = 99,
    /// Unrecoverable; the simulation must stop.
    Abort = 100,
}

impl StatusCode {
    /// Every status code, in ascending numeric order.
    pub const ALL: [Self; 13] = [
        Self::Success,
        Self::NoWriteAccess,
        Self::InvalidDataSize,
        Self::IterationAlreadyCompleted,
        Self::InvalidComponent,
        Self::AlreadyExists,
        Self::OutOfMemory,
        Self::MissingComponent,
        Self::InvalidArgument,
        Self::OutOfRange,
        Self::NotImplemented,
        Self::Error,
        Self::Abort,
    ];

    /// Returns the numeric value of this status.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Parses a numeric status value.
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    /// Returns `true` for [`StatusCode::Success`].
    #[inline]
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Human-readable description of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NoWriteAccess => "no write access",
            Self::InvalidDataSize => "invalid data size",
            Self::IterationAlreadyCompleted => "iteration already completed",
            Self::InvalidComponent => "invalid component",
            Self::AlreadyExists => "already exists",
            Self::OutOfMemory => "out of memory",
            Self::MissingComponent => "missing component",
            Self::InvalidArgument => "invalid argument",
            Self::OutOfRange => "out of range",
            Self::NotImplemented => "not implemented",
            Self::Error => "error",
            Self::Abort => "abort",
        }
    }

    /// Collapses a result into its status code.
    #[must_use]
    pub fn of<T>(result: &SimResult<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(err) => err.status(),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

/// Errors produced by the simulation runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// The caller's layer does not hold write authority.
    #[error("layer `{layer}` has no write access to component {component} on {entity}")]
    NoWriteAccess {
        /// Target entity.
        entity: EntityId,
        /// Target component type.
        component: ComponentId,
        /// Layer that attempted the write.
        layer: Layer,
    },

    /// A buffer did not match the registered record size.
    #[error("invalid data size for component {component}: expected {expected} bytes, got {actual}")]
    InvalidDataSize {
        /// Component type being read or written.
        component: ComponentId,
        /// Registered record size.
        expected: usize,
        /// Size of the caller's buffer.
        actual: usize,
    },

    /// An iterator or query has no current entity.
    #[error("iteration already completed")]
    IterationAlreadyCompleted,

    /// The component type is unknown or the instance is malformed.
    #[error("invalid component {component}: {reason}")]
    InvalidComponent {
        /// Offending component type.
        component: ComponentId,
        /// What was wrong with it.
        reason: String,
    },

    /// The same component type appeared twice in one entity creation.
    #[error("component {0} appears more than once")]
    DuplicateComponent(ComponentId),

    /// The component is already present (or already pending addition).
    #[error("component {component} already exists on {entity}")]
    AlreadyExists {
        /// Target entity.
        entity: EntityId,
        /// Component type.
        component: ComponentId,
    },

    /// Entity capacity is exhausted.
    #[error("entity capacity of {capacity} exhausted")]
    OutOfMemory {
        /// Configured capacity.
        capacity: usize,
    },

    /// The entity does not carry the component.
    #[error("{entity} has no component {component}")]
    MissingComponent {
        /// Target entity.
        entity: EntityId,
        /// Component type.
        component: ComponentId,
    },

    /// The entity is not live in the committed state.
    #[error("{0} is not a live entity")]
    NotFound(EntityId),

    /// An argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An entity index was never allocated.
    #[error("entity index {index} out of range (allocated: {allocated})")]
    OutOfRange {
        /// Requested index.
        index: u64,
        /// Number of indices allocated so far.
        allocated: u64,
    },

    /// A tick-scoped handle was used after its tick ended.
    #[error("stale handle from generation {handle}, current generation is {current}")]
    StaleHandle {
        /// Generation the handle was issued in.
        handle: u64,
        /// Current generation.
        current: u64,
    },

    /// The operation is not supported.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic failure raised by simulation code.
    #[error("{0}")]
    Other(String),

    /// A tick callback failed and the run was aborted.
    #[error("simulation aborted at tick {tick}: {cause}")]
    Aborted {
        /// Tick that was running when the callback failed.
        tick: u64,
        /// Error returned by the callback.
        cause: Box<SimError>,
    },

    /// The scheduler was aborted earlier and cannot run again.
    #[error("scheduler was aborted and cannot be resumed")]
    SchedulerAborted,
}

impl SimError {
    /// Maps this error onto the status vocabulary.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NoWriteAccess { .. } => StatusCode::NoWriteAccess,
            Self::InvalidDataSize { .. } => StatusCode::InvalidDataSize,
            Self::IterationAlreadyCompleted => StatusCode::IterationAlreadyCompleted,
            Self::InvalidComponent { .. } => StatusCode::InvalidComponent,
            Self::DuplicateComponent(_) | Self::AlreadyExists { .. } => StatusCode::AlreadyExists,
            Self::OutOfMemory { .. } => StatusCode::OutOfMemory,
            Self::MissingComponent { .. } => StatusCode::MissingComponent,
            Self::NotFound(_) | Self::OutOfRange { .. } => StatusCode::OutOfRange,
            Self::InvalidArgument(_) | Self::StaleHandle { .. } | Self::InvalidConfig(_) => {
                StatusCode::InvalidArgument
            }
            Self::NotImplemented(_) => StatusCode::NotImplemented,
            Self::Other(_) => StatusCode::Error,
            Self::Aborted { .. } | Self::SchedulerAborted => StatusCode::Abort,
        }
    }

    /// Shorthand for [`SimError::InvalidComponent`].
    pub(crate) fn invalid_component(component: ComponentId, reason: impl Into<String>) -> Self {
        Self::InvalidComponent {
            component,
            reason: reason.into(),
        }
    }
}

/// Result type for runtime operations.
pub type SimResult<T> = Result<T, SimError>;
