//! Lock error types.
//!
//! Every variant is unrecoverable for the lock that produced it: a lock that
//! failed to build, or a request that can never be granted, invalidates
//! whatever the lock was meant to protect. [`Lock::new`](crate::Lock::new)
//! and [`Guard`](crate::Guard) route these through the fatal diagnostic path;
//! [`Lock::try_new`](crate::Lock::try_new) hands them back to the caller.

use std::time::Duration;

use zy_sys::ThreadIdentity;

use crate::types::LockMode;

/// Result type alias for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;

/// Lock construction and acquisition failures.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The lock name cannot be used as a cross-process identity.
    #[error("invalid lock name: {0}")]
    InvalidName(String),

    /// Lock configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The shared memory object could not be created or opened.
    #[error("failed to open shared memory {segment} (errno={errno})")]
    ShmOpen {
        /// Shared memory object name.
        segment: String,
        /// OS error number.
        errno: i32,
    },

    /// The shared memory object could not be sized.
    #[error("failed to size shared memory {segment} (errno={errno})")]
    ShmResize {
        /// Shared memory object name.
        segment: String,
        /// OS error number.
        errno: i32,
    },

    /// The shared memory object could not be mapped.
    #[error("failed to map shared memory {segment} (errno={errno})")]
    ShmMap {
        /// Shared memory object name.
        segment: String,
        /// OS error number.
        errno: i32,
    },

    /// A platform primitive could not be initialized.
    #[error("failed to initialize {primitive} (errno={errno})")]
    PrimitiveInit {
        /// Which primitive failed.
        primitive: &'static str,
        /// OS error number.
        errno: i32,
    },

    /// The shared segment does not hold a compatible lock record.
    #[error("incompatible shared lock {segment}: {detail}")]
    LayoutMismatch {
        /// Shared memory object name.
        segment: String,
        /// What did not match.
        detail: String,
    },

    /// The creator of a shared segment never finished initializing it.
    #[error("timed out after {waited:?} waiting for shared lock {segment} to be initialized")]
    AttachTimeout {
        /// Shared memory object name.
        segment: String,
        /// How long the attacher waited.
        waited: Duration,
    },

    /// The calling thread already holds the lock in a mode that makes the
    /// request unsatisfiable.
    #[error("self-deadlock: thread {holder} requested {mode} access to a lock it already holds")]
    SelfDeadlock {
        /// The requesting (and holding) thread.
        holder: ThreadIdentity,
        /// The mode that was requested.
        mode: LockMode,
    },

    /// The requested scope is not available on this platform.
    #[error("not supported on this platform: {0}")]
    Unsupported(&'static str),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LockError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a layout mismatch error.
    #[must_use]
    pub fn layout_mismatch(segment: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::LayoutMismatch {
            segment: segment.into(),
            detail: detail.into(),
        }
    }

    /// Get the raw errno value, if available.
    #[must_use]
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::ShmOpen { errno, .. }
            | Self::ShmResize { errno, .. }
            | Self::ShmMap { errno, .. }
            | Self::PrimitiveInit { errno, .. } => Some(*errno),
            Self::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }

    /// Returns true if the platform could not supply a primitive.
    #[must_use]
    pub const fn is_resource_failure(&self) -> bool {
        matches!(
            self,
            Self::ShmOpen { .. }
                | Self::ShmResize { .. }
                | Self::ShmMap { .. }
                | Self::PrimitiveInit { .. }
                | Self::LayoutMismatch { .. }
                | Self::AttachTimeout { .. }
                | Self::Io(_)
        )
    }

    /// Returns true for a detected self-deadlock.
    #[must_use]
    pub const fn is_self_deadlock(&self) -> bool {
        matches!(self, Self::SelfDeadlock { .. })
    }
}
