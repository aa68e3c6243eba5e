//! ZyFramework: base framework for service-style applications.
//!
//! # Quick Start
//!
//! ```rust
//! use zyframework::prelude::*;
//!
//! let lock = Lock::new(LockKind::ReaderWriter, None);
//! let _read = Guard::read(&lock);
//! assert_eq!(lock.status().state, LockState::ReadHeld);
//! ```

pub use zy_sync as sync;
pub use zy_sys as sys;

/// Prelude module for common imports.
pub mod prelude {
    pub use zy_sync::{
        Guard, Lock, LockConfig, LockError, LockKind, LockMode, LockScope, LockState, LockStatus,
    };
    pub use zy_sys::{Severity, ThreadIdentity, fatal, init_logging, report};
}
