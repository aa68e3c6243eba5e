// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # zy-sync
//!
//! One lock primitive with two behaviours and two scopes:
//!
//! | kind                      | read request          | write request           |
//! |---------------------------|-----------------------|-------------------------|
//! | [`LockKind::Mutex`]       | same as write         | exclusive, recursive    |
//! | [`LockKind::ReaderWriter`]| shared with readers   | exclusive, recursive    |
//!
//! A lock constructed without a name is private to the process. A named lock
//! lives in a POSIX shared memory object, and every process that constructs a
//! lock of the same kind and name operates on the same state. The process
//! that created the object is the one that tears it down.
//!
//! Writers are preferred: once a writer waits, new readers queue behind it.
//! A thread asking for access it can never get because it already holds the
//! lock (read after write, or write while the sole reader) is a fatal error.
//!
//! ## Quick Start
//!
//! ```rust
//! use zy_sync::{Guard, Lock, LockKind};
//!
//! let lock = Lock::new(LockKind::ReaderWriter, None);
//! {
//!     let _a = Guard::read(&lock);
//!     let _b = Guard::read(&lock);
//!     assert_eq!(lock.status().held_count, 2);
//! }
//! let _w = Guard::write(&lock);
//! ```
//!
//! ## Shared Between Processes
//!
//! ```rust,no_run
//! use zy_sync::{Guard, Lock, LockConfig, LockKind};
//!
//! fn main() -> zy_sync::Result<()> {
//!     let config = LockConfig::load("/etc/zy/lock.toml")?;
//!     let lock = Lock::with_config(LockKind::Mutex, Some("ledger"), &config)?;
//!     let _held = Guard::write(&lock);
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Support
//!
//! | Platform | Thread-local | Process-shared |
//! |----------|--------------|----------------|
//! | Linux    | Yes          | Yes            |
//! | macOS    | Yes          | Yes            |
//! | Others   | Yes          | `LockError::Unsupported` |

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, rust_2018_idioms)]

mod backing;
pub mod config;
pub mod error;
pub mod guard;
pub mod lock;
pub mod record;
pub mod types;

pub use config::{LockConfig, LockConfigBuilder, MAX_NAMESPACE_LEN};
pub use error::{LockError, Result};
pub use guard::Guard;
pub use lock::Lock;
pub use record::LockStatus;
pub use types::{LockKind, LockMode, LockScope, LockState};
