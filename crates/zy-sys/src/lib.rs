// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # zy-sys
//!
//! System collaborators shared by every ZyFramework component.
//!
//! - [`identity`]: who is calling (process id, native thread id)
//! - [`diag`]: where diagnostics go (a `tracing` sink, plus the fatal path
//!   used when a primitive is broken beyond repair)
//!
//! ## Example
//!
//! ```rust,no_run
//! use zy_sys::{Severity, ThreadIdentity, diag};
//!
//! diag::init_logging();
//! let me = ThreadIdentity::current();
//! diag::report(Severity::Info, &format!("service starting on {me}"));
//! ```

#![warn(missing_docs)]

pub mod diag;
pub mod error;
pub mod identity;

pub use diag::{Severity, fatal, init_logging, report, try_init_logging};
pub use error::{Result, SysError};
pub use identity::{ThreadIdentity, process_id, thread_id};
