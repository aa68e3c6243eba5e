//! Diagnostic sink.
//!
//! All framework diagnostics are `tracing` events. [`fatal`] is the single exit
//! for conditions that cannot be repaired at the layer that detects them: it
//! emits the diagnostic and aborts the process.

use std::fmt;

use tracing_subscriber::EnvFilter;

use crate::error::{Result, SysError};

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "ZY_LOG";

/// Filter used when neither `ZY_LOG` nor `RUST_LOG` is set.
pub const DEFAULT_FILTER: &str = "info";

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Developer detail.
    Debug,
    /// Normal operation.
    Info,
    /// Something unexpected that the caller recovered from.
    Warning,
    /// An operation failed.
    Error,
    /// The process cannot continue.
    Fatal,
}

impl Severity {
    /// Returns the severity name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Emit a diagnostic at the given severity.
///
/// `Severity::Fatal` is logged at error level but does not abort; use
/// [`fatal`] for that.
pub fn report(severity: Severity, message: &str) {
    match severity {
        Severity::Debug => tracing::debug!("{message}"),
        Severity::Info => tracing::info!("{message}"),
        Severity::Warning => tracing::warn!("{message}"),
        Severity::Error => tracing::error!("{message}"),
        Severity::Fatal => tracing::error!(fatal = true, "{message}"),
    }
}

/// Report an unrecoverable condition and abort the process.
///
/// If no subscriber has been installed the message is written to stderr
/// directly, so the reason for the abort is never lost.
pub fn fatal(message: &str) -> ! {
    report(Severity::Fatal, message);
    if !tracing::dispatcher::has_been_set() {
        eprintln!("[FATAL] {message}");
    }
    std::process::abort()
}

/// Install the global `tracing` subscriber.
///
/// Uses the `ZY_LOG` filter, then `RUST_LOG`, then [`DEFAULT_FILTER`]. Events
/// are written to stderr. Calling this more than once is harmless.
pub fn init_logging() {
    if let Err(e) = try_init_logging() {
        tracing::debug!("logging not initialized: {e}");
    }
}

/// Install the global `tracing` subscriber, reporting why it failed.
pub fn try_init_logging() -> Result<()> {
    let directive = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| DEFAULT_FILTER.to_string());
    let filter = filter_from(&directive)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_ids(true)
        .try_init()
        .map_err(|e| SysError::log_init(e.to_string()))
}

fn filter_from(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directive).map_err(|e| SysError::log_filter(format!("{directive}: {e}")))
}
