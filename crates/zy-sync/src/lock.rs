//! The unified lock.
//!
//! A [`Lock`] is either a recursive mutex or a writer-preferring
//! reader/writer lock, and is either private to this process or shared by
//! name with every process that constructs a lock of the same kind and name.
//! After construction it is only used through [`Guard`](crate::Guard).

use std::fmt;

use zy_sys::{ThreadIdentity, diag};

use crate::backing::{self, PrivateBacking};
#[cfg(unix)]
use crate::backing::SharedBacking;
use crate::config::LockConfig;
use crate::error::{LockError, Result};
use crate::record::{LockStatus, ReleaseOutcome};
use crate::types::{LockKind, LockMode, LockScope};

/// Where the record lives, chosen once at construction.
enum Store {
    Private(PrivateBacking),
    #[cfg(unix)]
    Shared(SharedBacking),
}

/// A mutex or reader/writer lock, thread-scoped or process-shared.
///
/// ```rust
/// use zy_sync::{Guard, Lock, LockKind, LockMode};
///
/// let lock = Lock::new(LockKind::ReaderWriter, None);
/// {
///     let _read = Guard::new(&lock, LockMode::Read, true);
///     assert_eq!(lock.status().held_count, 1);
/// }
/// assert!(lock.status().is_idle());
/// ```
pub struct Lock {
    kind: LockKind,
    name: Option<String>,
    store: Store,
}

impl Lock {
    /// Create a lock. `None` gives a thread-scoped lock; a name gives a lock
    /// shared with every process using the same kind and name.
    ///
    /// A lock that cannot be built is a fatal error: the failure is reported
    /// through the diagnostic sink and the process aborts. Use
    /// [`Lock::try_new`] to handle the error instead.
    #[must_use]
    pub fn new(kind: LockKind, name: Option<&str>) -> Self {
        match Self::try_new(kind, name) {
            Ok(lock) => lock,
            Err(e) => diag::fatal(&format!(
                "failed to create {kind} lock {}: {e}",
                name.unwrap_or("<thread-local>")
            )),
        }
    }

    /// Create a lock with the default [`LockConfig`].
    pub fn try_new(kind: LockKind, name: Option<&str>) -> Result<Self> {
        Self::with_config(kind, name, &LockConfig::default())
    }

    /// Create a lock with an explicit configuration.
    pub fn with_config(kind: LockKind, name: Option<&str>, config: &LockConfig) -> Result<Self> {
        let store = match name {
            None => Store::Private(PrivateBacking::new(kind)),
            Some(name) => {
                validate_name(name)?;
                config.validate()?;
                shared_store(kind, name, config)?
            }
        };

        Ok(Self {
            kind,
            name: name.map(str::to_string),
            store,
        })
    }

    /// Unlink the shared segment of a named lock.
    ///
    /// Handles that are still open keep working on the old segment; the next
    /// lock constructed with this name starts a fresh one. Returns `false` if
    /// no segment existed.
    pub fn remove(kind: LockKind, name: &str, config: &LockConfig) -> Result<bool> {
        validate_name(name)?;
        config.validate()?;
        #[cfg(unix)]
        {
            backing::remove_segment(kind, name, config)
        }
        #[cfg(not(unix))]
        {
            let _ = kind;
            Err(LockError::Unsupported("process-shared locks"))
        }
    }

    /// Lock kind.
    #[must_use]
    pub const fn kind(&self) -> LockKind {
        self.kind
    }

    /// Lock scope.
    #[must_use]
    pub const fn scope(&self) -> LockScope {
        match self.store {
            Store::Private(_) => LockScope::ThreadLocal,
            #[cfg(unix)]
            Store::Shared(_) => LockScope::ProcessShared,
        }
    }

    /// Cross-process name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// True if this handle created the backing state. Always true for a
    /// thread-scoped lock.
    #[must_use]
    pub const fn is_creator(&self) -> bool {
        match &self.store {
            Store::Private(_) => true,
            #[cfg(unix)]
            Store::Shared(shared) => shared.is_creator(),
        }
    }

    /// Snapshot of the lock state.
    #[must_use]
    pub fn status(&self) -> LockStatus {
        match &self.store {
            Store::Private(private) => backing::status(private),
            #[cfg(unix)]
            Store::Shared(shared) => backing::status(shared),
        }
    }

    /// Block until the calling thread holds the lock in `mode`.
    pub(crate) fn acquire(&self, mode: LockMode) -> Result<()> {
        let who = ThreadIdentity::current();
        match &self.store {
            Store::Private(private) => backing::acquire(private, mode, who),
            #[cfg(unix)]
            Store::Shared(shared) => backing::acquire(shared, mode, who),
        }?;
        tracing::trace!(lock = %self, %mode, "acquired");
        Ok(())
    }

    /// Drop one hold taken by [`Lock::acquire`].
    pub(crate) fn release(&self) {
        let outcome = match &self.store {
            Store::Private(private) => backing::release(private),
            #[cfg(unix)]
            Store::Shared(shared) => backing::release(shared),
        };

        if outcome == ReleaseOutcome::NotHeld {
            tracing::warn!(lock = %self, "release of a lock that is not held");
        } else {
            tracing::trace!(lock = %self, ?outcome, "released");
        }
    }
}

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} {name:?}", self.kind),
            None => write!(f, "{} <thread-local>", self.kind),
        }
    }
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Lock");
        s.field("kind", &self.kind)
            .field("scope", &self.scope())
            .field("name", &self.name);
        #[cfg(unix)]
        if let Store::Shared(shared) = &self.store {
            s.field("segment", &shared.segment());
        }
        s.field("creator", &self.is_creator()).finish()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(LockError::InvalidName("name cannot be empty".to_string()));
    }
    if name.contains('\0') {
        return Err(LockError::InvalidName(format!(
            "{name:?} contains a NUL byte"
        )));
    }
    Ok(())
}

#[cfg(unix)]
fn shared_store(kind: LockKind, name: &str, config: &LockConfig) -> Result<Store> {
    SharedBacking::attach_or_create(kind, name, config).map(Store::Shared)
}

#[cfg(not(unix))]
fn shared_store(_kind: LockKind, _name: &str, _config: &LockConfig) -> Result<Store> {
    Err(LockError::Unsupported("process-shared locks"))
}
