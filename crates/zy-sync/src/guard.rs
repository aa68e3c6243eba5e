//! Scoped access to a [`Lock`].

use std::fmt;
use std::marker::PhantomData;

use zy_sys::diag;

use crate::lock::Lock;
use crate::types::LockMode;

/// Holds a [`Lock`] in one mode for the guard's lifetime.
///
/// A guard belongs to the thread that created it: hold ownership is tracked
/// per thread, so a guard must be released where it was acquired. Dropping a
/// guard that is still locked releases it.
///
/// Requesting access the calling thread can never get, such as read access
/// while it holds the write lock, is a fatal error: it is reported through the
/// diagnostic sink and the process aborts.
///
/// ```rust
/// use zy_sync::{Guard, Lock, LockKind, LockMode};
///
/// let lock = Lock::new(LockKind::ReaderWriter, None);
/// let mut guard = Guard::new(&lock, LockMode::Read, true);
/// guard.relock(LockMode::Write);
/// assert_eq!(guard.mode(), LockMode::Write);
/// guard.unlock();
/// guard.unlock();
/// assert!(lock.status().is_idle());
/// ```
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct Guard<'a> {
    lock: &'a Lock,
    mode: LockMode,
    locked: bool,
    _not_send: PhantomData<*const ()>,
}

impl<'a> Guard<'a> {
    /// Create a guard for `mode`, acquiring right away if `acquire_now`.
    pub fn new(lock: &'a Lock, mode: LockMode, acquire_now: bool) -> Self {
        let mut guard = Self {
            lock,
            mode,
            locked: false,
            _not_send: PhantomData,
        };
        if acquire_now {
            guard.lock_in(mode);
        }
        guard
    }

    /// Acquire `lock` for reading.
    pub fn read(lock: &'a Lock) -> Self {
        Self::new(lock, LockMode::Read, true)
    }

    /// Acquire `lock` for writing.
    pub fn write(lock: &'a Lock) -> Self {
        Self::new(lock, LockMode::Write, true)
    }

    /// Hold the lock in `mode`.
    ///
    /// Already holding in `mode` is a no-op. Otherwise any current hold is
    /// released first, so other threads may run between the release and the
    /// new acquisition; the switch is not atomic.
    pub fn relock(&mut self, mode: LockMode) {
        if self.locked && self.mode == mode {
            return;
        }
        self.unlock();
        self.lock_in(mode);
    }

    /// Release the lock. Does nothing if the guard is not holding it.
    pub fn unlock(&mut self) {
        if self.locked {
            self.lock.release();
            self.locked = false;
        }
    }

    /// True while the guard holds the lock.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    /// Mode held, or to be taken on the next [`Guard::relock`].
    #[must_use]
    pub const fn mode(&self) -> LockMode {
        self.mode
    }

    /// The guarded lock.
    #[must_use]
    pub const fn lock(&self) -> &'a Lock {
        self.lock
    }

    fn lock_in(&mut self, mode: LockMode) {
        if let Err(e) = self.lock.acquire(mode) {
            diag::fatal(&format!("{} guard on {}: {e}", mode, self.lock));
        }
        self.mode = mode;
        self.locked = true;
    }
}

impl Drop for Guard<'_> {
    fn drop(&mut self) {
        self.unlock();
    }
}

impl fmt::Debug for Guard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("lock", &format_args!("{}", self.lock))
            .field("mode", &self.mode)
            .field("locked", &self.locked)
            .finish()
    }
}
