//! Storage strategies for a lock record.
//!
//! A [`Backing`] owns one [`LockRecord`] together with the primitives that
//! guard it: a protecting mutex and a wake signal. The acquisition and
//! release algorithms below are written once against that capability set;
//! [`PrivateBacking`] (heap, thread-scoped) and `SharedBacking` (named shared
//! memory, process-scoped) only differ in where the record and primitives live.

mod private;
#[cfg(unix)]
mod shared;

use std::ops::DerefMut;

use zy_sys::ThreadIdentity;

use crate::error::{LockError, Result};
use crate::record::{Attempt, LockRecord, LockStatus, ReleaseOutcome};
use crate::types::LockMode;

pub(crate) use private::PrivateBacking;
#[cfg(unix)]
pub(crate) use shared::{SharedBacking, remove_segment};

/// A lock record plus its protecting mutex and wake signal.
pub(crate) trait Backing {
    /// Exclusive access to the record; the protecting mutex is released on drop.
    type Guard<'a>: DerefMut<Target = LockRecord>
    where
        Self: 'a;

    /// Take the protecting mutex.
    fn lock_record(&self) -> Self::Guard<'_>;

    /// Release the protecting mutex, block until woken, and take it again.
    /// May return spuriously.
    fn wait(&self, guard: &mut Self::Guard<'_>);

    /// Wake every blocked waiter.
    fn wake_all(&self);
}

/// Block until `who` holds the lock in `mode`, or fail if the request can
/// never be granted because `who` already holds the lock.
///
/// The transition rules are re-evaluated from scratch after every wake; the
/// waiting counters are raised and lowered around the wait inside this one
/// scope.
pub(crate) fn acquire<B: Backing>(backing: &B, mode: LockMode, who: ThreadIdentity) -> Result<()> {
    let mut record = backing.lock_record();
    loop {
        match record.attempt(mode, who) {
            Attempt::Granted => return Ok(()),
            Attempt::SelfDeadlock => return Err(LockError::SelfDeadlock { holder: who, mode }),
            Attempt::Wait => {
                record.enqueue(mode);
                backing.wait(&mut record);
                record.dequeue(mode);
            }
        }
    }
}

/// Drop one hold, broadcasting to waiters when the record goes idle.
///
/// Every waiter re-checks its own predicate, so the releaser does not need
/// to know whether a reader or a writer should go next.
pub(crate) fn release<B: Backing>(backing: &B) -> ReleaseOutcome {
    let mut record = backing.lock_record();
    let outcome = record.release();
    if let ReleaseOutcome::Released { wake: true } = outcome {
        backing.wake_all();
    }
    outcome
}

/// Copy of the record's state.
pub(crate) fn status<B: Backing>(backing: &B) -> LockStatus {
    backing.lock_record().snapshot()
}
