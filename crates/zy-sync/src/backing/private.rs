//! Thread-scoped backing: the record on the heap, guarded by `parking_lot`.

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::Backing;
use crate::record::LockRecord;
use crate::types::LockKind;

/// Heap-owned record; destroyed with the owning lock.
#[derive(Debug)]
pub(crate) struct PrivateBacking {
    record: Mutex<LockRecord>,
    signal: Condvar,
}

impl PrivateBacking {
    pub(crate) fn new(kind: LockKind) -> Self {
        Self {
            record: Mutex::new(LockRecord::new(kind)),
            signal: Condvar::new(),
        }
    }
}

impl Backing for PrivateBacking {
    type Guard<'a>
        = MutexGuard<'a, LockRecord>
    where
        Self: 'a;

    fn lock_record(&self) -> Self::Guard<'_> {
        self.record.lock()
    }

    fn wait(&self, guard: &mut Self::Guard<'_>) {
        self.signal.wait(guard);
    }

    fn wake_all(&self) {
        self.signal.notify_all();
    }
}
