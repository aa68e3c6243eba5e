//! The lock record and its transition rules.
//!
//! A [`LockRecord`] is plain data with a fixed `repr(C)` layout. The same
//! record lives on the heap for thread-scoped locks and inside a shared
//! memory segment for process-shared ones, so every field is a fixed-width
//! integer and nothing in it is process-relative.
//!
//! Every method here assumes the caller holds the record's protecting mutex.

use zy_sys::ThreadIdentity;

use crate::types::{LockKind, LockMode, LockState};

/// Outcome of evaluating one acquisition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// The caller now holds the lock.
    Granted,
    /// The caller must wait for a release and evaluate again.
    Wait,
    /// The caller already holds the lock in a mode that makes this request
    /// unsatisfiable.
    SelfDeadlock,
}

/// Outcome of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The record was not held.
    NotHeld,
    /// Other holds (or recursion levels) remain.
    StillHeld,
    /// The record returned to idle; `wake` is set if anyone is waiting.
    Released {
        /// Waiters must be woken to re-evaluate.
        wake: bool,
    },
}

/// Copy of a record's state, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockStatus {
    /// Current hold state.
    pub state: LockState,
    /// Readers holding, or recursion depth of the writer.
    pub held_count: u32,
    /// Callers blocked on a read request.
    pub readers_waiting: u32,
    /// Callers blocked on a write request.
    pub writers_waiting: u32,
    /// Exclusive holder, if any.
    pub writer: Option<ThreadIdentity>,
}

impl LockStatus {
    /// Returns true if nobody holds the lock.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self.state, LockState::Idle)
    }
}

/// Mutable lock state shared by every handle of one lock.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRecord {
    kind: u32,
    status: u32,
    held_count: u32,
    readers_waiting: u32,
    writers_waiting: u32,
    writer_pid: i32,
    writer_tid: u64,
    // Set only while exactly one reader holds and no second reader has joined.
    reader_pid: i32,
    reserved: u32,
    reader_tid: u64,
}

impl LockRecord {
    /// An idle record for `kind`.
    #[must_use]
    pub const fn new(kind: LockKind) -> Self {
        Self {
            kind: kind.to_raw(),
            status: LockState::Idle.to_raw(),
            held_count: 0,
            readers_waiting: 0,
            writers_waiting: 0,
            writer_pid: 0,
            writer_tid: 0,
            reader_pid: 0,
            reserved: 0,
            reader_tid: 0,
        }
    }

    /// Kind stored in the record, `None` if the bytes are not a record.
    #[must_use]
    pub const fn kind(&self) -> Option<LockKind> {
        LockKind::from_raw(self.kind)
    }

    /// Current hold state.
    #[must_use]
    pub const fn state(&self) -> LockState {
        // Unknown values block everyone rather than grant anything.
        match LockState::from_raw(self.status) {
            Some(state) => state,
            None => LockState::WriteHeld,
        }
    }

    /// Number of holders (readers) or recursion depth (writer).
    #[must_use]
    pub const fn held_count(&self) -> u32 {
        self.held_count
    }

    /// Evaluate a request from `who` against the transition rules.
    ///
    /// | state     | read                               | write                          |
    /// |-----------|------------------------------------|--------------------------------|
    /// | idle      | grant unless a writer waits        | grant                          |
    /// | read-held | join unless a writer waits         | wait (sole reader: deadlock)   |
    /// | write-held| wait (own writer: deadlock)        | recurse if own writer, else wait |
    pub fn attempt(&mut self, mode: LockMode, who: ThreadIdentity) -> Attempt {
        match (self.effective(mode), self.state()) {
            (LockMode::Read, LockState::Idle) => {
                if self.writers_waiting > 0 {
                    return Attempt::Wait;
                }
                self.set_state(LockState::ReadHeld);
                self.held_count = 1;
                self.set_reader(who);
                Attempt::Granted
            }
            (LockMode::Read, LockState::ReadHeld) => {
                if self.writers_waiting > 0 {
                    return Attempt::Wait;
                }
                self.held_count += 1;
                self.set_reader(ThreadIdentity::NONE);
                Attempt::Granted
            }
            (LockMode::Read, LockState::WriteHeld) => {
                if self.writer() == who {
                    Attempt::SelfDeadlock
                } else {
                    Attempt::Wait
                }
            }
            (LockMode::Write, LockState::Idle) => {
                self.set_state(LockState::WriteHeld);
                self.held_count = 1;
                self.set_writer(who);
                Attempt::Granted
            }
            (LockMode::Write, LockState::WriteHeld) if self.writer() == who => {
                self.held_count += 1;
                Attempt::Granted
            }
            (LockMode::Write, LockState::ReadHeld)
                if self.held_count == 1 && self.reader() == who =>
            {
                Attempt::SelfDeadlock
            }
            (LockMode::Write, _) => Attempt::Wait,
        }
    }

    /// Count a caller that is about to block on `mode`.
    pub fn enqueue(&mut self, mode: LockMode) {
        match self.effective(mode) {
            LockMode::Read => self.readers_waiting += 1,
            LockMode::Write => self.writers_waiting += 1,
        }
    }

    /// Uncount a caller that resumed after blocking on `mode`.
    pub fn dequeue(&mut self, mode: LockMode) {
        match self.effective(mode) {
            LockMode::Read => self.readers_waiting = self.readers_waiting.saturating_sub(1),
            LockMode::Write => self.writers_waiting = self.writers_waiting.saturating_sub(1),
        }
    }

    /// Drop one hold.
    pub fn release(&mut self) -> ReleaseOutcome {
        if self.held_count == 0 {
            return ReleaseOutcome::NotHeld;
        }
        self.held_count -= 1;
        if self.held_count > 0 {
            return ReleaseOutcome::StillHeld;
        }

        self.set_state(LockState::Idle);
        self.set_writer(ThreadIdentity::NONE);
        self.set_reader(ThreadIdentity::NONE);
        ReleaseOutcome::Released {
            wake: self.readers_waiting > 0 || self.writers_waiting > 0,
        }
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> LockStatus {
        let writer = self.writer();
        LockStatus {
            state: self.state(),
            held_count: self.held_count,
            readers_waiting: self.readers_waiting,
            writers_waiting: self.writers_waiting,
            writer: (!writer.is_none()).then_some(writer),
        }
    }

    fn effective(&self, mode: LockMode) -> LockMode {
        match self.kind() {
            Some(LockKind::ReaderWriter) => mode,
            _ => LockMode::Write,
        }
    }

    fn set_state(&mut self, state: LockState) {
        self.status = state.to_raw();
    }

    fn writer(&self) -> ThreadIdentity {
        ThreadIdentity {
            pid: self.writer_pid,
            tid: self.writer_tid,
        }
    }

    fn set_writer(&mut self, who: ThreadIdentity) {
        self.writer_pid = who.pid;
        self.writer_tid = who.tid;
    }

    fn reader(&self) -> ThreadIdentity {
        ThreadIdentity {
            pid: self.reader_pid,
            tid: self.reader_tid,
        }
    }

    fn set_reader(&mut self, who: ThreadIdentity) {
        self.reader_pid = who.pid;
        self.reader_tid = who.tid;
    }
}
