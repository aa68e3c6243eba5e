//! Core lock vocabulary.

use std::fmt;

/// What a lock can do, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKind {
    /// Exclusive-only, recursive for the owning thread.
    Mutex,
    /// Shared reads, exclusive (recursive) writes, writer-preference.
    ReaderWriter,
}

impl LockKind {
    /// Returns the kind name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Mutex => "mutex",
            Self::ReaderWriter => "rwlock",
        }
    }

    pub(crate) const fn to_raw(self) -> u32 {
        match self {
            Self::Mutex => 1,
            Self::ReaderWriter => 2,
        }
    }

    pub(crate) const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::Mutex),
            2 => Some(Self::ReaderWriter),
            _ => None,
        }
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for LockKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mutex" => Ok(Self::Mutex),
            "rwlock" => Ok(Self::ReaderWriter),
            other => Err(format!("unknown lock kind: {other}")),
        }
    }
}

/// Requested access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared access. A [`LockKind::Mutex`] treats this as `Write`.
    Read,
    /// Exclusive access.
    Write,
}

impl LockMode {
    /// Returns the mode name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for LockMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            other => Err(format!("unknown lock mode: {other}")),
        }
    }
}

/// Who can see a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockScope {
    /// Private to the creating process; coordinates its threads.
    ThreadLocal,
    /// Backed by named shared memory; coordinates every process using the name.
    ProcessShared,
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThreadLocal => f.write_str("thread-local"),
            Self::ProcessShared => f.write_str("process-shared"),
        }
    }
}

/// Hold state of a lock record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockState {
    /// Nobody holds the lock.
    Idle,
    /// One or more readers hold the lock.
    ReadHeld,
    /// One thread holds the lock exclusively.
    WriteHeld,
}

impl LockState {
    pub(crate) const fn to_raw(self) -> u32 {
        match self {
            Self::Idle => 0,
            Self::ReadHeld => 1,
            Self::WriteHeld => 2,
        }
    }

    pub(crate) const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Idle),
            1 => Some(Self::ReadHeld),
            2 => Some(Self::WriteHeld),
            _ => None,
        }
    }
}
