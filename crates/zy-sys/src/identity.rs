//! Process and thread identity.
//!
//! A native thread id is only unique inside its own process, so anything that
//! records ownership in memory shared between processes stores a
//! [`ThreadIdentity`] (pid + tid) instead of a bare thread id.

use std::fmt;

/// Identity of one native thread, unique across every process on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadIdentity {
    /// Owning process id.
    pub pid: i32,
    /// Native thread id inside that process.
    pub tid: u64,
}

impl ThreadIdentity {
    /// Identity that never matches a live thread.
    pub const NONE: Self = Self { pid: 0, tid: 0 };

    /// Identity of the calling thread.
    #[must_use]
    pub fn current() -> Self {
        Self {
            pid: process_id(),
            tid: thread_id(),
        }
    }

    /// Returns true for [`ThreadIdentity::NONE`].
    #[must_use]
    pub const fn is_none(&self) -> bool {
        self.pid == 0 && self.tid == 0
    }

    /// Returns true if this is the calling thread.
    #[must_use]
    pub fn is_current(&self) -> bool {
        *self == Self::current()
    }
}

impl fmt::Display for ThreadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pid, self.tid)
    }
}

/// Id of the calling process.
#[cfg(unix)]
#[must_use]
pub fn process_id() -> i32 {
    nix::unistd::getpid().as_raw()
}

/// Id of the calling process.
#[cfg(not(unix))]
#[must_use]
pub fn process_id() -> i32 {
    std::process::id() as i32
}

/// Native id of the calling thread (`gettid(2)`).
#[cfg(any(target_os = "linux", target_os = "android"))]
#[must_use]
pub fn thread_id() -> u64 {
    nix::unistd::gettid().as_raw() as u64
}

/// Native id of the calling thread (`pthread_threadid_np`).
#[cfg(target_vendor = "apple")]
#[allow(unsafe_code)]
#[must_use]
pub fn thread_id() -> u64 {
    let mut tid: u64 = 0;
    // SAFETY: a zero pthread_t selects the calling thread and `tid` is a valid
    // out-pointer for the duration of the call.
    unsafe {
        libc::pthread_threadid_np(0, &raw mut tid);
    }
    tid
}

/// Native id of the calling thread (`pthread_self`).
#[cfg(all(
    unix,
    not(any(target_os = "linux", target_os = "android", target_vendor = "apple"))
))]
#[allow(unsafe_code)]
#[must_use]
pub fn thread_id() -> u64 {
    // SAFETY: pthread_self has no preconditions.
    unsafe { libc::pthread_self() as u64 }
}

/// Process-local id of the calling thread.
#[cfg(not(unix))]
#[must_use]
pub fn thread_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};

    static NEXT: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static TID: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    TID.with(|tid| *tid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_is_stable_on_one_thread() {
        assert_eq!(ThreadIdentity::current(), ThreadIdentity::current());
        assert!(ThreadIdentity::current().is_current());
    }

    #[test]
    fn test_current_is_not_none() {
        let me = ThreadIdentity::current();
        assert!(!me.is_none());
        assert_eq!(me.pid, process_id());
    }

    #[test]
    fn test_threads_differ() {
        let here = ThreadIdentity::current();
        let there = std::thread::spawn(ThreadIdentity::current).join().unwrap();
        assert_eq!(here.pid, there.pid);
        assert_ne!(here.tid, there.tid);
        assert!(!there.is_current());
    }

    #[test]
    fn test_none_identity() {
        assert!(ThreadIdentity::NONE.is_none());
        assert!(!ThreadIdentity::NONE.is_current());
    }

    #[test]
    fn test_display() {
        let id = ThreadIdentity { pid: 42, tid: 7 };
        assert_eq!(id.to_string(), "42:7");
    }
}
