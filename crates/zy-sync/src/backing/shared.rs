//! Process-shared backing: the record in a named POSIX shared memory object.
//!
//! Segment layout (`repr(C)`, identical in every attached process):
//!
//! ```text
//! +----------------+------------+-----------------+----------------+
//! | SegmentHeader  | LockRecord | pthread_mutex_t | pthread_cond_t |
//! +----------------+------------+-----------------+----------------+
//! ```
//!
//! Both primitives are initialized `PTHREAD_PROCESS_SHARED` by the process
//! that created the object (`O_CREAT | O_EXCL` succeeded) and only ever
//! attached to by everyone else. Which of the two a handle is, is a type:
//! [`Creator`] can tear the segment down, [`Attacher`] cannot.

use std::fmt::Write as _;
use std::fs::File;
use std::mem::MaybeUninit;
use std::num::NonZeroUsize;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{MapFlags, ProtFlags, mmap, munmap, shm_open, shm_unlink};
use nix::sys::stat::Mode;
use sha2::{Digest, Sha256};
use zy_sys::{diag, process_id};

use super::Backing;
use crate::config::LockConfig;
use crate::error::{LockError, Result};
use crate::record::LockRecord;
use crate::types::LockKind;

/// Set in `SegmentHeader::handles` once the creator finished initializing.
const HANDLES_READY: u32 = 1 << 31;
/// Set by the creator right before it destroys the primitives. Never cleared.
const HANDLES_RETIRED: u32 = 1 << 30;
/// Low bits of `SegmentHeader::handles`: live handles across all processes.
const HANDLES_COUNT: u32 = HANDLES_RETIRED - 1;
const LAYOUT_VERSION: u32 = 1;
/// Bytes of the name digest used in the object name.
const NAME_HASH_BYTES: usize = 10;

#[repr(C)]
struct SegmentHeader {
    // READY and RETIRED flags plus the handle count. A handle is only counted
    // while RETIRED is clear, so counted handles never see destroyed primitives.
    handles: AtomicU32,
    version: u32,
    kind: u32,
    creator_pid: i32,
    reserved: [u32; 2],
}

#[repr(C)]
struct Segment {
    header: SegmentHeader,
    record: LockRecord,
    mutex: libc::pthread_mutex_t,
    signal: libc::pthread_cond_t,
}

const SEGMENT_LEN: usize = std::mem::size_of::<Segment>();

/// Result of trying to count a new handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registration {
    Joined,
    /// The creator has not published the segment yet.
    Pending,
    /// The creator tore the segment down.
    Retired,
}

/// Count one more handle, unless the segment is not published yet or retired.
fn register(handles: &AtomicU32) -> Registration {
    let mut current = handles.load(Ordering::Acquire);
    loop {
        if current & HANDLES_RETIRED != 0 {
            return Registration::Retired;
        }
        if current & HANDLES_READY == 0 {
            return Registration::Pending;
        }
        match handles.compare_exchange_weak(
            current,
            current + 1,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => return Registration::Joined,
            Err(seen) => current = seen,
        }
    }
}

/// Uncount the creator's handle, retiring the segment if it was the last one.
/// Returns the handles left; zero means the caller must destroy the segment.
fn retire_or_leave(handles: &AtomicU32) -> u32 {
    let mut current = handles.load(Ordering::Acquire);
    loop {
        let count = current & HANDLES_COUNT;
        let next = if count <= 1 {
            HANDLES_RETIRED
        } else {
            current - 1
        };
        match handles.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return count.saturating_sub(1),
            Err(seen) => current = seen,
        }
    }
}

/// Uncount an attacher's handle. Returns the handles left.
fn leave(handles: &AtomicU32) -> u32 {
    (handles.fetch_sub(1, Ordering::AcqRel) & HANDLES_COUNT).saturating_sub(1)
}

/// Shared memory object name for `name`.
///
/// The kind is part of the digest, so a mutex and a reader/writer lock with
/// the same name never share a segment.
pub(crate) fn segment_name(namespace: &str, kind: LockKind, name: &str) -> String {
    let digest = Sha256::new()
        .chain_update(kind.name().as_bytes())
        .chain_update([0u8])
        .chain_update(name.as_bytes())
        .finalize();

    let mut out = String::with_capacity(2 + namespace.len() + NAME_HASH_BYTES * 2);
    out.push('/');
    out.push_str(namespace);
    out.push('-');
    for byte in &digest[..NAME_HASH_BYTES] {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Unlink the shared memory object of a named lock.
///
/// Processes that still have it mapped keep working; the next process to use
/// the name creates a fresh segment. Returns `false` if there was nothing to
/// remove.
pub(crate) fn remove_segment(kind: LockKind, name: &str, config: &LockConfig) -> Result<bool> {
    let segment = segment_name(&config.namespace, kind, name);
    match shm_unlink(segment.as_str()) {
        Ok(()) => {
            tracing::debug!(%segment, "removed shared lock segment");
            Ok(true)
        }
        Err(Errno::ENOENT) => Ok(false),
        Err(e) => Err(LockError::ShmOpen {
            segment,
            errno: e as i32,
        }),
    }
}

/// One process's view of a segment.
struct Mapping {
    ptr: NonNull<Segment>,
    segment: String,
}

// SAFETY: the mapping is plain shared memory. The record and the wait signal
// are only touched while holding the process-shared mutex; `handles` is
// atomic; every other header field is written once by the creator before
// READY is published.
unsafe impl Send for Mapping {}
// SAFETY: see above.
unsafe impl Sync for Mapping {}

impl Mapping {
    fn map(file: &File, segment: &str) -> Result<Self> {
        let len = NonZeroUsize::new(SEGMENT_LEN)
            .ok_or_else(|| LockError::layout_mismatch(segment, "empty segment layout"))?;
        // SAFETY: a fresh shared read/write mapping of `len` bytes of an object
        // at least that large; it aliases no Rust-managed memory.
        let ptr = unsafe {
            mmap(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                file,
                0,
            )
        }
        .map_err(|e| LockError::ShmMap {
            segment: segment.to_string(),
            errno: e as i32,
        })?;

        Ok(Self {
            ptr: ptr.cast(),
            segment: segment.to_string(),
        })
    }

    fn handles(&self) -> &AtomicU32 {
        // SAFETY: the mapping is valid for our lifetime and `handles` is atomic.
        unsafe { &(*self.ptr.as_ptr()).header.handles }
    }

    fn header(&self) -> *mut SegmentHeader {
        // SAFETY: in-bounds field projection of a live mapping.
        unsafe { &raw mut (*self.ptr.as_ptr()).header }
    }

    fn record(&self) -> *mut LockRecord {
        // SAFETY: in-bounds field projection of a live mapping.
        unsafe { &raw mut (*self.ptr.as_ptr()).record }
    }

    fn mutex(&self) -> *mut libc::pthread_mutex_t {
        // SAFETY: in-bounds field projection of a live mapping.
        unsafe { &raw mut (*self.ptr.as_ptr()).mutex }
    }

    fn signal(&self) -> *mut libc::pthread_cond_t {
        // SAFETY: in-bounds field projection of a live mapping.
        unsafe { &raw mut (*self.ptr.as_ptr()).signal }
    }

    /// Take the process-shared mutex.
    fn lock(&self) -> SegmentGuard<'_> {
        // SAFETY: only counted handles call this, and a handle is counted only
        // after READY was published and before RETIRED is set.
        let rc = unsafe { libc::pthread_mutex_lock(self.mutex()) };
        if rc != 0 {
            diag::fatal(&format!(
                "failed to lock shared lock {} (errno={rc})",
                self.segment
            ));
        }
        SegmentGuard { mapping: self }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from `mmap` with `SEGMENT_LEN` and no reference
        // derived from it outlives `self`.
        if let Err(e) = unsafe { munmap(self.ptr.cast(), SEGMENT_LEN) } {
            tracing::warn!(segment = %self.segment, "munmap failed: {e}");
        }
    }
}

/// Holds the process-shared mutex; unlocks on drop.
pub(crate) struct SegmentGuard<'a> {
    mapping: &'a Mapping,
}

impl Deref for SegmentGuard<'_> {
    type Target = LockRecord;

    fn deref(&self) -> &LockRecord {
        // SAFETY: the record is only accessed under the mutex we hold.
        unsafe { &*self.mapping.record() }
    }
}

impl DerefMut for SegmentGuard<'_> {
    fn deref_mut(&mut self) -> &mut LockRecord {
        // SAFETY: the record is only accessed under the mutex we hold.
        unsafe { &mut *self.mapping.record() }
    }
}

impl Drop for SegmentGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: this guard's existence proves the calling thread holds it.
        let rc = unsafe { libc::pthread_mutex_unlock(self.mapping.mutex()) };
        if rc != 0 {
            diag::fatal(&format!(
                "failed to unlock shared lock {} (errno={rc})",
                self.mapping.segment
            ));
        }
    }
}

/// Handle of the process that created the segment.
pub(crate) struct Creator {
    mapping: Mapping,
    pid: i32,
}

impl Creator {
    fn create(file: &File, segment: &str, kind: LockKind) -> Result<Self> {
        if let Err(e) = file.set_len(SEGMENT_LEN as u64) {
            discard_name(segment);
            return Err(LockError::ShmResize {
                segment: segment.to_string(),
                errno: e.raw_os_error().unwrap_or(-1),
            });
        }

        let mapping = match Mapping::map(file, segment) {
            Ok(mapping) => mapping,
            Err(e) => {
                discard_name(segment);
                return Err(e);
            }
        };

        let pid = process_id();
        // SAFETY: nobody else can use the segment before READY is published,
        // so these plain writes race with nothing.
        let init = unsafe {
            mapping.record().write(LockRecord::new(kind));
            let header = mapping.header();
            (*header).version = LAYOUT_VERSION;
            (*header).kind = kind.to_raw();
            (*header).creator_pid = pid;
            init_primitives(mapping.mutex(), mapping.signal())
        };
        if let Err(e) = init {
            discard_name(segment);
            return Err(e);
        }

        mapping.handles().store(HANDLES_READY | 1, Ordering::Release);
        tracing::debug!(%segment, %kind, pid, "created shared lock segment");
        Ok(Self { mapping, pid })
    }

    /// Destroy the primitives and the object name. Only reachable from the
    /// creating process, after the last handle detached.
    fn destroy(&mut self) {
        let segment = &self.mapping.segment;
        if let Err(e) = shm_unlink(segment.as_str()) {
            tracing::warn!(%segment, "shm_unlink failed: {e}");
        }
        // SAFETY: RETIRED is set and the count reached zero; registration
        // fails from here on, so no other handle uses these primitives.
        unsafe {
            libc::pthread_cond_destroy(self.mapping.signal());
            libc::pthread_mutex_destroy(self.mapping.mutex());
        }
        tracing::debug!(%segment, "destroyed shared lock segment");
    }
}

impl Drop for Creator {
    fn drop(&mut self) {
        // A forked child inherits the mapping, not the creator role.
        if process_id() != self.pid {
            return;
        }

        let remaining = retire_or_leave(self.mapping.handles());
        if remaining == 0 {
            self.destroy();
        } else {
            tracing::warn!(
                segment = %self.mapping.segment,
                remaining,
                "creator detached while other handles remain; segment left in place"
            );
        }
    }
}

/// Handle of a process that opened an existing segment.
pub(crate) struct Attacher {
    mapping: Mapping,
    pid: i32,
}

impl Attacher {
    /// Attach to an existing segment. `Ok(None)` means it was retired while we
    /// were attaching and the caller should start over.
    fn attach(
        file: &File,
        segment: &str,
        kind: LockKind,
        deadline: Instant,
        config: &LockConfig,
    ) -> Result<Option<Self>> {
        // The creator may not have sized the object yet.
        while file.metadata()?.len() < SEGMENT_LEN as u64 {
            wait_or_timeout(segment, deadline, config)?;
        }

        let mapping = Mapping::map(file, segment)?;
        loop {
            match register(mapping.handles()) {
                Registration::Joined => break,
                Registration::Retired => return Ok(None),
                Registration::Pending => wait_or_timeout(segment, deadline, config)?,
            }
        }
        // Counted from here on; dropping `attacher` uncounts us.
        let attacher = Self {
            mapping,
            pid: process_id(),
        };

        // SAFETY: these fields were written before READY was published and
        // never change afterwards.
        let (version, raw_kind) = unsafe {
            let header = attacher.mapping.header();
            ((*header).version, (*header).kind)
        };
        if version != LAYOUT_VERSION {
            return Err(LockError::layout_mismatch(
                segment,
                format!("layout version {version}, expected {LAYOUT_VERSION}"),
            ));
        }
        if LockKind::from_raw(raw_kind) != Some(kind) {
            return Err(LockError::layout_mismatch(
                segment,
                format!("stored kind {raw_kind}, expected {kind}"),
            ));
        }

        tracing::debug!(%segment, %kind, pid = attacher.pid, "attached to shared lock segment");
        Ok(Some(attacher))
    }
}

impl Drop for Attacher {
    fn drop(&mut self) {
        if process_id() != self.pid {
            return;
        }
        let remaining = leave(self.mapping.handles());
        tracing::debug!(segment = %self.mapping.segment, remaining, "detached from shared lock segment");
    }
}

/// Ownership of a shared segment.
pub(crate) enum SharedHandle {
    /// This handle created the segment and may destroy it.
    Owned(Creator),
    /// This handle opened a segment created elsewhere.
    Attached(Attacher),
}

impl SharedHandle {
    fn mapping(&self) -> &Mapping {
        match self {
            Self::Owned(creator) => &creator.mapping,
            Self::Attached(attacher) => &attacher.mapping,
        }
    }
}

/// Record in a named shared memory segment, visible to every process that
/// opens the same lock name and kind.
pub(crate) struct SharedBacking {
    handle: SharedHandle,
}

impl SharedBacking {
    /// Create the segment for `name`, or attach to it if it already exists.
    pub(crate) fn attach_or_create(kind: LockKind, name: &str, config: &LockConfig) -> Result<Self> {
        let segment = segment_name(&config.namespace, kind, name);
        let deadline = Instant::now() + config.attach_timeout;
        let owner_only = Mode::S_IRUSR | Mode::S_IWUSR;

        loop {
            match shm_open(
                segment.as_str(),
                OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
                owner_only,
            ) {
                Ok(fd) => {
                    let creator = Creator::create(&File::from(fd), &segment, kind)?;
                    return Ok(Self {
                        handle: SharedHandle::Owned(creator),
                    });
                }
                Err(Errno::EEXIST) => {}
                Err(e) => return Err(open_error(&segment, e)),
            }

            match shm_open(segment.as_str(), OFlag::O_RDWR, Mode::empty()) {
                Ok(fd) => {
                    if let Some(attacher) =
                        Attacher::attach(&File::from(fd), &segment, kind, deadline, config)?
                    {
                        return Ok(Self {
                            handle: SharedHandle::Attached(attacher),
                        });
                    }
                }
                // Unlinked between our two opens.
                Err(Errno::ENOENT) => {}
                Err(e) => return Err(open_error(&segment, e)),
            }

            wait_or_timeout(&segment, deadline, config)?;
        }
    }

    /// True if this handle created the segment.
    pub(crate) const fn is_creator(&self) -> bool {
        matches!(self.handle, SharedHandle::Owned(_))
    }

    /// Shared memory object name.
    pub(crate) fn segment(&self) -> &str {
        &self.handle.mapping().segment
    }
}

impl Backing for SharedBacking {
    type Guard<'a>
        = SegmentGuard<'a>
    where
        Self: 'a;

    fn lock_record(&self) -> Self::Guard<'_> {
        self.handle.mapping().lock()
    }

    fn wait(&self, guard: &mut Self::Guard<'_>) {
        let mapping = guard.mapping;
        // SAFETY: the guard proves we hold the mutex the condition variable
        // is paired with; both were initialized process-shared by the creator.
        let rc = unsafe { libc::pthread_cond_wait(mapping.signal(), mapping.mutex()) };
        if rc != 0 {
            diag::fatal(&format!(
                "failed to wait on shared lock {} (errno={rc})",
                mapping.segment
            ));
        }
    }

    fn wake_all(&self) {
        let mapping = self.handle.mapping();
        // SAFETY: initialized process-shared by the creator.
        let rc = unsafe { libc::pthread_cond_broadcast(mapping.signal()) };
        if rc != 0 {
            diag::fatal(&format!(
                "failed to signal shared lock {} (errno={rc})",
                mapping.segment
            ));
        }
    }
}

/// Initialize the mutex and condition variable as process-shared.
///
/// # Safety
///
/// Both pointers must be valid for writes and not in use by anyone.
unsafe fn init_primitives(
    mutex: *mut libc::pthread_mutex_t,
    signal: *mut libc::pthread_cond_t,
) -> Result<()> {
    let mut mutex_attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
    // SAFETY: attribute objects are initialized before use and destroyed
    // after; `mutex` is valid per the caller's contract.
    unsafe {
        check(libc::pthread_mutexattr_init(mutex_attr.as_mut_ptr()), "pthread_mutexattr_init")?;
        let mut rc = libc::pthread_mutexattr_setpshared(
            mutex_attr.as_mut_ptr(),
            libc::PTHREAD_PROCESS_SHARED,
        );
        if rc == 0 {
            rc = libc::pthread_mutex_init(mutex, mutex_attr.as_ptr());
        }
        libc::pthread_mutexattr_destroy(mutex_attr.as_mut_ptr());
        check(rc, "pthread_mutex_init")?;
    }

    let mut cond_attr = MaybeUninit::<libc::pthread_condattr_t>::uninit();
    // SAFETY: as above; on failure the already initialized mutex is destroyed.
    unsafe {
        let mut rc = libc::pthread_condattr_init(cond_attr.as_mut_ptr());
        if rc == 0 {
            rc = libc::pthread_condattr_setpshared(
                cond_attr.as_mut_ptr(),
                libc::PTHREAD_PROCESS_SHARED,
            );
            if rc == 0 {
                rc = libc::pthread_cond_init(signal, cond_attr.as_ptr());
            }
            libc::pthread_condattr_destroy(cond_attr.as_mut_ptr());
        }
        if rc != 0 {
            libc::pthread_mutex_destroy(mutex);
        }
        check(rc, "pthread_cond_init")
    }
}

fn check(rc: libc::c_int, primitive: &'static str) -> Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(LockError::PrimitiveInit { primitive, errno: rc })
    }
}

fn open_error(segment: &str, e: Errno) -> LockError {
    LockError::ShmOpen {
        segment: segment.to_string(),
        errno: e as i32,
    }
}

/// Remove a name whose creation failed half way.
fn discard_name(segment: &str) {
    if let Err(e) = shm_unlink(segment) {
        tracing::warn!(%segment, "failed to remove half-created segment: {e}");
    }
}

fn wait_or_timeout(segment: &str, deadline: Instant, config: &LockConfig) -> Result<()> {
    if Instant::now() >= deadline {
        return Err(LockError::AttachTimeout {
            segment: segment.to_string(),
            waited: config.attach_timeout,
        });
    }
    std::thread::sleep(config.poll_interval);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::{acquire, release, status};
    use crate::record::ReleaseOutcome;
    use crate::types::{LockMode, LockState};
    use std::sync::atomic::AtomicUsize;
    use zy_sys::ThreadIdentity;

    fn unique(tag: &str) -> String {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        format!(
            "shared-{tag}-{}-{}",
            process_id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        )
    }

    fn live(backing: &SharedBacking) -> u32 {
        backing.handle.mapping().handles().load(Ordering::Acquire) & HANDLES_COUNT
    }

    #[test]
    fn test_register_waits_for_publication() {
        let handles = AtomicU32::new(0);
        assert_eq!(register(&handles), Registration::Pending);

        handles.store(HANDLES_READY | 1, Ordering::Release);
        assert_eq!(register(&handles), Registration::Joined);
        assert_eq!(handles.load(Ordering::Acquire) & HANDLES_COUNT, 2);
    }

    #[test]
    fn test_retired_segment_refuses_registration() {
        let handles = AtomicU32::new(HANDLES_READY | 1);
        assert_eq!(retire_or_leave(&handles), 0);
        assert_eq!(handles.load(Ordering::Acquire), HANDLES_RETIRED);
        assert_eq!(register(&handles), Registration::Retired);
        assert_eq!(handles.load(Ordering::Acquire), HANDLES_RETIRED);
    }

    #[test]
    fn test_creator_leaves_without_retiring_while_others_remain() {
        let handles = AtomicU32::new(HANDLES_READY | 1);
        assert_eq!(register(&handles), Registration::Joined);
        assert_eq!(retire_or_leave(&handles), 1);
        assert_eq!(register(&handles), Registration::Joined);
        assert_eq!(leave(&handles), 1);
        assert_eq!(leave(&handles), 0);
        assert_eq!(handles.load(Ordering::Acquire), HANDLES_READY);
    }

    #[test]
    fn test_attach_after_teardown_of_mapped_segment() {
        let config = LockConfig::default();
        let name = unique("mapped-then-retired");
        let creator = SharedBacking::attach_or_create(LockKind::Mutex, &name, &config).unwrap();

        // Opened and mapped, but not yet counted, when the creator goes.
        let segment = segment_name(&config.namespace, LockKind::Mutex, &name);
        let file = File::from(shm_open(segment.as_str(), OFlag::O_RDWR, Mode::empty()).unwrap());
        drop(creator);

        let deadline = Instant::now() + config.attach_timeout;
        let attached = Attacher::attach(&file, &segment, LockKind::Mutex, deadline, &config).unwrap();
        assert!(attached.is_none());
    }

    #[test]
    fn test_attach_races_creator_teardown() {
        let config = LockConfig::default();
        for round in 0..200u64 {
            let name = unique("race");
            let creator =
                SharedBacking::attach_or_create(LockKind::ReaderWriter, &name, &config).unwrap();
            let me = ThreadIdentity::current();

            std::thread::scope(|s| {
                let joiner = s.spawn(|| {
                    SharedBacking::attach_or_create(LockKind::ReaderWriter, &name, &config)
                });
                std::thread::sleep(std::time::Duration::from_micros(round % 50));
                drop(creator);

                let joined = joiner.join().unwrap().unwrap();
                acquire(&joined, LockMode::Write, me).unwrap();
                assert_eq!(release(&joined), ReleaseOutcome::Released { wake: false });
            });
            let _ = remove_segment(LockKind::ReaderWriter, &name, &config);
        }
    }

    #[test]
    fn test_segment_name_shape() {
        let name = segment_name("zy", LockKind::ReaderWriter, "orders");
        assert!(name.starts_with("/zy-"));
        assert_eq!(name.len(), 4 + NAME_HASH_BYTES * 2);
        assert!(name[4..].chars().all(|c| c.is_ascii_hexdigit()));
        assert!(name.len() <= 31);
    }

    #[test]
    fn test_segment_name_is_stable_and_distinct() {
        let a = segment_name("zy", LockKind::ReaderWriter, "orders");
        assert_eq!(a, segment_name("zy", LockKind::ReaderWriter, "orders"));
        assert_ne!(a, segment_name("zy", LockKind::Mutex, "orders"));
        assert_ne!(a, segment_name("zy", LockKind::ReaderWriter, "orders2"));
        assert_ne!(a, segment_name("svc", LockKind::ReaderWriter, "orders"));
    }

    #[test]
    fn test_segment_header_layout() {
        assert_eq!(std::mem::size_of::<SegmentHeader>(), 24);
        assert_eq!(std::mem::offset_of!(Segment, record), 24);
    }

    #[test]
    fn test_create_then_attach() {
        let config = LockConfig::default();
        let name = unique("attach");
        let first = SharedBacking::attach_or_create(LockKind::ReaderWriter, &name, &config).unwrap();
        let second = SharedBacking::attach_or_create(LockKind::ReaderWriter, &name, &config).unwrap();

        assert!(first.is_creator());
        assert!(!second.is_creator());
        assert_eq!(first.segment(), second.segment());
        assert_eq!(live(&first), 2);

        drop(second);
        assert_eq!(live(&first), 1);
        drop(first);
        assert!(!remove_segment(LockKind::ReaderWriter, &name, &config).unwrap());
    }

    #[test]
    fn test_state_is_shared_between_handles() {
        let config = LockConfig::default();
        let name = unique("state");
        let first = SharedBacking::attach_or_create(LockKind::ReaderWriter, &name, &config).unwrap();
        let second = SharedBacking::attach_or_create(LockKind::ReaderWriter, &name, &config).unwrap();
        let me = ThreadIdentity::current();

        acquire(&first, LockMode::Read, me).unwrap();
        let seen = status(&second);
        assert_eq!(seen.state, LockState::ReadHeld);
        assert_eq!(seen.held_count, 1);
        assert_eq!(release(&second), ReleaseOutcome::Released { wake: false });
        assert!(status(&first).is_idle());
    }

    #[test]
    fn test_attacher_drop_leaves_creator_usable() {
        let config = LockConfig::default();
        let name = unique("attacher-drop");
        let creator = SharedBacking::attach_or_create(LockKind::Mutex, &name, &config).unwrap();
        let attacher = SharedBacking::attach_or_create(LockKind::Mutex, &name, &config).unwrap();
        drop(attacher);

        let me = ThreadIdentity::current();
        acquire(&creator, LockMode::Write, me).unwrap();
        assert_eq!(release(&creator), ReleaseOutcome::Released { wake: false });
    }

    #[test]
    fn test_creator_drop_with_attachers_keeps_segment() {
        let config = LockConfig::default();
        let name = unique("creator-first");
        let creator = SharedBacking::attach_or_create(LockKind::ReaderWriter, &name, &config).unwrap();
        let attacher = SharedBacking::attach_or_create(LockKind::ReaderWriter, &name, &config).unwrap();
        drop(creator);

        let me = ThreadIdentity::current();
        acquire(&attacher, LockMode::Write, me).unwrap();
        assert_eq!(release(&attacher), ReleaseOutcome::Released { wake: false });

        // A later opener joins the surviving segment.
        let late = SharedBacking::attach_or_create(LockKind::ReaderWriter, &name, &config).unwrap();
        assert!(!late.is_creator());
        drop(late);
        drop(attacher);
        assert!(remove_segment(LockKind::ReaderWriter, &name, &config).unwrap());
    }

    #[test]
    fn test_name_reusable_after_teardown() {
        let config = LockConfig::default();
        let name = unique("reuse");
        let first = SharedBacking::attach_or_create(LockKind::Mutex, &name, &config).unwrap();
        drop(first);
        let again = SharedBacking::attach_or_create(LockKind::Mutex, &name, &config).unwrap();
        assert!(again.is_creator());
    }

    #[test]
    fn test_attach_times_out_on_unfinished_segment() {
        let config = LockConfig::builder()
            .attach_timeout(std::time::Duration::from_millis(50))
            .build();
        let name = unique("stalled");
        let segment = segment_name(&config.namespace, LockKind::Mutex, &name);
        // A creator that died before sizing the object.
        let fd = shm_open(
            segment.as_str(),
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .unwrap();

        let err = SharedBacking::attach_or_create(LockKind::Mutex, &name, &config)
            .err()
            .unwrap();
        assert!(matches!(err, LockError::AttachTimeout { .. }));

        drop(fd);
        assert!(remove_segment(LockKind::Mutex, &name, &config).unwrap());
    }
}
