//! Cross-process tests for named locks.
//!
//! The other side of each scenario is the `zy-lock-probe` binary, which
//! reports its progress on stdout. Each test attempts to falsify one claim
//! about locks shared between processes.

#![cfg(unix)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::io::{BufRead, BufReader, Lines};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use zy_sync::{Guard, Lock, LockConfig, LockKind, LockMode, LockStatus};

const PROBE: &str = env!("CARGO_BIN_EXE_zy-lock-probe");

fn unique(tag: &str) -> String {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    format!(
        "xp-{tag}-{}-{}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    )
}

fn epoch_micros() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_micros()
}

fn wait_for(lock: &Lock, pred: impl Fn(&LockStatus) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !pred(&lock.status()) {
        assert!(
            Instant::now() < deadline,
            "timed out waiting on {lock}: {:?}",
            lock.status()
        );
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// A running probe; killed if the test bails out early.
struct Probe {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

impl Probe {
    fn spawn(args: &[&str]) -> Self {
        let mut child = Command::new(PROBE)
            .args(args)
            .env("ZY_LOG", "info")
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .expect("spawn probe");
        let stdout = child.stdout.take().expect("probe stdout");
        Self {
            child,
            lines: BufReader::new(stdout).lines(),
        }
    }

    /// Next stdout line, which must start with `prefix`; returns the rest.
    fn expect(&mut self, prefix: &str) -> String {
        let line = self
            .lines
            .next()
            .expect("probe exited early")
            .expect("read probe stdout");
        let rest = line
            .strip_prefix(prefix)
            .unwrap_or_else(|| panic!("expected {prefix:?}, probe said {line:?}"));
        rest.trim().to_string()
    }

    fn expect_time(&mut self, prefix: &str) -> u128 {
        self.expect(prefix).parse().expect("probe timestamp")
    }

    fn finish(mut self) {
        let status = self.child.wait().expect("wait for probe");
        assert!(status.success(), "probe failed: {status}");
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn remove(kind: LockKind, name: &str) {
    let _ = Lock::remove(kind, name, &LockConfig::default());
}

// =============================================================================
// Exclusion and ordering
// =============================================================================

fn blocked_until_release(child_mode: LockMode) {
    let name = unique(child_mode.name());
    let lock = Lock::new(LockKind::ReaderWriter, Some(&name));
    assert!(lock.is_creator());
    let guard = Guard::write(&lock);

    let mut probe = Probe::spawn(&["hold", "rwlock", &name, child_mode.name(), "0"]);
    assert_eq!(probe.expect("ready creator="), "false");

    wait_for(&lock, |st| match child_mode {
        LockMode::Read => st.readers_waiting == 1,
        LockMode::Write => st.writers_waiting == 1,
    });
    let released = epoch_micros();
    drop(guard);

    let acquired = probe.expect_time("acquired ");
    assert!(
        acquired >= released,
        "FALSIFIED: probe acquired {child_mode} at {acquired}, before release at {released}"
    );
    probe.expect("releasing ");
    probe.finish();

    assert!(lock.status().is_idle());
}

/// A writer in one process excludes a reader in another.
#[test]
fn writer_blocks_reader_in_other_process() {
    blocked_until_release(LockMode::Read);
}

/// A writer in one process excludes a writer in another.
#[test]
fn writer_blocks_writer_in_other_process() {
    blocked_until_release(LockMode::Write);
}

/// A lock held by another process blocks this one until that process
/// releases it.
#[test]
fn holder_in_other_process_blocks_local_writer() {
    let name = unique("held");
    let mut probe = Probe::spawn(&["hold", "mutex", &name, "write", "300"]);
    assert_eq!(probe.expect("ready creator="), "true");
    probe.expect("acquired ");

    let lock = Lock::new(LockKind::Mutex, Some(&name));
    assert!(!lock.is_creator());
    let guard = Guard::write(&lock);
    let acquired = epoch_micros();

    let released = probe.expect_time("releasing ");
    assert!(
        acquired >= released,
        "FALSIFIED: acquired at {acquired} while the probe held until {released}"
    );
    drop(guard);
    probe.finish();

    // The creator exited while we were attached; we keep working.
    {
        let _again = Guard::write(&lock);
        assert_eq!(lock.status().held_count, 1);
    }
    assert!(lock.status().is_idle());

    drop(lock);
    remove(LockKind::Mutex, &name);
}

/// Readers in different processes hold the lock together.
#[test]
fn readers_in_different_processes_share() {
    let name = unique("share");
    let lock = Lock::new(LockKind::ReaderWriter, Some(&name));
    let _mine = Guard::read(&lock);

    let mut probe = Probe::spawn(&["hold", "rwlock", &name, "read", "0"]);
    probe.expect("ready creator=");
    probe.expect("acquired ");
    probe.expect("releasing ");
    probe.finish();

    assert_eq!(lock.status().held_count, 1);
}

// =============================================================================
// Self-deadlock
// =============================================================================

/// Read after write on the same thread aborts the process with a diagnostic.
#[test]
fn self_deadlock_aborts_with_diagnostic() {
    let output = Command::new(PROBE)
        .args(["self-deadlock", "rwlock"])
        .env("ZY_LOG", "info")
        .output()
        .expect("run probe");

    assert!(!output.status.success(), "FALSIFIED: self-deadlock returned");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("holding write"));
    assert!(!stdout.contains("recursed"));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("self-deadlock"),
        "FALSIFIED: no diagnostic on stderr: {stderr}"
    );
}

/// The same check applies to process-shared locks.
#[test]
fn self_deadlock_detected_on_named_lock() {
    let name = unique("deadlock");
    let output = Command::new(PROBE)
        .args(["self-deadlock", "rwlock", &name])
        .env("ZY_LOG", "info")
        .output()
        .expect("run probe");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("self-deadlock"));
    remove(LockKind::ReaderWriter, &name);
}

/// A mutex treats the read request as a recursive write.
#[test]
fn mutex_recursion_is_not_deadlock() {
    let output = Command::new(PROBE)
        .args(["self-deadlock", "mutex"])
        .output()
        .expect("run probe");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("recursed"));
}

// =============================================================================
// Lifecycle
// =============================================================================

/// An attacher that exits leaves the creator's lock intact, and the
/// creator tears the segment down when it goes.
#[test]
fn creator_owns_teardown() {
    let name = unique("teardown");
    let lock = Lock::new(LockKind::ReaderWriter, Some(&name));

    let mut probe = Probe::spawn(&["attach", "rwlock", &name]);
    assert_eq!(probe.expect("attached creator="), "false");
    probe.finish();

    {
        let _w = Guard::write(&lock);
        assert_eq!(lock.status().held_count, 1);
    }
    drop(lock);

    assert!(
        !Lock::remove(LockKind::ReaderWriter, &name, &LockConfig::default()).unwrap(),
        "FALSIFIED: segment survived its creator"
    );
}

/// A name whose creator has gone is created afresh by the next user.
#[test]
fn name_is_reusable_after_teardown() {
    let name = unique("reuse");
    drop(Lock::new(LockKind::Mutex, Some(&name)));

    let mut probe = Probe::spawn(&["attach", "mutex", &name]);
    assert_eq!(probe.expect("attached creator="), "true");
    probe.finish();
}

/// Bad arguments are reported, not panicked on.
#[test]
fn probe_rejects_bad_usage() {
    let output = Command::new(PROBE)
        .args(["hold", "semaphore", "x", "read", "0"])
        .output()
        .expect("run probe");
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown lock kind"));
}
