//! Lock probe: drives one side of a cross-process lock scenario.
//!
//! Prints one line per step on stdout so a supervising process can follow
//! along. Timestamps are microseconds since the Unix epoch.
//!
//! # Usage
//!
//! ```bash
//! zy-lock-probe hold <mutex|rwlock> <name> <read|write> <millis>
//! zy-lock-probe attach <mutex|rwlock> <name>
//! zy-lock-probe self-deadlock <mutex|rwlock> [name]
//! ```

use std::process::ExitCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use zy_sync::{Guard, Lock, LockKind, LockMode};

const USAGE: &str = "usage: zy-lock-probe hold <kind> <name> <mode> <millis>
       zy-lock-probe attach <kind> <name>
       zy-lock-probe self-deadlock <kind> [name]";

fn main() -> ExitCode {
    zy_sys::init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let outcome = match args.as_slice() {
        ["hold", kind, name, mode, millis] => hold(kind, name, mode, millis),
        ["attach", kind, name] => attach(kind, name),
        ["self-deadlock", kind] => self_deadlock(kind, None),
        ["self-deadlock", kind, name] => self_deadlock(kind, Some(*name)),
        _ => Err(USAGE.to_string()),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(2)
        }
    }
}

fn hold(kind: &str, name: &str, mode: &str, millis: &str) -> Result<(), String> {
    let kind: LockKind = kind.parse()?;
    let mode: LockMode = mode.parse()?;
    let millis: u64 = millis
        .parse()
        .map_err(|e| format!("invalid duration {millis:?}: {e}"))?;

    let lock = Lock::try_new(kind, Some(name)).map_err(|e| e.to_string())?;
    println!("ready creator={}", lock.is_creator());

    let guard = Guard::new(&lock, mode, true);
    println!("acquired {}", epoch_micros());
    std::thread::sleep(Duration::from_millis(millis));
    println!("releasing {}", epoch_micros());
    drop(guard);

    tracing::info!(%lock, %mode, "probe done");
    Ok(())
}

fn attach(kind: &str, name: &str) -> Result<(), String> {
    let kind: LockKind = kind.parse()?;
    let lock = Lock::try_new(kind, Some(name)).map_err(|e| e.to_string())?;
    println!("attached creator={}", lock.is_creator());
    Ok(())
}

fn self_deadlock(kind: &str, name: Option<&str>) -> Result<(), String> {
    let kind: LockKind = kind.parse()?;
    let lock = Lock::try_new(kind, name).map_err(|e| e.to_string())?;

    let _write = Guard::write(&lock);
    println!("holding write");
    let _read = Guard::read(&lock);
    // Only a mutex gets here.
    println!("recursed");
    Ok(())
}

fn epoch_micros() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_micros())
}
