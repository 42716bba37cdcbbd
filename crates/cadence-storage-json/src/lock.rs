//! Exclusive lock files guarding registry and crontab mutations.

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant, SystemTime},
};

use cadence_core::CoreError;
use tracing::{debug, info, warn};
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Age past which a lock file is broken even when its holder looks alive.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(300);

/// Held while a mutation is in progress; the lock file is removed on drop, so
/// every exit path (including `?` and panics) releases it.
#[derive(Debug)]
pub struct MutationLock {
    path: PathBuf,
}

impl MutationLock {
    /// Creates the lock file exclusively, polling until `timeout` elapses.
    /// Works across threads and across processes sharing the file system.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, CoreError> {
        Self::acquire_with(path, timeout, DEFAULT_STALE_AFTER)
    }

    /// Like [`MutationLock::acquire`], breaking a lock left behind by a dead
    /// process, or one older than `stale_after`.
    pub fn acquire_with(
        path: &Path,
        timeout: Duration,
        stale_after: Duration,
    ) -> Result<Self, CoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| CoreError::persistence_at(parent, err))?;
        }
        let started = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    let lock = Self {
                        path: path.to_path_buf(),
                    };
                    writeln!(file, "{}", std::process::id())
                        .and_then(|()| file.sync_all())
                        .map_err(|err| {
                            warn!(path = %path.display(), error = %err, "failed to record holder");
                            CoreError::persistence_at(path, err)
                        })?;
                    debug!(path = %path.display(), "mutation lock acquired");
                    return Ok(lock);
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    if let Some(holder) = stale_holder(path, stale_after) {
                        break_stale(path, &holder);
                        continue;
                    }
                    let waited = started.elapsed();
                    if waited >= timeout {
                        let waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX);
                        warn!(path = %path.display(), waited_ms, "mutation lock timed out");
                        return Err(CoreError::lock_timeout(path, waited_ms));
                    }
                    thread::sleep(POLL_INTERVAL.min(timeout - waited));
                }
                Err(err) => return Err(CoreError::persistence_at(path, err)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MutationLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "mutation lock released"),
            Err(err) => warn!(path = %self.path.display(), error = %err, "failed to release lock"),
        }
    }
}

/// Contents of a lock file judged stale: its holder is gone or it is too old.
/// A file still being written (no pid yet) only goes stale by age.
fn stale_holder(path: &Path, stale_after: Duration) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    let age = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .unwrap_or_default();
    let holder_gone = contents
        .trim()
        .parse::<u32>()
        .ok()
        .and_then(process_alive)
        .is_some_and(|alive| !alive);
    (holder_gone || age > stale_after).then_some(contents)
}

/// Moves the stale file aside atomically. If another waiter already replaced it
/// with a live lock in the meantime, that lock is put back.
fn break_stale(path: &Path, observed: &str) {
    let mut tombstone = path.as_os_str().to_owned();
    tombstone.push(format!(".{}.stale", Uuid::new_v4()));
    let tombstone = PathBuf::from(tombstone);
    if fs::rename(path, &tombstone).is_err() {
        return;
    }
    let moved = fs::read_to_string(&tombstone).unwrap_or_default();
    if moved != observed {
        if let Err(err) = fs::hard_link(&tombstone, path) {
            warn!(path = %path.display(), error = %err, "failed to restore a live lock");
        }
    } else {
        info!(path = %path.display(), holder = moved.trim(), "broke stale mutation lock");
    }
    let _ = fs::remove_file(&tombstone);
}

/// `None` when liveness cannot be determined for `pid`.
#[cfg(unix)]
fn process_alive(pid: u32) -> Option<bool> {
    let pid = libc::pid_t::try_from(pid).ok().filter(|pid| *pid > 0)?;
    // Signal 0 checks existence and permission without delivering anything.
    let rc = unsafe { libc::kill(pid, 0) };
    if rc == 0 {
        return Some(true);
    }
    match io::Error::last_os_error().raw_os_error() {
        Some(libc::ESRCH) => Some(false),
        Some(libc::EPERM) => Some(true),
        _ => None,
    }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> Option<bool> {
    None
}
