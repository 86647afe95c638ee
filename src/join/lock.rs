//! Advisory file locking (spec §4.1 "Locking discipline", §9).
//!
//! Per-file and per-index locks are both realized as sibling `.lock` files
//! guarded by `fs4`'s advisory `flock`-style locking. Acquisition is bounded
//! by a timeout so a crashed holder cannot stall the process forever.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs4::fs_std::FileExt;

use super::error::{JoinError, JoinResult};

/// Default bound on lock acquisition (spec §5, §9).
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// An acquired advisory lock. Releases on drop.
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire an exclusive lock on the sibling lock file at `lock_path`,
    /// creating it if necessary.
    pub fn acquire_exclusive(lock_path: &Path, timeout: Duration) -> JoinResult<Self> {
        Self::acquire(lock_path, timeout, true)
    }

    /// Acquire a shared (read) lock on the sibling lock file at `lock_path`.
    pub fn acquire_shared(lock_path: &Path, timeout: Duration) -> JoinResult<Self> {
        Self::acquire(lock_path, timeout, false)
    }

    fn acquire(lock_path: &Path, timeout: Duration, exclusive: bool) -> JoinResult<Self> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path)?;

        let start = Instant::now();
        loop {
            let attempt = if exclusive {
                file.try_lock_exclusive()
            } else {
                file.try_lock_shared()
            };

            match attempt {
                Ok(()) => {
                    return Ok(FileLock {
                        _file: file,
                        path: lock_path.to_path_buf(),
                    });
                }
                Err(_) if start.elapsed() < timeout => {
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(JoinError::Io(format!(
                        "timed out acquiring lock {}: {e}",
                        lock_path.display()
                    )));
                }
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self._file) {
            tracing::warn!("failed to unlock {}: {}", self.path.display(), e);
        }
    }
}

/// The sibling lock-file path for a given data file (`foo.json` -> `foo.json.lock`).
pub fn sibling_lock_path(data_path: &Path) -> PathBuf {
    let mut os_string = data_path.as_os_str().to_owned();
    os_string.push(".lock");
    PathBuf::from(os_string)
}

/// Removes stale sibling `.lock` files under `dir` at startup (spec §9:
/// "have `FromConfig` clear stale sibling lock files at startup"). Advisory
/// locks release automatically when their owning process exits, so any
/// `.lock` file found here is safe to remove: nothing still holds a live
/// flock on a file this process is about to take ownership of.
pub fn clear_stale_locks(dir: &Path) -> JoinResult<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("lock") {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!("failed to clear stale lock {}: {}", path.display(), e);
            }
        }
    }
    Ok(())
}
