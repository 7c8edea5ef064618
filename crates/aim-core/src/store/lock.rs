//! Cross-process store locking
//!
//! Every writer on the host funnels through one advisory lock beside the
//! store document, and holds it only for a single read-modify-write of that
//! document. Contention is therefore measured in milliseconds, so a blocked
//! writer polls on a fixed cadence and gives up once a wait budget elapses;
//! there is nothing to gain from backing off against work that short.
//! Readers never touch the lock (the atomic replace keeps the document
//! consistent for them), so a polling writer cannot starve anyone.

use crate::store::error::StoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::{Duration, Instant};

/// Cadence at which a blocked writer re-checks the lock.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Holds the store lock until dropped.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // Unlock eagerly instead of letting the descriptor's close do it,
        // to keep the window for polling writers short. Fully qualified
        // because std is growing a colliding `File::unlock`.
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// Take the exclusive store lock, waiting at most `budget`.
///
/// The lock file is created on first use and never deleted while a server
/// is running; graceful shutdown removes it. `fs2` maps this to flock on
/// Unix and LockFileEx on Windows, so every ai-mail process on the host
/// contends on the same lock regardless of how it opened the store.
///
/// # Errors
///
/// [`StoreError::LockBusy`] when `budget` elapses with the lock still held
/// elsewhere; [`StoreError::Io`] when the lock file cannot be opened or the
/// lock call fails for any reason other than contention.
pub fn lock_exclusive(path: &Path, budget: Duration) -> Result<StoreLock, StoreError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

    let started = Instant::now();
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(StoreLock { file }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                let waited = started.elapsed();
                if waited >= budget {
                    return Err(StoreError::LockBusy {
                        path: path.to_path_buf(),
                        waited_ms: waited.as_millis() as u64,
                    });
                }
                // Never sleep past the budget's end.
                std::thread::sleep(POLL_INTERVAL.min(budget - waited));
            }
            Err(e) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        }
    }
}
