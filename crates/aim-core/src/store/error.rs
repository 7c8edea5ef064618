//! Store failure modes

use std::path::PathBuf;
use thiserror::Error;

/// Why a store operation failed.
///
/// Every variant is transient from the caller's side: the document on disk
/// is replaced atomically, so none of these leave it half-written and a
/// retry is always safe. The kernel surfaces all of them as its
/// storage-failure kind.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Another process kept the store lock for the whole wait budget.
    /// Writers hold the lock only for one read-modify-write, so this means
    /// real contention (or a wedged peer), not a long transaction.
    #[error("store lock at {path} still held after {waited_ms} ms")]
    LockBusy { path: PathBuf, waited_ms: u64 },

    /// Reading, writing, or replacing a store file failed
    #[error("store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The store document would not decode, or a record in it would not
    /// encode
    #[error("store document at {path} is not usable JSON: {source}")]
    Document {
        path: PathBuf,
        source: serde_json::Error,
    },
}
