//! Data directory resolution
//!
//! All processes sharing a mailbox must agree on one directory for the store
//! file. Resolution precedence:
//!
//! 1. `AI_MAIL_DATA_DIR` environment variable (if set and non-empty)
//! 2. `~/.ai_mail` under the platform home directory
//!
//! Tests and custom deployments point `AI_MAIL_DATA_DIR` at a scratch
//! directory; nothing else in the crate reads the environment for paths.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "AI_MAIL_DATA_DIR";

/// Directory name under `$HOME` when no override is set.
const DEFAULT_DIR_NAME: &str = ".ai_mail";

/// Resolve the directory holding the store file.
///
/// # Errors
///
/// Fails only when `AI_MAIL_DATA_DIR` is unset and the platform home
/// directory cannot be determined.
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        let trimmed = dir.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    dirs::home_dir()
        .map(|home| home.join(DEFAULT_DIR_NAME))
        .context("could not determine home directory")
}
