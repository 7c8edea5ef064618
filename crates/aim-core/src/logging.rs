//! Logging setup for ai-mail binaries.
//!
//! Two constraints shape this:
//!
//! - stdout carries the JSON-RPC transport, so every log line goes to
//!   stderr; a stray line on stdout would corrupt a framed response.
//! - `AI_MAIL_LOG` takes a full tracing filter directive, not just a level
//!   (`debug`, `aim_core=trace`, `warn,aim_mcp::server=debug`, ...), so one
//!   noisy module can be turned up without drowning the heartbeat and tool
//!   call events the server emits at info/debug.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::EnvFilter;

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Filter applied when `AI_MAIL_LOG` is unset or unparseable.
const DEFAULT_FILTER: &str = "info";

/// Install the process-wide subscriber. Safe to call more than once; only
/// the first call takes effect, and failure to install (e.g. a subscriber
/// set by test harness) is deliberately ignored.
pub fn init() {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }
    let filter =
        EnvFilter::try_from_env("AI_MAIL_LOG").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}
