//! Agent identity detection and presence constants
//!
//! Every server process speaks for exactly one agent. The name is resolved
//! once at startup:
//!
//! 1. `AI_AGENT_NAME` environment override
//! 2. Best-effort host heuristics: the client terminal hint (`TERM_PROGRAM`),
//!    then the parent process name
//! 3. Fallback `agent-<short-hostname>`
//!
//! Whatever the source, the candidate is normalized to the agent-name
//! grammar (3–64 chars, `[a-z0-9]` with single interior dashes) before the
//! store allocates a unique variant of it under the write lock
//! ([`crate::store::MailStore::register_agent`]).

use std::time::Duration;

/// Environment variable overriding agent-name detection.
pub const AGENT_NAME_ENV: &str = "AI_AGENT_NAME";

/// How often the server refreshes its own `last_seen`.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// `list_agents(active_only)` window: agents seen within the last hour.
pub const ACTIVE_WINDOW_MINS: i64 = 60;

/// Registrations idle longer than this are dropped by `--cleanup`.
pub const STALE_AGENT_DAYS: i64 = 30;

/// Normalize a raw candidate to the agent-name grammar.
///
/// Lowercases, maps separator characters (`-_. ` and friends) to single
/// dashes, strips everything else, and trims leading/trailing dashes.
/// Returns `None` when fewer than 3 characters survive; longer names are
/// cut at 64.
pub fn sanitize_name(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len().min(64));
    let mut pending_dash = false;
    for ch in raw.chars() {
        match ch.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9') => {
                if pending_dash && !out.is_empty() {
                    out.push('-');
                }
                pending_dash = false;
                out.push(c);
            }
            '-' | '_' | '.' | ' ' | '/' | '@' => pending_dash = true,
            _ => {}
        }
    }
    out.truncate(64);
    while out.ends_with('-') {
        out.pop();
    }
    if out.len() < 3 { None } else { Some(out) }
}

/// The host's name up to the first dot, for fallback agent names.
pub fn short_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .and_then(|h| h.split('.').next().map(str::to_string))
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Stable opaque identifier of this host.
///
/// Prefers the systemd/dbus machine id; hosts without one fall back to the
/// short hostname, which is stable enough for the single-host scope.
pub fn machine_id() -> String {
    for path in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
        if let Ok(content) = std::fs::read_to_string(path) {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    short_hostname()
}

/// Resolve the base agent name for this process (before collision
/// resolution). Never fails; the hostname fallback always yields a name.
pub fn detect_agent_name() -> String {
    let candidates = [
        std::env::var(AGENT_NAME_ENV).ok(),
        std::env::var("TERM_PROGRAM").ok(),
        parent_process_name(),
    ];
    for candidate in candidates.into_iter().flatten() {
        if let Some(name) = sanitize_name(&candidate) {
            return name;
        }
    }
    fallback_name()
}

fn fallback_name() -> String {
    sanitize_name(&format!("agent-{}", short_hostname()))
        .unwrap_or_else(|| "agent-local".to_string())
}

/// Name of the parent process, read from procfs where available.
#[cfg(target_os = "linux")]
fn parent_process_name() -> Option<String> {
    let ppid = unsafe { libc::getppid() };
    let comm = std::fs::read_to_string(format!("/proc/{ppid}/comm")).ok()?;
    let trimmed = comm.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(not(target_os = "linux"))]
fn parent_process_name() -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_sanitize_lowercases_and_maps_separators() {
        assert_eq!(
            sanitize_name("Claude Desktop"),
            Some("claude-desktop".to_string())
        );
        assert_eq!(sanitize_name("iTerm.app"), Some("iterm-app".to_string()));
        assert_eq!(sanitize_name("my_agent"), Some("my-agent".to_string()));
    }

    #[test]
    fn test_sanitize_strips_invalid_and_collapses_dashes() {
        assert_eq!(
            sanitize_name("agent!!--one"),
            Some("agent-one".to_string())
        );
        assert_eq!(sanitize_name("--scout--"), Some("scout".to_string()));
        assert_eq!(sanitize_name("über-bot"), Some("ber-bot".to_string()));
    }

    #[test]
    fn test_sanitize_rejects_too_short() {
        assert_eq!(sanitize_name(""), None);
        assert_eq!(sanitize_name("ab"), None);
        assert_eq!(sanitize_name("!!!"), None);
        assert_eq!(sanitize_name("a-b"), Some("a-b".to_string()));
    }

    #[test]
    fn test_sanitize_caps_at_64() {
        let long = "x".repeat(100);
        let name = sanitize_name(&long).unwrap();
        assert_eq!(name.len(), 64);
    }

    #[test]
    fn test_sanitize_never_ends_with_dash_after_truncation() {
        let mut raw = "x".repeat(63);
        raw.push_str("-tail");
        let name = sanitize_name(&raw).unwrap();
        assert!(name.len() <= 64);
        assert!(!name.ends_with('-'));
    }

    #[test]
    #[serial]
    fn test_detect_prefers_env_override() {
        unsafe { std::env::set_var(AGENT_NAME_ENV, "Research Agent") };
        let name = detect_agent_name();
        unsafe { std::env::remove_var(AGENT_NAME_ENV) };
        assert_eq!(name, "research-agent");
    }

    #[test]
    #[serial]
    fn test_detect_ignores_unusable_env_override() {
        unsafe { std::env::set_var(AGENT_NAME_ENV, "!!") };
        let name = detect_agent_name();
        unsafe { std::env::remove_var(AGENT_NAME_ENV) };
        // Falls through to heuristics/fallback; whatever wins is grammatical.
        assert!(sanitize_name(&name).is_some());
    }

    #[test]
    #[serial]
    fn test_detect_without_env_still_resolves() {
        unsafe {
            std::env::remove_var(AGENT_NAME_ENV);
            std::env::remove_var("TERM_PROGRAM");
        }
        let name = detect_agent_name();
        assert!(name.len() >= 3);
    }

    #[test]
    fn test_machine_id_stable_and_non_empty() {
        let first = machine_id();
        assert!(!first.is_empty());
        assert_eq!(first, machine_id());
    }
}
