//! Agent registration and presence schema

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An agent is `online` when its `last_seen` is at most this many seconds old.
pub const ONLINE_WINDOW_SECS: i64 = 60;

/// Derived liveness of an agent.
///
/// The persisted value is opportunistic only; readers recompute it from
/// `last_seen` via [`AgentRecord::presence_at`] because a crashed process
/// never gets to write `offline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Offline,
}

/// Diagnostic process details attached to a registration.
///
/// Not semantically significant; displayed by `--list-agents` and otherwise
/// carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub platform: String,

    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

impl ProcessInfo {
    /// Describe the current process.
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            platform: std::env::consts::OS.to_string(),
            unknown_fields: HashMap::new(),
        }
    }
}

/// One agent registration, unique per `(name, machine_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Agent name: 3–64 chars of `[a-z0-9-]`, no leading/trailing or doubled dashes
    pub name: String,

    /// Opaque host identifier, stable across restarts
    pub machine_id: String,

    /// Last activity instant; refreshed by every tool call and the heartbeat
    #[serde(with = "super::ts_millis")]
    pub last_seen: DateTime<Utc>,

    /// Opportunistically written presence; recompute before trusting
    pub status: Presence,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_info: Option<ProcessInfo>,

    /// Unknown fields for forward compatibility
    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

impl AgentRecord {
    /// Derive presence from `last_seen` as of `now`.
    pub fn presence_at(&self, now: DateTime<Utc>) -> Presence {
        if now.signed_duration_since(self.last_seen).num_seconds() <= ONLINE_WINDOW_SECS {
            Presence::Online
        } else {
            Presence::Offline
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(last_seen: DateTime<Utc>) -> AgentRecord {
        AgentRecord {
            name: "builder".to_string(),
            machine_id: "machine-1".to_string(),
            last_seen,
            status: Presence::Online,
            process_info: None,
            unknown_fields: HashMap::new(),
        }
    }

    #[test]
    fn test_presence_within_window() {
        let now = Utc::now();
        assert_eq!(record(now).presence_at(now), Presence::Online);
        assert_eq!(
            record(now - Duration::seconds(59)).presence_at(now),
            Presence::Online
        );
    }

    #[test]
    fn test_presence_outside_window() {
        let now = Utc::now();
        assert_eq!(
            record(now - Duration::seconds(61)).presence_at(now),
            Presence::Offline
        );
        assert_eq!(
            record(now - Duration::hours(5)).presence_at(now),
            Presence::Offline
        );
    }

    #[test]
    fn test_stale_persisted_status_is_overridden_by_derivation() {
        // A crashed process leaves status = online; derivation must not trust it.
        let now = Utc::now();
        let rec = record(now - Duration::hours(1));
        assert_eq!(rec.status, Presence::Online);
        assert_eq!(rec.presence_at(now), Presence::Offline);
    }

    #[test]
    fn test_agent_record_round_trip_with_unknown_fields() {
        let json = r#"{
            "name": "scout-2",
            "machine_id": "m-abc",
            "last_seen": "2026-03-01T10:00:00.000Z",
            "status": "offline",
            "process_info": {"pid": 4242, "platform": "linux", "argv0": "scout"},
            "capabilities": ["search"]
        }"#;

        let rec: AgentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.name, "scout-2");
        assert_eq!(rec.status, Presence::Offline);
        let info = rec.process_info.as_ref().unwrap();
        assert_eq!(info.pid, 4242);
        assert!(info.unknown_fields.contains_key("argv0"));
        assert!(rec.unknown_fields.contains_key("capabilities"));

        let back: AgentRecord =
            serde_json::from_str(&serde_json::to_string(&rec).unwrap()).unwrap();
        assert!(back.unknown_fields.contains_key("capabilities"));
    }
}
