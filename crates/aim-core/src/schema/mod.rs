//! Persisted record schemas for the shared mailbox store
//!
//! Schema types here are the on-disk and wire representation of the mailbox.
//! They are designed to:
//! - Preserve unknown fields for forward compatibility
//! - Serialize timestamps as RFC 3339 UTC with millisecond precision
//! - Support round-trip serialization without data loss

mod agent;
mod message;

pub use agent::{AgentRecord, Presence, ProcessInfo, ONLINE_WINDOW_SECS};
pub use message::{Message, Priority};

/// Serde adapter for `DateTime<Utc>` fields: RFC 3339 with exactly three
/// fractional digits (`2026-03-01T10:00:00.000Z`).
pub mod ts_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Stamp {
        #[serde(with = "super::ts_millis")]
        at: DateTime<Utc>,
    }

    #[test]
    fn test_timestamp_serializes_with_millis() {
        let stamp = Stamp {
            at: Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
        };
        let json = serde_json::to_string(&stamp).unwrap();
        assert_eq!(json, r#"{"at":"2026-03-01T10:00:00.000Z"}"#);
    }

    #[test]
    fn test_timestamp_parses_offset_form() {
        let stamp: Stamp =
            serde_json::from_str(r#"{"at":"2026-03-01T11:00:00.250+01:00"}"#).unwrap();
        assert_eq!(
            stamp.at,
            Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
                + chrono::Duration::milliseconds(250)
        );
    }

    #[test]
    fn test_timestamp_rejects_garbage() {
        let result: Result<Stamp, _> = serde_json::from_str(r#"{"at":"yesterday"}"#);
        assert!(result.is_err());
    }
}
