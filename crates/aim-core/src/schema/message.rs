//! Message envelope schema

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Message priority, totally ordered `urgent > high > normal > low`.
///
/// Variants are declared lowest-first so the derived [`Ord`] matches the
/// mailbox ordering rules (sort descending for "most urgent first").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// All variants, most urgent first.
    pub const ALL: [Priority; 4] = [
        Priority::Urgent,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// The lowercase wire name of this priority.
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "urgent" => Ok(Priority::Urgent),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            _ => Err(()),
        }
    }
}

/// A message in the shared mailbox.
///
/// The envelope (everything except `read` and `archived`) is write-once at
/// send time. Only the recipient may flip the two flags, and both are
/// monotone: false → true, never back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Collision-resistant id (UUID v4 string)
    pub id: String,

    /// Sending agent name
    pub sender: String,

    /// Receiving agent name
    pub recipient: String,

    /// Free-text subject line
    pub subject: String,

    /// Free-text body (markdown supported); bodies of at least 1 MiB are accepted
    pub body: String,

    #[serde(default)]
    pub priority: Priority,

    /// Unordered tag set, serialized as a JSON array
    #[serde(default)]
    pub tags: Vec<String>,

    /// Id of the message this one replies to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,

    /// Conversation id; replies inherit it from the reply target
    pub thread_id: String,

    /// Send instant, UTC with millisecond precision
    #[serde(with = "super::ts_millis")]
    pub timestamp: DateTime<Utc>,

    /// Whether the recipient has read the message
    pub read: bool,

    /// Whether the recipient has archived the message
    pub archived: bool,

    /// Unknown fields for forward compatibility
    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

impl Message {
    /// Whether `agent` is a participant (sender or recipient) of this message.
    pub fn involves(&self, agent: &str) -> bool {
        self.sender == agent || self.recipient == agent
    }

    /// Case-insensitive substring match against subject, body, or any tag.
    pub fn matches_query(&self, query_lower: &str) -> bool {
        self.subject.to_lowercase().contains(query_lower)
            || self.body.to_lowercase().contains(query_lower)
            || self
                .tags
                .iter()
                .any(|t| t.to_lowercase().contains(query_lower))
    }
}
