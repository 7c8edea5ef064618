//! Shared mailbox store with atomic writes
//!
//! Every agent process on the host opens the same store: one JSON document
//! (`mailbox.json` in the data directory) holding the `messages` and `agents`
//! relations. Mutations take the cross-process lock, read the document, apply
//! the change in memory, and atomically replace the file (tmp + fsync +
//! rename), so a write is durable before the call returns and a crash leaves
//! either the old or the new document. Reads parse the current file without
//! the lock; the atomic rename guarantees each read is one consistent
//! snapshot.

mod error;
mod lock;

pub use error::StoreError;
pub use lock::{StoreLock, lock_exclusive};

use crate::schema::{AgentRecord, Message, Presence, Priority, ProcessInfo};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Store file name inside the data directory.
pub const STORE_FILE: &str = "mailbox.json";

/// Current store document schema version.
const SCHEMA_VERSION: u32 = 1;

/// How long a writer waits for the store lock before giving up with
/// `LockBusy`.
const LOCK_WAIT_BUDGET: std::time::Duration = std::time::Duration::from_millis(1500);

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// The on-disk document: both relations plus a version tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default = "default_schema_version")]
    schema_version: u32,

    #[serde(default)]
    messages: Vec<Message>,

    #[serde(default)]
    agents: Vec<AgentRecord>,

    /// Unknown fields for forward compatibility
    #[serde(flatten)]
    unknown_fields: HashMap<String, serde_json::Value>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            messages: Vec::new(),
            agents: Vec::new(),
            unknown_fields: HashMap::new(),
        }
    }
}

/// Filters for an inbox scan. `since` is the already-computed recency cutoff.
#[derive(Debug, Clone, Default)]
pub struct InboxFilter {
    pub unread_only: bool,
    pub priority: Option<Priority>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Filters for a history search, applied on top of the substring match.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub sender: Option<String>,
    pub priority: Option<Priority>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Mailbox counters for one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxStats {
    pub total_inbox: u64,
    pub unread_inbox: u64,
    pub unread_urgent: u64,
    pub agents_total: u64,
    pub distinct_threads: u64,
}

/// Inbox ordering: priority DESC, timestamp DESC, id ASC.
///
/// The id tiebreak keeps the order stable when several messages land in the
/// same millisecond.
fn inbox_order(a: &Message, b: &Message) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| b.timestamp.cmp(&a.timestamp))
        .then_with(|| a.id.cmp(&b.id))
}

/// Thread ordering: timestamp ASC, id ASC.
fn thread_order(a: &Message, b: &Message) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then_with(|| a.id.cmp(&b.id))
}

/// Search ordering: timestamp DESC, id ASC.
fn recency_order(a: &Message, b: &Message) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| a.id.cmp(&b.id))
}

/// Handle to the shared store. Cheap to clone; all state lives on disk.
#[derive(Debug, Clone)]
pub struct MailStore {
    path: PathBuf,
    lock_path: PathBuf,
    tmp_path: PathBuf,
}

impl MailStore {
    /// Open (or create) the store in `data_dir`.
    ///
    /// The directory is created if missing; the store file itself is created
    /// lazily by the first write.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(data_dir).map_err(|e| StoreError::Io {
            path: data_dir.to_path_buf(),
            source: e,
        })?;
        let path = data_dir.join(STORE_FILE);
        let lock_path = path.with_extension("lock");
        let tmp_path = path.with_extension("tmp");
        Ok(Self {
            path,
            lock_path,
            tmp_path,
        })
    }

    /// Path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<StoreDocument, StoreError> {
        let content = match fs::read(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoreDocument::default());
            }
            Err(e) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };
        serde_json::from_slice(&content).map_err(|e| StoreError::Document {
            path: self.path.clone(),
            source: e,
        })
    }

    fn persist(&self, doc: &StoreDocument) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(doc).map_err(|e| StoreError::Document {
            path: self.tmp_path.clone(),
            source: e,
        })?;

        {
            let mut tmp = fs::File::create(&self.tmp_path).map_err(|e| StoreError::Io {
                path: self.tmp_path.clone(),
                source: e,
            })?;
            tmp.write_all(&content).map_err(|e| StoreError::Io {
                path: self.tmp_path.clone(),
                source: e,
            })?;
            // Durable before the rename makes it visible.
            tmp.sync_all().map_err(|e| StoreError::Io {
                path: self.tmp_path.clone(),
                source: e,
            })?;
        }

        fs::rename(&self.tmp_path, &self.path).map_err(|e| StoreError::Io {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Locked read-modify-write. The closure returns its result and whether
    /// it changed the document; unchanged documents are not rewritten.
    fn mutate<R, F>(&self, modify: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut StoreDocument) -> (R, bool),
    {
        let _lock = lock_exclusive(&self.lock_path, LOCK_WAIT_BUDGET)?;
        let mut doc = self.load()?;
        let (result, dirty) = modify(&mut doc);
        if dirty {
            self.persist(&doc)?;
        }
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Append a message. Durable before returning.
    pub fn put_message(&self, message: &Message) -> Result<(), StoreError> {
        let msg = message.clone();
        self.mutate(|doc| {
            doc.messages.push(msg);
            ((), true)
        })
    }

    /// Fetch a message visible to `viewer` (its sender or recipient).
    pub fn get_message(&self, id: &str, viewer: &str) -> Result<Option<Message>, StoreError> {
        Ok(self
            .load()?
            .messages
            .into_iter()
            .find(|m| m.id == id && m.involves(viewer)))
    }

    /// Fetch a message without a visibility check.
    ///
    /// Used by reply-target resolution, where "exists but not visible" must
    /// be reported differently from "absent".
    pub fn get_message_unchecked(&self, id: &str) -> Result<Option<Message>, StoreError> {
        Ok(self.load()?.messages.into_iter().find(|m| m.id == id))
    }

    /// Non-archived messages addressed to `recipient`, filtered and ordered
    /// by (priority DESC, timestamp DESC, id ASC).
    pub fn list_inbox(
        &self,
        recipient: &str,
        filter: &InboxFilter,
    ) -> Result<Vec<Message>, StoreError> {
        let doc = self.load()?;
        let mut rows: Vec<Message> = doc
            .messages
            .into_iter()
            .filter(|m| m.recipient == recipient && !m.archived)
            .filter(|m| !filter.unread_only || !m.read)
            .filter(|m| filter.priority.is_none_or(|p| m.priority == p))
            .filter(|m| filter.since.is_none_or(|cutoff| m.timestamp >= cutoff))
            .collect();
        rows.sort_by(inbox_order);
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    /// Non-archived messages involving `participant` whose subject, body, or
    /// any tag contains `query` case-insensitively; newest first.
    pub fn search(
        &self,
        participant: &str,
        query: &str,
        filter: &SearchFilter,
    ) -> Result<Vec<Message>, StoreError> {
        let needle = query.to_lowercase();
        let doc = self.load()?;
        let mut rows: Vec<Message> = doc
            .messages
            .into_iter()
            .filter(|m| m.involves(participant) && !m.archived)
            .filter(|m| m.matches_query(&needle))
            .filter(|m| filter.sender.as_deref().is_none_or(|s| m.sender == s))
            .filter(|m| filter.priority.is_none_or(|p| m.priority == p))
            .filter(|m| filter.since.is_none_or(|cutoff| m.timestamp >= cutoff))
            .collect();
        rows.sort_by(recency_order);
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    /// All messages of a thread visible to `participant`, oldest first.
    /// Archived messages stay visible here; a thread is navigation, not
    /// inbox state.
    pub fn get_thread(
        &self,
        thread_id: &str,
        participant: &str,
    ) -> Result<Vec<Message>, StoreError> {
        let doc = self.load()?;
        let mut rows: Vec<Message> = doc
            .messages
            .into_iter()
            .filter(|m| m.thread_id == thread_id && m.involves(participant))
            .collect();
        rows.sort_by(thread_order);
        Ok(rows)
    }

    /// Flip `read` to true if the message exists and is addressed to
    /// `recipient`. Returns the number of rows transitioned (0 or 1).
    pub fn mark_read(&self, id: &str, recipient: &str) -> Result<u32, StoreError> {
        self.mutate(|doc| {
            match doc
                .messages
                .iter_mut()
                .find(|m| m.id == id && m.recipient == recipient)
            {
                Some(m) if !m.read => {
                    m.read = true;
                    (1, true)
                }
                _ => (0, false),
            }
        })
    }

    /// Mark read and return the updated message, or `None` when the id is
    /// absent or addressed to someone else (the two cases are deliberately
    /// indistinguishable).
    pub fn read_message(&self, id: &str, recipient: &str) -> Result<Option<Message>, StoreError> {
        self.mutate(|doc| {
            match doc
                .messages
                .iter_mut()
                .find(|m| m.id == id && m.recipient == recipient)
            {
                Some(m) => {
                    let dirty = !m.read;
                    m.read = true;
                    (Some(m.clone()), dirty)
                }
                None => (None, false),
            }
        })
    }

    /// Set `archived` on the recipient's message. Idempotent: returns `true`
    /// whenever the row exists and belongs to `recipient`, `false` otherwise.
    pub fn archive_message(&self, id: &str, recipient: &str) -> Result<bool, StoreError> {
        self.mutate(|doc| {
            match doc
                .messages
                .iter_mut()
                .find(|m| m.id == id && m.recipient == recipient)
            {
                Some(m) => {
                    let dirty = !m.archived;
                    m.archived = true;
                    (true, dirty)
                }
                None => (false, false),
            }
        })
    }

    /// Permanently remove the recipient's message. Returns `true` if a row
    /// was removed.
    pub fn delete_message(&self, id: &str, recipient: &str) -> Result<bool, StoreError> {
        self.mutate(|doc| {
            let before = doc.messages.len();
            doc.messages
                .retain(|m| !(m.id == id && m.recipient == recipient));
            let removed = doc.messages.len() < before;
            (removed, removed)
        })
    }

    // ------------------------------------------------------------------
    // Agents
    // ------------------------------------------------------------------

    /// Insert or replace the registration keyed by `(name, machine_id)`.
    pub fn upsert_agent(&self, agent: &AgentRecord) -> Result<(), StoreError> {
        let record = agent.clone();
        self.mutate(|doc| {
            match doc
                .agents
                .iter_mut()
                .find(|a| a.name == record.name && a.machine_id == record.machine_id)
            {
                Some(existing) => *existing = record,
                None => doc.agents.push(record),
            }
            ((), true)
        })
    }

    /// Look up a registration by `(name, machine_id)`.
    pub fn find_agent(
        &self,
        name: &str,
        machine_id: &str,
    ) -> Result<Option<AgentRecord>, StoreError> {
        Ok(self
            .load()?
            .agents
            .into_iter()
            .find(|a| a.name == name && a.machine_id == machine_id))
    }

    /// Whether any registration carries this name. Used for the recipient
    /// check on send; the store is host-local, so the name alone identifies
    /// the addressee.
    pub fn agent_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.load()?.agents.iter().any(|a| a.name == name))
    }

    /// Registrations ordered by `last_seen` DESC, optionally limited to
    /// those seen within `seen_within`.
    pub fn list_agents(
        &self,
        seen_within: Option<Duration>,
    ) -> Result<Vec<AgentRecord>, StoreError> {
        let now = Utc::now();
        let mut rows: Vec<AgentRecord> = self
            .load()?
            .agents
            .into_iter()
            .filter(|a| {
                seen_within.is_none_or(|window| now.signed_duration_since(a.last_seen) <= window)
            })
            .collect();
        rows.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        Ok(rows)
    }

    /// Register a new agent under a free name derived from `base`.
    ///
    /// Runs the `base`, `base-2`, `base-3`, ... probe under the store lock,
    /// so two processes racing for the same base cannot both claim it. The
    /// suffix never pushes the name past 64 characters; the base is trimmed
    /// to make room.
    pub fn register_agent(
        &self,
        base: &str,
        machine_id: &str,
        process_info: ProcessInfo,
    ) -> Result<AgentRecord, StoreError> {
        let base = base.to_string();
        let machine = machine_id.to_string();
        self.mutate(move |doc| {
            let taken: HashSet<&str> = doc
                .agents
                .iter()
                .filter(|a| a.machine_id == machine)
                .map(|a| a.name.as_str())
                .collect();

            let mut candidate = base.clone();
            let mut n = 2u32;
            while taken.contains(candidate.as_str()) {
                let suffix = format!("-{n}");
                let mut stem = base.clone();
                while stem.len() > 64 - suffix.len() {
                    stem.pop();
                }
                candidate = format!("{}{}", stem.trim_end_matches('-'), suffix);
                n += 1;
            }

            let record = AgentRecord {
                name: candidate,
                machine_id: machine,
                last_seen: Utc::now(),
                status: Presence::Online,
                process_info: Some(process_info),
                unknown_fields: HashMap::new(),
            };
            doc.agents.push(record.clone());
            (record, true)
        })
    }

    /// Refresh `last_seen` (to now) and the opportunistic status of a
    /// registration, inserting it if missing.
    pub fn touch_agent(
        &self,
        name: &str,
        machine_id: &str,
        status: Presence,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let name = name.to_string();
        let machine = machine_id.to_string();
        self.mutate(move |doc| {
            match doc
                .agents
                .iter_mut()
                .find(|a| a.name == name && a.machine_id == machine)
            {
                Some(a) => {
                    a.last_seen = now;
                    a.status = status;
                }
                None => doc.agents.push(AgentRecord {
                    name,
                    machine_id: machine,
                    last_seen: now,
                    status,
                    process_info: None,
                    unknown_fields: HashMap::new(),
                }),
            }
            ((), true)
        })
    }

    /// Mailbox counters for `agent`. The inbox counters exclude archived
    /// rows; the thread count spans everything the agent participates in.
    pub fn stats(&self, agent: &str) -> Result<MailboxStats, StoreError> {
        let doc = self.load()?;

        let inbox = doc
            .messages
            .iter()
            .filter(|m| m.recipient == agent && !m.archived);
        let mut total_inbox = 0u64;
        let mut unread_inbox = 0u64;
        let mut unread_urgent = 0u64;
        for m in inbox {
            total_inbox += 1;
            if !m.read {
                unread_inbox += 1;
                if m.priority == Priority::Urgent {
                    unread_urgent += 1;
                }
            }
        }

        let distinct_threads = doc
            .messages
            .iter()
            .filter(|m| m.involves(agent))
            .map(|m| m.thread_id.as_str())
            .collect::<HashSet<_>>()
            .len() as u64;

        Ok(MailboxStats {
            total_inbox,
            unread_inbox,
            unread_urgent,
            agents_total: doc.agents.len() as u64,
            distinct_threads,
        })
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Drop registrations not seen for `stale_after`. Returns the number
    /// removed.
    pub fn remove_stale_agents(&self, stale_after: Duration) -> Result<usize, StoreError> {
        let now = Utc::now();
        self.mutate(move |doc| {
            let before = doc.agents.len();
            doc.agents
                .retain(|a| now.signed_duration_since(a.last_seen) <= stale_after);
            let removed = before - doc.agents.len();
            (removed, removed > 0)
        })
    }

    /// Best-effort removal of the lock and tmp companion files. Called on
    /// graceful shutdown and by cleanup; failures are not interesting.
    pub fn remove_companion_files(&self) {
        let _ = fs::remove_file(&self.lock_path);
        let _ = fs::remove_file(&self.tmp_path);
    }
}
