//! The mailbox kernel: every operation an agent can perform
//!
//! A [`Mailbox`] binds the shared store to one authenticated agent (`self`).
//! The caller identity is part of the handle, never an argument, so an
//! operation cannot be replayed on someone else's behalf. All argument
//! bounds are enforced here as well as at the transport schema, so
//! in-process callers get the same [`MailboxError`] taxonomy as tool
//! callers.
//!
//! Authorization is one rule (I4): only the recipient of a message may
//! mutate or delete it. For `read_message`, `archive_message`, and
//! `delete_message`, "absent" and "exists but not yours" collapse into one
//! [`MailboxError::NotFound`] so the error channel cannot be used to probe
//! for foreign message ids.

use crate::identity::ACTIVE_WINDOW_MINS;
use crate::schema::{AgentRecord, Message, Presence, Priority};
use crate::store::{InboxFilter, MailStore, SearchFilter, StoreError};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use thiserror::Error;

pub use crate::store::MailboxStats;

/// Bounds shared by `check_mail` and `search_messages`.
pub const LIMIT_MIN: u32 = 1;
pub const LIMIT_MAX: u32 = 100;

/// Bounds for `search_messages.days_back`.
pub const SEARCH_DAYS_MIN: u32 = 1;
pub const SEARCH_DAYS_MAX: u32 = 365;

/// `check_mail.days_back` has no declared upper bound; clamp here so
/// duration arithmetic cannot overflow.
const DAYS_BACK_CEILING: u32 = 36_500;

/// Mailbox operation errors. `kind()` gives the stable wire code.
#[derive(Error, Debug)]
pub enum MailboxError {
    /// An argument failed bounds, enum, or grammar checks
    #[error("invalid argument '{field}': {reason}")]
    InvalidArgument { field: String, reason: String },

    /// `send_mail` addressed an unknown agent
    #[error("recipient '{name}' is not a registered agent")]
    RecipientNotFound { name: String },

    /// `reply_to` referenced a message that does not exist
    #[error("reply target '{id}' does not exist")]
    ReplyTargetNotFound { id: String },

    /// The referenced message exists but is not visible to the caller
    #[error("not authorized to reference message '{id}'")]
    NotAuthorized { id: String },

    /// Requested message or thread is absent, or not visible to the caller
    #[error("message or thread not found")]
    NotFound,

    /// Underlying store failure; safe to retry
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl MailboxError {
    /// Stable machine-readable code for logs and tool error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            MailboxError::InvalidArgument { .. } => "invalid_argument",
            MailboxError::RecipientNotFound { .. } => "recipient_not_found",
            MailboxError::ReplyTargetNotFound { .. } => "reply_target_not_found",
            MailboxError::NotAuthorized { .. } => "not_authorized",
            MailboxError::NotFound => "not_found",
            MailboxError::Storage(_) => "storage_failure",
        }
    }

    /// Whether retrying the same call can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MailboxError::Storage(_))
    }

    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        MailboxError::InvalidArgument {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Arguments to `send_mail`.
#[derive(Debug, Clone)]
pub struct SendMail {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub reply_to: Option<String>,
}

impl SendMail {
    /// A plain-priority, untagged message.
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            priority: Priority::Normal,
            tags: Vec::new(),
            reply_to: None,
        }
    }
}

/// Arguments to `check_mail`; `Default` carries the documented defaults.
#[derive(Debug, Clone)]
pub struct CheckMail {
    pub unread_only: bool,
    pub limit: u32,
    pub priority: Option<Priority>,
    pub days_back: u32,
}

impl Default for CheckMail {
    fn default() -> Self {
        Self {
            unread_only: true,
            limit: 10,
            priority: None,
            days_back: 7,
        }
    }
}

/// Arguments to `search_messages`.
#[derive(Debug, Clone)]
pub struct SearchMail {
    pub query: String,
    pub days_back: u32,
    pub sender: Option<String>,
    pub priority: Option<Priority>,
    pub limit: u32,
}

impl SearchMail {
    /// A search with the documented defaults (30 days back, limit 20).
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            days_back: 30,
            sender: None,
            priority: None,
            limit: 20,
        }
    }
}

/// What `send_mail` returns.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SendReceipt {
    pub id: String,
    pub recipient: String,
    pub subject: String,
    pub priority: Priority,
}

/// The mailbox as seen by one authenticated agent.
#[derive(Debug, Clone)]
pub struct Mailbox {
    store: MailStore,
    agent: String,
    machine_id: String,
}

impl Mailbox {
    pub fn new(store: MailStore, agent: impl Into<String>, machine_id: impl Into<String>) -> Self {
        Self {
            store,
            agent: agent.into(),
            machine_id: machine_id.into(),
        }
    }

    /// The authenticated agent this handle speaks for.
    pub fn agent_name(&self) -> &str {
        &self.agent
    }

    pub fn store(&self) -> &MailStore {
        &self.store
    }

    /// Refresh this agent's `last_seen`. Called around every tool call and
    /// by the heartbeat ticker.
    pub fn touch(&self) -> Result<(), MailboxError> {
        self.store
            .touch_agent(&self.agent, &self.machine_id, Presence::Online)?;
        Ok(())
    }

    /// Mark this agent offline; part of graceful shutdown.
    pub fn go_offline(&self) -> Result<(), MailboxError> {
        self.store
            .touch_agent(&self.agent, &self.machine_id, Presence::Offline)?;
        Ok(())
    }

    /// Deliver a message. Allocates the id, resolves the thread, and writes
    /// the envelope durably before returning.
    pub fn send_mail(&self, args: SendMail) -> Result<SendReceipt, MailboxError> {
        if args.recipient.is_empty() {
            return Err(MailboxError::invalid("recipient", "must not be empty"));
        }

        let mut tags = Vec::with_capacity(args.tags.len());
        for tag in &args.tags {
            if tag.is_empty() {
                return Err(MailboxError::invalid("tags", "tags must be non-empty strings"));
            }
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }

        if !self.store.agent_exists(&args.recipient)? {
            return Err(MailboxError::RecipientNotFound {
                name: args.recipient,
            });
        }

        // A reply joins the target's thread; the target must be visible to
        // the sender. Anything else starts a fresh thread.
        let thread_id = match &args.reply_to {
            Some(target_id) => {
                let target = self
                    .store
                    .get_message_unchecked(target_id)?
                    .ok_or_else(|| MailboxError::ReplyTargetNotFound {
                        id: target_id.clone(),
                    })?;
                if !target.involves(&self.agent) {
                    return Err(MailboxError::NotAuthorized {
                        id: target_id.clone(),
                    });
                }
                target.thread_id
            }
            None => uuid::Uuid::new_v4().to_string(),
        };

        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            sender: self.agent.clone(),
            recipient: args.recipient,
            subject: args.subject,
            body: args.body,
            priority: args.priority,
            tags,
            reply_to: args.reply_to,
            thread_id,
            timestamp: Utc::now(),
            read: false,
            archived: false,
            unknown_fields: HashMap::new(),
        };

        self.store.put_message(&message)?;
        tracing::debug!(
            id = %message.id,
            recipient = %message.recipient,
            priority = %message.priority,
            "message sent"
        );

        Ok(SendReceipt {
            id: message.id,
            recipient: message.recipient,
            subject: message.subject,
            priority: message.priority,
        })
    }

    /// The caller's inbox: non-archived, recent, optionally unread-only,
    /// most urgent first.
    pub fn check_mail(&self, args: CheckMail) -> Result<Vec<Message>, MailboxError> {
        validate_limit(args.limit)?;
        let days = args.days_back.min(DAYS_BACK_CEILING);
        let filter = InboxFilter {
            unread_only: args.unread_only,
            priority: args.priority,
            since: Some(Utc::now() - Duration::days(i64::from(days))),
            limit: Some(args.limit as usize),
        };
        Ok(self.store.list_inbox(&self.agent, &filter)?)
    }

    /// Fetch one of the caller's messages and mark it read.
    pub fn read_message(&self, message_id: &str) -> Result<Message, MailboxError> {
        self.store
            .read_message(message_id, &self.agent)?
            .ok_or(MailboxError::NotFound)
    }

    /// Search the caller's sent and received history.
    pub fn search_messages(&self, args: SearchMail) -> Result<Vec<Message>, MailboxError> {
        if args.query.is_empty() {
            return Err(MailboxError::invalid("query", "must not be empty"));
        }
        validate_limit(args.limit)?;
        if !(SEARCH_DAYS_MIN..=SEARCH_DAYS_MAX).contains(&args.days_back) {
            return Err(MailboxError::invalid(
                "days_back",
                format!("must be between {SEARCH_DAYS_MIN} and {SEARCH_DAYS_MAX}"),
            ));
        }
        let filter = SearchFilter {
            sender: args.sender,
            priority: args.priority,
            since: Some(Utc::now() - Duration::days(i64::from(args.days_back))),
            limit: Some(args.limit as usize),
        };
        Ok(self.store.search(&self.agent, &args.query, &filter)?)
    }

    /// All registrations, most recently seen first, with presence derived
    /// from `last_seen` rather than the persisted status.
    pub fn list_agents(&self, active_only: bool) -> Result<Vec<AgentRecord>, MailboxError> {
        let window = active_only.then(|| Duration::minutes(ACTIVE_WINDOW_MINS));
        let now = Utc::now();
        let mut rows = self.store.list_agents(window)?;
        for row in &mut rows {
            row.status = row.presence_at(now);
        }
        Ok(rows)
    }

    /// Mark a batch of the caller's messages read. Returns how many actually
    /// transitioned; ids that are absent, foreign, or already read count 0.
    /// Not atomic as a set: a storage failure partway leaves earlier
    /// transitions in place.
    pub fn mark_read(&self, message_ids: &[String]) -> Result<u32, MailboxError> {
        if message_ids.is_empty() {
            return Err(MailboxError::invalid("message_ids", "must not be empty"));
        }
        let mut transitioned = 0;
        for id in message_ids {
            transitioned += self.store.mark_read(id, &self.agent)?;
        }
        Ok(transitioned)
    }

    /// Archive one of the caller's messages. Idempotent.
    pub fn archive_message(&self, message_id: &str) -> Result<(), MailboxError> {
        if self.store.archive_message(message_id, &self.agent)? {
            Ok(())
        } else {
            Err(MailboxError::NotFound)
        }
    }

    /// The caller's view of a conversation, oldest first.
    pub fn get_thread(&self, thread_id: &str) -> Result<Vec<Message>, MailboxError> {
        let rows = self.store.get_thread(thread_id, &self.agent)?;
        if rows.is_empty() {
            return Err(MailboxError::NotFound);
        }
        Ok(rows)
    }

    /// Mailbox counters for the caller.
    pub fn stats(&self) -> Result<MailboxStats, MailboxError> {
        Ok(self.store.stats(&self.agent)?)
    }

    /// Permanently delete one of the caller's messages.
    pub fn delete_message(&self, message_id: &str) -> Result<(), MailboxError> {
        if self.store.delete_message(message_id, &self.agent)? {
            tracing::debug!(id = %message_id, "message deleted");
            Ok(())
        } else {
            Err(MailboxError::NotFound)
        }
    }
}

fn validate_limit(limit: u32) -> Result<(), MailboxError> {
    if !(LIMIT_MIN..=LIMIT_MAX).contains(&limit) {
        return Err(MailboxError::invalid(
            "limit",
            format!("must be between {LIMIT_MIN} and {LIMIT_MAX}"),
        ));
    }
    Ok(())
}
