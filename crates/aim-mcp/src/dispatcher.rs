//! Tool dispatch: argument validation and routing into the kernel.
//!
//! [`dispatch`] is the single entry point the transport calls with a tool
//! name and its arguments object. It enforces the declared schemas strictly
//! (unknown fields are rejected, enums and bounds checked, every violation
//! named after the offending field), maps the arguments onto the kernel's
//! typed operations, and shapes the result into a transport-neutral JSON
//! value. The caller identity comes from the [`Mailbox`] handle, never from
//! the payload.

use aim_core::kernel::{CheckMail, Mailbox, MailboxError, SearchMail, SendMail};
use aim_core::schema::{AgentRecord, Message, Priority};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Errors surfaced by [`dispatch`].
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The tool name does not map to any kernel operation
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    /// The kernel rejected or failed the operation
    #[error(transparent)]
    Mailbox(#[from] MailboxError),
}

impl DispatchError {
    /// Stable machine-readable code for error payloads and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::UnknownTool(_) => "unknown_tool",
            DispatchError::Mailbox(e) => e.kind(),
        }
    }
}

/// Execute `tool` with `arguments` on behalf of the mailbox's agent.
///
/// `arguments` may be `null` or absent for tools without parameters;
/// anything other than an object is an `invalid_argument` error.
pub fn dispatch(mailbox: &Mailbox, tool: &str, arguments: &Value) -> Result<Value, DispatchError> {
    let empty = Map::new();
    let args = match arguments {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => {
            return Err(invalid("arguments", "must be an object").into());
        }
    };

    match tool {
        "send_mail" => send_mail(mailbox, args),
        "check_mail" => check_mail(mailbox, args),
        "read_message" => read_message(mailbox, args),
        "search_messages" => search_messages(mailbox, args),
        "list_agents" => list_agents(mailbox, args),
        "mark_read" => mark_read(mailbox, args),
        "archive_message" => archive_message(mailbox, args),
        "get_thread" => get_thread(mailbox, args),
        "get_mailbox_stats" => get_mailbox_stats(mailbox, args),
        "delete_message" => delete_message(mailbox, args),
        other => Err(DispatchError::UnknownTool(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Per-tool handlers
// ---------------------------------------------------------------------------

fn send_mail(mailbox: &Mailbox, args: &Map<String, Value>) -> Result<Value, DispatchError> {
    reject_unknown(
        args,
        &["recipient", "subject", "body", "priority", "tags", "reply_to"],
    )?;

    let call = SendMail {
        recipient: require_str(args, "recipient")?.to_string(),
        subject: require_str(args, "subject")?.to_string(),
        body: require_str(args, "body")?.to_string(),
        priority: opt_priority(args, "priority")?.unwrap_or_default(),
        tags: opt_str_list(args, "tags")?,
        reply_to: opt_str(args, "reply_to")?.map(str::to_string),
    };

    let receipt = mailbox.send_mail(call)?;
    Ok(json!({
        "message_id": receipt.id,
        "recipient": receipt.recipient,
        "subject": receipt.subject,
        "priority": receipt.priority,
    }))
}

fn check_mail(mailbox: &Mailbox, args: &Map<String, Value>) -> Result<Value, DispatchError> {
    reject_unknown(args, &["unread_only", "limit", "priority_filter", "days_back"])?;

    let defaults = CheckMail::default();
    let call = CheckMail {
        unread_only: opt_bool(args, "unread_only")?.unwrap_or(defaults.unread_only),
        limit: opt_u32(args, "limit")?.unwrap_or(defaults.limit),
        priority: opt_priority(args, "priority_filter")?,
        days_back: opt_u32(args, "days_back")?.unwrap_or(defaults.days_back),
    };

    let messages = mailbox.check_mail(call)?;
    Ok(message_list(&messages))
}

fn read_message(mailbox: &Mailbox, args: &Map<String, Value>) -> Result<Value, DispatchError> {
    reject_unknown(args, &["message_id"])?;
    let message = mailbox.read_message(require_str(args, "message_id")?)?;
    Ok(json!({ "message": message_json(&message) }))
}

fn search_messages(mailbox: &Mailbox, args: &Map<String, Value>) -> Result<Value, DispatchError> {
    reject_unknown(args, &["query", "days_back", "sender", "priority", "limit"])?;

    let mut call = SearchMail::new(require_str(args, "query")?);
    if let Some(days) = opt_u32(args, "days_back")? {
        call.days_back = days;
    }
    call.sender = opt_str(args, "sender")?.map(str::to_string);
    call.priority = opt_priority(args, "priority")?;
    if let Some(limit) = opt_u32(args, "limit")? {
        call.limit = limit;
    }

    let messages = mailbox.search_messages(call)?;
    Ok(message_list(&messages))
}

fn list_agents(mailbox: &Mailbox, args: &Map<String, Value>) -> Result<Value, DispatchError> {
    reject_unknown(args, &["active_only"])?;
    let active_only = opt_bool(args, "active_only")?.unwrap_or(false);
    let agents = mailbox.list_agents(active_only)?;
    Ok(json!({
        "agents": agents.iter().map(agent_json).collect::<Vec<_>>(),
        "count": agents.len(),
    }))
}

fn mark_read(mailbox: &Mailbox, args: &Map<String, Value>) -> Result<Value, DispatchError> {
    reject_unknown(args, &["message_ids"])?;
    let ids = require_str_list(args, "message_ids")?;
    let marked = mailbox.mark_read(&ids)?;
    Ok(json!({ "marked_read": marked }))
}

fn archive_message(mailbox: &Mailbox, args: &Map<String, Value>) -> Result<Value, DispatchError> {
    reject_unknown(args, &["message_id"])?;
    let id = require_str(args, "message_id")?;
    mailbox.archive_message(id)?;
    Ok(json!({ "archived": true, "message_id": id }))
}

fn get_thread(mailbox: &Mailbox, args: &Map<String, Value>) -> Result<Value, DispatchError> {
    reject_unknown(args, &["thread_id"])?;
    let thread_id = require_str(args, "thread_id")?;
    let messages = mailbox.get_thread(thread_id)?;
    Ok(json!({
        "thread_id": thread_id,
        "messages": messages.iter().map(message_json).collect::<Vec<_>>(),
        "count": messages.len(),
    }))
}

fn get_mailbox_stats(mailbox: &Mailbox, args: &Map<String, Value>) -> Result<Value, DispatchError> {
    reject_unknown(args, &[])?;
    let stats = mailbox.stats()?;
    Ok(serde_json::to_value(&stats).unwrap_or(Value::Null))
}

fn delete_message(mailbox: &Mailbox, args: &Map<String, Value>) -> Result<Value, DispatchError> {
    reject_unknown(args, &["message_id"])?;
    let id = require_str(args, "message_id")?;
    mailbox.delete_message(id)?;
    Ok(json!({ "deleted": true, "message_id": id }))
}

// ---------------------------------------------------------------------------
// Result shaping
// ---------------------------------------------------------------------------

fn message_json(message: &Message) -> Value {
    serde_json::to_value(message).unwrap_or(Value::Null)
}

fn agent_json(agent: &AgentRecord) -> Value {
    serde_json::to_value(agent).unwrap_or(Value::Null)
}

fn message_list(messages: &[Message]) -> Value {
    json!({
        "messages": messages.iter().map(message_json).collect::<Vec<_>>(),
        "count": messages.len(),
    })
}

// ---------------------------------------------------------------------------
// Argument extraction
// ---------------------------------------------------------------------------

fn invalid(field: &str, reason: impl Into<String>) -> MailboxError {
    MailboxError::InvalidArgument {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn reject_unknown(args: &Map<String, Value>, allowed: &[&str]) -> Result<(), DispatchError> {
    for key in args.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(invalid(key, "unknown field").into());
        }
    }
    Ok(())
}

fn require_str<'a>(args: &'a Map<String, Value>, field: &str) -> Result<&'a str, DispatchError> {
    match args.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(invalid(field, "must be a string").into()),
        None => Err(invalid(field, "is required").into()),
    }
}

fn opt_str<'a>(
    args: &'a Map<String, Value>,
    field: &str,
) -> Result<Option<&'a str>, DispatchError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(invalid(field, "must be a string").into()),
    }
}

fn opt_bool(args: &Map<String, Value>, field: &str) -> Result<Option<bool>, DispatchError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(invalid(field, "must be a boolean").into()),
    }
}

fn opt_u32(args: &Map<String, Value>, field: &str) -> Result<Option<u32>, DispatchError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match value.as_u64().and_then(|n| u32::try_from(n).ok()) {
            Some(n) => Ok(Some(n)),
            None => Err(invalid(field, "must be a non-negative integer").into()),
        },
    }
}

fn opt_priority(
    args: &Map<String, Value>,
    field: &str,
) -> Result<Option<Priority>, DispatchError> {
    match opt_str(args, field)? {
        None => Ok(None),
        Some(raw) => raw
            .parse::<Priority>()
            .map(Some)
            .map_err(|()| invalid(field, "must be one of urgent, high, normal, low").into()),
    }
}

fn opt_str_list(args: &Map<String, Value>, field: &str) -> Result<Vec<String>, DispatchError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => collect_strings(items, field),
        Some(_) => Err(invalid(field, "must be an array of strings").into()),
    }
}

fn require_str_list(args: &Map<String, Value>, field: &str) -> Result<Vec<String>, DispatchError> {
    match args.get(field) {
        Some(Value::Array(items)) => collect_strings(items, field),
        Some(_) => Err(invalid(field, "must be an array of strings").into()),
        None => Err(invalid(field, "is required").into()),
    }
}

fn collect_strings(items: &[Value], field: &str) -> Result<Vec<String>, DispatchError> {
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            _ => Err(invalid(field, "must be an array of strings").into()),
        })
        .collect()
}
