//! Tool definitions advertised by `tools/list`.
//!
//! One definition per kernel operation, with the argument names, defaults,
//! enums, and numeric bounds spelled out in JSON Schema. The dispatcher
//! enforces the same rules server-side; the schemas exist so well-behaved
//! clients can validate before calling.

use serde_json::{Value, json};

/// Number of tools the server exposes.
pub const TOOL_COUNT: usize = 10;

const PRIORITIES: [&str; 4] = ["urgent", "high", "normal", "low"];

/// All tool definitions, in the order they are advertised.
pub fn tool_definitions() -> Vec<Value> {
    vec![
        send_mail_schema(),
        check_mail_schema(),
        read_message_schema(),
        search_messages_schema(),
        list_agents_schema(),
        mark_read_schema(),
        archive_message_schema(),
        get_thread_schema(),
        get_mailbox_stats_schema(),
        delete_message_schema(),
    ]
}

fn send_mail_schema() -> Value {
    json!({
        "name": "send_mail",
        "description": "Send a message to another agent on this host",
        "inputSchema": {
            "type": "object",
            "properties": {
                "recipient": {"type": "string", "description": "Target agent name"},
                "subject": {"type": "string", "description": "Subject line"},
                "body": {"type": "string", "description": "Message body (markdown supported)"},
                "priority": {"type": "string", "enum": PRIORITIES, "description": "Delivery priority (default: normal)"},
                "tags": {"type": "array", "items": {"type": "string"}, "description": "Labels attached to the message"},
                "reply_to": {"type": "string", "description": "Id of the message this replies to"}
            },
            "required": ["recipient", "subject", "body"]
        }
    })
}

fn check_mail_schema() -> Value {
    json!({
        "name": "check_mail",
        "description": "List your inbox, most urgent first",
        "inputSchema": {
            "type": "object",
            "properties": {
                "unread_only": {"type": "boolean", "description": "Only unread messages (default: true)"},
                "limit": {"type": "integer", "minimum": 1, "maximum": 100, "description": "Max messages to return (default: 10)"},
                "priority_filter": {"type": "string", "enum": PRIORITIES, "description": "Only messages with this priority"},
                "days_back": {"type": "integer", "minimum": 0, "description": "Recency window in days (default: 7)"}
            }
        }
    })
}

fn read_message_schema() -> Value {
    json!({
        "name": "read_message",
        "description": "Fetch one of your messages and mark it read",
        "inputSchema": {
            "type": "object",
            "properties": {
                "message_id": {"type": "string", "description": "Id of the message to read"}
            },
            "required": ["message_id"]
        }
    })
}

fn search_messages_schema() -> Value {
    json!({
        "name": "search_messages",
        "description": "Search your sent and received mail by substring",
        "inputSchema": {
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Substring matched against subject, body, and tags (case-insensitive)"},
                "days_back": {"type": "integer", "minimum": 1, "maximum": 365, "description": "Recency window in days (default: 30)"},
                "sender": {"type": "string", "description": "Only messages from this agent"},
                "priority": {"type": "string", "enum": PRIORITIES, "description": "Only messages with this priority"},
                "limit": {"type": "integer", "minimum": 1, "maximum": 100, "description": "Max messages to return (default: 20)"}
            },
            "required": ["query"]
        }
    })
}

fn list_agents_schema() -> Value {
    json!({
        "name": "list_agents",
        "description": "List agents registered on this host",
        "inputSchema": {
            "type": "object",
            "properties": {
                "active_only": {"type": "boolean", "description": "Only agents seen within the last hour (default: false)"}
            }
        }
    })
}

fn mark_read_schema() -> Value {
    json!({
        "name": "mark_read",
        "description": "Mark a batch of your messages as read",
        "inputSchema": {
            "type": "object",
            "properties": {
                "message_ids": {"type": "array", "items": {"type": "string"}, "minItems": 1, "description": "Ids to mark read"}
            },
            "required": ["message_ids"]
        }
    })
}

fn archive_message_schema() -> Value {
    json!({
        "name": "archive_message",
        "description": "Archive one of your messages (keeps it searchable in threads)",
        "inputSchema": {
            "type": "object",
            "properties": {
                "message_id": {"type": "string", "description": "Id of the message to archive"}
            },
            "required": ["message_id"]
        }
    })
}

fn get_thread_schema() -> Value {
    json!({
        "name": "get_thread",
        "description": "Fetch a conversation thread you participate in, oldest first",
        "inputSchema": {
            "type": "object",
            "properties": {
                "thread_id": {"type": "string", "description": "Thread id from any message in the conversation"}
            },
            "required": ["thread_id"]
        }
    })
}

fn get_mailbox_stats_schema() -> Value {
    json!({
        "name": "get_mailbox_stats",
        "description": "Get inbox and thread counters for your mailbox",
        "inputSchema": {
            "type": "object",
            "properties": {}
        }
    })
}

fn delete_message_schema() -> Value {
    json!({
        "name": "delete_message",
        "description": "Permanently delete one of your messages",
        "inputSchema": {
            "type": "object",
            "properties": {
                "message_id": {"type": "string", "description": "Id of the message to delete"}
            },
            "required": ["message_id"]
        }
    })
}
