//! The serve loop: JSON-RPC over stdio, heartbeat, graceful shutdown.
//!
//! [`serve`] is generic over the I/O pair so tests can drive it through an
//! in-memory duplex instead of real stdio. The loop owns the whole agent
//! lifecycle: the heartbeat ticker runs while requests are processed, and
//! when the client goes away (EOF) or the process is interrupted the agent
//! is marked offline and the store's companion files are removed.
//!
//! Responses carry both renderings of a tool result: a text content block
//! for humans and `structuredContent` for programs. Tool failures use
//! `isError: true` inside the result (not a JSON-RPC `error` object) so
//! transport-level protocol errors stay distinguishable from mailbox
//! errors.

use std::sync::Arc;

use aim_core::identity::{self, HEARTBEAT_INTERVAL};
use aim_core::kernel::Mailbox;
use aim_core::schema::ProcessInfo;
use aim_core::store::MailStore;
use anyhow::Context;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::dispatcher::{self, DispatchError};
use crate::framing::{RequestReader, write_message};
use crate::tools;

/// MCP protocol revision this server speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

/// Resolve identity and register this process as an agent.
///
/// `name_override` (the `--agent-name` flag) takes precedence over the
/// `AI_AGENT_NAME` / heuristic detection chain. The store allocates a free
/// `base`, `base-2`, ... variant under its write lock.
pub fn register(store: MailStore, name_override: Option<&str>) -> anyhow::Result<Mailbox> {
    let base = match name_override {
        Some(raw) => identity::sanitize_name(raw)
            .with_context(|| format!("agent name '{raw}' has no valid form"))?,
        None => identity::detect_agent_name(),
    };
    let machine = identity::machine_id();
    let record = store.register_agent(&base, &machine, ProcessInfo::current())?;
    if record.name != base {
        tracing::info!(base = %base, assigned = %record.name, "base name taken, variant assigned");
    }
    tracing::info!(agent = %record.name, "agent registered");
    Ok(Mailbox::new(store, record.name, machine))
}

/// Serve on the process's stdin/stdout until EOF or interrupt.
pub async fn serve_stdio(mailbox: Arc<Mailbox>) -> anyhow::Result<()> {
    serve(mailbox, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serve on an arbitrary reader/writer pair until EOF or interrupt, then
/// shut down gracefully: stop the heartbeat, mark the agent offline, remove
/// companion files.
pub async fn serve<R, W>(mailbox: Arc<Mailbox>, reader: R, writer: W) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let heartbeat = spawn_heartbeat(Arc::clone(&mailbox));
    let result = run_loop(&mailbox, reader, writer).await;

    heartbeat.abort();
    if let Err(e) = mailbox.go_offline() {
        tracing::warn!(kind = e.kind(), "could not mark agent offline");
    }
    mailbox.store().remove_companion_files();
    tracing::info!(agent = %mailbox.agent_name(), "mailbox server stopped");
    result
}

async fn run_loop<R, W>(mailbox: &Mailbox, reader: R, mut writer: W) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = RequestReader::new(reader);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            message = reader.next_message() => {
                let Some(raw) = message.context("transport read failed")? else {
                    tracing::debug!("client closed the transport");
                    break;
                };
                if let Some(response) = handle_message(mailbox, &raw) {
                    write_message(&mut writer, &response.to_string())
                        .await
                        .context("transport write failed")?;
                }
            }
            _ = &mut interrupt => {
                tracing::info!("interrupt received, shutting down");
                break;
            }
        }
    }
    Ok(())
}

fn spawn_heartbeat(mailbox: Arc<Mailbox>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = mailbox.touch() {
                tracing::warn!(kind = e.kind(), "heartbeat update failed");
            }
        }
    })
}

/// Handle one JSON-RPC message. Returns `None` for notifications (nothing
/// to write back).
pub fn handle_message(mailbox: &Mailbox, raw: &str) -> Option<Value> {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            return Some(error_response(
                Value::Null,
                PARSE_ERROR,
                &format!("parse error: {e}"),
            ));
        }
    };

    let id = parsed.get("id").filter(|v| !v.is_null()).cloned();
    let method = parsed.get("method").and_then(|m| m.as_str()).unwrap_or("");

    match method {
        "initialize" => id.map(|id| result_response(id, initialize_result())),
        "ping" => id.map(|id| result_response(id, json!({}))),
        "tools/list" => {
            id.map(|id| result_response(id, json!({ "tools": tools::tool_definitions() })))
        }
        "tools/call" => {
            let id = id?;
            Some(handle_tool_call(mailbox, id, parsed.get("params")))
        }
        m if m.starts_with("notifications/") => None,
        other => id.map(|id| {
            error_response(id, METHOD_NOT_FOUND, &format!("unknown method '{other}'"))
        }),
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": "ai-mail-mcp",
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

fn handle_tool_call(mailbox: &Mailbox, id: Value, params: Option<&Value>) -> Value {
    let Some(name) = params
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str())
    else {
        return error_response(id, INVALID_PARAMS, "tools/call requires params.name");
    };

    let arguments = params
        .and_then(|p| p.get("arguments"))
        .cloned()
        .unwrap_or(Value::Null);

    // Every tool call counts as agent activity.
    if let Err(e) = mailbox.touch() {
        tracing::warn!(kind = e.kind(), "could not refresh last_seen");
    }

    match dispatcher::dispatch(mailbox, name, &arguments) {
        Ok(structured) => tool_result(id, structured),
        Err(err) => {
            tracing::warn!(tool = name, kind = err.kind(), "tool call failed");
            tool_error(id, &err)
        }
    }
}

fn tool_result(id: Value, structured: Value) -> Value {
    let text =
        serde_json::to_string_pretty(&structured).unwrap_or_else(|_| structured.to_string());
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {
            "content": [{"type": "text", "text": text}],
            "structuredContent": structured,
        }
    })
}

fn tool_error(id: Value, err: &DispatchError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {
            "content": [{"type": "text", "text": format!("{}: {err}", err.kind())}],
            "isError": true,
            "structuredContent": {
                "error": { "kind": err.kind(), "message": err.to_string() }
            }
        }
    })
}

fn result_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aim_core::schema::{AgentRecord, Presence};
    use chrono::Utc;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn mailbox() -> (Mailbox, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = MailStore::open(dir.path()).unwrap();
        store
            .upsert_agent(&AgentRecord {
                name: "solo".to_string(),
                machine_id: "m".to_string(),
                last_seen: Utc::now(),
                status: Presence::Online,
                process_info: None,
                unknown_fields: HashMap::new(),
            })
            .unwrap();
        (Mailbox::new(store, "solo", "m"), dir)
    }

    #[test]
    fn test_initialize_shape() {
        let (mailbox, _dir) = mailbox();
        let resp = handle_message(&mailbox, r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#)
            .unwrap();
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(resp["result"]["serverInfo"]["name"], "ai-mail-mcp");
        assert!(resp["result"]["capabilities"]["tools"].is_object());
    }

    #[test]
    fn test_ping_and_tools_list() {
        let (mailbox, _dir) = mailbox();

        let resp = handle_message(&mailbox, r#"{"id":2,"method":"ping"}"#).unwrap();
        assert!(resp["result"].as_object().unwrap().is_empty());

        let resp = handle_message(&mailbox, r#"{"id":3,"method":"tools/list"}"#).unwrap();
        assert_eq!(
            resp["result"]["tools"].as_array().unwrap().len(),
            tools::TOOL_COUNT
        );
    }

    #[test]
    fn test_notification_produces_no_response() {
        let (mailbox, _dir) = mailbox();
        assert!(handle_message(&mailbox, r#"{"method":"notifications/initialized"}"#).is_none());
    }

    #[test]
    fn test_unknown_method() {
        let (mailbox, _dir) = mailbox();
        let resp = handle_message(&mailbox, r#"{"id":4,"method":"resources/list"}"#).unwrap();
        assert_eq!(resp["error"]["code"], METHOD_NOT_FOUND);
        // Without an id it is a notification and silently dropped.
        assert!(handle_message(&mailbox, r#"{"method":"resources/list"}"#).is_none());
    }

    #[test]
    fn test_parse_error() {
        let (mailbox, _dir) = mailbox();
        let resp = handle_message(&mailbox, "{not json").unwrap();
        assert_eq!(resp["error"]["code"], PARSE_ERROR);
    }

    #[test]
    fn test_tool_call_success_carries_both_renderings() {
        let (mailbox, _dir) = mailbox();
        let resp = handle_message(
            &mailbox,
            r#"{"id":5,"method":"tools/call","params":{"name":"get_mailbox_stats"}}"#,
        )
        .unwrap();
        let result = &resp["result"];
        assert!(result.get("isError").is_none());
        assert_eq!(result["structuredContent"]["total_inbox"], 0);
        let text = result["content"][0]["text"].as_str().unwrap();
        let parsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parsed["total_inbox"], 0);
    }

    #[test]
    fn test_tool_call_error_is_not_a_protocol_error() {
        let (mailbox, _dir) = mailbox();
        let resp = handle_message(
            &mailbox,
            r#"{"id":6,"method":"tools/call","params":{"name":"read_message","arguments":{"message_id":"gone"}}}"#,
        )
        .unwrap();
        assert!(resp.get("error").is_none());
        assert_eq!(resp["result"]["isError"], json!(true));
        assert_eq!(resp["result"]["structuredContent"]["error"]["kind"], "not_found");
    }

    #[test]
    fn test_tool_call_without_name() {
        let (mailbox, _dir) = mailbox();
        let resp = handle_message(
            &mailbox,
            r#"{"id":7,"method":"tools/call","params":{"arguments":{}}}"#,
        )
        .unwrap();
        assert_eq!(resp["error"]["code"], INVALID_PARAMS);
    }

    #[test]
    fn test_tool_call_refreshes_last_seen() {
        let (mailbox, _dir) = mailbox();
        let store = mailbox.store().clone();

        let mut stale = store.find_agent("solo", "m").unwrap().unwrap();
        stale.last_seen = Utc::now() - chrono::Duration::hours(1);
        store.upsert_agent(&stale).unwrap();

        handle_message(
            &mailbox,
            r#"{"id":8,"method":"tools/call","params":{"name":"get_mailbox_stats"}}"#,
        )
        .unwrap();

        let row = store.find_agent("solo", "m").unwrap().unwrap();
        assert!(Utc::now().signed_duration_since(row.last_seen).num_seconds() < 5);
    }
}
