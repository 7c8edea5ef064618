//! The literal multi-agent scenarios, driven through the dispatcher the way
//! tool calls arrive from the transport.

use std::collections::HashMap;

use aim_core::kernel::Mailbox;
use aim_core::schema::{AgentRecord, Presence};
use aim_core::store::MailStore;
use aim_mcp::dispatcher::dispatch;
use aim_mcp::server;
use chrono::Utc;
use serde_json::{Value, json};
use tempfile::TempDir;

const MACHINE: &str = "scenario-machine";

fn seed(store: &MailStore, names: &[&str]) {
    for name in names {
        store
            .upsert_agent(&AgentRecord {
                name: name.to_string(),
                machine_id: MACHINE.to_string(),
                last_seen: Utc::now(),
                status: Presence::Online,
                process_info: None,
                unknown_fields: HashMap::new(),
            })
            .unwrap();
    }
}

fn mailboxes(names: &[&str]) -> (Vec<Mailbox>, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = MailStore::open(dir.path()).unwrap();
    seed(&store, names);
    let boxes = names
        .iter()
        .map(|n| Mailbox::new(store.clone(), *n, MACHINE))
        .collect();
    (boxes, dir)
}

fn send(from: &Mailbox, args: Value) -> String {
    dispatch(from, "send_mail", &args).unwrap()["message_id"]
        .as_str()
        .unwrap()
        .to_string()
}

/// Consecutive sends land on distinct persisted millisecond timestamps.
fn settle() {
    std::thread::sleep(std::time::Duration::from_millis(2));
}

#[test]
fn scenario_send_receive_read() {
    let (boxes, _dir) = mailboxes(&["agent-a", "agent-b"]);
    let (a, b) = (&boxes[0], &boxes[1]);

    let m1 = send(
        a,
        json!({"recipient": "agent-b", "subject": "hi", "body": "hello", "priority": "normal"}),
    );

    let inbox = dispatch(b, "check_mail", &json!({})).unwrap();
    assert_eq!(inbox["count"], json!(1));
    assert_eq!(inbox["messages"][0]["id"], json!(m1.clone()));
    assert_eq!(inbox["messages"][0]["read"], json!(false));

    let read = dispatch(b, "read_message", &json!({"message_id": m1})).unwrap();
    assert_eq!(read["message"]["body"], "hello");
    assert_eq!(read["message"]["read"], json!(true));

    let after = dispatch(b, "check_mail", &json!({})).unwrap();
    assert_eq!(after["count"], json!(0));
}

#[test]
fn scenario_reply_creates_shared_thread() {
    let (boxes, _dir) = mailboxes(&["agent-a", "agent-b"]);
    let (a, b) = (&boxes[0], &boxes[1]);

    let m1 = send(a, json!({"recipient": "agent-b", "subject": "Q", "body": "?"}));
    settle();
    let m2 = send(
        b,
        json!({"recipient": "agent-a", "subject": "Re: Q", "body": "!", "reply_to": m1}),
    );

    let t1 = dispatch(b, "read_message", &json!({"message_id": m1})).unwrap()["message"]
        ["thread_id"]
        .as_str()
        .unwrap()
        .to_string();

    let thread = dispatch(a, "get_thread", &json!({"thread_id": t1})).unwrap();
    let ids: Vec<&str> = thread["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![m1.as_str(), m2.as_str()]);
    assert!(
        thread["messages"]
            .as_array()
            .unwrap()
            .iter()
            .all(|m| m["thread_id"] == json!(t1.clone()))
    );
}

#[test]
fn scenario_priority_ordering() {
    let (boxes, _dir) = mailboxes(&["agent-a", "agent-b"]);
    let (a, b) = (&boxes[0], &boxes[1]);

    for (subject, priority) in [("N", "normal"), ("U", "urgent"), ("H", "high"), ("L", "low")] {
        send(
            a,
            json!({"recipient": "agent-b", "subject": subject, "body": "x", "priority": priority}),
        );
    }

    let inbox = dispatch(b, "check_mail", &json!({"limit": 10})).unwrap();
    let subjects: Vec<&str> = inbox["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["subject"].as_str().unwrap())
        .collect();
    assert_eq!(subjects, vec!["U", "H", "N", "L"]);
}

#[test]
fn scenario_non_recipient_cannot_mutate() {
    let (boxes, _dir) = mailboxes(&["agent-a", "agent-b", "agent-c"]);
    let (a, b, c) = (&boxes[0], &boxes[1], &boxes[2]);

    let m1 = send(a, json!({"recipient": "agent-b", "subject": "s", "body": "b"}));

    let err = dispatch(c, "archive_message", &json!({"message_id": m1})).unwrap_err();
    assert_eq!(err.kind(), "not_found");
    let err = dispatch(c, "read_message", &json!({"message_id": m1})).unwrap_err();
    assert_eq!(err.kind(), "not_found");

    dispatch(b, "archive_message", &json!({"message_id": m1})).unwrap();
    let inbox = dispatch(b, "check_mail", &json!({"unread_only": false})).unwrap();
    assert_eq!(inbox["count"], json!(0));
}

#[test]
fn scenario_unique_name_allocation_across_startups() {
    let dir = TempDir::new().unwrap();
    let store = MailStore::open(dir.path()).unwrap();

    let first = server::register(store.clone(), Some("claude-desktop")).unwrap();
    let second = server::register(store.clone(), Some("claude-desktop")).unwrap();
    let third = server::register(store.clone(), Some("claude-desktop")).unwrap();

    assert_eq!(first.agent_name(), "claude-desktop");
    assert_eq!(second.agent_name(), "claude-desktop-2");
    assert_eq!(third.agent_name(), "claude-desktop-3");
}

#[test]
fn scenario_search_filters() {
    let (boxes, _dir) = mailboxes(&["agent-a", "agent-b"]);
    let (a, b) = (&boxes[0], &boxes[1]);

    for body in ["alpha", "ALPHA", "beta", "alphabet", "gamma"] {
        send(a, json!({"recipient": "agent-b", "subject": "word", "body": body}));
    }

    let hits = dispatch(b, "search_messages", &json!({"query": "alpha"})).unwrap();
    assert_eq!(hits["count"], json!(3));
    let mut bodies: Vec<&str> = hits["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["body"].as_str().unwrap())
        .collect();
    bodies.sort_unstable();
    assert_eq!(bodies, vec!["ALPHA", "alpha", "alphabet"]);
}

#[test]
fn scenario_existence_oracle_resistance() {
    let (boxes, _dir) = mailboxes(&["agent-a", "agent-b", "agent-c"]);
    let (a, c) = (&boxes[0], &boxes[2]);

    let real = send(a, json!({"recipient": "agent-b", "subject": "s", "body": "b"}));

    for tool in ["read_message", "archive_message", "delete_message"] {
        let foreign = dispatch(c, tool, &json!({"message_id": real})).unwrap_err();
        let absent = dispatch(c, tool, &json!({"message_id": "does-not-exist"})).unwrap_err();
        assert_eq!(foreign.kind(), absent.kind(), "{tool} must not leak existence");
        assert_eq!(foreign.kind(), "not_found");
    }
}
