//! One-shot diagnostic commands.
//!
//! These run a single operation against the store and print to stdout.
//! None of them registers an agent: minting a fresh `base-n` name for every
//! `--stats` invocation would pollute the agent table, so they borrow the
//! identity detection would assign without claiming it.

use aim_core::identity::{self, STALE_AGENT_DAYS};
use aim_core::kernel::Mailbox;
use aim_core::schema::Presence;
use aim_core::store::MailStore;
use chrono::SecondsFormat;

fn diagnostic_mailbox(store: &MailStore, name_override: Option<&str>) -> Mailbox {
    let name = name_override
        .and_then(identity::sanitize_name)
        .unwrap_or_else(identity::detect_agent_name);
    Mailbox::new(store.clone(), name, identity::machine_id())
}

/// `--list-agents`: print every registration, most recently seen first.
pub fn list_agents(store: &MailStore) -> anyhow::Result<()> {
    let mailbox = diagnostic_mailbox(store, None);
    let agents = mailbox.list_agents(false)?;

    if agents.is_empty() {
        println!("no agents registered");
        return Ok(());
    }

    println!("{:<32} {:<8} {}", "NAME", "STATUS", "LAST SEEN");
    for agent in agents {
        let status = match agent.status {
            Presence::Online => "online",
            Presence::Offline => "offline",
        };
        println!(
            "{:<32} {:<8} {}",
            agent.name,
            status,
            agent
                .last_seen
                .to_rfc3339_opts(SecondsFormat::Millis, true)
        );
    }
    Ok(())
}

/// `--stats`: print mailbox counters for the (detected) agent.
pub fn stats(store: &MailStore, name_override: Option<&str>) -> anyhow::Result<()> {
    let mailbox = diagnostic_mailbox(store, name_override);
    let stats = mailbox.stats()?;

    println!("mailbox statistics for '{}'", mailbox.agent_name());
    println!("  inbox messages:   {}", stats.total_inbox);
    println!("  unread:           {}", stats.unread_inbox);
    println!("  unread urgent:    {}", stats.unread_urgent);
    println!("  threads:          {}", stats.distinct_threads);
    println!("  agents on host:   {}", stats.agents_total);
    Ok(())
}

/// `--cleanup`: drop stale registrations and companion files.
pub fn cleanup(store: &MailStore) -> anyhow::Result<()> {
    let removed = store.remove_stale_agents(chrono::Duration::days(STALE_AGENT_DAYS))?;
    store.remove_companion_files();
    println!("removed {removed} stale agent registration(s)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aim_core::schema::AgentRecord;
    use chrono::{Duration, Utc};
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_diagnostic_mailbox_does_not_register() {
        let dir = TempDir::new().unwrap();
        let store = MailStore::open(dir.path()).unwrap();

        let mailbox = diagnostic_mailbox(&store, Some("Observer Agent"));
        assert_eq!(mailbox.agent_name(), "observer-agent");
        assert!(store.list_agents(None).unwrap().is_empty());
    }

    #[test]
    fn test_cleanup_removes_stale_rows() {
        let dir = TempDir::new().unwrap();
        let store = MailStore::open(dir.path()).unwrap();
        store
            .upsert_agent(&AgentRecord {
                name: "relic".to_string(),
                machine_id: "m".to_string(),
                last_seen: Utc::now() - Duration::days(STALE_AGENT_DAYS + 5),
                status: Presence::Offline,
                process_info: None,
                unknown_fields: HashMap::new(),
            })
            .unwrap();

        cleanup(&store).unwrap();
        assert!(store.list_agents(None).unwrap().is_empty());
    }
}
